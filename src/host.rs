//! Population host: the island coordinator and migration fabric.
//!
//! A host owns one or more populations ("islands"), a shared outbound
//! migration queue every island pushes into, and per-island inbound
//! queues. Dispatch routes each migrant to the first island it did not
//! come from; migrants stamped with a foreign host id are silently
//! discarded.
//!
//! Two evolve modes: [`PopulationHost::evolve`] steps islands round-robin
//! on the calling thread (dispatching between steps), and
//! [`PopulationHost::evolve_parallel`] runs each island on its own scoped
//! thread with a dispatcher draining the shared queue concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_queue::SegQueue;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::entity::{Entity, Species};
use crate::error::EvolveError;
use crate::population::{CancelToken, HostLink, Migrant, Population, StepOutcome};
use crate::settings::PopulationSettings;

/// Coordinator for one or more island populations.
pub struct PopulationHost<S: Species> {
    host_id: Uuid,
    islands: Vec<Population<S>>,
    inboxes: HashMap<Uuid, Arc<SegQueue<Entity<S>>>>,
    outbox: Arc<SegQueue<Migrant<S>>>,
    can_migrate: Arc<AtomicBool>,
    closed: bool,
}

impl<S: Species> Default for PopulationHost<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Species> PopulationHost<S> {
    /// An empty host with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host_id: Uuid::new_v4(),
            islands: Vec::new(),
            inboxes: HashMap::new(),
            outbox: Arc::new(SegQueue::new()),
            can_migrate: Arc::new(AtomicBool::new(false)),
            closed: false,
        }
    }

    /// Stable host identifier.
    #[must_use]
    pub fn host_id(&self) -> Uuid {
        self.host_id
    }

    /// Whether migration can currently route anywhere (two or more
    /// islands).
    #[must_use]
    pub fn can_migrate(&self) -> bool {
        self.can_migrate.load(Ordering::SeqCst)
    }

    /// Number of islands.
    #[must_use]
    pub fn island_count(&self) -> usize {
        self.islands.len()
    }

    fn check_open(&self) -> Result<(), EvolveError> {
        if self.closed {
            Err(EvolveError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Build a new island from the settings and wire it into the
    /// migration fabric. Returns the island id.
    ///
    /// # Errors
    ///
    /// `Disposed` after `close`; settings/genesis errors as for
    /// [`Population::new`].
    pub fn add_population(
        &mut self,
        species: Arc<S>,
        settings: PopulationSettings,
    ) -> Result<Uuid, EvolveError> {
        self.check_open()?;
        let mut population = Population::new(species, settings)?;
        population.set_host(HostLink {
            host_id: self.host_id,
            outbox: Arc::clone(&self.outbox),
            can_migrate: Arc::clone(&self.can_migrate),
        });
        let island_id = population.island_id();
        self.inboxes.insert(island_id, population.inbox());
        self.islands.push(population);
        self.can_migrate
            .store(self.islands.len() > 1, Ordering::SeqCst);
        debug!(host = %self.host_id, island = %island_id, islands = self.islands.len(), "island added");
        Ok(island_id)
    }

    /// Look up an island by id.
    #[must_use]
    pub fn population(&self, island_id: Uuid) -> Option<&Population<S>> {
        self.islands.iter().find(|p| p.island_id() == island_id)
    }

    /// Mutable island lookup.
    pub fn population_mut(&mut self, island_id: Uuid) -> Option<&mut Population<S>> {
        self.islands
            .iter_mut()
            .find(|p| p.island_id() == island_id)
    }

    /// Iterate islands in insertion order.
    pub fn islands(&self) -> impl Iterator<Item = &Population<S>> {
        self.islands.iter()
    }

    /// Enqueue a migrant into the shared queue. Producers on any thread
    /// may call this; routing happens on the dispatching thread.
    pub fn migrate_entity(&self, migrant: Migrant<S>) {
        self.outbox.push(migrant);
    }

    /// Drain the shared queue, routing each migrant to the inbox of the
    /// first island it did not come from. Migrants stamped with a foreign
    /// host id are silently discarded.
    fn dispatch(
        outbox: &SegQueue<Migrant<S>>,
        inboxes: &HashMap<Uuid, Arc<SegQueue<Entity<S>>>>,
        host_id: Uuid,
    ) {
        while let Some(migrant) = outbox.pop() {
            if migrant.source_host != host_id {
                debug!(host = %host_id, source = %migrant.source_host, "discarding foreign migrant");
                continue;
            }
            let origin = migrant.entity.island();
            let target = inboxes
                .iter()
                .find(|(island_id, _)| Some(**island_id) != origin)
                .map(|(_, inbox)| Arc::clone(inbox));
            match target {
                Some(inbox) => {
                    trace!(host = %host_id, entity = migrant.entity.id(), "migrant routed");
                    inbox.push(migrant.entity);
                }
                None => {
                    trace!(host = %host_id, "no destination island; migrant dropped");
                }
            }
        }
    }

    /// Synchronous evolve: step every island one generation per round,
    /// dispatching and absorbing migrants between steps, until every
    /// island reports its stop condition.
    ///
    /// # Errors
    ///
    /// `Disposed` after `close`; `Cancelled` and phase errors propagate
    /// from the islands.
    pub fn evolve(&mut self, token: &CancelToken) -> Result<(), EvolveError> {
        self.check_open()?;
        let mut running: Vec<bool> = vec![true; self.islands.len()];
        while running.iter().any(|&r| r) {
            for (index, island) in self.islands.iter_mut().enumerate() {
                if !running[index] {
                    continue;
                }
                if island.step(token)? == StepOutcome::Stopped {
                    running[index] = false;
                }
                Self::dispatch(&self.outbox, &self.inboxes, self.host_id);
            }
            // Land in-flight migrants before the next round so no entity
            // sits in a queue across a whole generation.
            for island in &mut self.islands {
                island.absorb_inbox();
            }
        }
        Ok(())
    }

    /// Parallel evolve: one scoped thread per island plus a dispatcher
    /// draining the shared queue until every island finishes.
    ///
    /// # Errors
    ///
    /// `Disposed` after `close`; the first island error (by island order)
    /// propagates after all threads have joined.
    pub fn evolve_parallel(&mut self, token: &CancelToken) -> Result<(), EvolveError> {
        self.check_open()?;
        let outbox = Arc::clone(&self.outbox);
        let inboxes = self.inboxes.clone();
        let host_id = self.host_id;
        let active = AtomicUsize::new(self.islands.len());

        let results: Vec<Result<(), EvolveError>> = std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.islands.len());
            for island in &mut self.islands {
                let token = token.clone();
                let active = &active;
                handles.push(scope.spawn(move || {
                    let result = island.evolve(&token);
                    active.fetch_sub(1, Ordering::SeqCst);
                    result
                }));
            }

            // Dispatcher: route migrants while any island is running.
            while active.load(Ordering::SeqCst) > 0 {
                Self::dispatch(&outbox, &inboxes, host_id);
                std::thread::sleep(Duration::from_millis(1));
            }
            Self::dispatch(&outbox, &inboxes, host_id);

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(_) => Err(EvolveError::Evaluation("island thread panicked".into())),
                })
                .collect()
        });

        for island in &mut self.islands {
            island.absorb_inbox();
        }
        results.into_iter().collect()
    }

    /// Release the host; later operations raise `Disposed`.
    pub fn close(&mut self) {
        self.closed = true;
        self.can_migrate.store(false, Ordering::SeqCst);
    }
}
