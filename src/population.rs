//! Population: a generation-stepped container of entities on one island.
//!
//! Entities live in a slotmap arena; the roster holds their keys in
//! fitness order (descending after every survival phase). Each generation
//! runs the fixed phase sequence: reset selectors, crossover, mutation,
//! adaption, survival, migration, then an optional restart. A cancellation
//! token is observed between phases.
//!
//! Trimmed entities return to a bounded lock-free pool and are recycled
//! (`mark_created`) before reuse; inbound migrants arrive through a
//! lock-free MPSC queue drained after survival.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_queue::{ArrayQueue, SegQueue};
use rayon::prelude::*;
use slotmap::{new_key_type, SlotMap};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::crossover::CrossoverOp;
use crate::entity::{Entity, Species};
use crate::error::EvolveError;
use crate::mutate::MutateOp;
use crate::rng::SharedRng;
use crate::select::SelectView;
use crate::settings::{Elitism, Evolution, Genesis, GenerationStats, PopulationSettings};

new_key_type! {
    /// Stable handle for entities in a population's arena.
    pub struct EntityKey;
}

/// Cooperative cancellation observed between phases. Cloning shares the
/// underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A fresh, untripped token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token; every holder observes it.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the token has been tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Raise [`EvolveError::Cancelled`] if tripped.
    pub fn check(&self) -> Result<(), EvolveError> {
        if self.is_cancelled() {
            Err(EvolveError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Result of a single generation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The loop may continue.
    Continue,
    /// The stop condition fired (observer veto or generation cap).
    Stopped,
}

/// An entity in transit between islands, stamped with the host that sent
/// it. Hosts silently discard migrants from foreign hosts.
pub struct Migrant<S: Species> {
    /// Id of the host whose island emitted the entity.
    pub source_host: Uuid,
    /// The detached entity.
    pub entity: Entity<S>,
}

/// Wiring a host installs on each island so migration can flow.
pub(crate) struct HostLink<S: Species> {
    pub(crate) host_id: Uuid,
    pub(crate) outbox: Arc<SegQueue<Migrant<S>>>,
    pub(crate) can_migrate: Arc<AtomicBool>,
}

impl<S: Species> Clone for HostLink<S> {
    fn clone(&self) -> Self {
        Self {
            host_id: self.host_id,
            outbox: Arc::clone(&self.outbox),
            can_migrate: Arc::clone(&self.can_migrate),
        }
    }
}

/// One island's population.
pub struct Population<S: Species> {
    island_id: Uuid,
    species: Arc<S>,
    settings: PopulationSettings,
    rng: SharedRng,
    arena: SlotMap<EntityKey, Entity<S>>,
    /// Entity keys in order; descending fitness after survival, children
    /// appended at indices `>= original_count` mid-generation.
    roster: Vec<EntityKey>,
    original_count: usize,
    generation: usize,
    restart_requested: bool,
    free_pool: ArrayQueue<Entity<S>>,
    inbox: Arc<SegQueue<Entity<S>>>,
    host: Option<HostLink<S>>,
}

impl<S: Species> Population<S> {
    /// Build and seed a population: `stable_size` entities are created per
    /// the genesis mode and evaluated once, so selectors observe fitness
    /// from the first generation.
    ///
    /// # Errors
    ///
    /// Invalid settings, or failures from the species hooks during
    /// genesis.
    pub fn new(species: Arc<S>, settings: PopulationSettings) -> Result<Self, EvolveError> {
        settings.validate()?;
        let rng = match settings.rng_seed {
            Some(seed) => SharedRng::seeded(seed),
            None => SharedRng::from_entropy(),
        };
        let free_pool = ArrayQueue::new(settings.free_pool_capacity.max(1));
        let mut population = Self {
            island_id: Uuid::new_v4(),
            species,
            settings,
            rng,
            arena: SlotMap::with_key(),
            roster: Vec::new(),
            original_count: 0,
            generation: 0,
            restart_requested: false,
            free_pool,
            inbox: Arc::new(SegQueue::new()),
            host: None,
        };
        population.genesis()?;
        Ok(population)
    }

    /// Stable island identifier.
    #[must_use]
    pub fn island_id(&self) -> Uuid {
        self.island_id
    }

    /// Completed generation count.
    #[must_use]
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Current entity count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roster.len()
    }

    /// `true` when the population holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    /// Entity count at the start of the current generation.
    #[must_use]
    pub fn original_count(&self) -> usize {
        self.original_count
    }

    /// Number of entities parked in the free pool.
    #[must_use]
    pub fn free_pool_len(&self) -> usize {
        self.free_pool.len()
    }

    /// The settings this population runs with.
    #[must_use]
    pub fn settings(&self) -> &PopulationSettings {
        &self.settings
    }

    /// Replace the settings; takes effect from the next generation.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` / `InvalidConfiguration` when the new settings
    /// fail validation; the old settings stay in place.
    pub fn set_settings(&mut self, settings: PopulationSettings) -> Result<(), EvolveError> {
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    /// Iterate entities in roster order (descending fitness after
    /// survival).
    pub fn entities(&self) -> impl Iterator<Item = &Entity<S>> {
        self.roster.iter().map(|&key| &self.arena[key])
    }

    /// The fittest entity, if any.
    #[must_use]
    pub fn best(&self) -> Option<&Entity<S>> {
        self.roster.first().map(|&key| &self.arena[key])
    }

    /// Ask the loop to reinitialize the population from the same settings
    /// at the end of the current generation.
    pub fn request_restart(&mut self) {
        self.restart_requested = true;
    }

    /// Sender half of the inbound migration queue.
    pub(crate) fn inbox(&self) -> Arc<SegQueue<Entity<S>>> {
        Arc::clone(&self.inbox)
    }

    pub(crate) fn set_host(&mut self, link: HostLink<S>) {
        self.host = Some(link);
    }

    /// Fitness summary of the current roster.
    #[must_use]
    pub fn stats(&self) -> GenerationStats {
        let fitnesses: Vec<f64> = self
            .entities()
            .map(|e| e.fitness().unwrap_or(f64::NEG_INFINITY))
            .collect();
        let n = fitnesses.len().max(1) as f64;
        let mean = fitnesses.iter().sum::<f64>() / n;
        let variance = fitnesses.iter().map(|f| (f - mean) * (f - mean)).sum::<f64>() / n;
        GenerationStats {
            generation: self.generation,
            size: fitnesses.len(),
            best: fitnesses.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            worst: fitnesses.iter().copied().fold(f64::INFINITY, f64::min),
            mean,
            std_dev: variance.sqrt(),
        }
    }

    /// Run the generation loop until the stop condition or cancellation.
    ///
    /// # Errors
    ///
    /// `Cancelled` when the token trips; phase errors propagate.
    pub fn evolve(&mut self, token: &CancelToken) -> Result<(), EvolveError> {
        while self.step_with_pool(None, token)? == StepOutcome::Continue {}
        Ok(())
    }

    /// Run a single generation.
    ///
    /// # Errors
    ///
    /// `Cancelled` when the token trips; phase errors propagate.
    pub fn step(&mut self, token: &CancelToken) -> Result<StepOutcome, EvolveError> {
        self.step_with_pool(None, token)
    }

    /// One generation, optionally spreading evaluation/crossover/mutation
    /// work over a rayon pool.
    pub(crate) fn step_with_pool(
        &mut self,
        pool: Option<&rayon::ThreadPool>,
        token: &CancelToken,
    ) -> Result<StepOutcome, EvolveError> {
        // Observer gate, fired every Nth generation.
        let interval = self.settings.evolution_event_interval;
        if interval > 0 && self.generation % interval == 0 {
            if let Some(handler) = &self.settings.generation_handler {
                let stats = self.stats();
                if !handler.as_ref()(&stats) {
                    debug!(island = %self.island_id, generation = self.generation, "observer stopped evolution");
                    return Ok(StepOutcome::Stopped);
                }
            }
        }
        token.check()?;

        // Reset selectors against the parents of this generation.
        let fitnesses = self.parent_fitnesses(self.roster.len());
        let view = SelectView::new(&fitnesses);
        self.settings
            .select_two
            .init(&view, self.settings.crossover_ratio);
        self.settings
            .select_one
            .init(&view, self.settings.mutation_ratio);
        self.settings.migration_selector.init(&view, 1.0);

        self.generation += 1;
        self.original_count = self.roster.len();
        trace!(island = %self.island_id, generation = self.generation, size = self.original_count, "generation start");

        self.crossover_phase(pool)?;
        token.check()?;
        self.mutation_phase(pool)?;
        token.check()?;
        self.adaption_phase()?;
        token.check()?;
        self.survival_phase(pool)?;
        token.check()?;
        self.migration_phase()?;
        token.check()?;

        if self.restart_requested {
            debug!(island = %self.island_id, "restart requested; reseeding population");
            self.restart_requested = false;
            self.genesis()?;
            return Ok(StepOutcome::Continue);
        }

        if !self.settings.steady_state && self.generation >= self.settings.max_generations {
            return Ok(StepOutcome::Stopped);
        }
        Ok(StepOutcome::Continue)
    }

    /// Drop every entity and reseed per the genesis mode; the generation
    /// counter resets.
    fn genesis(&mut self) -> Result<(), EvolveError> {
        let keys: Vec<EntityKey> = self.roster.drain(..).collect();
        for key in keys {
            if let Some(entity) = self.arena.remove(key) {
                self.release_entity(entity);
            }
        }
        self.generation = 0;
        self.original_count = 0;

        let species = Arc::clone(&self.species);
        for _ in 0..self.settings.stable_size {
            let mut entity = self.fresh_entity();
            entity.init(&species)?;
            match self.settings.genesis {
                Genesis::Random => entity.seed(0.5, &self.rng)?,
                Genesis::Soup => {
                    entity.seed(0.5, &self.rng)?;
                    if let Some(dna) = entity.dna_mut() {
                        MutateOp::MultiRandom.apply(dna, &self.rng)?;
                    }
                }
                Genesis::User => {}
            }
            let fitness = entity.ensure_fitness(&species)?;
            if let Some(handler) = &self.settings.fitness_handler {
                handler.as_ref()(entity.id(), fitness);
            }
            entity.attach(self.island_id);
            let key = self.arena.insert(entity);
            self.roster.push(key);
        }
        self.sort_roster();
        Ok(())
    }

    /// Fitnesses of the first `count` roster entries, in order.
    fn parent_fitnesses(&self, count: usize) -> Vec<f64> {
        self.roster[..count.min(self.roster.len())]
            .iter()
            .map(|&key| self.arena[key].fitness().unwrap_or(f64::NEG_INFINITY))
            .collect()
    }

    /// Pop a pooled entity (recycled to `Created`) or allocate a fresh one.
    fn fresh_entity(&self) -> Entity<S> {
        match self.free_pool.pop() {
            Some(mut entity) => {
                entity.mark_created();
                entity
            }
            None => Entity::new(),
        }
    }

    /// Free an entity and park it in the pool; destroyed when the pool's
    /// soft cap is reached.
    fn release_entity(&self, mut entity: Entity<S>) {
        entity.mark_free();
        let _ = self.free_pool.push(entity);
    }

    /// Physical crossover of one parent pair: two pooled children seeded
    /// by `copy_from`, the operator applied, both demoted to Initialised.
    pub(crate) fn cross_pair(
        &self,
        mother: EntityKey,
        father: EntityKey,
        op: CrossoverOp,
    ) -> Result<(Entity<S>, Entity<S>), EvolveError> {
        let mother = &self.arena[mother];
        let father = &self.arena[father];
        match (mother.dna(), father.dna()) {
            (Some(m), Some(f)) if m.same_shape(f) => {}
            _ => {
                return Err(EvolveError::ShapeMismatch(
                    "crossover parents carry different chromosome counts".into(),
                ))
            }
        }

        let mut son = self.fresh_entity();
        son.copy_from(mother);
        let mut daughter = self.fresh_entity();
        daughter.copy_from(father);

        {
            // Split borrows: the operator needs both children's DNA at once.
            let mut son_dna = son.take_dna().ok_or(EvolveError::Disposed)?;
            let mut daughter_dna = daughter.take_dna().ok_or(EvolveError::Disposed)?;
            op.apply(&mut son_dna, &mut daughter_dna, &self.rng)?;
            son.put_dna(son_dna);
            daughter.put_dna(daughter_dna);
        }

        son.demote_to_initialised();
        daughter.demote_to_initialised();
        Ok((son, daughter))
    }

    /// Physical mutation of one parent: a pooled child seeded by
    /// `copy_from`, the operator applied, demoted to Initialised.
    pub(crate) fn mutate_parent(
        &self,
        parent: EntityKey,
        op: MutateOp,
    ) -> Result<Entity<S>, EvolveError> {
        let parent = &self.arena[parent];
        let mut child = self.fresh_entity();
        child.copy_from(parent);
        let mut dna = child.take_dna().ok_or(EvolveError::Disposed)?;
        op.apply(&mut dna, &self.rng)?;
        child.put_dna(dna);
        child.demote_to_initialised();
        Ok(child)
    }

    fn append_children(&mut self, children: Vec<Entity<S>>) {
        for mut child in children {
            child.attach(self.island_id);
            let key = self.arena.insert(child);
            self.roster.push(key);
        }
    }

    fn crossover_phase(&mut self, pool: Option<&rayon::ThreadPool>) -> Result<(), EvolveError> {
        if !self.rng.random_prob(self.settings.crossover_ratio)? {
            return Ok(());
        }
        let op = self.settings.crossover.ok_or_else(|| {
            EvolveError::InvalidConfiguration("crossover phase has no operator".into())
        })?;

        // Gather all parent pairs on the calling thread, then run the
        // physical crossover (possibly pooled), then append.
        let fitnesses = self.parent_fitnesses(self.original_count);
        let view = SelectView::new(&fitnesses);
        let mut pairs = Vec::new();
        while let Some((m, f)) = self.settings.select_two.next(&view, &self.rng)? {
            pairs.push((self.roster[m], self.roster[f]));
        }
        trace!(island = %self.island_id, pairs = pairs.len(), "crossover phase");

        let children = match pool {
            Some(pool) => pool.install(|| {
                pairs
                    .par_iter()
                    .map(|&(m, f)| self.cross_pair(m, f, op))
                    .collect::<Result<Vec<_>, _>>()
            })?,
            None => pairs
                .iter()
                .map(|&(m, f)| self.cross_pair(m, f, op))
                .collect::<Result<Vec<_>, _>>()?,
        };

        for (son, daughter) in children {
            self.append_children(vec![son, daughter]);
        }
        Ok(())
    }

    fn mutation_phase(&mut self, pool: Option<&rayon::ThreadPool>) -> Result<(), EvolveError> {
        if !self.rng.random_prob(self.settings.mutation_ratio)? {
            return Ok(());
        }
        let op = self.settings.mutate.ok_or_else(|| {
            EvolveError::InvalidConfiguration("mutation phase has no operator".into())
        })?;

        let fitnesses = self.parent_fitnesses(self.original_count);
        let view = SelectView::new(&fitnesses);
        let mut parents = Vec::new();
        while let Some(index) = self.settings.select_one.next(&view, &self.rng)? {
            parents.push(self.roster[index]);
        }
        trace!(island = %self.island_id, parents = parents.len(), "mutation phase");

        let children = match pool {
            Some(pool) => pool.install(|| {
                parents
                    .par_iter()
                    .map(|&p| self.mutate_parent(p, op))
                    .collect::<Result<Vec<_>, _>>()
            })?,
            None => parents
                .iter()
                .map(|&p| self.mutate_parent(p, op))
                .collect::<Result<Vec<_>, _>>()?,
        };
        self.append_children(children);
        Ok(())
    }

    fn adaption_phase(&mut self) -> Result<(), EvolveError> {
        let evolution = self.settings.evolution;
        if evolution == Evolution::Darwin {
            return Ok(());
        }
        let op = self.settings.adaption.clone().ok_or_else(|| {
            EvolveError::InvalidConfiguration("adaption phase has no operator".into())
        })?;
        let max_iterations = self.settings.max_adaption_iterations;
        let species = Arc::clone(&self.species);

        for index in 0..self.roster.len() {
            let is_parent = index < self.original_count;
            let applies = if is_parent {
                evolution.applies_to_parents()
            } else {
                evolution.applies_to_children()
            };
            if !applies {
                continue;
            }

            let key = self.roster[index];
            let mut candidate = self.arena[key].clone();
            op.optimise(species.as_ref(), &self.rng, &mut candidate, max_iterations)?;

            if evolution.is_lamarckian() {
                // The improved genotype is inherited.
                self.arena[key].copy_from(&candidate);
            } else if let Some(fitness) = candidate.fitness() {
                // Baldwinian: the score flows back, the genotype does not.
                self.arena[key].set_fitness(fitness);
            }
        }
        Ok(())
    }

    fn survival_phase(&mut self, pool: Option<&rayon::ThreadPool>) -> Result<(), EvolveError> {
        // Elitism: parent removal or re-scoring before the trim.
        let elitism = self.settings.elitism;
        match elitism {
            Elitism::ParentsDie => self.remove_roster_range(0, self.original_count),
            Elitism::OneParentSurvives => self.remove_roster_range(1, self.original_count),
            Elitism::RescoreParents => {
                for index in 0..self.original_count.min(self.roster.len()) {
                    let key = self.roster[index];
                    self.arena[key].invalidate_fitness();
                }
            }
            Elitism::None | Elitism::ParentsSurvive => {}
        }

        self.evaluate_all(pool)?;
        self.sort_roster();

        while self.roster.len() > self.settings.stable_size {
            if let Some(key) = self.roster.pop() {
                if let Some(entity) = self.arena.remove(key) {
                    self.release_entity(entity);
                }
            }
        }
        Ok(())
    }

    /// Evaluate every entity that is not yet `Ready`, optionally on the
    /// worker pool. The first failure cancels the whole phase.
    fn evaluate_all(&mut self, pool: Option<&rayon::ThreadPool>) -> Result<(), EvolveError> {
        let species = Arc::clone(&self.species);
        let evaluated: Vec<(u64, f64)> = match pool {
            Some(pool) => {
                let mut entries: Vec<&mut Entity<S>> = self.arena.values_mut().collect();
                pool.install(|| {
                    entries
                        .par_iter_mut()
                        .map(|entity| Ok((entity.id(), entity.ensure_fitness(&species)?)))
                        .collect::<Result<Vec<_>, EvolveError>>()
                })?
            }
            None => {
                let mut results = Vec::with_capacity(self.roster.len());
                for &key in &self.roster {
                    let entity = &mut self.arena[key];
                    results.push((entity.id(), entity.ensure_fitness(&species)?));
                }
                results
            }
        };
        if let Some(handler) = &self.settings.fitness_handler {
            for (id, fitness) in evaluated {
                handler.as_ref()(id, fitness);
            }
        }
        Ok(())
    }

    /// Stable descending sort by fitness.
    fn sort_roster(&mut self) {
        let arena = &self.arena;
        self.roster.sort_by(|&a, &b| {
            let fa = arena[a].fitness().unwrap_or(f64::NEG_INFINITY);
            let fb = arena[b].fitness().unwrap_or(f64::NEG_INFINITY);
            fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    fn remove_roster_range(&mut self, start: usize, end: usize) {
        let end = end.min(self.roster.len());
        if start >= end {
            return;
        }
        let removed: Vec<EntityKey> = self.roster.drain(start..end).collect();
        for key in removed {
            if let Some(entity) = self.arena.remove(key) {
                self.release_entity(entity);
            }
        }
    }

    fn migration_phase(&mut self) -> Result<(), EvolveError> {
        // Outbound: gated on the ratio and on the host accepting migrants.
        if let Some(link) = self.host.clone() {
            if link.can_migrate.load(Ordering::SeqCst)
                && self.rng.random_prob(self.settings.migration_ratio)?
                && !self.roster.is_empty()
            {
                let fitnesses = self.parent_fitnesses(self.roster.len());
                let view = SelectView::new(&fitnesses);
                if let Some(index) = self.settings.migration_selector.next(&view, &self.rng)? {
                    let key = self.roster.remove(index);
                    if let Some(entity) = self.arena.remove(key) {
                        // The island stamp stays on the migrant so routing
                        // can avoid sending it back where it came from.
                        debug!(island = %self.island_id, entity = entity.id(), "entity emigrating");
                        link.outbox.push(Migrant {
                            source_host: link.host_id,
                            entity,
                        });
                    }
                }
            }
        }

        self.absorb_inbox();
        Ok(())
    }

    /// Drain the inbound queue in insertion order, attaching each migrant
    /// that did not originate on this island.
    pub(crate) fn absorb_inbox(&mut self) {
        while let Some(mut entity) = self.inbox.pop() {
            if entity.island() == Some(self.island_id) {
                // A migrant cannot land on the island it left.
                self.release_entity(entity);
                continue;
            }
            entity.attach(self.island_id);
            debug!(island = %self.island_id, entity = entity.id(), "entity immigrated");
            let key = self.arena.insert(entity);
            self.roster.push(key);
        }
    }
}
