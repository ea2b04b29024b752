//! Entities: candidate solutions with a lifecycle state machine.
//!
//! An [`Entity`] owns one [`Dna`] bundle, a cached fitness, and a state
//! that only moves forward (`Created -> Initialised -> Loaded -> Ready`)
//! except for the pool transitions `MarkAsFree` / `MarkAsCreated`. The
//! user plugs in behavior through the [`Species`] trait: DNA shape,
//! phenotype expression, and fitness.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dna::Dna;
use crate::error::EvolveError;
use crate::rng::SharedRng;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// User hooks defining a problem domain.
///
/// Implementations must be `Send + Sync`: fitness evaluation runs on a
/// worker pool in the parallel population. Any problem state (datasets,
/// targets, tuning) lives on the implementing type itself.
pub trait Species: Send + Sync + 'static {
    /// The expressed form of a DNA bundle, rebuilt on load.
    type Phenotype: Clone + Send + Sync;

    /// Allocate the DNA shape for a fresh entity. Gene values are
    /// overwritten afterwards according to the genesis mode, except for
    /// [`Genesis::User`](crate::settings::Genesis), which takes them as
    /// returned.
    fn create_dna(&self) -> Result<Dna, EvolveError>;

    /// Rebuild the phenotype from DNA.
    fn express(&self, dna: &Dna) -> Result<Self::Phenotype, EvolveError>;

    /// Score a loaded entity. Higher is better.
    fn evaluate(&self, phenotype: &Self::Phenotype, dna: &Dna) -> Result<f64, EvolveError>;
}

/// Lifecycle states of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityState {
    /// Allocated (or recycled); DNA not yet built.
    Created,
    /// DNA allocated.
    Initialised,
    /// Phenotype expressed from DNA.
    Loaded,
    /// Fitness evaluated and cached.
    Ready,
    /// Returned to the free pool; DNA discarded.
    Free,
}

/// One candidate solution.
pub struct Entity<S: Species> {
    id: u64,
    state: EntityState,
    dna: Option<Dna>,
    fitness: Option<f64>,
    phenotype: Option<S::Phenotype>,
    /// Last island the entity was attached to. The stamp survives
    /// migration so routing never returns a migrant to its origin.
    island: Option<Uuid>,
}

impl<S: Species> std::fmt::Debug for Entity<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("fitness", &self.fitness)
            .field("island", &self.island)
            .finish_non_exhaustive()
    }
}

impl<S: Species> Clone for Entity<S> {
    /// Deep copy with a fresh id.
    fn clone(&self) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            state: self.state,
            dna: self.dna.clone(),
            fitness: self.fitness,
            phenotype: self.phenotype.clone(),
            island: self.island,
        }
    }
}

impl<S: Species> Entity<S> {
    /// A fresh entity in the `Created` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            state: EntityState::Created,
            dna: None,
            fitness: None,
            phenotype: None,
            island: None,
        }
    }

    /// Stable identifier, unique for the process lifetime.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> EntityState {
        self.state
    }

    /// Cached fitness, if evaluated.
    #[must_use]
    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    /// The island this entity is attached to.
    #[must_use]
    pub fn island(&self) -> Option<Uuid> {
        self.island
    }

    pub(crate) fn attach(&mut self, island: Uuid) {
        self.island = Some(island);
    }

    /// The DNA bundle, if initialised.
    #[must_use]
    pub fn dna(&self) -> Option<&Dna> {
        self.dna.as_ref()
    }

    /// Mutable DNA access; mutation invalidates any cached fitness.
    pub fn dna_mut(&mut self) -> Option<&mut Dna> {
        if self.state == EntityState::Ready {
            self.state = EntityState::Loaded;
            self.fitness = None;
        }
        self.dna.as_mut()
    }

    /// The expressed phenotype, if loaded.
    #[must_use]
    pub fn phenotype(&self) -> Option<&S::Phenotype> {
        self.phenotype.as_ref()
    }

    fn check_alive(&self) -> Result<(), EvolveError> {
        if self.state == EntityState::Free {
            Err(EvolveError::Disposed)
        } else {
            Ok(())
        }
    }

    /// `Created -> Initialised`: allocate DNA through the species hook.
    /// A no-op when already initialised.
    ///
    /// # Errors
    ///
    /// `Disposed` when the entity has been freed.
    pub fn init(&mut self, species: &S) -> Result<(), EvolveError> {
        self.check_alive()?;
        if self.state >= EntityState::Initialised {
            return Ok(());
        }
        self.dna = Some(species.create_dna()?);
        self.state = EntityState::Initialised;
        Ok(())
    }

    /// `Initialised -> Loaded`: express the phenotype. Upgrades through
    /// `init` when needed; a no-op when already loaded.
    ///
    /// # Errors
    ///
    /// `Disposed` when the entity has been freed; any error from the
    /// species hooks.
    pub fn load(&mut self, species: &S) -> Result<(), EvolveError> {
        self.check_alive()?;
        if self.state >= EntityState::Loaded {
            return Ok(());
        }
        self.init(species)?;
        let dna = self.dna.as_ref().ok_or(EvolveError::Disposed)?;
        self.phenotype = Some(species.express(dna)?);
        self.state = EntityState::Loaded;
        Ok(())
    }

    /// `Loaded -> Ready`: evaluate fitness once and cache it. Repeated
    /// calls return the cached score without re-running the hook.
    ///
    /// # Errors
    ///
    /// `Disposed` when the entity has been freed; evaluation failures
    /// propagate as raised by the species hook.
    pub fn ensure_fitness(&mut self, species: &S) -> Result<f64, EvolveError> {
        self.check_alive()?;
        if let (EntityState::Ready, Some(f)) = (self.state, self.fitness) {
            return Ok(f);
        }
        self.load(species)?;
        let phenotype = self.phenotype.as_ref().ok_or(EvolveError::Disposed)?;
        let dna = self.dna.as_ref().ok_or(EvolveError::Disposed)?;
        let fitness = species.evaluate(phenotype, dna)?;
        self.fitness = Some(fitness);
        self.state = EntityState::Ready;
        Ok(fitness)
    }

    /// Force the `Ready` state with a given score. Idempotent.
    pub fn set_fitness(&mut self, fitness: f64) {
        self.fitness = Some(fitness);
        if self.state != EntityState::Free {
            self.state = EntityState::Ready;
        }
    }

    /// Return the entity to the free pool: DNA and phenotype are
    /// discarded, the state becomes `Free`.
    pub fn mark_free(&mut self) {
        self.dna = None;
        self.phenotype = None;
        self.fitness = None;
        self.island = None;
        self.state = EntityState::Free;
    }

    /// Recycle a pooled entity: back to `Created` with everything cleared.
    pub fn mark_created(&mut self) {
        self.dna = None;
        self.phenotype = None;
        self.fitness = None;
        self.state = EntityState::Created;
    }

    /// Deep-copy DNA, fitness, state, and phenotype from `other`, keeping
    /// this entity's id.
    pub fn copy_from(&mut self, other: &Self) {
        self.state = other.state;
        self.dna = other.dna.clone();
        self.fitness = other.fitness;
        self.phenotype = other.phenotype.clone();
        self.island = other.island;
    }

    /// Detach the DNA bundle for split-borrow operator application.
    pub(crate) fn take_dna(&mut self) -> Option<Dna> {
        self.dna.take()
    }

    /// Reinstall a DNA bundle taken with [`Entity::take_dna`].
    pub(crate) fn put_dna(&mut self, dna: Dna) {
        self.dna = Some(dna);
    }

    /// Reset a freshly-crossed or mutated child to `Initialised`: the DNA
    /// stays, phenotype and fitness are dropped.
    pub(crate) fn demote_to_initialised(&mut self) {
        if self.dna.is_some() {
            self.phenotype = None;
            self.fitness = None;
            self.state = EntityState::Initialised;
        }
    }

    /// Drop the cached fitness so the next `ensure_fitness` re-runs the
    /// species hook.
    pub(crate) fn invalidate_fitness(&mut self) {
        if self.state == EntityState::Ready {
            self.state = EntityState::Loaded;
            self.fitness = None;
        }
    }

    /// Seed every chromosome of an initialised entity.
    ///
    /// # Errors
    ///
    /// `Disposed` for a freed entity, `InvalidConfiguration` when no DNA
    /// has been allocated yet.
    pub fn seed(&mut self, p: f64, rng: &SharedRng) -> Result<(), EvolveError> {
        self.check_alive()?;
        let dna = self.dna.as_mut().ok_or_else(|| {
            EvolveError::InvalidConfiguration("cannot seed an entity without DNA".into())
        })?;
        dna.seed(p, rng)
    }
}

impl<S: Species> Default for Entity<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromosome::{Chromosome, Gene};
    use std::sync::atomic::AtomicUsize;

    /// Maximizes the sum of one int chromosome; counts evaluations so
    /// tests can assert caching.
    struct SumSpecies {
        evaluations: AtomicUsize,
    }

    impl SumSpecies {
        fn new() -> Self {
            Self {
                evaluations: AtomicUsize::new(0),
            }
        }
    }

    impl Species for SumSpecies {
        type Phenotype = Vec<i32>;

        fn create_dna(&self) -> Result<Dna, EvolveError> {
            let mut dna = Dna::new();
            dna.add("genes", Chromosome::int(4, 0, 9)?)?;
            Ok(dna)
        }

        fn express(&self, dna: &Dna) -> Result<Self::Phenotype, EvolveError> {
            let c = dna.get("genes").ok_or_else(|| {
                EvolveError::InvalidConfiguration("missing chromosome".into())
            })?;
            (0..c.len())
                .map(|i| match c.gene(i)? {
                    Gene::Int(v) => Ok(v),
                    other => Err(EvolveError::ShapeMismatch(format!("{other:?}"))),
                })
                .collect()
        }

        fn evaluate(&self, phenotype: &Self::Phenotype, _dna: &Dna) -> Result<f64, EvolveError> {
            self.evaluations.fetch_add(1, Ordering::Relaxed);
            Ok(f64::from(phenotype.iter().sum::<i32>()))
        }
    }

    #[test]
    fn test_state_progression() {
        let species = SumSpecies::new();
        let mut e: Entity<SumSpecies> = Entity::new();
        assert_eq!(e.state(), EntityState::Created);
        e.init(&species).unwrap();
        assert_eq!(e.state(), EntityState::Initialised);
        e.load(&species).unwrap();
        assert_eq!(e.state(), EntityState::Loaded);
        e.ensure_fitness(&species).unwrap();
        assert_eq!(e.state(), EntityState::Ready);
    }

    #[test]
    fn test_ensure_fitness_is_cached() {
        let species = SumSpecies::new();
        let mut e: Entity<SumSpecies> = Entity::new();
        let first = e.ensure_fitness(&species).unwrap();
        let second = e.ensure_fitness(&species).unwrap();
        assert_eq!(first, second);
        assert_eq!(species.evaluations.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_dna_mutation_invalidates_fitness() {
        let species = SumSpecies::new();
        let mut e: Entity<SumSpecies> = Entity::new();
        e.ensure_fitness(&species).unwrap();
        e.dna_mut()
            .unwrap()
            .get_mut("genes")
            .unwrap()
            .set(0, Gene::Int(9))
            .unwrap();
        assert_eq!(e.state(), EntityState::Loaded);
        let f = e.ensure_fitness(&species).unwrap();
        assert!((f - 9.0).abs() < 1e-12);
        assert_eq!(species.evaluations.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_free_and_recycle() {
        let species = SumSpecies::new();
        let mut e: Entity<SumSpecies> = Entity::new();
        e.ensure_fitness(&species).unwrap();
        e.mark_free();
        assert_eq!(e.state(), EntityState::Free);
        assert!(e.dna().is_none());
        assert!(matches!(e.init(&species), Err(EvolveError::Disposed)));

        e.mark_created();
        assert_eq!(e.state(), EntityState::Created);
        e.ensure_fitness(&species).unwrap();
        assert_eq!(e.state(), EntityState::Ready);
    }

    #[test]
    fn test_clone_assigns_fresh_id() {
        let species = SumSpecies::new();
        let mut e: Entity<SumSpecies> = Entity::new();
        e.ensure_fitness(&species).unwrap();
        let copy = e.clone();
        assert_ne!(e.id(), copy.id());
        assert_eq!(e.fitness(), copy.fitness());
        assert_eq!(e.dna(), copy.dna());
    }

    #[test]
    fn test_copy_from_keeps_own_id() {
        let species = SumSpecies::new();
        let mut a: Entity<SumSpecies> = Entity::new();
        a.ensure_fitness(&species).unwrap();
        let mut b: Entity<SumSpecies> = Entity::new();
        let b_id = b.id();
        b.copy_from(&a);
        assert_eq!(b.id(), b_id);
        assert_eq!(b.state(), a.state());
        assert_eq!(b.fitness(), a.fitness());
    }

    #[test]
    fn test_set_fitness_forces_ready() {
        let mut e: Entity<SumSpecies> = Entity::new();
        e.set_fitness(3.5);
        assert_eq!(e.state(), EntityState::Ready);
        assert_eq!(e.fitness(), Some(3.5));
        e.set_fitness(3.5);
        assert_eq!(e.state(), EntityState::Ready);
    }
}
