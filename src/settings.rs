//! Population configuration.
//!
//! [`PopulationSettings`] bundles every knob of the generation loop:
//! ratios, genesis/elitism/evolution modes, the strategy plug points, and
//! the observer callbacks. Settings are cheap to clone (handlers are
//! reference-counted) and validated once when a population is built.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapt::AdaptionOp;
use crate::crossover::CrossoverOp;
use crate::error::EvolveError;
use crate::mutate::MutateOp;
use crate::select::{EntitySelector, PairSelector};

/// How the initial population's genes are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Genesis {
    /// Seed every chromosome uniformly over its universe.
    Random,
    /// Midpoint seeding followed by one whole-genome random-mutation pass
    /// (a primordial soup).
    Soup,
    /// Take the DNA exactly as the species hook returned it.
    User,
}

/// Whether and where local search feeds back into the population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evolution {
    /// No adaption.
    Darwin,
    /// Adapted genotype replaces entities in `[0, original_count)`.
    LamarckParents,
    /// Adapted genotype replaces entities in `[original_count, len)`.
    LamarckChildren,
    /// Adapted genotype replaces every entity.
    LamarckAll,
    /// Adapted score (only) is written back for parents.
    BaldwinParents,
    /// Adapted score (only) is written back for children.
    BaldwinChildren,
    /// Adapted score (only) is written back for every entity.
    BaldwinAll,
}

impl Evolution {
    /// Whether the mode touches entities below `original_count`.
    #[must_use]
    pub fn applies_to_parents(self) -> bool {
        matches!(
            self,
            Self::LamarckParents | Self::LamarckAll | Self::BaldwinParents | Self::BaldwinAll
        )
    }

    /// Whether the mode touches entities at or above `original_count`.
    #[must_use]
    pub fn applies_to_children(self) -> bool {
        matches!(
            self,
            Self::LamarckChildren | Self::LamarckAll | Self::BaldwinChildren | Self::BaldwinAll
        )
    }

    /// Whether the adapted genotype itself is inherited.
    #[must_use]
    pub fn is_lamarckian(self) -> bool {
        matches!(
            self,
            Self::LamarckParents | Self::LamarckChildren | Self::LamarckAll
        )
    }
}

/// Parent treatment during survival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Elitism {
    /// Parents compete with children on fitness alone.
    None,
    /// Parents are left intact before the trim (explicit spelling of the
    /// default behavior).
    ParentsSurvive,
    /// Only the first parent is kept; the rest are removed.
    OneParentSurvives,
    /// All parents are removed before the trim.
    ParentsDie,
    /// Parents' cached fitness is dropped so survival re-scores them.
    RescoreParents,
}

/// Per-generation summary handed to the generation observer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Generation counter, starting at 1.
    pub generation: usize,
    /// Entity count after survival.
    pub size: usize,
    /// Best fitness in the population.
    pub best: f64,
    /// Worst fitness in the population.
    pub worst: f64,
    /// Mean fitness.
    pub mean: f64,
    /// Population standard deviation of fitness.
    pub std_dev: f64,
}

/// Periodic generation observer; returning `false` stops the evolve loop.
pub type GenerationHandler = Arc<dyn Fn(&GenerationStats) -> bool + Send + Sync>;

/// Observer invoked after each fitness evaluation with `(entity_id, fitness)`.
pub type FitnessHandler = Arc<dyn Fn(u64, f64) + Send + Sync>;

/// Configuration consumed by a [`Population`](crate::population::Population).
#[derive(Clone)]
pub struct PopulationSettings {
    /// Target entity count after survival.
    pub stable_size: usize,
    /// Generation cap unless `steady_state`.
    pub max_generations: usize,
    /// Ignore `max_generations` and run until stopped.
    pub steady_state: bool,
    /// Fire the generation observer every Nth generation.
    pub evolution_event_interval: usize,
    /// Gate probability for the crossover phase and draw quota for its
    /// selectors.
    pub crossover_ratio: f64,
    /// Same role for mutation.
    pub mutation_ratio: f64,
    /// Same role for migration.
    pub migration_ratio: f64,
    /// Initial seeding mode.
    pub genesis: Genesis,
    /// Adaption feedback mode.
    pub evolution: Evolution,
    /// Parent treatment during survival.
    pub elitism: Elitism,
    /// Iteration cap for adaption operators.
    pub max_adaption_iterations: usize,
    /// Soft capacity of the free-entity pool.
    pub free_pool_capacity: usize,
    /// Seed for the population's RNG; `None` draws from OS entropy.
    pub rng_seed: Option<u64>,
    /// Mutation-parent selector.
    pub select_one: EntitySelector,
    /// Crossover-pair selector.
    pub select_two: PairSelector,
    /// Outbound-migrant selector.
    pub migration_selector: EntitySelector,
    /// Crossover operator; required while `crossover_ratio > 0`.
    pub crossover: Option<CrossoverOp>,
    /// Mutation operator; required while `mutation_ratio > 0`.
    pub mutate: Option<MutateOp>,
    /// Adaption operator; required unless `evolution` is `Darwin`.
    pub adaption: Option<AdaptionOp>,
    /// Periodic generation observer.
    pub generation_handler: Option<GenerationHandler>,
    /// Per-evaluation observer.
    pub fitness_handler: Option<FitnessHandler>,
}

impl Default for PopulationSettings {
    fn default() -> Self {
        Self {
            stable_size: 100,
            max_generations: 100,
            steady_state: false,
            evolution_event_interval: 10,
            crossover_ratio: 0.75,
            mutation_ratio: 0.2,
            migration_ratio: 0.1,
            genesis: Genesis::Random,
            evolution: Evolution::Darwin,
            elitism: Elitism::None,
            max_adaption_iterations: 20,
            free_pool_capacity: 5_000,
            rng_seed: None,
            select_one: EntitySelector::random(),
            select_two: PairSelector::random(),
            migration_selector: EntitySelector::random(),
            crossover: Some(CrossoverOp::SinglePoint),
            mutate: Some(MutateOp::SingleDrift),
            adaption: None,
            generation_handler: None,
            fitness_handler: None,
        }
    }
}

impl std::fmt::Debug for PopulationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopulationSettings")
            .field("stable_size", &self.stable_size)
            .field("max_generations", &self.max_generations)
            .field("steady_state", &self.steady_state)
            .field("crossover_ratio", &self.crossover_ratio)
            .field("mutation_ratio", &self.mutation_ratio)
            .field("migration_ratio", &self.migration_ratio)
            .field("genesis", &self.genesis)
            .field("evolution", &self.evolution)
            .field("elitism", &self.elitism)
            .finish_non_exhaustive()
    }
}

impl PopulationSettings {
    /// Check option consistency before a population is built.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for ratios outside `[0, 1]` or a zero stable
    /// size; `InvalidConfiguration` when a gated phase lacks its operator.
    pub fn validate(&self) -> Result<(), EvolveError> {
        for (name, ratio) in [
            ("crossover_ratio", self.crossover_ratio),
            ("mutation_ratio", self.mutation_ratio),
            ("migration_ratio", self.migration_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(EvolveError::ArgumentOutOfRange(format!(
                    "{name} {ratio} outside [0, 1]"
                )));
            }
        }
        if self.stable_size == 0 {
            return Err(EvolveError::ArgumentOutOfRange(
                "stable_size must be positive".into(),
            ));
        }
        if self.crossover_ratio > 0.0 && self.crossover.is_none() {
            return Err(EvolveError::InvalidConfiguration(
                "crossover_ratio > 0 but no crossover operator is wired".into(),
            ));
        }
        if self.mutation_ratio > 0.0 && self.mutate.is_none() {
            return Err(EvolveError::InvalidConfiguration(
                "mutation_ratio > 0 but no mutation operator is wired".into(),
            ));
        }
        if self.evolution != Evolution::Darwin && self.adaption.is_none() {
            return Err(EvolveError::InvalidConfiguration(
                "non-Darwin evolution requires an adaption operator".into(),
            ));
        }
        Ok(())
    }
}
