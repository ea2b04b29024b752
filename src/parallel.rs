//! Parallel population: the generation loop with pooled workers.
//!
//! Candidate gathering stays on the calling thread (selector draws are
//! strictly ordered), while the physical crossover, mutation, and fitness
//! evaluation fan out over a dedicated rayon pool. With a single worker
//! thread and a seeded RNG the results are identical to the sequential
//! [`Population`].

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::entity::Species;
use crate::error::EvolveError;
use crate::population::{CancelToken, Population, StepOutcome};
use crate::settings::PopulationSettings;

/// [`PopulationSettings`] plus the worker-pool width.
#[derive(Debug, Clone)]
pub struct ParallelSettings {
    /// The sequential option set.
    pub base: PopulationSettings,
    /// Worker threads for evaluation and operator application.
    pub thread_count: usize,
}

impl Default for ParallelSettings {
    fn default() -> Self {
        Self {
            base: PopulationSettings::default(),
            thread_count: 4,
        }
    }
}

/// A population whose heavy phases run on a worker pool.
pub struct ParallelPopulation<S: Species> {
    inner: Population<S>,
    pool: rayon::ThreadPool,
}

impl<S: Species> ParallelPopulation<S> {
    /// Build the population and its worker pool.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for a zero thread count;
    /// `InvalidConfiguration` when the pool cannot be built; settings and
    /// genesis errors as for [`Population::new`].
    pub fn new(species: Arc<S>, settings: ParallelSettings) -> Result<Self, EvolveError> {
        if settings.thread_count == 0 {
            return Err(EvolveError::ArgumentOutOfRange(
                "thread_count must be positive".into(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.thread_count)
            .build()
            .map_err(|err| EvolveError::InvalidConfiguration(err.to_string()))?;
        Ok(Self {
            inner: Population::new(species, settings.base)?,
            pool,
        })
    }

    /// Run a single generation on the worker pool.
    ///
    /// # Errors
    ///
    /// As for [`Population::step`].
    pub fn step(&mut self, token: &CancelToken) -> Result<StepOutcome, EvolveError> {
        self.inner.step_with_pool(Some(&self.pool), token)
    }

    /// Run the generation loop until the stop condition or cancellation.
    ///
    /// # Errors
    ///
    /// As for [`Population::evolve`].
    pub fn evolve(&mut self, token: &CancelToken) -> Result<(), EvolveError> {
        while self.step(token)? == StepOutcome::Continue {}
        Ok(())
    }
}

impl<S: Species> Deref for ParallelPopulation<S> {
    type Target = Population<S>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<S: Species> DerefMut for ParallelPopulation<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromosome::{Chromosome, Gene};
    use crate::dna::Dna;

    struct SumSpecies;

    impl Species for SumSpecies {
        type Phenotype = ();

        fn create_dna(&self) -> Result<Dna, EvolveError> {
            let mut dna = Dna::new();
            dna.add("genes", Chromosome::int(6, 0, 9)?)?;
            Ok(dna)
        }

        fn express(&self, _dna: &Dna) -> Result<(), EvolveError> {
            Ok(())
        }

        fn evaluate(&self, _phenotype: &(), dna: &Dna) -> Result<f64, EvolveError> {
            let c = dna.get("genes").ok_or(EvolveError::Disposed)?;
            let mut total = 0.0;
            for i in 0..c.len() {
                if let Gene::Int(v) = c.gene(i)? {
                    total += f64::from(v);
                }
            }
            Ok(total)
        }
    }

    fn seeded(seed: u64) -> PopulationSettings {
        PopulationSettings {
            stable_size: 16,
            max_generations: 6,
            rng_seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_thread_matches_sequential() {
        // Identical seeds and a one-thread pool: the parallel variant must
        // reproduce the sequential population exactly.
        let token = CancelToken::new();

        let mut sequential = Population::new(Arc::new(SumSpecies), seeded(42)).unwrap();
        sequential.evolve(&token).unwrap();

        let mut parallel = ParallelPopulation::new(
            Arc::new(SumSpecies),
            ParallelSettings {
                base: seeded(42),
                thread_count: 1,
            },
        )
        .unwrap();
        parallel.evolve(&token).unwrap();

        let sequential_state: Vec<(Option<f64>, Option<Dna>)> = sequential
            .entities()
            .map(|e| (e.fitness(), e.dna().cloned()))
            .collect();
        let parallel_state: Vec<(Option<f64>, Option<Dna>)> = parallel
            .entities()
            .map(|e| (e.fitness(), e.dna().cloned()))
            .collect();
        assert_eq!(sequential_state, parallel_state);
    }

    #[test]
    fn test_multi_thread_preserves_invariants() {
        let token = CancelToken::new();
        let mut population = ParallelPopulation::new(
            Arc::new(SumSpecies),
            ParallelSettings {
                base: seeded(7),
                thread_count: 4,
            },
        )
        .unwrap();
        population.evolve(&token).unwrap();
        assert_eq!(population.len(), 16);
        let fitnesses: Vec<f64> = population
            .entities()
            .map(|e| e.fitness().unwrap())
            .collect();
        for pair in fitnesses.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn test_zero_threads_rejected() {
        let result = ParallelPopulation::new(
            Arc::new(SumSpecies),
            ParallelSettings {
                base: seeded(1),
                thread_count: 0,
            },
        );
        assert!(matches!(
            result,
            Err(EvolveError::ArgumentOutOfRange(_))
        ));
    }
}
