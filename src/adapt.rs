//! Adaption operators: per-generation local search.
//!
//! An adaption operator takes the current best entity and runs a bounded
//! inner optimization over its DNA: hill climbing (systematic or random
//! walk), simulated annealing with a configurable temperature schedule and
//! acceptance rule, or a steepest-ascent gradient walk over the double
//! genes. Whether the improved genotype or only its score flows back into
//! the population is decided by the caller (Lamarckian vs Baldwinian
//! evolution, see [`Evolution`](crate::settings::Evolution)).

use serde::{Deserialize, Serialize};

use crate::chromosome::{Direction, Gene};
use crate::entity::{Entity, Species};
use crate::error::EvolveError;
use crate::mutate::pick_gene;
use crate::rng::SharedRng;
use crate::vector;

/// Boltzmann constant used by the annealing acceptance rule.
const BOLTZMANN_K: f64 = 1.380_66e-23;

/// Step scales below this count as numerically zero.
const STEP_EPSILON: f64 = 1e-12;

/// Temperature schedule for simulated annealing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TemperatureSchedule {
    /// `T(i) = start + (i / N) * (end - start)` over `N` iterations.
    Linear { start: f64, end: f64 },
    /// `T -= step` every `frequency` iterations while `T > floor`.
    Step {
        start: f64,
        step: f64,
        frequency: usize,
        floor: f64,
    },
}

/// Acceptance rule for simulated annealing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Acceptance {
    /// Accept when `best < putative + T`.
    Linear,
    /// Accept with probability `exp((putative - best) / (k * T))`.
    Boltzmann,
}

/// Local-search strategy run inside a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdaptionOp {
    /// Walk chromosome/gene indices in lockstep, drifting one allele per
    /// step (gene index wraps to 0 and advances the chromosome; the
    /// chromosome wraps back to 0).
    NextAscent,
    /// Drift one uniformly-picked allele per step.
    RandomAscent,
    /// Simulated annealing over single-allele moves.
    Annealing {
        schedule: TemperatureSchedule,
        acceptance: Acceptance,
    },
    /// Gradient walk over the double genes: step `alpha` grows by `beta`
    /// on acceptance and halves on rejection.
    SteepestAscent { alpha: f64, beta: f64 },
}

impl AdaptionOp {
    /// Run the inner optimization, replacing `best` whenever a putative
    /// entity is accepted. Returns the number of iterations spent; running
    /// short signals internal termination (step underflow), which is a
    /// normal outcome rather than an error.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` when the operator has nothing to work on
    /// (no DNA, or no double genes for the gradient walk); evaluation
    /// errors propagate.
    pub fn optimise<S: Species>(
        &self,
        species: &S,
        rng: &SharedRng,
        best: &mut Entity<S>,
        max_iterations: usize,
    ) -> Result<usize, EvolveError> {
        best.ensure_fitness(species)?;
        if best.dna().is_none_or(|dna| dna.gene_count() == 0) {
            return Ok(0);
        }
        match self {
            Self::NextAscent => next_ascent(species, rng, best, max_iterations),
            Self::RandomAscent => random_ascent(species, rng, best, max_iterations),
            Self::Annealing {
                schedule,
                acceptance,
            } => annealing(species, rng, best, max_iterations, *schedule, *acceptance),
            Self::SteepestAscent { alpha, beta } => {
                steepest_ascent(species, rng, best, max_iterations, *alpha, *beta)
            }
        }
    }
}

fn fitness_of<S: Species>(entity: &Entity<S>) -> f64 {
    entity.fitness().unwrap_or(f64::NEG_INFINITY)
}

/// Build a putative entity by drifting one allele of `best`.
fn drift_putative<S: Species>(
    species: &S,
    rng: &SharedRng,
    best: &Entity<S>,
    chromosome: usize,
    gene: usize,
) -> Result<Entity<S>, EvolveError> {
    let mut putative = best.clone();
    let direction = if rng.random_prob(0.5)? {
        Direction::Up
    } else {
        Direction::Down
    };
    let dna = putative.dna_mut().ok_or_else(|| {
        EvolveError::InvalidConfiguration("adaption requires an initialised entity".into())
    })?;
    dna.at_mut(chromosome)
        .ok_or_else(|| EvolveError::index(chromosome, 0))?
        .mutate_drift(gene, direction)?;
    putative.ensure_fitness(species)?;
    Ok(putative)
}

fn next_ascent<S: Species>(
    species: &S,
    rng: &SharedRng,
    best: &mut Entity<S>,
    max_iterations: usize,
) -> Result<usize, EvolveError> {
    // Start the lockstep walk on the first non-empty chromosome.
    let first_occupied = |dna: &crate::dna::Dna, from: usize| -> usize {
        let mut index = from;
        loop {
            if index >= dna.len() {
                index = 0;
            }
            if dna.at(index).is_some_and(|c| !c.is_empty()) {
                return index;
            }
            index += 1;
        }
    };
    let mut chromosome = first_occupied(best.dna().ok_or(EvolveError::Disposed)?, 0);
    let mut gene = 0usize;

    for _ in 0..max_iterations {
        let putative = drift_putative(species, rng, best, chromosome, gene)?;
        if fitness_of(&putative) > fitness_of(best) {
            *best = putative;
        }

        // Lockstep walk: allele first, chromosome on wrap.
        let dna = best.dna().ok_or(EvolveError::Disposed)?;
        gene += 1;
        if gene >= dna.at(chromosome).map_or(0, crate::chromosome::Chromosome::len) {
            gene = 0;
            chromosome = first_occupied(dna, chromosome + 1);
        }
    }
    Ok(max_iterations)
}

fn random_ascent<S: Species>(
    species: &S,
    rng: &SharedRng,
    best: &mut Entity<S>,
    max_iterations: usize,
) -> Result<usize, EvolveError> {
    for _ in 0..max_iterations {
        let dna = best.dna().ok_or(EvolveError::Disposed)?;
        let Some((chromosome, gene)) = pick_gene(dna, rng)? else {
            return Ok(0);
        };
        let mut putative = best.clone();
        let putative_dna = putative.dna_mut().ok_or(EvolveError::Disposed)?;
        putative_dna
            .at_mut(chromosome)
            .ok_or_else(|| EvolveError::index(chromosome, 0))?
            .mutate_random(gene, rng)?;
        putative.ensure_fitness(species)?;
        if fitness_of(&putative) > fitness_of(best) {
            *best = putative;
        }
    }
    Ok(max_iterations)
}

fn annealing<S: Species>(
    species: &S,
    rng: &SharedRng,
    best: &mut Entity<S>,
    max_iterations: usize,
    schedule: TemperatureSchedule,
    acceptance: Acceptance,
) -> Result<usize, EvolveError> {
    let mut step_temp = match schedule {
        TemperatureSchedule::Step { start, .. } => start,
        TemperatureSchedule::Linear { .. } => 0.0,
    };
    for iteration in 0..max_iterations {
        let temperature = match schedule {
            TemperatureSchedule::Linear { start, end } => {
                start + (iteration as f64 / max_iterations as f64) * (end - start)
            }
            TemperatureSchedule::Step {
                step,
                frequency,
                floor,
                ..
            } => {
                if iteration > 0 && frequency > 0 && iteration % frequency == 0 && step_temp > floor
                {
                    step_temp -= step;
                }
                step_temp
            }
        };

        let dna = best.dna().ok_or(EvolveError::Disposed)?;
        let Some((chromosome, gene)) = pick_gene(dna, rng)? else {
            return Ok(0);
        };
        let putative = drift_putative(species, rng, best, chromosome, gene)?;

        let best_f = fitness_of(best);
        let putative_f = fitness_of(&putative);
        let accept = match acceptance {
            Acceptance::Linear => best_f < putative_f + temperature,
            Acceptance::Boltzmann => {
                if temperature <= 0.0 {
                    putative_f > best_f
                } else {
                    let p = ((putative_f - best_f) / (BOLTZMANN_K * temperature)).exp();
                    rng.next_double() < p
                }
            }
        };
        if accept {
            *best = putative;
        }
    }
    Ok(max_iterations)
}

/// Flatten the double genes of an entity in chromosome order.
fn double_state<S: Species>(entity: &Entity<S>) -> Result<Vec<f64>, EvolveError> {
    let dna = entity.dna().ok_or(EvolveError::Disposed)?;
    let mut state = Vec::new();
    for (_, chromosome) in dna.iter() {
        if let Some(genes) = chromosome.double_genes() {
            state.extend_from_slice(genes);
        }
    }
    Ok(state)
}

/// Write a flat double vector back through the bounded setters.
fn write_double_state<S: Species>(entity: &mut Entity<S>, state: &[f64]) -> Result<(), EvolveError> {
    let dna = entity.dna_mut().ok_or(EvolveError::Disposed)?;
    let mut cursor = 0usize;
    for (_, chromosome) in dna.iter_mut() {
        if chromosome.double_genes().is_none() {
            continue;
        }
        for gene in 0..chromosome.len() {
            let value = *state
                .get(cursor)
                .ok_or_else(|| EvolveError::index(cursor, state.len()))?;
            chromosome.set(gene, Gene::Double(value))?;
            cursor += 1;
        }
    }
    Ok(())
}

fn steepest_ascent<S: Species>(
    species: &S,
    rng: &SharedRng,
    best: &mut Entity<S>,
    max_iterations: usize,
    alpha0: f64,
    beta: f64,
) -> Result<usize, EvolveError> {
    let mut state = double_state(best)?;
    if state.is_empty() {
        return Err(EvolveError::InvalidConfiguration(
            "steepest ascent requires double chromosomes".into(),
        ));
    }
    let mut gradient = vec![1.0; state.len()];
    let mut alpha = alpha0;
    let mut iterations = 0usize;

    while iterations < max_iterations {
        iterations += 1;

        let mut candidate = gradient.clone();
        vector::scale(&mut candidate, alpha);
        let candidate = vector::add(&state, &candidate)?;

        let mut putative = best.clone();
        write_double_state(&mut putative, &candidate)?;
        putative.ensure_fitness(species)?;

        if fitness_of(&putative) > fitness_of(best) {
            // Commit: the realized (clamped) move becomes the new ascent
            // direction and the step grows.
            let new_state = double_state(&putative)?;
            gradient = vector::sub(&new_state, &state)?;
            state = new_state;
            *best = putative;
            alpha *= beta;
        } else {
            alpha *= 0.5;
            if alpha < STEP_EPSILON {
                if vector::norm(&gradient) < STEP_EPSILON {
                    break;
                }
                // Step underflow with a stale direction: redraw a fresh
                // ascent direction and restart the step scale.
                for g in &mut gradient {
                    *g = rng.next_double() * 2.0 - 1.0;
                }
                alpha = alpha0;
            }
        }
    }
    Ok(iterations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromosome::Chromosome;
    use crate::dna::Dna;

    /// One int chromosome; fitness is the sum of its genes.
    struct SumSpecies;

    impl Species for SumSpecies {
        type Phenotype = ();

        fn create_dna(&self) -> Result<Dna, EvolveError> {
            let mut dna = Dna::new();
            dna.add("genes", Chromosome::int(4, 0, 9)?)?;
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

    /// One double chromosome; fitness is `-sum((x - 0.5)^2)`.
    struct BowlSpecies;

    impl Species for BowlSpecies {
        type Phenotype = ();

        fn create_dna(&self) -> Result<Dna, EvolveError> {
            let mut dna = Dna::new();
            dna.add("x", Chromosome::double(3, 0.0, 1.0, 0.05)?)?;
            Ok(dna)
        }

        fn express(&self, _dna: &Dna) -> Result<(), EvolveError> {
            Ok(())
        }

        fn evaluate(&self, _phenotype: &(), dna: &Dna) -> Result<f64, EvolveError> {
            let c = dna.get("x").ok_or(EvolveError::Disposed)?;
            let mut total = 0.0;
            for i in 0..c.len() {
                if let Gene::Double(v) = c.gene(i)? {
                    total -= (v - 0.5) * (v - 0.5);
                }
            }
            Ok(total)
        }
    }

    fn ready_entity<S: Species>(species: &S) -> Entity<S> {
        let mut e = Entity::new();
        e.ensure_fitness(species).unwrap();
        e
    }

    #[test]
    fn test_hill_climbers_never_worsen() {
        let rng = SharedRng::seeded(42);
        let species = SumSpecies;
        for op in [AdaptionOp::NextAscent, AdaptionOp::RandomAscent] {
            let mut best = ready_entity(&species);
            let before = best.fitness().unwrap();
            let spent = op.optimise(&species, &rng, &mut best, 50).unwrap();
            assert_eq!(spent, 50);
            assert!(best.fitness().unwrap() >= before);
        }
    }

    #[test]
    fn test_next_ascent_improves_sum() {
        // Genes start at the lower bound, so any upward drift improves;
        // 50 iterations of a 4-gene walk should gain plenty.
        let rng = SharedRng::seeded(7);
        let species = SumSpecies;
        let mut best = ready_entity(&species);
        AdaptionOp::NextAscent
            .optimise(&species, &rng, &mut best, 50)
            .unwrap();
        assert!(best.fitness().unwrap() > 0.0);
    }

    #[test]
    fn test_annealing_linear_acceptance() {
        let rng = SharedRng::seeded(13);
        let species = SumSpecies;
        let mut best = ready_entity(&species);
        let op = AdaptionOp::Annealing {
            schedule: TemperatureSchedule::Linear {
                start: 2.0,
                end: 0.0,
            },
            acceptance: Acceptance::Linear,
        };
        let spent = op.optimise(&species, &rng, &mut best, 100).unwrap();
        assert_eq!(spent, 100);
        assert!(best.fitness().is_some());
    }

    #[test]
    fn test_annealing_step_schedule() {
        let rng = SharedRng::seeded(5);
        let species = SumSpecies;
        let mut best = ready_entity(&species);
        let op = AdaptionOp::Annealing {
            schedule: TemperatureSchedule::Step {
                start: 1.0,
                step: 0.25,
                frequency: 5,
                floor: 0.0,
            },
            acceptance: Acceptance::Boltzmann,
        };
        op.optimise(&species, &rng, &mut best, 40).unwrap();
        assert!(best.fitness().is_some());
    }

    #[test]
    fn test_steepest_ascent_climbs_bowl() {
        let rng = SharedRng::seeded(42);
        let species = BowlSpecies;
        let mut best = ready_entity(&species);
        let before = best.fitness().unwrap();
        AdaptionOp::SteepestAscent {
            alpha: 0.1,
            beta: 1.5,
        }
        .optimise(&species, &rng, &mut best, 200)
        .unwrap();
        let after = best.fitness().unwrap();
        assert!(after > before, "no improvement: {before} -> {after}");
        // Optimum is 0 at x = 0.5 everywhere.
        assert!(after > -0.2, "far from optimum: {after}");
    }

    #[test]
    fn test_steepest_ascent_requires_doubles() {
        let rng = SharedRng::seeded(1);
        let species = SumSpecies;
        let mut best = ready_entity(&species);
        let err = AdaptionOp::SteepestAscent {
            alpha: 0.1,
            beta: 1.5,
        }
        .optimise(&species, &rng, &mut best, 10)
        .unwrap_err();
        assert!(matches!(err, EvolveError::InvalidConfiguration(_)));
    }
}
