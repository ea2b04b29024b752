//! Mutation operators.
//!
//! A mutation child starts as a deep copy of its parent; the operator then
//! perturbs the child's genes in place. Drift mutations walk a gene ±1
//! within its bounds (wrapping), random mutations redraw it uniformly.

use serde::{Deserialize, Serialize};

use crate::chromosome::Direction;
use crate::dna::Dna;
use crate::error::EvolveError;
use crate::rng::SharedRng;

/// Per-gene drift probability of [`MutateOp::MultiDrift`].
const MULTI_DRIFT_PROB: f64 = 0.47;

/// Mutation strategy applied to one child per parent draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutateOp {
    /// Drift one uniformly-picked gene, direction drawn uniformly.
    SingleDrift,
    /// Pick one direction, then drift every gene with probability 0.47.
    MultiDrift,
    /// Redraw one uniformly-picked gene.
    SingleRandom,
    /// Per gene: 1/3 drift up, 1/3 drift down, 1/3 leave.
    MultiRandom,
}

impl MutateOp {
    /// Perturb the child in place.
    ///
    /// # Errors
    ///
    /// Propagates index/probability errors from the chromosome layer;
    /// these indicate engine bugs rather than recoverable conditions.
    pub fn apply(self, child: &mut Dna, rng: &SharedRng) -> Result<(), EvolveError> {
        match self {
            Self::SingleDrift => {
                let Some((chromosome, gene)) = pick_gene(child, rng)? else {
                    return Ok(());
                };
                let direction = random_direction(rng)?;
                child
                    .at_mut(chromosome)
                    .ok_or_else(|| EvolveError::index(chromosome, 0))?
                    .mutate_drift(gene, direction)
            }
            Self::MultiDrift => {
                let direction = random_direction(rng)?;
                for (_, chromosome) in child.iter_mut() {
                    for gene in 0..chromosome.len() {
                        if rng.random_prob(MULTI_DRIFT_PROB)? {
                            chromosome.mutate_drift(gene, direction)?;
                        }
                    }
                }
                Ok(())
            }
            Self::SingleRandom => {
                let Some((chromosome, gene)) = pick_gene(child, rng)? else {
                    return Ok(());
                };
                child
                    .at_mut(chromosome)
                    .ok_or_else(|| EvolveError::index(chromosome, 0))?
                    .mutate_random(gene, rng)
            }
            Self::MultiRandom => {
                for (_, chromosome) in child.iter_mut() {
                    for gene in 0..chromosome.len() {
                        match rng.next_below(3)? {
                            0 => chromosome.mutate_drift(gene, Direction::Up)?,
                            1 => chromosome.mutate_drift(gene, Direction::Down)?,
                            _ => {}
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

fn random_direction(rng: &SharedRng) -> Result<Direction, EvolveError> {
    Ok(if rng.random_prob(0.5)? {
        Direction::Up
    } else {
        Direction::Down
    })
}

/// Uniformly pick one gene across all non-empty chromosomes, or `None`
/// when the bundle has no genes at all.
pub(crate) fn pick_gene(dna: &Dna, rng: &SharedRng) -> Result<Option<(usize, usize)>, EvolveError> {
    let candidates: Vec<usize> = (0..dna.len())
        .filter(|&i| dna.at(i).is_some_and(|c| !c.is_empty()))
        .collect();
    if candidates.is_empty() {
        return Ok(None);
    }
    let chromosome = candidates[rng.next_below(candidates.len())?];
    let length = dna.at(chromosome).map_or(0, crate::chromosome::Chromosome::len);
    let gene = rng.next_below(length)?;
    Ok(Some((chromosome, gene)))
}
