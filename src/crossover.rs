//! Crossover operators.
//!
//! The engine seeds each child as a deep copy of one parent (son from
//! mother, daughter from father), then the operator exchanges gene ranges
//! between the two children chromosome by chromosome. No gene value is
//! ever invented: every child gene comes from one of the parents at the
//! same index.

use serde::{Deserialize, Serialize};

use crate::dna::Dna;
use crate::error::EvolveError;
use crate::rng::SharedRng;

/// Recombination strategy applied to a (son, daughter) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossoverOp {
    /// One cut `c` in `[1, L)` per chromosome; the tails `[c, L)` swap.
    SinglePoint,
    /// Two distinct cuts `c1 < c2`; the window `[c1, c2)` swaps.
    DoublePoint,
    /// Whole chromosomes swap with probability 1/4 each.
    Mixing,
}

impl CrossoverOp {
    /// Exchange genetic material between the two children.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` when the children disagree in chromosome count or
    /// any chromosome pair disagrees in kind, length, or bounds.
    pub fn apply(
        self,
        son: &mut Dna,
        daughter: &mut Dna,
        rng: &SharedRng,
    ) -> Result<(), EvolveError> {
        if !son.same_shape(daughter) {
            return Err(EvolveError::ShapeMismatch(
                "crossover parents carry different chromosome shapes".into(),
            ));
        }
        for index in 0..son.len() {
            let length = son.at(index).map_or(0, crate::chromosome::Chromosome::len);
            match self {
                Self::SinglePoint => {
                    if length < 2 {
                        continue;
                    }
                    let cut = rng.next_range(1, length as i64)? as usize;
                    swap_range(son, daughter, index, cut, length)?;
                }
                Self::DoublePoint => {
                    if length < 2 {
                        continue;
                    }
                    let a = rng.next_below(length)?;
                    let b = rng.next_except(length, &[a])?;
                    let (c1, c2) = if a < b { (a, b) } else { (b, a) };
                    swap_range(son, daughter, index, c1, c2)?;
                }
                Self::Mixing => {
                    // Drawn as nextInt(4) > 2: a 1-in-4 chromosome swap.
                    if rng.next_below(4)? > 2 {
                        swap_range(son, daughter, index, 0, length)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Swap genes `[start, end)` of chromosome `index` between the two
/// bundles, honoring gene locks on both sides.
fn swap_range(
    son: &mut Dna,
    daughter: &mut Dna,
    index: usize,
    start: usize,
    end: usize,
) -> Result<(), EvolveError> {
    let son_chrom = son
        .at(index)
        .ok_or_else(|| EvolveError::index(index, son.len()))?
        .clone();
    let daughter_len = daughter.len();
    let daughter_chrom = daughter
        .at_mut(index)
        .ok_or_else(|| EvolveError::index(index, daughter_len))?;
    let daughter_before = daughter_chrom.clone();
    daughter_chrom.copy_range_from(&son_chrom, start, end)?;
    let son_len = son.len();
    son.at_mut(index)
        .ok_or_else(|| EvolveError::index(index, son_len))?
        .copy_range_from(&daughter_before, start, end)?;
    Ok(())
}
