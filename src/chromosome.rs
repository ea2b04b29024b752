//! Chromosome types: fixed-length typed gene sequences.
//!
//! A [`Chromosome`] is a tagged variant over the supported gene primitives
//! (bool, char, i16, i32, f64) with a shared mutation surface: seeding,
//! drift mutation (a ±1 walk that wraps at the value bounds), and random
//! resets. Numeric variants carry inclusive `[min, max]` bounds and every
//! stored gene stays inside them; the double variant additionally carries a
//! per-chromosome drift step and clamps rather than wraps.
//!
//! Locking is orthogonal: an optional bit per gene that turns sets and
//! mutations at that index into no-ops.

use serde::{Deserialize, Serialize};

use crate::error::EvolveError;
use crate::rng::SharedRng;

/// Printable-ASCII gene universe for char chromosomes: `[' ', '~']`.
const CHAR_MIN: char = ' ';
const CHAR_MAX: char = '~';

/// Direction of a drift mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Step towards the upper bound (wrapping past it).
    Up,
    /// Step towards the lower bound (wrapping past it).
    Down,
}

/// A single gene value, tagged by primitive kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gene {
    Bool(bool),
    Char(char),
    Short(i16),
    Int(i32),
    Double(f64),
}

/// Discriminant of a chromosome's gene primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChromosomeKind {
    Bool,
    Char,
    Short,
    Int,
    Double,
}

/// Typed gene storage with per-kind parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum GeneSeq {
    Bool(Vec<bool>),
    Char(Vec<char>),
    Short {
        min: i16,
        max: i16,
        genes: Vec<i16>,
    },
    Int {
        min: i32,
        max: i32,
        genes: Vec<i32>,
    },
    Double {
        min: f64,
        max: f64,
        drift: f64,
        genes: Vec<f64>,
    },
}

impl GeneSeq {
    fn len(&self) -> usize {
        match self {
            Self::Bool(g) => g.len(),
            Self::Char(g) => g.len(),
            Self::Short { genes, .. } => genes.len(),
            Self::Int { genes, .. } => genes.len(),
            Self::Double { genes, .. } => genes.len(),
        }
    }
}

/// A fixed-length ordered sequence of genes of one primitive kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chromosome {
    seq: GeneSeq,
    /// Per-gene lock bits; `None` until the first `set_lock` call.
    locks: Option<Vec<bool>>,
}

impl Chromosome {
    /// Boolean chromosome of the given length, all genes `false`.
    #[must_use]
    pub fn bool(length: usize) -> Self {
        Self {
            seq: GeneSeq::Bool(vec![false; length]),
            locks: None,
        }
    }

    /// Char chromosome over the printable-ASCII universe, all genes `' '`.
    #[must_use]
    pub fn char(length: usize) -> Self {
        Self {
            seq: GeneSeq::Char(vec![CHAR_MIN; length]),
            locks: None,
        }
    }

    /// Short chromosome bounded by `[min, max]`, all genes `min`.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` if `min > max`.
    pub fn short(length: usize, min: i16, max: i16) -> Result<Self, EvolveError> {
        if min > max {
            return Err(EvolveError::ArgumentOutOfRange(format!(
                "short bounds [{min}, {max}] are inverted"
            )));
        }
        Ok(Self {
            seq: GeneSeq::Short {
                min,
                max,
                genes: vec![min; length],
            },
            locks: None,
        })
    }

    /// Int chromosome bounded by `[min, max]`, all genes `min`.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` if `min > max`.
    pub fn int(length: usize, min: i32, max: i32) -> Result<Self, EvolveError> {
        if min > max {
            return Err(EvolveError::ArgumentOutOfRange(format!(
                "int bounds [{min}, {max}] are inverted"
            )));
        }
        Ok(Self {
            seq: GeneSeq::Int {
                min,
                max,
                genes: vec![min; length],
            },
            locks: None,
        })
    }

    /// Double chromosome bounded by `[min, max]` with the given drift step,
    /// all genes `min`.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` if the bounds are inverted or non-finite, or if
    /// `drift` is negative or non-finite.
    pub fn double(length: usize, min: f64, max: f64, drift: f64) -> Result<Self, EvolveError> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(EvolveError::ArgumentOutOfRange(format!(
                "double bounds [{min}, {max}] are invalid"
            )));
        }
        if !drift.is_finite() || drift < 0.0 {
            return Err(EvolveError::ArgumentOutOfRange(format!(
                "drift step {drift} is invalid"
            )));
        }
        Ok(Self {
            seq: GeneSeq::Double {
                min,
                max,
                drift,
                genes: vec![min; length],
            },
            locks: None,
        })
    }

    /// Number of genes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    /// `true` when the chromosome has no genes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The primitive kind of this chromosome.
    #[must_use]
    pub fn kind(&self) -> ChromosomeKind {
        match &self.seq {
            GeneSeq::Bool(_) => ChromosomeKind::Bool,
            GeneSeq::Char(_) => ChromosomeKind::Char,
            GeneSeq::Short { .. } => ChromosomeKind::Short,
            GeneSeq::Int { .. } => ChromosomeKind::Int,
            GeneSeq::Double { .. } => ChromosomeKind::Double,
        }
    }

    fn check_index(&self, index: usize) -> Result<(), EvolveError> {
        if index < self.len() {
            Ok(())
        } else {
            Err(EvolveError::index(index, self.len()))
        }
    }

    /// Read the gene at `index`.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for an out-of-bounds index.
    pub fn gene(&self, index: usize) -> Result<Gene, EvolveError> {
        self.check_index(index)?;
        Ok(match &self.seq {
            GeneSeq::Bool(g) => Gene::Bool(g[index]),
            GeneSeq::Char(g) => Gene::Char(g[index]),
            GeneSeq::Short { genes, .. } => Gene::Short(genes[index]),
            GeneSeq::Int { genes, .. } => Gene::Int(genes[index]),
            GeneSeq::Double { genes, .. } => Gene::Double(genes[index]),
        })
    }

    /// Write the gene at `index`, coercing numeric values into the bounds
    /// and clamping chars into the printable universe. A locked index is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for an out-of-bounds index; `ShapeMismatch`
    /// when `value`'s kind does not match the chromosome's.
    pub fn set(&mut self, index: usize, value: Gene) -> Result<(), EvolveError> {
        self.check_index(index)?;
        if self.is_locked(index) {
            return Ok(());
        }
        let kind = self.kind();
        match (&mut self.seq, value) {
            (GeneSeq::Bool(g), Gene::Bool(v)) => g[index] = v,
            (GeneSeq::Char(g), Gene::Char(v)) => {
                g[index] = v.clamp(CHAR_MIN, CHAR_MAX);
            }
            (GeneSeq::Short { min, max, genes }, Gene::Short(v)) => {
                genes[index] = v.clamp(*min, *max);
            }
            (GeneSeq::Int { min, max, genes }, Gene::Int(v)) => {
                genes[index] = v.clamp(*min, *max);
            }
            (GeneSeq::Double { min, max, genes, .. }, Gene::Double(v)) => {
                genes[index] = v.clamp(*min, *max);
            }
            (_, value) => {
                return Err(EvolveError::ShapeMismatch(format!(
                    "gene {value:?} does not match chromosome kind {kind:?}"
                )));
            }
        }
        Ok(())
    }

    /// Seed every unlocked gene. For bool chromosomes each gene becomes
    /// `true` with probability `p`; the other kinds draw uniformly over
    /// their universe and ignore `p`.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` unless `0 <= p <= 1`.
    pub fn seed(&mut self, p: f64, rng: &SharedRng) -> Result<(), EvolveError> {
        if !(0.0..=1.0).contains(&p) {
            return Err(EvolveError::probability(p));
        }
        for i in 0..self.len() {
            if self.is_locked(i) {
                continue;
            }
            self.write_random(i, p, rng)?;
        }
        Ok(())
    }

    fn write_random(&mut self, index: usize, p: f64, rng: &SharedRng) -> Result<(), EvolveError> {
        match &mut self.seq {
            GeneSeq::Bool(g) => g[index] = rng.random_prob(p)?,
            GeneSeq::Char(g) => {
                let v = rng.next_range(CHAR_MIN as i64, CHAR_MAX as i64 + 1)?;
                g[index] = u8::try_from(v).map(char::from).unwrap_or(CHAR_MIN);
            }
            GeneSeq::Short { min, max, genes } => {
                genes[index] = rng.next_range(i64::from(*min), i64::from(*max) + 1)? as i16;
            }
            GeneSeq::Int { min, max, genes } => {
                genes[index] = rng.next_range(i64::from(*min), i64::from(*max) + 1)? as i32;
            }
            GeneSeq::Double { min, max, genes, .. } => {
                genes[index] = *min + rng.next_double() * (*max - *min);
            }
        }
        Ok(())
    }

    /// Drift-mutate the gene at `index`: a ±1 walk that wraps at the value
    /// bounds (bool flips, double steps by its drift and clamps). A locked
    /// index is a no-op.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for an out-of-bounds index.
    pub fn mutate_drift(&mut self, index: usize, direction: Direction) -> Result<(), EvolveError> {
        self.check_index(index)?;
        if self.is_locked(index) {
            return Ok(());
        }
        match &mut self.seq {
            GeneSeq::Bool(g) => g[index] = !g[index],
            GeneSeq::Char(g) => {
                g[index] = match direction {
                    Direction::Up if g[index] == CHAR_MAX => CHAR_MIN,
                    Direction::Up => char::from(g[index] as u8 + 1),
                    Direction::Down if g[index] == CHAR_MIN => CHAR_MAX,
                    Direction::Down => char::from(g[index] as u8 - 1),
                };
            }
            GeneSeq::Short { min, max, genes } => {
                genes[index] = match direction {
                    Direction::Up if genes[index] >= *max => *min,
                    Direction::Up => genes[index] + 1,
                    Direction::Down if genes[index] <= *min => *max,
                    Direction::Down => genes[index] - 1,
                };
            }
            GeneSeq::Int { min, max, genes } => {
                genes[index] = match direction {
                    Direction::Up if genes[index] >= *max => *min,
                    Direction::Up => genes[index] + 1,
                    Direction::Down if genes[index] <= *min => *max,
                    Direction::Down => genes[index] - 1,
                };
            }
            GeneSeq::Double {
                min,
                max,
                drift,
                genes,
            } => {
                let step = match direction {
                    Direction::Up => *drift,
                    Direction::Down => -*drift,
                };
                genes[index] = (genes[index] + step).clamp(*min, *max);
            }
        }
        Ok(())
    }

    /// Randomize the gene at `index` uniformly over its universe (bool uses
    /// probability 0.5). A locked index is a no-op.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for an out-of-bounds index.
    pub fn mutate_random(&mut self, index: usize, rng: &SharedRng) -> Result<(), EvolveError> {
        self.check_index(index)?;
        if self.is_locked(index) {
            return Ok(());
        }
        self.write_random(index, 0.5, rng)
    }

    /// Lock or unlock the gene at `index`. While locked, sets and mutations
    /// at that index are no-ops.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for an out-of-bounds index.
    pub fn set_lock(&mut self, index: usize, locked: bool) -> Result<(), EvolveError> {
        self.check_index(index)?;
        let len = self.seq.len();
        let locks = self.locks.get_or_insert_with(|| vec![false; len]);
        locks[index] = locked;
        Ok(())
    }

    /// Whether the gene at `index` is locked. Out-of-bounds reads as
    /// unlocked.
    #[must_use]
    pub fn is_locked(&self, index: usize) -> bool {
        self.locks
            .as_ref()
            .is_some_and(|locks| locks.get(index).copied().unwrap_or(false))
    }

    /// Change the length, keeping the first `min(old, new)` genes (and lock
    /// bits); new genes take the kind's default (bool `false`, char `' '`,
    /// numeric `min`).
    pub fn resize(&mut self, length: usize) {
        match &mut self.seq {
            GeneSeq::Bool(g) => g.resize(length, false),
            GeneSeq::Char(g) => g.resize(length, CHAR_MIN),
            GeneSeq::Short { min, genes, .. } => genes.resize(length, *min),
            GeneSeq::Int { min, genes, .. } => genes.resize(length, *min),
            GeneSeq::Double { min, genes, .. } => genes.resize(length, *min),
        }
        if let Some(locks) = &mut self.locks {
            locks.resize(length, false);
        }
    }

    /// Overwrite genes `[start, end)` with the corresponding genes of
    /// `other`, skipping locked indices. Both chromosomes must have the
    /// same kind, length, and bounds.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` when the chromosomes disagree in kind, length, or
    /// numeric bounds; `ArgumentOutOfRange` when the range is invalid.
    pub fn copy_range_from(
        &mut self,
        other: &Self,
        start: usize,
        end: usize,
    ) -> Result<(), EvolveError> {
        if start > end || end > self.len() {
            return Err(EvolveError::ArgumentOutOfRange(format!(
                "range [{start}, {end}) invalid for length {}",
                self.len()
            )));
        }
        if !self.same_shape(other) {
            return Err(EvolveError::ShapeMismatch(
                "chromosomes disagree in kind, length, or bounds".into(),
            ));
        }
        for i in start..end {
            let gene = other.gene(i)?;
            self.set(i, gene)?;
        }
        Ok(())
    }

    /// Whether two chromosomes can exchange genes: same kind, length, and
    /// numeric bounds.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        match (&self.seq, &other.seq) {
            (GeneSeq::Bool(a), GeneSeq::Bool(b)) => a.len() == b.len(),
            (GeneSeq::Char(a), GeneSeq::Char(b)) => a.len() == b.len(),
            (
                GeneSeq::Short {
                    min: amin,
                    max: amax,
                    genes: a,
                },
                GeneSeq::Short {
                    min: bmin,
                    max: bmax,
                    genes: b,
                },
            ) => a.len() == b.len() && amin == bmin && amax == bmax,
            (
                GeneSeq::Int {
                    min: amin,
                    max: amax,
                    genes: a,
                },
                GeneSeq::Int {
                    min: bmin,
                    max: bmax,
                    genes: b,
                },
            ) => a.len() == b.len() && amin == bmin && amax == bmax,
            (
                GeneSeq::Double {
                    min: amin,
                    max: amax,
                    genes: a,
                    ..
                },
                GeneSeq::Double {
                    min: bmin,
                    max: bmax,
                    genes: b,
                    ..
                },
            ) => a.len() == b.len() && amin == bmin && amax == bmax,
            _ => false,
        }
    }

    /// Genes of a double chromosome as a flat slice, or `None` for other
    /// kinds. Used by the gradient adaption operator.
    #[must_use]
    pub fn double_genes(&self) -> Option<&[f64]> {
        match &self.seq {
            GeneSeq::Double { genes, .. } => Some(genes),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> SharedRng {
        SharedRng::seeded(42)
    }

    #[test]
    fn test_int_drift_wraps_at_extremes() {
        // Range [-1, 1], gene = 1: drift Up wraps to -1; from -1, drift
        // Down wraps back to 1.
        let mut c = Chromosome::int(1, -1, 1).unwrap();
        c.set(0, Gene::Int(1)).unwrap();
        c.mutate_drift(0, Direction::Up).unwrap();
        assert_eq!(c.gene(0).unwrap(), Gene::Int(-1));
        c.mutate_drift(0, Direction::Down).unwrap();
        assert_eq!(c.gene(0).unwrap(), Gene::Int(1));
    }

    #[test]
    fn test_char_drift_wraps_universe() {
        let mut c = Chromosome::char(1);
        c.set(0, Gene::Char('~')).unwrap();
        c.mutate_drift(0, Direction::Up).unwrap();
        assert_eq!(c.gene(0).unwrap(), Gene::Char(' '));
        c.mutate_drift(0, Direction::Down).unwrap();
        assert_eq!(c.gene(0).unwrap(), Gene::Char('~'));
    }

    #[test]
    fn test_double_drift_clamps() {
        let mut c = Chromosome::double(1, 0.0, 1.0, 0.3).unwrap();
        c.set(0, Gene::Double(0.9)).unwrap();
        c.mutate_drift(0, Direction::Up).unwrap();
        assert_eq!(c.gene(0).unwrap(), Gene::Double(1.0));
        c.mutate_drift(0, Direction::Down).unwrap();
        let Gene::Double(v) = c.gene(0).unwrap() else {
            panic!("kind changed")
        };
        assert!((v - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_bool_drift_flips() {
        let mut c = Chromosome::bool(1);
        c.mutate_drift(0, Direction::Up).unwrap();
        assert_eq!(c.gene(0).unwrap(), Gene::Bool(true));
        c.mutate_drift(0, Direction::Down).unwrap();
        assert_eq!(c.gene(0).unwrap(), Gene::Bool(false));
    }

    #[test]
    fn test_set_coerces_through_bounds() {
        let mut c = Chromosome::int(2, -5, 5).unwrap();
        c.set(0, Gene::Int(100)).unwrap();
        c.set(1, Gene::Int(-100)).unwrap();
        assert_eq!(c.gene(0).unwrap(), Gene::Int(5));
        assert_eq!(c.gene(1).unwrap(), Gene::Int(-5));
    }

    #[test]
    fn test_bounds_hold_after_mutation_storm() {
        let rng = rng();
        let mut c = Chromosome::int(8, -3, 3).unwrap();
        c.seed(0.5, &rng).unwrap();
        for i in 0..1000 {
            let idx = i % 8;
            match i % 3 {
                0 => c.mutate_drift(idx, Direction::Up).unwrap(),
                1 => c.mutate_drift(idx, Direction::Down).unwrap(),
                _ => c.mutate_random(idx, &rng).unwrap(),
            }
        }
        for i in 0..8 {
            let Gene::Int(v) = c.gene(i).unwrap() else {
                panic!("kind changed")
            };
            assert!((-3..=3).contains(&v));
        }
    }

    #[test]
    fn test_locked_gene_never_changes() {
        let rng = rng();
        let mut c = Chromosome::int(3, 0, 9).unwrap();
        c.set(1, Gene::Int(4)).unwrap();
        c.set_lock(1, true).unwrap();

        c.set(1, Gene::Int(8)).unwrap();
        c.mutate_drift(1, Direction::Up).unwrap();
        c.mutate_random(1, &rng).unwrap();
        c.seed(0.5, &rng).unwrap();
        assert_eq!(c.gene(1).unwrap(), Gene::Int(4));

        // Unlocked neighbors still mutate freely.
        c.set(0, Gene::Int(8)).unwrap();
        assert_eq!(c.gene(0).unwrap(), Gene::Int(8));
    }

    #[test]
    fn test_clone_copies_locks() {
        let mut c = Chromosome::bool(2);
        c.set_lock(0, true).unwrap();
        let mut d = c.clone();
        d.set(0, Gene::Bool(true)).unwrap();
        assert_eq!(d.gene(0).unwrap(), Gene::Bool(false));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut c = Chromosome::bool(1);
        let err = c.set(0, Gene::Int(1)).unwrap_err();
        assert!(matches!(err, EvolveError::ShapeMismatch(_)));
    }

    #[test]
    fn test_resize_keeps_prefix() {
        let mut c = Chromosome::int(3, 0, 9).unwrap();
        c.set(0, Gene::Int(7)).unwrap();
        c.set_lock(0, true).unwrap();
        c.resize(5);
        assert_eq!(c.len(), 5);
        assert_eq!(c.gene(0).unwrap(), Gene::Int(7));
        assert!(c.is_locked(0));
        assert_eq!(c.gene(4).unwrap(), Gene::Int(0));
        c.resize(1);
        assert_eq!(c.len(), 1);
        assert_eq!(c.gene(0).unwrap(), Gene::Int(7));
    }

    #[test]
    fn test_copy_range_from() {
        let rng = rng();
        let mut a = Chromosome::int(5, 0, 9).unwrap();
        let mut b = Chromosome::int(5, 0, 9).unwrap();
        a.seed(0.5, &rng).unwrap();
        b.seed(0.5, &rng).unwrap();
        let before = a.clone();
        a.copy_range_from(&b, 2, 5).unwrap();
        for i in 0..2 {
            assert_eq!(a.gene(i).unwrap(), before.gene(i).unwrap());
        }
        for i in 2..5 {
            assert_eq!(a.gene(i).unwrap(), b.gene(i).unwrap());
        }
    }

    #[test]
    fn test_copy_range_shape_checks() {
        let mut a = Chromosome::int(5, 0, 9).unwrap();
        let b = Chromosome::int(4, 0, 9).unwrap();
        assert!(matches!(
            a.copy_range_from(&b, 0, 4),
            Err(EvolveError::ShapeMismatch(_))
        ));
        let c = Chromosome::int(5, 0, 8).unwrap();
        assert!(matches!(
            a.copy_range_from(&c, 0, 5),
            Err(EvolveError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_seed_probability_validated() {
        let rng = rng();
        let mut c = Chromosome::bool(4);
        assert!(c.seed(1.5, &rng).is_err());
        c.seed(1.0, &rng).unwrap();
        for i in 0..4 {
            assert_eq!(c.gene(i).unwrap(), Gene::Bool(true));
        }
    }

    #[test]
    fn test_serde_roundtrip() {
        let rng = rng();
        let mut c = Chromosome::double(4, -1.0, 1.0, 0.1).unwrap();
        c.seed(0.5, &rng).unwrap();
        c.set_lock(2, true).unwrap();
        let json = serde_json::to_string(&c).unwrap();
        let restored: Chromosome = serde_json::from_str(&json).unwrap();
        assert_eq!(c, restored);
        assert!(restored.is_locked(2));
    }
}
