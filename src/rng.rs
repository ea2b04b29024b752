//! Shared pseudorandom source.
//!
//! The engine draws every stochastic decision through a [`SharedRng`]: a
//! `Pcg64` stream behind a mutex so concurrent phases (parallel crossover,
//! pooled evaluation) serialize their draws. Populations own a seeded
//! instance for reproducible runs; [`global`] hands out a process-wide
//! lazily-initialized fallback for callers that do not care about seeding.

use std::sync::{Mutex, OnceLock};

use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg64;

use crate::error::EvolveError;

/// A thread-safe uniform PRNG.
///
/// All methods lock the underlying stream for the duration of one draw, so
/// interleavings across threads are serialized but not ordered; with a
/// single worker thread the draw sequence is fully deterministic for a
/// given seed.
#[derive(Debug)]
pub struct SharedRng {
    inner: Mutex<Pcg64>,
}

impl SharedRng {
    /// Create a generator with a fixed seed. Two instances with the same
    /// seed produce identical draw sequences.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Mutex::new(Pcg64::seed_from_u64(seed)),
        }
    }

    /// Create a generator seeded from operating-system entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            inner: Mutex::new(Pcg64::from_os_rng()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pcg64> {
        // A poisoned lock means a panic mid-draw; the stream itself is
        // still usable.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Uniform nonnegative integer over the full `i64` nonnegative range.
    #[must_use]
    pub fn next_int(&self) -> i64 {
        let v: i64 = self.lock().random();
        v & i64::MAX
    }

    /// Uniform integer in `[0, max)`.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` if `max == 0`.
    pub fn next_below(&self, max: usize) -> Result<usize, EvolveError> {
        if max == 0 {
            return Err(EvolveError::ArgumentOutOfRange(
                "next_below requires max > 0".into(),
            ));
        }
        Ok(self.lock().random_range(0..max))
    }

    /// Uniform integer in `[min, max)`.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` if `min >= max`.
    pub fn next_range(&self, min: i64, max: i64) -> Result<i64, EvolveError> {
        if min >= max {
            return Err(EvolveError::ArgumentOutOfRange(format!(
                "empty range [{min}, {max})"
            )));
        }
        Ok(self.lock().random_range(min..max))
    }

    /// Uniform double in `[0.0, 1.0)`.
    #[must_use]
    pub fn next_double(&self) -> f64 {
        self.lock().random()
    }

    /// Fill `buf` with random bytes.
    pub fn next_bytes(&self, buf: &mut [u8]) {
        self.lock().fill_bytes(buf);
    }

    /// Bernoulli draw: `true` with probability `p`.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` unless `0 <= p <= 1`.
    pub fn random_prob(&self, p: f64) -> Result<bool, EvolveError> {
        if !(0.0..=1.0).contains(&p) {
            return Err(EvolveError::probability(p));
        }
        Ok(self.next_double() < p)
    }

    /// Uniform draw from `[0, max)` excluding the given values.
    ///
    /// Samples `v` in `[0, max - excluded.len())`, then shifts `v` past each
    /// excluded value `e <= v` in ascending order, so every allowed value
    /// keeps equal mass and no excluded value can be returned.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` if the excluded values are not distinct, fall
    /// outside `[0, max)`, or leave the allowed set empty.
    pub fn next_except(&self, max: usize, excluded: &[usize]) -> Result<usize, EvolveError> {
        let mut sorted = excluded.to_vec();
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(EvolveError::ArgumentOutOfRange(
                "excluded values must be distinct".into(),
            ));
        }
        if sorted.last().is_some_and(|&e| e >= max) {
            return Err(EvolveError::ArgumentOutOfRange(
                "excluded value outside [0, max)".into(),
            ));
        }
        if sorted.len() >= max {
            return Err(EvolveError::ArgumentOutOfRange(
                "exclusions leave an empty range".into(),
            ));
        }

        let mut v = self.next_below(max - sorted.len())?;
        for &e in &sorted {
            if e <= v {
                v += 1;
            }
        }
        Ok(v)
    }
}

/// The process-wide generator, lazily initialized from OS entropy.
pub fn global() -> &'static SharedRng {
    static GLOBAL: OnceLock<SharedRng> = OnceLock::new();
    GLOBAL.get_or_init(SharedRng::from_entropy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_streams_match() {
        let a = SharedRng::seeded(42);
        let b = SharedRng::seeded(42);
        for _ in 0..32 {
            assert_eq!(a.next_int(), b.next_int());
        }
    }

    #[test]
    fn test_next_below_in_range() {
        let rng = SharedRng::seeded(7);
        for _ in 0..1000 {
            let v = rng.next_below(13).unwrap();
            assert!(v < 13);
        }
        assert!(rng.next_below(0).is_err());
    }

    #[test]
    fn test_next_range_bounds() {
        let rng = SharedRng::seeded(7);
        for _ in 0..1000 {
            let v = rng.next_range(-5, 5).unwrap();
            assert!((-5..5).contains(&v));
        }
        assert!(rng.next_range(3, 3).is_err());
    }

    #[test]
    fn test_random_prob_validation() {
        let rng = SharedRng::seeded(1);
        assert!(rng.random_prob(-0.1).is_err());
        assert!(rng.random_prob(1.1).is_err());
        assert!(!rng.random_prob(0.0).unwrap());
        assert!(rng.random_prob(1.0).unwrap());
    }

    #[test]
    fn test_next_except_never_returns_excluded() {
        let rng = SharedRng::seeded(99);
        let excluded = [2, 5, 7];
        for _ in 0..2000 {
            let v = rng.next_except(10, &excluded).unwrap();
            assert!(v < 10);
            assert!(!excluded.contains(&v));
        }
    }

    #[test]
    fn test_next_except_uniform_over_allowed() {
        // Frequency check over the allowed set; each of the 7 allowed
        // values should receive roughly 1/7 of the mass.
        let rng = SharedRng::seeded(12345);
        let excluded = [0, 4, 9];
        let draws = 100_000;
        let mut counts = [0usize; 10];
        for _ in 0..draws {
            counts[rng.next_except(10, &excluded).unwrap()] += 1;
        }
        for &e in &excluded {
            assert_eq!(counts[e], 0);
        }
        let expected = draws as f64 / 7.0;
        for (v, &count) in counts.iter().enumerate() {
            if excluded.contains(&v) {
                continue;
            }
            let deviation = (count as f64 - expected).abs() / expected;
            assert!(
                deviation < 0.05,
                "value {v} count {count} deviates {deviation:.3} from uniform"
            );
        }
    }

    #[test]
    fn test_next_except_rejects_bad_exclusions() {
        let rng = SharedRng::seeded(1);
        assert!(rng.next_except(10, &[3, 3]).is_err());
        assert!(rng.next_except(10, &[10]).is_err());
        assert!(rng.next_except(2, &[0, 1]).is_err());
    }

    #[test]
    fn test_global_is_shared() {
        let a = global() as *const SharedRng;
        let b = global() as *const SharedRng;
        assert_eq!(a, b);
    }
}
