//! Selection strategies for crossover, mutation, and migration.
//!
//! A selector is a stateful iterator over parent indices: `init` resets it
//! at the start of every generation, `next` yields one index (or one pair)
//! until the strategy decides it is done. Selectors only see the parent
//! slice of the population — indices `[0, original_count)` — through a
//! [`SelectView`] of their fitnesses.

use serde::{Deserialize, Serialize};

use crate::error::EvolveError;
use crate::rng::SharedRng;

/// Read-only view of the parents a selector draws from: one fitness per
/// parent, in roster order.
#[derive(Debug, Clone, Copy)]
pub struct SelectView<'a> {
    fitnesses: &'a [f64],
}

impl<'a> SelectView<'a> {
    /// View over the given parent fitnesses.
    #[must_use]
    pub fn new(fitnesses: &'a [f64]) -> Self {
        Self { fitnesses }
    }

    /// Number of selectable parents.
    #[must_use]
    pub fn count(&self) -> usize {
        self.fitnesses.len()
    }

    /// Fitness of the parent at `index`.
    #[must_use]
    pub fn fitness(&self, index: usize) -> f64 {
        self.fitnesses[index]
    }
}

/// Truncating draw target: `count * ratio` pairs or picks per generation.
fn draw_target(count: usize, ratio: f64) -> usize {
    (count as f64 * ratio) as usize
}

/// Roulette bookkeeping, rebuilt once per generation on the first draw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouletteState {
    drawn: usize,
    target: usize,
    marker: usize,
    /// `(mean, std_dev, sum)` of the parent fitnesses, or `None` until the
    /// first draw of the generation.
    stats: Option<(f64, f64, f64)>,
}

impl RouletteState {
    fn reset(&mut self, target: usize) {
        self.drawn = 0;
        self.target = target;
        self.marker = 0;
        self.stats = None;
    }

    fn ensure_stats(&mut self, view: &SelectView<'_>) -> Result<(f64, f64, f64), EvolveError> {
        if let Some(stats) = self.stats {
            return Ok(stats);
        }
        let n = view.count() as f64;
        let sum: f64 = (0..view.count()).map(|i| view.fitness(i)).sum();
        let mean = sum / n;
        let variance = (0..view.count())
            .map(|i| {
                let d = view.fitness(i) - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        if sum <= 0.0 || !sum.is_finite() {
            return Err(EvolveError::InvalidConfiguration(
                "roulette selection requires positive total fitness".into(),
            ));
        }
        let stats = (mean, variance.sqrt(), sum);
        self.stats = Some(stats);
        Ok(stats)
    }

    /// One stochastic-universal-sampling draw: subtract fitnesses from a
    /// target value while rotating the marker cyclically.
    fn draw(&mut self, view: &SelectView<'_>, rng: &SharedRng) -> Result<usize, EvolveError> {
        let (mean, _std_dev, _sum) = self.ensure_stats(view)?;
        let mut residual = rng.next_double() * mean;
        loop {
            let picked = self.marker;
            residual -= view.fitness(picked).max(0.0);
            self.marker = (self.marker + 1) % view.count();
            if residual <= 0.0 {
                return Ok(picked);
            }
        }
    }
}

/// Single-entity selection strategy (mutation parents, migration picks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntitySelector {
    /// Uniform independent picks, `count * ratio` of them.
    Random { drawn: usize, target: usize },
    /// Each parent exactly once.
    Every { cursor: usize },
    /// Walk indices from 1 upward, yielding each with probability `ratio`.
    RandomRank { state: usize, ratio: f64 },
    /// Tournament of two uniform candidates, `count * ratio` picks.
    BestOfTwo { drawn: usize, target: usize },
    /// Fitness-proportionate rotation (stochastic universal sampling).
    Roulette(RouletteState),
}

impl EntitySelector {
    #[must_use]
    pub fn random() -> Self {
        Self::Random { drawn: 0, target: 0 }
    }

    #[must_use]
    pub fn every() -> Self {
        Self::Every { cursor: 0 }
    }

    #[must_use]
    pub fn random_rank() -> Self {
        Self::RandomRank { state: 1, ratio: 0.0 }
    }

    #[must_use]
    pub fn best_of_two() -> Self {
        Self::BestOfTwo { drawn: 0, target: 0 }
    }

    #[must_use]
    pub fn roulette() -> Self {
        Self::Roulette(RouletteState::default())
    }

    /// Reset iteration state for a new generation.
    pub fn init(&mut self, view: &SelectView<'_>, ratio: f64) {
        let target = draw_target(view.count(), ratio);
        match self {
            Self::Random { drawn, target: t } | Self::BestOfTwo { drawn, target: t } => {
                *drawn = 0;
                *t = target;
            }
            Self::Every { cursor } => *cursor = 0,
            Self::RandomRank { state, ratio: r } => {
                *state = 1;
                *r = ratio;
            }
            Self::Roulette(state) => state.reset(target),
        }
    }

    /// Yield the next parent index, or `None` when the generation's quota
    /// is exhausted.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` from roulette over non-positive fitness mass.
    pub fn next(
        &mut self,
        view: &SelectView<'_>,
        rng: &SharedRng,
    ) -> Result<Option<usize>, EvolveError> {
        if view.count() == 0 {
            return Ok(None);
        }
        match self {
            Self::Random { drawn, target } => {
                if *drawn >= *target {
                    return Ok(None);
                }
                *drawn += 1;
                Ok(Some(rng.next_below(view.count())?))
            }
            Self::Every { cursor } => {
                if *cursor >= view.count() {
                    return Ok(None);
                }
                let picked = *cursor;
                *cursor += 1;
                Ok(Some(picked))
            }
            Self::RandomRank { state, ratio } => {
                while *state < view.count() {
                    let picked = *state;
                    *state += 1;
                    if rng.random_prob(*ratio)? {
                        return Ok(Some(picked));
                    }
                }
                Ok(None)
            }
            Self::BestOfTwo { drawn, target } => {
                if *drawn >= *target {
                    return Ok(None);
                }
                *drawn += 1;
                Ok(Some(tournament_of_two(view, rng)?))
            }
            Self::Roulette(state) => {
                if state.drawn >= state.target {
                    return Ok(None);
                }
                state.drawn += 1;
                Ok(Some(state.draw(view, rng)?))
            }
        }
    }
}

/// Sample two candidates (distinct when possible) and keep the fitter.
fn tournament_of_two(view: &SelectView<'_>, rng: &SharedRng) -> Result<usize, EvolveError> {
    let a = rng.next_below(view.count())?;
    if view.count() < 2 {
        return Ok(a);
    }
    let b = rng.next_except(view.count(), &[a])?;
    Ok(if view.fitness(a) >= view.fitness(b) { a } else { b })
}

/// Pair selection strategy (crossover parents).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PairSelector {
    /// Uniform mother, uniform father excluding the mother.
    Random { drawn: usize, target: usize },
    /// Every ordered pair `(i, j)`, `i != j`.
    Every { i: usize, j: usize },
    /// Walk indices from 1 upward; with probability `ratio` pair index
    /// `state` with a uniformly drawn earlier index.
    RandomRank { state: usize, ratio: f64 },
    /// Two tournaments of two, re-drawing until mother != father.
    BestOfTwo { drawn: usize, target: usize },
    /// Two successive roulette rotations per pair.
    Roulette(RouletteState),
}

impl PairSelector {
    #[must_use]
    pub fn random() -> Self {
        Self::Random { drawn: 0, target: 0 }
    }

    #[must_use]
    pub fn every() -> Self {
        Self::Every { i: 0, j: 0 }
    }

    #[must_use]
    pub fn random_rank() -> Self {
        Self::RandomRank { state: 1, ratio: 0.0 }
    }

    #[must_use]
    pub fn best_of_two() -> Self {
        Self::BestOfTwo { drawn: 0, target: 0 }
    }

    #[must_use]
    pub fn roulette() -> Self {
        Self::Roulette(RouletteState::default())
    }

    /// Reset iteration state for a new generation.
    pub fn init(&mut self, view: &SelectView<'_>, ratio: f64) {
        let target = draw_target(view.count(), ratio);
        match self {
            Self::Random { drawn, target: t } | Self::BestOfTwo { drawn, target: t } => {
                *drawn = 0;
                *t = target;
            }
            Self::Every { i, j } => {
                *i = 0;
                *j = 0;
            }
            Self::RandomRank { state, ratio: r } => {
                *state = 1;
                *r = ratio;
            }
            Self::Roulette(state) => state.reset(target),
        }
    }

    /// Yield the next `(mother, father)` pair, or `None` when done. Pairs
    /// require at least two parents.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` from roulette over non-positive fitness mass.
    pub fn next(
        &mut self,
        view: &SelectView<'_>,
        rng: &SharedRng,
    ) -> Result<Option<(usize, usize)>, EvolveError> {
        if view.count() < 2 {
            return Ok(None);
        }
        match self {
            Self::Random { drawn, target } => {
                if *drawn >= *target {
                    return Ok(None);
                }
                *drawn += 1;
                let mother = rng.next_below(view.count())?;
                let father = rng.next_except(view.count(), &[mother])?;
                Ok(Some((mother, father)))
            }
            Self::Every { i, j } => {
                // Skip the diagonal; column-major advance over (i, j).
                loop {
                    if *i >= view.count() {
                        return Ok(None);
                    }
                    let pair = (*i, *j);
                    *j += 1;
                    if *j >= view.count() {
                        *j = 0;
                        *i += 1;
                    }
                    if pair.0 != pair.1 {
                        return Ok(Some(pair));
                    }
                }
            }
            Self::RandomRank { state, ratio } => {
                while *state < view.count() {
                    let mother = *state;
                    *state += 1;
                    if rng.random_prob(*ratio)? {
                        let father = rng.next_below(mother)?;
                        return Ok(Some((mother, father)));
                    }
                }
                Ok(None)
            }
            Self::BestOfTwo { drawn, target } => {
                if *drawn >= *target {
                    return Ok(None);
                }
                *drawn += 1;
                let mother = tournament_of_two(view, rng)?;
                let mut father = tournament_of_two(view, rng)?;
                let mut retries = 0;
                while father == mother && retries < 16 {
                    father = tournament_of_two(view, rng)?;
                    retries += 1;
                }
                if father == mother {
                    father = rng.next_except(view.count(), &[mother])?;
                }
                Ok(Some((mother, father)))
            }
            Self::Roulette(state) => {
                if state.drawn >= state.target {
                    return Ok(None);
                }
                state.drawn += 1;
                let mother = state.draw(view, rng)?;
                let father = state.draw(view, rng)?;
                Ok(Some((mother, father)))
            }
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
    fn test_pair_random_draw_count() {
        // Population of 10 at ratio 0.5 yields exactly 5 pairs.
        let fitnesses: Vec<f64> = (0..10).map(f64::from).collect();
        let view = SelectView::new(&fitnesses);
        let rng = rng();
        let mut selector = PairSelector::random();
        selector.init(&view, 0.5);
        let mut pairs = 0;
        while let Some((m, f)) = selector.next(&view, &rng).unwrap() {
            assert_ne!(m, f, "random pairs never self-pair");
            pairs += 1;
        }
        assert_eq!(pairs, 5);
    }

    #[test]
    fn test_entity_random_respects_target() {
        let fitnesses = vec![1.0; 8];
        let view = SelectView::new(&fitnesses);
        let rng = rng();
        let mut selector = EntitySelector::random();
        selector.init(&view, 0.25);
        let mut picks = 0;
        while selector.next(&view, &rng).unwrap().is_some() {
            picks += 1;
        }
        assert_eq!(picks, 2);
    }

    #[test]
    fn test_every_entity_enumerates_once() {
        let fitnesses = vec![1.0; 5];
        let view = SelectView::new(&fitnesses);
        let rng = rng();
        let mut selector = EntitySelector::every();
        selector.init(&view, 1.0);
        let mut seen = Vec::new();
        while let Some(i) = selector.next(&view, &rng).unwrap() {
            seen.push(i);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_every_pair_covers_ordered_pairs() {
        let fitnesses = vec![1.0; 3];
        let view = SelectView::new(&fitnesses);
        let rng = rng();
        let mut selector = PairSelector::every();
        selector.init(&view, 1.0);
        let mut pairs = Vec::new();
        while let Some(p) = selector.next(&view, &rng).unwrap() {
            pairs.push(p);
        }
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 0), (1, 2), (2, 0), (2, 1)]);
    }

    #[test]
    fn test_random_rank_terminates_below_count() {
        let fitnesses = vec![1.0; 6];
        let view = SelectView::new(&fitnesses);
        let rng = rng();
        let mut selector = PairSelector::random_rank();
        selector.init(&view, 1.0);
        let mut pairs = Vec::new();
        while let Some((m, f)) = selector.next(&view, &rng).unwrap() {
            assert!(f < m, "father is always an earlier index");
            pairs.push(m);
        }
        // Ratio 1.0 yields every index in [1, count).
        assert_eq!(pairs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_best_of_two_prefers_fitter() {
        // With fitnesses heavily skewed to one index, the tournament
        // should pick it most of the time.
        let mut fitnesses = vec![0.0; 10];
        fitnesses[3] = 100.0;
        let view = SelectView::new(&fitnesses);
        let rng = rng();
        let mut selector = EntitySelector::best_of_two();
        let mut hits = 0;
        let rounds = 200;
        for _ in 0..rounds {
            selector.init(&view, 0.1); // one pick per init
            if selector.next(&view, &rng).unwrap() == Some(3) {
                hits += 1;
            }
        }
        // P(index 3 in a 2-candidate tournament) = 1 - (9/10 * 8/9) = 0.2
        assert!(hits > 20, "tournament never favored the fit entity");
    }

    #[test]
    fn test_roulette_proportionate() {
        let fitnesses = vec![1.0, 1.0, 8.0, 1.0, 1.0];
        let view = SelectView::new(&fitnesses);
        let rng = rng();
        let mut selector = EntitySelector::roulette();
        let mut counts = [0usize; 5];
        for _ in 0..400 {
            selector.init(&view, 0.2); // one draw per generation
            if let Some(i) = selector.next(&view, &rng).unwrap() {
                counts[i] += 1;
            }
        }
        let total: usize = counts.iter().sum();
        assert!(total > 0);
        assert!(
            counts[2] > total / 3,
            "high-fitness entity under-selected: {counts:?}"
        );
    }

    #[test]
    fn test_roulette_rejects_nonpositive_mass() {
        let fitnesses = vec![0.0, 0.0];
        let view = SelectView::new(&fitnesses);
        let rng = rng();
        let mut selector = EntitySelector::roulette();
        selector.init(&view, 1.0);
        assert!(matches!(
            selector.next(&view, &rng),
            Err(EvolveError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_pair_needs_two_parents() {
        let fitnesses = vec![1.0];
        let view = SelectView::new(&fitnesses);
        let rng = rng();
        let mut selector = PairSelector::random();
        selector.init(&view, 1.0);
        assert_eq!(selector.next(&view, &rng).unwrap(), None);
    }
}
