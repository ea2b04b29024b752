//! DNA: an ordered, case-insensitively keyed chromosome collection.
//!
//! Iteration order equals insertion order, names are unique ignoring ASCII
//! case, and cloning deep-copies every chromosome. This is the genetic
//! payload an [`Entity`](crate::entity::Entity) carries through the
//! generation loop.

use serde::{Deserialize, Serialize};

use crate::chromosome::Chromosome;
use crate::error::EvolveError;
use crate::rng::SharedRng;

/// Ordered name-keyed chromosome bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dna {
    entries: Vec<(String, Chromosome)>,
}

impl Dna {
    /// An empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chromosomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the bundle holds no chromosomes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Append a named chromosome.
    ///
    /// # Errors
    ///
    /// `DuplicateName` if a chromosome with the same name (ignoring ASCII
    /// case) is already present.
    pub fn add(&mut self, name: impl Into<String>, chromosome: Chromosome) -> Result<(), EvolveError> {
        let name = name.into();
        if self.position(&name).is_some() {
            return Err(EvolveError::DuplicateName(name));
        }
        self.entries.push((name, chromosome));
        Ok(())
    }

    /// Look up a chromosome by name, ignoring ASCII case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Chromosome> {
        self.position(name).map(|i| &self.entries[i].1)
    }

    /// Mutable lookup by name, ignoring ASCII case.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Chromosome> {
        self.position(name).map(move |i| &mut self.entries[i].1)
    }

    /// Chromosome at insertion position `index`.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&Chromosome> {
        self.entries.get(index).map(|(_, c)| c)
    }

    /// Mutable chromosome at insertion position `index`.
    pub fn at_mut(&mut self, index: usize) -> Option<&mut Chromosome> {
        self.entries.get_mut(index).map(|(_, c)| c)
    }

    /// Iterate `(name, chromosome)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Chromosome)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Iterate chromosomes mutably in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Chromosome)> {
        self.entries.iter_mut().map(|(n, c)| (n.as_str(), c))
    }

    /// Total gene count across all chromosomes.
    #[must_use]
    pub fn gene_count(&self) -> usize {
        self.entries.iter().map(|(_, c)| c.len()).sum()
    }

    /// Broadcast [`Chromosome::seed`] to every chromosome.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` unless `0 <= p <= 1`.
    pub fn seed(&mut self, p: f64, rng: &SharedRng) -> Result<(), EvolveError> {
        for (_, chromosome) in &mut self.entries {
            chromosome.seed(p, rng)?;
        }
        Ok(())
    }

    /// Whether two bundles can take part in crossover together: same
    /// chromosome count and pairwise-compatible shapes in insertion order.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|((_, a), (_, b))| a.same_shape(b))
    }

    /// Drop all chromosomes.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
