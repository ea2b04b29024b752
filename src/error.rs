//! Crate-wide error type.
//!
//! Every fallible operation in the engine funnels through [`EvolveError`].
//! Misuse errors (`ArgumentOutOfRange`, `ShapeMismatch`, ...) surface to the
//! caller and are never recovered internally; `Cancelled` unwinds the
//! generation loop when a [`CancelToken`](crate::population::CancelToken)
//! trips between phases.

use thiserror::Error;

/// Errors raised by the genetic engine and the SOM core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvolveError {
    /// An index, probability, or dimension fell outside its legal range.
    #[error("argument out of range: {0}")]
    ArgumentOutOfRange(String),

    /// Two structures that must agree in shape do not (parent DNA in
    /// crossover, chromosome kinds/lengths in gene splicing).
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A chromosome name already exists in the DNA (names compare
    /// case-insensitively).
    #[error("duplicate chromosome name `{0}`")]
    DuplicateName(String),

    /// An operation ran without the strategy or topology it needs.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The target entity or host has already been released.
    #[error("object has been disposed")]
    Disposed,

    /// A non-empty neighbor key was not present in the topology map,
    /// indicating a builder/toroidal mismatch.
    #[error("unresolved neighbor key `{0}`")]
    UnresolvedNeighbor(String),

    /// The cancellation token tripped between phases.
    #[error("evolution cancelled")]
    Cancelled,

    /// A user fitness hook failed; the surrounding phase is abandoned.
    #[error("fitness evaluation failed: {0}")]
    Evaluation(String),
}

impl EvolveError {
    /// Shorthand for [`EvolveError::ArgumentOutOfRange`] with a formatted
    /// index/bound pair.
    pub(crate) fn index(index: usize, len: usize) -> Self {
        Self::ArgumentOutOfRange(format!("index {index} out of range for length {len}"))
    }

    /// Shorthand for a probability outside `[0, 1]`.
    pub(crate) fn probability(p: f64) -> Self {
        Self::ArgumentOutOfRange(format!("probability {p} outside [0, 1]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = EvolveError::DuplicateName("Genes".into());
        assert_eq!(err.to_string(), "duplicate chromosome name `Genes`");

        let err = EvolveError::index(7, 5);
        assert!(err.to_string().contains("index 7"));

        let err = EvolveError::Cancelled;
        assert_eq!(err.to_string(), "evolution cancelled");
    }
}
