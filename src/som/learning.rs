//! SOM learning rules.
//!
//! Both learners move the winning neuron (and a neighborhood) towards the
//! input with a Gaussian-weighted step and return the summed absolute
//! weight change as the error:
//!
//! - [`GridSomLearning`] assumes row-major storage on a bounded
//!   rectangular grid and scales each neuron's update by
//!   `exp(-(dx² + dy²) / 2r²)` from planar offsets.
//! - [`TopologySomLearning`] walks the lattice graph in breadth-first
//!   rings from the winner and scales ring `k` by `exp(-k² / 2r²)`, so it
//!   works on any lattice the topology map describes.
//!
//! On a bounded rectangular grid the two agree exactly on the winner and
//! on axis-aligned neighbors; on diagonals the hop metric and the
//! Euclidean metric differ by construction.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::EvolveError;
use crate::som::network::DistanceNetwork;
use crate::vector;

/// Default learning rate.
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;
/// Default learning radius.
pub const DEFAULT_LEARNING_RADIUS: f64 = 7.0;

fn check_rate_and_radius(learning_rate: f64, radius: f64) -> Result<(), EvolveError> {
    if !(0.0..=1.0).contains(&learning_rate) {
        return Err(EvolveError::ArgumentOutOfRange(format!(
            "learning rate {learning_rate} outside [0, 1]"
        )));
    }
    if radius < 0.0 || !radius.is_finite() {
        return Err(EvolveError::ArgumentOutOfRange(format!(
            "learning radius {radius} must be nonnegative"
        )));
    }
    Ok(())
}

/// Move one neuron towards the input by `rate`, returning the summed
/// absolute change.
fn update_neuron(
    network: &mut DistanceNetwork,
    index: usize,
    input: &[f64],
    rate: f64,
) -> Result<f64, EvolveError> {
    let neuron = network
        .layer_mut()
        .neuron_mut(index)
        .ok_or_else(|| EvolveError::index(index, 0))?;
    let delta = vector::sub(input, neuron.weights())?;
    vector::update(neuron.weights_mut(), &delta, rate)?;
    Ok(rate * vector::sum(&vector::abs(&delta)))
}

/// Row-major rectangular-grid learner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSomLearning {
    learning_rate: f64,
    radius: f64,
    squared_radius2: f64,
}

impl GridSomLearning {
    /// Learner with explicit rate and radius; `2r²` is cached.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for a rate outside `[0, 1]` or a negative
    /// radius.
    pub fn new(learning_rate: f64, radius: f64) -> Result<Self, EvolveError> {
        check_rate_and_radius(learning_rate, radius)?;
        Ok(Self {
            learning_rate,
            radius,
            squared_radius2: 2.0 * radius * radius,
        })
    }

    /// One learning step: find the winner for `input` and pull every
    /// neuron towards it scaled by the planar Gaussian. Returns the
    /// summed absolute weight change.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` for a wrong-sized input.
    pub fn run(&self, network: &mut DistanceNetwork, input: &[f64]) -> Result<f64, EvolveError> {
        let winner = network.winner(input)?;
        if self.radius == 0.0 {
            return update_neuron(network, winner, input, self.learning_rate);
        }

        let width = network.width() as i64;
        let wx = winner as i64 % width;
        let wy = winner as i64 / width;
        let mut error = 0.0;
        for index in 0..network.layer().len() {
            let dx = (index as i64 % width - wx) as f64;
            let dy = (index as i64 / width - wy) as f64;
            let factor = (-(dx * dx + dy * dy) / self.squared_radius2).exp();
            error += update_neuron(network, index, input, self.learning_rate * factor)?;
        }
        Ok(error)
    }

    /// Sum of [`GridSomLearning::run`] over all inputs.
    ///
    /// # Errors
    ///
    /// As for `run`.
    pub fn run_epoch(
        &self,
        network: &mut DistanceNetwork,
        inputs: &[Vec<f64>],
    ) -> Result<f64, EvolveError> {
        let mut total = 0.0;
        for input in inputs {
            total += self.run(network, input)?;
        }
        Ok(total)
    }
}

impl Default for GridSomLearning {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            radius: DEFAULT_LEARNING_RADIUS,
            squared_radius2: 2.0 * DEFAULT_LEARNING_RADIUS * DEFAULT_LEARNING_RADIUS,
        }
    }
}

/// Topology-aware learner: ring expansion over the lattice graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopologySomLearning {
    learning_rate: f64,
    radius: f64,
    squared_radius2: f64,
}

impl TopologySomLearning {
    /// Learner with explicit rate and radius; `2r²` is cached.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for a rate outside `[0, 1]` or a negative
    /// radius.
    pub fn new(learning_rate: f64, radius: f64) -> Result<Self, EvolveError> {
        check_rate_and_radius(learning_rate, radius)?;
        Ok(Self {
            learning_rate,
            radius,
            squared_radius2: 2.0 * radius * radius,
        })
    }

    /// One learning step: breadth-first ring expansion from the winner,
    /// ring `k` scaled by `exp(-k² / 2r²)`, for at most
    /// `max(width, height, depth)` rings. Returns the summed absolute
    /// weight change.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` when the network carries no topology map
    /// and the radius is nonzero; `UnresolvedNeighbor` on a corrupt map;
    /// `ShapeMismatch` for a wrong-sized input.
    pub fn run(&self, network: &mut DistanceNetwork, input: &[f64]) -> Result<f64, EvolveError> {
        let winner = network.winner(input)?;
        if self.radius == 0.0 {
            return update_neuron(network, winner, input, self.learning_rate);
        }
        if network.topology().is_none() {
            return Err(EvolveError::InvalidConfiguration(
                "topology-aware learning needs a lattice-built network".into(),
            ));
        }

        let max_rings = network.width().max(network.height()).max(network.depth());
        let mut visited: HashSet<usize> = HashSet::new();
        visited.insert(winner);
        let mut ring = vec![winner];
        let mut error = 0.0;

        for k in 0..=max_rings {
            if ring.is_empty() {
                break;
            }
            let k_f = k as f64;
            let factor = (-(k_f * k_f) / self.squared_radius2).exp();
            for &index in &ring {
                error += update_neuron(network, index, input, self.learning_rate * factor)?;
            }

            // Next ring: unvisited neighbors of the current ring.
            let mut next = Vec::new();
            {
                let topology = network
                    .topology()
                    .ok_or_else(|| EvolveError::InvalidConfiguration("topology vanished".into()))?;
                for &index in &ring {
                    let location = topology.location_of(index).ok_or_else(|| {
                        EvolveError::UnresolvedNeighbor(format!("index {index}"))
                    })?;
                    for neighbor in &location.neighbors {
                        if let Some(neighbor_index) = topology.neighbor_index(neighbor)? {
                            if visited.insert(neighbor_index) {
                                next.push(neighbor_index);
                            }
                        }
                    }
                }
            }
            ring = next;
        }
        Ok(error)
    }

    /// Sum of [`TopologySomLearning::run`] over all inputs.
    ///
    /// # Errors
    ///
    /// As for `run`.
    pub fn run_epoch(
        &self,
        network: &mut DistanceNetwork,
        inputs: &[Vec<f64>],
    ) -> Result<f64, EvolveError> {
        let mut total = 0.0;
        for input in inputs {
            total += self.run(network, input)?;
        }
        Ok(total)
    }
}

impl Default for TopologySomLearning {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            radius: DEFAULT_LEARNING_RADIUS,
            squared_radius2: 2.0 * DEFAULT_LEARNING_RADIUS * DEFAULT_LEARNING_RADIUS,
        }
    }
}
