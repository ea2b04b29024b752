//! Distance neurons, the distance layer, and the distance network.
//!
//! A distance neuron's output is the Euclidean distance between the input
//! and its weight vector; the layer's winner is the argmin. A network is
//! one layer plus optional lattice topology metadata from a
//! [`LatticeBuilder`].

use serde::{Deserialize, Serialize};

use crate::error::EvolveError;
use crate::rng::SharedRng;
use crate::som::lattice::{LatticeBuilder, TopologyMap};
use crate::vector;

/// Default weight-randomization range.
const DEFAULT_RAND_RANGE: (f64, f64) = (0.0, 1.0);

/// A neuron computing `||input - weights||₂`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceNeuron {
    weights: Vec<f64>,
}

impl DistanceNeuron {
    /// Neuron with explicit weights.
    #[must_use]
    pub fn new(weights: Vec<f64>) -> Self {
        Self { weights }
    }

    /// Neuron with `input_size` weights drawn uniformly from `range`.
    #[must_use]
    pub fn randomized(input_size: usize, range: (f64, f64), rng: &SharedRng) -> Self {
        let (min, max) = range;
        Self {
            weights: (0..input_size)
                .map(|_| min + rng.next_double() * (max - min))
                .collect(),
        }
    }

    /// The weight vector.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Mutable weight access for learning updates.
    pub fn weights_mut(&mut self) -> &mut [f64] {
        &mut self.weights
    }

    /// Euclidean distance from `input` to the weights.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` when the input length differs from the weight
    /// length.
    pub fn compute(&self, input: &[f64]) -> Result<f64, EvolveError> {
        vector::distance(input, &self.weights)
    }
}

/// An array of distance neurons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceLayer {
    neurons: Vec<DistanceNeuron>,
}

impl DistanceLayer {
    /// Layer over the given neurons.
    #[must_use]
    pub fn new(neurons: Vec<DistanceNeuron>) -> Self {
        Self { neurons }
    }

    /// Layer of `count` neurons with weights drawn uniformly from `range`.
    #[must_use]
    pub fn randomized(
        count: usize,
        input_size: usize,
        range: (f64, f64),
        rng: &SharedRng,
    ) -> Self {
        Self {
            neurons: (0..count)
                .map(|_| DistanceNeuron::randomized(input_size, range, rng))
                .collect(),
        }
    }

    /// Number of neurons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.neurons.len()
    }

    /// `true` for an empty layer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.neurons.is_empty()
    }

    /// Immutable neuron access.
    #[must_use]
    pub fn neuron(&self, index: usize) -> Option<&DistanceNeuron> {
        self.neurons.get(index)
    }

    /// Mutable neuron access.
    pub fn neuron_mut(&mut self, index: usize) -> Option<&mut DistanceNeuron> {
        self.neurons.get_mut(index)
    }

    /// Per-neuron distances for `input`.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` when the input length differs from the weight
    /// length of any neuron.
    pub fn compute(&self, input: &[f64]) -> Result<Vec<f64>, EvolveError> {
        self.neurons
            .iter()
            .map(|neuron| neuron.compute(input))
            .collect()
    }

    /// Index of the smallest output (first on ties).
    #[must_use]
    pub fn winner(outputs: &[f64]) -> usize {
        let mut best = 0;
        for (index, &value) in outputs.iter().enumerate() {
            if value < outputs[best] {
                best = index;
            }
        }
        best
    }
}

/// One distance layer plus lattice metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceNetwork {
    layer: DistanceLayer,
    topology: Option<TopologyMap>,
    input_size: usize,
    width: usize,
    height: usize,
    depth: usize,
}

impl DistanceNetwork {
    /// Row-major grid network without topology metadata; the simple
    /// rectangular learner addresses neurons by `width` alone.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for zero dimensions.
    pub fn grid(
        input_size: usize,
        width: usize,
        height: usize,
        rng: &SharedRng,
    ) -> Result<Self, EvolveError> {
        if input_size == 0 || width == 0 || height == 0 {
            return Err(EvolveError::ArgumentOutOfRange(
                "network dimensions must be positive".into(),
            ));
        }
        Ok(Self {
            layer: DistanceLayer::randomized(width * height, input_size, DEFAULT_RAND_RANGE, rng),
            topology: None,
            input_size,
            width,
            height,
            depth: 1,
        })
    }

    /// Network over a lattice: weights come from the builder's weight
    /// mode, topology from its neighbor schema.
    ///
    /// # Errors
    ///
    /// Propagates builder errors.
    pub fn from_builder(builder: &LatticeBuilder, rng: &SharedRng) -> Result<Self, EvolveError> {
        let neurons = (0..builder.total_nodes())
            .map(|index| Ok(DistanceNeuron::new(builder.weights_at_index(index, rng)?)))
            .collect::<Result<Vec<_>, EvolveError>>()?;
        Ok(Self {
            layer: DistanceLayer::new(neurons),
            topology: Some(TopologyMap::build(builder)?),
            input_size: builder.input_size(),
            width: builder.width(),
            height: builder.height(),
            depth: builder.depth(),
        })
    }

    /// Input dimensionality.
    #[must_use]
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Lattice width.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Lattice height.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Lattice depth (1 for planar networks).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The distance layer.
    #[must_use]
    pub fn layer(&self) -> &DistanceLayer {
        &self.layer
    }

    /// Mutable layer access for learning updates.
    pub fn layer_mut(&mut self) -> &mut DistanceLayer {
        &mut self.layer
    }

    /// Topology metadata, when built from a lattice.
    #[must_use]
    pub fn topology(&self) -> Option<&TopologyMap> {
        self.topology.as_ref()
    }

    /// Per-neuron distances for `input`.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` for a wrong-sized input.
    pub fn outputs(&self, input: &[f64]) -> Result<Vec<f64>, EvolveError> {
        self.layer.compute(input)
    }

    /// Winning neuron index for `input` (no learning).
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` for a wrong-sized input; `InvalidConfiguration`
    /// for an empty layer.
    pub fn winner(&self, input: &[f64]) -> Result<usize, EvolveError> {
        if self.layer.is_empty() {
            return Err(EvolveError::InvalidConfiguration(
                "network has no neurons".into(),
            ));
        }
        Ok(DistanceLayer::winner(&self.outputs(input)?))
    }
}
