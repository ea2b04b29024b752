//! Self-organizing-map core: lattice topologies, distance networks, and
//! the Gaussian-neighborhood learning rules.

pub mod lattice;
pub mod learning;
pub mod network;

pub use lattice::{LatticeBuilder, LatticeKind, NeuronLocation, TopologyMap, WeightInit};
pub use learning::{GridSomLearning, TopologySomLearning};
pub use network::{DistanceLayer, DistanceNetwork, DistanceNeuron};
