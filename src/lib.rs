//! # Archipelago
//!
//! An island-model genetic algorithm engine with a self-organizing-map
//! (distance network) learner.
//!
//! ## Features
//!
//! - **Island-Model Evolution**: One or more [`Population`]s evolve under
//!   a [`PopulationHost`] that routes entity migration between islands
//!   over lock-free queues
//! - **Pluggable Strategies**: Selection, crossover, mutation, and local
//!   search ("adaption") are all strategy plug points on
//!   [`PopulationSettings`]
//! - **Typed Chromosomes**: Bool, char, short, int, and double gene
//!   sequences with value bounds, drift mutation, and per-gene locks
//! - **Parallel Evaluation**: [`ParallelPopulation`] batches crossover and
//!   mutation candidates and fans fitness evaluation out over a rayon pool
//! - **Lattice SOMs**: Rectangular, hexagonal, octagonal, cube, and
//!   octagonal-prism lattices (bounded or toroidal) with Gaussian
//!   neighborhood learning over graph rings
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use archipelago::{
//!     CancelToken, Chromosome, Dna, EvolveError, Gene, Population,
//!     PopulationSettings, Species,
//! };
//!
//! // A OneMax problem: maximize the number of set bits.
//! struct OneMax;
//!
//! impl Species for OneMax {
//!     type Phenotype = Vec<bool>;
//!
//!     fn create_dna(&self) -> Result<Dna, EvolveError> {
//!         let mut dna = Dna::new();
//!         dna.add("bits", Chromosome::bool(16))?;
//!         Ok(dna)
//!     }
//!
//!     fn express(&self, dna: &Dna) -> Result<Vec<bool>, EvolveError> {
//!         let bits = dna.get("bits").ok_or(EvolveError::Disposed)?;
//!         (0..bits.len())
//!             .map(|i| match bits.gene(i)? {
//!                 Gene::Bool(b) => Ok(b),
//!                 _ => unreachable!("bool chromosome"),
//!             })
//!             .collect()
//!     }
//!
//!     fn evaluate(&self, bits: &Vec<bool>, _dna: &Dna) -> Result<f64, EvolveError> {
//!         Ok(bits.iter().filter(|&&b| b).count() as f64)
//!     }
//! }
//!
//! # fn main() -> Result<(), EvolveError> {
//! let settings = PopulationSettings {
//!     stable_size: 30,
//!     max_generations: 25,
//!     rng_seed: Some(42),
//!     ..Default::default()
//! };
//! let mut population = Population::new(Arc::new(OneMax), settings)?;
//! population.evolve(&CancelToken::new())?;
//! println!("best: {:?}", population.best().and_then(|e| e.fitness()));
//! # Ok(())
//! # }
//! ```
//!
//! ## Training a SOM
//!
//! ```rust
//! use archipelago::rng::SharedRng;
//! use archipelago::som::{DistanceNetwork, LatticeBuilder, TopologySomLearning};
//!
//! # fn main() -> Result<(), archipelago::EvolveError> {
//! let rng = SharedRng::seeded(7);
//! let builder = LatticeBuilder::hexagonal(3, 8, 8, true)?;
//! let mut network = DistanceNetwork::from_builder(&builder, &rng)?;
//!
//! let learner = TopologySomLearning::new(0.2, 3.0)?;
//! let inputs = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];
//! for _ in 0..50 {
//!     learner.run_epoch(&mut network, &inputs)?;
//! }
//! let winner = network.winner(&[0.9, 0.1, 0.0])?;
//! println!("red maps to neuron {winner}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ### Arena + Roster
//!
//! A population stores entities in a `SlotMap` arena and keeps a roster of
//! keys in fitness order. The roster is sorted descending after every
//! survival phase; crossover and mutation children are appended past
//! `original_count` mid-generation, so the Lamarck/Baldwin adaption modes
//! can address "parents" and "children" as index ranges.
//!
//! ### Migration fabric
//!
//! Islands push outbound migrants (stamped with their host id) into a
//! shared lock-free queue; the host routes each to the inbox of an island
//! the entity did not come from. Migrants stamped by a foreign host are
//! silently discarded. Trimmed entities recycle through a bounded
//! lock-free free pool instead of reallocating.
//!
//! ### Location keys
//!
//! SOM lattices address neurons by canonical string keys (`"x,y"`,
//! `"x,y,z"`, with `:O`/`:R` suffixes for octagonal cell classes) and fix
//! a neighbor order per lattice kind, so consumers can name neighbors
//! semantically (`Up`, `LeftDown`, `In`, ...) as indices into the
//! neighbor list.

pub mod adapt;
pub mod chromosome;
pub mod crossover;
pub mod dna;
pub mod entity;
pub mod error;
pub mod host;
pub mod mutate;
pub mod parallel;
pub mod population;
pub mod rng;
pub mod select;
pub mod settings;
pub mod som;
pub mod vector;

// Re-exports for convenience
pub use adapt::{Acceptance, AdaptionOp, TemperatureSchedule};
pub use chromosome::{Chromosome, ChromosomeKind, Direction, Gene};
pub use crossover::CrossoverOp;
pub use dna::Dna;
pub use entity::{Entity, EntityState, Species};
pub use error::EvolveError;
pub use host::PopulationHost;
pub use mutate::MutateOp;
pub use parallel::{ParallelPopulation, ParallelSettings};
pub use population::{CancelToken, Migrant, Population, StepOutcome};
pub use select::{EntitySelector, PairSelector};
pub use settings::{
    Elitism, Evolution, FitnessHandler, Genesis, GenerationHandler, GenerationStats,
    PopulationSettings,
};
