//! Lattice builders and the topology map.
//!
//! A [`LatticeBuilder`] maps flat neuron indices onto a 2-D or 3-D lattice
//! and produces, per node, a canonical string location key plus an ordered
//! neighbor-key list. The neighbor order is part of the contract: SOM
//! consumers address neighbors by semantic position (`Up`, `LeftDown`,
//! `In`, ...) as indices into the list, with a schema fixed per lattice
//! kind. Bounded lattices encode missing neighbors as empty strings;
//! toroidal lattices wrap and never produce empty keys.
//!
//! Octagonal lattices tile octagon cells (`:O` suffix, coordinates with
//! equal parity) with rhombus filler cells (`:R`); their toroidal variants
//! need even axis lengths so the parity classes survive the wrap.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EvolveError;
use crate::rng::SharedRng;

/// Supported lattice shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatticeKind {
    /// 2-D grid, 4 neighbors.
    Rectangular,
    /// 2-D hex tiling, 6 neighbors, row-parity dependent offsets.
    Hexagonal,
    /// 2-D octagon/rhombus tiling, 8 or 4 neighbors.
    Octagonal,
    /// 3-D grid, 6 neighbors.
    Cube,
    /// 3-D octagon/rhombus prism, 10 or 6 neighbors.
    OctagonalPrism,
}

/// Initial weight assignment for the distance layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WeightInit {
    /// Every element of node `i` equals `min + i * (max - min) / total`.
    Linear { min: f64, max: f64 },
    /// Each element drawn uniformly from `[min, max]`.
    Randomised { min: f64, max: f64 },
}

/// One node's place in the lattice: its key, its ordered neighbor keys,
/// and its flat index into the distance layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronLocation {
    /// Canonical location key (see the builder's key schema).
    pub key: String,
    /// Neighbor keys in the lattice's fixed order; empty strings mark
    /// bounded edges.
    pub neighbors: Vec<String>,
    /// Index of the owning neuron in the layer.
    pub index: usize,
}

/// Lattice geometry plus weight initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeBuilder {
    kind: LatticeKind,
    input_size: usize,
    width: usize,
    height: usize,
    depth: usize,
    toroidal: bool,
    weight_init: WeightInit,
}

fn check_dims(dims: &[(&str, usize)]) -> Result<(), EvolveError> {
    for &(name, value) in dims {
        if value == 0 {
            return Err(EvolveError::ArgumentOutOfRange(format!(
                "{name} must be positive"
            )));
        }
    }
    Ok(())
}

fn check_even_for_torus(dims: &[(&str, usize)]) -> Result<(), EvolveError> {
    for &(name, value) in dims {
        if value % 2 != 0 {
            return Err(EvolveError::ArgumentOutOfRange(format!(
                "toroidal octagonal lattices need even {name}, got {value}"
            )));
        }
    }
    Ok(())
}

impl LatticeBuilder {
    /// Rectangular 2-D lattice.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for zero dimensions.
    pub fn rectangular(
        input_size: usize,
        width: usize,
        height: usize,
        toroidal: bool,
    ) -> Result<Self, EvolveError> {
        check_dims(&[("input_size", input_size), ("width", width), ("height", height)])?;
        Ok(Self {
            kind: LatticeKind::Rectangular,
            input_size,
            width,
            height,
            depth: 1,
            toroidal,
            weight_init: WeightInit::Randomised { min: 0.0, max: 1.0 },
        })
    }

    /// Hexagonal 2-D lattice.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for zero dimensions.
    pub fn hexagonal(
        input_size: usize,
        width: usize,
        height: usize,
        toroidal: bool,
    ) -> Result<Self, EvolveError> {
        let mut builder = Self::rectangular(input_size, width, height, toroidal)?;
        builder.kind = LatticeKind::Hexagonal;
        Ok(builder)
    }

    /// Octagonal 2-D lattice. Toroidal variants need even width and
    /// height.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for zero dimensions or odd toroidal axes.
    pub fn octagonal(
        input_size: usize,
        width: usize,
        height: usize,
        toroidal: bool,
    ) -> Result<Self, EvolveError> {
        if toroidal {
            check_even_for_torus(&[("width", width), ("height", height)])?;
        }
        let mut builder = Self::rectangular(input_size, width, height, toroidal)?;
        builder.kind = LatticeKind::Octagonal;
        Ok(builder)
    }

    /// Cube 3-D lattice.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for zero dimensions.
    pub fn cube(
        input_size: usize,
        width: usize,
        height: usize,
        depth: usize,
        toroidal: bool,
    ) -> Result<Self, EvolveError> {
        check_dims(&[
            ("input_size", input_size),
            ("width", width),
            ("height", height),
            ("depth", depth),
        ])?;
        Ok(Self {
            kind: LatticeKind::Cube,
            input_size,
            width,
            height,
            depth,
            toroidal,
            weight_init: WeightInit::Randomised { min: 0.0, max: 1.0 },
        })
    }

    /// Octagonal-prism 3-D lattice. Toroidal variants need all three axes
    /// even.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for zero dimensions or odd toroidal axes.
    pub fn octagonal_prism(
        input_size: usize,
        width: usize,
        height: usize,
        depth: usize,
        toroidal: bool,
    ) -> Result<Self, EvolveError> {
        if toroidal {
            check_even_for_torus(&[("width", width), ("height", height), ("depth", depth)])?;
        }
        let mut builder = Self::cube(input_size, width, height, depth, toroidal)?;
        builder.kind = LatticeKind::OctagonalPrism;
        Ok(builder)
    }

    /// Replace the weight-initialization mode.
    #[must_use]
    pub fn with_weight_init(mut self, weight_init: WeightInit) -> Self {
        self.weight_init = weight_init;
        self
    }

    /// The lattice shape.
    #[must_use]
    pub fn kind(&self) -> LatticeKind {
        self.kind
    }

    /// Input vector dimensionality.
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

    /// Lattice depth (1 for 2-D kinds).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether edges wrap.
    #[must_use]
    pub fn toroidal(&self) -> bool {
        self.toroidal
    }

    /// Product of the lattice dimensions.
    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.width * self.height * self.depth
    }

    fn coords(&self, index: usize) -> (usize, usize, usize) {
        let x = index % self.width;
        let y = (index / self.width) % self.height;
        let z = index / (self.width * self.height);
        (x, y, z)
    }

    fn is_octagon(x: usize, y: usize) -> bool {
        x % 2 == y % 2
    }

    fn format_key(&self, x: usize, y: usize, z: usize) -> String {
        match self.kind {
            LatticeKind::Rectangular | LatticeKind::Hexagonal => format!("{x},{y}"),
            LatticeKind::Octagonal => {
                let suffix = if Self::is_octagon(x, y) { "O" } else { "R" };
                format!("{x},{y}:{suffix}")
            }
            LatticeKind::Cube => format!("{x},{y},{z}"),
            LatticeKind::OctagonalPrism => {
                let suffix = if Self::is_octagon(x, y) { "O" } else { "R" };
                format!("{x},{y},{z}:{suffix}")
            }
        }
    }

    /// Canonical location key of the node at flat index `index`.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for an index outside `[0, total_nodes)`.
    pub fn location_from_index(&self, index: usize) -> Result<String, EvolveError> {
        if index >= self.total_nodes() {
            return Err(EvolveError::index(index, self.total_nodes()));
        }
        let (x, y, z) = self.coords(index);
        Ok(self.format_key(x, y, z))
    }

    /// Location key for signed coordinates: wraps each axis when the
    /// lattice is toroidal, returns the empty string when any coordinate
    /// is out of range on a bounded lattice.
    #[must_use]
    pub fn location_from_coord(&self, x: i64, y: i64, z: i64) -> String {
        let wrap = |value: i64, len: usize| -> Option<usize> {
            let len_i = len as i64;
            if self.toroidal {
                Some(value.rem_euclid(len_i) as usize)
            } else if (0..len_i).contains(&value) {
                Some(value as usize)
            } else {
                None
            }
        };
        match (
            wrap(x, self.width),
            wrap(y, self.height),
            wrap(z, self.depth),
        ) {
            (Some(x), Some(y), Some(z)) => self.format_key(x, y, z),
            _ => String::new(),
        }
    }

    /// Initial weight vector of the node at `index`.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for an index outside `[0, total_nodes)`.
    pub fn weights_at_index(&self, index: usize, rng: &SharedRng) -> Result<Vec<f64>, EvolveError> {
        if index >= self.total_nodes() {
            return Err(EvolveError::index(index, self.total_nodes()));
        }
        Ok(match self.weight_init {
            WeightInit::Linear { min, max } => {
                let value = min + index as f64 * (max - min) / self.total_nodes() as f64;
                vec![value; self.input_size]
            }
            WeightInit::Randomised { min, max } => (0..self.input_size)
                .map(|_| min + rng.next_double() * (max - min))
                .collect(),
        })
    }

    /// Ordered neighbor offsets for the node at `(x, y)` (planar part).
    fn planar_offsets(&self, x: usize, y: usize) -> Vec<(i64, i64)> {
        match self.kind {
            LatticeKind::Rectangular | LatticeKind::Cube => {
                // Up, Down, Left, Right
                vec![(0, -1), (0, 1), (-1, 0), (1, 0)]
            }
            LatticeKind::Hexagonal => {
                if y % 2 == 0 {
                    // LeftUp, Up, RightUp, Right, Down, Left
                    vec![(-1, -1), (0, -1), (1, -1), (1, 0), (0, 1), (-1, 0)]
                } else {
                    // Left, Up, Right, RightDown, Down, LeftDown
                    vec![(-1, 0), (0, -1), (1, 0), (1, 1), (0, 1), (-1, 1)]
                }
            }
            LatticeKind::Octagonal | LatticeKind::OctagonalPrism => {
                if Self::is_octagon(x, y) {
                    // LeftUp, Up, RightUp, Left, Right, LeftDown, Down, RightDown
                    vec![
                        (-1, -1),
                        (0, -1),
                        (1, -1),
                        (-1, 0),
                        (1, 0),
                        (-1, 1),
                        (0, 1),
                        (1, 1),
                    ]
                } else {
                    // Rhombus filler: Up, Down, Left, Right
                    vec![(0, -1), (0, 1), (-1, 0), (1, 0)]
                }
            }
        }
    }

    /// Build the location record for the node at flat index `index`.
    ///
    /// # Errors
    ///
    /// `ArgumentOutOfRange` for an index outside `[0, total_nodes)`.
    pub fn create_node(&self, index: usize) -> Result<NeuronLocation, EvolveError> {
        let key = self.location_from_index(index)?;
        let (x, y, z) = self.coords(index);
        let (xi, yi, zi) = (x as i64, y as i64, z as i64);

        let mut neighbors: Vec<String> = self
            .planar_offsets(x, y)
            .into_iter()
            .map(|(dx, dy)| self.location_from_coord(xi + dx, yi + dy, zi))
            .collect();

        match self.kind {
            // Cube: ... In(z+1), Out(z-1)
            LatticeKind::Cube => {
                neighbors.push(self.location_from_coord(xi, yi, zi + 1));
                neighbors.push(self.location_from_coord(xi, yi, zi - 1));
            }
            // Prism: planar ring first, then In(z-1), Out(z+1)
            LatticeKind::OctagonalPrism => {
                neighbors.push(self.location_from_coord(xi, yi, zi - 1));
                neighbors.push(self.location_from_coord(xi, yi, zi + 1));
            }
            _ => {}
        }

        Ok(NeuronLocation {
            key,
            neighbors,
            index,
        })
    }
}

/// Key-addressed view of a whole lattice: every node's location record
/// plus index lookups for neighbor resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyMap {
    locations: HashMap<String, NeuronLocation>,
    keys_by_index: Vec<String>,
}

impl TopologyMap {
    /// Materialize every node of the lattice.
    ///
    /// # Errors
    ///
    /// Propagates builder errors.
    pub fn build(builder: &LatticeBuilder) -> Result<Self, EvolveError> {
        let total = builder.total_nodes();
        let mut locations = HashMap::with_capacity(total);
        let mut keys_by_index = Vec::with_capacity(total);
        for index in 0..total {
            let node = builder.create_node(index)?;
            keys_by_index.push(node.key.clone());
            locations.insert(node.key.clone(), node);
        }
        Ok(Self {
            locations,
            keys_by_index,
        })
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys_by_index.len()
    }

    /// `true` for an empty map.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys_by_index.is_empty()
    }

    /// Location record by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&NeuronLocation> {
        self.locations.get(key)
    }

    /// Location record of the neuron at flat `index`.
    #[must_use]
    pub fn location_of(&self, index: usize) -> Option<&NeuronLocation> {
        self.keys_by_index
            .get(index)
            .and_then(|key| self.locations.get(key))
    }

    /// Resolve a neighbor key to a neuron index. Empty keys (bounded
    /// edges) resolve to `None`.
    ///
    /// # Errors
    ///
    /// `UnresolvedNeighbor` when a non-empty key is absent from the map,
    /// indicating a builder/toroidal mismatch.
    pub fn neighbor_index(&self, key: &str) -> Result<Option<usize>, EvolveError> {
        if key.is_empty() {
            return Ok(None);
        }
        self.locations
            .get(key)
            .map(|location| Some(location.index))
            .ok_or_else(|| EvolveError::UnresolvedNeighbor(key.to_owned()))
    }
}
