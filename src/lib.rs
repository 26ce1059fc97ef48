//! # ncmap
//!
//! ncmap is the storage and topology core of a combinatorial-geometric
//! modeling stack: combinatorial maps of dimension 1 to 3 built on a
//! chunked, columnar attribute store.
//!
//! ## What it provides
//! - [`data::container::AttributeContainer`]: a slot-addressed columnar
//!   store with stable indices, free-list reuse, compaction, and a
//!   little-endian binary persistence format
//! - [`topology::CMap1`] / [`topology::CMap2`] / [`topology::CMap3`]:
//!   dart-based maps whose phi-family permutations live in integer
//!   columns of a dart container
//! - an embedding layer mapping darts to per-orbit cell slots, kept
//!   consistent through sew/unsew operations
//! - scratch [`topology::DartMarker`]/[`topology::CellMarker`] visited
//!   sets and recycled [`buffers`] for allocation-free traversal
//!
//! ## Usage
//!
//! ```rust
//! use ncmap::prelude::*;
//!
//! # fn main() -> Result<(), ncmap::cmap_error::CMapError> {
//! let mut map = CMap2::new();
//! let f = map.add_face(3);
//! assert!(map.is_triangle(f));
//!
//! let height = map.add_attribute::<VertexTag, f32>("height")?;
//! map.attribute_mut(&height)?.fill(1.0);
//! let view = map.attribute(&height)?;
//! map.foreach_incident_vertex(f, |v| assert_eq!(view[v], 1.0));
//! # Ok(())
//! # }
//! ```
//!
//! Mutation is single-writer: serialize all topology- or
//! attribute-mutating calls on one map. Read-only traversal of a frozen
//! map may fan out (enable the `rayon` feature for parallel slot
//! iteration helpers).

pub mod buffers;
pub mod cmap_error;
pub mod data;
pub mod topology;

pub use data::{DEFAULT_CHUNK_SIZE, INVALID_INDEX};

/// A convenient prelude importing the most-used traits and types.
pub mod prelude {
    pub use crate::buffers::{dart_buffers, uint_buffers, BufferPool};
    pub use crate::cmap_error::CMapError;
    pub use crate::data::attribute::{AttributeHandle, AttributeView, AttributeViewMut};
    pub use crate::data::chunk_array::{AttributeValue, ChunkArray};
    pub use crate::data::container::AttributeContainer;
    pub use crate::data::DebugInvariants;
    pub use crate::topology::orbit::{EdgeTag, FaceTag, VertexTag, VolumeTag};
    pub use crate::topology::{
        CMap1, CMap2, CMap3, Cell, CellMarker, CellOrbit, CombinatorialMap, Dart, DartMarker,
        Edge, Face, Orbit, Vertex, Volume,
    };
}
