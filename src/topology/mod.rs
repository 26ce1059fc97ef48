//! Topology module: darts, orbits, the map types, and markers.
//!
//! Darts are the atomic elements; the maps store their phi-family
//! permutation images as integer columns of a dart container, so every
//! topological query is a cache-friendly chunked array read.

pub mod cmap1;
pub mod cmap2;
pub mod cmap3;
pub mod dart;
pub mod map_base;
pub mod marker;
pub mod orbit;

pub use cmap1::CMap1;
pub use cmap2::CMap2;
pub use cmap3::CMap3;
pub use dart::Dart;
pub use map_base::CombinatorialMap;
pub use marker::{CellMarker, DartMarker};
pub use orbit::{Cell, CellOrbit, Edge, Face, Orbit, Vertex, Volume};
