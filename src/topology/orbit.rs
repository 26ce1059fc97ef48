//! Orbits and typed cell handles.
//!
//! A *cell* of a combinatorial map (vertex, edge, face, volume) is an
//! equivalence class of darts under a subgroup of the φ-family. [`Orbit`]
//! names the subgroup; which permutations generate it depends on the map
//! dimension and is interpreted by each map's orbit walker.
//!
//! [`Cell<O>`] is a typed handle carrying one representative dart. Note
//! that cell *identity* is "same embedding index", not "same dart", so
//! `Cell` deliberately does not implement `PartialEq`; use
//! [`CombinatorialMap::same_cell`](crate::topology::map_base::CombinatorialMap::same_cell).

use crate::topology::dart::Dart;
use bytemuck::TransparentWrapper;
use std::fmt;
use std::marker::PhantomData;

/// The cell dimensions addressable through embeddings and attributes.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Orbit {
    Vertex,
    Edge,
    Face,
    Volume,
}

/// Number of distinct orbits a map can embed.
pub const NB_ORBITS: usize = 4;

impl Orbit {
    /// Dense index used for per-orbit tables.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Orbit::Vertex => 0,
            Orbit::Edge => 1,
            Orbit::Face => 2,
            Orbit::Volume => 3,
        }
    }

    /// All orbits, in table order.
    pub const ALL: [Orbit; NB_ORBITS] = [Orbit::Vertex, Orbit::Edge, Orbit::Face, Orbit::Volume];
}

/// Compile-time orbit tag carried by [`Cell`] and attribute handles.
pub trait CellOrbit: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    const ORBIT: Orbit;
}

macro_rules! orbit_tag {
    ($tag:ident, $orbit:expr) => {
        #[derive(Copy, Clone, PartialEq, Eq, Debug)]
        pub struct $tag;
        impl CellOrbit for $tag {
            const ORBIT: Orbit = $orbit;
        }
    };
}

orbit_tag!(VertexTag, Orbit::Vertex);
orbit_tag!(EdgeTag, Orbit::Edge);
orbit_tag!(FaceTag, Orbit::Face);
orbit_tag!(VolumeTag, Orbit::Volume);

/// A typed cell handle: one representative dart of an orbit.
///
/// `repr(transparent)` over [`Dart`], so a buffer of cells and a buffer of
/// darts have identical representation; the scratch-buffer pool exploits
/// this to lend the same storage for both (see [`crate::buffers`]).
#[repr(transparent)]
pub struct Cell<O: CellOrbit> {
    dart: Dart,
    _orbit: PhantomData<fn() -> O>,
}

// SAFETY: `Cell` is repr(transparent) with `Dart` as its only non-ZST field.
unsafe impl<O: CellOrbit> TransparentWrapper<Dart> for Cell<O> {}

impl<O: CellOrbit> Cell<O> {
    /// Wraps a representative dart.
    #[inline]
    pub const fn new(dart: Dart) -> Self {
        Cell {
            dart,
            _orbit: PhantomData,
        }
    }

    /// The representative dart.
    #[inline]
    pub const fn dart(self) -> Dart {
        self.dart
    }

    /// The orbit this handle is tagged with.
    #[inline]
    pub const fn orbit() -> Orbit {
        O::ORBIT
    }
}

impl<O: CellOrbit> Copy for Cell<O> {}
impl<O: CellOrbit> Clone for Cell<O> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<O: CellOrbit> From<Dart> for Cell<O> {
    #[inline]
    fn from(d: Dart) -> Self {
        Cell::new(d)
    }
}

impl<O: CellOrbit> fmt::Debug for Cell<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", O::ORBIT, self.dart)
    }
}

impl<O: CellOrbit> fmt::Display for Cell<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dart)
    }
}

/// Vertex cell handle.
pub type Vertex = Cell<VertexTag>;
/// Edge cell handle.
pub type Edge = Cell<EdgeTag>;
/// Face cell handle.
pub type Face = Cell<FaceTag>;
/// Volume (or connected-component) cell handle.
pub type Volume = Cell<VolumeTag>;

#[cfg(test)]
mod layout_tests {
    use super::*;
    use static_assertions::assert_eq_size;

    // If these fail, the dart-buffer/cell-buffer reinterpretation is broken.
    assert_eq_size!(Vertex, Dart);
    assert_eq_size!(Face, u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orbit_indices_are_dense() {
        for (i, o) in Orbit::ALL.iter().enumerate() {
            assert_eq!(o.index(), i);
        }
    }

    #[test]
    fn cell_carries_dart_and_orbit() {
        let v = Vertex::new(Dart::new(5));
        assert_eq!(v.dart(), Dart::new(5));
        assert_eq!(Vertex::orbit(), Orbit::Vertex);
        assert_eq!(Face::orbit(), Orbit::Face);
    }

    #[test]
    fn transparent_wrapper_roundtrip() {
        let darts = vec![Dart::new(0), Dart::new(1)];
        let cells: Vec<Vertex> = bytemuck::TransparentWrapperAlloc::wrap_vec(darts);
        assert_eq!(cells[1].dart(), Dart::new(1));
        let back: Vec<Dart> = bytemuck::TransparentWrapperAlloc::peel_vec(cells);
        assert_eq!(back, vec![Dart::new(0), Dart::new(1)]);
    }
}
