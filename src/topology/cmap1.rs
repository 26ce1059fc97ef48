//! `CMap1`: 1-dimensional combinatorial maps.
//!
//! The topology is a single cyclic permutation φ₁ on the dart set;
//! orbits of φ₁ are the faces, single darts are the vertices.

use crate::buffers;
use crate::topology::dart::Dart;
use crate::topology::map_base::{CombinatorialMap, MapBase};
use crate::topology::orbit::{Face, Orbit};

/// A 1-dimensional combinatorial map: cycles of darts under φ₁.
#[derive(Debug)]
pub struct CMap1 {
    base: MapBase,
}

impl Default for CMap1 {
    fn default() -> Self {
        Self::new()
    }
}

impl CMap1 {
    pub fn new() -> Self {
        CMap1 {
            base: MapBase::new(1),
        }
    }

    /// Allocates `n` darts wired into a φ₁ cycle and returns the face.
    /// Embedded orbits of the new darts get fresh cell slots.
    pub fn add_face(&mut self, n: u32) -> Face {
        let first = self.base.add_face_topo(n);
        let mut cyc = buffers::dart_buffers().acquire();
        self.collect_orbit(Orbit::Face, first, &mut cyc);
        if self.is_embedded(Orbit::Vertex) {
            for i in 0..cyc.len() {
                self.new_orbit_embedding(Orbit::Vertex, cyc[i]);
            }
        }
        if self.is_embedded(Orbit::Face) {
            self.new_orbit_embedding(Orbit::Face, first);
        }
        buffers::dart_buffers().release(cyc);
        Face::new(first)
    }

    /// Deletes an entire face: every dart of the φ₁ cycle is freed and
    /// its embeddings released. Outstanding darts of the face become
    /// dangling.
    pub fn remove_face(&mut self, f: Face) {
        let mut cyc = buffers::dart_buffers().acquire();
        self.collect_orbit(Orbit::Face, f.dart(), &mut cyc);
        for i in 0..cyc.len() {
            self.base.delete_dart(cyc[i]);
        }
        buffers::dart_buffers().release(cyc);
    }
}

impl CombinatorialMap for CMap1 {
    const DIMENSION: u32 = 1;

    fn base(&self) -> &MapBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MapBase {
        &mut self.base
    }

    /// Vertex orbit = {d}; face orbit = the φ₁ cycle. Edge and volume
    /// orbits are not defined in dimension 1 and panic.
    fn foreach_dart_of_orbit(&self, orbit: Orbit, d: Dart, f: &mut dyn FnMut(Dart)) {
        match orbit {
            Orbit::Vertex => f(d),
            Orbit::Face => {
                let mut it = d;
                loop {
                    f(it);
                    it = self.phi1(it);
                    if it == d {
                        break;
                    }
                }
            }
            other => unreachable!("CMap1 does not define {other:?} orbits"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::orbit::{Vertex, VertexTag};

    #[test]
    fn add_face_wires_a_cycle() {
        let mut m = CMap1::new();
        let f = m.add_face(4);
        let d = f.dart();
        assert_eq!(m.codegree(f), 4);
        let mut it = d;
        for _ in 0..4 {
            assert_eq!(m.phi_1(m.phi1(it)), it);
            it = m.phi1(it);
        }
        assert_eq!(it, d);
        assert_eq!(m.nb_darts(), 4);
        m.validate_topology().unwrap();
    }

    #[test]
    fn single_dart_face_is_a_fixed_point() {
        let mut m = CMap1::new();
        let f = m.add_face(1);
        assert_eq!(m.phi1(f.dart()), f.dart());
        assert_eq!(m.codegree(f), 1);
    }

    #[test]
    fn cell_counts_without_embeddings() {
        let mut m = CMap1::new();
        m.add_face(3);
        m.add_face(5);
        assert_eq!(m.nb_cells_of(Orbit::Face), 2);
        assert_eq!(m.nb_cells_of(Orbit::Vertex), 8);
    }

    #[test]
    fn remove_face_frees_darts_and_cells() {
        let mut m = CMap1::new();
        let keep = m.add_face(3);
        let gone = m.add_face(4);
        m.add_attribute::<VertexTag, f32>("x").unwrap();
        assert_eq!(m.nb_darts(), 7);
        assert_eq!(m.nb_cells_of(Orbit::Vertex), 7);

        m.remove_face(gone);
        assert_eq!(m.nb_darts(), 3);
        assert_eq!(m.nb_cells_of(Orbit::Vertex), 3);
        assert_eq!(m.codegree(keep), 3);
        m.validate_topology().unwrap();

        // freed dart slots are reused by the next face
        let f2 = m.add_face(2);
        assert!(f2.dart().index() < 7);
        m.validate_topology().unwrap();
    }

    #[test]
    fn vertex_attribute_on_cmap1() {
        let mut m = CMap1::new();
        let f = m.add_face(3);
        let h = m.add_attribute::<VertexTag, u32>("id").unwrap();
        let mut view = m.attribute_mut(&h).unwrap();
        let mut k = 0;
        view.for_each_mut(|_, v| {
            *v = k;
            k += 1;
        });
        let view = m.attribute(&h).unwrap();
        let mut seen: Vec<u32> = Vec::new();
        let mut it = f.dart();
        for _ in 0..3 {
            seen.push(view[Vertex::new(it)]);
            it = m.phi1(it);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
