//! `CMap3`: 3-dimensional combinatorial maps (volume meshes).
//!
//! On top of φ₁ and φ₂, the involution φ₃ glues two faces of adjacent
//! volumes. A fixed point of φ₃ is an open face. Cell orbits gain a
//! generator: vertices and edges span the glued volumes, faces are
//! ⟨φ₁, φ₃⟩, volumes remain ⟨φ₁, φ₂⟩.

use crate::buffers;
use crate::cmap_debug_assert_ok;
use crate::topology::dart::Dart;
use crate::topology::map_base::{orbit_bfs, CombinatorialMap, MapBase};
use crate::topology::orbit::{Face, Orbit};

/// A 3-dimensional combinatorial map.
#[derive(Debug)]
pub struct CMap3 {
    base: MapBase,
}

impl Default for CMap3 {
    fn default() -> Self {
        Self::new()
    }
}

impl CMap3 {
    pub fn new() -> Self {
        CMap3 {
            base: MapBase::new(3),
        }
    }

    /// φ₂ image, O(1).
    #[inline]
    pub fn phi2(&self, d: Dart) -> Dart {
        self.base.phi2(d)
    }

    /// φ₃ image, O(1).
    #[inline]
    pub fn phi3(&self, d: Dart) -> Dart {
        self.base.phi3(d)
    }

    #[inline]
    pub fn is_phi2_free(&self, d: Dart) -> bool {
        self.phi2(d) == d
    }

    /// One step around the vertex of `x` through an involution
    /// (`inv` = φ₂ or φ₃): forward is inv ∘ φ₁⁻¹, `inverse` is
    /// φ₁ ∘ inv. When the involution leg is free the step is undefined
    /// and `x` itself comes back, which the orbit walker ignores.
    #[inline]
    fn vertex_gen(&self, x: Dart, inv: fn(&Self, Dart) -> Dart, inverse: bool) -> Dart {
        if inverse {
            let y = inv(self, x);
            if y == x {
                x
            } else {
                self.phi1(y)
            }
        } else {
            let y = self.phi_1(x);
            let z = inv(self, y);
            if z == y {
                x
            } else {
                z
            }
        }
    }

    #[inline]
    pub fn is_phi3_free(&self, d: Dart) -> bool {
        self.phi3(d) == d
    }

    /// Allocates an open face of `n` darts with φ₂ and φ₃ fixed on
    /// every dart.
    pub fn add_face(&mut self, n: u32) -> Face {
        let first = self.base.add_face_topo(n);
        let mut cyc = buffers::dart_buffers().acquire();
        self.collect_orbit(Orbit::Face, first, &mut cyc);
        if self.is_embedded(Orbit::Vertex) {
            for i in 0..cyc.len() {
                self.new_orbit_embedding(Orbit::Vertex, cyc[i]);
            }
        }
        if self.is_embedded(Orbit::Edge) {
            for i in 0..cyc.len() {
                self.new_orbit_embedding(Orbit::Edge, cyc[i]);
            }
        }
        if self.is_embedded(Orbit::Face) {
            self.new_orbit_embedding(Orbit::Face, first);
        }
        if self.is_embedded(Orbit::Volume) {
            self.new_orbit_embedding(Orbit::Volume, first);
        }
        buffers::dart_buffers().release(cyc);
        Face::new(first)
    }

    /// φ₂-sews two boundary darts within a volume; same contract as
    /// `CMap2::sew_faces`.
    pub fn sew_faces(&mut self, d: Dart, e: Dart) {
        debug_assert!(d != e, "sew_faces: cannot sew a dart to itself");
        self.base.phi2_sew(d, e);
        let pd = self.phi1(d);
        let pe = self.phi1(e);
        self.merge_cells(Orbit::Vertex, d, pe);
        self.merge_cells(Orbit::Vertex, e, pd);
        self.merge_cells(Orbit::Edge, d, e);
        self.merge_cells(Orbit::Volume, d, e);
        cmap_debug_assert_ok!(self.validate_topology(), "CMap3 after sew_faces");
    }

    /// φ₃-sews the face of `d` onto the face of `e`, pairing the φ₁
    /// cycle of `d` with the reversed cycle of `e`. Preconditions: both
    /// faces are φ₃-free and have equal codegree.
    pub fn sew_volumes(&mut self, d: Dart, e: Dart) {
        debug_assert_eq!(
            self.codegree(Face::new(d)),
            self.codegree(Face::new(e)),
            "sew_volumes: face codegrees differ"
        );
        let mut pairs = buffers::dart_buffers().acquire();
        let mut twins = buffers::dart_buffers().acquire();
        let mut a = d;
        let mut b = e;
        loop {
            pairs.push(a);
            twins.push(b);
            a = self.phi1(a);
            b = self.phi_1(b);
            if a == d {
                break;
            }
        }
        for i in 0..pairs.len() {
            self.base.phi3_sew(pairs[i], twins[i]);
        }
        for i in 0..pairs.len() {
            let (a, b) = (pairs[i], twins[i]);
            let pb = self.phi1(b);
            self.merge_cells(Orbit::Vertex, a, pb);
            self.merge_cells(Orbit::Edge, a, b);
        }
        self.merge_cells(Orbit::Face, d, e);
        buffers::dart_buffers().release(pairs);
        buffers::dart_buffers().release(twins);
        cmap_debug_assert_ok!(self.validate_topology(), "CMap3 after sew_volumes");
    }

    /// Detaches the face of `d` from its φ₃ twin, allocating fresh cell
    /// slots for whichever orbits become disconnected. Precondition:
    /// the face is not φ₃-free.
    pub fn unsew_volumes(&mut self, d: Dart) {
        let e = self.phi3(d);
        let mut pairs = buffers::dart_buffers().acquire();
        let mut twins = buffers::dart_buffers().acquire();
        let mut a = d;
        loop {
            pairs.push(a);
            twins.push(self.phi3(a));
            a = self.phi1(a);
            if a == d {
                break;
            }
        }
        for i in 0..pairs.len() {
            self.base.phi3_unsew(pairs[i]);
        }
        // reverse order of the merges in `sew_volumes`
        self.split_cell(Orbit::Face, d, e);
        for i in (0..pairs.len()).rev() {
            let (a, b) = (pairs[i], twins[i]);
            let pb = self.phi1(b);
            self.split_cell(Orbit::Edge, a, b);
            self.split_cell(Orbit::Vertex, a, pb);
        }
        buffers::dart_buffers().release(pairs);
        buffers::dart_buffers().release(twins);
        cmap_debug_assert_ok!(self.validate_topology(), "CMap3 after unsew_volumes");
    }
}

impl CombinatorialMap for CMap3 {
    const DIMENSION: u32 = 3;

    fn base(&self) -> &MapBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MapBase {
        &mut self.base
    }

    fn foreach_dart_of_orbit(&self, orbit: Orbit, d: Dart, f: &mut dyn FnMut(Dart)) {
        match orbit {
            // darts sharing the origin vertex, across volumes; the
            // generator set carries both compositions and their
            // inverses so boundaries cannot hide part of the orbit
            Orbit::Vertex => orbit_bfs(
                self,
                d,
                &[
                    &|x| self.vertex_gen(x, Self::phi2, false),
                    &|x| self.vertex_gen(x, Self::phi3, false),
                    &|x| self.vertex_gen(x, Self::phi2, true),
                    &|x| self.vertex_gen(x, Self::phi3, true),
                ],
                f,
            ),
            Orbit::Edge => orbit_bfs(self, d, &[&|x| self.phi2(x), &|x| self.phi3(x)], f),
            Orbit::Face => orbit_bfs(self, d, &[&|x| self.phi1(x), &|x| self.phi3(x)], f),
            Orbit::Volume => orbit_bfs(self, d, &[&|x| self.phi1(x), &|x| self.phi2(x)], f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::orbit::{EdgeTag, FaceTag, VertexTag, VolumeTag};

    #[test]
    fn open_face_counts() {
        let mut m = CMap3::new();
        let f = m.add_face(3);
        assert!(m.is_triangle(f));
        assert_eq!(m.nb_cells_of(Orbit::Vertex), 3);
        assert_eq!(m.nb_cells_of(Orbit::Face), 1);
        assert_eq!(m.nb_cells_of(Orbit::Volume), 1);
        m.validate_topology().unwrap();
    }

    #[test]
    fn sewn_volumes_share_one_face_cell() {
        let mut m = CMap3::new();
        let fa = m.add_face(3).dart();
        let fb = m.add_face(3).dart();
        m.sew_volumes(fa, fb);
        // the two cycles fuse into a single face orbit of 6 darts
        let mut face_darts = Vec::new();
        m.foreach_dart_of_orbit(Orbit::Face, fa, &mut |d| face_darts.push(d));
        assert_eq!(face_darts.len(), 6);
        assert_eq!(m.nb_cells::<FaceTag>(), 1);
        assert_eq!(m.nb_cells::<VertexTag>(), 3);
        assert_eq!(m.nb_cells::<EdgeTag>(), 3);
        assert_eq!(m.nb_cells::<VolumeTag>(), 2);
        assert_eq!(m.phi3(m.phi3(fa)), fa);
        m.validate_topology().unwrap();
    }

    #[test]
    fn sew_volumes_reconciles_embeddings() {
        let mut m = CMap3::new();
        let fa = m.add_face(4).dart();
        let fb = m.add_face(4).dart();
        m.add_attribute::<VertexTag, f32>("x").unwrap();
        m.add_attribute::<FaceTag, u32>("tag").unwrap();
        assert_eq!(m.nb_cells::<VertexTag>(), 8);
        m.sew_volumes(fa, fb);
        assert_eq!(m.nb_cells::<VertexTag>(), 4);
        assert_eq!(m.nb_cells::<FaceTag>(), 1);
        m.validate_topology().unwrap();
    }

    #[test]
    fn sew_then_unsew_volumes_restores_embeddings() {
        let mut m = CMap3::new();
        let fa = m.add_face(3).dart();
        let fb = m.add_face(3).dart();
        m.add_attribute::<VertexTag, f32>("x").unwrap();
        m.add_attribute::<EdgeTag, f32>("e").unwrap();
        m.add_attribute::<FaceTag, f32>("f").unwrap();
        let mut before = Vec::new();
        m.foreach_dart(|d| {
            before.push((
                m.base().embedding_raw(Orbit::Vertex, d),
                m.base().embedding_raw(Orbit::Edge, d),
                m.base().embedding_raw(Orbit::Face, d),
            ));
        });

        m.sew_volumes(fa, fb);
        m.unsew_volumes(fa);

        assert!(m.is_phi3_free(fa) && m.is_phi3_free(fb));
        let mut after = Vec::new();
        m.foreach_dart(|d| {
            after.push((
                m.base().embedding_raw(Orbit::Vertex, d),
                m.base().embedding_raw(Orbit::Edge, d),
                m.base().embedding_raw(Orbit::Face, d),
            ));
        });
        assert_eq!(after, before);
        m.validate_topology().unwrap();
    }

    #[test]
    fn edge_orbit_spans_both_volumes() {
        let mut m = CMap3::new();
        let fa = m.add_face(3).dart();
        let fb = m.add_face(3).dart();
        m.sew_volumes(fa, fb);
        let mut edge_darts = Vec::new();
        m.foreach_dart_of_orbit(Orbit::Edge, fa, &mut |d| edge_darts.push(d));
        edge_darts.sort_unstable();
        assert_eq!(edge_darts, vec![fa, m.phi3(fa)]);
    }
}
