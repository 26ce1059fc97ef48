//! `CMap2`: 2-dimensional combinatorial maps (surfaces).
//!
//! On top of φ₁, the involution φ₂ glues the two sides of an edge. A
//! fixed point of φ₂ is an open (boundary) edge. Cell orbits:
//! vertices = ⟨φ₁⁻¹∘φ₂⟩ (walked boundary-aware), edges = ⟨φ₂⟩,
//! faces = ⟨φ₁⟩, volumes (connected components) = ⟨φ₁, φ₂⟩.

use crate::buffers;
use crate::cmap_debug_assert_ok;
use crate::topology::dart::Dart;
use crate::topology::map_base::{orbit_bfs, CombinatorialMap, MapBase};
use crate::topology::orbit::{Face, Orbit, Vertex};

/// A 2-dimensional combinatorial map.
#[derive(Debug)]
pub struct CMap2 {
    base: MapBase,
}

impl Default for CMap2 {
    fn default() -> Self {
        Self::new()
    }
}

impl CMap2 {
    pub fn new() -> Self {
        CMap2 {
            base: MapBase::new(2),
        }
    }

    /// φ₂ image, O(1).
    #[inline]
    pub fn phi2(&self, d: Dart) -> Dart {
        self.base.phi2(d)
    }

    /// True when the edge side of `d` is unsewn (boundary).
    #[inline]
    pub fn is_phi2_free(&self, d: Dart) -> bool {
        self.phi2(d) == d
    }

    /// Allocates an open face of `n` darts: a φ₁ cycle with φ₂ fixed on
    /// every dart. Embedded orbits get fresh cell slots.
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

    /// φ₂-sews two boundary darts, merging their edge cells and the
    /// vertex cells at the glued corners. Preconditions: `d` and `e`
    /// are distinct fixed points of φ₂.
    pub fn sew_faces(&mut self, d: Dart, e: Dart) {
        debug_assert!(d != e, "sew_faces: cannot sew a dart to itself");
        self.base.phi2_sew(d, e);
        let pd = self.phi1(d);
        let pe = self.phi1(e);
        self.merge_cells(Orbit::Vertex, d, pe);
        self.merge_cells(Orbit::Vertex, e, pd);
        self.merge_cells(Orbit::Edge, d, e);
        self.merge_cells(Orbit::Volume, d, e);
        cmap_debug_assert_ok!(self.validate_topology(), "CMap2 after sew_faces");
    }

    /// Splits the edge of `d` back into two boundary edges, allocating
    /// fresh cell slots for whichever orbits become disconnected.
    /// Precondition: `d` is not a fixed point of φ₂.
    pub fn unsew_faces(&mut self, d: Dart) {
        let e = self.phi2(d);
        self.base.phi2_unsew(d);
        let pd = self.phi1(d);
        let pe = self.phi1(e);
        // reverse order of the merges in `sew_faces`, so free-list
        // reuse hands the original slots back
        self.split_cell(Orbit::Volume, d, e);
        self.split_cell(Orbit::Edge, d, e);
        self.split_cell(Orbit::Vertex, e, pd);
        self.split_cell(Orbit::Vertex, d, pe);
        cmap_debug_assert_ok!(self.validate_topology(), "CMap2 after unsew_faces");
    }

    /// Number of darts in the vertex orbit (one per incident face
    /// corner).
    pub fn degree(&self, v: Vertex) -> u32 {
        let mut n = 0;
        self.foreach_dart_of_orbit(Orbit::Vertex, v.dart(), &mut |_| n += 1);
        n
    }

    /// Umbrella walk around the vertex of `d`, correct on open maps:
    /// sweep one way until the cycle closes or a boundary stops it, then
    /// sweep the other way from `d`.
    fn foreach_dart_of_vertex(&self, d: Dart, f: &mut dyn FnMut(Dart)) {
        let mut it = d;
        loop {
            f(it);
            let prev = self.phi_1(it);
            let next = self.phi2(prev);
            if next == prev {
                break; // boundary
            }
            it = next;
            if it == d {
                return; // closed umbrella
            }
        }
        let mut it = d;
        loop {
            let twin = self.phi2(it);
            if twin == it {
                return;
            }
            it = self.phi1(twin);
            f(it);
        }
    }
}

impl CombinatorialMap for CMap2 {
    const DIMENSION: u32 = 2;

    fn base(&self) -> &MapBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MapBase {
        &mut self.base
    }

    fn foreach_dart_of_orbit(&self, orbit: Orbit, d: Dart, f: &mut dyn FnMut(Dart)) {
        match orbit {
            Orbit::Vertex => self.foreach_dart_of_vertex(d, f),
            Orbit::Edge => {
                f(d);
                let e = self.phi2(d);
                if e != d {
                    f(e);
                }
            }
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
            Orbit::Volume => {
                orbit_bfs(self, d, &[&|x| self.phi1(x), &|x| self.phi2(x)], f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::orbit::{EdgeTag, FaceTag, VertexTag, VolumeTag};

    fn two_triangles() -> (CMap2, Dart, Dart) {
        let mut m = CMap2::new();
        let a = m.add_face(3).dart();
        let b = m.add_face(3).dart();
        (m, a, b)
    }

    #[test]
    fn triangle_has_three_distinct_vertices() {
        let mut m = CMap2::new();
        let f = m.add_face(3);
        assert_eq!(m.codegree(f), 3);
        assert!(m.is_triangle(f));
        let mut verts = Vec::new();
        m.foreach_incident_vertex(f, |v| verts.push(v));
        assert_eq!(verts.len(), 3);
        for i in 0..3 {
            for j in i + 1..3 {
                assert!(!m.same_cell(verts[i], verts[j]));
            }
        }
        m.validate_topology().unwrap();
    }

    #[test]
    fn quad_is_not_a_triangle() {
        let mut m = CMap2::new();
        let f = m.add_face(4);
        assert!(!m.is_triangle(f));
        let g = m.add_face(1);
        assert!(!m.is_triangle(g));
    }

    #[test]
    fn glued_triangles_have_4_5_2_cells() {
        let (mut m, a, b) = two_triangles();
        m.sew_faces(a, b);
        assert_eq!(m.nb_cells::<VertexTag>(), 4);
        assert_eq!(m.nb_cells::<EdgeTag>(), 5);
        assert_eq!(m.nb_cells::<FaceTag>(), 2);
        assert_eq!(m.nb_cells::<VolumeTag>(), 1);
        m.validate_topology().unwrap();
    }

    #[test]
    fn glued_triangles_cell_counts_with_embeddings() {
        let (mut m, a, b) = two_triangles();
        // embed everything before sewing, so the sew has to reconcile
        m.add_attribute::<VertexTag, f32>("vx").unwrap();
        m.add_attribute::<EdgeTag, f32>("ex").unwrap();
        m.add_attribute::<FaceTag, f32>("fx").unwrap();
        assert_eq!(m.nb_cells::<VertexTag>(), 6);
        assert_eq!(m.nb_cells::<EdgeTag>(), 6);
        m.sew_faces(a, b);
        assert_eq!(m.nb_cells::<VertexTag>(), 4);
        assert_eq!(m.nb_cells::<EdgeTag>(), 5);
        assert_eq!(m.nb_cells::<FaceTag>(), 2);
        m.validate_topology().unwrap();
    }

    #[test]
    fn sewn_corners_share_vertex_cells() {
        let (mut m, a, b) = two_triangles();
        m.add_attribute::<VertexTag, f32>("x").unwrap();
        m.sew_faces(a, b);
        // origin of a coincides with the end of b, and vice versa
        assert!(m.same_cell(Vertex::new(a), Vertex::new(m.phi1(b))));
        assert!(m.same_cell(Vertex::new(b), Vertex::new(m.phi1(a))));
        assert!(!m.same_cell(Vertex::new(a), Vertex::new(b)));
    }

    #[test]
    fn sew_then_unsew_restores_topology_and_embeddings() {
        let (mut m, a, b) = two_triangles();
        m.add_attribute::<VertexTag, f32>("x").unwrap();
        m.add_attribute::<EdgeTag, f32>("e").unwrap();
        let before_counts = (m.nb_cells::<VertexTag>(), m.nb_cells::<EdgeTag>());
        let mut before_v = Vec::new();
        let mut before_e = Vec::new();
        m.foreach_dart(|d| {
            before_v.push(m.base().embedding_raw(Orbit::Vertex, d));
            before_e.push(m.base().embedding_raw(Orbit::Edge, d));
        });

        m.sew_faces(a, b);
        m.unsew_faces(a);

        assert!(m.is_phi2_free(a) && m.is_phi2_free(b));
        assert_eq!(
            (m.nb_cells::<VertexTag>(), m.nb_cells::<EdgeTag>()),
            before_counts
        );
        let mut after_v = Vec::new();
        let mut after_e = Vec::new();
        m.foreach_dart(|d| {
            after_v.push(m.base().embedding_raw(Orbit::Vertex, d));
            after_e.push(m.base().embedding_raw(Orbit::Edge, d));
        });
        assert_eq!(after_v, before_v);
        assert_eq!(after_e, before_e);
        assert!(!m.same_cell(Vertex::new(a), Vertex::new(m.phi1(b))));
        m.validate_topology().unwrap();
    }

    #[test]
    fn sewing_merges_embedded_volumes() {
        let (mut m, a, b) = two_triangles();
        m.add_attribute::<VolumeTag, u32>("part").unwrap();
        assert_eq!(m.nb_cells::<VolumeTag>(), 2);
        m.sew_faces(a, b);
        assert_eq!(m.nb_cells::<VolumeTag>(), 1);
        m.unsew_faces(a);
        assert_eq!(m.nb_cells::<VolumeTag>(), 2);
        m.validate_topology().unwrap();
    }

    #[test]
    fn vertex_degree_counts_corners() {
        let (mut m, a, b) = two_triangles();
        m.sew_faces(a, b);
        // the vertex at the glued corner has a corner in each triangle
        assert_eq!(m.degree(Vertex::new(a)), 2);
        // an open corner belongs to one triangle only
        assert_eq!(m.degree(Vertex::new(m.phi_1(a))), 1);
    }

    #[test]
    fn foreach_cell_visits_each_orbit_once_in_first_seen_order() {
        let (mut m, a, b) = two_triangles();
        m.sew_faces(a, b);
        let mut faces = Vec::new();
        m.foreach_cell::<FaceTag, _>(|f| faces.push(f.dart()));
        assert_eq!(faces, vec![Dart::new(0), Dart::new(3)]);
        let mut edges = Vec::new();
        m.foreach_cell::<EdgeTag, _>(|e| edges.push(e.dart()));
        assert_eq!(edges.len(), 5);
    }

    #[test]
    fn attribute_write_through_handle_reads_back_per_vertex() {
        let mut m = CMap2::new();
        let f = m.add_face(3);
        let h = m.add_attribute::<VertexTag, f32>("x").unwrap();
        m.attribute_mut(&h).unwrap().fill(3.0);
        let view = m.attribute(&h).unwrap();
        let mut n = 0;
        m.foreach_incident_vertex(f, |v| {
            assert_eq!(view[v], 3.0);
            n += 1;
        });
        assert_eq!(n, 3);
    }

    #[test]
    fn compact_after_churn_preserves_topology() {
        let (mut m, a, b) = two_triangles();
        m.add_attribute::<VertexTag, f32>("x").unwrap();
        m.sew_faces(a, b);
        m.unsew_faces(a);
        m.compact();
        assert_eq!(m.nb_darts(), 6);
        assert_eq!(m.nb_cells::<VertexTag>(), 6);
        m.validate_topology().unwrap();
    }

    #[test]
    fn save_load_roundtrip() {
        let (mut m, a, b) = two_triangles();
        let h = m.add_attribute::<VertexTag, f32>("x").unwrap();
        m.sew_faces(a, b);
        m.attribute_mut(&h).unwrap().fill(1.5);

        let mut buf = Vec::new();
        m.save(&mut buf).unwrap();

        let mut m2 = CMap2::new();
        m2.load(&mut buf.as_slice()).unwrap();
        assert_eq!(m2.nb_darts(), 6);
        assert_eq!(m2.nb_cells::<VertexTag>(), 4);
        assert_eq!(m2.phi2(a), m.phi2(a));
        let h2 = m2.get_attribute::<VertexTag, f32>("x").unwrap();
        let view = m2.attribute(&h2).unwrap();
        assert!(view.iter().all(|&v| v == 1.5));
        m2.validate_topology().unwrap();
    }
}
