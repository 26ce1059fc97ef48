//! Shared state and behaviour of the 1/2/3-dimensional maps.
//!
//! [`MapBase`] owns the dart container (whose columns hold the φ-family
//! permutation images and the per-orbit embedding indices) and one
//! attribute container per orbit. The φ columns are ordinary `u32`
//! columns of the dart container, so persistence and compaction treat
//! topology and user attributes uniformly.
//!
//! [`CombinatorialMap`] is implemented by `CMap1`/`CMap2`/`CMap3`; the
//! single required primitive is the orbit walker, everything else
//! (dart/cell enumeration, embedding maintenance, attribute access,
//! compaction, persistence) is provided on top of it.

use crate::buffers;
use crate::cmap_debug_assert_ok;
use crate::cmap_error::CMapError;
use crate::data::attribute::{AttributeHandle, AttributeView, AttributeViewMut};
use crate::data::chunk_array::{AttributeValue, ChunkArray};
use crate::data::container::AttributeContainer;
use crate::data::{DebugInvariants, INVALID_INDEX};
use crate::topology::dart::Dart;
use crate::topology::marker::DartMarker;
use crate::topology::orbit::{Cell, CellOrbit, Face, Orbit, Vertex, NB_ORBITS};
use std::io::{Read, Write};
use std::marker::PhantomData;

/// Reserved dart-container column names, one embedding column per orbit.
const EMB_NAMES: [&str; NB_ORBITS] = ["emb_vertex", "emb_edge", "emb_face", "emb_volume"];

/// Dart container plus per-orbit cell containers and embedding indices.
#[derive(Debug)]
pub struct MapBase {
    pub(crate) topo: AttributeContainer,
    pub(crate) cells: [AttributeContainer; NB_ORBITS],
    phi1_col: u32,
    phi_1_col: u32,
    phi2_col: Option<u32>,
    phi3_col: Option<u32>,
    emb_cols: [Option<u32>; NB_ORBITS],
}

impl MapBase {
    pub(crate) fn new(dimension: u32) -> Self {
        let mut topo = AttributeContainer::new();
        let phi1_col = topo.add_attribute::<u32>("phi1").expect("fresh container").idx;
        let phi_1_col = topo.add_attribute::<u32>("phi_1").expect("fresh container").idx;
        let phi2_col = (dimension >= 2)
            .then(|| topo.add_attribute::<u32>("phi2").expect("fresh container").idx);
        let phi3_col = (dimension >= 3)
            .then(|| topo.add_attribute::<u32>("phi3").expect("fresh container").idx);
        MapBase {
            topo,
            cells: std::array::from_fn(|_| AttributeContainer::new()),
            phi1_col,
            phi_1_col,
            phi2_col,
            phi3_col,
            emb_cols: [None; NB_ORBITS],
        }
    }

    // --- permutation primitives ----------------------------------------------

    #[inline]
    pub(crate) fn phi1(&self, d: Dart) -> Dart {
        Dart::new(self.topo.u32_column(self.phi1_col)[d.index()])
    }

    #[inline]
    pub(crate) fn phi_1(&self, d: Dart) -> Dart {
        Dart::new(self.topo.u32_column(self.phi_1_col)[d.index()])
    }

    #[inline]
    pub(crate) fn phi2(&self, d: Dart) -> Dart {
        let col = self.phi2_col.expect("map dimension >= 2");
        Dart::new(self.topo.u32_column(col)[d.index()])
    }

    #[inline]
    pub(crate) fn phi3(&self, d: Dart) -> Dart {
        let col = self.phi3_col.expect("map dimension >= 3");
        Dart::new(self.topo.u32_column(col)[d.index()])
    }

    /// Sets φ₁(a) = b and φ₁⁻¹(b) = a.
    pub(crate) fn phi1_link(&mut self, a: Dart, b: Dart) {
        self.topo.u32_column_mut(self.phi1_col).set(a.index(), b.index());
        self.topo.u32_column_mut(self.phi_1_col).set(b.index(), a.index());
    }

    /// φ₂-sews two unsewn darts. Precondition: both are fixed points.
    pub(crate) fn phi2_sew(&mut self, a: Dart, b: Dart) {
        debug_assert!(self.phi2(a) == a, "phi2_sew: {a} already sewn");
        debug_assert!(self.phi2(b) == b, "phi2_sew: {b} already sewn");
        let col = self.phi2_col.expect("map dimension >= 2");
        self.topo.u32_column_mut(col).set(a.index(), b.index());
        self.topo.u32_column_mut(col).set(b.index(), a.index());
    }

    /// Restores φ₂ self-pairing on `a` and its twin.
    pub(crate) fn phi2_unsew(&mut self, a: Dart) {
        let b = self.phi2(a);
        debug_assert!(b != a, "phi2_unsew: {a} is a fixed point");
        let col = self.phi2_col.expect("map dimension >= 2");
        self.topo.u32_column_mut(col).set(a.index(), a.index());
        self.topo.u32_column_mut(col).set(b.index(), b.index());
    }

    pub(crate) fn phi3_sew(&mut self, a: Dart, b: Dart) {
        debug_assert!(self.phi3(a) == a, "phi3_sew: {a} already sewn");
        debug_assert!(self.phi3(b) == b, "phi3_sew: {b} already sewn");
        let col = self.phi3_col.expect("map dimension >= 3");
        self.topo.u32_column_mut(col).set(a.index(), b.index());
        self.topo.u32_column_mut(col).set(b.index(), a.index());
    }

    pub(crate) fn phi3_unsew(&mut self, a: Dart) {
        let b = self.phi3(a);
        debug_assert!(b != a, "phi3_unsew: {a} is a fixed point");
        let col = self.phi3_col.expect("map dimension >= 3");
        self.topo.u32_column_mut(col).set(a.index(), a.index());
        self.topo.u32_column_mut(col).set(b.index(), b.index());
    }

    /// Allocates a dart slot with every φ image a fixed point and every
    /// embedding unassigned.
    pub(crate) fn new_dart(&mut self) -> Dart {
        let i = self.topo.insert_lines(1);
        self.topo.u32_column_mut(self.phi1_col).set(i, i);
        self.topo.u32_column_mut(self.phi_1_col).set(i, i);
        if let Some(col) = self.phi2_col {
            self.topo.u32_column_mut(col).set(i, i);
        }
        if let Some(col) = self.phi3_col {
            self.topo.u32_column_mut(col).set(i, i);
        }
        let embs = self.emb_cols;
        for col in embs.into_iter().flatten() {
            self.topo.u32_column_mut(col).set(i, INVALID_INDEX);
        }
        Dart::new(i)
    }

    /// Frees a dart slot. The caller must have detached it from every
    /// permutation first.
    pub(crate) fn delete_dart(&mut self, d: Dart) {
        let embs = self.emb_cols;
        for (o, col) in embs.into_iter().enumerate() {
            if let Some(col) = col {
                let e = self.topo.u32_column(col)[d.index()];
                if e != INVALID_INDEX {
                    self.topo.u32_column_mut(col).set(d.index(), INVALID_INDEX);
                    self.cells[o].unref_line(e);
                }
            }
        }
        self.topo.remove_line(d.index());
    }

    /// Allocates `n` darts wired into a φ₁ cycle; returns the first.
    pub(crate) fn add_face_topo(&mut self, n: u32) -> Dart {
        debug_assert!(n >= 1, "a face needs at least one dart");
        let first = self.new_dart();
        let mut prev = first;
        for _ in 1..n {
            let d = self.new_dart();
            self.phi1_link(prev, d);
            prev = d;
        }
        self.phi1_link(prev, first);
        first
    }

    // --- embeddings -----------------------------------------------------------

    #[inline]
    pub(crate) fn emb_col(&self, orbit: Orbit) -> Option<u32> {
        self.emb_cols[orbit.index()]
    }

    #[inline]
    pub(crate) fn embedding_raw(&self, orbit: Orbit, d: Dart) -> u32 {
        let col = self.emb_cols[orbit.index()].expect("orbit embedded");
        self.topo.u32_column(col)[d.index()]
    }

    /// Rebinds one dart to a cell slot, maintaining the cell refcounts.
    pub(crate) fn set_embedding_raw(&mut self, orbit: Orbit, d: Dart, slot: u32) {
        let col = self.emb_cols[orbit.index()].expect("orbit embedded");
        let old = self.topo.u32_column(col)[d.index()];
        if old == slot {
            return;
        }
        self.cells[orbit.index()].ref_line(slot);
        self.topo.u32_column_mut(col).set(d.index(), slot);
        if old != INVALID_INDEX {
            self.cells[orbit.index()].unref_line(old);
        }
    }

    /// Split borrow used by the mutable attribute view: the orbit's cell
    /// container mutably, its embedding column shared.
    pub(crate) fn cell_container_and_emb_mut(
        &mut self,
        orbit: Orbit,
    ) -> Result<(&mut AttributeContainer, &ChunkArray<u32>), CMapError> {
        let col = self.emb_cols[orbit.index()].ok_or(CMapError::MissingEmbedding(orbit))?;
        let emb = self.topo.u32_column(col);
        let cont = &mut self.cells[orbit.index()];
        Ok((cont, emb))
    }

    fn install_embedding_column(&mut self, orbit: Orbit) -> Result<u32, CMapError> {
        let idx = self.topo.add_attribute::<u32>(EMB_NAMES[orbit.index()])?.idx;
        self.emb_cols[orbit.index()] = Some(idx);
        let live: Vec<u32> = self.topo.live_slots().collect();
        for i in live {
            self.topo.u32_column_mut(idx).set(i, INVALID_INDEX);
        }
        Ok(idx)
    }

    fn rebind_loaded_columns(&mut self, dimension: u32) -> Result<(), CMapError> {
        self.phi1_col = self.topo.get_attribute::<u32>("phi1")?.idx;
        self.phi_1_col = self.topo.get_attribute::<u32>("phi_1")?.idx;
        self.phi2_col = if dimension >= 2 {
            Some(self.topo.get_attribute::<u32>("phi2")?.idx)
        } else {
            None
        };
        self.phi3_col = if dimension >= 3 {
            Some(self.topo.get_attribute::<u32>("phi3")?.idx)
        } else {
            None
        };
        for orbit in Orbit::ALL {
            self.emb_cols[orbit.index()] = self
                .topo
                .get_attribute::<u32>(EMB_NAMES[orbit.index()])
                .ok()
                .map(|h| h.idx);
        }
        Ok(())
    }
}

/// Walks the orbit generated by `gens` from `d`, visiting each dart
/// once. Fixed points of a generator are harmless, so this walker is
/// correct on open (partially sewn) maps.
pub(crate) fn orbit_bfs<M: CombinatorialMap>(
    map: &M,
    d: Dart,
    gens: &[&dyn Fn(Dart) -> Dart],
    f: &mut dyn FnMut(Dart),
) {
    let mut marker = DartMarker::new(map);
    let mut stack = buffers::dart_buffers().acquire();
    marker.mark(d);
    stack.push(d);
    while let Some(cur) = stack.pop() {
        f(cur);
        for g in gens {
            let n = g(cur);
            if !marker.is_marked(n) {
                marker.mark(n);
                stack.push(n);
            }
        }
    }
    buffers::dart_buffers().release(stack);
}

/// Behaviour shared by `CMap1`, `CMap2` and `CMap3`.
///
/// The one required method is [`foreach_dart_of_orbit`]: each map
/// dimension interprets an [`Orbit`] through its own generating set.
///
/// [`foreach_dart_of_orbit`]: CombinatorialMap::foreach_dart_of_orbit
pub trait CombinatorialMap: Sized {
    const DIMENSION: u32;

    #[doc(hidden)]
    fn base(&self) -> &MapBase;
    #[doc(hidden)]
    fn base_mut(&mut self) -> &mut MapBase;

    /// Calls `f` on every dart of the orbit of `d`, exactly once each.
    fn foreach_dart_of_orbit(&self, orbit: Orbit, d: Dart, f: &mut dyn FnMut(Dart));

    // --- permutation queries --------------------------------------------------

    /// φ₁ image, O(1).
    #[inline]
    fn phi1(&self, d: Dart) -> Dart {
        self.base().phi1(d)
    }

    /// φ₁⁻¹ image, O(1).
    #[inline]
    fn phi_1(&self, d: Dart) -> Dart {
        self.base().phi_1(d)
    }

    // --- dart and cell enumeration -------------------------------------------

    /// Count of live darts.
    #[inline]
    fn nb_darts(&self) -> u32 {
        self.base().topo.nb_elements()
    }

    /// Enumerates live darts in ascending slot order.
    fn foreach_dart<F: FnMut(Dart)>(&self, mut f: F) {
        for i in self.base().topo.live_slots() {
            f(Dart::new(i));
        }
    }

    /// One callback per orbit, represented by its first-seen dart under
    /// ascending-slot traversal.
    fn foreach_cell_dart<F: FnMut(Dart)>(&self, orbit: Orbit, mut f: F) {
        let mut marker = DartMarker::new(self);
        self.foreach_dart(|d| {
            if !marker.is_marked(d) {
                marker.mark_orbit(orbit, d);
                f(d);
            }
        });
    }

    /// Typed cell enumeration; ordering as [`foreach_cell_dart`].
    ///
    /// [`foreach_cell_dart`]: CombinatorialMap::foreach_cell_dart
    fn foreach_cell<O: CellOrbit, F: FnMut(Cell<O>)>(&self, mut f: F) {
        self.foreach_cell_dart(O::ORBIT, |d| f(Cell::new(d)));
    }

    /// Appends every dart of the orbit of `d` to `out`.
    fn collect_orbit(&self, orbit: Orbit, d: Dart, out: &mut Vec<Dart>) {
        self.foreach_dart_of_orbit(orbit, d, &mut |e| out.push(e));
    }

    /// True when `target` lies in the orbit of `d`.
    fn orbit_contains(&self, orbit: Orbit, d: Dart, target: Dart) -> bool {
        let mut buf = buffers::dart_buffers().acquire();
        self.collect_orbit(orbit, d, &mut buf);
        let found = buf.contains(&target);
        buffers::dart_buffers().release(buf);
        found
    }

    /// Number of cells of an orbit: the live count of its container when
    /// embedded, otherwise a marker-counted traversal.
    fn nb_cells_of(&self, orbit: Orbit) -> u32 {
        if self.is_embedded(orbit) {
            self.base().cells[orbit.index()].nb_elements()
        } else {
            let mut n = 0;
            self.foreach_cell_dart(orbit, |_| n += 1);
            n
        }
    }

    /// Typed variant of [`nb_cells_of`](CombinatorialMap::nb_cells_of).
    #[inline]
    fn nb_cells<O: CellOrbit>(&self) -> u32 {
        self.nb_cells_of(O::ORBIT)
    }

    /// Number of darts in the φ₁ cycle of the face.
    fn codegree(&self, f: Face) -> u32 {
        let d = f.dart();
        let mut n = 1;
        let mut it = self.phi1(d);
        while it != d {
            n += 1;
            it = self.phi1(it);
        }
        n
    }

    /// Triangle test in O(1): three φ₁ steps.
    fn is_triangle(&self, f: Face) -> bool {
        let d = f.dart();
        let d1 = self.phi1(d);
        d1 != d && self.phi1(self.phi1(d1)) == d
    }

    /// Enumerates the vertices incident to a face, walking the φ₁ cycle
    /// in local CCW order.
    fn foreach_incident_vertex<F: FnMut(Vertex)>(&self, f: Face, mut g: F) {
        let d = f.dart();
        let mut it = d;
        loop {
            g(Vertex::new(it));
            it = self.phi1(it);
            if it == d {
                break;
            }
        }
    }

    // --- embeddings -----------------------------------------------------------

    /// True once the orbit has an embedding column.
    #[inline]
    fn is_embedded(&self, orbit: Orbit) -> bool {
        self.base().emb_col(orbit).is_some()
    }

    /// Cell slot of a cell handle.
    ///
    /// # Errors
    /// [`CMapError::MissingEmbedding`] when the orbit is not embedded,
    /// [`CMapError::NilDart`] for the nil sentinel.
    fn embedding<O: CellOrbit>(&self, c: Cell<O>) -> Result<u32, CMapError> {
        if c.dart().is_nil() {
            return Err(CMapError::NilDart);
        }
        let col = self
            .base()
            .emb_col(O::ORBIT)
            .ok_or(CMapError::MissingEmbedding(O::ORBIT))?;
        Ok(self.base().topo.u32_column(col)[c.dart().index()])
    }

    /// Cell identity: same embedding index when embedded, orbit
    /// membership otherwise.
    fn same_cell<O: CellOrbit>(&self, a: Cell<O>, b: Cell<O>) -> bool {
        if self.is_embedded(O::ORBIT) {
            let ea = self.base().embedding_raw(O::ORBIT, a.dart());
            ea != INVALID_INDEX && ea == self.base().embedding_raw(O::ORBIT, b.dart())
        } else {
            self.orbit_contains(O::ORBIT, a.dart(), b.dart())
        }
    }

    /// Creates the orbit's embedding column and stamps every existing
    /// cell with a fresh slot. Idempotent.
    ///
    /// # Errors
    /// Propagates column-creation failures.
    fn create_embedding(&mut self, orbit: Orbit) -> Result<(), CMapError> {
        if self.is_embedded(orbit) {
            return Ok(());
        }
        self.base_mut().install_embedding_column(orbit)?;
        let mut reps = buffers::dart_buffers().acquire();
        self.foreach_cell_dart(orbit, |d| reps.push(d));
        for i in 0..reps.len() {
            self.new_orbit_embedding(orbit, reps[i]);
        }
        buffers::dart_buffers().release(reps);
        Ok(())
    }

    /// Allocates a fresh cell slot and stamps the whole orbit of `d`
    /// with it; returns the slot. The slot's refcount ends up equal to
    /// the orbit's dart count.
    fn new_orbit_embedding(&mut self, orbit: Orbit, d: Dart) -> u32 {
        let slot = self.base_mut().cells[orbit.index()].insert_lines(1);
        let mut buf = buffers::dart_buffers().acquire();
        self.collect_orbit(orbit, d, &mut buf);
        for i in 0..buf.len() {
            self.base_mut().set_embedding_raw(orbit, buf[i], slot);
        }
        buffers::dart_buffers().release(buf);
        // drop the allocation reference; the darts now carry the slot
        self.base_mut().cells[orbit.index()].unref_line(slot);
        slot
    }

    /// Stamps the whole orbit of `d` with an existing slot.
    fn set_orbit_embedding(&mut self, orbit: Orbit, d: Dart, slot: u32) {
        let mut buf = buffers::dart_buffers().acquire();
        self.collect_orbit(orbit, d, &mut buf);
        for i in 0..buf.len() {
            self.base_mut().set_embedding_raw(orbit, buf[i], slot);
        }
        buffers::dart_buffers().release(buf);
    }

    /// Embedding reconciliation after a sew merged the orbits of `a` and
    /// `b`: the slot of the lower-index representative wins, the losing
    /// slot is recycled once no dart references it.
    fn merge_cells(&mut self, orbit: Orbit, a: Dart, b: Dart) {
        if !self.is_embedded(orbit) {
            return;
        }
        let ea = self.base().embedding_raw(orbit, a);
        let eb = self.base().embedding_raw(orbit, b);
        debug_assert!(ea != INVALID_INDEX && eb != INVALID_INDEX);
        if ea == eb {
            return;
        }
        let winner = if a.index() < b.index() { ea } else { eb };
        self.set_orbit_embedding(orbit, a, winner);
    }

    /// Embedding reconciliation after an unsew: when `a` and `b` no
    /// longer share an orbit, the side with the higher-index dart gets a
    /// fresh slot and the lower-index side keeps the shared one —
    /// mirroring the merge winner rule, so a sew followed by an unsew
    /// restores the original slots.
    fn split_cell(&mut self, orbit: Orbit, a: Dart, b: Dart) {
        if !self.is_embedded(orbit) {
            return;
        }
        if self.orbit_contains(orbit, a, b) {
            return;
        }
        let detach = if a.index() < b.index() { b } else { a };
        self.new_orbit_embedding(orbit, detach);
    }

    // --- attributes -----------------------------------------------------------

    /// Adds a typed attribute on an orbit, creating the orbit's
    /// embedding on first use.
    ///
    /// # Errors
    /// [`CMapError::AttributeNameInUse`] when the name is taken.
    fn add_attribute<O: CellOrbit, T: AttributeValue>(
        &mut self,
        name: &str,
    ) -> Result<AttributeHandle<O, T>, CMapError> {
        self.create_embedding(O::ORBIT)?;
        let col = self.base_mut().cells[O::ORBIT.index()].add_attribute::<T>(name)?;
        Ok(AttributeHandle::new(col))
    }

    /// Looks up an existing attribute by name.
    ///
    /// # Errors
    /// [`CMapError::AttributeMissing`] or [`CMapError::AttributeTypeMismatch`].
    fn get_attribute<O: CellOrbit, T: AttributeValue>(
        &self,
        name: &str,
    ) -> Result<AttributeHandle<O, T>, CMapError> {
        let col = self.base().cells[O::ORBIT.index()].get_attribute::<T>(name)?;
        Ok(AttributeHandle::new(col))
    }

    /// Reinterprets an attribute's storage as another equally-sized
    /// type; see
    /// [`AttributeContainer::get_attribute_force_type`](crate::data::container::AttributeContainer::get_attribute_force_type).
    ///
    /// # Errors
    /// [`CMapError::AttributeMissing`], [`CMapError::AttributeSizeMismatch`],
    /// or [`CMapError::ReinterpretUnaligned`].
    fn get_attribute_force_type<O: CellOrbit, NewT: AttributeValue>(
        &self,
        name: &str,
    ) -> Result<AttributeHandle<O, NewT>, CMapError> {
        let col = self.base().cells[O::ORBIT.index()].get_attribute_force_type::<NewT>(name)?;
        Ok(AttributeHandle::new(col))
    }

    /// Removes an attribute; outstanding handles to it become invalid.
    ///
    /// # Errors
    /// [`CMapError::InvalidHandle`] when the handle is stale.
    fn remove_attribute<O: CellOrbit, T: AttributeValue>(
        &mut self,
        h: AttributeHandle<O, T>,
    ) -> Result<(), CMapError> {
        self.base_mut().cells[O::ORBIT.index()].remove_attribute(h.col)
    }

    /// True while the handle's column still exists.
    fn is_attribute_valid<O: CellOrbit, T: AttributeValue>(
        &self,
        h: &AttributeHandle<O, T>,
    ) -> bool {
        self.base().cells[O::ORBIT.index()].is_handle_valid(&h.col)
    }

    /// Read view of an attribute, indexable by cell or raw slot.
    ///
    /// # Errors
    /// [`CMapError::InvalidHandle`] or [`CMapError::MissingEmbedding`].
    fn attribute<'a, O: CellOrbit, T: AttributeValue>(
        &'a self,
        h: &AttributeHandle<O, T>,
    ) -> Result<AttributeView<'a, O, T>, CMapError> {
        let base = self.base();
        let col = base
            .emb_col(O::ORBIT)
            .ok_or(CMapError::MissingEmbedding(O::ORBIT))?;
        let emb = base.topo.u32_column(col);
        let inner = base.cells[O::ORBIT.index()].view(&h.col)?;
        Ok(AttributeView {
            inner,
            emb,
            _o: PhantomData,
        })
    }

    /// Mutable view of an attribute.
    ///
    /// # Errors
    /// [`CMapError::InvalidHandle`] or [`CMapError::MissingEmbedding`].
    fn attribute_mut<'a, O: CellOrbit, T: AttributeValue>(
        &'a mut self,
        h: &AttributeHandle<O, T>,
    ) -> Result<AttributeViewMut<'a, O, T>, CMapError> {
        let (cont, emb) = self.base_mut().cell_container_and_emb_mut(O::ORBIT)?;
        let inner = cont.view_mut(&h.col)?;
        Ok(AttributeViewMut {
            inner,
            emb,
            _o: PhantomData,
        })
    }

    // --- whole-map maintenance ------------------------------------------------

    /// Compacts the dart container and every embedded orbit container,
    /// rebinding φ columns and embedding indices through the remaps.
    /// All outstanding `Dart` values and cell slots are invalidated.
    fn compact(&mut self) {
        let dart_remap = self.base_mut().topo.compact();
        let base = self.base_mut();
        let size = base.topo.size();
        let mut phi_cols = vec![base.phi1_col, base.phi_1_col];
        phi_cols.extend(base.phi2_col);
        phi_cols.extend(base.phi3_col);
        for col in phi_cols {
            for i in 0..size {
                let v = base.topo.u32_column(col)[i];
                base.topo.u32_column_mut(col).set(i, dart_remap[v as usize]);
            }
        }
        for orbit in Orbit::ALL {
            if let Some(embc) = base.emb_cols[orbit.index()] {
                let cell_remap = base.cells[orbit.index()].compact();
                for i in 0..size {
                    let v = base.topo.u32_column(embc)[i];
                    if v != INVALID_INDEX {
                        base.topo.u32_column_mut(embc).set(i, cell_remap[v as usize]);
                    }
                }
            }
        }
        cmap_debug_assert_ok!(self.validate_topology(), "map after compact");
    }

    // --- persistence ----------------------------------------------------------

    /// Writes the dart container followed by the cell container of every
    /// embedded orbit (φ columns and embeddings ride along as ordinary
    /// columns of the dart container).
    ///
    /// # Errors
    /// Propagates I/O failures as [`CMapError::Io`].
    fn save<W: Write>(&self, w: &mut W) -> Result<(), CMapError> {
        self.base().topo.save(w)?;
        for orbit in Orbit::ALL {
            if self.is_embedded(orbit) {
                self.base().cells[orbit.index()].save(w)?;
            }
        }
        Ok(())
    }

    /// Restores a map persisted by [`save`](CombinatorialMap::save).
    /// Everything is staged before installation, so a failure leaves the
    /// map unchanged. Outstanding handles and darts must be re-acquired.
    ///
    /// # Errors
    /// Same taxonomy as
    /// [`AttributeContainer::load`](crate::data::container::AttributeContainer::load);
    /// additionally [`CMapError::AttributeMissing`] when a φ column
    /// required by this map dimension is absent.
    fn load<R: Read>(&mut self, r: &mut R) -> Result<(), CMapError> {
        let mut topo = AttributeContainer::new();
        topo.load(r)?;
        let mut cells: [AttributeContainer; NB_ORBITS] =
            std::array::from_fn(|_| AttributeContainer::new());
        for orbit in Orbit::ALL {
            if topo.get_attribute::<u32>(EMB_NAMES[orbit.index()]).is_ok() {
                cells[orbit.index()].load(r)?;
            }
        }
        let base = self.base_mut();
        base.topo = topo;
        base.cells = cells;
        base.rebind_loaded_columns(Self::DIMENSION)?;
        cmap_debug_assert_ok!(self.validate_topology(), "map after load");
        Ok(())
    }

    // --- validation -----------------------------------------------------------

    /// Checks the φ-family and embedding invariants over every live
    /// dart. O(darts · orbit size); intended for tests and debug builds.
    ///
    /// # Errors
    /// [`CMapError::InvariantViolation`] naming the first failure.
    fn validate_topology(&self) -> Result<(), CMapError> {
        let fail = |msg: String| Err(CMapError::InvariantViolation(msg));
        self.base().topo.validate_invariants()?;
        for c in &self.base().cells {
            c.validate_invariants()?;
        }
        let mut result = Ok(());
        self.foreach_dart(|d| {
            if result.is_err() {
                return;
            }
            if self.phi_1(self.phi1(d)) != d || self.phi1(self.phi_1(d)) != d {
                result = fail(format!("phi1/phi_1 disagree at dart {d}"));
                return;
            }
            if Self::DIMENSION >= 2 {
                let b = self.base().phi2(d);
                if self.base().phi2(b) != d {
                    result = fail(format!("phi2 is not an involution at dart {d}"));
                    return;
                }
            }
            if Self::DIMENSION >= 3 {
                let b = self.base().phi3(d);
                if self.base().phi3(b) != d {
                    result = fail(format!("phi3 is not an involution at dart {d}"));
                }
            }
        });
        result?;
        for orbit in Orbit::ALL {
            if !self.is_embedded(orbit) {
                continue;
            }
            let mut bad = Ok(());
            self.foreach_cell_dart(orbit, |d| {
                if bad.is_err() {
                    return;
                }
                let slot = self.base().embedding_raw(orbit, d);
                if slot == INVALID_INDEX {
                    bad = fail(format!("{orbit:?} orbit of dart {d} is unembedded"));
                    return;
                }
                if !self.base().cells[orbit.index()].is_live(slot) {
                    bad = fail(format!("{orbit:?} slot {slot} referenced but not live"));
                    return;
                }
                self.foreach_dart_of_orbit(orbit, d, &mut |e| {
                    if bad.is_ok() && self.base().embedding_raw(orbit, e) != slot {
                        bad = fail(format!(
                            "{orbit:?} orbit of dart {d} carries mixed embeddings"
                        ));
                    }
                });
            });
            bad?;
        }
        Ok(())
    }
}
