//! Scratch markers: RAII visited-sets over darts or cells.
//!
//! A marker borrows a pooled bit column from the relevant container for
//! its lifetime and hands it back cleared on drop, so repeated
//! traversals reuse the same storage. Holding a marker shared-borrows
//! the map; the borrow checker therefore rules out topology mutation
//! while a marker is live, which is what makes the fixed-capacity bit
//! column safe.
//!
//! Markers are not thread-safe; acquisition on the same container is
//! serialized by the pool lock.

use crate::cmap_error::CMapError;
use crate::data::bit_array::BitArray;
use crate::data::INVALID_INDEX;
use crate::topology::dart::Dart;
use crate::topology::map_base::CombinatorialMap;
use crate::topology::orbit::{Cell, CellOrbit, Orbit};
use std::marker::PhantomData;

/// Visited-set over darts.
pub struct DartMarker<'m, M: CombinatorialMap> {
    map: &'m M,
    bits: Option<BitArray>,
}

impl<'m, M: CombinatorialMap> DartMarker<'m, M> {
    /// Acquires a cleared bit column sized to the dart container.
    pub fn new(map: &'m M) -> Self {
        let bits = map.base().topo.acquire_marker();
        DartMarker {
            map,
            bits: Some(bits),
        }
    }

    #[inline]
    fn bits(&self) -> &BitArray {
        self.bits.as_ref().expect("column held until drop")
    }

    #[inline]
    fn bits_mut(&mut self) -> &mut BitArray {
        self.bits.as_mut().expect("column held until drop")
    }

    #[inline]
    pub fn mark(&mut self, d: Dart) {
        self.bits_mut().set_true(d.index());
    }

    #[inline]
    pub fn unmark(&mut self, d: Dart) {
        self.bits_mut().set_false(d.index());
    }

    #[inline]
    pub fn is_marked(&self, d: Dart) -> bool {
        self.bits().get(d.index())
    }

    /// Marks every dart of the orbit of `d`.
    pub fn mark_orbit(&mut self, orbit: Orbit, d: Dart) {
        let map = self.map;
        let bits = self.bits.as_mut().expect("column held until drop");
        map.foreach_dart_of_orbit(orbit, d, &mut |e| bits.set_true(e.index()));
    }
}

impl<'m, M: CombinatorialMap> Drop for DartMarker<'m, M> {
    fn drop(&mut self) {
        if let Some(bits) = self.bits.take() {
            self.map.base().topo.release_marker(bits);
        }
    }
}

/// Visited-set over the cells of one orbit, addressed through the
/// orbit's embedding.
pub struct CellMarker<'m, M: CombinatorialMap, O: CellOrbit> {
    map: &'m M,
    bits: Option<BitArray>,
    _o: PhantomData<fn() -> O>,
}

impl<'m, M: CombinatorialMap, O: CellOrbit> std::fmt::Debug for CellMarker<'m, M, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellMarker").field("bits", &self.bits).finish()
    }
}

impl<'m, M: CombinatorialMap, O: CellOrbit> CellMarker<'m, M, O> {
    /// Acquires a cleared bit column sized to the orbit's cell container.
    ///
    /// # Errors
    /// [`CMapError::MissingEmbedding`] when the orbit is not embedded.
    pub fn new(map: &'m M) -> Result<Self, CMapError> {
        if !map.is_embedded(O::ORBIT) {
            return Err(CMapError::MissingEmbedding(O::ORBIT));
        }
        let bits = map.base().cells[O::ORBIT.index()].acquire_marker();
        Ok(CellMarker {
            map,
            bits: Some(bits),
            _o: PhantomData,
        })
    }

    #[inline]
    fn slot(&self, c: Cell<O>) -> u32 {
        let slot = self.map.base().embedding_raw(O::ORBIT, c.dart());
        debug_assert_ne!(slot, INVALID_INDEX, "cell {c} is not embedded");
        slot
    }

    #[inline]
    pub fn mark(&mut self, c: Cell<O>) {
        let i = self.slot(c);
        self.bits.as_mut().expect("column held until drop").set_true(i);
    }

    #[inline]
    pub fn unmark(&mut self, c: Cell<O>) {
        let i = self.slot(c);
        self.bits.as_mut().expect("column held until drop").set_false(i);
    }

    #[inline]
    pub fn is_marked(&self, c: Cell<O>) -> bool {
        self.bits
            .as_ref()
            .expect("column held until drop")
            .get(self.slot(c))
    }
}

impl<'m, M: CombinatorialMap, O: CellOrbit> Drop for CellMarker<'m, M, O> {
    fn drop(&mut self) {
        if let Some(bits) = self.bits.take() {
            self.map.base().cells[O::ORBIT.index()].release_marker(bits);
        }
    }
}
