//! Attribute handles and access views.
//!
//! A handle is a lightweight `(column index, generation)` pair; the
//! owning container detects stale handles through the generation, so a
//! handle held across `remove_attribute` reports invalid instead of
//! aliasing a recycled column. Access goes through borrow-scoped views:
//! the borrow checker is what enforces the "iteration is invalidated by
//! `insert_lines` / `remove_line` / `compact`" rule — those take
//! `&mut self` on the container while a view holds `&self`.
//!
//! Views come in container-level form ([`ColumnView`], indexed by raw
//! slot) and map-level form ([`AttributeView`], additionally indexed by
//! [`Cell<O>`] through the orbit's embedding column).

use crate::data::chunk_array::{AttributeValue, ChunkArray};
use crate::data::column::ColumnOps;
use crate::data::container::is_live_ref;
use crate::data::{DEFAULT_CHUNK_SIZE, INVALID_INDEX};
use crate::topology::orbit::{Cell, CellOrbit};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Container-level attribute handle: `(column index, generation)`.
///
/// Default-constructed handles are invalid. A handle created by
/// `get_attribute_force_type` carries a reinterpretation flag; its
/// accesses go through byte casts instead of a typed downcast.
pub struct ColumnHandle<T> {
    pub(crate) idx: u32,
    pub(crate) gen: u32,
    pub(crate) reinterpret: bool,
    _t: PhantomData<fn() -> T>,
}

impl<T> ColumnHandle<T> {
    pub(crate) fn new(idx: u32, gen: u32, reinterpret: bool) -> Self {
        ColumnHandle {
            idx,
            gen,
            reinterpret,
            _t: PhantomData,
        }
    }

    /// True for default-constructed (never assigned) handles.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.idx == INVALID_INDEX
    }
}

impl<T> Default for ColumnHandle<T> {
    fn default() -> Self {
        ColumnHandle::new(INVALID_INDEX, 0, false)
    }
}

impl<T> Copy for ColumnHandle<T> {}
impl<T> Clone for ColumnHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> PartialEq for ColumnHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.idx == other.idx && self.gen == other.gen
    }
}
impl<T> Eq for ColumnHandle<T> {}
impl<T> fmt::Debug for ColumnHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnHandle")
            .field("idx", &self.idx)
            .field("gen", &self.gen)
            .finish()
    }
}

/// Handle to a named bit-packed boolean column.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BitColumnHandle {
    pub(crate) idx: u32,
    pub(crate) gen: u32,
}

/// Map-level attribute handle, tagged with the orbit it lives on.
pub struct AttributeHandle<O: CellOrbit, T> {
    pub(crate) col: ColumnHandle<T>,
    _o: PhantomData<fn() -> O>,
}

impl<O: CellOrbit, T> AttributeHandle<O, T> {
    pub(crate) fn new(col: ColumnHandle<T>) -> Self {
        AttributeHandle {
            col,
            _o: PhantomData,
        }
    }

    /// True for default-constructed (never assigned) handles.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.col.is_null()
    }
}

impl<O: CellOrbit, T> Default for AttributeHandle<O, T> {
    fn default() -> Self {
        AttributeHandle::new(ColumnHandle::default())
    }
}

impl<O: CellOrbit, T> Copy for AttributeHandle<O, T> {}
impl<O: CellOrbit, T> Clone for AttributeHandle<O, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<O: CellOrbit, T> fmt::Debug for AttributeHandle<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttributeHandle<{:?}>({:?})", O::ORBIT, self.col)
    }
}

/// Read access to an element column: typed, or byte-reinterpreted for
/// forced-type handles.
pub(crate) enum ColumnRead<'a, T, const C: usize> {
    Typed(&'a ChunkArray<T, C>),
    Cast(&'a dyn ColumnOps),
}

impl<'a, T, const C: usize> Copy for ColumnRead<'a, T, C> {}
impl<'a, T, const C: usize> Clone for ColumnRead<'a, T, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T: AttributeValue, const C: usize> ColumnRead<'a, T, C> {
    #[inline]
    fn get(self, i: u32) -> &'a T {
        match self {
            ColumnRead::Typed(col) => col.get(i),
            ColumnRead::Cast(ops) => {
                let chunk = ops.chunk_bytes(i as usize / C);
                &bytemuck::cast_slice::<u8, T>(chunk)[i as usize % C]
            }
        }
    }
}

/// Write access to an element column.
pub(crate) enum ColumnWrite<'a, T, const C: usize> {
    Typed(&'a mut ChunkArray<T, C>),
    Cast(&'a mut dyn ColumnOps),
}

impl<'a, T: AttributeValue, const C: usize> ColumnWrite<'a, T, C> {
    #[inline]
    fn get(&self, i: u32) -> &T {
        match self {
            ColumnWrite::Typed(col) => col.get(i),
            ColumnWrite::Cast(ops) => {
                let chunk = ops.chunk_bytes(i as usize / C);
                &bytemuck::cast_slice::<u8, T>(chunk)[i as usize % C]
            }
        }
    }

    #[inline]
    fn get_mut(&mut self, i: u32) -> &mut T {
        match self {
            ColumnWrite::Typed(col) => col.get_mut(i),
            ColumnWrite::Cast(ops) => {
                let chunk = ops.chunk_bytes_mut(i as usize / C);
                &mut bytemuck::cast_slice_mut::<u8, T>(chunk)[i as usize % C]
            }
        }
    }
}

/// Read-only view of one column plus the refcount column of its
/// container; indexing is by raw slot, iteration skips free slots.
pub struct ColumnView<'a, T: AttributeValue, const C: usize = DEFAULT_CHUNK_SIZE> {
    pub(crate) col: ColumnRead<'a, T, C>,
    pub(crate) refs: &'a ChunkArray<u32, C>,
    pub(crate) size: u32,
}

impl<'a, T: AttributeValue, const C: usize> ColumnView<'a, T, C> {
    #[inline]
    pub fn get(&self, i: u32) -> &'a T {
        self.col.get(i)
    }

    /// True when slot `i` is live (refcount > 0).
    #[inline]
    pub fn is_live(&self, i: u32) -> bool {
        is_live_ref(self.refs, self.size, i)
    }

    /// Live slots in ascending order, as `(slot, &value)`.
    pub fn iter_with_slots(&self) -> LiveIter<'a, T, C> {
        LiveIter {
            col: self.col,
            refs: self.refs,
            next: 0,
            size: self.size,
        }
    }

    /// Values of live slots in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = &'a T> {
        self.iter_with_slots().map(|(_, v)| v)
    }
}

impl<'a, T: AttributeValue, const C: usize> Index<u32> for ColumnView<'a, T, C> {
    type Output = T;
    #[inline]
    fn index(&self, i: u32) -> &T {
        self.col.get(i)
    }
}

/// Iterator over live `(slot, &value)` pairs in ascending slot order.
pub struct LiveIter<'a, T: AttributeValue, const C: usize = DEFAULT_CHUNK_SIZE> {
    col: ColumnRead<'a, T, C>,
    refs: &'a ChunkArray<u32, C>,
    next: u32,
    size: u32,
}

impl<'a, T: AttributeValue, const C: usize> Iterator for LiveIter<'a, T, C> {
    type Item = (u32, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.size {
            let i = self.next;
            self.next += 1;
            if is_live_ref(self.refs, self.size, i) {
                return Some((i, self.col.get(i)));
            }
        }
        None
    }
}

/// Mutable view of one column. Iteration is offered as internal
/// traversal (`for_each_mut`, `fill`) so element borrows stay disjoint.
pub struct ColumnViewMut<'a, T: AttributeValue, const C: usize = DEFAULT_CHUNK_SIZE> {
    pub(crate) col: ColumnWrite<'a, T, C>,
    pub(crate) refs: &'a ChunkArray<u32, C>,
    pub(crate) size: u32,
}

impl<'a, T: AttributeValue, const C: usize> ColumnViewMut<'a, T, C> {
    #[inline]
    pub fn get(&self, i: u32) -> &T {
        self.col.get(i)
    }

    #[inline]
    pub fn get_mut(&mut self, i: u32) -> &mut T {
        self.col.get_mut(i)
    }

    #[inline]
    pub fn set(&mut self, i: u32, v: T) {
        *self.col.get_mut(i) = v;
    }

    #[inline]
    pub fn is_live(&self, i: u32) -> bool {
        is_live_ref(self.refs, self.size, i)
    }

    /// Calls `f` on every live slot in ascending order.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(u32, &mut T)) {
        for i in 0..self.size {
            if is_live_ref(self.refs, self.size, i) {
                f(i, self.col.get_mut(i));
            }
        }
    }

    /// Writes `v` to every live slot.
    pub fn fill(&mut self, v: T) {
        self.for_each_mut(|_, slot| *slot = v);
    }
}

impl<'a, T: AttributeValue, const C: usize> Index<u32> for ColumnViewMut<'a, T, C> {
    type Output = T;
    #[inline]
    fn index(&self, i: u32) -> &T {
        self.col.get(i)
    }
}

impl<'a, T: AttributeValue, const C: usize> IndexMut<u32> for ColumnViewMut<'a, T, C> {
    #[inline]
    fn index_mut(&mut self, i: u32) -> &mut T {
        self.col.get_mut(i)
    }
}

/// Map-level read view: a [`ColumnView`] plus the orbit's embedding
/// column, so cells index directly.
pub struct AttributeView<'a, O: CellOrbit, T: AttributeValue, const C: usize = DEFAULT_CHUNK_SIZE> {
    pub(crate) inner: ColumnView<'a, T, C>,
    pub(crate) emb: &'a ChunkArray<u32, C>,
    pub(crate) _o: PhantomData<fn() -> O>,
}

impl<'a, O: CellOrbit, T: AttributeValue, const C: usize> AttributeView<'a, O, T, C> {
    /// The cell slot a cell handle resolves to.
    #[inline]
    pub fn cell_slot(&self, c: Cell<O>) -> u32 {
        self.emb[c.dart().index()]
    }

    /// Values of live cell slots in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = &'a T> {
        self.inner.iter()
    }

    /// Live `(slot, &value)` pairs in ascending slot order.
    pub fn iter_with_slots(&self) -> LiveIter<'a, T, C> {
        self.inner.iter_with_slots()
    }
}

impl<'a, O: CellOrbit, T: AttributeValue, const C: usize> Index<u32>
    for AttributeView<'a, O, T, C>
{
    type Output = T;
    #[inline]
    fn index(&self, i: u32) -> &T {
        &self.inner[i]
    }
}

impl<'a, O: CellOrbit, T: AttributeValue, const C: usize> Index<Cell<O>>
    for AttributeView<'a, O, T, C>
{
    type Output = T;
    #[inline]
    fn index(&self, c: Cell<O>) -> &T {
        let slot = self.emb[c.dart().index()];
        debug_assert_ne!(slot, INVALID_INDEX, "dart {} is not embedded", c.dart());
        &self.inner[slot]
    }
}

/// Map-level mutable view.
pub struct AttributeViewMut<'a, O: CellOrbit, T: AttributeValue, const C: usize = DEFAULT_CHUNK_SIZE>
{
    pub(crate) inner: ColumnViewMut<'a, T, C>,
    pub(crate) emb: &'a ChunkArray<u32, C>,
    pub(crate) _o: PhantomData<fn() -> O>,
}

impl<'a, O: CellOrbit, T: AttributeValue, const C: usize> AttributeViewMut<'a, O, T, C> {
    #[inline]
    pub fn cell_slot(&self, c: Cell<O>) -> u32 {
        self.emb[c.dart().index()]
    }

    /// Calls `f` on every live cell slot in ascending order.
    pub fn for_each_mut(&mut self, f: impl FnMut(u32, &mut T)) {
        self.inner.for_each_mut(f)
    }

    /// Writes `v` to every live cell slot.
    pub fn fill(&mut self, v: T) {
        self.inner.fill(v)
    }
}

impl<'a, O: CellOrbit, T: AttributeValue, const C: usize> Index<u32>
    for AttributeViewMut<'a, O, T, C>
{
    type Output = T;
    #[inline]
    fn index(&self, i: u32) -> &T {
        &self.inner[i]
    }
}

impl<'a, O: CellOrbit, T: AttributeValue, const C: usize> IndexMut<u32>
    for AttributeViewMut<'a, O, T, C>
{
    #[inline]
    fn index_mut(&mut self, i: u32) -> &mut T {
        &mut self.inner[i]
    }
}

impl<'a, O: CellOrbit, T: AttributeValue, const C: usize> Index<Cell<O>>
    for AttributeViewMut<'a, O, T, C>
{
    type Output = T;
    #[inline]
    fn index(&self, c: Cell<O>) -> &T {
        let slot = self.emb[c.dart().index()];
        debug_assert_ne!(slot, INVALID_INDEX, "dart {} is not embedded", c.dart());
        &self.inner[slot]
    }
}

impl<'a, O: CellOrbit, T: AttributeValue, const C: usize> IndexMut<Cell<O>>
    for AttributeViewMut<'a, O, T, C>
{
    #[inline]
    fn index_mut(&mut self, c: Cell<O>) -> &mut T {
        let slot = self.emb[c.dart().index()];
        debug_assert_ne!(slot, INVALID_INDEX, "dart {} is not embedded", c.dart());
        &mut self.inner[slot]
    }
}
