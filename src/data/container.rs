//! `AttributeContainer`: the columnar, slot-addressed attribute store.
//!
//! A container owns a set of parallel columns of equal capacity, a
//! per-slot refcount column, and a singly-linked free list threaded
//! through the refcount column (a free slot stores `FREE_MASK | next`).
//! Slot indices are stable across every mutation except [`compact`],
//! which hands back a remap table.
//!
//! Line lifecycle: [`insert_lines`] hands out live slots (refcount 1,
//! every column default-initialized); [`ref_line`]/[`unref_line`] adjust
//! the count; a slot whose count reaches zero goes to the free list and
//! may be reused by the next insertion.
//!
//! [`insert_lines`]: AttributeContainer::insert_lines
//! [`ref_line`]: AttributeContainer::ref_line
//! [`unref_line`]: AttributeContainer::unref_line
//! [`compact`]: AttributeContainer::compact

use crate::cmap_error::CMapError;
use crate::data::attribute::{
    BitColumnHandle, ColumnHandle, ColumnRead, ColumnView, ColumnViewMut, ColumnWrite,
};
use crate::data::bit_array::BitArray;
use crate::data::chunk_array::{AttributeValue, ChunkArray};
use crate::data::column::{column_for_tag, ColumnData, BOOL_TAG};
use crate::data::io::{read_str, read_u32, write_str, write_u32};
use crate::data::{DebugInvariants, DEFAULT_CHUNK_SIZE, INVALID_INDEX};
use crate::cmap_debug_assert_ok;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{Read, Write};

/// High bit of a refcount word marks the slot free; the low 31 bits then
/// hold the index of the next free slot.
pub(crate) const FREE_MASK: u32 = 0x8000_0000;
/// Next-pointer payload marking the end of the free list.
const FREE_END: u32 = 0x7FFF_FFFF;

#[inline]
pub(crate) fn is_live_ref<const C: usize>(refs: &ChunkArray<u32, C>, size: u32, i: u32) -> bool {
    if i >= size {
        return false;
    }
    let r = refs[i];
    r != 0 && r & FREE_MASK == 0
}

#[derive(Debug)]
struct ColumnSlot<const C: usize> {
    name: Option<String>,
    generation: u32,
    data: Option<ColumnData<C>>,
}

/// Columnar attribute store with stable slot indices and free-list reuse.
#[derive(Debug)]
pub struct AttributeContainer<const C: usize = DEFAULT_CHUNK_SIZE> {
    slots: Vec<ColumnSlot<C>>,
    names: HashMap<String, u32>,
    /// Per-slot refcount; free-list links live in the same words.
    refs: ChunkArray<u32, C>,
    free_head: u32,
    /// High-water mark of allocated lines (live + freed).
    size: u32,
    nb_used: u32,
    /// Reusable scratch bit columns for markers.
    markers: Mutex<Vec<BitArray<C>>>,
}

impl<const C: usize> Default for AttributeContainer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const C: usize> AttributeContainer<C> {
    pub fn new() -> Self {
        AttributeContainer {
            slots: Vec::new(),
            names: HashMap::new(),
            refs: ChunkArray::new(),
            free_head: INVALID_INDEX,
            size: 0,
            nb_used: 0,
            markers: Mutex::new(Vec::new()),
        }
    }

    /// Allocated lines per column: `nb_chunks * C`.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.refs.capacity()
    }

    /// High-water mark of allocated lines (live and freed).
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Count of live (refcount > 0) lines.
    #[inline]
    pub fn nb_elements(&self) -> u32 {
        self.nb_used
    }

    /// True when slot `i` is live.
    #[inline]
    pub fn is_live(&self, i: u32) -> bool {
        is_live_ref(&self.refs, self.size, i)
    }

    /// Refcount of slot `i`; 0 for free or never-allocated slots.
    #[inline]
    pub fn refcount(&self, i: u32) -> u32 {
        if self.is_live(i) {
            self.refs[i]
        } else {
            0
        }
    }

    /// Live slots in ascending order.
    pub fn live_slots(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.size).filter(move |&i| self.is_live(i))
    }

    /// Live slots as a rayon parallel iterator, for read-only fan-out
    /// over a frozen container.
    #[cfg(feature = "rayon")]
    pub fn par_live_slots(&self) -> impl rayon::iter::ParallelIterator<Item = u32> + '_ {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
        (0..self.size).into_par_iter().filter(move |&i| self.is_live(i))
    }

    fn grow_by_one_chunk(&mut self) {
        self.refs.add_chunk();
        let n = self.refs.nb_chunks();
        for slot in &mut self.slots {
            if let Some(data) = slot.data.as_mut() {
                data.set_nb_chunks(n);
            }
        }
    }

    fn make_live(&mut self, i: u32) {
        self.refs.set(i, 1);
        for slot in &mut self.slots {
            if let Some(data) = slot.data.as_mut() {
                data.init_elt(i);
            }
        }
    }

    /// Allocates `n` consecutive live slots and returns the first index.
    ///
    /// Reuses the free-list head when it begins a run of `n` slots that
    /// are consecutive both in the list and in index order; otherwise
    /// allocates past the high-water mark, growing every column by whole
    /// chunks as needed. Each new slot gets refcount 1 and the default
    /// value in every column.
    pub fn insert_lines(&mut self, n: u32) -> u32 {
        debug_assert!(n >= 1, "insert_lines needs n >= 1");
        if self.free_head != INVALID_INDEX {
            let start = self.free_head;
            let mut cur = start;
            let mut run_ok = true;
            for k in 1..n {
                let next = self.refs[cur] & !FREE_MASK;
                if next != start + k {
                    run_ok = false;
                    break;
                }
                cur = next;
            }
            if run_ok {
                let after = self.refs[cur] & !FREE_MASK;
                self.free_head = if after == FREE_END { INVALID_INDEX } else { after };
                for i in start..start + n {
                    self.make_live(i);
                }
                self.nb_used += n;
                cmap_debug_assert_ok!(self.validate_invariants(), "container after insert");
                return start;
            }
        }
        while self.capacity() < self.size + n {
            self.grow_by_one_chunk();
        }
        let start = self.size;
        self.size += n;
        for i in start..start + n {
            self.make_live(i);
        }
        self.nb_used += n;
        cmap_debug_assert_ok!(self.validate_invariants(), "container after insert");
        start
    }

    /// Decrements the refcount of slot `i`; at zero the slot goes onto
    /// the free list.
    pub fn remove_line(&mut self, i: u32) {
        debug_assert!(self.is_live(i), "remove_line on non-live slot {i}");
        let r = self.refs[i];
        if r == 1 {
            let next = if self.free_head == INVALID_INDEX {
                FREE_END
            } else {
                self.free_head
            };
            self.refs.set(i, FREE_MASK | next);
            self.free_head = i;
            self.nb_used -= 1;
        } else {
            self.refs.set(i, r - 1);
        }
    }

    /// Increments the refcount of a live slot.
    pub fn ref_line(&mut self, i: u32) {
        debug_assert!(self.is_live(i), "ref_line on non-live slot {i}");
        let r = self.refs[i];
        self.refs.set(i, r + 1);
    }

    /// Alias of [`remove_line`](Self::remove_line); reads better at call
    /// sites that balance a [`ref_line`](Self::ref_line).
    #[inline]
    pub fn unref_line(&mut self, i: u32) {
        self.remove_line(i);
    }

    // --- attribute management -------------------------------------------------

    fn vacant_column(&mut self) -> u32 {
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.data.is_none() {
                return i as u32;
            }
        }
        self.slots.push(ColumnSlot {
            name: None,
            generation: 1,
            data: None,
        });
        (self.slots.len() - 1) as u32
    }

    fn install_column(&mut self, name: &str, mut data: ColumnData<C>) -> (u32, u32) {
        data.set_nb_chunks(self.refs.nb_chunks());
        let idx = self.vacant_column();
        let slot = &mut self.slots[idx as usize];
        slot.name = Some(name.to_owned());
        slot.data = Some(data);
        let gen = slot.generation;
        self.names.insert(name.to_owned(), idx);
        (idx, gen)
    }

    /// Creates a new typed column sized to the current capacity; existing
    /// live slots read as `T::default()`.
    ///
    /// # Errors
    /// [`CMapError::AttributeNameInUse`] when the name is taken.
    pub fn add_attribute<T: AttributeValue>(
        &mut self,
        name: &str,
    ) -> Result<ColumnHandle<T>, CMapError> {
        if self.names.contains_key(name) {
            return Err(CMapError::AttributeNameInUse(name.to_owned()));
        }
        let (idx, gen) = self.install_column(name, ColumnData::new_elem::<T>());
        Ok(ColumnHandle::new(idx, gen, false))
    }

    /// Creates a new bit-packed boolean column.
    ///
    /// # Errors
    /// [`CMapError::AttributeNameInUse`] when the name is taken.
    pub fn add_bit_attribute(&mut self, name: &str) -> Result<BitColumnHandle, CMapError> {
        if self.names.contains_key(name) {
            return Err(CMapError::AttributeNameInUse(name.to_owned()));
        }
        let (idx, gen) = self.install_column(name, ColumnData::new_bit());
        Ok(BitColumnHandle { idx, gen })
    }

    /// Looks up an existing typed column.
    ///
    /// # Errors
    /// [`CMapError::AttributeMissing`] or [`CMapError::AttributeTypeMismatch`].
    pub fn get_attribute<T: AttributeValue>(
        &self,
        name: &str,
    ) -> Result<ColumnHandle<T>, CMapError> {
        let idx = *self
            .names
            .get(name)
            .ok_or_else(|| CMapError::AttributeMissing(name.to_owned()))?;
        let slot = &self.slots[idx as usize];
        let data = slot.data.as_ref().expect("named column present");
        if data.downcast_ref::<T>().is_none() {
            return Err(CMapError::AttributeTypeMismatch {
                name: name.to_owned(),
                expected: std::any::type_name::<T>(),
                found: data.tag().to_owned(),
            });
        }
        Ok(ColumnHandle::new(idx, slot.generation, false))
    }

    /// Looks up an existing bit column.
    ///
    /// # Errors
    /// [`CMapError::AttributeMissing`] or [`CMapError::AttributeTypeMismatch`].
    pub fn get_bit_attribute(&self, name: &str) -> Result<BitColumnHandle, CMapError> {
        let idx = *self
            .names
            .get(name)
            .ok_or_else(|| CMapError::AttributeMissing(name.to_owned()))?;
        let slot = &self.slots[idx as usize];
        let data = slot.data.as_ref().expect("named column present");
        if data.as_bit().is_none() {
            return Err(CMapError::AttributeTypeMismatch {
                name: name.to_owned(),
                expected: "bool",
                found: data.tag().to_owned(),
            });
        }
        Ok(BitColumnHandle {
            idx,
            gen: slot.generation,
        })
    }

    /// Reinterprets an existing column as elements of `NewT`.
    ///
    /// The stored and requested element types must have equal size, and
    /// `NewT` must not require stricter alignment. Beyond that the
    /// reinterpretation is the caller's assertion: the bytes are handed
    /// over as-is.
    ///
    /// # Errors
    /// [`CMapError::AttributeMissing`], [`CMapError::AttributeSizeMismatch`],
    /// or [`CMapError::ReinterpretUnaligned`].
    pub fn get_attribute_force_type<NewT: AttributeValue>(
        &self,
        name: &str,
    ) -> Result<ColumnHandle<NewT>, CMapError> {
        let idx = *self
            .names
            .get(name)
            .ok_or_else(|| CMapError::AttributeMissing(name.to_owned()))?;
        let slot = &self.slots[idx as usize];
        let data = slot.data.as_ref().expect("named column present");
        let ops = data.as_ops().ok_or_else(|| CMapError::AttributeTypeMismatch {
            name: name.to_owned(),
            expected: std::any::type_name::<NewT>(),
            found: BOOL_TAG.to_owned(),
        })?;
        if ops.elem_bytes() != std::mem::size_of::<NewT>() {
            return Err(CMapError::AttributeSizeMismatch {
                name: name.to_owned(),
                expected: std::mem::size_of::<NewT>(),
                found: ops.elem_bytes(),
            });
        }
        if ops.elem_align() < std::mem::align_of::<NewT>() {
            return Err(CMapError::ReinterpretUnaligned(name.to_owned()));
        }
        Ok(ColumnHandle::new(idx, slot.generation, true))
    }

    /// Removes a column; all outstanding handles to it become invalid.
    ///
    /// # Errors
    /// [`CMapError::InvalidHandle`] when the handle is stale.
    pub fn remove_attribute<T: AttributeValue>(
        &mut self,
        h: ColumnHandle<T>,
    ) -> Result<(), CMapError> {
        self.remove_column(h.idx, h.gen)
    }

    /// Removes a bit column.
    ///
    /// # Errors
    /// [`CMapError::InvalidHandle`] when the handle is stale.
    pub fn remove_bit_attribute(&mut self, h: BitColumnHandle) -> Result<(), CMapError> {
        self.remove_column(h.idx, h.gen)
    }

    /// Removes a column by name.
    ///
    /// # Errors
    /// [`CMapError::AttributeMissing`] when no such column exists.
    pub fn remove_attribute_by_name(&mut self, name: &str) -> Result<(), CMapError> {
        let idx = *self
            .names
            .get(name)
            .ok_or_else(|| CMapError::AttributeMissing(name.to_owned()))?;
        let gen = self.slots[idx as usize].generation;
        self.remove_column(idx, gen)
    }

    fn remove_column(&mut self, idx: u32, gen: u32) -> Result<(), CMapError> {
        let slot = self
            .slots
            .get_mut(idx as usize)
            .ok_or(CMapError::InvalidHandle)?;
        if slot.generation != gen || slot.data.is_none() {
            return Err(CMapError::InvalidHandle);
        }
        let name = slot.name.take().expect("live column has a name");
        slot.data = None;
        slot.generation += 1;
        self.names.remove(&name);
        Ok(())
    }

    /// True while the handle's column still exists.
    pub fn is_handle_valid<T>(&self, h: &ColumnHandle<T>) -> bool {
        !h.is_null()
            && self
                .slots
                .get(h.idx as usize)
                .map_or(false, |s| s.generation == h.gen && s.data.is_some())
    }

    /// Attribute names in sorted order.
    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn nb_attributes(&self) -> usize {
        self.names.len()
    }

    // --- views ---------------------------------------------------------------

    fn checked_slot<T>(&self, h: &ColumnHandle<T>) -> Result<&ColumnSlot<C>, CMapError> {
        let slot = self
            .slots
            .get(h.idx as usize)
            .ok_or(CMapError::InvalidHandle)?;
        if slot.generation != h.gen || slot.data.is_none() {
            return Err(CMapError::InvalidHandle);
        }
        Ok(slot)
    }

    /// Read view of a column.
    ///
    /// # Errors
    /// [`CMapError::InvalidHandle`] when the handle is stale.
    pub fn view<T: AttributeValue>(
        &self,
        h: &ColumnHandle<T>,
    ) -> Result<ColumnView<'_, T, C>, CMapError> {
        let slot = self.checked_slot(h)?;
        let data = slot.data.as_ref().expect("checked above");
        let col = if h.reinterpret {
            ColumnRead::Cast(data.as_ops().ok_or(CMapError::InvalidHandle)?)
        } else {
            ColumnRead::Typed(data.downcast_ref::<T>().ok_or(CMapError::InvalidHandle)?)
        };
        Ok(ColumnView {
            col,
            refs: &self.refs,
            size: self.size,
        })
    }

    /// Mutable view of a column.
    ///
    /// # Errors
    /// [`CMapError::InvalidHandle`] when the handle is stale.
    pub fn view_mut<T: AttributeValue>(
        &mut self,
        h: &ColumnHandle<T>,
    ) -> Result<ColumnViewMut<'_, T, C>, CMapError> {
        let size = self.size;
        let refs = &self.refs;
        let slot = self
            .slots
            .get_mut(h.idx as usize)
            .ok_or(CMapError::InvalidHandle)?;
        if slot.generation != h.gen {
            return Err(CMapError::InvalidHandle);
        }
        let data = slot.data.as_mut().ok_or(CMapError::InvalidHandle)?;
        let col = if h.reinterpret {
            ColumnWrite::Cast(data.as_ops_mut().ok_or(CMapError::InvalidHandle)?)
        } else {
            ColumnWrite::Typed(data.downcast_mut::<T>().ok_or(CMapError::InvalidHandle)?)
        };
        Ok(ColumnViewMut { col, refs, size })
    }

    /// Direct borrow of a bit column.
    ///
    /// # Errors
    /// [`CMapError::InvalidHandle`] when the handle is stale.
    pub fn bit_column(&self, h: &BitColumnHandle) -> Result<&BitArray<C>, CMapError> {
        let slot = self
            .slots
            .get(h.idx as usize)
            .ok_or(CMapError::InvalidHandle)?;
        if slot.generation != h.gen {
            return Err(CMapError::InvalidHandle);
        }
        slot.data
            .as_ref()
            .and_then(|d| d.as_bit())
            .ok_or(CMapError::InvalidHandle)
    }

    /// Mutable borrow of a bit column.
    ///
    /// # Errors
    /// [`CMapError::InvalidHandle`] when the handle is stale.
    pub fn bit_column_mut(
        &mut self,
        h: &BitColumnHandle,
    ) -> Result<&mut BitArray<C>, CMapError> {
        let slot = self
            .slots
            .get_mut(h.idx as usize)
            .ok_or(CMapError::InvalidHandle)?;
        if slot.generation != h.gen {
            return Err(CMapError::InvalidHandle);
        }
        slot.data
            .as_mut()
            .and_then(|d| d.as_bit_mut())
            .ok_or(CMapError::InvalidHandle)
    }

    /// Internal: direct borrow of a `u32` column created by the topology
    /// layer; the index comes from this container's own bookkeeping.
    pub(crate) fn u32_column(&self, idx: u32) -> &ChunkArray<u32, C> {
        self.slots[idx as usize]
            .data
            .as_ref()
            .and_then(|d| d.downcast_ref::<u32>())
            .expect("internal u32 column")
    }

    pub(crate) fn u32_column_mut(&mut self, idx: u32) -> &mut ChunkArray<u32, C> {
        self.slots[idx as usize]
            .data
            .as_mut()
            .and_then(|d| d.downcast_mut::<u32>())
            .expect("internal u32 column")
    }

    // --- markers --------------------------------------------------------------

    /// Hands out a cleared scratch bit column sized to the current
    /// capacity, reusing a pooled one when available.
    pub(crate) fn acquire_marker(&self) -> BitArray<C> {
        let mut pool = self.markers.lock();
        let mut bits = pool.pop().unwrap_or_default();
        bits.set_nb_chunks(self.refs.nb_chunks());
        bits
    }

    /// Clears a scratch column (whole-word zeroing) and returns it to
    /// the pool.
    pub(crate) fn release_marker(&self, mut bits: BitArray<C>) {
        bits.clear_all();
        self.markers.lock().push(bits);
    }

    // --- compaction -----------------------------------------------------------

    /// Eliminates free slots by sliding live lines down, returning the
    /// `old slot -> new slot` remap (dead slots map to `INVALID_INDEX`).
    /// Trailing chunks freed by the move are released. Callers holding
    /// bare slot indices must rebind through the remap.
    pub fn compact(&mut self) -> Vec<u32> {
        let old_size = self.size;
        let mut remap = vec![INVALID_INDEX; old_size as usize];
        let mut next = 0u32;
        for old in 0..old_size {
            if is_live_ref(&self.refs, old_size, old) {
                remap[old as usize] = next;
                if old != next {
                    let r = self.refs[old];
                    self.refs.set(next, r);
                    for slot in &mut self.slots {
                        if let Some(data) = slot.data.as_mut() {
                            data.copy_elt(next, old);
                        }
                    }
                }
                next += 1;
            }
        }
        for i in next..old_size {
            self.refs.set(i, 0);
        }
        self.size = next;
        self.nb_used = next;
        self.free_head = INVALID_INDEX;
        let needed = (next as usize).div_ceil(C);
        self.refs.set_nb_chunks(needed);
        for slot in &mut self.slots {
            if let Some(data) = slot.data.as_mut() {
                data.set_nb_chunks(needed);
            }
        }
        log::debug!("container compacted: {old_size} -> {next} lines");
        cmap_debug_assert_ok!(self.validate_invariants(), "container after compact");
        remap
    }

    // --- persistence ----------------------------------------------------------

    /// Writes the container: a `{size, free_head, attribute count}`
    /// prefix, the refcount column (its layout governs capacity during
    /// load), then each named column in sorted name order as
    /// `name, type tag, payload`.
    ///
    /// # Errors
    /// Propagates I/O failures as [`CMapError::Io`].
    pub fn save<W: Write>(&self, w: &mut W) -> Result<(), CMapError> {
        write_u32(w, self.size)?;
        write_u32(w, self.free_head)?;
        write_u32(w, self.names.len() as u32)?;
        self.refs.save(w, self.size)?;
        for name in self.attribute_names() {
            let idx = self.names[name];
            let data = self.slots[idx as usize].data.as_ref().expect("named column");
            write_str(w, name)?;
            write_str(w, data.tag())?;
            data.save(w, self.size)?;
        }
        Ok(())
    }

    /// Restores a container persisted by [`save`](Self::save).
    ///
    /// The payload is staged into a fresh column set and swapped in only
    /// once everything has parsed, so any failure leaves `self` in its
    /// pre-load state. Handles from before the load must be re-acquired.
    ///
    /// # Errors
    /// [`CMapError::IoVersionMismatch`], [`CMapError::IoTruncated`],
    /// [`CMapError::UnknownTypeTag`], or [`CMapError::Io`].
    pub fn load<R: Read>(&mut self, r: &mut R) -> Result<(), CMapError> {
        let size = read_u32(r)?;
        let free_head = read_u32(r)?;
        let count = read_u32(r)?;
        let mut refs: ChunkArray<u32, C> = ChunkArray::new();
        refs.load(r)?;
        if size > refs.capacity() {
            return Err(CMapError::Io(format!(
                "container header claims {size} lines but the refcount column holds {}",
                refs.capacity()
            )));
        }
        let mut slots: Vec<ColumnSlot<C>> = Vec::with_capacity(count as usize);
        let mut names = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let name = read_str(r)?;
            let tag = read_str(r)?;
            let mut data = column_for_tag::<C>(&tag)?;
            data.load(r)?;
            if data.nb_chunks() != refs.nb_chunks() {
                return Err(CMapError::Io(format!(
                    "column `{name}` has {} chunks, refcount column has {}",
                    data.nb_chunks(),
                    refs.nb_chunks()
                )));
            }
            names.insert(name.clone(), slots.len() as u32);
            slots.push(ColumnSlot {
                name: Some(name),
                generation: 1,
                data: Some(data),
            });
        }
        let mut nb_used = 0;
        for i in 0..size {
            if is_live_ref(&refs, size, i) {
                nb_used += 1;
            }
        }
        self.slots = slots;
        self.names = names;
        self.refs = refs;
        self.free_head = free_head;
        self.size = size;
        self.nb_used = nb_used;
        self.markers.lock().clear();
        cmap_debug_assert_ok!(self.validate_invariants(), "container after load");
        Ok(())
    }
}

impl<const C: usize> DebugInvariants for AttributeContainer<C> {
    fn debug_assert_invariants(&self) {
        cmap_debug_assert_ok!(self.validate_invariants(), "AttributeContainer invalid");
    }

    fn validate_invariants(&self) -> Result<(), CMapError> {
        let fail = |msg: String| Err(CMapError::InvariantViolation(msg));

        // all columns share the refcount column's capacity
        for slot in &self.slots {
            if let Some(data) = slot.data.as_ref() {
                if data.capacity() != self.refs.capacity() {
                    return fail(format!(
                        "column `{}` capacity {} != container capacity {}",
                        slot.name.as_deref().unwrap_or("?"),
                        data.capacity(),
                        self.refs.capacity()
                    ));
                }
            }
        }
        if self.size > self.capacity() {
            return fail(format!(
                "size {} exceeds capacity {}",
                self.size,
                self.capacity()
            ));
        }
        // live count
        let live = (0..self.size)
            .filter(|&i| is_live_ref(&self.refs, self.size, i))
            .count() as u32;
        if live != self.nb_used {
            return fail(format!("nb_used {} but {} live slots", self.nb_used, live));
        }
        // free-list walk: all free slots reachable, no cycles
        let mut seen = 0u32;
        let mut cur = self.free_head;
        while cur != INVALID_INDEX {
            if cur >= self.size {
                return fail(format!("free-list index {cur} beyond size {}", self.size));
            }
            let r = self.refs[cur];
            if r & FREE_MASK == 0 {
                return fail(format!("free-list slot {cur} is not marked free"));
            }
            seen += 1;
            if seen > self.size {
                return fail("free list contains a cycle".to_owned());
            }
            let next = r & !FREE_MASK;
            cur = if next == FREE_END { INVALID_INDEX } else { next };
        }
        if seen != self.size - self.nb_used {
            return fail(format!(
                "free list holds {seen} slots, expected {}",
                self.size - self.nb_used
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Cont = AttributeContainer<32>;

    #[test]
    fn insert_gives_live_default_initialized_slots() {
        let mut c = Cont::new();
        let h = c.add_attribute::<u32>("val").unwrap();
        let i = c.insert_lines(1);
        assert_eq!(i, 0);
        assert_eq!(c.refcount(i), 1);
        assert_eq!(c.nb_elements(), 1);
        assert_eq!(c.view(&h).unwrap()[i], 0);
    }

    #[test]
    fn freed_slots_are_reused_lifo() {
        let mut c = Cont::new();
        let a = c.insert_lines(1);
        let b = c.insert_lines(1);
        let d = c.insert_lines(1);
        c.remove_line(b);
        c.remove_line(d);
        assert_eq!(c.nb_elements(), 1);
        // LIFO: last freed comes back first
        assert_eq!(c.insert_lines(1), d);
        assert_eq!(c.insert_lines(1), b);
        assert_eq!(c.insert_lines(1), a + 3);
        c.debug_assert_invariants();
    }

    #[test]
    fn insert_run_skips_fragmented_free_list() {
        let mut c = Cont::new();
        for _ in 0..4 {
            c.insert_lines(1);
        }
        c.remove_line(2);
        c.remove_line(0);
        // head run is {0} then jumps to 2: not consecutive, so a pair
        // comes from the end
        let pair = c.insert_lines(2);
        assert_eq!(pair, 4);
        // single still reuses the head
        assert_eq!(c.insert_lines(1), 0);
        c.debug_assert_invariants();
    }

    #[test]
    fn insert_run_reuses_consecutive_head_run() {
        let mut c = Cont::new();
        for _ in 0..4 {
            c.insert_lines(1);
        }
        // free in reverse so the list reads 1 -> 2 -> 3
        c.remove_line(3);
        c.remove_line(2);
        c.remove_line(1);
        assert_eq!(c.insert_lines(3), 1);
        assert_eq!(c.nb_elements(), 4);
        c.debug_assert_invariants();
    }

    #[test]
    fn refcounting_delays_release() {
        let mut c = Cont::new();
        let i = c.insert_lines(1);
        c.ref_line(i);
        assert_eq!(c.refcount(i), 2);
        c.unref_line(i);
        assert!(c.is_live(i));
        c.unref_line(i);
        assert!(!c.is_live(i));
        assert_eq!(c.refcount(i), 0);
    }

    #[test]
    fn capacity_grows_by_whole_chunks_for_all_columns() {
        let mut c = Cont::new();
        let h = c.add_attribute::<f64>("x").unwrap();
        for _ in 0..33 {
            c.insert_lines(1);
        }
        assert_eq!(c.capacity(), 64);
        assert!(c.view(&h).unwrap().is_live(32));
        c.debug_assert_invariants();
    }

    #[test]
    fn name_collision_and_lookup_errors() {
        let mut c = Cont::new();
        c.add_attribute::<f32>("x").unwrap();
        assert_eq!(
            c.add_attribute::<f32>("x").unwrap_err(),
            CMapError::AttributeNameInUse("x".into())
        );
        assert!(matches!(
            c.get_attribute::<f64>("x").unwrap_err(),
            CMapError::AttributeTypeMismatch { .. }
        ));
        assert_eq!(
            c.get_attribute::<f32>("y").unwrap_err(),
            CMapError::AttributeMissing("y".into())
        );
    }

    #[test]
    fn removal_invalidates_handles_and_frees_name() {
        let mut c = Cont::new();
        let h = c.add_attribute::<u32>("x").unwrap();
        assert!(c.is_handle_valid(&h));
        c.remove_attribute(h).unwrap();
        assert!(!c.is_handle_valid(&h));
        assert!(c.view(&h).is_err());
        // name is reusable; fresh column is default-initialized
        c.insert_lines(1);
        let h2 = c.add_attribute::<u32>("x").unwrap();
        assert!(!c.is_handle_valid(&h));
        assert_eq!(c.view(&h2).unwrap()[0], 0);
    }

    #[test]
    fn force_type_reinterprets_bits() {
        let mut c = Cont::new();
        let h = c.add_attribute::<f32>("x").unwrap();
        let i = c.insert_lines(1);
        c.view_mut(&h).unwrap().set(i, 1.5f32);
        let forced = c.get_attribute_force_type::<u32>("x").unwrap();
        assert_eq!(c.view(&forced).unwrap()[i], 1.5f32.to_bits());
        // writes through the forced handle land in the original column
        c.view_mut(&forced).unwrap().set(i, 2.0f32.to_bits());
        assert_eq!(c.view(&h).unwrap()[i], 2.0);
    }

    #[test]
    fn force_type_size_mismatch_fails_and_preserves_column() {
        let mut c = Cont::new();
        let h = c.add_attribute::<f32>("x").unwrap();
        let i = c.insert_lines(1);
        c.view_mut(&h).unwrap().set(i, 4.25);
        assert!(matches!(
            c.get_attribute_force_type::<f64>("x").unwrap_err(),
            CMapError::AttributeSizeMismatch { .. }
        ));
        assert_eq!(c.view(&h).unwrap()[i], 4.25);
    }

    #[test]
    fn view_iterates_live_slots_only() {
        let mut c = Cont::new();
        let h = c.add_attribute::<u32>("x").unwrap();
        for k in 0..5 {
            let i = c.insert_lines(1);
            c.view_mut(&h).unwrap().set(i, k * 10);
        }
        c.remove_line(1);
        c.remove_line(3);
        let v = c.view(&h).unwrap();
        let got: Vec<(u32, u32)> = v.iter_with_slots().map(|(i, &x)| (i, x)).collect();
        assert_eq!(got, vec![(0, 0), (2, 20), (4, 40)]);
    }

    #[test]
    fn fill_touches_live_slots_only() {
        let mut c = Cont::new();
        let h = c.add_attribute::<u32>("x").unwrap();
        for _ in 0..4 {
            c.insert_lines(1);
        }
        c.remove_line(2);
        c.view_mut(&h).unwrap().fill(9);
        let v = c.view(&h).unwrap();
        assert_eq!(v[0], 9);
        assert_eq!(v[2], 0, "freed slot untouched");
    }

    #[test]
    fn compact_eliminates_holes_and_trims_chunks() {
        let mut c = Cont::new();
        let h = c.add_attribute::<u32>("x").unwrap();
        for k in 0..40u32 {
            let i = c.insert_lines(1);
            c.view_mut(&h).unwrap().set(i, k);
        }
        for i in (0..40).step_by(2) {
            c.remove_line(i);
        }
        let remap = c.compact();
        assert_eq!(c.nb_elements(), 20);
        assert_eq!(c.size(), 20);
        assert_eq!(c.capacity(), 32, "trailing chunk released");
        let v = c.view(&h).unwrap();
        for old in (1..40u32).step_by(2) {
            let new = remap[old as usize];
            assert_ne!(new, INVALID_INDEX);
            assert_eq!(v[new], old);
        }
        assert_eq!(remap[0], INVALID_INDEX);
        c.debug_assert_invariants();
    }

    #[test]
    fn save_load_roundtrip_with_free_list() {
        let mut c = Cont::new();
        let hu = c.add_attribute::<u32>("u").unwrap();
        let hf = c.add_attribute::<f64>("f").unwrap();
        let hb = c.add_bit_attribute("b").unwrap();
        for k in 0..10u32 {
            let i = c.insert_lines(1);
            c.view_mut(&hu).unwrap().set(i, k);
            c.view_mut(&hf).unwrap().set(i, k as f64 * 0.5);
            if k % 3 == 0 {
                c.bit_column_mut(&hb).unwrap().set_true(i);
            }
        }
        c.remove_line(4);
        c.remove_line(7);

        let mut buf = Vec::new();
        c.save(&mut buf).unwrap();

        let mut d = Cont::new();
        d.load(&mut buf.as_slice()).unwrap();
        d.debug_assert_invariants();
        assert_eq!(d.nb_elements(), 8);
        assert_eq!(d.size(), 10);
        let hu2 = d.get_attribute::<u32>("u").unwrap();
        let hf2 = d.get_attribute::<f64>("f").unwrap();
        let hb2 = d.get_bit_attribute("b").unwrap();
        for i in d.live_slots().collect::<Vec<_>>() {
            assert_eq!(d.view(&hu2).unwrap()[i], i);
            assert_eq!(d.view(&hf2).unwrap()[i], i as f64 * 0.5);
            assert_eq!(d.bit_column(&hb2).unwrap().get(i), i % 3 == 0);
        }
        // freed slots stay freed and reusable
        assert_eq!(d.insert_lines(1), 7);
    }

    #[test]
    fn failed_load_leaves_container_unchanged() {
        let mut c = Cont::new();
        let h = c.add_attribute::<u32>("keep").unwrap();
        let i = c.insert_lines(1);
        c.view_mut(&h).unwrap().set(i, 42);

        let mut buf = Vec::new();
        c.save(&mut buf).unwrap();
        buf.truncate(buf.len() - 3);

        assert_eq!(c.load(&mut buf.as_slice()).unwrap_err(), CMapError::IoTruncated);
        assert_eq!(c.view(&h).unwrap()[i], 42);
        assert_eq!(c.nb_elements(), 1);
    }

    #[test]
    fn add_remove_add_yields_default_column() {
        let mut c = Cont::new();
        let h = c.add_attribute::<f32>("x").unwrap();
        let i = c.insert_lines(1);
        c.view_mut(&h).unwrap().set(i, 3.5);
        c.remove_attribute(h).unwrap();
        let h2 = c.add_attribute::<f32>("x").unwrap();
        assert_eq!(c.view(&h2).unwrap()[i], 0.0);
        assert_eq!(c.capacity(), 32);
    }

    #[test]
    fn marker_pool_recycles_cleared_columns() {
        let mut c = Cont::new();
        c.insert_lines(5);
        let mut m = c.acquire_marker();
        m.set_true(3);
        c.release_marker(m);
        let m2 = c.acquire_marker();
        assert!(!m2.get(3), "pooled marker comes back cleared");
        assert_eq!(m2.capacity(), c.capacity());
        c.release_marker(m2);
    }
}

#[cfg(all(test, feature = "rayon"))]
mod rayon_tests {
    use super::*;
    use rayon::iter::ParallelIterator;

    #[test]
    fn par_live_slots_matches_serial() {
        let mut c = AttributeContainer::<32>::new();
        for _ in 0..100 {
            c.insert_lines(1);
        }
        for i in (0..100).step_by(3) {
            c.remove_line(i);
        }
        let mut par: Vec<u32> = c.par_live_slots().collect();
        par.sort_unstable();
        let ser: Vec<u32> = c.live_slots().collect();
        assert_eq!(par, ser);
    }
}
