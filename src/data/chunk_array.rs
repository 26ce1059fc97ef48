//! `ChunkArray<T, C>`: one typed column of the attribute container.
//!
//! A column is a sequence of heap-allocated chunks of `C` elements each;
//! element `i` lives at `chunks[i / C][i % C]`. Chunks never move once
//! allocated, so growing the column does not invalidate references into
//! surviving chunks, and chunk slices can be handed to byte-oriented
//! consumers (persistence, upload) wholesale.
//!
//! `C` must be a power of two ≥ 32 so the index arithmetic folds to shifts
//! and the bit-packed variant ([`crate::data::bit_array::BitArray`]) can
//! share the same geometry.

use crate::cmap_error::CMapError;
use crate::data::io::{read_u32, write_u32};
use crate::data::DEFAULT_CHUNK_SIZE;
use std::fmt::Debug;
use std::io::{Read, Write};
use std::ops::{Index, IndexMut};

/// Bound for column element types.
///
/// `Pod` gives byte-level persistence and checked reinterpretation for
/// free; `Default` is the value new lines are initialized to.
pub trait AttributeValue: bytemuck::Pod + Default + Debug + Send + Sync + 'static {}
impl<T: bytemuck::Pod + Default + Debug + Send + Sync + 'static> AttributeValue for T {}

/// A chunked typed column. See the module docs for the layout.
#[derive(Clone, Debug, Default)]
pub struct ChunkArray<T, const C: usize = DEFAULT_CHUNK_SIZE> {
    chunks: Vec<Box<[T]>>,
}

impl<T: AttributeValue, const C: usize> ChunkArray<T, C> {
    const VALID_GEOMETRY: () = assert!(C.is_power_of_two() && C >= 32, "chunk size must be a power of two >= 32");

    /// Creates an empty column (zero chunks).
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::VALID_GEOMETRY;
        ChunkArray { chunks: Vec::new() }
    }

    /// Appends one default-initialized chunk. Amortized O(1).
    pub fn add_chunk(&mut self) {
        self.chunks.push(vec![T::default(); C].into_boxed_slice());
    }

    /// Grows or shrinks to exactly `n` chunks. Shrinking frees the
    /// trailing chunks; indices into surviving chunks remain valid.
    pub fn set_nb_chunks(&mut self, n: usize) {
        while self.chunks.len() < n {
            self.add_chunk();
        }
        self.chunks.truncate(n);
    }

    /// Number of allocated chunks.
    #[inline]
    pub fn nb_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Number of addressable elements: `nb_chunks() * C`.
    #[inline]
    pub fn capacity(&self) -> u32 {
        (self.chunks.len() * C) as u32
    }

    /// Drops all chunks.
    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    #[inline]
    pub fn get(&self, i: u32) -> &T {
        &self.chunks[i as usize / C][i as usize % C]
    }

    #[inline]
    pub fn get_mut(&mut self, i: u32) -> &mut T {
        &mut self.chunks[i as usize / C][i as usize % C]
    }

    #[inline]
    pub fn set(&mut self, i: u32, v: T) {
        self.chunks[i as usize / C][i as usize % C] = v;
    }

    /// Overwrites element `i` with the type's default.
    #[inline]
    pub fn init_elt(&mut self, i: u32) {
        self.set(i, T::default());
    }

    /// Copies element `src` over element `dst` within the column.
    #[inline]
    pub fn copy_elt(&mut self, dst: u32, src: u32) {
        let v = *self.get(src);
        self.set(dst, v);
    }

    /// Swaps elements `a` and `b` in place.
    pub fn swap_elt(&mut self, a: u32, b: u32) {
        if a == b {
            return;
        }
        let (ca, ia) = (a as usize / C, a as usize % C);
        let (cb, ib) = (b as usize / C, b as usize % C);
        if ca == cb {
            self.chunks[ca].swap(ia, ib);
        } else {
            let (lo, hi, ilo, ihi) = if ca < cb { (ca, cb, ia, ib) } else { (cb, ca, ib, ia) };
            let (left, right) = self.chunks.split_at_mut(hi);
            std::mem::swap(&mut left[lo][ilo], &mut right[0][ihi]);
        }
    }

    /// Borrow of chunk `k` as a slice of `C` elements.
    ///
    /// The borrow is the "chunk pointer" surface for zero-copy I/O or
    /// upload; the lifetime scoping means it cannot be retained across a
    /// mutation of the column.
    #[inline]
    pub fn chunk(&self, k: usize) -> &[T] {
        &self.chunks[k]
    }

    /// Iterator over all chunk slices, in order.
    pub fn chunks(&self) -> impl Iterator<Item = &[T]> {
        self.chunks.iter().map(|c| &c[..])
    }

    /// Byte size of one chunk block: `C * size_of::<T>()`.
    #[inline]
    pub const fn chunk_byte_size() -> u32 {
        (C * std::mem::size_of::<T>()) as u32
    }

    /// Raw bytes of chunk `k`.
    #[inline]
    pub(crate) fn chunk_bytes(&self, k: usize) -> &[u8] {
        bytemuck::cast_slice(&self.chunks[k])
    }

    #[inline]
    pub(crate) fn chunk_bytes_mut(&mut self, k: usize) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.chunks[k])
    }

    /// Writes the column in the persistence layout: a `{num_chunks,
    /// num_live_lines, chunk_byte_size}` header, all full chunks, then a
    /// tail of `nb_lines - (num_chunks - 1) * C` elements.
    ///
    /// # Errors
    /// Propagates I/O failures as [`CMapError::Io`].
    pub fn save<W: Write + ?Sized>(&self, w: &mut W, nb_lines: u32) -> Result<(), CMapError> {
        let nbc = self.chunks.len() as u32;
        debug_assert!(nb_lines as usize <= self.chunks.len() * C);
        write_u32(w, nbc)?;
        write_u32(w, nb_lines)?;
        write_u32(w, Self::chunk_byte_size())?;
        if nbc == 0 {
            return Ok(());
        }
        for chunk in &self.chunks[..nbc as usize - 1] {
            w.write_all(bytemuck::cast_slice::<T, u8>(chunk))?;
        }
        let tail = nb_lines as usize - (nbc as usize - 1) * C;
        w.write_all(bytemuck::cast_slice::<T, u8>(
            &self.chunks[nbc as usize - 1][..tail],
        ))?;
        Ok(())
    }

    /// Restores a column persisted by [`save`](Self::save).
    ///
    /// # Errors
    /// - [`CMapError::IoVersionMismatch`] if the stored chunk byte size
    ///   disagrees with `C * size_of::<T>()`; the column is untouched.
    /// - [`CMapError::IoTruncated`] on short input; the column may be
    ///   partially overwritten (load through the container for rollback).
    pub fn load<R: Read + ?Sized>(&mut self, r: &mut R) -> Result<(), CMapError> {
        let nbc = read_u32(r)?;
        let nb_lines = read_u32(r)?;
        let stored = read_u32(r)?;
        if stored != Self::chunk_byte_size() {
            log::warn!(
                "chunk array load rejected: stored chunk byte size {stored}, expected {}",
                Self::chunk_byte_size()
            );
            return Err(CMapError::IoVersionMismatch {
                expected: Self::chunk_byte_size(),
                found: stored,
            });
        }
        let full = (nbc as usize).saturating_sub(1) * C;
        if nb_lines as usize > nbc as usize * C || (nbc > 0 && (nb_lines as usize) < full) {
            return Err(CMapError::Io(format!(
                "column header claims {nb_lines} lines in {nbc} chunks of {C}"
            )));
        }
        self.set_nb_chunks(nbc as usize);
        if nbc == 0 {
            return Ok(());
        }
        for k in 0..nbc as usize - 1 {
            r.read_exact(self.chunk_bytes_mut(k))?;
        }
        let tail = nb_lines as usize - full;
        let last = nbc as usize - 1;
        r.read_exact(bytemuck::cast_slice_mut::<T, u8>(
            &mut self.chunks[last][..tail],
        ))?;
        Ok(())
    }
}

impl<T: AttributeValue, const C: usize> Index<u32> for ChunkArray<T, C> {
    type Output = T;
    #[inline]
    fn index(&self, i: u32) -> &T {
        self.get(i)
    }
}

impl<T: AttributeValue, const C: usize> IndexMut<u32> for ChunkArray<T, C> {
    #[inline]
    fn index_mut(&mut self, i: u32) -> &mut T {
        self.get_mut(i)
    }
}
