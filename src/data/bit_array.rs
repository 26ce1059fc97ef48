//! `BitArray<C>`: the bit-packed variant of a chunked column.
//!
//! Stores one bit per line in `u32` words, `C / 32` words per chunk, so a
//! bit column shares the container's chunk geometry while costing 1/32 of
//! an element column. Used for marker scratch sets and named boolean
//! attributes.

use crate::cmap_error::CMapError;
use crate::data::io::{read_u32, write_u32};
use crate::data::DEFAULT_CHUNK_SIZE;
use std::io::{Read, Write};

/// Bit-packed boolean column. `C` is in bits, matching the element
/// columns of the owning container.
#[derive(Clone, Debug, Default)]
pub struct BitArray<const C: usize = DEFAULT_CHUNK_SIZE> {
    chunks: Vec<Box<[u32]>>,
}

impl<const C: usize> BitArray<C> {
    const WORDS: usize = C / 32;
    const VALID_GEOMETRY: () = assert!(C.is_power_of_two() && C >= 32, "chunk size must be a power of two >= 32");

    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::VALID_GEOMETRY;
        BitArray { chunks: Vec::new() }
    }

    /// Appends one all-false chunk.
    pub fn add_chunk(&mut self) {
        self.chunks.push(vec![0u32; Self::WORDS].into_boxed_slice());
    }

    pub fn set_nb_chunks(&mut self, n: usize) {
        while self.chunks.len() < n {
            self.add_chunk();
        }
        self.chunks.truncate(n);
    }

    #[inline]
    pub fn nb_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Logical capacity in bits: `nb_chunks() * C`.
    #[inline]
    pub fn capacity(&self) -> u32 {
        (self.chunks.len() * C) as u32
    }

    /// Grows until `capacity() >= bits`. Never shrinks.
    pub fn ensure_capacity(&mut self, bits: u32) {
        while self.capacity() < bits {
            self.add_chunk();
        }
    }

    #[inline]
    fn locate(i: u32) -> (usize, usize, u32) {
        let chunk = i as usize / C;
        let bit = i as usize % C;
        (chunk, bit / 32, 1u32 << (bit % 32))
    }

    #[inline]
    pub fn get(&self, i: u32) -> bool {
        let (c, w, mask) = Self::locate(i);
        self.chunks[c][w] & mask != 0
    }

    #[inline]
    pub fn set_true(&mut self, i: u32) {
        let (c, w, mask) = Self::locate(i);
        self.chunks[c][w] |= mask;
    }

    #[inline]
    pub fn set_false(&mut self, i: u32) {
        let (c, w, mask) = Self::locate(i);
        self.chunks[c][w] &= !mask;
    }

    #[inline]
    pub fn set_val(&mut self, i: u32, v: bool) {
        if v {
            self.set_true(i)
        } else {
            self.set_false(i)
        }
    }

    /// Zeroes the entire 32-bit word containing bit `i`, clobbering the
    /// 31 neighbouring bits. Only valid when the caller is in the process
    /// of clearing the whole column; prefer [`clear_all`](Self::clear_all)
    /// unless the set bits are already known.
    #[inline]
    pub fn clear_word_at(&mut self, i: u32) {
        let (c, w, _) = Self::locate(i);
        self.chunks[c][w] = 0;
    }

    /// Zeroes every word. O(nb_chunks * C / 32); the marker release path.
    pub fn clear_all(&mut self) {
        for chunk in &mut self.chunks {
            chunk.fill(0);
        }
    }

    #[inline]
    pub fn init_elt(&mut self, i: u32) {
        self.set_false(i);
    }

    #[inline]
    pub fn copy_elt(&mut self, dst: u32, src: u32) {
        let v = self.get(src);
        self.set_val(dst, v);
    }

    pub fn swap_elt(&mut self, a: u32, b: u32) {
        let (va, vb) = (self.get(a), self.get(b));
        self.set_val(a, vb);
        self.set_val(b, va);
    }

    /// Byte size of one persisted chunk block: `C / 8`.
    #[inline]
    pub const fn chunk_byte_size() -> u32 {
        (C / 8) as u32
    }

    /// Persists the column. `nb_lines` is rounded up to a multiple of 32
    /// before writing so the tail stays word-aligned.
    ///
    /// # Errors
    /// Propagates I/O failures as [`CMapError::Io`].
    pub fn save<W: Write + ?Sized>(&self, w: &mut W, nb_lines: u32) -> Result<(), CMapError> {
        let nb_lines = nb_lines.div_ceil(32) * 32;
        let nbc = self.chunks.len() as u32;
        debug_assert!(nb_lines as usize <= self.chunks.len() * C);
        write_u32(w, nbc)?;
        write_u32(w, nb_lines)?;
        write_u32(w, Self::chunk_byte_size())?;
        if nbc == 0 {
            return Ok(());
        }
        for chunk in &self.chunks[..nbc as usize - 1] {
            w.write_all(bytemuck::cast_slice::<u32, u8>(chunk))?;
        }
        let tail_words = (nb_lines as usize - (nbc as usize - 1) * C) / 32;
        w.write_all(bytemuck::cast_slice::<u32, u8>(
            &self.chunks[nbc as usize - 1][..tail_words],
        ))?;
        Ok(())
    }

    /// Restores a column persisted by [`save`](Self::save).
    ///
    /// # Errors
    /// Same contract as [`ChunkArray::load`](crate::data::chunk_array::ChunkArray::load).
    pub fn load<R: Read + ?Sized>(&mut self, r: &mut R) -> Result<(), CMapError> {
        let nbc = read_u32(r)?;
        let nb_lines = read_u32(r)?;
        let stored = read_u32(r)?;
        if stored != Self::chunk_byte_size() {
            log::warn!(
                "bit array load rejected: stored chunk byte size {stored}, expected {}",
                Self::chunk_byte_size()
            );
            return Err(CMapError::IoVersionMismatch {
                expected: Self::chunk_byte_size(),
                found: stored,
            });
        }
        let full = (nbc as usize).saturating_sub(1) * C;
        if nb_lines % 32 != 0
            || nb_lines as usize > nbc as usize * C
            || (nbc > 0 && (nb_lines as usize) < full)
        {
            return Err(CMapError::Io(format!(
                "bit column header claims {nb_lines} lines in {nbc} chunks of {C}"
            )));
        }
        self.set_nb_chunks(nbc as usize);
        if nbc == 0 {
            return Ok(());
        }
        for k in 0..nbc as usize - 1 {
            r.read_exact(bytemuck::cast_slice_mut::<u32, u8>(&mut self.chunks[k]))?;
        }
        let tail_words = (nb_lines as usize - full) / 32;
        let last = nbc as usize - 1;
        r.read_exact(bytemuck::cast_slice_mut::<u32, u8>(
            &mut self.chunks[last][..tail_words],
        ))?;
        Ok(())
    }
}
