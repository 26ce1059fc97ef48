//! Recycled scratch buffers for traversal code.
//!
//! Orbit walks and embedding restamps constantly need short-lived
//! `Vec<Dart>` / `Vec<u32>` scratch space; the pools here hand out
//! cleared, capacity-preserving vectors so hot paths stop allocating
//! after warm-up. The process-wide pools are lock-protected; tests that
//! want isolation can instantiate their own [`BufferPool`].
//!
//! A buffer is lent until released. Dropping one instead of releasing it
//! is safe — the memory returns to the allocator and the pool simply
//! forgets it.

use crate::topology::dart::Dart;
use crate::topology::orbit::{Cell, CellOrbit};
use bytemuck::TransparentWrapperAlloc;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// A pool of reusable vectors of one payload type.
#[derive(Debug, Default)]
pub struct BufferPool<T> {
    free: Mutex<Vec<Vec<T>>>,
}

impl<T> BufferPool<T> {
    pub fn new() -> Self {
        BufferPool {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Hands out an empty vector, reusing pooled capacity when
    /// available. O(1) under the lock.
    pub fn acquire(&self) -> Vec<T> {
        self.free.lock().pop().unwrap_or_default()
    }

    /// Returns a vector to the pool, cleared but keeping its capacity.
    pub fn release(&self, mut v: Vec<T>) {
        v.clear();
        self.free.lock().push(v);
    }

    /// Number of idle buffers currently pooled.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

impl BufferPool<Dart> {
    /// Hands out a dart buffer reinterpreted as a cell buffer; valid
    /// because `Cell<O>` is `repr(transparent)` over `Dart`.
    pub fn acquire_cells<O: CellOrbit>(&self) -> Vec<Cell<O>> {
        Cell::<O>::wrap_vec(self.acquire())
    }

    /// Accepts either flavour of buffer back.
    pub fn release_cells<O: CellOrbit>(&self, v: Vec<Cell<O>>) {
        self.release(Cell::<O>::peel_vec(v));
    }
}

static DART_BUFFERS: Lazy<BufferPool<Dart>> = Lazy::new(BufferPool::new);
static UINT_BUFFERS: Lazy<BufferPool<u32>> = Lazy::new(BufferPool::new);

/// The process-wide dart buffer pool.
pub fn dart_buffers() -> &'static BufferPool<Dart> {
    &DART_BUFFERS
}

/// The process-wide unsigned-integer buffer pool.
pub fn uint_buffers() -> &'static BufferPool<u32> {
    &UINT_BUFFERS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::orbit::VertexTag;

    #[test]
    fn release_preserves_capacity_and_clears() {
        let pool = BufferPool::<u32>::new();
        let mut v = pool.acquire();
        v.extend(0..100);
        let cap = v.capacity();
        pool.release(v);
        assert_eq!(pool.idle(), 1);
        let v2 = pool.acquire();
        assert!(v2.is_empty());
        assert!(v2.capacity() >= cap);
        pool.release(v2);
    }

    #[test]
    fn cell_buffers_share_dart_storage() {
        let pool = BufferPool::<Dart>::new();
        let mut v = pool.acquire();
        v.push(Dart::new(1));
        let cap = v.capacity();
        pool.release(v);

        let mut cells: Vec<Cell<VertexTag>> = pool.acquire_cells();
        assert!(cells.is_empty());
        assert!(cells.capacity() >= cap);
        cells.push(Cell::new(Dart::new(2)));
        pool.release_cells(cells);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn process_wide_pools_are_shared() {
        let a = dart_buffers().acquire();
        dart_buffers().release(a);
        let b = uint_buffers().acquire();
        uint_buffers().release(b);
    }
}
