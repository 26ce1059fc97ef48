//! `Dart`: a strong, zero-cost handle for the atomic combinatorial element.
//!
//! Every entity of a combinatorial map is encoded by darts; the φ-family
//! permutations act on them. A `Dart` wraps the `u32` slot index of the
//! dart's line in the topology container. Two darts are equal iff their
//! slot indices are equal. The all-ones index is reserved as the nil
//! sentinel ([`Dart::NIL`]).
//!
//! # Memory layout
//! `Dart` is `repr(transparent)` over `u32`: it has the same size,
//! alignment and ABI as its index, so buffers of darts can be handed to
//! byte-oriented consumers unchanged.

use std::fmt;

/// Atomic element of a combinatorial map, identified by its slot index.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct Dart(u32);

impl Dart {
    /// The nil dart; never a live slot.
    pub const NIL: Dart = Dart(u32::MAX);

    /// Wraps a raw slot index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Dart(index)
    }

    /// The slot index of this dart in the topology container.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// True for the [`Dart::NIL`] sentinel.
    #[inline]
    pub const fn is_nil(self) -> bool {
        self.0 == u32::MAX
    }
}

impl From<Dart> for u32 {
    #[inline]
    fn from(d: Dart) -> Self {
        d.0
    }
}

impl From<u32> for Dart {
    #[inline]
    fn from(i: u32) -> Self {
        Dart(i)
    }
}

impl fmt::Debug for Dart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            f.write_str("Dart(NIL)")
        } else {
            f.debug_tuple("Dart").field(&self.0).finish()
        }
    }
}

/// Prints the slot index without wrapper text, `~` for nil.
impl fmt::Display for Dart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            f.write_str("~")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Default for Dart {
    #[inline]
    fn default() -> Self {
        Dart::NIL
    }
}

#[cfg(test)]
mod layout_tests {
    //! Compile-time assertion that `Dart` has the same layout as `u32`.
    use super::*;
    use static_assertions::{assert_eq_align, assert_eq_size};

    assert_eq_size!(Dart, u32);

    #[test]
    fn alignment_matches_u32() {
        assert_eq_align!(Dart, u32);
    }
}
