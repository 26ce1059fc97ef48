//! CMapError: unified error type for the ncmap public APIs.
//!
//! Every fallible operation in the crate reports through this enum, so
//! callers match on one type whether the failure came from the attribute
//! container, the embedding layer, or persistence.

use crate::topology::orbit::Orbit;
use thiserror::Error;

/// Unified error type for combinatorial-map operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CMapError {
    /// An attribute with this name already exists in the container.
    #[error("attribute name `{0}` already in use")]
    AttributeNameInUse(String),
    /// No attribute with this name exists in the container.
    #[error("no attribute named `{0}`")]
    AttributeMissing(String),
    /// The attribute exists but stores a different element type.
    #[error("attribute `{name}` holds `{found}`, not `{expected}`")]
    AttributeTypeMismatch {
        name: String,
        expected: &'static str,
        found: String,
    },
    /// Forced reinterpretation requested between types of unequal size.
    #[error("attribute `{name}`: cannot reinterpret {found}-byte elements as {expected}-byte elements")]
    AttributeSizeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    /// Forced reinterpretation would produce misaligned element references.
    #[error("attribute `{0}`: reinterpreted element type has stricter alignment than the stored type")]
    ReinterpretUnaligned(String),
    /// The handle is default-constructed, stale, or its column was removed.
    #[error("attribute handle is invalid (column removed or never assigned)")]
    InvalidHandle,
    /// The orbit has no embedding column; add an attribute on it first.
    #[error("orbit {0:?} is not embedded")]
    MissingEmbedding(Orbit),
    /// Operation applied to the nil dart.
    #[error("operation on the nil dart")]
    NilDart,
    /// A persisted column was written with a different chunk geometry.
    #[error("persisted chunk byte size {found} does not match expected {expected}")]
    IoVersionMismatch { expected: u32, found: u32 },
    /// The input ended before the persisted payload was complete.
    #[error("persisted data is truncated")]
    IoTruncated,
    /// A persisted column carries a type tag this build cannot instantiate.
    #[error("unknown attribute type tag `{0}`")]
    UnknownTypeTag(String),
    /// Underlying I/O failure; the message is the `std::io::Error` rendering.
    #[error("i/o error: {0}")]
    Io(String),
    /// An internal consistency check failed; see `DebugInvariants`.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<std::io::Error> for CMapError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            CMapError::IoTruncated
        } else {
            CMapError::Io(e.to_string())
        }
    }
}
