//! Type-erased column storage.
//!
//! The container manages a heterogeneous set of columns through
//! [`ColumnOps`], a small object-safe vtable over [`ChunkArray<T, C>`].
//! Storage comes in two variants chosen at construction from the
//! requested type: element-sized ([`ColumnData::Elem`]) and bit-packed
//! boolean ([`ColumnData::Bit`]); the container surface over both is
//! uniform.
//!
//! Persisted columns carry a type tag so a container file can be loaded
//! without compile-time knowledge of its schema; the tag registry below
//! covers the built-in attribute types.

use crate::cmap_error::CMapError;
use crate::data::bit_array::BitArray;
use crate::data::chunk_array::{AttributeValue, ChunkArray};
use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::io::{Read, Write};

/// Object-safe operations every element column supports.
pub(crate) trait ColumnOps: Any + Debug + Send + Sync {
    fn set_nb_chunks(&mut self, n: usize);
    fn nb_chunks(&self) -> usize;
    fn capacity(&self) -> u32;
    fn init_elt(&mut self, i: u32);
    fn copy_elt(&mut self, dst: u32, src: u32);
    /// Size in bytes of one element.
    fn elem_bytes(&self) -> usize;
    /// Alignment in bytes of one element.
    fn elem_align(&self) -> usize;
    fn save(&self, w: &mut dyn Write, nb_lines: u32) -> Result<(), CMapError>;
    fn load(&mut self, r: &mut dyn Read) -> Result<(), CMapError>;
    /// Raw bytes of chunk `k`; the reinterpretation surface for
    /// `get_attribute_force_type`.
    fn chunk_bytes(&self, k: usize) -> &[u8];
    fn chunk_bytes_mut(&mut self, k: usize) -> &mut [u8];
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: AttributeValue, const C: usize> ColumnOps for ChunkArray<T, C> {
    fn set_nb_chunks(&mut self, n: usize) {
        ChunkArray::set_nb_chunks(self, n)
    }
    fn nb_chunks(&self) -> usize {
        ChunkArray::nb_chunks(self)
    }
    fn capacity(&self) -> u32 {
        ChunkArray::capacity(self)
    }
    fn init_elt(&mut self, i: u32) {
        ChunkArray::init_elt(self, i)
    }
    fn copy_elt(&mut self, dst: u32, src: u32) {
        ChunkArray::copy_elt(self, dst, src)
    }
    fn elem_bytes(&self) -> usize {
        std::mem::size_of::<T>()
    }
    fn elem_align(&self) -> usize {
        std::mem::align_of::<T>()
    }
    fn save(&self, w: &mut dyn Write, nb_lines: u32) -> Result<(), CMapError> {
        ChunkArray::save(self, w, nb_lines)
    }
    fn load(&mut self, r: &mut dyn Read) -> Result<(), CMapError> {
        ChunkArray::load(self, r)
    }
    fn chunk_bytes(&self, k: usize) -> &[u8] {
        ChunkArray::chunk_bytes(self, k)
    }
    fn chunk_bytes_mut(&mut self, k: usize) -> &mut [u8] {
        ChunkArray::chunk_bytes_mut(self, k)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// One column of the container: element-sized or bit-packed.
#[derive(Debug)]
pub(crate) enum ColumnData<const C: usize> {
    Elem {
        ops: Box<dyn ColumnOps>,
        /// Persistence tag; see [`type_tag_of`].
        tag: String,
    },
    Bit(BitArray<C>),
}

impl<const C: usize> ColumnData<C> {
    pub(crate) fn new_elem<T: AttributeValue>() -> Self {
        ColumnData::Elem {
            ops: Box::new(ChunkArray::<T, C>::new()),
            tag: type_tag_of::<T>()
                .map(str::to_owned)
                .unwrap_or_else(|| std::any::type_name::<T>().to_owned()),
        }
    }

    pub(crate) fn new_bit() -> Self {
        ColumnData::Bit(BitArray::new())
    }

    pub(crate) fn tag(&self) -> &str {
        match self {
            ColumnData::Elem { tag, .. } => tag,
            ColumnData::Bit(_) => BOOL_TAG,
        }
    }

    pub(crate) fn set_nb_chunks(&mut self, n: usize) {
        match self {
            ColumnData::Elem { ops, .. } => ops.set_nb_chunks(n),
            ColumnData::Bit(b) => b.set_nb_chunks(n),
        }
    }

    pub(crate) fn nb_chunks(&self) -> usize {
        match self {
            ColumnData::Elem { ops, .. } => ops.nb_chunks(),
            ColumnData::Bit(b) => b.nb_chunks(),
        }
    }

    pub(crate) fn capacity(&self) -> u32 {
        match self {
            ColumnData::Elem { ops, .. } => ops.capacity(),
            ColumnData::Bit(b) => b.capacity(),
        }
    }

    pub(crate) fn init_elt(&mut self, i: u32) {
        match self {
            ColumnData::Elem { ops, .. } => ops.init_elt(i),
            ColumnData::Bit(b) => b.init_elt(i),
        }
    }

    pub(crate) fn copy_elt(&mut self, dst: u32, src: u32) {
        match self {
            ColumnData::Elem { ops, .. } => ops.copy_elt(dst, src),
            ColumnData::Bit(b) => b.copy_elt(dst, src),
        }
    }

    pub(crate) fn save(&self, w: &mut dyn Write, nb_lines: u32) -> Result<(), CMapError> {
        match self {
            ColumnData::Elem { ops, .. } => ops.save(w, nb_lines),
            ColumnData::Bit(b) => b.save(w, nb_lines),
        }
    }

    pub(crate) fn load(&mut self, r: &mut dyn Read) -> Result<(), CMapError> {
        match self {
            ColumnData::Elem { ops, .. } => ops.load(r),
            ColumnData::Bit(b) => b.load(r),
        }
    }

    pub(crate) fn downcast_ref<T: AttributeValue>(&self) -> Option<&ChunkArray<T, C>> {
        match self {
            ColumnData::Elem { ops, .. } => ops.as_any().downcast_ref(),
            ColumnData::Bit(_) => None,
        }
    }

    pub(crate) fn downcast_mut<T: AttributeValue>(&mut self) -> Option<&mut ChunkArray<T, C>> {
        match self {
            ColumnData::Elem { ops, .. } => ops.as_any_mut().downcast_mut(),
            ColumnData::Bit(_) => None,
        }
    }

    pub(crate) fn as_ops(&self) -> Option<&dyn ColumnOps> {
        match self {
            ColumnData::Elem { ops, .. } => Some(&**ops),
            ColumnData::Bit(_) => None,
        }
    }

    pub(crate) fn as_ops_mut(&mut self) -> Option<&mut dyn ColumnOps> {
        match self {
            ColumnData::Elem { ops, .. } => Some(&mut **ops),
            ColumnData::Bit(_) => None,
        }
    }

    pub(crate) fn as_bit(&self) -> Option<&BitArray<C>> {
        match self {
            ColumnData::Bit(b) => Some(b),
            ColumnData::Elem { .. } => None,
        }
    }

    pub(crate) fn as_bit_mut(&mut self) -> Option<&mut BitArray<C>> {
        match self {
            ColumnData::Bit(b) => Some(b),
            ColumnData::Elem { .. } => None,
        }
    }
}

pub(crate) const BOOL_TAG: &str = "bool";

/// Persistence tag for a built-in element type, `None` for foreign types.
pub(crate) fn type_tag_of<T: 'static>() -> Option<&'static str> {
    let id = TypeId::of::<T>();
    macro_rules! tag {
        ($($ty:ty => $name:literal),* $(,)?) => {
            $(if id == TypeId::of::<$ty>() { return Some($name); })*
        };
    }
    tag! {
        u8 => "u8", u16 => "u16", u32 => "u32", u64 => "u64",
        i8 => "i8", i16 => "i16", i32 => "i32", i64 => "i64",
        f32 => "f32", f64 => "f64",
        [f32; 2] => "vec2f", [f32; 3] => "vec3f", [f32; 4] => "vec4f",
        [f64; 2] => "vec2d", [f64; 3] => "vec3d",
    }
    None
}

/// Instantiates an empty column for a persisted type tag.
///
/// # Errors
/// [`CMapError::UnknownTypeTag`] when the tag is not in the registry.
pub(crate) fn column_for_tag<const C: usize>(tag: &str) -> Result<ColumnData<C>, CMapError> {
    Ok(match tag {
        "u8" => ColumnData::new_elem::<u8>(),
        "u16" => ColumnData::new_elem::<u16>(),
        "u32" => ColumnData::new_elem::<u32>(),
        "u64" => ColumnData::new_elem::<u64>(),
        "i8" => ColumnData::new_elem::<i8>(),
        "i16" => ColumnData::new_elem::<i16>(),
        "i32" => ColumnData::new_elem::<i32>(),
        "i64" => ColumnData::new_elem::<i64>(),
        "f32" => ColumnData::new_elem::<f32>(),
        "f64" => ColumnData::new_elem::<f64>(),
        "vec2f" => ColumnData::new_elem::<[f32; 2]>(),
        "vec3f" => ColumnData::new_elem::<[f32; 3]>(),
        "vec4f" => ColumnData::new_elem::<[f32; 4]>(),
        "vec2d" => ColumnData::new_elem::<[f64; 2]>(),
        "vec3d" => ColumnData::new_elem::<[f64; 3]>(),
        BOOL_TAG => ColumnData::new_bit(),
        other => {
            log::warn!("container load: unknown attribute type tag `{other}`");
            return Err(CMapError::UnknownTypeTag(other.to_owned()));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_cover_builtins() {
        assert_eq!(type_tag_of::<f32>(), Some("f32"));
        assert_eq!(type_tag_of::<[f32; 3]>(), Some("vec3f"));
        assert_eq!(type_tag_of::<String>(), None);
    }

    #[test]
    fn tag_roundtrip_instantiates_matching_column() {
        let col = column_for_tag::<64>("f64").unwrap();
        assert_eq!(col.tag(), "f64");
        assert!(col.downcast_ref::<f64>().is_some());
        assert!(col.downcast_ref::<f32>().is_none());

        let bit = column_for_tag::<64>("bool").unwrap();
        assert!(bit.as_bit().is_some());

        assert!(matches!(
            column_for_tag::<64>("quaternion"),
            Err(CMapError::UnknownTypeTag(_))
        ));
    }

    #[test]
    fn erased_ops_match_typed_column() {
        let mut col = ColumnData::<32>::new_elem::<u32>();
        col.set_nb_chunks(2);
        assert_eq!(col.capacity(), 64);
        {
            let arr = col.downcast_mut::<u32>().unwrap();
            arr.set(40, 7);
        }
        col.copy_elt(0, 40);
        assert_eq!(col.downcast_ref::<u32>().unwrap()[0], 7);
        col.init_elt(0);
        assert_eq!(col.downcast_ref::<u32>().unwrap()[0], 0);
    }
}
