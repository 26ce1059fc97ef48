//! Little-endian primitives for the container persistence format.
//!
//! The on-disk layout is fixed little-endian regardless of host order;
//! all multi-byte headers go through these helpers so the format has a
//! single definition point.

use crate::cmap_error::CMapError;
use std::io::{Read, Write};

pub(crate) fn write_u32<W: Write + ?Sized>(w: &mut W, v: u32) -> Result<(), CMapError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn read_u32<R: Read + ?Sized>(r: &mut R) -> Result<u32, CMapError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Length-prefixed UTF-8 string.
pub(crate) fn write_str<W: Write + ?Sized>(w: &mut W, s: &str) -> Result<(), CMapError> {
    write_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

pub(crate) fn read_str<R: Read + ?Sized>(r: &mut R) -> Result<String, CMapError> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| CMapError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_roundtrip_is_little_endian() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 0x0102_0304).unwrap();
        assert_eq!(buf, [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(read_u32(&mut buf.as_slice()).unwrap(), 0x0102_0304);
    }

    #[test]
    fn str_roundtrip() {
        let mut buf = Vec::new();
        write_str(&mut buf, "position").unwrap();
        assert_eq!(read_str(&mut buf.as_slice()).unwrap(), "position");
    }

    #[test]
    fn short_input_is_truncation() {
        let buf = [0u8; 2];
        assert_eq!(
            read_u32(&mut buf.as_slice()).unwrap_err(),
            CMapError::IoTruncated
        );
    }
}
