//! Loose object wire encoding.
//!
//! A loose object is the zlib deflation of `"<kind> <length>\0"` followed by
//! the raw content. Both directions run through streaming zlib so a
//! multi-gigabyte blob never needs a second in-memory copy: the encoder
//! deflates straight into the destination writer, and header reads inflate
//! only the handful of bytes before the NUL.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use grit_types::ObjectKind;

use crate::error::{StoreError, StoreResult};
use crate::object::RawObject;

/// Upper bound on the loose header: longest kind token, a space, a decimal
/// u64, and the NUL.
const MAX_HEADER_LEN: usize = 32;

/// Deflate an object into `writer` in loose format.
pub fn write_loose<W: Write>(object: &RawObject, writer: W) -> std::io::Result<()> {
    let mut encoder = ZlibEncoder::new(writer, Compression::default());
    encoder.write_all(&grit_hash::object_header(object.kind, object.size()))?;
    encoder.write_all(&object.data)?;
    encoder.finish()?;
    Ok(())
}

/// Deflate loose-format content streamed from `reader` into `writer`.
///
/// `len` must be the exact content length; it is written into the header
/// up front, so the caller must know it (e.g. from file metadata).
pub fn write_loose_stream<R: Read, W: Write>(
    kind: ObjectKind,
    len: u64,
    mut reader: R,
    writer: W,
) -> std::io::Result<()> {
    let mut encoder = ZlibEncoder::new(writer, Compression::default());
    encoder.write_all(&grit_hash::object_header(kind, len))?;
    std::io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}

/// Deflate an object into a fresh buffer in loose format.
pub fn serialize_loose(object: &RawObject) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_loose(object, &mut buf)?;
    Ok(buf)
}

/// Inflate and decode a complete loose object from raw deflated bytes.
pub fn deserialize_loose(bytes: &[u8]) -> StoreResult<RawObject> {
    read_loose(bytes)
}

/// Inflate and decode a complete loose object from a reader.
///
/// The declared header length must exactly match the inflated content
/// length; any shortfall or trailing bytes are corruption.
pub fn read_loose<R: Read>(reader: R) -> StoreResult<RawObject> {
    let mut decoder = ZlibDecoder::new(reader);
    let (kind, len) = parse_header(&mut decoder)?;

    let mut data = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
    (&mut decoder)
        .take(len)
        .read_to_end(&mut data)
        .map_err(|e| StoreError::corrupt(format!("zlib inflate: {e}")))?;
    if (data.len() as u64) < len {
        return Err(StoreError::corrupt(format!(
            "content shorter than declared length: {} < {len}",
            data.len()
        )));
    }

    let mut trailing = [0u8; 1];
    let extra = decoder
        .read(&mut trailing)
        .map_err(|e| StoreError::corrupt(format!("zlib inflate: {e}")))?;
    if extra != 0 {
        return Err(StoreError::corrupt("content longer than declared length"));
    }

    Ok(RawObject::new(kind, data))
}

/// Inflate only the header of a loose object: its kind and declared length.
///
/// Decodes just enough of the stream to reach the NUL terminator, so the
/// cost is independent of the object size.
pub fn read_loose_header<R: Read>(reader: R) -> StoreResult<(ObjectKind, u64)> {
    let mut decoder = ZlibDecoder::new(reader);
    parse_header(&mut decoder)
}

fn parse_header<R: Read>(reader: &mut R) -> StoreResult<(ObjectKind, u64)> {
    let mut header = Vec::with_capacity(MAX_HEADER_LEN);
    let mut byte = [0u8; 1];
    loop {
        let n = reader
            .read(&mut byte)
            .map_err(|e| StoreError::corrupt(format!("zlib inflate: {e}")))?;
        if n == 0 {
            return Err(StoreError::corrupt("truncated object header"));
        }
        if byte[0] == 0 {
            break;
        }
        header.push(byte[0]);
        if header.len() >= MAX_HEADER_LEN {
            return Err(StoreError::corrupt("object header too long"));
        }
    }

    let header = std::str::from_utf8(&header)
        .map_err(|_| StoreError::corrupt("object header is not ASCII"))?;
    let (token, len) = header
        .split_once(' ')
        .ok_or_else(|| StoreError::corrupt("object header missing length"))?;
    let kind = ObjectKind::from_token(token)
        .map_err(|e| StoreError::corrupt(e.to_string()))?;
    let len: u64 = len
        .parse()
        .map_err(|_| StoreError::corrupt(format!("invalid object length {len:?}")))?;
    Ok((kind, len))
}
