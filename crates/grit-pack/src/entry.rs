//! Pack entry headers.
//!
//! Each entry starts with a variable-length header: the low three bits of
//! the type live in bits 4-6 of the first byte, the size starts in its low
//! four bits and continues seven bits per byte while the 0x80 flag is set.
//! Delta entries follow the size with their base reference -- a full object
//! id for ref-deltas, or a variable-length negative distance for
//! offset-deltas.

use grit_types::{ObjectId, ObjectKind};

use crate::error::{PackError, PackResult};

/// Bound on entry header length; generous against the longest legal header.
const MAX_HEADER_BYTES: usize = 64;

/// Type code for offset deltas.
pub const OFS_DELTA: u8 = 6;
/// Type code for reference deltas.
pub const REF_DELTA: u8 = 7;

/// What a pack entry contains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackEntryKind {
    /// Complete object of the given kind.
    Full(ObjectKind),
    /// Delta against an earlier entry in the same pack, by absolute offset.
    OfsDelta { base_offset: u64 },
    /// Delta against an object named by id, wherever it lives.
    RefDelta { base: ObjectId },
}

/// Parsed entry header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryHeader {
    /// Entry kind, including the delta variants.
    pub kind: PackEntryKind,
    /// Inflated payload size (for deltas: the delta stream, not the result).
    pub size: u64,
    /// Offset where the zlib payload begins.
    pub data_start: u64,
}

/// Parse the entry header at `offset` within `data`.
pub fn parse_entry_header(data: &[u8], offset: u64, oid_len: usize) -> PackResult<EntryHeader> {
    let start = usize::try_from(offset)
        .ok()
        .filter(|&p| p < data.len())
        .ok_or_else(|| PackError::corrupt(offset, "entry offset beyond pack data"))?;
    let mut pos = start;

    let first = data[pos];
    pos += 1;

    let type_code = (first >> 4) & 0x07;
    let mut size = (first & 0x0f) as u64;
    let mut shift = 4u32;
    let mut byte = first;
    while byte & 0x80 != 0 {
        if pos - start >= MAX_HEADER_BYTES || shift > 63 {
            return Err(PackError::corrupt(offset, "entry size varint too long"));
        }
        byte = *data
            .get(pos)
            .ok_or_else(|| PackError::corrupt(offset, "truncated entry header"))?;
        pos += 1;
        size |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }

    let kind = match type_code {
        1..=4 => {
            // from_pack_code covers exactly these four values.
            let kind = ObjectKind::from_pack_code(type_code)
                .ok_or_else(|| PackError::corrupt(offset, "unreachable type code"))?;
            PackEntryKind::Full(kind)
        }
        OFS_DELTA => {
            let (distance, new_pos) = parse_ofs_distance(data, offset, pos)?;
            pos = new_pos;
            if distance == 0 || distance > offset {
                return Err(PackError::corrupt(offset, "offset delta base underflow"));
            }
            PackEntryKind::OfsDelta {
                base_offset: offset - distance,
            }
        }
        REF_DELTA => {
            let end = pos + oid_len;
            if end > data.len() {
                return Err(PackError::corrupt(offset, "truncated ref delta base id"));
            }
            let base = ObjectId::from_raw(&data[pos..end])
                .map_err(|e| PackError::corrupt(offset, e.to_string()))?;
            pos = end;
            PackEntryKind::RefDelta { base }
        }
        code => {
            return Err(PackError::corrupt(
                offset,
                format!("invalid entry type code {code}"),
            ));
        }
    };

    Ok(EntryHeader {
        kind,
        size,
        data_start: pos as u64,
    })
}

/// Parse an offset-delta distance: big-endian groups of seven bits, with
/// each continuation adding an implicit +1 to fold out redundant encodings.
fn parse_ofs_distance(data: &[u8], offset: u64, mut pos: usize) -> PackResult<(u64, usize)> {
    let mut byte = *data
        .get(pos)
        .ok_or_else(|| PackError::corrupt(offset, "truncated offset delta distance"))?;
    pos += 1;

    let mut value = (byte & 0x7f) as u64;
    let mut bytes_read = 1usize;
    while byte & 0x80 != 0 {
        if bytes_read >= 10 {
            return Err(PackError::corrupt(offset, "offset delta distance too long"));
        }
        byte = *data
            .get(pos)
            .ok_or_else(|| PackError::corrupt(offset, "truncated offset delta distance"))?;
        pos += 1;
        bytes_read += 1;
        if value >= u64::MAX >> 7 {
            return Err(PackError::corrupt(offset, "offset delta distance overflow"));
        }
        value = (value + 1) << 7;
        value |= (byte & 0x7f) as u64;
    }
    Ok((value, pos))
}

/// Append an entry header for the given type code and inflated size.
pub fn write_entry_header(buf: &mut Vec<u8>, type_code: u8, size: u64) {
    let mut size = size;
    let mut byte = ((type_code & 0x07) << 4) | (size & 0x0f) as u8;
    size >>= 4;
    while size > 0 {
        buf.push(byte | 0x80);
        byte = (size & 0x7f) as u8;
        size >>= 7;
    }
    buf.push(byte);
}

/// Append an offset-delta distance in its big-endian +1-folded encoding.
pub fn write_ofs_distance(buf: &mut Vec<u8>, distance: u64) {
    debug_assert!(distance > 0);
    let mut bytes = [0u8; 10];
    let mut i = bytes.len() - 1;
    let mut value = distance;
    bytes[i] = (value & 0x7f) as u8;
    value >>= 7;
    while value > 0 {
        value -= 1;
        i -= 1;
        bytes[i] = 0x80 | (value & 0x7f) as u8;
        value >>= 7;
    }
    buf.extend_from_slice(&bytes[i..]);
}
