//! Bounded zlib inflation over pack slices.
//!
//! Pack entries are back-to-back zlib streams with no length framing, so the
//! inflater must report how many input bytes each stream consumed for the
//! reader to locate entry boundaries, and must cap output so a corrupt
//! header can never provoke an unbounded allocation.

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{PackError, PackResult};

const SCRATCH_LEN: usize = 16 * 1024;

/// Inflate one zlib stream from `input`, expecting exactly `expected` output
/// bytes. Returns the inflated bytes and the count of input bytes consumed.
pub fn inflate_exact(input: &[u8], expected: usize) -> PackResult<(Vec<u8>, usize)> {
    let (out, consumed) = inflate_capped(input, expected, true)?;
    if out.len() != expected {
        return Err(PackError::corrupt(
            0,
            format!("inflated {} bytes, expected {expected}", out.len()),
        ));
    }
    Ok((out, consumed))
}

/// Inflate at most `max_out` bytes from the head of a zlib stream.
///
/// Unlike [`inflate_exact`] this succeeds when the stream holds more data
/// than requested; it is used to peek at delta headers without inflating
/// whole payloads.
pub fn inflate_prefix(input: &[u8], max_out: usize) -> PackResult<Vec<u8>> {
    let (out, _) = inflate_capped(input, max_out, false)?;
    Ok(out)
}

fn inflate_capped(
    input: &[u8],
    max_out: usize,
    whole_stream: bool,
) -> PackResult<(Vec<u8>, usize)> {
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(max_out.min(SCRATCH_LEN));
    let mut buf = [0u8; SCRATCH_LEN];
    let mut in_pos = 0usize;

    loop {
        let before_in = decoder.total_in() as usize;
        let before_out = decoder.total_out() as usize;

        let status = decoder
            .decompress(&input[in_pos..], &mut buf, FlushDecompress::None)
            .map_err(|e| PackError::corrupt(0, format!("zlib inflate: {e}")))?;

        let consumed = decoder.total_in() as usize - before_in;
        let produced = decoder.total_out() as usize - before_out;
        in_pos += consumed;

        if produced != 0 {
            let want = produced.min(max_out - out.len());
            out.extend_from_slice(&buf[..want]);
            if out.len() == max_out && !whole_stream {
                return Ok((out, in_pos));
            }
            if produced > want {
                return Err(PackError::corrupt(0, "inflated data exceeds declared size"));
            }
        }

        match status {
            Status::StreamEnd => return Ok((out, in_pos)),
            Status::Ok | Status::BufError => {
                if consumed == 0 && produced == 0 {
                    return Err(PackError::corrupt(0, "truncated zlib stream"));
                }
            }
        }
    }
}

/// Deflate `data` as one zlib stream.
pub fn deflate(data: &[u8]) -> PackResult<Vec<u8>> {
    use std::io::Write;
    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PackError::CompressionFailed(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| PackError::CompressionFailed(e.to_string()))
}
