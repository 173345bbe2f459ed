//! Multi-pack-index (MIDX).
//!
//! One merged, sorted id table spanning many packs, so a repository with
//! thousands of packs resolves a lookup with a single binary search instead
//! of probing every per-pack index. The file is a chunk table after a fixed
//! header: pack names (PNAM), id fan-out (OIDF), id list (OIDL), object
//! offsets (OOFF), and an optional large-offset spill (LOFF), closed by a
//! trailing digest.

use std::path::Path;

use grit_hash::{HashAlgorithm, Hasher};
use grit_types::ObjectId;

use crate::error::{PackError, PackResult};
use crate::idx::PackIndex;

const MIDX_MAGIC: [u8; 4] = *b"MIDX";
const MIDX_VERSION: u8 = 1;
const MIDX_HEADER_LEN: usize = 12;
const CHUNK_ROW_LEN: usize = 12;

const CHUNK_PNAM: u32 = u32::from_be_bytes(*b"PNAM");
const CHUNK_OIDF: u32 = u32::from_be_bytes(*b"OIDF");
const CHUNK_OIDL: u32 = u32::from_be_bytes(*b"OIDL");
const CHUNK_OOFF: u32 = u32::from_be_bytes(*b"OOFF");
const CHUNK_LOFF: u32 = u32::from_be_bytes(*b"LOFF");

const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

fn oid_version(algorithm: HashAlgorithm) -> u8 {
    match algorithm {
        HashAlgorithm::Sha1 => 1,
        HashAlgorithm::Sha256 => 2,
    }
}

/// Locate a chunk's byte range from the chunk table.
///
/// `chunks` holds table rows in file order; a chunk runs from its offset to
/// the next row's offset, and the trailing digest bounds the last one.
fn chunk_slice<'a>(
    data: &'a [u8],
    chunks: &[(u32, u64)],
    oid_len: usize,
    id: u32,
) -> PackResult<&'a [u8]> {
    let pos = chunks
        .iter()
        .position(|&(cid, _)| cid == id)
        .ok_or_else(|| {
            PackError::MidxCorrupted(format!(
                "missing required chunk {:?}",
                id.to_be_bytes().map(|b| b as char)
            ))
        })?;
    let start = chunks[pos].1 as usize;
    let end = chunks[pos + 1].1 as usize;
    if start > end || end > data.len() - oid_len {
        return Err(PackError::MidxCorrupted("chunk bounds invalid".into()));
    }
    Ok(&data[start..end])
}

/// A parsed multi-pack-index.
#[derive(Debug)]
pub struct Midx {
    algorithm: HashAlgorithm,
    pack_names: Vec<String>,
    fan_out: [u32; 256],
    ids: Vec<ObjectId>,
    entries: Vec<(u32, u64)>,
}

impl Midx {
    /// Read and parse a `multi-pack-index` file.
    pub fn open(path: &Path, algorithm: HashAlgorithm) -> PackResult<Self> {
        let data = std::fs::read(path).map_err(PackError::io("read", path))?;
        Self::from_bytes(&data, algorithm)
    }

    /// Parse from raw bytes, verifying structure and the trailing digest.
    pub fn from_bytes(data: &[u8], algorithm: HashAlgorithm) -> PackResult<Self> {
        let oid_len = algorithm.raw_len();
        if data.len() < MIDX_HEADER_LEN + CHUNK_ROW_LEN + oid_len {
            return Err(PackError::MidxCorrupted("file too short".into()));
        }
        if data[..4] != MIDX_MAGIC {
            return Err(PackError::InvalidMagic {
                file: "multi-pack-index",
                expected: "MIDX",
            });
        }
        if data[4] != MIDX_VERSION {
            return Err(PackError::UnsupportedVersion {
                file: "multi-pack-index",
                version: data[4] as u32,
            });
        }
        if data[5] != oid_version(algorithm) {
            return Err(PackError::MidxCorrupted(format!(
                "oid version {} does not match repository digest",
                data[5]
            )));
        }
        let chunk_count = data[6] as usize;
        // data[7] counts base index layers; none are supported or written.
        if data[7] != 0 {
            return Err(PackError::MidxCorrupted("base midx layers unsupported".into()));
        }
        let pack_count =
            u32::from_be_bytes(data[8..12].try_into().expect("sliced to 4 bytes")) as usize;

        let mut hasher = Hasher::new(algorithm);
        hasher.update(&data[..data.len() - oid_len]);
        if hasher.finalize()?.as_bytes() != &data[data.len() - oid_len..] {
            return Err(PackError::ChecksumMismatch);
        }

        // Chunk table: rows of (id, offset), closed by a null row whose
        // offset marks the end of chunk data.
        let table_end = MIDX_HEADER_LEN + (chunk_count + 1) * CHUNK_ROW_LEN;
        if data.len() < table_end + oid_len {
            return Err(PackError::MidxCorrupted("chunk table truncated".into()));
        }
        let mut chunks = Vec::with_capacity(chunk_count + 1);
        for row in 0..=chunk_count {
            let at = MIDX_HEADER_LEN + row * CHUNK_ROW_LEN;
            let id = u32::from_be_bytes(data[at..at + 4].try_into().expect("sliced to 4 bytes"));
            let offset = u64::from_be_bytes(
                data[at + 4..at + 12].try_into().expect("sliced to 8 bytes"),
            );
            chunks.push((id, offset));
        }
        if chunks[chunk_count].0 != 0 {
            return Err(PackError::MidxCorrupted("chunk table not terminated".into()));
        }

        let chunk = |id: u32| chunk_slice(data, &chunks, oid_len, id);

        let pnam = chunk(CHUNK_PNAM)?;
        let mut pack_names = Vec::with_capacity(pack_count);
        for name in pnam.split(|&b| b == 0) {
            if name.is_empty() {
                continue;
            }
            let name = std::str::from_utf8(name)
                .map_err(|_| PackError::MidxCorrupted("pack name is not UTF-8".into()))?;
            pack_names.push(name.to_string());
        }
        if pack_names.len() != pack_count {
            return Err(PackError::MidxCorrupted(format!(
                "pack name count {} does not match header {pack_count}",
                pack_names.len()
            )));
        }

        let oidf = chunk(CHUNK_OIDF)?;
        if oidf.len() != 256 * 4 {
            return Err(PackError::MidxCorrupted("fan-out chunk malformed".into()));
        }
        let mut fan_out = [0u32; 256];
        for (i, entry) in fan_out.iter_mut().enumerate() {
            *entry = u32::from_be_bytes(
                oidf[i * 4..i * 4 + 4].try_into().expect("sliced to 4 bytes"),
            );
        }
        if fan_out.windows(2).any(|w| w[0] > w[1]) {
            return Err(PackError::MidxCorrupted("fan-out not monotonic".into()));
        }
        let count = fan_out[255] as usize;

        let oidl = chunk(CHUNK_OIDL)?;
        if oidl.len() != count * oid_len {
            return Err(PackError::MidxCorrupted("id list length mismatch".into()));
        }
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let id = ObjectId::from_raw(&oidl[i * oid_len..(i + 1) * oid_len])
                .map_err(|e| PackError::MidxCorrupted(e.to_string()))?;
            ids.push(id);
        }
        if ids.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PackError::MidxCorrupted("id list not sorted".into()));
        }

        let ooff = chunk(CHUNK_OOFF)?;
        if ooff.len() != count * 8 {
            return Err(PackError::MidxCorrupted("offset chunk length mismatch".into()));
        }
        let loff = if chunks.iter().any(|&(id, _)| id == CHUNK_LOFF) {
            chunk(CHUNK_LOFF)?
        } else {
            &[][..]
        };

        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let at = i * 8;
            let pack_id =
                u32::from_be_bytes(ooff[at..at + 4].try_into().expect("sliced to 4 bytes"));
            if pack_id as usize >= pack_count {
                return Err(PackError::MidxCorrupted(format!(
                    "entry references pack {pack_id} of {pack_count}"
                )));
            }
            let raw =
                u32::from_be_bytes(ooff[at + 4..at + 8].try_into().expect("sliced to 4 bytes"));
            let offset = if raw & LARGE_OFFSET_FLAG != 0 {
                let slot = (raw & !LARGE_OFFSET_FLAG) as usize;
                if (slot + 1) * 8 > loff.len() {
                    return Err(PackError::MidxCorrupted(
                        "large offset slot out of range".into(),
                    ));
                }
                u64::from_be_bytes(
                    loff[slot * 8..(slot + 1) * 8]
                        .try_into()
                        .expect("sliced to 8 bytes"),
                )
            } else {
                raw as u64
            };
            entries.push((pack_id, offset));
        }

        Ok(Self {
            algorithm,
            pack_names,
            fan_out,
            ids,
            entries,
        })
    }

    /// Names of the indexed pack files, in pack-id order.
    pub fn pack_names(&self) -> &[String] {
        &self.pack_names
    }

    /// Total objects across all indexed packs.
    pub fn object_count(&self) -> usize {
        self.ids.len()
    }

    /// The digest algorithm of the id table.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The id at sorted position `i`.
    pub fn oid_at(&self, i: usize) -> ObjectId {
        self.ids[i]
    }

    fn bucket_range(&self, first_byte: u8) -> (usize, usize) {
        let end = self.fan_out[first_byte as usize] as usize;
        let start = if first_byte == 0 {
            0
        } else {
            self.fan_out[first_byte as usize - 1] as usize
        };
        (start, end)
    }

    /// Look up an object: which pack holds it, and at what offset.
    pub fn lookup(&self, id: &ObjectId) -> Option<(u32, u64)> {
        let (start, end) = self.bucket_range(id.first_byte());
        match self.ids[start..end].binary_search(id) {
            Ok(pos) => Some(self.entries[start + pos]),
            Err(_) => None,
        }
    }

    /// Check containment by id.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.lookup(id).is_some()
    }

    /// Collect every `(id, pack id, offset)` whose hex form starts with
    /// `prefix`.
    pub fn lookup_prefix(&self, prefix: &str) -> Vec<(ObjectId, u32, u64)> {
        if !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Vec::new();
        }
        let (lo, hi) = match prefix.len() {
            0 => (0u8, 0xffu8),
            1 => {
                let n = u8::from_str_radix(&prefix[..1], 16).unwrap_or(0);
                (n << 4, (n << 4) | 0x0f)
            }
            _ => {
                let b = u8::from_str_radix(&prefix[..2], 16).unwrap_or(0);
                (b, b)
            }
        };
        let start = self.bucket_range(lo).0;
        let end = self.bucket_range(hi).1;
        self.ids[start..end]
            .iter()
            .enumerate()
            .filter(|(_, id)| id.matches_hex_prefix(prefix))
            .map(|(i, id)| {
                let (pack_id, offset) = self.entries[start + i];
                (*id, pack_id, offset)
            })
            .collect()
    }
}

/// Merges per-pack indexes into a multi-pack-index.
///
/// Packs are added in load order; when an id appears in several packs the
/// most recently added pack wins.
pub struct MidxWriter {
    algorithm: HashAlgorithm,
    packs: Vec<(String, Vec<(ObjectId, u64)>)>,
}

impl MidxWriter {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            packs: Vec::new(),
        }
    }

    /// Add a pack's index under its index file name (e.g. `pack-1.idx`).
    pub fn add_pack(&mut self, name: impl Into<String>, index: &PackIndex) {
        let entries = index.entries().map(|(id, _, offset)| (id, offset)).collect();
        self.packs.push((name.into(), entries));
    }

    /// Number of packs added.
    pub fn pack_count(&self) -> usize {
        self.packs.len()
    }

    /// Serialize the merged index.
    pub fn finish_to_bytes(self) -> PackResult<Vec<u8>> {
        let oid_len = self.algorithm.raw_len();

        // Merge, most recent pack winning duplicate ids.
        let mut merged: std::collections::HashMap<ObjectId, (u32, u64)> =
            std::collections::HashMap::new();
        for (pack_id, (_, entries)) in self.packs.iter().enumerate() {
            for &(id, offset) in entries {
                merged.insert(id, (pack_id as u32, offset));
            }
        }
        let mut rows: Vec<(ObjectId, u32, u64)> = merged
            .into_iter()
            .map(|(id, (pack_id, offset))| (id, pack_id, offset))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        let mut pnam = Vec::new();
        for (name, _) in &self.packs {
            pnam.extend_from_slice(name.as_bytes());
            pnam.push(0);
        }
        while pnam.len() % 4 != 0 {
            pnam.push(0);
        }

        let mut fan_out = [0u32; 256];
        for (id, _, _) in &rows {
            fan_out[id.first_byte() as usize] += 1;
        }
        for i in 1..256 {
            fan_out[i] += fan_out[i - 1];
        }

        let mut oidl = Vec::with_capacity(rows.len() * oid_len);
        for (id, _, _) in &rows {
            oidl.extend_from_slice(id.as_bytes());
        }

        let mut ooff = Vec::with_capacity(rows.len() * 8);
        let mut loff = Vec::new();
        for &(_, pack_id, offset) in &rows {
            ooff.extend_from_slice(&pack_id.to_be_bytes());
            if offset < LARGE_OFFSET_FLAG as u64 {
                ooff.extend_from_slice(&(offset as u32).to_be_bytes());
            } else {
                let slot = LARGE_OFFSET_FLAG | (loff.len() / 8) as u32;
                ooff.extend_from_slice(&slot.to_be_bytes());
                loff.extend_from_slice(&offset.to_be_bytes());
            }
        }

        let mut chunks: Vec<(u32, Vec<u8>)> = vec![
            (CHUNK_PNAM, pnam),
            (
                CHUNK_OIDF,
                fan_out.iter().flat_map(|c| c.to_be_bytes()).collect(),
            ),
            (CHUNK_OIDL, oidl),
            (CHUNK_OOFF, ooff),
        ];
        if !loff.is_empty() {
            chunks.push((CHUNK_LOFF, loff));
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(&MIDX_MAGIC);
        buf.push(MIDX_VERSION);
        buf.push(oid_version(self.algorithm));
        buf.push(chunks.len() as u8);
        buf.push(0);
        buf.extend_from_slice(&(self.packs.len() as u32).to_be_bytes());

        let mut offset = (MIDX_HEADER_LEN + (chunks.len() + 1) * CHUNK_ROW_LEN) as u64;
        for (id, body) in &chunks {
            buf.extend_from_slice(&id.to_be_bytes());
            buf.extend_from_slice(&offset.to_be_bytes());
            offset += body.len() as u64;
        }
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&offset.to_be_bytes());

        for (_, body) in &chunks {
            buf.extend_from_slice(body);
        }

        let mut hasher = Hasher::new(self.algorithm);
        hasher.update(&buf);
        let trailer = hasher.finalize()?;
        buf.extend_from_slice(trailer.as_bytes());
        Ok(buf)
    }

    /// Write `multi-pack-index` into a pack directory.
    pub fn write(self, pack_dir: &Path) -> PackResult<std::path::PathBuf> {
        let path = pack_dir.join("multi-pack-index");
        let bytes = self.finish_to_bytes()?;
        std::fs::write(&path, bytes).map_err(PackError::io("write", &path))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_index(seed: u8, n: usize) -> PackIndex {
        let entries: Vec<_> = (0..n)
            .map(|i| {
                let mut digest = [0u8; 20];
                digest[0] = seed.wrapping_add(i as u8);
                digest[1] = seed;
                digest[19] = i as u8;
                (ObjectId::from_sha1(digest), i as u32, 12 + i as u64 * 64)
            })
            .collect();
        PackIndex::build(entries, vec![seed; 20], HashAlgorithm::Sha1)
    }

    #[test]
    fn merge_and_lookup() {
        let idx_a = make_index(0x10, 20);
        let idx_b = make_index(0x80, 20);

        let mut writer = MidxWriter::new(HashAlgorithm::Sha1);
        writer.add_pack("pack-a.idx", &idx_a);
        writer.add_pack("pack-b.idx", &idx_b);
        let bytes = writer.finish_to_bytes().unwrap();
        let midx = Midx::from_bytes(&bytes, HashAlgorithm::Sha1).unwrap();

        assert_eq!(midx.object_count(), 40);
        assert_eq!(midx.pack_names(), &["pack-a.idx", "pack-b.idx"]);

        for (id, _, offset) in idx_a.entries() {
            let (pack_id, found) = midx.lookup(&id).expect("id from pack a");
            assert_eq!(pack_id, 0);
            assert_eq!(found, offset);
        }
        for (id, _, offset) in idx_b.entries() {
            let (pack_id, found) = midx.lookup(&id).expect("id from pack b");
            assert_eq!(pack_id, 1);
            assert_eq!(found, offset);
        }
    }

    #[test]
    fn duplicate_ids_resolve_to_most_recent_pack() {
        let shared = make_index(0x42, 5);

        let mut writer = MidxWriter::new(HashAlgorithm::Sha1);
        writer.add_pack("pack-old.idx", &shared);
        writer.add_pack("pack-new.idx", &shared);
        let bytes = writer.finish_to_bytes().unwrap();
        let midx = Midx::from_bytes(&bytes, HashAlgorithm::Sha1).unwrap();

        assert_eq!(midx.object_count(), 5);
        let (pack_id, _) = midx.lookup(&shared.oid_at(0)).unwrap();
        assert_eq!(pack_id, 1);
    }

    #[test]
    fn missing_id_is_none() {
        let mut writer = MidxWriter::new(HashAlgorithm::Sha1);
        writer.add_pack("pack-x.idx", &make_index(0x01, 8));
        let bytes = writer.finish_to_bytes().unwrap();
        let midx = Midx::from_bytes(&bytes, HashAlgorithm::Sha1).unwrap();

        assert!(midx.lookup(&ObjectId::from_sha1([0xee; 20])).is_none());
    }

    #[test]
    fn large_offsets_spill_and_roundtrip() {
        let big = (LARGE_OFFSET_FLAG as u64) * 2 + 99;
        let id = ObjectId::from_sha1([0x33; 20]);
        let idx = PackIndex::build(
            vec![(id, 7, big)],
            vec![0; 20],
            HashAlgorithm::Sha1,
        );

        let mut writer = MidxWriter::new(HashAlgorithm::Sha1);
        writer.add_pack("pack-big.idx", &idx);
        let bytes = writer.finish_to_bytes().unwrap();
        let midx = Midx::from_bytes(&bytes, HashAlgorithm::Sha1).unwrap();

        assert_eq!(midx.lookup(&id), Some((0, big)));
    }

    #[test]
    fn prefix_lookup_reports_all_candidates() {
        // Two ids sharing a two-nibble prefix across different packs.
        let id_a = ObjectId::from_sha1({
            let mut d = [0u8; 20];
            d[0] = 0xab;
            d[1] = 0x01;
            d
        });
        let id_b = ObjectId::from_sha1({
            let mut d = [0u8; 20];
            d[0] = 0xab;
            d[1] = 0x02;
            d
        });
        let idx_a = PackIndex::build(vec![(id_a, 0, 12)], vec![0; 20], HashAlgorithm::Sha1);
        let idx_b = PackIndex::build(vec![(id_b, 0, 12)], vec![1; 20], HashAlgorithm::Sha1);

        let mut writer = MidxWriter::new(HashAlgorithm::Sha1);
        writer.add_pack("pack-a.idx", &idx_a);
        writer.add_pack("pack-b.idx", &idx_b);
        let midx =
            Midx::from_bytes(&writer.finish_to_bytes().unwrap(), HashAlgorithm::Sha1).unwrap();

        let matches = midx.lookup_prefix("ab");
        assert_eq!(matches.len(), 2);
        let matches = midx.lookup_prefix("ab01");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].0, id_a);
    }

    #[test]
    fn corrupted_trailer_is_rejected() {
        let mut writer = MidxWriter::new(HashAlgorithm::Sha1);
        writer.add_pack("pack-t.idx", &make_index(0x09, 4));
        let mut bytes = writer.finish_to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x80;

        assert!(matches!(
            Midx::from_bytes(&bytes, HashAlgorithm::Sha1),
            Err(PackError::ChecksumMismatch)
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = Midx::from_bytes(&vec![0u8; 256], HashAlgorithm::Sha1).unwrap_err();
        assert!(matches!(err, PackError::InvalidMagic { .. }));
    }

    #[test]
    fn wrong_oid_version_is_rejected() {
        let mut writer = MidxWriter::new(HashAlgorithm::Sha1);
        writer.add_pack("pack-v.idx", &make_index(0x05, 2));
        let bytes = writer.finish_to_bytes().unwrap();

        assert!(Midx::from_bytes(&bytes, HashAlgorithm::Sha256).is_err());
    }

    #[test]
    fn empty_midx_roundtrips() {
        let writer = MidxWriter::new(HashAlgorithm::Sha1);
        let bytes = writer.finish_to_bytes().unwrap();
        let midx = Midx::from_bytes(&bytes, HashAlgorithm::Sha1).unwrap();
        assert_eq!(midx.object_count(), 0);
        assert!(midx.pack_names().is_empty());
    }

    #[test]
    fn disk_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MidxWriter::new(HashAlgorithm::Sha1);
        writer.add_pack("pack-d.idx", &make_index(0x21, 6));
        let path = writer.write(dir.path()).unwrap();

        let midx = Midx::open(&path, HashAlgorithm::Sha1).unwrap();
        assert_eq!(midx.object_count(), 6);
    }
}
