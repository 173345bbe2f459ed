//! Pack index (`.idx` version 2).
//!
//! Layout: magic `\xff t O c`, version, 256-bucket fan-out of cumulative
//! counts, the sorted id table, a parallel CRC32 table over raw entry bytes,
//! 31-bit offsets with an escape into a 64-bit table for huge packs, then
//! the pack checksum and the index's own trailing checksum.
//!
//! Built once when a pack is written and read-only afterwards; a rebuild
//! regenerates the file wholesale, never patches it.

use std::path::Path;

use grit_hash::{HashAlgorithm, Hasher};
use grit_types::ObjectId;

use crate::error::{PackError, PackResult};

const IDX_MAGIC: [u8; 4] = [0xff, 0x74, 0x4f, 0x63];
const IDX_VERSION: u32 = 2;

/// Offsets at or above this bit go through the large-offset table.
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// Sorted table mapping object ids to pack byte offsets.
#[derive(Clone, Debug)]
pub struct PackIndex {
    fan_out: [u32; 256],
    ids: Vec<ObjectId>,
    crc32s: Vec<u32>,
    offsets: Vec<u64>,
    pack_checksum: Vec<u8>,
    algorithm: HashAlgorithm,
}

impl PackIndex {
    /// Build an index from `(id, crc32, offset)` entries and the pack's
    /// trailing checksum.
    pub fn build(
        mut entries: Vec<(ObjectId, u32, u64)>,
        pack_checksum: Vec<u8>,
        algorithm: HashAlgorithm,
    ) -> Self {
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut fan_out = [0u32; 256];
        let mut ids = Vec::with_capacity(entries.len());
        let mut crc32s = Vec::with_capacity(entries.len());
        let mut offsets = Vec::with_capacity(entries.len());

        for (id, crc, offset) in &entries {
            fan_out[id.first_byte() as usize] += 1;
            ids.push(*id);
            crc32s.push(*crc);
            offsets.push(*offset);
        }
        // Make the counts cumulative.
        for i in 1..256 {
            fan_out[i] += fan_out[i - 1];
        }

        Self {
            fan_out,
            ids,
            crc32s,
            offsets,
            pack_checksum,
            algorithm,
        }
    }

    /// Total object count.
    pub fn object_count(&self) -> usize {
        self.ids.len()
    }

    /// The checksum of the pack this index describes.
    pub fn pack_checksum(&self) -> &[u8] {
        &self.pack_checksum
    }

    /// The digest algorithm of the id table.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The id at sorted position `i`.
    pub fn oid_at(&self, i: usize) -> ObjectId {
        self.ids[i]
    }

    /// The pack offset at sorted position `i`.
    pub fn offset_at(&self, i: usize) -> u64 {
        self.offsets[i]
    }

    /// Iterate `(id, crc32, offset)` in id order.
    pub fn entries(&self) -> impl Iterator<Item = (ObjectId, u32, u64)> + '_ {
        (0..self.ids.len()).map(|i| (self.ids[i], self.crc32s[i], self.offsets[i]))
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

    /// Look up an object's `(offset, crc32)` by id.
    ///
    /// Fan-out bucket first, then binary search within it -- bounded by ~20
    /// comparisons even for multi-million-object packs.
    pub fn lookup(&self, id: &ObjectId) -> Option<(u64, u32)> {
        let (start, end) = self.bucket_range(id.first_byte());
        let bucket = &self.ids[start..end];
        match bucket.binary_search(id) {
            Ok(pos) => {
                let i = start + pos;
                Some((self.offsets[i], self.crc32s[i]))
            }
            Err(_) => None,
        }
    }

    /// Check if an object exists.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.lookup(id).is_some()
    }

    /// Collect every `(id, offset)` whose hex form starts with `prefix`.
    pub fn lookup_prefix(&self, prefix: &str) -> Vec<(ObjectId, u64)> {
        if !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Vec::new();
        }
        // Narrow to the fan-out buckets the first two nibbles allow.
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
            .map(|(i, id)| (*id, self.offsets[start + i]))
            .collect()
    }

    /// Serialize to the on-disk index format.
    pub fn to_bytes(&self) -> PackResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&IDX_MAGIC);
        buf.extend_from_slice(&IDX_VERSION.to_be_bytes());
        for &count in &self.fan_out {
            buf.extend_from_slice(&count.to_be_bytes());
        }
        for id in &self.ids {
            buf.extend_from_slice(id.as_bytes());
        }
        for &crc in &self.crc32s {
            buf.extend_from_slice(&crc.to_be_bytes());
        }

        let mut large = Vec::new();
        for &offset in &self.offsets {
            if offset < LARGE_OFFSET_FLAG as u64 {
                buf.extend_from_slice(&(offset as u32).to_be_bytes());
            } else {
                let slot = LARGE_OFFSET_FLAG | large.len() as u32;
                buf.extend_from_slice(&slot.to_be_bytes());
                large.push(offset);
            }
        }
        for offset in large {
            buf.extend_from_slice(&offset.to_be_bytes());
        }

        buf.extend_from_slice(&self.pack_checksum);

        let mut hasher = Hasher::new(self.algorithm);
        hasher.update(&buf);
        let trailer = hasher.finalize()?;
        buf.extend_from_slice(trailer.as_bytes());
        Ok(buf)
    }

    /// Parse the on-disk index format.
    ///
    /// The trailing checksum is verified; a mismatch is corruption, never
    /// ignored.
    pub fn from_bytes(data: &[u8], algorithm: HashAlgorithm) -> PackResult<Self> {
        let oid_len = algorithm.raw_len();
        if data.len() < 8 + 256 * 4 + 2 * oid_len {
            return Err(PackError::IndexCorrupted("file too short".into()));
        }
        if data[..4] != IDX_MAGIC {
            return Err(PackError::InvalidMagic {
                file: "pack index",
                expected: "\\xfftOc",
            });
        }
        let version = u32::from_be_bytes(data[4..8].try_into().expect("sliced to 4 bytes"));
        if version != IDX_VERSION {
            return Err(PackError::UnsupportedVersion {
                file: "pack index",
                version,
            });
        }

        let mut hasher = Hasher::new(algorithm);
        hasher.update(&data[..data.len() - oid_len]);
        let computed = hasher.finalize()?;
        if computed.as_bytes() != &data[data.len() - oid_len..] {
            return Err(PackError::ChecksumMismatch);
        }

        let mut pos = 8;
        let mut fan_out = [0u32; 256];
        for entry in &mut fan_out {
            *entry = u32::from_be_bytes(data[pos..pos + 4].try_into().expect("sliced to 4 bytes"));
            pos += 4;
        }
        if fan_out.windows(2).any(|w| w[0] > w[1]) {
            return Err(PackError::IndexCorrupted("fan-out not monotonic".into()));
        }

        let count = fan_out[255] as usize;
        let fixed = count * oid_len + count * 4 + count * 4 + 2 * oid_len;
        if data.len() < pos + fixed {
            return Err(PackError::IndexCorrupted("tables truncated".into()));
        }

        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = ObjectId::from_raw(&data[pos..pos + oid_len])
                .map_err(|e| PackError::IndexCorrupted(e.to_string()))?;
            ids.push(id);
            pos += oid_len;
        }
        if ids.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PackError::IndexCorrupted("id table not sorted".into()));
        }

        let mut crc32s = Vec::with_capacity(count);
        for _ in 0..count {
            crc32s.push(u32::from_be_bytes(
                data[pos..pos + 4].try_into().expect("sliced to 4 bytes"),
            ));
            pos += 4;
        }

        let mut raw_offsets = Vec::with_capacity(count);
        for _ in 0..count {
            raw_offsets.push(u32::from_be_bytes(
                data[pos..pos + 4].try_into().expect("sliced to 4 bytes"),
            ));
            pos += 4;
        }

        let large_count = raw_offsets
            .iter()
            .filter(|&&o| o & LARGE_OFFSET_FLAG != 0)
            .count();
        let large_end = pos + large_count * 8;
        if data.len() < large_end + 2 * oid_len {
            return Err(PackError::IndexCorrupted(
                "large offset table truncated".into(),
            ));
        }
        let mut large = Vec::with_capacity(large_count);
        for _ in 0..large_count {
            large.push(u64::from_be_bytes(
                data[pos..pos + 8].try_into().expect("sliced to 8 bytes"),
            ));
            pos += 8;
        }

        let mut offsets = Vec::with_capacity(count);
        for raw in raw_offsets {
            if raw & LARGE_OFFSET_FLAG != 0 {
                let slot = (raw & !LARGE_OFFSET_FLAG) as usize;
                let offset = *large.get(slot).ok_or_else(|| {
                    PackError::IndexCorrupted("large offset slot out of range".into())
                })?;
                offsets.push(offset);
            } else {
                offsets.push(raw as u64);
            }
        }

        let pack_checksum = data[pos..pos + oid_len].to_vec();

        Ok(Self {
            fan_out,
            ids,
            crc32s,
            offsets,
            pack_checksum,
            algorithm,
        })
    }

    /// Read and parse an index file.
    pub fn open(path: &Path, algorithm: HashAlgorithm) -> PackResult<Self> {
        let data = std::fs::read(path).map_err(PackError::io("read", path))?;
        Self::from_bytes(&data, algorithm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ids(n: usize) -> Vec<ObjectId> {
        (0..n)
            .map(|i| {
                let mut digest = [0u8; 20];
                digest[0] = (i % 256) as u8;
                digest[1] = (i / 256) as u8;
                digest[19] = 0x99;
                ObjectId::from_sha1(digest)
            })
            .collect()
    }

    fn checksum() -> Vec<u8> {
        vec![0xcd; 20]
    }

    #[test]
    fn build_empty() {
        let idx = PackIndex::build(vec![], checksum(), HashAlgorithm::Sha1);
        assert_eq!(idx.object_count(), 0);
        assert!(idx.fan_out.iter().all(|&c| c == 0));
    }

    #[test]
    fn lookup_every_inserted_id() {
        let ids = make_ids(300);
        let entries: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i as u32, 12 + (i as u64) * 40))
            .collect();
        let idx = PackIndex::build(entries, checksum(), HashAlgorithm::Sha1);

        for (i, id) in ids.iter().enumerate() {
            let (offset, crc) = idx.lookup(id).expect("inserted id must resolve");
            assert_eq!(offset, 12 + (i as u64) * 40);
            assert_eq!(crc, i as u32);
        }
    }

    #[test]
    fn lookup_missing_is_none() {
        let ids = make_ids(50);
        let entries: Vec<_> = ids.iter().map(|id| (*id, 0, 0)).collect();
        let idx = PackIndex::build(entries, checksum(), HashAlgorithm::Sha1);

        let mut missing = [0u8; 20];
        missing[0] = 0x03;
        missing[19] = 0x42;
        assert!(idx.lookup(&ObjectId::from_sha1(missing)).is_none());
    }

    #[test]
    fn serialization_roundtrip() {
        let ids = make_ids(40);
        let entries: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, (i * 7) as u32, (i * 50) as u64))
            .collect();
        let idx = PackIndex::build(entries, checksum(), HashAlgorithm::Sha1);

        let bytes = idx.to_bytes().unwrap();
        let idx2 = PackIndex::from_bytes(&bytes, HashAlgorithm::Sha1).unwrap();

        assert_eq!(idx2.object_count(), idx.object_count());
        assert_eq!(idx2.pack_checksum(), idx.pack_checksum());
        for id in &ids {
            assert_eq!(idx.lookup(id), idx2.lookup(id));
        }
    }

    #[test]
    fn large_offsets_roundtrip() {
        let ids = make_ids(3);
        let entries = vec![
            (ids[0], 1, 12),
            (ids[1], 2, (LARGE_OFFSET_FLAG as u64) + 17),
            (ids[2], 3, u64::MAX / 2),
        ];
        let idx = PackIndex::build(entries, checksum(), HashAlgorithm::Sha1);
        let bytes = idx.to_bytes().unwrap();
        let idx2 = PackIndex::from_bytes(&bytes, HashAlgorithm::Sha1).unwrap();

        assert_eq!(idx2.lookup(&ids[1]).unwrap().0, (LARGE_OFFSET_FLAG as u64) + 17);
        assert_eq!(idx2.lookup(&ids[2]).unwrap().0, u64::MAX / 2);
    }

    #[test]
    fn corrupted_trailer_is_rejected() {
        let ids = make_ids(5);
        let entries: Vec<_> = ids.iter().map(|id| (*id, 0, 12)).collect();
        let idx = PackIndex::build(entries, checksum(), HashAlgorithm::Sha1);
        let mut bytes = idx.to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        assert!(matches!(
            PackIndex::from_bytes(&bytes, HashAlgorithm::Sha1),
            Err(PackError::ChecksumMismatch)
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = PackIndex::from_bytes(&vec![0u8; 2048], HashAlgorithm::Sha1).unwrap_err();
        assert!(matches!(err, PackError::InvalidMagic { .. }));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let err = PackIndex::from_bytes(&IDX_MAGIC, HashAlgorithm::Sha1).unwrap_err();
        assert!(matches!(err, PackError::IndexCorrupted(_)));
    }

    #[test]
    fn prefix_lookup_narrows_and_matches() {
        let ids = make_ids(600);
        let entries: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, 0, i as u64))
            .collect();
        let idx = PackIndex::build(entries, checksum(), HashAlgorithm::Sha1);

        // ids with first byte 0x05 exist at i = 5 and i = 261 (5 + 256).
        let matches = idx.lookup_prefix("05");
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|(id, _)| id.first_byte() == 0x05));

        let full = ids[5].to_hex();
        let exact = idx.lookup_prefix(&full);
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].0, ids[5]);
    }

    #[test]
    fn prefix_lookup_single_nibble() {
        let ids = make_ids(32);
        let entries: Vec<_> = ids.iter().map(|id| (*id, 0, 1)).collect();
        let idx = PackIndex::build(entries, checksum(), HashAlgorithm::Sha1);

        let matches = idx.lookup_prefix("0");
        assert_eq!(matches.len(), 16);
    }

    #[test]
    fn disk_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.idx");
        let ids = make_ids(10);
        let entries: Vec<_> = ids.iter().map(|id| (*id, 9, 99)).collect();
        let idx = PackIndex::build(entries, checksum(), HashAlgorithm::Sha1);
        std::fs::write(&path, idx.to_bytes().unwrap()).unwrap();

        let loaded = PackIndex::open(&path, HashAlgorithm::Sha1).unwrap();
        assert_eq!(loaded.object_count(), 10);
        assert!(loaded.contains(&ids[3]));
    }
}
