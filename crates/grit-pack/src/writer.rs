//! Pack and index writer.
//!
//! Builds a pack from queued raw objects, optionally delta-compressing an
//! object against an earlier queued one (emitted as an offset delta) or an
//! external base (emitted as a reference delta, for thin transfer packs).
//! The chain depth bound is enforced here, at build time; readers tolerate
//! whatever depth is on disk up to their own sanity ceiling.

use std::path::{Path, PathBuf};

use grit_hash::{HashAlgorithm, Hasher};
use grit_store::RawObject;
use grit_types::ObjectId;

use crate::entry::{write_entry_header, write_ofs_distance, OFS_DELTA, REF_DELTA};
use crate::error::{PackError, PackResult};
use crate::file::DEFAULT_MAX_DELTA_DEPTH;
use crate::idx::PackIndex;
use crate::inflate::deflate;

/// Result of writing a pack to disk.
#[derive(Clone, Debug)]
pub struct WrittenPack {
    pub pack_path: PathBuf,
    pub index_path: PathBuf,
    pub object_count: usize,
    pub checksum: Vec<u8>,
}

enum Payload {
    Full,
    OfsDelta { base_index: usize, delta: Vec<u8> },
    RefDelta { base: ObjectId, delta: Vec<u8> },
}

struct QueuedEntry {
    id: ObjectId,
    object: RawObject,
    payload: Payload,
    depth: usize,
}

/// Builds a pack file and its index from a collection of objects.
pub struct PackWriter {
    path: PathBuf,
    algorithm: HashAlgorithm,
    max_delta_depth: usize,
    try_deltas: bool,
    entries: Vec<QueuedEntry>,
}

impl PackWriter {
    /// Create a writer targeting `path` (extensions are added on finish).
    pub fn new(path: &Path, algorithm: HashAlgorithm) -> Self {
        Self {
            path: path.to_path_buf(),
            algorithm,
            max_delta_depth: DEFAULT_MAX_DELTA_DEPTH,
            try_deltas: true,
            entries: Vec::new(),
        }
    }

    /// Bound delta chains produced by this writer.
    pub fn with_max_delta_depth(mut self, depth: usize) -> Self {
        self.max_delta_depth = depth;
        self
    }

    /// Disable delta compression; every entry is stored full.
    pub fn without_deltas(mut self) -> Self {
        self.try_deltas = false;
        self
    }

    /// Queue an object, delta-compressing it against the previously queued
    /// object of the same kind when that produces a smaller entry.
    pub fn add_object(&mut self, object: &RawObject) -> ObjectId {
        let id = object.compute_id(self.algorithm);
        if self.entries.iter().any(|e| e.id == id) {
            return id;
        }

        let payload = if self.try_deltas {
            self.pick_delta(object)
        } else {
            None
        };
        let (payload, depth) = match payload {
            Some((base_index, delta)) => {
                let depth = self.entries[base_index].depth + 1;
                (Payload::OfsDelta { base_index, delta }, depth)
            }
            None => (Payload::Full, 0),
        };

        self.entries.push(QueuedEntry {
            id,
            object: object.clone(),
            payload,
            depth,
        });
        id
    }

    /// Queue an object as a reference delta against a base that is not in
    /// this pack (a thin-pack entry). `base_data` is the base's content.
    pub fn add_ref_delta(
        &mut self,
        base: ObjectId,
        base_data: &[u8],
        object: &RawObject,
    ) -> ObjectId {
        let id = object.compute_id(self.algorithm);
        if self.entries.iter().any(|e| e.id == id) {
            return id;
        }
        let delta = crate::delta::encode(base_data, &object.data);
        self.entries.push(QueuedEntry {
            id,
            object: object.clone(),
            payload: Payload::RefDelta { base, delta },
            depth: 1,
        });
        id
    }

    /// Number of queued objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn pick_delta(&self, object: &RawObject) -> Option<(usize, Vec<u8>)> {
        let (base_index, base) = self
            .entries
            .iter()
            .enumerate()
            .rev()
            .find(|(_, e)| e.object.kind == object.kind)?;
        if base.depth + 1 > self.max_delta_depth {
            return None;
        }

        let delta = crate::delta::encode(&base.object.data, &object.data);
        // The delta must pay for itself against storing the object full.
        if delta.len() + 32 < object.data.len() {
            Some((base_index, delta))
        } else {
            None
        }
    }

    /// Build the pack and index in memory.
    pub fn finish_to_bytes(self) -> PackResult<(Vec<u8>, PackIndex)> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"PACK");
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());

        let mut offsets = Vec::with_capacity(self.entries.len());
        let mut index_entries = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let offset = buf.len() as u64;
            offsets.push(offset);

            match &entry.payload {
                Payload::Full => {
                    write_entry_header(
                        &mut buf,
                        entry.object.kind.pack_code(),
                        entry.object.size(),
                    );
                    buf.extend_from_slice(&deflate(&entry.object.data)?);
                }
                Payload::OfsDelta { base_index, delta } => {
                    write_entry_header(&mut buf, OFS_DELTA, delta.len() as u64);
                    write_ofs_distance(&mut buf, offset - offsets[*base_index]);
                    buf.extend_from_slice(&deflate(delta)?);
                }
                Payload::RefDelta { base, delta } => {
                    write_entry_header(&mut buf, REF_DELTA, delta.len() as u64);
                    buf.extend_from_slice(base.as_bytes());
                    buf.extend_from_slice(&deflate(delta)?);
                }
            }

            let crc = crc32fast::hash(&buf[offset as usize..]);
            index_entries.push((entry.id, crc, offset));
        }

        let mut hasher = Hasher::new(self.algorithm);
        hasher.update(&buf);
        let checksum = hasher.finalize()?;
        buf.extend_from_slice(checksum.as_bytes());

        let index = PackIndex::build(
            index_entries,
            checksum.as_bytes().to_vec(),
            self.algorithm,
        );
        Ok((buf, index))
    }

    /// Write the pack and index files to disk.
    pub fn finish(self) -> PackResult<WrittenPack> {
        let pack_path = self.path.with_extension("pack");
        let index_path = self.path.with_extension("idx");
        let object_count = self.entries.len();

        let (pack_data, index) = self.finish_to_bytes()?;
        let checksum = index.pack_checksum().to_vec();

        std::fs::write(&pack_path, &pack_data).map_err(PackError::io("write", &pack_path))?;
        std::fs::write(&index_path, index.to_bytes()?)
            .map_err(PackError::io("write", &index_path))?;

        Ok(WrittenPack {
            pack_path,
            index_path,
            object_count,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{NoExternalBases, PackFile};
    use grit_types::ObjectKind;

    fn blob(content: &[u8]) -> RawObject {
        RawObject::new(ObjectKind::Blob, content.to_vec())
    }

    fn write_and_open(objects: &[RawObject]) -> (tempfile::TempDir, PackFile, Vec<ObjectId>) {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PackWriter::new(&dir.path().join("test"), HashAlgorithm::Sha1);
        let ids: Vec<_> = objects.iter().map(|o| writer.add_object(o)).collect();
        let written = writer.finish().unwrap();
        let pack = PackFile::open(&written.pack_path, HashAlgorithm::Sha1).unwrap();
        (dir, pack, ids)
    }

    #[test]
    fn roundtrip_single_object() {
        let obj = blob(b"hello pack");
        let (_dir, pack, ids) = write_and_open(std::slice::from_ref(&obj));

        assert_eq!(pack.object_count(), 1);
        let read = pack.read(&ids[0], &NoExternalBases).unwrap().unwrap();
        assert_eq!(read, obj);
    }

    #[test]
    fn roundtrip_many_kinds() {
        let objects = vec![
            RawObject::new(ObjectKind::Commit, b"tree 123\n".to_vec()),
            RawObject::new(ObjectKind::Tree, b"100644 blob x".to_vec()),
            blob(b"content"),
            RawObject::new(ObjectKind::Tag, b"object 456\n".to_vec()),
        ];
        let (_dir, pack, ids) = write_and_open(&objects);

        for (obj, id) in objects.iter().zip(&ids) {
            let read = pack.read(id, &NoExternalBases).unwrap().unwrap();
            assert_eq!(&read, obj);
        }
    }

    #[test]
    fn similar_blobs_become_deltas_and_roundtrip() {
        let base: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let mut objects = vec![RawObject::new(ObjectKind::Blob, base.clone())];
        for i in 0..10u8 {
            let mut edited = base.clone();
            edited[17] = i;
            edited.extend_from_slice(&[i; 3]);
            objects.push(RawObject::new(ObjectKind::Blob, edited));
        }

        let (_dir, pack, ids) = write_and_open(&objects);
        for (obj, id) in objects.iter().zip(&ids) {
            let read = pack.read(id, &NoExternalBases).unwrap().unwrap();
            assert_eq!(&read, obj);
        }
    }

    #[test]
    fn delta_chains_respect_configured_depth() {
        let base: Vec<u8> = vec![9u8; 2048];
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PackWriter::new(&dir.path().join("deep"), HashAlgorithm::Sha1)
            .with_max_delta_depth(3);
        for i in 0..20u8 {
            let mut edited = base.clone();
            edited[0] = i;
            writer.add_object(&RawObject::new(ObjectKind::Blob, edited));
        }
        assert!(writer.entries.iter().all(|e| e.depth <= 3));
        writer.finish().unwrap();
    }

    #[test]
    fn duplicate_objects_are_queued_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PackWriter::new(&dir.path().join("dup"), HashAlgorithm::Sha1);
        let obj = blob(b"only once");
        let id1 = writer.add_object(&obj);
        let id2 = writer.add_object(&obj);
        assert_eq!(id1, id2);
        assert_eq!(writer.len(), 1);
    }

    #[test]
    fn empty_pack_roundtrips() {
        let (_dir, pack, _) = write_and_open(&[]);
        assert_eq!(pack.object_count(), 0);
        assert!(pack
            .read(&ObjectId::null_sha1(), &NoExternalBases)
            .unwrap()
            .is_none());
    }

    #[test]
    fn lookup_returns_exact_recorded_offsets() {
        let objects: Vec<_> = (0..50)
            .map(|i| blob(format!("unique object number {i}").as_bytes()))
            .collect();
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            PackWriter::new(&dir.path().join("offsets"), HashAlgorithm::Sha1).without_deltas();
        let ids: Vec<_> = objects.iter().map(|o| writer.add_object(o)).collect();
        let (bytes, index) = writer.finish_to_bytes().unwrap();

        for id in &ids {
            let (offset, _) = index.lookup(id).expect("id present");
            // Every recorded offset must land on a parsable entry header.
            let header =
                crate::entry::parse_entry_header(&bytes, offset, 20).expect("valid entry");
            assert!(header.data_start > offset);
        }
        let absent = ObjectId::from_sha1([0x77; 20]);
        assert!(index.lookup(&absent).is_none());
    }

    #[test]
    fn checksum_trailer_verifies() {
        let (_dir, pack, _) = write_and_open(&[blob(b"verify me")]);
        pack.verify_checksum().unwrap();
    }

    #[test]
    fn corrupted_pack_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PackWriter::new(&dir.path().join("mangle"), HashAlgorithm::Sha1);
        writer.add_object(&blob(b"about to be mangled"));
        let written = writer.finish().unwrap();

        let mut bytes = std::fs::read(&written.pack_path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        std::fs::write(&written.pack_path, &bytes).unwrap();

        let pack = PackFile::open(&written.pack_path, HashAlgorithm::Sha1).unwrap();
        assert!(pack.verify_checksum().is_err());
    }
}
