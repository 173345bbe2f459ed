//! Single pack file reader.
//!
//! A pack is a 12-byte header (`"PACK"`, version, entry count), back-to-back
//! entries, and a trailing whole-file digest. Entries are located through
//! the companion index and may be deltas; resolution walks the chain with an
//! explicit loop, a visited-offset set for cycle detection, and a depth
//! budget as a denial-of-service guard -- never recursion.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use memmap2::Mmap;

use grit_hash::{HashAlgorithm, Hasher};
use grit_store::RawObject;
use grit_types::{ObjectId, ObjectKind};

use crate::cache::{BaseCache, DEFAULT_BASE_CACHE_BYTES};
use crate::entry::{parse_entry_header, EntryHeader, PackEntryKind};
use crate::error::{PackError, PackResult};
use crate::idx::PackIndex;
use crate::inflate::{inflate_exact, inflate_prefix};

pub(crate) const PACK_MAGIC: [u8; 4] = *b"PACK";
pub(crate) const PACK_HEADER_LEN: usize = 12;

/// Default bound on delta-chain resolution depth.
pub const DEFAULT_MAX_DELTA_DEPTH: usize = 64;

/// Resolves ref-delta bases that live outside the pack being read.
///
/// `depth_budget` is the remaining chain allowance; implementations that
/// read other packs must pass it through so a chain hopping across packs
/// still terminates.
pub trait BaseResolver: Sync {
    fn read_base(&self, id: &ObjectId, depth_budget: usize) -> PackResult<Option<RawObject>>;
}

/// Resolver for self-contained packs: every external base is absent.
pub struct NoExternalBases;

impl BaseResolver for NoExternalBases {
    fn read_base(&self, _id: &ObjectId, _depth_budget: usize) -> PackResult<Option<RawObject>> {
        Ok(None)
    }
}

/// One open pack: mapped data plus its resident index.
pub struct PackFile {
    path: PathBuf,
    data: Mmap,
    index: Arc<PackIndex>,
    algorithm: HashAlgorithm,
    max_delta_depth: usize,
    entry_count: u32,
    base_cache: Mutex<BaseCache>,
}

impl PackFile {
    /// Open a pack, loading its `.idx` companion from the sibling path.
    pub fn open(path: &Path, algorithm: HashAlgorithm) -> PackResult<Self> {
        let index = PackIndex::open(&path.with_extension("idx"), algorithm)?;
        Self::with_index(path, Arc::new(index), algorithm, DEFAULT_MAX_DELTA_DEPTH)
    }

    /// Open a pack against an already-loaded index.
    pub fn with_index(
        path: &Path,
        index: Arc<PackIndex>,
        algorithm: HashAlgorithm,
        max_delta_depth: usize,
    ) -> PackResult<Self> {
        let file = std::fs::File::open(path).map_err(PackError::io("open", path))?;
        // Safety: packs are written once and never mutated in place; a
        // rebuild replaces the file wholesale via rename.
        let data = unsafe { Mmap::map(&file) }.map_err(PackError::io("mmap", path))?;

        let oid_len = algorithm.raw_len();
        if data.len() < PACK_HEADER_LEN + oid_len {
            return Err(PackError::corrupt(0, "pack data too short"));
        }
        if data[..4] != PACK_MAGIC {
            return Err(PackError::InvalidMagic {
                file: "pack",
                expected: "PACK",
            });
        }
        let version = u32::from_be_bytes(data[4..8].try_into().expect("sliced to 4 bytes"));
        if version != 2 && version != 3 {
            return Err(PackError::UnsupportedVersion {
                file: "pack",
                version,
            });
        }
        let entry_count =
            u32::from_be_bytes(data[8..12].try_into().expect("sliced to 4 bytes"));

        let trailer = &data[data.len() - oid_len..];
        if trailer != index.pack_checksum() {
            return Err(PackError::IndexCorrupted(
                "index checksum does not match pack trailer".into(),
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            data,
            index,
            algorithm,
            max_delta_depth,
            entry_count,
            base_cache: Mutex::new(BaseCache::new(DEFAULT_BASE_CACHE_BYTES)),
        })
    }

    /// The pack's path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The companion index.
    pub fn index(&self) -> &Arc<PackIndex> {
        &self.index
    }

    /// Entry count from the pack header.
    pub fn object_count(&self) -> usize {
        self.entry_count as usize
    }

    /// Check containment by id.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains(id)
    }

    /// Recompute the trailing whole-file digest and compare.
    pub fn verify_checksum(&self) -> PackResult<()> {
        let oid_len = self.algorithm.raw_len();
        let mut hasher = Hasher::new(self.algorithm);
        hasher.update(&self.data[..self.data.len() - oid_len]);
        let computed = hasher.finalize()?;
        if computed.as_bytes() != &self.data[self.data.len() - oid_len..] {
            return Err(PackError::ChecksumMismatch);
        }
        Ok(())
    }

    /// Read an object by id, resolving delta chains as needed.
    pub fn read(&self, id: &ObjectId, resolver: &dyn BaseResolver) -> PackResult<Option<RawObject>> {
        self.read_with_budget(id, resolver, self.max_delta_depth)
    }

    /// Read an object by id with an explicit chain budget. The entry's CRC
    /// from the index is verified along the way.
    pub fn read_with_budget(
        &self,
        id: &ObjectId,
        resolver: &dyn BaseResolver,
        depth_budget: usize,
    ) -> PackResult<Option<RawObject>> {
        let Some((offset, crc)) = self.index.lookup(id) else {
            return Ok(None);
        };
        let object = self.read_at(offset, Some((*id, crc)), resolver, depth_budget)?;
        Ok(Some(object))
    }

    /// Read the entry at a known offset with the default depth budget.
    pub fn read_offset(
        &self,
        offset: u64,
        resolver: &dyn BaseResolver,
    ) -> PackResult<RawObject> {
        self.read_at(offset, None, resolver, self.max_delta_depth)
    }

    /// Read an object's kind and inflated size without materializing it.
    ///
    /// For delta entries the size comes from the outermost delta's declared
    /// result size, and the kind from walking headers to the chain's base.
    pub fn read_header(
        &self,
        id: &ObjectId,
        resolver: &dyn BaseResolver,
    ) -> PackResult<Option<(ObjectKind, u64)>> {
        let Some((offset, _)) = self.index.lookup(id) else {
            return Ok(None);
        };

        let mut visited = HashSet::new();
        let mut cur = offset;
        let mut outer_size: Option<u64> = None;
        for _ in 0..=self.max_delta_depth {
            if !visited.insert(cur) {
                return Err(PackError::CyclicDelta { offset: cur });
            }
            let header = self.entry_header(cur)?;
            match header.kind {
                PackEntryKind::Full(kind) => {
                    return Ok(Some((kind, outer_size.unwrap_or(header.size))));
                }
                PackEntryKind::OfsDelta { base_offset } => {
                    if outer_size.is_none() {
                        outer_size = Some(self.delta_result_size(&header)?);
                    }
                    cur = base_offset;
                }
                PackEntryKind::RefDelta { base } => {
                    if outer_size.is_none() {
                        outer_size = Some(self.delta_result_size(&header)?);
                    }
                    match self.index.lookup(&base) {
                        Some((base_offset, _)) => cur = base_offset,
                        None => {
                            let resolved = resolver
                                .read_base(&base, self.max_delta_depth)?
                                .ok_or(PackError::DeltaBaseNotFound(base))?;
                            return Ok(Some((
                                resolved.kind,
                                outer_size.unwrap_or(header.size),
                            )));
                        }
                    }
                }
            }
        }
        Err(PackError::DeltaChainTooDeep {
            max: self.max_delta_depth,
        })
    }

    fn payload(&self, header: &EntryHeader) -> &[u8] {
        let oid_len = self.algorithm.raw_len();
        let end = self.data.len() - oid_len;
        // A header running into the trailer leaves an empty payload, which
        // the inflater rejects as truncated.
        let start = (header.data_start as usize).min(end);
        &self.data[start..end]
    }

    fn entry_header(&self, offset: u64) -> PackResult<EntryHeader> {
        let oid_len = self.algorithm.raw_len();
        if (offset as usize) < PACK_HEADER_LEN
            || offset as usize >= self.data.len() - oid_len
        {
            return Err(PackError::corrupt(offset, "entry offset out of range"));
        }
        parse_entry_header(&self.data, offset, oid_len)
    }

    /// Declared result size of a delta entry, read from the head of its
    /// payload without inflating the rest.
    fn delta_result_size(&self, header: &EntryHeader) -> PackResult<u64> {
        let head = inflate_prefix(self.payload(header), 32)?;
        let (_, result_size) = crate::delta::header_sizes(&head)
            .map_err(PackError::Delta)?;
        Ok(result_size)
    }

    fn read_at(
        &self,
        offset: u64,
        crc_check: Option<(ObjectId, u32)>,
        resolver: &dyn BaseResolver,
        depth_budget: usize,
    ) -> PackResult<RawObject> {
        // Delta payloads collected on the way down, with the offset whose
        // resolved object each layer corresponds to.
        let mut layers: Vec<(u64, Vec<u8>)> = Vec::new();
        let mut visited = HashSet::new();
        let mut cur = offset;
        let mut first = true;

        let mut base = loop {
            if let Some(cached) = self.base_cache.lock().expect("lock poisoned").get(cur) {
                break cached;
            }
            if !visited.insert(cur) {
                return Err(PackError::CyclicDelta { offset: cur });
            }
            if layers.len() >= depth_budget {
                return Err(PackError::DeltaChainTooDeep { max: depth_budget });
            }

            let header = self.entry_header(cur)?;
            let size = usize::try_from(header.size)
                .map_err(|_| PackError::corrupt(cur, "entry size exceeds address space"))?;
            let (payload, consumed) = inflate_exact(self.payload(&header), size)
                .map_err(|e| annotate_offset(e, cur))?;

            if first {
                first = false;
                if let Some((id, expected)) = crc_check {
                    let end = header.data_start as usize + consumed;
                    let actual = crc32fast::hash(&self.data[cur as usize..end]);
                    if actual != expected {
                        return Err(PackError::CrcMismatch { id });
                    }
                }
            }

            match header.kind {
                PackEntryKind::Full(kind) => {
                    break RawObject::new(kind, payload);
                }
                PackEntryKind::OfsDelta { base_offset } => {
                    layers.push((cur, payload));
                    cur = base_offset;
                }
                PackEntryKind::RefDelta { base } => {
                    layers.push((cur, payload));
                    match self.index.lookup(&base) {
                        Some((base_offset, _)) => cur = base_offset,
                        None => {
                            let budget = depth_budget - layers.len();
                            break resolver
                                .read_base(&base, budget)?
                                .ok_or(PackError::DeltaBaseNotFound(base))?;
                        }
                    }
                }
            }
        };

        // Walk back up the chain, caching each freshly resolved object.
        if layers.is_empty() {
            let mut cache = self.base_cache.lock().expect("lock poisoned");
            cache.put(offset, &base);
            return Ok(base);
        }
        for (layer_offset, delta) in layers.into_iter().rev() {
            let data = crate::delta::apply(&base.data, &delta)
                .map_err(|e| {
                    tracing::warn!(
                        pack = %self.path.display(),
                        offset = layer_offset,
                        "delta application failed: {e}"
                    );
                    PackError::Delta(e)
                })?;
            base = RawObject::new(base.kind, data);
            let mut cache = self.base_cache.lock().expect("lock poisoned");
            cache.put(layer_offset, &base);
        }
        Ok(base)
    }
}

fn annotate_offset(err: PackError, offset: u64) -> PackError {
    match err {
        PackError::CorruptPack { reason, .. } => PackError::CorruptPack { offset, reason },
        other => other,
    }
}

impl std::fmt::Debug for PackFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackFile")
            .field("path", &self.path)
            .field("objects", &self.object_count())
            .finish()
    }
}
