//! Pack directory registry.
//!
//! Discovers `*.pack`/`*.idx` pairs and an optional `multi-pack-index` in a
//! pack directory. Indexes are small and stay resident; pack data is opened
//! lazily through a capped, least-recently-used handle cache, so a
//! repository with thousands of packs never exhausts file descriptors even
//! on platforms whose default limit is 256.

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use grit_hash::HashAlgorithm;
use grit_store::RawObject;
use grit_types::{ObjectId, ObjectKind, Outcome};

use crate::error::{PackError, PackResult};
use crate::file::{BaseResolver, PackFile, DEFAULT_MAX_DELTA_DEPTH};
use crate::idx::PackIndex;
use crate::midx::Midx;

/// Default cap on concurrently open pack data handles.
pub const DEFAULT_HANDLE_CAP: usize = 32;

struct PackSource {
    /// Index file name, the form the MIDX records.
    idx_name: String,
    pack_path: PathBuf,
    index: Arc<PackIndex>,
}

struct HandleLru {
    tick: u64,
    open: HashMap<usize, (Arc<PackFile>, u64)>,
}

/// All packs of one objects directory, behind a handle cache.
pub struct PackRegistry {
    algorithm: HashAlgorithm,
    max_delta_depth: usize,
    handle_cap: usize,
    sources: Vec<PackSource>,
    /// Merged index plus the source position for each MIDX pack id.
    midx: Option<(Midx, Vec<usize>)>,
    handles: Mutex<HandleLru>,
}

impl PackRegistry {
    /// Discover packs under `pack_dir` (usually `objects/pack`).
    ///
    /// Corrupt packs and an unreadable or incomplete MIDX are skipped with a
    /// warning rather than failing the whole directory.
    pub fn open(pack_dir: &Path, algorithm: HashAlgorithm) -> PackResult<Self> {
        Self::open_with(pack_dir, algorithm, DEFAULT_MAX_DELTA_DEPTH, DEFAULT_HANDLE_CAP)
    }

    /// Discover packs with explicit depth and handle-cap configuration.
    pub fn open_with(
        pack_dir: &Path,
        algorithm: HashAlgorithm,
        max_delta_depth: usize,
        handle_cap: usize,
    ) -> PackResult<Self> {
        let mut sources = Vec::new();

        if pack_dir.exists() {
            let entries = std::fs::read_dir(pack_dir)
                .map_err(PackError::io("readdir", pack_dir))?;
            for entry in entries {
                let entry = entry.map_err(PackError::io("readdir", pack_dir))?;
                let path = entry.path();
                if path.extension().map(|e| e == "pack").unwrap_or(false) {
                    let idx_path = path.with_extension("idx");
                    match PackIndex::open(&idx_path, algorithm) {
                        Ok(index) => {
                            let idx_name = idx_path
                                .file_name()
                                .map(|n| n.to_string_lossy().into_owned())
                                .unwrap_or_default();
                            sources.push(PackSource {
                                idx_name,
                                pack_path: path,
                                index: Arc::new(index),
                            });
                        }
                        Err(e) => {
                            tracing::warn!(pack = %path.display(), "skipping pack without usable index: {e}");
                        }
                    }
                }
            }
        }
        // Deterministic order regardless of directory iteration order.
        sources.sort_by(|a, b| a.idx_name.cmp(&b.idx_name));

        let midx_path = pack_dir.join("multi-pack-index");
        let midx = if midx_path.exists() {
            match Midx::open(&midx_path, algorithm) {
                Ok(midx) => Self::map_midx_packs(midx, &sources),
                Err(e) => {
                    tracing::warn!("ignoring unreadable multi-pack-index: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            algorithm,
            max_delta_depth,
            handle_cap: handle_cap.max(1),
            sources,
            midx,
            handles: Mutex::new(HandleLru {
                tick: 0,
                open: HashMap::new(),
            }),
        })
    }

    /// An empty registry (for tests and repositories without packs).
    pub fn empty(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            max_delta_depth: DEFAULT_MAX_DELTA_DEPTH,
            handle_cap: DEFAULT_HANDLE_CAP,
            sources: Vec::new(),
            midx: None,
            handles: Mutex::new(HandleLru {
                tick: 0,
                open: HashMap::new(),
            }),
        }
    }

    fn map_midx_packs(midx: Midx, sources: &[PackSource]) -> Option<(Midx, Vec<usize>)> {
        let mut mapping = Vec::with_capacity(midx.pack_names().len());
        for name in midx.pack_names() {
            match sources.iter().position(|s| s.idx_name == *name) {
                Some(pos) => mapping.push(pos),
                None => {
                    tracing::warn!(pack = %name, "multi-pack-index references missing pack; ignoring it");
                    return None;
                }
            }
        }
        Some((midx, mapping))
    }

    /// Number of discovered packs.
    pub fn pack_count(&self) -> usize {
        self.sources.len()
    }

    /// Whether a MIDX is loaded and in use.
    pub fn has_midx(&self) -> bool {
        self.midx.is_some()
    }

    /// Total objects across all packs (ids present in several packs are
    /// counted once per pack).
    pub fn total_objects(&self) -> usize {
        self.sources.iter().map(|s| s.index.object_count()).sum()
    }

    /// Number of pack data handles currently open.
    pub fn open_handles(&self) -> usize {
        self.handles.lock().expect("lock poisoned").open.len()
    }

    /// Fetch the open pack at source position `pos`, opening it (and
    /// evicting idle handles) as needed.
    fn handle(&self, pos: usize) -> PackResult<Arc<PackFile>> {
        {
            let mut lru = self.handles.lock().expect("lock poisoned");
            lru.tick += 1;
            let tick = lru.tick;
            if let Some((pack, last_used)) = lru.open.get_mut(&pos) {
                *last_used = tick;
                return Ok(Arc::clone(pack));
            }
        }

        // Open outside the lock; a racing open of the same pack is wasted
        // work, not an error.
        let source = &self.sources[pos];
        let pack = Arc::new(PackFile::with_index(
            &source.pack_path,
            Arc::clone(&source.index),
            self.algorithm,
            self.max_delta_depth,
        )?);

        let mut lru = self.handles.lock().expect("lock poisoned");
        lru.tick += 1;
        let tick = lru.tick;
        let pack = match lru.open.entry(pos) {
            std::collections::hash_map::Entry::Occupied(existing) => {
                Arc::clone(&existing.get().0)
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert((Arc::clone(&pack), tick));
                pack
            }
        };
        while lru.open.len() > self.handle_cap {
            let victim = lru
                .open
                .iter()
                .filter(|(&k, _)| k != pos)
                .min_by_key(|(_, (_, last_used))| *last_used)
                .map(|(&k, _)| k);
            match victim {
                Some(k) => {
                    lru.open.remove(&k);
                    tracing::debug!(pack = k, "closing idle pack handle");
                }
                None => break,
            }
        }
        Ok(pack)
    }

    /// Read an object, resolving external ref-delta bases through `resolver`.
    pub fn read_with(
        &self,
        id: &ObjectId,
        resolver: &dyn BaseResolver,
    ) -> PackResult<Option<RawObject>> {
        if let Some((midx, mapping)) = &self.midx {
            // The MIDX names the owning pack; the pack's own index supplies
            // the CRC for verification.
            let Some((pack_id, _)) = midx.lookup(id) else {
                return Ok(None);
            };
            let pack = self.handle(mapping[pack_id as usize])?;
            return pack.read_with_budget(id, resolver, self.max_delta_depth);
        }

        for pos in 0..self.sources.len() {
            if self.sources[pos].index.contains(id) {
                let pack = self.handle(pos)?;
                return pack.read_with_budget(id, resolver, self.max_delta_depth);
            }
        }
        Ok(None)
    }

    /// Read an object using the registry itself for base resolution.
    pub fn read(&self, id: &ObjectId) -> PackResult<Option<RawObject>> {
        self.read_with(id, self)
    }

    /// Read an object's kind and size without materializing content.
    pub fn read_header_with(
        &self,
        id: &ObjectId,
        resolver: &dyn BaseResolver,
    ) -> PackResult<Option<(ObjectKind, u64)>> {
        if let Some((midx, mapping)) = &self.midx {
            // The MIDX places the object; the owning pack answers the rest.
            let Some((pack_id, _)) = midx.lookup(id) else {
                return Ok(None);
            };
            let pack = self.handle(mapping[pack_id as usize])?;
            return pack.read_header(id, resolver);
        }

        for pos in 0..self.sources.len() {
            if self.sources[pos].index.contains(id) {
                let pack = self.handle(pos)?;
                return pack.read_header(id, resolver);
            }
        }
        Ok(None)
    }

    /// Read an object's header using the registry for base resolution.
    pub fn read_header(&self, id: &ObjectId) -> PackResult<Option<(ObjectKind, u64)>> {
        self.read_header_with(id, self)
    }

    /// Check containment across all packs without opening pack data.
    pub fn contains(&self, id: &ObjectId) -> bool {
        if let Some((midx, _)) = &self.midx {
            return midx.contains(id);
        }
        self.sources.iter().any(|s| s.index.contains(id))
    }

    /// Visit every object id across all packs, deduplicated.
    pub fn foreach(
        &self,
        callback: &mut dyn FnMut(&ObjectId) -> ControlFlow<()>,
    ) -> PackResult<Outcome> {
        if let Some((midx, _)) = &self.midx {
            for i in 0..midx.object_count() {
                let id = midx.oid_at(i);
                if callback(&id).is_break() {
                    return Ok(Outcome::Stopped);
                }
            }
            return Ok(Outcome::Completed);
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            for (id, _, _) in source.index.entries() {
                if !seen.insert(id) {
                    continue;
                }
                if callback(&id).is_break() {
                    return Ok(Outcome::Stopped);
                }
            }
        }
        Ok(Outcome::Completed)
    }

    /// Collect every id whose hex form starts with `prefix`, deduplicated.
    pub fn read_prefix(&self, prefix: &str) -> PackResult<Vec<ObjectId>> {
        let mut matches = Vec::new();
        if let Some((midx, _)) = &self.midx {
            for (id, _, _) in midx.lookup_prefix(prefix) {
                matches.push(id);
            }
            return Ok(matches);
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            for (id, _) in source.index.lookup_prefix(prefix) {
                if seen.insert(id) {
                    matches.push(id);
                }
            }
        }
        Ok(matches)
    }

    /// Read an object wanted as a delta base, with an explicit chain budget
    /// and a resolver for bases that live outside this registry.
    pub fn read_base_with(
        &self,
        id: &ObjectId,
        resolver: &dyn BaseResolver,
        depth_budget: usize,
    ) -> PackResult<Option<RawObject>> {
        if depth_budget == 0 {
            return Err(PackError::DeltaChainTooDeep {
                max: self.max_delta_depth,
            });
        }
        if let Some((midx, mapping)) = &self.midx {
            let Some((pack_id, _)) = midx.lookup(id) else {
                return Ok(None);
            };
            let pack = self.handle(mapping[pack_id as usize])?;
            return pack.read_with_budget(id, resolver, depth_budget);
        }
        for pos in 0..self.sources.len() {
            if self.sources[pos].index.contains(id) {
                let pack = self.handle(pos)?;
                return pack.read_with_budget(id, resolver, depth_budget);
            }
        }
        Ok(None)
    }
}

impl BaseResolver for PackRegistry {
    fn read_base(&self, id: &ObjectId, depth_budget: usize) -> PackResult<Option<RawObject>> {
        self.read_base_with(id, self, depth_budget)
    }
}

impl std::fmt::Debug for PackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackRegistry")
            .field("packs", &self.pack_count())
            .field("midx", &self.has_midx())
            .field("open_handles", &self.open_handles())
            .finish()
    }
}
