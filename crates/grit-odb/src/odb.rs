//! The object database router.
//!
//! An `Odb` owns an ordered list of backends -- loose, packed, alternates,
//! and anything registered by the application -- and routes reads to the
//! first backend that has the object, writes to the highest-priority
//! writable backend, and enumeration across all of them with
//! deduplication. A bounded content cache sits in front of the probe.
//!
//! Concurrency: the backend list is behind a read/write lock (registration
//! is rare, reads are constant); probes run against a cloned snapshot so no
//! lock is held across backend I/O. The cache uses one mutex held only for
//! map operations -- two threads racing to resolve the same object both
//! succeed, and one result is discarded.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, Weak};

use grit_pack::{BaseResolver, PackError, PackRegistry, PackResult};
use grit_store::{LooseBackend, RawObject};
use grit_types::{ObjectId, ObjectKind, Outcome};

use crate::backend::Backend;
use crate::cache::ObjectCache;
use crate::config::OdbConfig;
use crate::error::{OdbError, OdbResult};

/// Priority of the repository's own loose backend: the writable primary.
pub const LOOSE_PRIORITY: i32 = 1;
/// Priority of the repository's own pack backend. Packs outrank loose on
/// reads -- long-running operations find most objects packed.
pub const PACKED_PRIORITY: i32 = 2;

/// Recursion bound for `info/alternates` chains.
const MAX_ALTERNATES_DEPTH: usize = 5;

/// Shortest accepted abbreviated-id prefix.
const MIN_PREFIX_LEN: usize = 4;

struct BackendEntry {
    backend: Arc<dyn Backend>,
    priority: i32,
    seq: u64,
}

pub(crate) struct OdbInner {
    config: OdbConfig,
    backends: RwLock<Vec<BackendEntry>>,
    cache: Mutex<ObjectCache>,
    next_seq: Mutex<u64>,
    /// The well-known empty tree id, answerable without any backend.
    empty_tree: ObjectId,
}

impl OdbInner {
    fn snapshot(&self) -> Vec<Arc<dyn Backend>> {
        self.backends
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|entry| Arc::clone(&entry.backend))
            .collect()
    }

    fn register(&self, backend: Arc<dyn Backend>, priority: i32) {
        let seq = {
            let mut next = self.next_seq.lock().expect("lock poisoned");
            *next += 1;
            *next
        };
        let mut backends = self.backends.write().expect("lock poisoned");
        backends.push(BackendEntry {
            backend,
            priority,
            seq,
        });
        // Highest priority first; ties go to the earliest registration.
        backends.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
    }

    fn hardcoded(&self, id: &ObjectId) -> Option<RawObject> {
        if *id == self.empty_tree {
            return Some(RawObject::new(ObjectKind::Tree, Vec::new()));
        }
        None
    }

    fn read_inner(&self, id: &ObjectId, depth_budget: usize) -> OdbResult<Option<RawObject>> {
        if let Some(obj) = self.hardcoded(id) {
            return Ok(Some(obj));
        }
        if let Some(obj) = self.cache.lock().expect("lock poisoned").get(id) {
            return Ok(Some(obj));
        }

        for backend in self.snapshot() {
            if let Some(obj) = backend.read_delta_base(id, depth_budget)? {
                self.cache.lock().expect("lock poisoned").put(*id, &obj);
                return Ok(Some(obj));
            }
        }
        Ok(None)
    }
}

/// Resolves ref-delta bases by probing the whole router, so a delta in one
/// pack may be based on an object in another pack or in loose storage.
pub(crate) struct RouterResolver<'a> {
    inner: &'a OdbInner,
}

impl BaseResolver for RouterResolver<'_> {
    fn read_base(&self, id: &ObjectId, depth_budget: usize) -> PackResult<Option<RawObject>> {
        if depth_budget == 0 {
            return Err(PackError::DeltaChainTooDeep {
                max: self.inner.config.max_delta_depth,
            });
        }
        match self.inner.read_inner(id, depth_budget) {
            Ok(found) => Ok(found),
            Err(OdbError::Pack(e)) => Err(e),
            Err(other) => Err(PackError::External(Box::new(other))),
        }
    }
}

/// Pack backend wired into a router.
///
/// Wraps a [`PackRegistry`]; once attached to an `Odb`, ref-delta bases
/// missing from the registry's own packs are resolved through the full
/// backend list.
pub struct PackedBackend {
    registry: PackRegistry,
    router: RwLock<Weak<OdbInner>>,
}

impl PackedBackend {
    /// Wrap an already-loaded registry.
    pub fn new(registry: PackRegistry) -> Self {
        Self {
            registry,
            router: RwLock::new(Weak::new()),
        }
    }

    /// Discover packs under `pack_dir` with the database configuration.
    pub fn open(pack_dir: &Path, config: &OdbConfig) -> OdbResult<Self> {
        let registry = PackRegistry::open_with(
            pack_dir,
            config.algorithm,
            config.max_delta_depth,
            config.pack_handle_cap,
        )?;
        Ok(Self::new(registry))
    }

    /// The wrapped registry.
    pub fn registry(&self) -> &PackRegistry {
        &self.registry
    }

    fn attach(&self, inner: &Arc<OdbInner>) {
        *self.router.write().expect("lock poisoned") = Arc::downgrade(inner);
    }

    fn with_resolver<T>(
        &self,
        f: impl FnOnce(&PackRegistry, &dyn BaseResolver) -> PackResult<T>,
    ) -> OdbResult<T> {
        let weak = self.router.read().expect("lock poisoned").clone();
        let result = match weak.upgrade() {
            Some(inner) => {
                let resolver = RouterResolver { inner: &inner };
                f(&self.registry, &resolver)
            }
            None => f(&self.registry, &self.registry),
        };
        result.map_err(OdbError::from)
    }
}

impl Backend for PackedBackend {
    fn read(&self, id: &ObjectId) -> OdbResult<Option<RawObject>> {
        self.with_resolver(|registry, resolver| registry.read_with(id, resolver))
    }

    fn read_header(&self, id: &ObjectId) -> OdbResult<Option<(ObjectKind, u64)>> {
        self.with_resolver(|registry, resolver| registry.read_header_with(id, resolver))
    }

    fn exists(&self, id: &ObjectId) -> OdbResult<bool> {
        Ok(self.registry.contains(id))
    }

    fn foreach(
        &self,
        callback: &mut dyn FnMut(&ObjectId) -> ControlFlow<()>,
    ) -> OdbResult<Outcome> {
        Ok(self.registry.foreach(callback)?)
    }

    fn read_prefix(&self, prefix: &str) -> OdbResult<Vec<ObjectId>> {
        Ok(self.registry.read_prefix(prefix)?)
    }

    fn read_delta_base(
        &self,
        id: &ObjectId,
        depth_budget: usize,
    ) -> OdbResult<Option<RawObject>> {
        self.with_resolver(|registry, resolver| {
            registry.read_base_with(id, resolver, depth_budget)
        })
    }
}

/// The object database façade.
///
/// Cloning is cheap and shares the backend list and cache; the last handle
/// dropped releases everything.
#[derive(Clone)]
pub struct Odb {
    inner: Arc<OdbInner>,
}

impl Odb {
    /// An empty database with no backends; register them explicitly.
    pub fn new(config: OdbConfig) -> Self {
        Self {
            inner: Arc::new(OdbInner {
                cache: Mutex::new(ObjectCache::new(config.cache_bytes)),
                empty_tree: grit_hash::hash_object(config.algorithm, ObjectKind::Tree, b""),
                config,
                backends: RwLock::new(Vec::new()),
                next_seq: Mutex::new(0),
            }),
        }
    }

    /// Open the object store of a repository: its loose backend, its pack
    /// directory, and everything `info/alternates` points at.
    pub fn open(objects_dir: &Path, config: OdbConfig) -> OdbResult<Self> {
        let odb = Self::new(config);
        odb.add_disk_backends(objects_dir, 0)?;
        Ok(odb)
    }

    fn add_disk_backends(&self, objects_dir: &Path, depth: usize) -> OdbResult<()> {
        let config = &self.inner.config;

        let loose = LooseBackend::new(objects_dir, config.algorithm)
            .with_strict_verification(config.strict_hash_verification);
        self.register_backend(Arc::new(loose), LOOSE_PRIORITY);

        let packed = Arc::new(PackedBackend::open(&objects_dir.join("pack"), config)?);
        packed.attach(&self.inner);
        self.inner.register(packed, PACKED_PRIORITY);

        self.load_alternates(objects_dir, depth)
    }

    /// `info/alternates` lists additional object directories, one per line.
    /// Relative paths resolve against the listing directory; recursion is
    /// bounded so alternate cycles terminate.
    fn load_alternates(&self, objects_dir: &Path, depth: usize) -> OdbResult<()> {
        if depth >= MAX_ALTERNATES_DEPTH {
            tracing::warn!(
                dir = %objects_dir.display(),
                "alternates nested deeper than {MAX_ALTERNATES_DEPTH}; ignoring the rest"
            );
            return Ok(());
        }

        let path = objects_dir.join("info").join("alternates");
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(OdbError::Io {
                    op: "read",
                    path,
                    source: e,
                })
            }
        };

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let alt = if Path::new(line).is_absolute() {
                PathBuf::from(line)
            } else {
                objects_dir.join(line)
            };
            self.add_disk_backends(&alt, depth + 1)?;
        }
        Ok(())
    }

    /// Register a backend at the given priority.
    ///
    /// Higher priorities are probed first; among equal priorities the
    /// earliest registration wins.
    pub fn register_backend(&self, backend: Arc<dyn Backend>, priority: i32) {
        self.inner.register(backend, priority);
    }

    /// Number of registered backends.
    pub fn backend_count(&self) -> usize {
        self.inner.backends.read().expect("lock poisoned").len()
    }

    /// The digest algorithm of this database.
    pub fn algorithm(&self) -> grit_hash::HashAlgorithm {
        self.inner.config.algorithm
    }

    /// Compute the id an object would be stored under, without writing it.
    pub fn hash(&self, kind: ObjectKind, data: &[u8]) -> ObjectId {
        grit_hash::hash_object(self.inner.config.algorithm, kind, data)
    }

    /// Read an object.
    pub fn read(&self, id: &ObjectId) -> OdbResult<RawObject> {
        self.inner
            .read_inner(id, self.inner.config.max_delta_depth)?
            .ok_or_else(|| OdbError::NotFound(id.to_hex()))
    }

    /// Read an object's kind and size without materializing its content.
    pub fn read_header(&self, id: &ObjectId) -> OdbResult<(ObjectKind, u64)> {
        if let Some(obj) = self.inner.hardcoded(id) {
            return Ok((obj.kind, obj.size()));
        }
        if let Some(found) = self
            .inner
            .cache
            .lock()
            .expect("lock poisoned")
            .peek_header(id)
        {
            return Ok(found);
        }
        for backend in self.inner.snapshot() {
            if let Some(found) = backend.read_header(id)? {
                return Ok(found);
            }
        }
        Err(OdbError::NotFound(id.to_hex()))
    }

    /// Check whether an object exists anywhere.
    pub fn exists(&self, id: &ObjectId) -> OdbResult<bool> {
        if self.inner.hardcoded(id).is_some() {
            return Ok(true);
        }
        if self.inner.cache.lock().expect("lock poisoned").contains(id) {
            return Ok(true);
        }
        for backend in self.inner.snapshot() {
            if backend.exists(id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Write an object to the highest-priority writable backend.
    pub fn write(&self, object: &RawObject) -> OdbResult<ObjectId> {
        for backend in self.inner.snapshot() {
            if !backend.is_writable() {
                continue;
            }
            let id = backend.write(object)?;
            // Freshly written objects are often read right back.
            self.inner
                .cache
                .lock()
                .expect("lock poisoned")
                .put(id, object);
            return Ok(id);
        }
        Err(OdbError::ReadOnly)
    }

    /// Resolve an abbreviated id to the unique object it names.
    pub fn read_prefix(&self, prefix: &str) -> OdbResult<RawObject> {
        let id = self.resolve_prefix(prefix)?;
        self.read(&id)
    }

    /// Resolve an abbreviated id to a full id.
    ///
    /// Fails `Ambiguous` when several distinct objects match (or the prefix
    /// is shorter than four characters), `NotFound` when none does.
    pub fn resolve_prefix(&self, prefix: &str) -> OdbResult<ObjectId> {
        if prefix.len() < MIN_PREFIX_LEN {
            return Err(OdbError::Ambiguous(prefix.to_string()));
        }
        if !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(OdbError::NotFound(prefix.to_string()));
        }
        if prefix.len() == self.inner.config.algorithm.hex_len() {
            // A full-length prefix is just an id.
            let id = ObjectId::from_hex(prefix)
                .map_err(|_| OdbError::NotFound(prefix.to_string()))?;
            return if self.exists(&id)? {
                Ok(id)
            } else {
                Err(OdbError::NotFound(prefix.to_string()))
            };
        }

        let mut found: Option<ObjectId> = None;
        for backend in self.inner.snapshot() {
            for id in backend.read_prefix(prefix)? {
                match found {
                    None => found = Some(id),
                    Some(existing) if existing == id => {}
                    Some(_) => return Err(OdbError::Ambiguous(prefix.to_string())),
                }
            }
        }
        found.ok_or_else(|| OdbError::NotFound(prefix.to_string()))
    }

    /// Visit every object id across all backends exactly once, attributed
    /// to the highest-priority backend that holds it.
    pub fn foreach(
        &self,
        callback: &mut dyn FnMut(&ObjectId) -> ControlFlow<()>,
    ) -> OdbResult<Outcome> {
        let mut seen = std::collections::HashSet::new();
        for backend in self.inner.snapshot() {
            let outcome = backend.foreach(&mut |id| {
                if seen.insert(*id) {
                    callback(id)
                } else {
                    ControlFlow::Continue(())
                }
            })?;
            if outcome.stopped() {
                return Ok(Outcome::Stopped);
            }
        }
        Ok(Outcome::Completed)
    }

    #[cfg(test)]
    pub(crate) fn cached_objects(&self) -> usize {
        self.inner.cache.lock().expect("lock poisoned").len()
    }
}

impl std::fmt::Debug for Odb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Odb")
            .field("backends", &self.backend_count())
            .field("algorithm", &self.inner.config.algorithm)
            .finish()
    }
}
