use std::io::{BufReader, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use grit_hash::HashAlgorithm;
use grit_types::{ObjectId, ObjectKind, Outcome};

use crate::encoding;
use crate::error::{StoreError, StoreResult};
use crate::object::RawObject;

/// Loose object backend: one deflated file per object under a 256-way
/// fan-out directory.
///
/// The path for id `aabbcc…` is `<root>/aa/bbcc…`. Files are created by
/// deflating into a temp file in the same directory and renaming into place,
/// so readers never observe partial objects and no locks are needed.
pub struct LooseBackend {
    root: PathBuf,
    algorithm: HashAlgorithm,
    strict_verify: bool,
}

impl LooseBackend {
    /// Create a backend over `root` (the `objects` directory).
    ///
    /// The directory is created lazily on first write; a missing directory
    /// reads as an empty store.
    pub fn new(root: impl Into<PathBuf>, algorithm: HashAlgorithm) -> Self {
        Self {
            root: root.into(),
            algorithm,
            strict_verify: true,
        }
    }

    /// Disable or re-enable digest re-verification on read.
    ///
    /// Verification is on by default; turning it off trades integrity
    /// checking for inflate-only reads.
    pub fn with_strict_verification(mut self, strict: bool) -> Self {
        self.strict_verify = strict;
        self
    }

    /// The fan-out root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The digest algorithm ids in this store are computed with.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    fn id_from_names(&self, dir: &str, file: &str) -> Option<ObjectId> {
        let mut hex = String::with_capacity(dir.len() + file.len());
        hex.push_str(dir);
        hex.push_str(file);
        ObjectId::from_hex(&hex).ok()
    }

    /// Read a complete object by id; `Ok(None)` when absent.
    pub fn read(&self, id: &ObjectId) -> StoreResult<Option<RawObject>> {
        let path = self.object_path(id);
        let file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io("open", path)(e)),
        };

        let object = encoding::read_loose(BufReader::new(file))?;
        if self.strict_verify {
            let computed = object.compute_id(self.algorithm);
            if computed != *id {
                return Err(StoreError::HashMismatch {
                    expected: *id,
                    computed,
                });
            }
        }
        Ok(Some(object))
    }

    /// Read an object's kind and declared length by inflating only its
    /// header bytes.
    pub fn read_header(&self, id: &ObjectId) -> StoreResult<Option<(ObjectKind, u64)>> {
        let path = self.object_path(id);
        let file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io("open", path)(e)),
        };
        encoding::read_loose_header(BufReader::new(file)).map(Some)
    }

    /// Check whether an object file exists.
    pub fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.object_path(id).exists())
    }

    /// Write an object, atomically; a successful no-op when it already
    /// exists.
    pub fn write(&self, object: &RawObject) -> StoreResult<ObjectId> {
        let id = object.compute_id(self.algorithm);
        let hex = id.to_hex();
        let parent = self.root.join(&hex[..2]);
        let path = parent.join(&hex[2..]);

        // Content-addressing makes the existing file authoritative.
        if path.exists() {
            return Ok(id);
        }

        std::fs::create_dir_all(&parent).map_err(StoreError::io("mkdir", &parent))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(StoreError::io("mktemp", &parent))?;
        encoding::write_loose(object, tmp.as_file_mut())
            .map_err(StoreError::io("deflate", &path))?;
        tmp.as_file_mut()
            .flush()
            .map_err(StoreError::io("flush", &path))?;

        match tmp.persist(&path) {
            Ok(_) => Ok(id),
            // A concurrent writer beat us to it; the content is identical.
            Err(e) if path.exists() => {
                drop(e);
                Ok(id)
            }
            Err(e) => Err(StoreError::io("rename", path)(e.error)),
        }
    }

    /// Visit every object id under the fan-out; the callback stops the walk
    /// by returning `ControlFlow::Break`.
    pub fn foreach(
        &self,
        callback: &mut dyn FnMut(&ObjectId) -> ControlFlow<()>,
    ) -> StoreResult<Outcome> {
        let dirs = match std::fs::read_dir(&self.root) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Outcome::Completed),
            Err(e) => return Err(StoreError::io("readdir", &self.root)(e)),
        };

        for dir in dirs {
            let dir = dir.map_err(StoreError::io("readdir", &self.root))?;
            let dir_name = dir.file_name();
            let dir_name = dir_name.to_string_lossy();
            if dir_name.len() != 2 || !dir_name.bytes().all(|b| b.is_ascii_hexdigit()) {
                continue;
            }

            let entries = std::fs::read_dir(dir.path())
                .map_err(StoreError::io("readdir", dir.path()))?;
            for entry in entries {
                let entry = entry.map_err(StoreError::io("readdir", dir.path()))?;
                let file_name = entry.file_name();
                let Some(id) = self.id_from_names(&dir_name, &file_name.to_string_lossy())
                else {
                    // Temp files and stray names are not objects.
                    tracing::debug!(file = %entry.path().display(), "skipping non-object file");
                    continue;
                };
                if callback(&id).is_break() {
                    return Ok(Outcome::Stopped);
                }
            }
        }
        Ok(Outcome::Completed)
    }

    /// Collect every id whose hex form starts with `prefix`.
    pub fn read_prefix(&self, prefix: &str) -> StoreResult<Vec<ObjectId>> {
        if !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Ok(Vec::new());
        }
        let prefix_lower = prefix.to_ascii_lowercase();

        let mut matches = Vec::new();
        if prefix_lower.len() >= 2 {
            // Only one fan-out directory can contain matches.
            let dir_path = self.root.join(&prefix_lower[..2]);
            let entries = match std::fs::read_dir(&dir_path) {
                Ok(d) => d,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(matches),
                Err(e) => return Err(StoreError::io("readdir", dir_path)(e)),
            };
            for entry in entries {
                let entry = entry.map_err(StoreError::io("readdir", &dir_path))?;
                let file_name = entry.file_name();
                let file_name = file_name.to_string_lossy();
                if file_name.starts_with(&prefix_lower[2..]) {
                    if let Some(id) = self.id_from_names(&prefix_lower[..2], &file_name) {
                        matches.push(id);
                    }
                }
            }
        } else {
            self.foreach(&mut |id| {
                if id.matches_hex_prefix(&prefix_lower) {
                    matches.push(*id);
                }
                ControlFlow::Continue(())
            })?;
        }
        Ok(matches)
    }
}

impl std::fmt::Debug for LooseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LooseBackend")
            .field("root", &self.root)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}
