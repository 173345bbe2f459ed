//! The polymorphic backend interface.
//!
//! Every object source -- loose files, pack registries, in-memory staging,
//! externally supplied custom stores -- plugs into the router through this
//! trait. The router owns the ordered backend collection; backends never
//! reference each other.

use std::ops::ControlFlow;

use grit_store::{LooseBackend, MemoryBackend, RawObject};
use grit_types::{ObjectId, ObjectKind, Outcome};

use crate::error::{OdbError, OdbResult};

/// A source of content-addressed objects.
///
/// Invariants for implementations:
/// - Absence is `Ok(None)`, never an error; the router aggregates absence
///   across backends into its final not-found.
/// - Integrity failures are errors, never `None` -- corruption must not be
///   mistaken for absence.
/// - Objects are immutable; a backend never returns different bytes for the
///   same id.
/// - Concurrent reads are safe without external locking.
pub trait Backend: Send + Sync {
    /// Read a complete object by id.
    fn read(&self, id: &ObjectId) -> OdbResult<Option<RawObject>>;

    /// Read an object's kind and content length without materializing the
    /// content.
    fn read_header(&self, id: &ObjectId) -> OdbResult<Option<(ObjectKind, u64)>>;

    /// Check whether an object exists.
    fn exists(&self, id: &ObjectId) -> OdbResult<bool>;

    /// Write an object and return its content-addressed id.
    ///
    /// Read-only backends keep the default, which refuses the write.
    fn write(&self, object: &RawObject) -> OdbResult<ObjectId> {
        let _ = object;
        Err(OdbError::ReadOnly)
    }

    /// Whether this backend accepts writes.
    fn is_writable(&self) -> bool {
        false
    }

    /// Visit every object id in this backend. Enumeration order is
    /// unspecified; the callback stops the walk with `ControlFlow::Break`.
    fn foreach(
        &self,
        callback: &mut dyn FnMut(&ObjectId) -> ControlFlow<()>,
    ) -> OdbResult<Outcome>;

    /// Collect every id whose hex form starts with `prefix`.
    fn read_prefix(&self, prefix: &str) -> OdbResult<Vec<ObjectId>>;

    /// Read an object that is wanted as a delta base.
    ///
    /// `depth_budget` is the remaining delta-chain allowance; backends that
    /// resolve deltas themselves must honor it. The default ignores it,
    /// which is correct for backends storing only full objects.
    fn read_delta_base(
        &self,
        id: &ObjectId,
        depth_budget: usize,
    ) -> OdbResult<Option<RawObject>> {
        let _ = depth_budget;
        self.read(id)
    }
}

impl Backend for LooseBackend {
    fn read(&self, id: &ObjectId) -> OdbResult<Option<RawObject>> {
        Ok(LooseBackend::read(self, id)?)
    }

    fn read_header(&self, id: &ObjectId) -> OdbResult<Option<(ObjectKind, u64)>> {
        Ok(LooseBackend::read_header(self, id)?)
    }

    fn exists(&self, id: &ObjectId) -> OdbResult<bool> {
        Ok(LooseBackend::exists(self, id)?)
    }

    fn write(&self, object: &RawObject) -> OdbResult<ObjectId> {
        Ok(LooseBackend::write(self, object)?)
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn foreach(
        &self,
        callback: &mut dyn FnMut(&ObjectId) -> ControlFlow<()>,
    ) -> OdbResult<Outcome> {
        Ok(LooseBackend::foreach(self, callback)?)
    }

    fn read_prefix(&self, prefix: &str) -> OdbResult<Vec<ObjectId>> {
        Ok(LooseBackend::read_prefix(self, prefix)?)
    }
}

impl Backend for MemoryBackend {
    fn read(&self, id: &ObjectId) -> OdbResult<Option<RawObject>> {
        Ok(MemoryBackend::read(self, id)?)
    }

    fn read_header(&self, id: &ObjectId) -> OdbResult<Option<(ObjectKind, u64)>> {
        Ok(MemoryBackend::read_header(self, id)?)
    }

    fn exists(&self, id: &ObjectId) -> OdbResult<bool> {
        Ok(MemoryBackend::exists(self, id)?)
    }

    fn write(&self, object: &RawObject) -> OdbResult<ObjectId> {
        Ok(MemoryBackend::write(self, object)?)
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn foreach(
        &self,
        callback: &mut dyn FnMut(&ObjectId) -> ControlFlow<()>,
    ) -> OdbResult<Outcome> {
        Ok(MemoryBackend::foreach(self, callback)?)
    }

    fn read_prefix(&self, prefix: &str) -> OdbResult<Vec<ObjectId>> {
        Ok(MemoryBackend::read_prefix(self, prefix)?)
    }
}
