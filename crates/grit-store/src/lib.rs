//! Content-addressed object storage for grit.
//!
//! This crate implements the loose half of the object database: every object
//! is an immutable unit identified by the digest of its canonical header and
//! content, stored as one zlib-deflated file under a 256-way fan-out
//! directory.
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Writes are atomic: deflate into a temp file, then rename into place. A
//!    concurrent reader never observes a partially written object.
//! 3. Concurrent reads are always safe (objects are immutable).
//! 4. The store never interprets object contents -- it is a pure key-value
//!    store keyed by content digest.
//! 5. All I/O errors are propagated, never silently ignored.
//!
//! # Storage Backends
//!
//! - [`LooseBackend`] -- fan-out directory of deflated files
//! - [`MemoryBackend`] -- `HashMap`-based store for staging and tests
//!
//! Both expose the same read/write/exists/foreach/read-prefix surface; the
//! ODB layer wires them into its polymorphic backend list.

pub mod encoding;
pub mod error;
pub mod loose;
pub mod memory;
pub mod object;

pub use error::{StoreError, StoreResult};
pub use loose::LooseBackend;
pub use memory::MemoryBackend;
pub use object::RawObject;
