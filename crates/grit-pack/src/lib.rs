//! Pack file storage for grit.
//!
//! Packs hold many objects in one file, optionally expressed as deltas
//! against each other, with a sorted side index for O(log n) lookup and a
//! multi-pack-index merging thousands of per-pack indexes into one table.
//!
//! # Architecture
//!
//! - **Delta codec** ([`delta`]): copy/insert instruction streams between
//!   byte buffers -- apply is fully bounds-checked, encode is best-effort
//!   compact
//! - **Pack file** ([`PackFile`]): memory-mapped entry access with iterative
//!   delta-chain resolution, cycle detection, and a base-object cache
//! - **Pack index** ([`PackIndex`]): fan-out + sorted id table, version 2
//! - **Multi-pack-index** ([`Midx`]): one merged lookup across many packs
//! - **Writers** ([`PackWriter`], [`MidxWriter`]): build packs and indexes,
//!   reusing the delta codec
//! - **Registry** ([`PackRegistry`]): every pack of a directory behind a
//!   descriptor-capped LRU handle cache

pub mod cache;
pub mod delta;
pub mod entry;
pub mod error;
pub mod file;
pub mod idx;
pub mod inflate;
pub mod midx;
pub mod registry;
pub mod writer;

pub use entry::{EntryHeader, PackEntryKind};
pub use error::{DeltaError, PackError, PackResult};
pub use file::{BaseResolver, NoExternalBases, PackFile, DEFAULT_MAX_DELTA_DEPTH};
pub use idx::PackIndex;
pub use midx::{Midx, MidxWriter};
pub use registry::{PackRegistry, DEFAULT_HANDLE_CAP};
pub use writer::{PackWriter, WrittenPack};
