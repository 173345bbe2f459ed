//! Object database router for grit.
//!
//! The [`Odb`] façade unifies every object source of a repository -- the
//! loose fan-out directory, the pack directory (with its multi-pack-index),
//! alternates, and custom registered backends -- behind one
//! read/write/exists/foreach surface:
//!
//! - Reads probe backends highest-priority-first and stop at the first hit.
//! - Writes go to the highest-priority writable backend (loose by
//!   convention).
//! - A bounded LRU cache short-circuits repeated reads of hot objects.
//! - Abbreviated ids resolve across all backends with ambiguity detection.
//! - Enumeration yields each id exactly once, attributed to the
//!   highest-priority backend holding it.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod odb;

pub use backend::Backend;
pub use config::OdbConfig;
pub use error::{OdbError, OdbResult};
pub use odb::{Odb, PackedBackend, LOOSE_PRIORITY, PACKED_PRIORITY};

// The concrete pieces callers assemble databases from.
pub use grit_store::{LooseBackend, MemoryBackend, RawObject};
pub use grit_types::{ObjectId, ObjectKind, Outcome};
