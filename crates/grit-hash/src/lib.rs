//! Pluggable cryptographic hash engine for grit.
//!
//! Object ids are digests of the canonical object header followed by the
//! object content. The engine is incremental: callers feed bytes in chunks of
//! any size and the digest is identical regardless of chunking. Two digest
//! algorithms are supported -- legacy SHA-1 (20-byte ids) and SHA-256 (32-byte
//! ids) -- plus a collision-detecting SHA-1 variant that fails loudly when fed
//! inputs crafted with a cryptanalytic collision attack instead of returning
//! the colliding digest.

pub mod engine;
pub mod error;

pub use engine::{hash_object, object_header, HashAlgorithm, Hasher};
pub use error::{HashError, HashResult};
