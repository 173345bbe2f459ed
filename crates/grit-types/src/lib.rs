//! Foundation types for grit.
//!
//! This crate provides the core value types used throughout the grit object
//! database. Every other grit crate depends on `grit-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Content-addressed identifier (SHA-1 or SHA-256 digest)
//! - [`ObjectKind`] -- Closed set of logical object kinds (blob/tree/commit/tag)
//! - [`Outcome`] -- Completion-vs-stopped signal for object enumerations

pub mod error;
pub mod kind;
pub mod oid;
pub mod outcome;

pub use error::TypeError;
pub use kind::ObjectKind;
pub use oid::ObjectId;
pub use outcome::Outcome;
