//! Shared building blocks of the repo-trust crates: the error taxonomy,
//! a constant-time hex codec and raw Ed25519 primitives.

pub mod crypto;
pub mod error;
pub mod hex;

pub use error::{HexError, TrustError};

/// Version counter of a role metadata document.
pub type Version = u64;

/// Minimum number of distinct valid signatures required to accept a
/// document under a given role.
pub type Threshold = u64;
