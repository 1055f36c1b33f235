//! Trust-root metadata engine of a package repository client.
//!
//! The engine implements the root-of-trust subset of [The Update
//! Framework](https://theupdateframework.github.io/specification/latest/):
//! it loads a locally trusted root metadata document, verifies the
//! document's signatures against its own declared keys and threshold, and
//! then consumes successor roots. Each successor must be authenticated
//! against both the previously trusted keys and its own newly declared
//! keys (TUF 5.3.4) and must carry version N+1 exactly (TUF 5.3.5) before
//! it replaces the current root.
//!
//! Two on-disk dialects of the root document coexist: the legacy "0.6.x"
//! shape with a `{root, key_mgr}` delegation set, and the canonical "1.x"
//! shape. A v0.6 root transparently upgrades to v1 when a successor
//! declares the newer spec version.
//!
//! ## Example
//!
//! ```ignore
//! use repo_trust::TrustRepo;
//! use url::Url;
//!
//! let mut repo = TrustRepo::new(
//!     Url::parse("https://repo.example.org/channel").unwrap(),
//!     "1.sv06.root.json".as_ref(),
//!     None,
//! )?;
//! repo.update_from_path("2.sv1.root.json".as_ref())?;
//! let root_keys = repo.keyring("root").expect("root keyring is declared");
//! # Ok::<(), repo_trust::TrustError>(())
//! ```
//!
//! Signatures are verified over the exact source bytes of the `signed`
//! sub-document; the engine never re-serialises a payload before
//! checking it. Fetching remote metadata, the non-root TUF roles and
//! package installation live in other crates.

/// The stateful repository trust anchor.
pub mod repo;
/// Role metadata model, dialect adapters and the update state machine.
pub mod role;

pub use repo::TrustRepo;
pub use role::root::Root;
pub use role::{Key, RoleFullKeys, RoleKeys, RolePubKeys, RoleSignature, SpecVersion};

/// Re-export of the shared primitives crate.
pub use repo_trust_common as common;
pub use repo_trust_common::{HexError, Threshold, TrustError, Version};
