//! Stateful binding of a repository URL to its trusted root.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::warn;
use url::Url;

use repo_trust_common::{TrustError, Version};

use crate::role::root::Root;
use crate::role::{RoleFullKeys, SpecVersion};

/// The trust anchor of one package repository: the repository base URL
/// together with the currently trusted root role.
///
/// A `TrustRepo` only mutates through successful updates; every
/// verification error leaves the previously trusted root in place, and a
/// caller may retry with a different candidate. Operations are
/// synchronous and run to completion; concurrent use requires external
/// serialisation.
#[derive(Debug)]
pub struct TrustRepo {
    base_url: Url,
    root: Root,
}

impl TrustRepo {
    /// Creates a trust repo from a locally trusted root file.
    ///
    /// The dialect is chosen by probing the document itself;
    /// `spec_version_hint` is advisory and merely logged on mismatch.
    pub fn new(
        base_url: Url,
        local_trusted_root: &Path,
        spec_version_hint: Option<SpecVersion>,
    ) -> Result<Self, TrustError> {
        let root = Root::from_path(local_trusted_root)?;
        if let Some(hint) = spec_version_hint {
            if hint != root.major_spec_version() {
                warn!(
                    "trusted root at {} is a {:?} document, ignoring the {:?} hint",
                    local_trusted_root.display(),
                    root.major_spec_version(),
                    hint
                );
            }
        }
        Ok(Self { base_url, root })
    }

    /// Applies a candidate successor supplied as an in-memory document.
    pub fn update_from_json_str(&mut self, doc: &str) -> Result<(), TrustError> {
        self.root = self.root.update_from_json_str(doc)?;
        Ok(())
    }

    /// Applies a candidate successor from a role file named
    /// `N.TAG.root.json`, with N pinned to the successor version.
    pub fn update_from_path(&mut self, path: &Path) -> Result<(), TrustError> {
        self.root = self.root.update_from_path(path)?;
        Ok(())
    }

    /// Base URL of the repository this root governs.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Version of the currently trusted root.
    pub fn current_version(&self) -> Version {
        self.root.version()
    }

    /// Dialect of the currently trusted root.
    pub fn spec_version(&self) -> SpecVersion {
        self.root.major_spec_version()
    }

    /// Role names declared by the currently trusted root.
    pub fn roles(&self) -> BTreeSet<String> {
        self.root.roles()
    }

    /// Keyring of one declared role, or `None` for undeclared roles.
    pub fn keyring(&self, role: &str) -> Option<RoleFullKeys> {
        self.root.keys().remove(role)
    }

    /// The currently trusted root document.
    pub fn current_root(&self) -> &Root {
        &self.root
    }
}
