//! Dialect dispatch for the trusted root and the root-update state
//! machine.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::error;

use repo_trust_common::{TrustError, Version};

use crate::role::{
    check_signatures, read_role_file, v06, v1, RoleFullKeys, RoleSignature, SpecVersion,
    FILE_EXT, ROOT_TYPE,
};

/// A trusted (or candidate) root role, polymorphic over the metadata
/// spec dialect it is written in.
///
/// The only cross-dialect edge is the upgrade path: a v0.6 root may
/// produce a v1 successor, so successor construction always returns this
/// sum rather than recursing within one dialect.
#[derive(Debug, Clone)]
pub enum Root {
    V06(v06::RootRole),
    V1(v1::RootRole),
}

impl Root {
    /// Loads a trusted root from disk, probing which dialect claims the
    /// document.
    pub fn from_path(path: &Path) -> Result<Self, TrustError> {
        let doc = read_role_file(path, ROOT_TYPE, FILE_EXT, None)?;
        Self::from_json_str(&doc)
    }

    /// Probes the compatibility predicates of both dialects and parses
    /// with the one that recognises the document.
    pub fn from_json_str(doc: &str) -> Result<Self, TrustError> {
        if v06::RootRole::is_spec_version_compatible(doc) {
            Ok(Root::V06(v06::RootRole::from_json_str(doc)?))
        } else if v1::RootRole::is_spec_version_compatible(doc) {
            Ok(Root::V1(v1::RootRole::from_json_str(doc)?))
        } else {
            error!("metadata spec version not supported by any known dialect");
            Err(TrustError::SpecVersion(
                "no known dialect recognises the document".into(),
            ))
        }
    }

    /// The dotted spec-version string the document declares.
    pub fn spec_version(&self) -> &str {
        match self {
            Root::V06(role) => role.spec_version(),
            Root::V1(role) => role.spec_version(),
        }
    }

    /// The dialect implementing the current root.
    pub fn major_spec_version(&self) -> SpecVersion {
        match self {
            Root::V06(_) => SpecVersion::V06,
            Root::V1(_) => SpecVersion::V1,
        }
    }

    /// `true` when `other` names the same dialect major as this root.
    pub fn is_spec_version_compatible(&self, other: &str) -> Result<bool, TrustError> {
        Ok(SpecVersion::from_metadata_version(other)? == self.major_spec_version())
    }

    /// `true` when `other` names the dialect one major ahead of this root.
    pub fn is_spec_version_upgradable(&self, other: &str) -> Result<bool, TrustError> {
        Ok(matches!(
            (
                self.major_spec_version(),
                SpecVersion::from_metadata_version(other)?,
            ),
            (SpecVersion::V06, SpecVersion::V1)
        ))
    }

    pub fn version(&self) -> Version {
        match self {
            Root::V06(role) => role.version(),
            Root::V1(role) => role.version(),
        }
    }

    /// Role names declared by the document.
    pub fn roles(&self) -> BTreeSet<String> {
        match self {
            Root::V06(role) => role.roles(),
            Root::V1(role) => role.roles(),
        }
    }

    /// Keyring views per declared role.
    pub fn keys(&self) -> BTreeMap<String, RoleFullKeys> {
        match self {
            Root::V06(role) => role.keys(),
            Root::V1(role) => role.keys(),
        }
    }

    pub(crate) fn signed_payload(&self) -> &str {
        match self {
            Root::V06(role) => role.signed_payload(),
            Root::V1(role) => role.signed_payload(),
        }
    }

    pub(crate) fn signatures(&self) -> &[RoleSignature] {
        match self {
            Root::V06(role) => role.signatures(),
            Root::V1(role) => role.signatures(),
        }
    }

    fn create_update(&self, doc: &str) -> Result<Root, TrustError> {
        match self {
            Root::V06(role) => role.create_update(doc),
            Root::V1(role) => role.create_update(doc),
        }
    }

    /// Validates a candidate successor and returns it on success.
    ///
    /// The candidate must satisfy its own declared root threshold
    /// (checked while constructing it), the threshold of the currently
    /// trusted root, and carry version N+1 exactly. On any error the
    /// current root remains the trusted one.
    pub fn update_from_json_str(&self, doc: &str) -> Result<Root, TrustError> {
        // TUF 5.3.4, arbitrary software attack: the constructor verified
        // the candidate against its own keyids and threshold.
        let root_update = self.create_update(doc)?;

        // The same signatures must also satisfy the currently trusted
        // keyids and threshold.
        self.check_role_signatures(&root_update)?;

        // TUF 5.3.5, rollback attack: the version number has to be N+1.
        let current = self.version();
        let candidate = root_update.version();
        if candidate != current + 1 {
            if candidate > current + 1 {
                error!("invalid 'root' metadata version, should be exactly N+1");
                return Err(TrustError::RoleMetadata(format!(
                    "candidate version {candidate} skips ahead of trusted version {current}, should be exactly N+1"
                )));
            }
            error!("possible rollback attack of 'root' metadata");
            return Err(TrustError::Rollback { current, candidate });
        }

        Ok(root_update)
    }

    /// Filename-pinned variant: `path` must be named `N.TAG.root.json`
    /// with N equal to the successor version. The name check is a
    /// pre-filter; the content still goes through every cryptographic
    /// check.
    pub fn update_from_path(&self, path: &Path) -> Result<Root, TrustError> {
        let doc = read_role_file(path, ROOT_TYPE, FILE_EXT, Some(self.version() + 1))?;
        self.update_from_json_str(&doc)
    }

    fn check_role_signatures(&self, candidate: &Root) -> Result<(), TrustError> {
        let root_keys = self.keys().remove(ROOT_TYPE).ok_or_else(|| {
            TrustError::RoleMetadata("trusted root does not declare a 'root' keyring".into())
        })?;
        check_signatures(candidate.signed_payload(), candidate.signatures(), &root_keys)
    }
}
