//! Root role adapter for the canonical "1.x" metadata dialect.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use serde_json::value::RawValue;
use tracing::{debug, error};

use repo_trust_common::{TrustError, Version};

use crate::role::root::Root;
use crate::role::{
    check_signatures, read_role_file, Key, RoleFullKeys, RoleKeys, RoleSignature, SignedDocument,
    SpecVersion, FILE_EXT, ROOT_TYPE,
};

/// Spec version written into documents emitted by this implementation.
pub(crate) const SPEC_VERSION: &str = "1.0.17";

const MANDATORY_ROLES: [&str; 4] = ["root", "snapshot", "targets", "timestamp"];

/// A root role document in the 1.x dialect, parsed and self-verified.
#[derive(Debug, Clone)]
pub struct RootRole {
    spec_version: String,
    version: Version,
    keys: BTreeMap<String, Key>,
    roles: BTreeMap<String, RoleKeys>,
    /// Exact source text of the `signed` sub-document.
    signed_payload: String,
    /// Signatures of the document, de-duplicated by keyid (first wins).
    signatures: Vec<RoleSignature>,
}

#[derive(Deserialize)]
struct SignedRoot {
    #[serde(rename = "_type")]
    type_: String,
    spec_version: String,
    version: Version,
    keys: BTreeMap<String, Key>,
    roles: BTreeMap<String, RoleKeys>,
}

impl RootRole {
    /// Parses a v1 root document and verifies its signatures against its
    /// own root keyring and threshold (TUF 5.3.4, arbitrary software
    /// attack).
    pub fn from_json_str(doc: &str) -> Result<Self, TrustError> {
        let role = Self::parse(doc)?;
        let root_keys = role.keys().remove(ROOT_TYPE).ok_or_else(|| {
            TrustError::RoleMetadata("missing 'root' role in keyring".into())
        })?;
        check_signatures(&role.signed_payload, &role.signatures, &root_keys)?;
        Ok(role)
    }

    /// Loads a trusted root from disk; the file name is validated but not
    /// pinned to a successor version.
    pub fn from_path(path: &Path) -> Result<Self, TrustError> {
        let doc = read_role_file(path, ROOT_TYPE, FILE_EXT, None)?;
        Self::from_json_str(&doc)
    }

    fn parse(doc: &str) -> Result<Self, TrustError> {
        let envelope = SignedDocument::from_json_str(doc)?;
        let signatures = parse_signatures(envelope.signatures)?;
        let signed: SignedRoot = serde_json::from_str(envelope.signed.get()).map_err(|err| {
            error!("invalid 'root' metadata: {err}");
            TrustError::RoleMetadata(err.to_string())
        })?;

        if signed.type_ != ROOT_TYPE {
            error!(
                "wrong '_type' found in 'root' metadata, should be 'root': '{}'",
                signed.type_
            );
            return Err(TrustError::RoleMetadata(format!(
                "wrong '_type': '{}'",
                signed.type_
            )));
        }
        if !signed.spec_version.starts_with("1.") {
            error!(
                "incompatible 'spec_version' found in 'root' metadata, should be '1.x' but is: '{}'",
                signed.spec_version
            );
            return Err(TrustError::RoleMetadata(format!(
                "incompatible 'spec_version': '{}'",
                signed.spec_version
            )));
        }
        SpecVersion::from_metadata_version(&signed.spec_version)?;
        if signed.version == 0 {
            return Err(TrustError::RoleMetadata(
                "'version' must be a positive integer".into(),
            ));
        }

        let missing: Vec<&str> = MANDATORY_ROLES
            .iter()
            .filter(|role| !signed.roles.contains_key(**role))
            .copied()
            .collect();
        if !missing.is_empty() {
            error!(
                "missing roles while loading 'root' metadata: {}",
                missing.join(", ")
            );
            return Err(TrustError::RoleMetadata(format!(
                "missing roles: {}",
                missing.join(", ")
            )));
        }
        for (name, role_keys) in &signed.roles {
            if role_keys.keyids.is_empty() {
                error!(
                    "'root' metadata should declare at least one key ID in 'keyids' for role: '{name}'"
                );
                return Err(TrustError::RoleMetadata(format!(
                    "empty 'keyids' for role: '{name}'"
                )));
            }
            if role_keys.threshold == 0 {
                error!(
                    "'root' metadata should declare at least a 'threshold' of 1 for role: '{name}'"
                );
                return Err(TrustError::RoleMetadata(format!(
                    "zero 'threshold' for role: '{name}'"
                )));
            }
            for keyid in &role_keys.keyids {
                if !signed.keys.contains_key(keyid) {
                    error!(
                        "a key ID is used in 'roles' but not declared in 'keys': '{keyid}'"
                    );
                    return Err(TrustError::RoleMetadata(format!(
                        "undeclared key ID: '{keyid}'"
                    )));
                }
            }
        }

        Ok(Self {
            spec_version: signed.spec_version,
            version: signed.version,
            keys: signed.keys,
            roles: signed.roles,
            signed_payload: envelope.signed.get().to_string(),
            signatures,
        })
    }

    /// `true` when the document declares a spec version this dialect
    /// parses. A failing lookup probes as incompatible, not as an error.
    pub fn is_spec_version_compatible(doc: &str) -> bool {
        #[derive(Deserialize)]
        struct Probe {
            signed: ProbeSigned,
        }
        #[derive(Deserialize)]
        struct ProbeSigned {
            spec_version: String,
        }
        match serde_json::from_str::<Probe>(doc) {
            Ok(probe) => probe.signed.spec_version.starts_with("1."),
            Err(err) => {
                debug!("impossible to check spec version compatibility: {err}");
                false
            }
        }
    }

    pub fn spec_version(&self) -> &str {
        &self.spec_version
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Role names declared under `roles`.
    pub fn roles(&self) -> BTreeSet<String> {
        self.roles.keys().cloned().collect()
    }

    /// Keyring view per role, each keyid resolved through `keys`.
    pub fn keys(&self) -> BTreeMap<String, RoleFullKeys> {
        self.roles
            .iter()
            .map(|(name, role_keys)| {
                let keys = role_keys
                    .keyids
                    .iter()
                    .map(|keyid| (keyid.clone(), self.keys[keyid].clone()))
                    .collect();
                (
                    name.clone(),
                    RoleFullKeys {
                        keys,
                        threshold: role_keys.threshold,
                    },
                )
            })
            .collect()
    }

    pub(crate) fn signed_payload(&self) -> &str {
        &self.signed_payload
    }

    pub(crate) fn signatures(&self) -> &[RoleSignature] {
        &self.signatures
    }

    /// Builds the successor root from a candidate document. A v1 root
    /// only accepts v1 successors.
    pub fn create_update(&self, doc: &str) -> Result<Root, TrustError> {
        if Self::is_spec_version_compatible(doc) {
            Ok(Root::V1(Self::from_json_str(doc)?))
        } else {
            error!("invalid spec version for 'root' update");
            Err(TrustError::SpecVersion(
                "expected a '1.x' metadata spec version".into(),
            ))
        }
    }
}

/// v1 signatures are an array of `{keyid, sig}` objects; duplicate keyids
/// collapse onto the first occurrence.
fn parse_signatures(raw: &RawValue) -> Result<Vec<RoleSignature>, TrustError> {
    let entries: Vec<RoleSignature> = serde_json::from_str(raw.get()).map_err(|err| {
        error!("invalid 'signatures' in 'root' metadata: {err}");
        TrustError::RoleMetadata(format!("invalid 'signatures': {err}"))
    })?;
    let mut unique: BTreeMap<String, String> = BTreeMap::new();
    for entry in entries {
        unique.entry(entry.keyid).or_insert(entry.sig);
    }
    Ok(unique
        .into_iter()
        .map(|(keyid, sig)| RoleSignature { keyid, sig })
        .collect())
}
