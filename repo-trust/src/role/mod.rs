//! In-memory model of role metadata shared by both metadata spec
//! dialects, the role-file naming rules and the threshold check.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use repo_trust_common::crypto;
use repo_trust_common::{Threshold, TrustError, Version};

pub mod root;
pub mod v06;
pub mod v1;

/// File extension of every role metadata file.
pub(crate) const FILE_EXT: &str = "json";
/// Type tag of the root role.
pub(crate) const ROOT_TYPE: &str = "root";

/// Major revisions of the metadata specification this engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecVersion {
    /// The legacy "0.6.x" dialect with the reduced `{root, key_mgr}`
    /// role set.
    V06,
    /// The canonical "1.x" dialect.
    V1,
}

impl SpecVersion {
    /// Maps a dotted spec-version string onto the dialect implementing it.
    pub fn from_metadata_version(spec_version: &str) -> Result<Self, TrustError> {
        match parse_spec_version_major(spec_version)? {
            0 => Ok(SpecVersion::V06),
            1 => Ok(SpecVersion::V1),
            _ => {
                error!("unsupported spec version: '{spec_version}'");
                Err(TrustError::SpecVersion(spec_version.to_string()))
            }
        }
    }
}

/// Checks the `MAJOR.MINOR[.PATCH]` shape and returns the major component.
fn parse_spec_version_major(spec_version: &str) -> Result<u64, TrustError> {
    let components: Vec<&str> = spec_version.split('.').collect();
    let well_formed = (2..=3).contains(&components.len())
        && components
            .iter()
            .all(|c| !c.is_empty() && c.bytes().all(|b| b.is_ascii_digit()));
    if !well_formed {
        return Err(TrustError::RoleMetadata(format!(
            "malformed spec version: '{spec_version}'"
        )));
    }
    components[0].parse().map_err(|_| {
        TrustError::RoleMetadata(format!("malformed spec version: '{spec_version}'"))
    })
}

/// A public key as declared inside root metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub keytype: String,
    pub scheme: String,
    /// Raw public key, hex-encoded.
    pub keyval: String,
}

impl Key {
    /// Key record of a v0.6 delegation, where the hex public key acts as
    /// its own keyid.
    pub fn from_ed25519(keyval: impl Into<String>) -> Self {
        Self {
            keytype: "ed25519".into(),
            scheme: "ed25519".into(),
            keyval: keyval.into(),
        }
    }
}

/// Role-to-key binding in the v1 shape: keyids resolved through the
/// document's `keys` dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<String>,
    pub threshold: Threshold,
}

/// Role-to-key binding in the v0.6 shape: raw hex public keys acting as
/// their own keyids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePubKeys {
    pub pubkeys: Vec<String>,
    pub threshold: Threshold,
}

impl RolePubKeys {
    pub fn to_role_keys(&self) -> RoleKeys {
        RoleKeys {
            keyids: self.pubkeys.clone(),
            threshold: self.threshold,
        }
    }
}

/// Keyring view used during verification: full key records by keyid plus
/// the signing threshold. Derived from a parsed role, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleFullKeys {
    pub keys: BTreeMap<String, Key>,
    pub threshold: Threshold,
}

/// One `(keyid, signature)` entry of a metadata document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleSignature {
    pub keyid: String,
    /// Hex-encoded Ed25519 signature.
    pub sig: String,
}

/// Top-level shape shared by both dialects. `signed` keeps the exact
/// source bytes of the sub-document, which is what signatures cover;
/// the payload is never re-serialised before verification.
#[derive(Deserialize)]
pub(crate) struct SignedDocument<'a> {
    #[serde(borrow)]
    pub signed: &'a serde_json::value::RawValue,
    #[serde(borrow)]
    pub signatures: &'a serde_json::value::RawValue,
}

impl<'a> SignedDocument<'a> {
    pub fn from_json_str(doc: &'a str) -> Result<Self, TrustError> {
        serde_json::from_str(doc).map_err(|err| {
            error!("invalid metadata envelope: {err}");
            TrustError::RoleMetadata(format!("invalid metadata envelope: {err}"))
        })
    }
}

/// Counts valid signatures over `signed_data` against a keyring and its
/// threshold. Signatures by unknown keyids and invalid signatures by
/// known keys are logged and skipped, not errored; counting stops once
/// the threshold is met.
pub(crate) fn check_signatures(
    signed_data: &str,
    signatures: &[RoleSignature],
    keyring: &RoleFullKeys,
) -> Result<(), TrustError> {
    let mut valid_sig: u64 = 0;
    for s in signatures {
        if let Some(key) = keyring.keys.get(&s.keyid) {
            match crypto::verify_hex(signed_data, &key.keyval, &s.sig) {
                Ok(true) => valid_sig += 1,
                Ok(false) => {
                    warn!("invalid signature of 'root' metadata for keyid: {}", s.keyid)
                }
                Err(err) => {
                    warn!("unusable signature material for keyid {}: {err}", s.keyid)
                }
            }
        } else {
            warn!("unknown keyid: {}", s.keyid);
        }
        if valid_sig >= keyring.threshold {
            break;
        }
    }
    if valid_sig < keyring.threshold {
        error!(
            "threshold of valid signatures defined in 'root' metadata is not met ({valid_sig}/{})",
            keyring.threshold
        );
        return Err(TrustError::ThresholdNotReached {
            valid: valid_sig,
            threshold: keyring.threshold,
        });
    }
    Ok(())
}

fn update_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([1-9]\d*)\.\w+\.(\w+)\.(\w+)$").expect("valid regex"))
}

fn initial_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\w+\.(\w+)\.(\w+)$").expect("valid regex"))
}

/// Reads a role metadata file, enforcing the `VERSION.TAG.ROLE.EXT`
/// naming rule. Update loads pin the version embedded in the file name to
/// `expected_version`; this is a pre-filter, the cryptographic checks
/// still run on the content afterwards.
pub(crate) fn read_role_file(
    path: &Path,
    role_type: &str,
    file_ext: &str,
    expected_version: Option<Version>,
) -> Result<String, TrustError> {
    if !path.exists() {
        error!("file not found for '{role_type}' update: {}", path.display());
        return Err(TrustError::RoleFile(format!(
            "no such file: {}",
            path.display()
        )));
    }
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            TrustError::RoleFile(format!("unreadable file name: {}", path.display()))
        })?;

    let (f_version, f_type, f_ext) = if expected_version.is_some() {
        let captures = update_name_re().captures(file_name).ok_or_else(|| {
            error!("invalid file name for '{role_type}' metadata update: {file_name}");
            TrustError::RoleFile(format!("invalid file name: {file_name}"))
        })?;
        (
            Some(captures[1].to_string()),
            captures[2].to_string(),
            captures[3].to_string(),
        )
    } else {
        let captures = initial_name_re().captures(file_name).ok_or_else(|| {
            error!("invalid file name for '{role_type}' metadata: {file_name}");
            TrustError::RoleFile(format!("invalid file name: {file_name}"))
        })?;
        (None, captures[1].to_string(), captures[2].to_string())
    };

    if f_ext != file_ext {
        error!("'{role_type}' metadata file should have '{file_ext}' extension, not: '{f_ext}'");
        return Err(TrustError::RoleFile(format!(
            "wrong extension: '{f_ext}'"
        )));
    }
    if f_type != role_type {
        error!("'{role_type}' metadata file should have '{role_type}' type, not: '{f_type}'");
        return Err(TrustError::RoleFile(format!("wrong role type: '{f_type}'")));
    }
    if let Some(expected) = expected_version {
        let f_version: Version = f_version
            .expect("update name pattern captures a version")
            .parse()
            .map_err(|_| {
                error!("invalid version in file name for '{role_type}' metadata update");
                TrustError::RoleFile(format!("invalid version in file name: {file_name}"))
            })?;
        if f_version != expected {
            error!(
                "'{role_type}' metadata file name should start with N+1 version ({expected}), but starts with: {f_version}"
            );
            return Err(TrustError::RoleFile(format!(
                "file name version {f_version} does not match expected successor version {expected}"
            )));
        }
    }

    fs::read_to_string(path).map_err(|err| {
        TrustError::RoleFile(format!("failed to read {}: {err}", path.display()))
    })
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;

    #[test]
    fn test_spec_version_mapping() {
        assert_eq!(
            SpecVersion::from_metadata_version("0.6.0").unwrap(),
            SpecVersion::V06
        );
        assert_eq!(
            SpecVersion::from_metadata_version("1.0.17").unwrap(),
            SpecVersion::V1
        );
        assert_eq!(
            SpecVersion::from_metadata_version("1.30").unwrap(),
            SpecVersion::V1
        );
        assert!(matches!(
            SpecVersion::from_metadata_version("2.0.0"),
            Err(TrustError::SpecVersion(_))
        ));
        for malformed in ["", "1", "1.", ".6", "1.0.17.3", "one.two", "1.0-beta"] {
            assert!(
                matches!(
                    SpecVersion::from_metadata_version(malformed),
                    Err(TrustError::RoleMetadata(_))
                ),
                "accepted malformed spec version {malformed:?}"
            );
        }
    }

    #[test]
    fn test_role_pub_keys_projection() {
        let pub_keys = RolePubKeys {
            pubkeys: vec!["aa".into(), "bb".into()],
            threshold: 2,
        };
        let role_keys = pub_keys.to_role_keys();
        assert_eq!(role_keys.keyids, vec!["aa".to_string(), "bb".to_string()]);
        assert_eq!(role_keys.threshold, 2);
    }

    fn write_role_file(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, "{}").unwrap();
        path
    }

    #[test]
    fn test_read_role_file_initial_names() {
        let dir = tempfile::tempdir().unwrap();
        let ok = write_role_file(&dir, "1.sv06.root.json");
        assert!(read_role_file(&ok, ROOT_TYPE, FILE_EXT, None).is_ok());

        for bad in ["root.json", "1.root.json", "1.sv1.root.yaml", "1.sv1.targets.json"] {
            let path = write_role_file(&dir, bad);
            assert!(
                matches!(
                    read_role_file(&path, ROOT_TYPE, FILE_EXT, None),
                    Err(TrustError::RoleFile(_))
                ),
                "accepted bad initial file name {bad:?}"
            );
        }
    }

    #[test]
    fn test_read_role_file_update_names() {
        let dir = tempfile::tempdir().unwrap();
        let ok = write_role_file(&dir, "2.sv1.root.json");
        assert!(read_role_file(&ok, ROOT_TYPE, FILE_EXT, Some(2)).is_ok());

        // Version in the name must equal the expected successor version.
        assert!(matches!(
            read_role_file(&ok, ROOT_TYPE, FILE_EXT, Some(3)),
            Err(TrustError::RoleFile(_))
        ));
        // No leading zero, no version-less names.
        for bad in ["02.sv1.root.json", "0.sv1.root.json", "sv1.root.json"] {
            let path = write_role_file(&dir, bad);
            assert!(
                matches!(
                    read_role_file(&path, ROOT_TYPE, FILE_EXT, Some(2)),
                    Err(TrustError::RoleFile(_))
                ),
                "accepted bad update file name {bad:?}"
            );
        }
    }

    #[test]
    fn test_read_role_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("2.sv1.root.json");
        assert!(matches!(
            read_role_file(&missing, ROOT_TYPE, FILE_EXT, Some(2)),
            Err(TrustError::RoleFile(_))
        ));
    }
}
