//! Root role adapter for the legacy "0.6.x" metadata dialect, including
//! the emitters used to derive a "1.x" equivalent from a trusted legacy
//! root.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{json, Value};
use tracing::{debug, error};

use repo_trust_common::crypto;
use repo_trust_common::hex::bin2hex;
use repo_trust_common::{TrustError, Version};

use crate::role::root::Root;
use crate::role::{
    check_signatures, read_role_file, v1, Key, RoleFullKeys, RoleKeys, RolePubKeys,
    RoleSignature, SignedDocument, SpecVersion, FILE_EXT, ROOT_TYPE,
};

const KEY_MGR: &str = "key_mgr";
const MANDATORY_DELEGATIONS: [&str; 2] = [ROOT_TYPE, KEY_MGR];

/// A root role document in the 0.6.x dialect, parsed and self-verified.
#[derive(Debug, Clone)]
pub struct RootRole {
    spec_version: String,
    version: Version,
    delegations: BTreeMap<String, RolePubKeys>,
    /// Exact source text of the `signed` sub-document.
    signed_payload: String,
    signatures: Vec<RoleSignature>,
}

#[derive(Deserialize)]
struct SignedRoot {
    #[serde(rename = "type")]
    type_: String,
    metadata_spec_version: String,
    version: Version,
    delegations: BTreeMap<String, RolePubKeys>,
}

/// Per-keyid signature record of the v0.6 shape; fields besides
/// `signature` are tolerated.
#[derive(Deserialize)]
struct SignatureEntry {
    signature: String,
}

impl RootRole {
    /// Parses a v0.6 root document and verifies its signatures against
    /// its own root delegation and threshold (TUF 5.3.4).
    pub fn from_json_str(doc: &str) -> Result<Self, TrustError> {
        let role = Self::parse(doc)?;
        let root_keys = role.keys().remove(ROOT_TYPE).ok_or_else(|| {
            TrustError::RoleMetadata("missing 'root' delegation in keyring".into())
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
                "wrong 'type' found in 'root' metadata, should be 'root': '{}'",
                signed.type_
            );
            return Err(TrustError::RoleMetadata(format!(
                "wrong 'type': '{}'",
                signed.type_
            )));
        }
        if !signed.metadata_spec_version.starts_with("0.6.") {
            error!(
                "incompatible 'metadata_spec_version' found in 'root' metadata, should be '0.6.x' but is: '{}'",
                signed.metadata_spec_version
            );
            return Err(TrustError::RoleMetadata(format!(
                "incompatible 'metadata_spec_version': '{}'",
                signed.metadata_spec_version
            )));
        }
        SpecVersion::from_metadata_version(&signed.metadata_spec_version)?;
        if signed.version == 0 {
            return Err(TrustError::RoleMetadata(
                "'version' must be a positive integer".into(),
            ));
        }

        for (name, delegation) in &signed.delegations {
            if delegation.pubkeys.is_empty() {
                error!(
                    "'root' metadata should declare at least one public key in 'pubkeys' for delegation: '{name}'"
                );
                return Err(TrustError::RoleMetadata(format!(
                    "empty 'pubkeys' for delegation: '{name}'"
                )));
            }
            if delegation.threshold == 0 {
                error!(
                    "'root' metadata should declare at least a 'threshold' of 1 for delegation: '{name}'"
                );
                return Err(TrustError::RoleMetadata(format!(
                    "zero 'threshold' for delegation: '{name}'"
                )));
            }
        }
        let current: BTreeSet<&str> = signed.delegations.keys().map(String::as_str).collect();
        if current != BTreeSet::from(MANDATORY_DELEGATIONS) {
            error!("invalid delegations in 'root' metadata");
            return Err(TrustError::RoleMetadata(
                "delegations must be exactly 'root' and 'key_mgr'".into(),
            ));
        }

        Ok(Self {
            spec_version: signed.metadata_spec_version,
            version: signed.version,
            delegations: signed.delegations,
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
            metadata_spec_version: String,
        }
        match serde_json::from_str::<Probe>(doc) {
            Ok(probe) => probe.signed.metadata_spec_version.starts_with("0.6."),
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

    /// Delegation names, always exactly `{root, key_mgr}`.
    pub fn roles(&self) -> BTreeSet<String> {
        self.delegations.keys().cloned().collect()
    }

    /// Keyring view per delegation: each hex public key synthesised into
    /// a full Ed25519 key record keyed by itself.
    pub fn keys(&self) -> BTreeMap<String, RoleFullKeys> {
        self.delegations
            .iter()
            .map(|(name, delegation)| {
                let keys = delegation
                    .pubkeys
                    .iter()
                    .map(|pubkey| (pubkey.clone(), Key::from_ed25519(pubkey.clone())))
                    .collect();
                (
                    name.clone(),
                    RoleFullKeys {
                        keys,
                        threshold: delegation.threshold,
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

    /// Builds the successor root from a candidate document. A v0.6 root
    /// accepts a v0.6 successor or a v1 successor; the latter upgrades
    /// the trusted dialect.
    pub fn create_update(&self, doc: &str) -> Result<Root, TrustError> {
        if Self::is_spec_version_compatible(doc) {
            Ok(Root::V06(Self::from_json_str(doc)?))
        } else if v1::RootRole::is_spec_version_compatible(doc) {
            debug!("updating 'root' role spec version");
            Ok(Root::V1(v1::RootRole::from_json_str(doc)?))
        } else {
            error!("invalid spec version for 'root' update");
            Err(TrustError::SpecVersion(
                "expected a '0.6.x' or '1.x' metadata spec version".into(),
            ))
        }
    }

    /// Emits the v1-shaped `signed` document equivalent to this root: the
    /// `root` delegation carries over, `key_mgr` becomes `targets`, and
    /// `snapshot`/`timestamp` are declared with empty keyid lists and
    /// threshold 1, to be populated by a later root.
    pub fn upgraded_signable(&self) -> Value {
        let all_keys = self.keys();
        let mut keys: BTreeMap<String, Key> = all_keys[ROOT_TYPE].keys.clone();
        keys.extend(all_keys[KEY_MGR].keys.clone());

        json!({
            "_type": "root",
            "keys": keys,
            "roles": {
                "root": self.delegations[ROOT_TYPE].to_role_keys(),
                "targets": self.delegations[KEY_MGR].to_role_keys(),
                "snapshot": RoleKeys { keyids: vec![], threshold: 1 },
                "timestamp": RoleKeys { keyids: vec![], threshold: 1 },
            },
            "spec_version": v1::SPEC_VERSION,
            "version": self.version,
        })
    }

    /// Signs an upgraded signable with the supplied raw secret key and
    /// returns the signature entry, keyed by the hex public key.
    pub fn upgraded_signature(
        &self,
        signed: &Value,
        pk: &str,
        sk: &[u8; crypto::ED25519_KEYSIZE_BYTES],
    ) -> Result<RoleSignature, TrustError> {
        let sig = crypto::sign(signed.to_string(), sk);
        Ok(RoleSignature {
            keyid: pk.to_string(),
            sig: bin2hex(&sig).map_err(|err| TrustError::Crypto(err.to_string()))?,
        })
    }
}

/// v0.6 signatures are a map keyed by keyid; map semantics de-duplicate
/// inherently.
fn parse_signatures(raw: &RawValue) -> Result<Vec<RoleSignature>, TrustError> {
    let entries: BTreeMap<String, SignatureEntry> =
        serde_json::from_str(raw.get()).map_err(|err| {
            error!("invalid 'signatures' in 'root' metadata: {err}");
            TrustError::RoleMetadata(format!("invalid 'signatures': {err}"))
        })?;
    Ok(entries
        .into_iter()
        .map(|(keyid, entry)| RoleSignature {
            keyid,
            sig: entry.signature,
        })
        .collect())
}

#[cfg(test)]
mod test {
    use repo_trust_common::crypto::{generate_ed25519_keypair, sign, verify_hex};
    use repo_trust_common::hex::bin2hex;

    use super::*;

    struct TestKey {
        pk_hex: String,
        sk: [u8; 32],
    }

    fn gen_key() -> TestKey {
        let (pk, sk) = generate_ed25519_keypair();
        TestKey {
            pk_hex: bin2hex(&pk).unwrap(),
            sk,
        }
    }

    fn signed_root(version: u64, root_keys: &[&TestKey], key_mgr_keys: &[&TestKey]) -> String {
        let pubkeys = |keys: &[&TestKey]| {
            keys.iter()
                .map(|key| format!(r#""{}""#, key.pk_hex))
                .collect::<Vec<_>>()
                .join(",")
        };
        format!(
            concat!(
                r#"{{"delegations":{{"key_mgr":{{"pubkeys":[{mgr}],"threshold":1}},"#,
                r#""root":{{"pubkeys":[{root}],"threshold":1}}}},"#,
                r#""metadata_spec_version":"0.6.0","type":"root","version":{version}}}"#
            ),
            mgr = pubkeys(key_mgr_keys),
            root = pubkeys(root_keys),
            version = version,
        )
    }

    fn envelope(signed: &str, signers: &[&TestKey]) -> String {
        let signatures = signers
            .iter()
            .map(|key| {
                let sig = bin2hex(&sign(signed, &key.sk)).unwrap();
                format!(r#""{}":{{"signature":"{sig}"}}"#, key.pk_hex)
            })
            .collect::<Vec<_>>()
            .join(",");
        format!(r#"{{"signed":{signed},"signatures":{{{signatures}}}}}"#)
    }

    #[test]
    fn test_parse_valid_root() {
        let root_key = gen_key();
        let mgr_key = gen_key();
        let doc = envelope(&signed_root(1, &[&root_key], &[&mgr_key]), &[&root_key]);
        let root = RootRole::from_json_str(&doc).expect("failed to parse valid root");
        assert_eq!(root.version(), 1);
        assert_eq!(root.spec_version(), "0.6.0");
        assert_eq!(
            root.roles(),
            ["key_mgr", "root"].map(String::from).into_iter().collect()
        );
        let keyring = root.keys().remove("root").unwrap();
        assert_eq!(
            keyring.keys[&root_key.pk_hex],
            Key::from_ed25519(root_key.pk_hex.clone())
        );
    }

    #[test]
    fn test_self_threshold_not_met() {
        let root_key = gen_key();
        let mgr_key = gen_key();
        // Signed only by the key manager key, which is not a root key.
        let doc = envelope(&signed_root(1, &[&root_key], &[&mgr_key]), &[&mgr_key]);
        assert!(matches!(
            RootRole::from_json_str(&doc),
            Err(TrustError::ThresholdNotReached { .. })
        ));
    }

    #[test]
    fn test_role_set_must_be_exact() {
        let root_key = gen_key();
        let mgr_key = gen_key();
        let signed = signed_root(1, &[&root_key], &[&mgr_key]).replace("key_mgr", "targets");
        let doc = envelope(&signed, &[&root_key]);
        assert!(matches!(
            RootRole::from_json_str(&doc),
            Err(TrustError::RoleMetadata(_))
        ));
    }

    #[test]
    fn test_wrong_type_tag() {
        let root_key = gen_key();
        let mgr_key = gen_key();
        let signed = signed_root(1, &[&root_key], &[&mgr_key])
            .replace(r#""type":"root""#, r#""type":"key_mgr""#);
        let doc = envelope(&signed, &[&root_key]);
        assert!(matches!(
            RootRole::from_json_str(&doc),
            Err(TrustError::RoleMetadata(_))
        ));
    }

    #[test]
    fn test_spec_version_probe() {
        let root_key = gen_key();
        let mgr_key = gen_key();
        let doc = envelope(&signed_root(1, &[&root_key], &[&mgr_key]), &[&root_key]);
        assert!(RootRole::is_spec_version_compatible(&doc));
        assert!(!RootRole::is_spec_version_compatible(
            &doc.replace(r#""metadata_spec_version":"0.6.0""#, r#""metadata_spec_version":"0.7.0""#)
        ));
        assert!(!RootRole::is_spec_version_compatible(r#"{"signed":{}}"#));
    }

    #[test]
    fn test_upgraded_signable_is_wellformed_v1() {
        let root_key = gen_key();
        let mgr_key = gen_key();
        let doc = envelope(&signed_root(3, &[&root_key], &[&mgr_key]), &[&root_key]);
        let root = RootRole::from_json_str(&doc).unwrap();

        let signable = root.upgraded_signable();
        assert_eq!(signable["_type"], "root");
        assert_eq!(signable["version"], 3);
        assert_eq!(signable["spec_version"], "1.0.17");
        assert_eq!(
            signable["roles"]["root"]["keyids"][0],
            root_key.pk_hex.as_str()
        );
        assert_eq!(
            signable["roles"]["targets"]["keyids"][0],
            mgr_key.pk_hex.as_str()
        );
        assert_eq!(signable["roles"]["snapshot"]["threshold"], 1);
        assert!(signable["roles"]["snapshot"]["keyids"]
            .as_array()
            .unwrap()
            .is_empty());
        // Every keyid referenced in roles resolves in the emitted keys.
        for role in ["root", "targets"] {
            for keyid in signable["roles"][role]["keyids"].as_array().unwrap() {
                assert!(!signable["keys"][keyid.as_str().unwrap()].is_null());
            }
        }
    }

    #[test]
    fn test_upgraded_signature_verifies() {
        let root_key = gen_key();
        let mgr_key = gen_key();
        let doc = envelope(&signed_root(1, &[&root_key], &[&mgr_key]), &[&root_key]);
        let root = RootRole::from_json_str(&doc).unwrap();

        let signable = root.upgraded_signable();
        let signature = root
            .upgraded_signature(&signable, &root_key.pk_hex, &root_key.sk)
            .unwrap();
        assert_eq!(signature.keyid, root_key.pk_hex);
        assert!(verify_hex(
            signable.to_string(),
            &root_key.pk_hex,
            &signature.sig
        )
        .unwrap());
    }

}
