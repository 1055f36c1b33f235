//! Ed25519 primitives operating on raw key material, plus the file
//! digest helpers used for out-of-band artefact checks.
//!
//! Signature and key buffers are fixed-size arrays passed by value; hex
//! conversion of any of them goes through [`crate::hex`].

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use md5::Md5;
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::TrustError;
use crate::hex::{bin2hex, hex2bin_exact};

pub const ED25519_KEYSIZE_BYTES: usize = 32;
pub const ED25519_KEYSIZE_HEX: usize = 2 * ED25519_KEYSIZE_BYTES;
pub const ED25519_SIGSIZE_BYTES: usize = 64;
pub const ED25519_SIGSIZE_HEX: usize = 2 * ED25519_SIGSIZE_BYTES;
pub const SHA256_SIZE_BYTES: usize = 32;
pub const SHA256_SIZE_HEX: usize = 2 * SHA256_SIZE_BYTES;

const DIGEST_BUFSIZE: usize = 32768;

/// Generates a fresh Ed25519 keypair as raw `(public, secret)` bytes.
pub fn generate_ed25519_keypair() -> (
    [u8; ED25519_KEYSIZE_BYTES],
    [u8; ED25519_KEYSIZE_BYTES],
) {
    let signing_key = SigningKey::generate(&mut OsRng);
    (signing_key.verifying_key().to_bytes(), signing_key.to_bytes())
}

/// Signs `data` with a raw Ed25519 secret key. Ed25519 signing is
/// deterministic: the same data and key always yield the same signature.
/// The intermediate key object is wiped on drop.
pub fn sign(
    data: impl AsRef<[u8]>,
    sk: &[u8; ED25519_KEYSIZE_BYTES],
) -> [u8; ED25519_SIGSIZE_BYTES] {
    let signing_key = SigningKey::from_bytes(sk);
    signing_key.sign(data.as_ref()).to_bytes()
}

/// Verifies `sig` over `data` with a raw Ed25519 public key.
///
/// An invalid signature or an undecodable public key yields `false`;
/// this function never errors on attacker-supplied input.
pub fn verify(
    data: impl AsRef<[u8]>,
    pk: &[u8; ED25519_KEYSIZE_BYTES],
    sig: &[u8; ED25519_SIGSIZE_BYTES],
) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(pk) else {
        debug!("failed to decode raw ed25519 public key");
        return false;
    };
    key.verify(data.as_ref(), &Signature::from_bytes(sig)).is_ok()
}

/// Hex-string form of [`verify`]; decodes the key and signature first.
pub fn verify_hex(
    data: impl AsRef<[u8]>,
    pk: &str,
    signature: &str,
) -> Result<bool, TrustError> {
    let pk = decode_fixed::<ED25519_KEYSIZE_BYTES>(pk)?;
    let sig = decode_fixed::<ED25519_SIGSIZE_BYTES>(signature)?;
    Ok(verify(data, &pk, &sig))
}

/// Verifies a signature over a message that was hashed before signing,
/// as produced by GPG-style detached workflows: `hashed_data` is the
/// hex-encoded SHA-256 digest of the original message, and the signature
/// covers the 32 raw digest bytes.
pub fn verify_gpg_hashed_msg(
    hashed_data: &str,
    pk: &[u8; ED25519_KEYSIZE_BYTES],
    sig: &[u8; ED25519_SIGSIZE_BYTES],
) -> Result<bool, TrustError> {
    let msg = decode_fixed::<SHA256_SIZE_BYTES>(hashed_data)?;
    Ok(verify(msg, pk, sig))
}

/// Hex-string form of [`verify_gpg_hashed_msg`].
pub fn verify_gpg_hashed_msg_hex(
    hashed_data: &str,
    pk: &str,
    signature: &str,
) -> Result<bool, TrustError> {
    let pk = decode_fixed::<ED25519_KEYSIZE_BYTES>(pk)?;
    let sig = decode_fixed::<ED25519_SIGSIZE_BYTES>(signature)?;
    verify_gpg_hashed_msg(hashed_data, &pk, &sig)
}

fn decode_fixed<const N: usize>(hex: &str) -> Result<[u8; N], TrustError> {
    hex2bin_exact(hex).map_err(|err| {
        TrustError::Crypto(format!("conversion from hex to bin format failed: {err}"))
    })
}

/// SHA-256 digest of the file at `path`, hex-encoded.
pub fn sha256sum(path: impl AsRef<Path>) -> io::Result<String> {
    hash_file::<Sha256>(path.as_ref())
}

/// MD5 digest of the file at `path`, hex-encoded.
pub fn md5sum(path: impl AsRef<Path>) -> io::Result<String> {
    hash_file::<Md5>(path.as_ref())
}

/// Compares the file at `path` against an expected hex SHA-256 digest.
pub fn sha256(path: impl AsRef<Path>, validation: &str) -> io::Result<bool> {
    Ok(sha256sum(path)? == validation)
}

/// Compares the file at `path` against an expected hex MD5 digest.
pub fn md5(path: impl AsRef<Path>, validation: &str) -> io::Result<bool> {
    Ok(md5sum(path)? == validation)
}

/// Compares the size of the file at `path` against an expected size.
pub fn file_size(path: impl AsRef<Path>, validation: u64) -> io::Result<bool> {
    Ok(std::fs::metadata(path)?.len() == validation)
}

fn hash_file<D: Digest>(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; DIGEST_BUFSIZE];
    loop {
        let count = file.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
    }
    Ok(bin2hex(&hasher.finalize()).expect("digest fits in a hex string"))
}
