use thiserror::Error;

/// Failure kinds raised while loading or updating trust metadata.
///
/// Every verification failure leaves the previously trusted state
/// untouched; callers may retry with a different candidate.
#[derive(Error, Debug)]
pub enum TrustError {
    /// Fewer valid signatures than the threshold requires, either against
    /// a document's own keys or against the currently trusted keys.
    #[error("signatures threshold not met ({valid}/{threshold})")]
    ThresholdNotReached { valid: u64, threshold: u64 },

    /// Malformed document shape, a missing required field, a wrong role
    /// set, a dangling keyid or a version jump larger than one.
    #[error("invalid role metadata: {0}")]
    RoleMetadata(String),

    /// Candidate version is not ahead of the trusted version.
    #[error("possible rollback attack of 'root' metadata: candidate version {candidate} <= trusted version {current}")]
    Rollback { current: u64, candidate: u64 },

    /// Missing file, a file name violating the naming rules, or a file
    /// name carrying the wrong successor version.
    #[error("invalid role file: {0}")]
    RoleFile(String),

    /// The document declares a metadata spec version no dialect supports,
    /// or one the current root cannot transition to.
    #[error("unsupported metadata spec version: {0}")]
    SpecVersion(String),

    /// Failure of an underlying hex or Ed25519 primitive. An invalid
    /// signature is not a crypto error; it surfaces as
    /// [`TrustError::ThresholdNotReached`] after counting.
    #[error("cryptography error: {0}")]
    Crypto(String),
}

/// Errors of the binary/hexadecimal codec.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexError {
    /// Input too large, or the output buffer cannot hold two characters
    /// per input byte.
    #[error("invalid size for binary to hexadecimal conversion")]
    SizeOverflow,

    /// The output buffer filled up before the hex input was exhausted.
    #[error("output capacity exceeded during hexadecimal decoding")]
    CapacityExceeded,

    /// Decoding stopped on an odd nibble count or on unexpected content;
    /// the offset points at the offending input position.
    #[error("invalid hexadecimal input at offset {0}")]
    InvalidHex(usize),
}
