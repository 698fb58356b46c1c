//! Error types for the referendum protocol

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReferendumError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferendumError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found")]
    NotFound,

    #[error("Already voted")]
    AlreadyVoted,

    #[error("Voting ended")]
    VotingEnded,

    #[error("Voting not ended")]
    VotingNotEnded,

    #[error("Invalid input proof")]
    InvalidProof,

    #[error("Not allowed for decryption: {0}")]
    Acl(String),

    #[error("Relayer is unavailable: {0}")]
    RelayerUnavailable(String),

    #[error("Relayer error: {status} - {body}")]
    Relayer { status: u16, body: String },

    #[error("Decryption timeout ({}s)", .0.as_secs())]
    Timeout(Duration),

    #[error("Malformed decryption response: {0}")]
    Decode(String),

    #[error("Encryption context is not initialized")]
    NotInitialized,

    #[error("Encryption context failed to initialize: {0}")]
    InitializationFailed(String),

    #[error("Invalid key size: {0} bits (must be at least 512)")]
    InvalidKeySize(u64),

    #[error("Plaintext too large: max is {max}")]
    PlaintextTooLarge { max: u64 },

    #[error("Failed to compute modular inverse")]
    ModularInverseError,

    #[error("Failed to solve discrete logarithm: {0}")]
    DiscreteLogError(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),
}

impl ReferendumError {
    /// Whether a caller may reasonably retry the failed call later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReferendumError::Timeout(_)
                | ReferendumError::RelayerUnavailable(_)
                | ReferendumError::Relayer { .. }
        )
    }
}
