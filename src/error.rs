//! Error types for the wallet core
//!
//! Messages never carry secret material (mnemonics, private keys,
//! decrypted payloads or credentials).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Signer recovery failed: {0}")]
    RecoveryFailed(String),

    #[error("Sponsorship rejected: {0}")]
    SponsorshipRejected(String),

    #[error("Sponsor unreachable: {0}")]
    SponsorshipUnreachable(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transaction rejected by node (HTTP {status}): {reason}")]
    BroadcastRejected { status: u16, reason: String },

    #[error("Node unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid keystore: {0}")]
    InvalidKeystore(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Network-class failures the caller may retry. Cryptographic and
    /// input errors never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SponsorshipUnreachable(_) | Error::Timeout(_) | Error::NetworkUnreachable(_)
        )
    }

    /// Whether the UI should re-prompt for a credential or user presence.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::AuthenticationFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
