//! VeWorld wallet core
//!
//! Local key-material lifecycle and the transaction pipeline of a VeChain
//! wallet:
//! - Encrypted secret storage gated by a user credential
//! - BIP-39 / BIP-32 derivation on `m/44'/818'/0'/0`
//! - VeChain and EIP-191 message signing, certificates, EIP-712
//! - Fee delegation (VIP-191) and broadcast to a Thor node
//!
//! # Security Model
//!
//! - Private keys only exist inside [`wallet::LocalSigner`] and zeroizing buffers
//! - Secrets are encrypted before reaching any storage backend
//! - Nothing secret is logged or printed by `Debug`

pub mod config;
pub mod signing;
pub mod storage;
pub mod transaction;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use config::{Config, Network, NodeEndpoints};
pub use error::{Error, Result};
pub use signing::Chain;
pub use storage::{EncryptedStore, SecureStorage};
pub use transaction::{DelegationOption, SignedTransaction, TransactionBody, TransactionPipeline};
pub use wallet::{Device, LocalSigner};
