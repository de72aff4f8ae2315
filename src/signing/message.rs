//! Chain-framed personal message signing

use super::blake2b256;
use crate::wallet::{recover_address, LocalSigner, SIGNATURE_LENGTH};
use crate::{Error, Result};
use alloy::primitives::{hex, keccak256, Address, B256};
use serde::{Deserialize, Serialize};

const VECHAIN_PREFIX: &str = "\x19VeChain Signed Message:\n";
const ETHEREUM_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Message framing (prefix and hash function)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// blake2b-256 with the VeChain prefix
    #[default]
    Vechain,
    /// keccak-256 with the Ethereum prefix (EIP-191)
    Eip155,
}

/// Hash `message` with the chain's prefix and decimal byte length.
pub fn hash_message(message: &[u8], chain: Chain) -> B256 {
    let length = message.len().to_string();
    match chain {
        Chain::Vechain => blake2b256(&[VECHAIN_PREFIX.as_bytes(), length.as_bytes(), message]),
        Chain::Eip155 => {
            let mut framed =
                Vec::with_capacity(ETHEREUM_PREFIX.len() + length.len() + message.len());
            framed.extend_from_slice(ETHEREUM_PREFIX.as_bytes());
            framed.extend_from_slice(length.as_bytes());
            framed.extend_from_slice(message);
            keccak256(&framed)
        }
    }
}

/// Sign a 32-byte hash with a raw private key.
pub fn sign(hash: &B256, private_key: &[u8; 32]) -> Result<[u8; SIGNATURE_LENGTH]> {
    LocalSigner::from_bytes(private_key)?.sign_hash(hash)
}

/// Frame, hash and sign a message.
pub fn sign_message(
    message: &[u8],
    chain: Chain,
    signer: &LocalSigner,
) -> Result<[u8; SIGNATURE_LENGTH]> {
    signer.sign_hash(&hash_message(message, chain))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverRequest {
    pub message: String,
    /// 65-byte signature, `0x` hex
    pub signature: String,
    #[serde(default)]
    pub chain: Chain,
}

/// Recover the address that signed `request.message`.
pub fn recover(request: &RecoverRequest) -> Result<Address> {
    let signature = hex::decode(&request.signature)
        .map_err(|e| Error::InvalidSignature(format!("not hex: {}", e)))?;
    let hash = hash_message(request.message.as_bytes(), request.chain);
    recover_address(&hash, &signature)
}
