//! Local secp256k1 signer
//!
//! SECURITY: private keys live only inside [`LocalSigner`].
//! - Held in alloy's PrivateKeySigner, never serialized
//! - Debug output is redacted
//! - Never logged

use crate::{Error, Result};
use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::{Signature, SignerSync};

/// Length of a VeChain signature: r(32) || s(32) || v(1)
pub const SIGNATURE_LENGTH: usize = 65;

/// Signer over one private key
pub struct LocalSigner {
    signer: PrivateKeySigner,
    address: Address,
}

impl LocalSigner {
    /// Create a signer from a hex-encoded private key (`0x` optional)
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let key_hex = key_hex
            .strip_prefix("0x")
            .or_else(|| key_hex.strip_prefix("0X"))
            .unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|_| Error::InvalidKey("not a valid secp256k1 private key".into()))?;
        Ok(Self::from_signer(signer))
    }

    pub fn from_bytes(key: &[u8; 32]) -> Result<Self> {
        let signer = PrivateKeySigner::from_slice(key)
            .map_err(|_| Error::InvalidKey("not a valid secp256k1 private key".into()))?;
        Ok(Self::from_signer(signer))
    }

    fn from_signer(signer: PrivateKeySigner) -> Self {
        let address = signer.address();
        Self { signer, address }
    }

    /// Public address (safe to share)
    pub fn address(&self) -> Address {
        self.address
    }

    /// Lowercase `0x` address, the form VeChain services expect
    pub fn address_string(&self) -> String {
        address_hex(&self.address)
    }

    /// Sign a 32-byte hash. Deterministic (RFC 6979); `v` is 0 or 1.
    pub fn sign_hash(&self, hash: &B256) -> Result<[u8; SIGNATURE_LENGTH]> {
        let signature = self
            .signer
            .sign_hash_sync(hash)
            .map_err(|e| Error::InvalidKey(format!("Signing failed: {}", e)))?;
        Ok(to_vechain_bytes(&signature))
    }
}

// Implement Debug manually to avoid exposing the signer
impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

fn to_vechain_bytes(signature: &Signature) -> [u8; SIGNATURE_LENGTH] {
    let mut out = [0u8; SIGNATURE_LENGTH];
    out[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
    out[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());
    out[64] = signature.v() as u8;
    out
}

/// Recover the signer of `hash`. `v` may be 0/1 or 27/28.
pub fn recover_address(hash: &B256, signature: &[u8]) -> Result<Address> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(Error::InvalidSignature(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LENGTH,
            signature.len()
        )));
    }
    let parity = match signature[64] {
        0 | 27 => false,
        1 | 28 => true,
        v => return Err(Error::RecoveryFailed(format!("invalid recovery id {}", v))),
    };
    let r = U256::from_be_slice(&signature[..32]);
    let s = U256::from_be_slice(&signature[32..64]);

    Signature::new(r, s, parity)
        .recover_address_from_prehash(hash)
        .map_err(|_| Error::RecoveryFailed("no public key recoverable from signature".into()))
}

/// Address from a 65-byte uncompressed SEC1 public key
pub(crate) fn address_from_uncompressed(public_key: &[u8]) -> Address {
    Address::from_raw_public_key(&public_key[1..])
}

pub fn address_hex(address: &Address) -> String {
    format!("{:#x}", address)
}

/// Parse a `0x` address in any case
pub fn parse_address(s: &str) -> Result<Address> {
    s.parse::<Address>()
        .map_err(|_| Error::InvalidArgument("not a valid address".into()))
}
