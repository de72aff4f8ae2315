//! Message, certificate and typed-data signing

pub mod certificate;
pub mod message;
pub mod typed_data;

pub use certificate::{Certificate, CertificatePayload, CertificatePurpose};
pub use message::{hash_message, recover, sign, sign_message, Chain, RecoverRequest};
pub use typed_data::TypedDataRequest;

use alloy::primitives::B256;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// blake2b-256 over the concatenation of `parts`
pub fn blake2b256(parts: &[&[u8]]) -> B256 {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    B256::from_slice(&hasher.finalize())
}
