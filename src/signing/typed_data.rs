//! EIP-712 typed data requests

use crate::wallet::{recover_address, LocalSigner, SIGNATURE_LENGTH};
use crate::{Error, Result};
use alloy::dyn_abi::TypedData;
use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed-data signing request as received from a dApp
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataRequest {
    pub domain: Value,
    pub types: Value,
    pub primary_type: String,
    pub message: Value,
    /// Account the dApp expects to sign, if it named one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis_id: Option<String>,
}

impl TypedDataRequest {
    fn typed_data(&self) -> Result<TypedData> {
        let value = serde_json::json!({
            "domain": self.domain,
            "types": self.types,
            "primaryType": self.primary_type,
            "message": self.message,
        });
        serde_json::from_value(value)
            .map_err(|e| Error::InvalidArgument(format!("typed data: {}", e)))
    }

    pub fn signing_hash(&self) -> Result<B256> {
        self.typed_data()?
            .eip712_signing_hash()
            .map_err(|e| Error::InvalidArgument(format!("typed data: {}", e)))
    }

    /// Sign with `signer`, refusing when the request names another account.
    pub fn sign(&self, signer: &LocalSigner) -> Result<[u8; SIGNATURE_LENGTH]> {
        if let Some(expected) = self.signer {
            if expected != signer.address() {
                return Err(Error::InvalidArgument(
                    "request is addressed to a different signer".into(),
                ));
            }
        }
        signer.sign_hash(&self.signing_hash()?)
    }

    /// Recover the signer and check it against the named signer, if any.
    pub fn verify(&self, signature: &[u8]) -> Result<Address> {
        let recovered = recover_address(&self.signing_hash()?, signature)?;
        match self.signer {
            Some(expected) if expected != recovered => Err(Error::InvalidSignature(
                "typed data signed by a different account".into(),
            )),
            _ => Ok(recovered),
        }
    }
}
