//! Identification / agreement certificates

use super::blake2b256;
use crate::wallet::{address_hex, parse_address, recover_address, LocalSigner};
use crate::{Error, Result};
use alloy::primitives::{hex, B256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificatePurpose {
    Identification,
    Agreement,
}

impl CertificatePurpose {
    fn as_str(&self) -> &'static str {
        match self {
            CertificatePurpose::Identification => "identification",
            CertificatePurpose::Agreement => "agreement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePayload {
    #[serde(rename = "type")]
    pub payload_type: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub purpose: CertificatePurpose,
    pub payload: CertificatePayload,
    pub domain: String,
    pub timestamp: u64,
    pub signer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

fn json_str(s: &str) -> String {
    // Serializing a str cannot fail
    serde_json::to_string(s).unwrap_or_default()
}

impl Certificate {
    /// Canonical JSON: sorted keys, no whitespace, lowercase signer and no
    /// signature.
    pub fn encode(&self) -> String {
        format!(
            r#"{{"domain":{},"payload":{{"content":{},"type":{}}},"purpose":{},"signer":{},"timestamp":{}}}"#,
            json_str(&self.domain),
            json_str(&self.payload.content),
            json_str(&self.payload.payload_type),
            json_str(self.purpose.as_str()),
            json_str(&self.signer.to_lowercase()),
            self.timestamp
        )
    }

    pub fn signing_hash(&self) -> B256 {
        blake2b256(&[self.encode().as_bytes()])
    }

    /// Sign as `signer`. The certificate's signer field is replaced with
    /// the signer's address.
    pub fn sign(mut self, signer: &LocalSigner) -> Result<Self> {
        self.signer = signer.address_string();
        let signature = signer.sign_hash(&self.signing_hash())?;
        self.signature = Some(hex::encode_prefixed(signature));
        Ok(self)
    }

    /// Check that the signature was produced by `signer`.
    pub fn verify(&self) -> Result<()> {
        let signature = self
            .signature
            .as_deref()
            .ok_or_else(|| Error::InvalidSignature("certificate is not signed".into()))?;
        let signature = hex::decode(signature)
            .map_err(|e| Error::InvalidSignature(format!("not hex: {}", e)))?;

        let expected = parse_address(&self.signer)?;
        let recovered = recover_address(&self.signing_hash(), &signature)?;
        if recovered != expected {
            return Err(Error::InvalidSignature(format!(
                "signed by {}, expected {}",
                address_hex(&recovered),
                address_hex(&expected)
            )));
        }
        Ok(())
    }
}
