//! VeChain transaction body, RLP encoding and hashes

use crate::signing::blake2b256;
use crate::wallet::{recover_address, SIGNATURE_LENGTH};
use crate::{Error, Result};
use alloy::primitives::{hex, Address, Bytes, B256, U256};
use alloy::rlp::{BufMut, Encodable, Header, EMPTY_STRING_CODE};
use serde::{Deserialize, Serialize};

/// Reserved feature bit for fee delegation (VIP-191)
pub const FEATURE_DELEGATION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    /// `None` deploys a contract
    pub to: Option<Address>,
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
}

impl Encodable for Clause {
    fn encode(&self, out: &mut dyn BufMut) {
        let mut payload = Vec::new();
        encode_optional(self.to.as_ref(), &mut payload);
        self.value.encode(&mut payload);
        self.data.encode(&mut payload);
        encode_list(&payload, out);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserved {
    #[serde(default)]
    pub features: u32,
    #[serde(default)]
    pub unused: Vec<Bytes>,
}

impl Encodable for Reserved {
    fn encode(&self, out: &mut dyn BufMut) {
        let mut items: Vec<Vec<u8>> = Vec::with_capacity(1 + self.unused.len());
        let mut features = Vec::new();
        self.features.encode(&mut features);
        items.push(features);
        for extra in &self.unused {
            let mut item = Vec::new();
            extra.encode(&mut item);
            items.push(item);
        }
        // Trailing empty items are dropped
        while items.last().is_some_and(|item| item == &[EMPTY_STRING_CODE]) {
            items.pop();
        }
        encode_list(&items.concat(), out);
    }
}

/// Unsigned transaction body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBody {
    pub chain_tag: u8,
    /// First 8 bytes of a reference block id
    #[serde(with = "hex_or_number")]
    pub block_ref: u64,
    pub expiration: u32,
    pub clauses: Vec<Clause>,
    pub gas_price_coef: u8,
    pub gas: u64,
    #[serde(default)]
    pub depends_on: Option<B256>,
    #[serde(with = "hex_or_number")]
    pub nonce: u64,
    #[serde(default)]
    pub reserved: Reserved,
}

impl TransactionBody {
    pub fn is_delegated(&self) -> bool {
        self.reserved.features & FEATURE_DELEGATION != 0
    }

    /// Set or clear the delegation feature bit
    pub fn set_delegated(&mut self, delegated: bool) {
        if delegated {
            self.reserved.features |= FEATURE_DELEGATION;
        } else {
            self.reserved.features &= !FEATURE_DELEGATION;
        }
    }

    fn encode_fields(&self, out: &mut Vec<u8>) {
        self.chain_tag.encode(out);
        self.block_ref.encode(out);
        self.expiration.encode(out);
        let mut clauses = Vec::new();
        for clause in &self.clauses {
            clause.encode(&mut clauses);
        }
        encode_list(&clauses, out);
        self.gas_price_coef.encode(out);
        self.gas.encode(out);
        encode_optional(self.depends_on.as_ref(), out);
        self.nonce.encode(out);
        self.reserved.encode(out);
    }

    /// RLP of the unsigned body
    pub fn encode_unsigned(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        self.encode_fields(&mut payload);
        let mut out = Vec::new();
        encode_list(&payload, &mut out);
        out
    }

    /// blake2b-256 over the unsigned body; what the origin signs
    pub fn signing_hash(&self) -> B256 {
        blake2b256(&[&self.encode_unsigned()])
    }

    /// What the gas payer signs: blake2b-256(signingHash || origin)
    pub fn delegator_signing_hash(&self, origin: &Address) -> B256 {
        blake2b256(&[self.signing_hash().as_slice(), origin.as_slice()])
    }

    /// Transaction id for a given origin
    pub fn id(&self, origin: &Address) -> B256 {
        self.delegator_signing_hash(origin)
    }

    pub fn validate(&self) -> Result<()> {
        if self.clauses.is_empty() {
            return Err(Error::InvalidTransaction("no clauses".into()));
        }
        if self.gas == 0 {
            return Err(Error::InvalidTransaction("gas must be non-zero".into()));
        }
        Ok(())
    }
}

/// Body plus origin signature and, when delegated, the sponsor's
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    body: TransactionBody,
    signature: Vec<u8>,
}

impl SignedTransaction {
    /// A plain (non-delegated) transaction
    pub fn new(body: TransactionBody, signature: [u8; SIGNATURE_LENGTH]) -> Result<Self> {
        if body.is_delegated() {
            return Err(Error::InvalidTransaction(
                "delegated body needs a sponsor signature".into(),
            ));
        }
        Ok(Self {
            body,
            signature: signature.to_vec(),
        })
    }

    /// A delegated transaction. The signature is always origin || sponsor.
    pub fn with_delegation(
        body: TransactionBody,
        origin_signature: [u8; SIGNATURE_LENGTH],
        sponsor_signature: [u8; SIGNATURE_LENGTH],
    ) -> Result<Self> {
        if !body.is_delegated() {
            return Err(Error::InvalidTransaction(
                "body does not have the delegation feature".into(),
            ));
        }
        let mut signature = Vec::with_capacity(2 * SIGNATURE_LENGTH);
        signature.extend_from_slice(&origin_signature);
        signature.extend_from_slice(&sponsor_signature);
        Ok(Self { body, signature })
    }

    pub fn body(&self) -> &TransactionBody {
        &self.body
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// RLP of the body fields followed by the signature
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        self.body.encode_fields(&mut payload);
        self.signature.as_slice().encode(&mut payload);
        let mut out = Vec::new();
        encode_list(&payload, &mut out);
        out
    }

    /// `0x` hex of [`encode`](Self::encode)
    pub fn raw(&self) -> String {
        hex::encode_prefixed(self.encode())
    }

    pub fn origin(&self) -> Result<Address> {
        recover_address(
            &self.body.signing_hash(),
            &self.signature[..SIGNATURE_LENGTH],
        )
    }

    /// Gas payer of a delegated transaction
    pub fn delegator(&self) -> Result<Option<Address>> {
        if !self.body.is_delegated() {
            return Ok(None);
        }
        let origin = self.origin()?;
        recover_address(
            &self.body.delegator_signing_hash(&origin),
            &self.signature[SIGNATURE_LENGTH..],
        )
        .map(Some)
    }

    pub fn id(&self) -> Result<B256> {
        Ok(self.body.id(&self.origin()?))
    }
}

fn encode_list(payload: &[u8], out: &mut dyn BufMut) {
    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(out);
    out.put_slice(payload);
}

fn encode_optional<T: Encodable>(value: Option<&T>, out: &mut dyn BufMut) {
    match value {
        Some(value) => value.encode(out),
        None => out.put_u8(EMPTY_STRING_CODE),
    }
}

/// u64 fields that dApps send either as numbers or as `0x` hex strings
mod hex_or_number {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:016x}", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) => match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16).map_err(de::Error::custom),
                None => s.parse().map_err(de::Error::custom),
            },
        }
    }
}
