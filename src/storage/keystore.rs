//! Keystore v3 envelopes (scrypt + aes-128-ctr + keccak MAC)
//!
//! Used both for secrets at rest and for importing externally produced
//! keystore files.

use crate::{Error, Result};
use aes::cipher::{KeyIvInit, StreamCipher};
use alloy::primitives::{hex, keccak256, Address};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

const KDF_SCRYPT: &str = "scrypt";
const CIPHER_AES_128_CTR: &str = "aes-128-ctr";
const DKLEN: u32 = 32;

// Ceilings for untrusted keystores: n = 2^20 with r = 8 is already 1 GiB.
const MAX_N: u32 = 1 << 20;
const MAX_R: u32 = 32;
const MAX_P: u32 = 16;

/// scrypt cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub n: u32,
    pub r: u32,
    pub p: u32,
    pub dklen: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            n: 32_768,
            r: 8,
            p: 1,
            dklen: DKLEN,
        }
    }
}

impl KdfParams {
    pub fn validate(&self) -> Result<()> {
        if self.n < 2 || !self.n.is_power_of_two() {
            return Err(Error::InvalidKeystore(format!(
                "scrypt n must be a power of two, got {}",
                self.n
            )));
        }
        if self.dklen != DKLEN {
            return Err(Error::InvalidKeystore(format!(
                "dklen must be {}, got {}",
                DKLEN, self.dklen
            )));
        }
        if self.r == 0 || self.p == 0 {
            return Err(Error::InvalidKeystore("scrypt r and p must be non-zero".into()));
        }
        if self.n > MAX_N || self.r > MAX_R || self.p > MAX_P {
            return Err(Error::InvalidKeystore(format!(
                "scrypt parameters exceed limits (n <= {}, r <= {}, p <= {})",
                MAX_N, MAX_R, MAX_P
            )));
        }
        Ok(())
    }

    /// Run scrypt. CPU and memory heavy; call from a blocking context.
    pub fn derive(&self, password: &[u8], salt: &[u8]) -> Result<DerivedKey> {
        self.validate()?;
        let log_n = self.n.trailing_zeros() as u8;
        let params = scrypt::Params::new(log_n, self.r, self.p, DKLEN as usize)
            .map_err(|e| Error::InvalidKeystore(format!("scrypt params: {}", e)))?;

        let mut out = Zeroizing::new([0u8; 32]);
        scrypt::scrypt(password, salt, &params, &mut out[..])
            .map_err(|e| Error::InvalidKeystore(format!("scrypt: {}", e)))?;
        Ok(DerivedKey(out))
    }
}

/// 32-byte scrypt output: first half is the AES key, second half the MAC key
#[derive(Clone)]
pub struct DerivedKey(Zeroizing<[u8; 32]>);

impl DerivedKey {
    fn cipher_key(&self) -> &[u8] {
        &self.0[..16]
    }

    fn mac(&self, ciphertext: &[u8]) -> [u8; 32] {
        let mut input = Vec::with_capacity(16 + ciphertext.len());
        input.extend_from_slice(&self.0[16..32]);
        input.extend_from_slice(ciphertext);
        keccak256(&input).0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CipherParams {
    pub iv: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScryptParams {
    pub salt: String,
    pub n: u32,
    pub r: u32,
    pub p: u32,
    pub dklen: u32,
}

impl ScryptParams {
    pub fn kdf(&self) -> KdfParams {
        KdfParams {
            n: self.n,
            r: self.r,
            p: self.p,
            dklen: self.dklen,
        }
    }

    pub fn salt_bytes(&self) -> Result<Vec<u8>> {
        decode_field("salt", &self.salt)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CryptoSection {
    pub ciphertext: String,
    pub cipherparams: CipherParams,
    pub cipher: String,
    pub kdf: String,
    pub kdfparams: ScryptParams,
    pub mac: String,
}

/// Keystore v3 document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Keystore {
    pub version: u8,
    pub id: String,
    #[serde(alias = "Crypto")]
    pub crypto: CryptoSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Keystore {
    /// Parse and validate the shape of a keystore: version, cipher and kdf.
    pub fn from_value(value: &Value) -> Result<Self> {
        let crypto = value
            .get("crypto")
            .or_else(|| value.get("Crypto"))
            .ok_or_else(|| Error::InvalidKeystore("missing crypto section".into()))?;

        let kdf = crypto.get("kdf").and_then(Value::as_str).unwrap_or_default();
        if kdf != KDF_SCRYPT {
            return Err(Error::InvalidKeystore(format!("unsupported kdf '{}'", kdf)));
        }
        let cipher = crypto.get("cipher").and_then(Value::as_str).unwrap_or_default();
        if cipher != CIPHER_AES_128_CTR {
            return Err(Error::InvalidKeystore(format!(
                "unsupported cipher '{}'",
                cipher
            )));
        }

        let keystore: Keystore = serde_json::from_value(value.clone())
            .map_err(|e| Error::InvalidKeystore(e.to_string()))?;
        if keystore.version != 3 {
            return Err(Error::InvalidKeystore(format!(
                "unsupported version {}",
                keystore.version
            )));
        }
        keystore.crypto.kdfparams.kdf().validate()?;
        Ok(keystore)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| Error::InvalidKeystore(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn salt(&self) -> Result<Vec<u8>> {
        self.crypto.kdfparams.salt_bytes()
    }

    pub fn kdf(&self) -> KdfParams {
        self.crypto.kdfparams.kdf()
    }
}

/// Encrypt `plaintext` under an already derived key. A fresh IV is drawn
/// for every call.
pub fn seal(key: &DerivedKey, salt: &[u8], kdf: KdfParams, plaintext: &[u8]) -> Result<Keystore> {
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);

    let mut ciphertext = plaintext.to_vec();
    let mut cipher = Aes128Ctr::new_from_slices(key.cipher_key(), &iv)
        .map_err(|e| Error::Storage(format!("cipher init: {}", e)))?;
    cipher.apply_keystream(&mut ciphertext);
    let mac = key.mac(&ciphertext);

    Ok(Keystore {
        version: 3,
        id: uuid::Uuid::new_v4().to_string(),
        crypto: CryptoSection {
            ciphertext: hex::encode(&ciphertext),
            cipherparams: CipherParams {
                iv: hex::encode(iv),
            },
            cipher: CIPHER_AES_128_CTR.to_string(),
            kdf: KDF_SCRYPT.to_string(),
            kdfparams: ScryptParams {
                salt: hex::encode(salt),
                n: kdf.n,
                r: kdf.r,
                p: kdf.p,
                dklen: kdf.dklen,
            },
            mac: hex::encode(mac),
        },
        address: None,
    })
}

/// Verify the MAC and decrypt. A MAC mismatch means a wrong credential.
pub fn open(key: &DerivedKey, keystore: &Keystore) -> Result<Zeroizing<Vec<u8>>> {
    let ciphertext = decode_field("ciphertext", &keystore.crypto.ciphertext)?;
    let iv = decode_field("iv", &keystore.crypto.cipherparams.iv)?;
    let expected = decode_field("mac", &keystore.crypto.mac)?;

    if key.mac(&ciphertext).as_slice() != expected.as_slice() {
        return Err(Error::AuthenticationFailed("MAC mismatch".into()));
    }

    let mut plaintext = Zeroizing::new(ciphertext);
    let mut cipher = Aes128Ctr::new_from_slices(key.cipher_key(), &iv)
        .map_err(|e| Error::InvalidKeystore(format!("cipher init: {}", e)))?;
    cipher.apply_keystream(plaintext.as_mut_slice());
    Ok(plaintext)
}

/// Encrypt with a password and a fresh random salt.
pub fn encrypt(password: &[u8], plaintext: &[u8], kdf: KdfParams) -> Result<Keystore> {
    let mut salt = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut salt);
    let key = kdf.derive(password, &salt)?;
    seal(&key, &salt, kdf, plaintext)
}

/// Decrypt with a password using the keystore's own kdf parameters.
pub fn decrypt(password: &[u8], keystore: &Keystore) -> Result<Zeroizing<Vec<u8>>> {
    let key = keystore.kdf().derive(password, &keystore.salt()?)?;
    open(&key, keystore)
}

/// Import a keystore v3 file protected by `password` and return its
/// 32-byte private key. Accepts the JSON as an object or as a string.
///
/// When the keystore carries an `address`, it must match the decrypted key.
pub fn import_private_key(keystore: &Value, password: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let keystore = match keystore {
        Value::String(json) => Keystore::from_json(json)?,
        other => Keystore::from_value(other)?,
    };

    let plaintext = decrypt(password, &keystore)?;
    if plaintext.len() != 32 {
        return Err(Error::InvalidKeystore(format!(
            "expected a 32-byte private key, got {} bytes",
            plaintext.len()
        )));
    }
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&plaintext);

    if let Some(expected) = keystore.address.as_deref() {
        let expected = parse_address(expected)?;
        let actual = crate::wallet::LocalSigner::from_bytes(&key)?.address();
        if expected != actual {
            return Err(Error::InvalidKeystore(
                "address does not match decrypted key".into(),
            ));
        }
    }

    tracing::debug!(id = %keystore.id, "Imported keystore");
    Ok(key)
}

fn parse_address(s: &str) -> Result<Address> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = decode_field("address", s)?;
    if bytes.len() != 20 {
        return Err(Error::InvalidKeystore("address must be 20 bytes".into()));
    }
    Ok(Address::from_slice(&bytes))
}

fn decode_field(name: &str, s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| Error::InvalidKeystore(format!("{}: {}", name, e)))
}
