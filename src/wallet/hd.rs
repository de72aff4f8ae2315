//! HD derivation on the VeChain path `m/44'/818'/0'/0`
//!
//! Only the root address and the extended public key are ever persisted;
//! account addresses are derived from the xPub without any secret.

use super::mnemonic;
use super::signer::address_from_uncompressed;
use crate::{Error, Result};
use alloy::primitives::{hex, Address};
use bip32::{
    ChainCode, ChildNumber, DerivationPath, ExtendedKey, ExtendedKeyAttrs, Prefix, XPrv, XPub,
};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// BIP-44 path of the VeChain account root (coin type 818)
pub const VET_DERIVATION_PATH: &str = "m/44'/818'/0'/0";

/// Persisted form of an extended public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XPubDescriptor {
    /// 65-byte uncompressed SEC1 point, hex without prefix
    pub public_key: String,
    /// 32 bytes, hex without prefix
    pub chain_code: String,
}

impl XPubDescriptor {
    fn from_xpub(xpub: &XPub) -> Self {
        let point = xpub.public_key().to_encoded_point(false);
        Self {
            public_key: hex::encode(point.as_bytes()),
            chain_code: hex::encode(xpub.attrs().chain_code),
        }
    }

    /// Rebuild a derivable xPub. Depth and parent data are not persisted
    /// and play no part in non-hardened child derivation.
    fn to_xpub(&self) -> Result<XPub> {
        let public_key = hex::decode(self.public_key.trim_start_matches("0x"))
            .map_err(|e| Error::InvalidKey(format!("xPub public key: {}", e)))?;
        let point = k256::PublicKey::from_sec1_bytes(&public_key)
            .map_err(|_| Error::InvalidKey("xPub public key is not a curve point".into()))?;

        let chain_code = hex::decode(self.chain_code.trim_start_matches("0x"))
            .map_err(|e| Error::InvalidKey(format!("xPub chain code: {}", e)))?;
        let chain_code: ChainCode = chain_code
            .try_into()
            .map_err(|_| Error::InvalidKey("xPub chain code must be 32 bytes".into()))?;

        let mut key_bytes = [0u8; 33];
        key_bytes.copy_from_slice(point.to_encoded_point(true).as_bytes());

        let extended = ExtendedKey {
            prefix: Prefix::XPUB,
            attrs: ExtendedKeyAttrs {
                depth: 4,
                parent_fingerprint: [0u8; 4],
                child_number: ChildNumber(0),
                chain_code,
            },
            key_bytes,
        };
        XPub::try_from(extended).map_err(|e| Error::InvalidKey(format!("xPub: {}", e)))
    }

    /// Address of the node itself
    pub fn address(&self) -> Result<Address> {
        let xpub = self.to_xpub()?;
        Ok(address_of(&xpub))
    }
}

/// Result of deriving a root from a mnemonic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootKey {
    pub root_address: Address,
    pub x_pub: XPubDescriptor,
    /// 256 random bits, independent of the mnemonic
    pub nonce: String,
}

fn address_of(xpub: &XPub) -> Address {
    let point = xpub.public_key().to_encoded_point(false);
    address_from_uncompressed(point.as_bytes())
}

fn root_path() -> Result<DerivationPath> {
    VET_DERIVATION_PATH
        .parse()
        .map_err(|e| Error::InvalidKey(format!("derivation path: {}", e)))
}

fn root_xprv(words: &[String]) -> Result<XPrv> {
    let seed = mnemonic::to_seed(words)?;
    XPrv::derive_from_path(&seed[..], &root_path()?)
        .map_err(|e| Error::InvalidKey(format!("derivation failed: {}", e)))
}

fn child_number(index: u32) -> Result<ChildNumber> {
    ChildNumber::new(index, false)
        .map_err(|_| Error::InvalidArgument(format!("account index {} out of range", index)))
}

pub fn random_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode_prefixed(bytes)
}

/// Derive the root address and xPub for a mnemonic.
pub fn derive_root(words: &[String]) -> Result<RootKey> {
    let xprv = root_xprv(words)?;
    let xpub = xprv.public_key();

    Ok(RootKey {
        root_address: address_of(&xpub),
        x_pub: XPubDescriptor::from_xpub(&xpub),
        nonce: random_nonce(),
    })
}

/// Address of non-hardened child `index` under the root xPub.
pub fn derive_account(x_pub: &XPubDescriptor, index: u32) -> Result<Address> {
    let child = x_pub
        .to_xpub()?
        .derive_child(child_number(index)?)
        .map_err(|e| Error::InvalidKey(format!("child derivation failed: {}", e)))?;
    Ok(address_of(&child))
}

/// Private key of account `index`, for signing only.
pub fn derive_account_key(words: &[String], index: u32) -> Result<Zeroizing<[u8; 32]>> {
    let child = root_xprv(words)?
        .derive_child(child_number(index)?)
        .map_err(|e| Error::InvalidKey(format!("child derivation failed: {}", e)))?;
    Ok(Zeroizing::new(child.to_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::mnemonic::parse_mnemonic;
    use crate::wallet::mnemonic::tests::{BAD_CHECKSUM_12, MNEMONIC_12, MNEMONIC_24};

    const ROOT_12: &str = "0x0c1a60341e1064bebb94e8769bd508b11ca2a27d";

    fn lower(address: Address) -> String {
        format!("{:#x}", address)
    }

    #[test]
    fn test_derive_root_12_words() {
        let root = derive_root(&parse_mnemonic(MNEMONIC_12)).unwrap();
        assert_eq!(lower(root.root_address), ROOT_12);
        assert_eq!(
            root.x_pub.public_key,
            "04705f631be98f5e982167438af4ec9bb1ada05af19ebbe0d5fba4b2152274fc6e7a8607b4e5f8d03b2d31fe67e3563d2f688fac7fda8916db18a05a9b7846e9fe"
        );
        assert_eq!(
            root.x_pub.chain_code,
            "bd161611b74b0216f306c5b9adfcf2d9202e20604ed39936e437f3add301b1f1"
        );
        assert_eq!(root.x_pub.address().unwrap(), root.root_address);
    }

    #[test]
    fn test_derive_root_24_words() {
        let root = derive_root(&parse_mnemonic(MNEMONIC_24)).unwrap();
        assert_eq!(
            lower(root.root_address),
            "0x1bed25639b56698787c36f36ec224d80746ccbba"
        );
    }

    #[test]
    fn test_derive_root_rejects_bad_checksum() {
        let err = derive_root(&parse_mnemonic(BAD_CHECKSUM_12)).unwrap_err();
        assert!(matches!(err, Error::InvalidMnemonic(_)));
    }

    #[test]
    fn test_nonce_is_fresh_per_derivation() {
        let words = parse_mnemonic(MNEMONIC_12);
        let a = derive_root(&words).unwrap();
        let b = derive_root(&words).unwrap();
        assert_eq!(a.root_address, b.root_address);
        assert_eq!(a.x_pub, b.x_pub);
        assert_ne!(a.nonce, b.nonce);
        assert_eq!(a.nonce.len(), 66);
    }

    #[test]
    fn test_derive_accounts() {
        let root = derive_root(&parse_mnemonic(MNEMONIC_12)).unwrap();
        let expected = [
            "0xf077b491b355e64048ce21e3a6fc4751eeea77fa",
            "0x435933c8064b4ae76be665428e0307ef2ccfbd68",
            "0x0f872421dc479f3c11edd89512731814d0598db5",
        ];
        for (index, address) in expected.iter().enumerate() {
            let derived = derive_account(&root.x_pub, index as u32).unwrap();
            assert_eq!(lower(derived), *address);
        }
        assert_eq!(
            derive_account(&root.x_pub, 1).unwrap(),
            derive_account(&root.x_pub, 1).unwrap()
        );
    }

    #[test]
    fn test_account_key_matches_account_address() {
        let words = parse_mnemonic(MNEMONIC_12);
        let key = derive_account_key(&words, 0).unwrap();
        assert_eq!(
            hex::encode(*key),
            "99f0500549792796c14fed62011a51081dc5b5e68fe8bd8a13b86be829c4fd36"
        );
        let key = derive_account_key(&words, 1).unwrap();
        assert_eq!(
            hex::encode(*key),
            "7b067f53d350f1cf20ec13df416b7b73e88a1dc7331bc904b92108b1e76a08b1"
        );
    }

    #[test]
    fn test_xpub_fixture_address() {
        let x_pub = XPubDescriptor {
            public_key: "0483bc762aeeedb9de996d36e23b14fc0adb856f65da5f4f369d71909b89b9e3f82638d3f14057a5092be155017100cec045841929507e3e218c4d478449e0763a".into(),
            chain_code: "c1c4093fab85d89e01d7c6eb2fd247da4fc8cb0f561fead35ae3c49fcb659eb5".into(),
        };
        assert_eq!(
            lower(x_pub.address().unwrap()),
            "0x4fec365ab34c21784b05e3fed80633268e6457ff"
        );
    }

    #[test]
    fn test_hardened_index_rejected() {
        let root = derive_root(&parse_mnemonic(MNEMONIC_12)).unwrap();
        assert!(matches!(
            derive_account(&root.x_pub, 0x8000_0000),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_malformed_xpub() {
        let x_pub = XPubDescriptor {
            public_key: "04deadbeef".into(),
            chain_code: "00".repeat(32),
        };
        assert!(matches!(
            derive_account(&x_pub, 0),
            Err(Error::InvalidKey(_))
        ));
    }
}
