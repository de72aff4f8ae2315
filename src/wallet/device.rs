//! Devices (one per HD root or imported key) and their registry

use super::hd::{self, XPubDescriptor};
use super::mnemonic;
use super::signer::{address_hex, LocalSigner};
use crate::storage::{AccessControl, EncryptedStore};
use crate::{Error, Result};
use alloy::primitives::{hex, Address};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use zeroize::Zeroize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    LocalMnemonic,
    LocalPrivateKey,
    Ledger,
    Observed,
}

impl DeviceType {
    /// Whether the signing secret is held by this wallet
    pub fn is_local(&self) -> bool {
        matches!(self, DeviceType::LocalMnemonic | DeviceType::LocalPrivateKey)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_pub: Option<XPubDescriptor>,
    pub root_address: Address,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub alias: String,
    pub index: u32,
    #[serde(default)]
    pub is_backed_up: bool,
}

/// Secret record behind a local device. Exactly one of `mnemonic` and
/// `private_key` is set.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalWallet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    pub root_address: Address,
    pub nonce: String,
}

impl LocalWallet {
    /// Signer for account `index`. Private-key wallets only have index 0.
    pub fn signer(&self, index: u32) -> Result<LocalSigner> {
        match (&self.mnemonic, &self.private_key) {
            (Some(words), None) => {
                let key = hd::derive_account_key(words, index)?;
                LocalSigner::from_bytes(&key)
            }
            (None, Some(key)) if index == 0 => LocalSigner::from_hex(key),
            (None, Some(_)) => Err(Error::InvalidArgument(
                "private key wallets have a single account".into(),
            )),
            _ => Err(Error::InvalidKey(
                "wallet must hold exactly one of mnemonic or private key".into(),
            )),
        }
    }
}

impl Drop for LocalWallet {
    fn drop(&mut self) {
        self.mnemonic.zeroize();
        self.private_key.zeroize();
    }
}

impl std::fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWallet")
            .field("root_address", &self.root_address)
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "[REDACTED]"))
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// A freshly generated device and the secret that backs it
#[derive(Debug)]
pub struct NewDevice {
    pub device: Device,
    pub wallet: LocalWallet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportType {
    Mnemonic,
    PrivateKey,
    KeystoreFile,
    Unknown,
}

/// Classify user-provided import material without decrypting anything.
pub fn detect_import_type(input: &str) -> ImportType {
    let trimmed = input.trim();
    if mnemonic::is_valid(&mnemonic::parse_mnemonic(trimmed)) {
        return ImportType::Mnemonic;
    }
    if LocalSigner::from_hex(trimmed).is_ok() && strip_hex_prefix(trimmed).len() == 64 {
        return ImportType::PrivateKey;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if crate::storage::Keystore::from_value(&value).is_ok() {
            return ImportType::KeystoreFile;
        }
    }
    ImportType::Unknown
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Index for the next device: 0 when empty, else the device count.
pub fn next_device_index(devices: &[Device]) -> u32 {
    devices.len() as u32
}

/// Number shown in the default alias of the next device.
///
/// One more than [`next_device_index`] once devices exist, and 1 for the
/// first device. The mismatch is a display convention and is kept.
pub fn next_alias_index(devices: &[Device]) -> u32 {
    if devices.is_empty() {
        1
    } else {
        next_device_index(devices) + 1
    }
}

pub fn default_alias(alias_index: u32) -> String {
    format!("Wallet {}", alias_index)
}

/// Build a local-mnemonic device and its wallet record.
///
/// `imported` marks phrases the user brought in, which count as backed up.
pub fn generate_device_for_mnemonic(
    words: &[String],
    device_index: u32,
    alias: &str,
    imported: bool,
) -> Result<NewDevice> {
    let root = hd::derive_root(words)?;
    Ok(NewDevice {
        device: Device {
            x_pub: Some(root.x_pub),
            root_address: root.root_address,
            device_type: DeviceType::LocalMnemonic,
            alias: alias.to_string(),
            index: device_index,
            is_backed_up: imported,
        },
        wallet: LocalWallet {
            mnemonic: Some(words.to_vec()),
            private_key: None,
            root_address: root.root_address,
            nonce: root.nonce,
        },
    })
}

/// Build a local-private-key device. No xPub: the key has no children.
pub fn generate_device_for_private_key(
    key_hex: &str,
    device_index: u32,
    alias: &str,
) -> Result<NewDevice> {
    let signer = LocalSigner::from_hex(key_hex)?;
    let mut normalized = strip_hex_prefix(key_hex).to_lowercase();
    let private_key = format!("0x{}", normalized);
    normalized.zeroize();

    Ok(NewDevice {
        device: Device {
            x_pub: None,
            root_address: signer.address(),
            device_type: DeviceType::LocalPrivateKey,
            alias: alias.to_string(),
            index: device_index,
            is_backed_up: true,
        },
        wallet: LocalWallet {
            mnemonic: None,
            private_key: Some(private_key),
            root_address: signer.address(),
            nonce: hd::random_nonce(),
        },
    })
}

/// Same as [`generate_device_for_private_key`] for raw key bytes.
pub fn generate_device_for_key_bytes(
    key: &[u8; 32],
    device_index: u32,
    alias: &str,
) -> Result<NewDevice> {
    let mut key_hex = hex::encode(key);
    let device = generate_device_for_private_key(&key_hex, device_index, alias);
    key_hex.zeroize();
    device
}

/// Wallet secrets keyed by lowercase root address, as kept in the
/// `vechain-wallet` store
pub type WalletRecords = BTreeMap<String, LocalWallet>;

/// Device list persisted in its own encrypted store
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    store: Arc<EncryptedStore>,
}

impl DeviceRegistry {
    pub fn new(store: Arc<EncryptedStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<Device>> {
        Ok(self
            .store
            .get_json::<Vec<Device>>(AccessControl::None)
            .await?
            .unwrap_or_default())
    }

    pub async fn get(&self, root_address: &Address) -> Result<Device> {
        self.list()
            .await?
            .into_iter()
            .find(|d| &d.root_address == root_address)
            .ok_or_else(|| Error::NotFound(format!("device {}", address_hex(root_address))))
    }

    async fn save(&self, devices: &[Device]) -> Result<()> {
        self.store.set_json(devices, AccessControl::None).await
    }

    /// Append a device. A root address may only be registered once.
    pub async fn add(&self, device: Device) -> Result<()> {
        let mut devices = self.list().await?;
        if devices.iter().any(|d| d.root_address == device.root_address) {
            return Err(Error::InvalidArgument(format!(
                "device {} already exists",
                address_hex(&device.root_address)
            )));
        }
        tracing::info!(
            root_address = %address_hex(&device.root_address),
            device_type = ?device.device_type,
            index = device.index,
            "Adding device"
        );
        devices.push(device);
        self.save(&devices).await
    }

    /// Remove a device. The last remaining device cannot be removed.
    pub async fn remove(&self, root_address: &Address) -> Result<Device> {
        let mut devices = self.list().await?;
        let position = devices
            .iter()
            .position(|d| &d.root_address == root_address)
            .ok_or_else(|| Error::NotFound(format!("device {}", address_hex(root_address))))?;
        if devices.len() == 1 {
            return Err(Error::InvalidArgument(
                "cannot remove the last device".into(),
            ));
        }
        let removed = devices.remove(position);
        self.save(&devices).await?;
        tracing::info!(root_address = %address_hex(root_address), "Removed device");
        Ok(removed)
    }

    /// Store the wallet secret of `new` in `wallets`, then register its
    /// device. If the device cannot be added the previous wallet records are
    /// restored, so a failure never leaves a device without its secret or a
    /// secret without its device.
    pub async fn add_local(&self, wallets: &EncryptedStore, new: &NewDevice) -> Result<()> {
        let previous: Option<WalletRecords> =
            wallets.get_json(AccessControl::UserPresence).await?;
        let mut records = previous.clone().unwrap_or_default();
        records.insert(address_hex(&new.wallet.root_address), new.wallet.clone());
        wallets
            .set_json(&records, AccessControl::UserPresence)
            .await?;

        if let Err(e) = self.add(new.device.clone()).await {
            let restored = match &previous {
                Some(previous) => {
                    wallets
                        .set_json(previous, AccessControl::UserPresence)
                        .await
                }
                None => wallets.remove().await,
            };
            if let Err(restore_err) = restored {
                tracing::error!(error = %restore_err, "Failed to restore wallet records");
            }
            return Err(e);
        }
        Ok(())
    }

    pub async fn rename(&self, root_address: &Address, alias: &str) -> Result<()> {
        let alias = alias.trim();
        if alias.is_empty() {
            return Err(Error::InvalidArgument("alias must not be empty".into()));
        }
        let mut devices = self.list().await?;
        let device = devices
            .iter_mut()
            .find(|d| &d.root_address == root_address)
            .ok_or_else(|| Error::NotFound(format!("device {}", address_hex(root_address))))?;
        device.alias = alias.to_string();
        self.save(&devices).await
    }
}
