//! Wallet key management
//!
//! Mnemonics, HD derivation, devices and the local signer. Private keys
//! only exist inside [`LocalSigner`] and zeroizing buffers.

pub mod device;
mod exclusive;
pub mod hd;
pub mod mnemonic;
mod signer;

pub use device::{
    detect_import_type, next_alias_index, next_device_index, Device, DeviceRegistry, DeviceType,
    ImportType, LocalWallet, NewDevice, WalletRecords,
};
pub use exclusive::{DeviceFuture, ExclusiveDevice};
pub use hd::{derive_account, derive_root, RootKey, XPubDescriptor, VET_DERIVATION_PATH};
pub use mnemonic::{generate_mnemonic, parse_mnemonic};
pub use signer::{address_hex, parse_address, recover_address, LocalSigner, SIGNATURE_LENGTH};
