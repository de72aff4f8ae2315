//! In-memory cache of a store's derived encryption key

use super::keystore::{DerivedKey, KdfParams};
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use zeroize::Zeroizing;

/// A derived key together with the salt and parameters it came from.
#[derive(Debug, Clone)]
pub struct StoreKey {
    pub(crate) key: DerivedKey,
    pub(crate) salt: Vec<u8>,
    pub(crate) kdf: KdfParams,
}

impl StoreKey {
    /// Derive a store key on the blocking pool.
    pub async fn derive(credential: &SecretString, salt: &[u8], kdf: KdfParams) -> Result<Self> {
        let password = Zeroizing::new(credential.expose_secret().as_bytes().to_vec());
        let salt = salt.to_vec();
        tokio::task::spawn_blocking(move || {
            let key = kdf.derive(&password, &salt)?;
            Ok(StoreKey { key, salt, kdf })
        })
        .await
        .map_err(|e| Error::Storage(format!("key derivation task failed: {}", e)))?
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }
}

/// Holds the derived key only between `init` and `dispose`.
///
/// Readers share the key concurrently; `init`/`dispose` take the write lock.
#[derive(Debug, Default)]
pub struct KeyHolder {
    slot: RwLock<Option<StoreKey>>,
}

impl KeyHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive and cache the key for `credential` and `salt`.
    pub async fn init(&self, credential: &SecretString, salt: &[u8], kdf: KdfParams) -> Result<()> {
        let key = StoreKey::derive(credential, salt, kdf).await?;
        self.install(key).await;
        Ok(())
    }

    pub(crate) async fn install(&self, key: StoreKey) {
        *self.slot.write().await = Some(key);
    }

    /// Drop the cached key. The buffer is zeroized on drop.
    pub async fn dispose(&self) {
        self.slot.write().await.take();
    }

    pub async fn is_initialized(&self) -> bool {
        self.slot.read().await.is_some()
    }

    /// The cached key, or `AuthenticationFailed` while locked.
    pub async fn current(&self) -> Result<StoreKey> {
        self.slot
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::AuthenticationFailed("store is locked".into()))
    }
}
