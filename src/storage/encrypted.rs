//! Credential-protected store for a single secret

use super::access::{AccessControl, AccessGate, GateOutcome};
use super::key_holder::{KeyHolder, StoreKey};
use super::keystore::{self, KdfParams, Keystore};
use super::SecureStorage;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rand::RngCore;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

/// What actually lands in the backend: the envelope plus non-secret metadata.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    #[serde(flatten)]
    keystore: Keystore,
    #[serde(default)]
    access_control: AccessControl,
    time_updated: DateTime<Utc>,
}

/// Encrypted store bound to one storage key (e.g. `"veworld-devices"`).
pub struct EncryptedStore {
    store_key: String,
    storage: Arc<dyn SecureStorage>,
    keys: Arc<KeyHolder>,
    gate: Arc<dyn AccessGate>,
    kdf: KdfParams,
    writes: Mutex<()>,
}

impl EncryptedStore {
    pub fn new(
        store_key: impl Into<String>,
        storage: Arc<dyn SecureStorage>,
        keys: Arc<KeyHolder>,
        gate: Arc<dyn AccessGate>,
        kdf: KdfParams,
    ) -> Self {
        Self {
            store_key: store_key.into(),
            storage,
            keys,
            gate,
            kdf,
            writes: Mutex::new(()),
        }
    }

    pub fn store_key(&self) -> &str {
        &self.store_key
    }

    async fn load(&self) -> Result<Option<StoredEntry>> {
        let Some(bytes) = self.storage.read(&self.store_key).await? else {
            return Ok(None);
        };
        let entry = serde_json::from_slice(&bytes).map_err(|e| {
            Error::Storage(format!("corrupt entry in {}: {}", self.store_key, e))
        })?;
        Ok(Some(entry))
    }

    async fn persist(&self, key: &StoreKey, plaintext: &[u8], access: AccessControl) -> Result<()> {
        let entry = StoredEntry {
            keystore: keystore::seal(&key.key, key.salt(), key.kdf, plaintext)?,
            access_control: access,
            time_updated: Utc::now(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        self.storage.write(&self.store_key, &bytes).await
    }

    /// Derive the store key from `credential` and cache it.
    ///
    /// With an existing entry the key is derived from that entry's salt and
    /// must decrypt it; a wrong credential leaves the store locked. With no
    /// entry a fresh salt is drawn.
    pub async fn unlock(&self, credential: &SecretString) -> Result<()> {
        let key = match self.load().await? {
            Some(entry) => {
                let key = StoreKey::derive(
                    credential,
                    &entry.keystore.salt()?,
                    entry.keystore.kdf(),
                )
                .await?;
                keystore::open(&key.key, &entry.keystore)?;
                key
            }
            None => {
                let mut salt = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut salt);
                StoreKey::derive(credential, &salt, self.kdf).await?
            }
        };
        self.keys.install(key).await;
        tracing::debug!(store = %self.store_key, "Store unlocked");
        Ok(())
    }

    pub async fn lock(&self) {
        self.keys.dispose().await;
        tracing::debug!(store = %self.store_key, "Store locked");
    }

    pub async fn is_unlocked(&self) -> bool {
        self.keys.is_initialized().await
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.storage.read(&self.store_key).await?.is_some())
    }

    /// Whether `credential` decrypts the stored entry. Does not touch the
    /// cached key.
    pub async fn check_credential(&self, credential: &SecretString) -> Result<bool> {
        let entry = self
            .load()
            .await?
            .ok_or_else(|| Error::NotFound(format!("no entry in {}", self.store_key)))?;
        let key =
            StoreKey::derive(credential, &entry.keystore.salt()?, entry.keystore.kdf()).await?;
        match keystore::open(&key.key, &entry.keystore) {
            Ok(_) => Ok(true),
            Err(Error::AuthenticationFailed(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Re-encrypt the current entry under `new_credential` and a new salt.
    /// Requires an unlocked store.
    pub async fn change_credential(&self, new_credential: &SecretString) -> Result<()> {
        let _guard = self.writes.lock().await;
        let current = self.keys.current().await?;

        let mut salt = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut salt);
        let next = StoreKey::derive(new_credential, &salt, self.kdf).await?;

        if let Some(entry) = self.load().await? {
            let plaintext = keystore::open(&current.key, &entry.keystore)?;
            self.persist(&next, &plaintext, entry.access_control).await?;
        }
        self.keys.install(next).await;
        tracing::info!(store = %self.store_key, "Store credential changed");
        Ok(())
    }

    /// Encrypt and persist `secret`, replacing any previous entry.
    pub async fn set(&self, secret: &[u8], access: AccessControl) -> Result<()> {
        let _guard = self.writes.lock().await;
        let key = self.keys.current().await?;
        self.persist(&key, secret, access).await?;
        tracing::debug!(store = %self.store_key, ?access, "Stored secret");
        Ok(())
    }

    /// Decrypt the stored secret. `Ok(None)` when nothing is stored.
    ///
    /// A user-presence prompt runs first when either the caller or the
    /// stored entry asks for it.
    pub async fn get(&self, access: AccessControl) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let Some(entry) = self.load().await? else {
            return Ok(None);
        };

        if access == AccessControl::UserPresence
            || entry.access_control == AccessControl::UserPresence
        {
            match self.gate.confirm_presence(&self.store_key).await {
                GateOutcome::Granted => {}
                GateOutcome::Denied => {
                    return Err(Error::AuthenticationFailed("user presence denied".into()))
                }
                GateOutcome::Cancelled => {
                    return Err(Error::AuthenticationFailed(
                        "user cancelled presence check".into(),
                    ))
                }
            }
        }

        let key = self.keys.current().await?;
        if key.salt() != entry.keystore.salt()?.as_slice() {
            return Err(Error::AuthenticationFailed(
                "cached key does not match stored entry".into(),
            ));
        }
        keystore::open(&key.key, &entry.keystore).map(Some)
    }

    pub async fn remove(&self) -> Result<()> {
        let _guard = self.writes.lock().await;
        self.storage.delete(&self.store_key).await
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, value: &T, access: AccessControl) -> Result<()> {
        let bytes = Zeroizing::new(serde_json::to_vec(value)?);
        self.set(&bytes, access).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, access: AccessControl) -> Result<Option<T>> {
        match self.get(access).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for EncryptedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedStore")
            .field("store_key", &self.store_key)
            .field("kdf", &self.kdf)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::keystore::tests::light;
    use crate::storage::{AlwaysGrant, FixedGate, MemoryStorage};

    fn store_with(storage: Arc<dyn SecureStorage>, gate: Arc<dyn AccessGate>) -> EncryptedStore {
        EncryptedStore::new(
            "vechain-wallet",
            storage,
            Arc::new(KeyHolder::new()),
            gate,
            light(),
        )
    }

    fn pin(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = store_with(Arc::new(MemoryStorage::new()), Arc::new(AlwaysGrant));
        store.unlock(&pin("111111")).await.unwrap();

        assert!(store.get(AccessControl::None).await.unwrap().is_none());
        store.set(b"words", AccessControl::None).await.unwrap();
        assert!(store.exists().await.unwrap());
        assert_eq!(
            store.get(AccessControl::None).await.unwrap().unwrap().as_slice(),
            b"words"
        );

        store.remove().await.unwrap();
        store.remove().await.unwrap();
        assert!(store.get(AccessControl::None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backend_never_sees_plaintext() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(storage.clone(), Arc::new(AlwaysGrant));
        store.unlock(&pin("111111")).await.unwrap();
        store
            .set(b"denial kitchen pet squirrel", AccessControl::None)
            .await
            .unwrap();

        let raw = storage.read("vechain-wallet").await.unwrap().unwrap();
        let raw = String::from_utf8(raw).unwrap();
        assert!(!raw.contains("kitchen"));
        assert!(raw.contains("\"timeUpdated\""));
        assert!(raw.contains("\"accessControl\":\"none\""));
    }

    #[tokio::test]
    async fn test_locked_store_fails_closed() {
        let store = store_with(Arc::new(MemoryStorage::new()), Arc::new(AlwaysGrant));
        assert!(store
            .set(b"x", AccessControl::None)
            .await
            .unwrap_err()
            .is_authentication());

        store.unlock(&pin("111111")).await.unwrap();
        store.set(b"x", AccessControl::None).await.unwrap();
        store.lock().await;
        assert!(store
            .get(AccessControl::None)
            .await
            .unwrap_err()
            .is_authentication());
    }

    #[tokio::test]
    async fn test_wrong_credential_does_not_unlock() {
        let storage: Arc<dyn SecureStorage> = Arc::new(MemoryStorage::new());
        let first = store_with(storage.clone(), Arc::new(AlwaysGrant));
        first.unlock(&pin("111111")).await.unwrap();
        first.set(b"x", AccessControl::None).await.unwrap();

        let second = store_with(storage, Arc::new(AlwaysGrant));
        let err = second.unlock(&pin("222222")).await.unwrap_err();
        assert!(err.is_authentication());
        assert!(!second.is_unlocked().await);

        assert!(second.check_credential(&pin("111111")).await.unwrap());
        assert!(!second.check_credential(&pin("222222")).await.unwrap());
    }

    #[tokio::test]
    async fn test_change_credential() {
        let storage: Arc<dyn SecureStorage> = Arc::new(MemoryStorage::new());
        let store = store_with(storage.clone(), Arc::new(AlwaysGrant));
        store.unlock(&pin("111111")).await.unwrap();
        store.set(b"secret", AccessControl::None).await.unwrap();

        store.change_credential(&pin("999999")).await.unwrap();
        assert_eq!(
            store.get(AccessControl::None).await.unwrap().unwrap().as_slice(),
            b"secret"
        );

        let fresh = store_with(storage, Arc::new(AlwaysGrant));
        assert!(fresh.unlock(&pin("111111")).await.is_err());
        fresh.unlock(&pin("999999")).await.unwrap();
        assert_eq!(
            fresh.get(AccessControl::None).await.unwrap().unwrap().as_slice(),
            b"secret"
        );
    }

    #[tokio::test]
    async fn test_presence_denied_and_cancelled() {
        for outcome in [GateOutcome::Denied, GateOutcome::Cancelled] {
            let gate = Arc::new(FixedGate::new(outcome));
            let store = store_with(Arc::new(MemoryStorage::new()), gate.clone());
            store.unlock(&pin("111111")).await.unwrap();
            store.set(b"x", AccessControl::UserPresence).await.unwrap();

            // The entry's own protection applies even when the caller asks for none
            let err = store.get(AccessControl::None).await.unwrap_err();
            assert!(err.is_authentication());
            assert_eq!(gate.prompts(), 1);
        }
    }

    #[tokio::test]
    async fn test_presence_granted() {
        let gate = Arc::new(FixedGate::new(GateOutcome::Granted));
        let store = store_with(Arc::new(MemoryStorage::new()), gate.clone());
        store.unlock(&pin("111111")).await.unwrap();
        store.set(b"x", AccessControl::None).await.unwrap();

        assert!(store.get(AccessControl::None).await.unwrap().is_some());
        assert_eq!(gate.prompts(), 0);
        assert!(store
            .get(AccessControl::UserPresence)
            .await
            .unwrap()
            .is_some());
        assert_eq!(gate.prompts(), 1);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = store_with(Arc::new(MemoryStorage::new()), Arc::new(AlwaysGrant));
        store.unlock(&pin("111111")).await.unwrap();

        let value = serde_json::json!({ "rootAddress": "0xabc", "index": 2 });
        store.set_json(&value, AccessControl::None).await.unwrap();
        let back: serde_json::Value = store.get_json(AccessControl::None).await.unwrap().unwrap();
        assert_eq!(back, value);
    }
}
