use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::Mac;
use sha2::Sha256;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

use crate::platform::{NativePlatform, Platform};

type HmacSha256 = hmac::Hmac<Sha256>;

const NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("platform secure storage is unavailable")]
    EncryptionUnavailable,
    #[error("failed to write secret store: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encrypt secret store")]
    Encrypt,
}

/// Encrypted key/value store for API keys and tokens.
///
/// The whole store is one AES-256-GCM blob on disk (`nonce || ciphertext` over
/// a JSON map). Every mutation is read-decrypt-modify-encrypt-write as one
/// unit, serialized behind an internal lock. An unreadable store degrades to
/// empty rather than failing the application; cross-process writers are not
/// supported.
pub struct SecretsVault {
    path: PathBuf,
    cipher: Option<Aes256Gcm>,
    io_lock: Mutex<()>,
}

/// Derive a 256-bit encryption key from machine-specific identifiers.
/// Uses HMAC-SHA256(hostname + username, "clipforge-vault-v1") so the key is
/// stable across restarts but tied to the local machine/user.
fn derive_key() -> Option<[u8; 32]> {
    let hostname = hostname::get().ok()?.to_string_lossy().to_string();
    let username = whoami::fallible::username().ok()?;
    let input = format!("{}{}", hostname, username);

    let mut mac = <HmacSha256 as Mac>::new_from_slice(b"clipforge-vault-v1")
        .expect("HMAC can take key of any size");
    mac.update(input.as_bytes());
    let bytes = mac.finalize().into_bytes();

    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Some(key)
}

impl SecretsVault {
    pub fn new(path: PathBuf) -> Self {
        let cipher = derive_key()
            .map(|key| Aes256Gcm::new_from_slice(&key).expect("32-byte key is valid for AES-256"));
        if cipher.is_none() {
            warn!("machine identity unavailable, vault will refuse writes");
        }
        Self {
            path,
            cipher,
            io_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encrypt the serialized map. Returns `nonce || ciphertext`.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
        let cipher = self
            .cipher
            .as_ref()
            .ok_or(VaultError::EncryptionUnavailable)?;
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| VaultError::Encrypt)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(combined)
    }

    /// Decrypt a `nonce || ciphertext` blob back into the serialized map.
    fn decrypt(&self, combined: &[u8]) -> Option<Vec<u8>> {
        let cipher = self.cipher.as_ref()?;
        if combined.len() < NONCE_LEN + GCM_TAG_LEN {
            return None;
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher.decrypt(nonce, ciphertext).ok()
    }

    /// Load the full secret map. Missing file means an empty store; an
    /// undecryptable or unparsable store also degrades to empty (logged),
    /// trading strict consistency for availability.
    async fn load(&self) -> HashMap<String, String> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!("could not read secret store: {e}");
                return HashMap::new();
            }
        };

        let Some(plaintext) = self.decrypt(&raw) else {
            warn!("secret store could not be decrypted, starting from an empty store");
            return HashMap::new();
        };

        match serde_json::from_slice(&plaintext) {
            Ok(map) => map,
            Err(e) => {
                warn!("secret store contents were unparsable ({e}), starting from an empty store");
                HashMap::new()
            }
        }
    }

    /// Re-serialize and overwrite the store in a single write.
    async fn store(&self, secrets: &HashMap<String, String>) -> Result<(), VaultError> {
        let plaintext = serde_json::to_vec(secrets).map_err(|_| VaultError::Encrypt)?;
        let blob = self.encrypt(&plaintext)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
            NativePlatform::restrict_dir_permissions(parent);
        }
        tokio::fs::write(&self.path, blob).await?;
        NativePlatform::restrict_file_permissions(&self.path);
        Ok(())
    }

    /// Fetch one secret. Absent keys are `None`, never an error.
    pub async fn get(&self, key: &str) -> Option<String> {
        let _guard = self.io_lock.lock().await;
        self.load().await.get(key).cloned()
    }

    /// Insert or silently overwrite one secret.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), VaultError> {
        let _guard = self.io_lock.lock().await;
        let mut secrets = self.load().await;
        secrets.insert(key.to_string(), value.to_string());
        self.store(&secrets).await
    }

    /// Remove one secret. Removing an absent key succeeds without touching disk.
    pub async fn delete(&self, key: &str) -> Result<(), VaultError> {
        let _guard = self.io_lock.lock().await;
        let mut secrets = self.load().await;
        if secrets.remove(key).is_none() {
            return Ok(());
        }
        self.store(&secrets).await
    }

    /// Identifiers only; callers wanting a value must `get` it explicitly.
    pub async fn list(&self) -> Vec<String> {
        let _guard = self.io_lock.lock().await;
        self.load().await.into_keys().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault(dir: &tempfile::TempDir) -> SecretsVault {
        SecretsVault::new(dir.path().join("secrets.enc"))
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = test_vault(&tmp);
        vault.set("api_key", "sk-12345").await.unwrap();
        assert_eq!(vault.get("api_key").await, Some("sk-12345".to_string()));
    }

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = test_vault(&tmp);
        assert_eq!(vault.get("ghost").await, None);
    }

    #[tokio::test]
    async fn set_overwrites_existing_value() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = test_vault(&tmp);
        vault.set("key", "old").await.unwrap();
        vault.set("key", "new").await.unwrap();
        assert_eq!(vault.get("key").await, Some("new".to_string()));
    }

    #[tokio::test]
    async fn delete_then_get_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = test_vault(&tmp);
        vault.set("ephemeral", "val").await.unwrap();
        vault.delete("ephemeral").await.unwrap();
        assert_eq!(vault.get("ephemeral").await, None);
    }

    #[tokio::test]
    async fn delete_absent_key_is_ok_repeatedly() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = test_vault(&tmp);
        vault.delete("nope").await.unwrap();
        vault.delete("nope").await.unwrap();
    }

    #[tokio::test]
    async fn list_returns_exactly_the_stored_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = test_vault(&tmp);
        vault.set("gamma", "3").await.unwrap();
        vault.set("alpha", "1").await.unwrap();
        vault.set("beta", "2").await.unwrap();
        let mut keys = vault.list().await;
        keys.sort();
        assert_eq!(keys, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn store_persists_across_vault_instances() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("secrets.enc");
        let vault = SecretsVault::new(path.clone());
        vault.set("persisted", "value").await.unwrap();
        drop(vault);

        let reopened = SecretsVault::new(path);
        assert_eq!(reopened.get("persisted").await, Some("value".to_string()));
    }

    #[tokio::test]
    async fn corrupt_store_degrades_to_empty_and_recovers() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("secrets.enc");
        let vault = SecretsVault::new(path.clone());
        vault.set("key", "value").await.unwrap();

        std::fs::write(&path, b"definitely not ciphertext").unwrap();
        assert_eq!(vault.get("key").await, None);
        assert!(vault.list().await.is_empty());

        // The store is usable again after the next write.
        vault.set("fresh", "start").await.unwrap();
        assert_eq!(vault.get("fresh").await, Some("start".to_string()));
    }

    #[tokio::test]
    async fn ciphertext_never_contains_plaintext() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("secrets.enc");
        let vault = SecretsVault::new(path.clone());
        vault.set("OPENAI_API_KEY", "sk-test-123").await.unwrap();

        let raw = std::fs::read(&path).unwrap();
        let haystack = String::from_utf8_lossy(&raw);
        assert!(!haystack.contains("sk-test-123"));
        assert!(!haystack.contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    async fn distinct_writes_produce_distinct_blobs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("secrets.enc");
        let vault = SecretsVault::new(path.clone());
        vault.set("key", "same").await.unwrap();
        let first = std::fs::read(&path).unwrap();
        vault.set("key", "same").await.unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_ne!(first, second, "random nonce should vary the blob");
    }

    #[tokio::test]
    async fn handles_empty_and_unicode_values() {
        let tmp = tempfile::tempdir().unwrap();
        let vault = test_vault(&tmp);
        vault.set("empty", "").await.unwrap();
        vault.set("unicode", "日本語テスト 🔑").await.unwrap();
        assert_eq!(vault.get("empty").await, Some(String::new()));
        assert_eq!(vault.get("unicode").await, Some("日本語テスト 🔑".to_string()));
    }
}
