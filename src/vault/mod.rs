//! Encrypted on-disk storage for the single provider credential.
//!
//! Three files live in the vault directory:
//! - `vault.key`: 32 random bytes, created on first save
//! - `azure_credentials.enc`: `nonce || AES-256-GCM ciphertext`
//! - `azure_credentials.meta.json`: `{"lastUpdated": "<rfc3339>"}`
//!
//! Every file is replaced atomically (temp file + rename), so a concurrent
//! reader sees either the old or the new version, never a torn write.

mod cipher;

pub use cipher::{Cipher, KEY_SIZE, NONCE_SIZE};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

const KEY_FILE: &str = "vault.key";
const CIPHERTEXT_FILE: &str = "azure_credentials.enc";
const META_FILE: &str = "azure_credentials.meta.json";

#[derive(Debug, Error)]
pub enum VaultError {
    /// Stored data exists but cannot be read back.
    #[error("Credential vault is corrupt: {0}")]
    Corrupt(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Vault I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Service-principal credential for the compute provider.
///
/// Only deserializable: the secret never leaves the process through serde.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredential {
    pub client_id: String,
    pub tenant_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredential")
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// What the vault is willing to show about the stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    pub client_id: String,
    pub tenant_id: String,
    pub last_updated: String,
}

/// A decrypted credential together with its metadata.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub credential: ProviderCredential,
    pub last_updated: String,
}

impl StoredCredential {
    #[must_use]
    pub fn summary(&self) -> CredentialSummary {
        CredentialSummary {
            client_id: self.credential.client_id.clone(),
            tenant_id: self.credential.tenant_id.clone(),
            last_updated: self.last_updated.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SealedPayload {
    client_id: String,
    tenant_id: String,
    client_secret: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    last_updated: String,
}

pub struct CredentialVault {
    dir: PathBuf,
    cipher: OnceCell<Cipher>,
}

impl CredentialVault {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cipher: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Encrypt and persist `credential`, replacing whatever was stored.
    pub async fn save(
        &self,
        credential: &ProviderCredential,
    ) -> Result<CredentialSummary, VaultError> {
        fs::create_dir_all(&self.dir).await?;

        let payload = SealedPayload {
            client_id: credential.client_id.clone(),
            tenant_id: credential.tenant_id.clone(),
            client_secret: credential.client_secret.clone(),
        };
        let plaintext = serde_json::to_vec(&payload)
            .map_err(|e| VaultError::Serialization(e.to_string()))?;

        let sealed = self.cipher(true).await?.seal(&plaintext)?;
        write_atomic(&self.dir.join(CIPHERTEXT_FILE), &sealed, false).await?;

        let last_updated = chrono::Utc::now().to_rfc3339();
        let meta = serde_json::to_vec(&Metadata {
            last_updated: last_updated.clone(),
        })
        .map_err(|e| VaultError::Serialization(e.to_string()))?;
        write_atomic(&self.dir.join(META_FILE), &meta, false).await?;

        info!(client_id = %credential.client_id, "Provider credential saved");

        Ok(CredentialSummary {
            client_id: credential.client_id.clone(),
            tenant_id: credential.tenant_id.clone(),
            last_updated,
        })
    }

    /// `Ok(None)` when nothing was ever saved.
    pub async fn load(&self) -> Result<Option<StoredCredential>, VaultError> {
        let sealed = match fs::read(self.dir.join(CIPHERTEXT_FILE)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No provider credential stored");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let plaintext = self.cipher(false).await?.open(&sealed)?;
        let payload: SealedPayload = serde_json::from_slice(&plaintext)
            .map_err(|e| VaultError::Corrupt(format!("unreadable payload: {e}")))?;

        let meta_bytes = match fs::read(self.dir.join(META_FILE)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VaultError::Corrupt("metadata file is missing".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let meta: Metadata = serde_json::from_slice(&meta_bytes)
            .map_err(|e| VaultError::Corrupt(format!("unreadable metadata: {e}")))?;

        Ok(Some(StoredCredential {
            credential: ProviderCredential {
                client_id: payload.client_id,
                tenant_id: payload.tenant_id,
                client_secret: payload.client_secret,
            },
            last_updated: meta.last_updated,
        }))
    }

    pub async fn summary(&self) -> Result<Option<CredentialSummary>, VaultError> {
        Ok(self.load().await?.map(|stored| stored.summary()))
    }

    /// The key is read once and cached. When `create` is set a missing key
    /// is generated; otherwise a missing key means the ciphertext is orphaned.
    async fn cipher(&self, create: bool) -> Result<&Cipher, VaultError> {
        self.cipher
            .get_or_try_init(|| async {
                let path = self.dir.join(KEY_FILE);
                let key = match fs::read(&path).await {
                    Ok(bytes) => <[u8; KEY_SIZE]>::try_from(bytes.as_slice()).map_err(|_| {
                        VaultError::Corrupt(format!(
                            "key file has {} bytes, expected {KEY_SIZE}",
                            bytes.len()
                        ))
                    })?,
                    Err(e) if e.kind() == ErrorKind::NotFound && create => {
                        let key = Cipher::generate_key();
                        write_atomic(&path, &key, true).await?;
                        info!(path = %path.display(), "Generated new vault key");
                        key
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        return Err(VaultError::Corrupt("vault key is missing".to_string()));
                    }
                    Err(e) => return Err(e.into()),
                };
                Ok(Cipher::new(key))
            })
            .await
    }
}

async fn write_atomic(path: &Path, contents: &[u8], owner_only: bool) -> Result<(), VaultError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("vault");
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    fs::write(&tmp, contents).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if owner_only {
            fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
    }
    #[cfg(not(unix))]
    let _ = owner_only;

    if let Err(e) = fs::rename(&tmp, path).await {
        fs::remove_file(&tmp).await.ok();
        return Err(e.into());
    }

    Ok(())
}
