#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use debtflow_contracts::provider_secrets::ProviderSecretId;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

const VAULT_SCHEMA_VERSION: u8 = 1;
const MASTER_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug)]
pub enum VaultError {
    InvalidSecretValue,
    Io(std::io::Error),
    Json(serde_json::Error),
    Decode(base64::DecodeError),
    Crypto,
}

impl std::fmt::Display for VaultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSecretValue => write!(f, "invalid secret value"),
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Json(err) => write!(f, "json error: {err}"),
            Self::Decode(err) => write!(f, "decode error: {err}"),
            Self::Crypto => write!(f, "vault cryptographic operation failed"),
        }
    }
}

impl std::error::Error for VaultError {}

impl From<std::io::Error> for VaultError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<base64::DecodeError> for VaultError {
    fn from(value: base64::DecodeError) -> Self {
        Self::Decode(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct VaultDocument {
    schema_version: u8,
    entries: BTreeMap<String, VaultEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultEntry {
    nonce_b64: String,
    ciphertext_b64: String,
    updated_at_unix_ms: u64,
}

/// Encrypted-at-rest secret file for provider API keys. Secret ids are
/// restricted to the `ProviderSecretId` registry; values never appear in
/// configs, env vars, or log lines.
#[derive(Debug, Clone)]
pub struct DeviceVault {
    vault_path: PathBuf,
    key_path: PathBuf,
}

impl DeviceVault {
    pub fn default_local() -> Self {
        let vault_path = env::var_os("DEBTFLOW_VAULT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_vault_path);
        let mut key_path = vault_path.clone();
        key_path.set_extension("master.key");
        Self::for_paths(vault_path, key_path)
    }

    pub fn for_paths(vault_path: PathBuf, key_path: PathBuf) -> Self {
        Self {
            vault_path,
            key_path,
        }
    }

    pub fn set_secret(&self, id: ProviderSecretId, value: &str) -> Result<(), VaultError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(VaultError::InvalidSecretValue);
        }
        if let Some(parent) = self.vault_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let cipher = self.cipher()?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, trimmed.as_bytes())
            .map_err(|_| VaultError::Crypto)?;

        let mut document = self.read_document()?.unwrap_or_default();
        document.schema_version = VAULT_SCHEMA_VERSION;
        document.entries.insert(
            id.as_str().to_string(),
            VaultEntry {
                nonce_b64: BASE64.encode(nonce_bytes),
                ciphertext_b64: BASE64.encode(&ciphertext),
                updated_at_unix_ms: unix_now_ms(),
            },
        );
        self.write_document(&document)
    }

    pub fn secret(&self, id: ProviderSecretId) -> Result<Option<String>, VaultError> {
        let Some(document) = self.read_document()? else {
            return Ok(None);
        };
        let Some(entry) = document.entries.get(id.as_str()) else {
            return Ok(None);
        };
        let cipher = self.cipher()?;
        let nonce_bytes = BASE64.decode(&entry.nonce_b64)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(VaultError::Crypto);
        }
        let ciphertext = BASE64.decode(&entry.ciphertext_b64)?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_| VaultError::Crypto)?;
        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|_| VaultError::Crypto)
    }

    pub fn has_secret(&self, id: ProviderSecretId) -> Result<bool, VaultError> {
        Ok(self
            .read_document()?
            .map(|document| document.entries.contains_key(id.as_str()))
            .unwrap_or(false))
    }

    pub fn delete_secret(&self, id: ProviderSecretId) -> Result<(), VaultError> {
        let Some(mut document) = self.read_document()? else {
            return Ok(());
        };
        document.entries.remove(id.as_str());
        self.write_document(&document)
    }

    pub fn list_secret_ids(&self) -> Result<Vec<String>, VaultError> {
        Ok(self
            .read_document()?
            .map(|document| document.entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn cipher(&self) -> Result<Aes256Gcm, VaultError> {
        let key = self.load_or_create_master_key()?;
        Aes256Gcm::new_from_slice(&key).map_err(|_| VaultError::Crypto)
    }

    fn load_or_create_master_key(&self) -> Result<Vec<u8>, VaultError> {
        match fs::read(&self.key_path) {
            Ok(key) if key.len() == MASTER_KEY_LEN => Ok(key),
            Ok(_) => Err(VaultError::Crypto),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let mut key = vec![0u8; MASTER_KEY_LEN];
                OsRng.fill_bytes(&mut key);
                if let Some(parent) = self.key_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&self.key_path, &key)?;
                Ok(key)
            }
            Err(err) => Err(VaultError::Io(err)),
        }
    }

    fn read_document(&self) -> Result<Option<VaultDocument>, VaultError> {
        match fs::read_to_string(&self.vault_path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(VaultError::Io(err)),
        }
    }

    fn write_document(&self, document: &VaultDocument) -> Result<(), VaultError> {
        let body = serde_json::to_string(document)?;
        let mut tmp = self.vault_path.clone();
        tmp.set_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.vault_path)?;
        Ok(())
    }
}

fn default_vault_path() -> PathBuf {
    let base = match env::var_os("HOME") {
        Some(home) => Path::new(&home).join(".debtflow"),
        None => PathBuf::from(".debtflow"),
    };
    base.join("vault.json")
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
