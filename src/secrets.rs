//! Managed secret store access.
//!
//! A secret is a named JSON object (the managed store's `SecretString`
//! payload). Configuration loading reads individual keys out of it. Lookup
//! failures are logged and surface as `None`; only the settings loader
//! decides whether a missing value is fatal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Backend that resolves a secret name to its JSON payload.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the full secret payload, or `None` if the secret does not exist.
    async fn get_secret(&self, name: &str) -> Option<serde_json::Value>;
}

/// Secret bundle stored as a JSON file on disk.
///
/// The file maps secret names to either a JSON object or a string holding
/// serialized JSON:
///
/// ```json
/// { "bettermeals/config": { "groq_api_key": "gsk-..." } }
/// ```
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_secret(&self, name: &str) -> Option<serde_json::Value> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Failed to read secrets file: {}", e);
                return None;
            }
        };
        let bundle: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Secrets file is not valid JSON: {}", e);
                return None;
            }
        };
        let entry = bundle.get(name)?.clone();
        decode_secret_string(name, entry)
    }
}

/// In-memory secret store, used in tests and for local overrides.
#[derive(Default, Clone)]
pub struct InMemorySecretStore {
    secrets: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, name: &str, value: serde_json::Value) {
        self.secrets.write().await.insert(name.to_string(), value);
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get_secret(&self, name: &str) -> Option<serde_json::Value> {
        let entry = self.secrets.read().await.get(name).cloned()?;
        decode_secret_string(name, entry)
    }
}

/// A secret may be stored as an object or as a string of serialized JSON.
fn decode_secret_string(name: &str, entry: serde_json::Value) -> Option<serde_json::Value> {
    match entry {
        serde_json::Value::String(s) => match serde_json::from_str(&s) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::error!(secret = name, "Failed to parse secret JSON: {}", e);
                None
            }
        },
        other => Some(other),
    }
}

/// Thin client over a `SecretStore` with key extraction.
#[derive(Clone)]
pub struct SecretsClient {
    store: Arc<dyn SecretStore>,
}

impl SecretsClient {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Fetch the whole secret payload.
    pub async fn get_secret(&self, name: &str) -> Option<serde_json::Value> {
        let secret = self.store.get_secret(name).await;
        if secret.is_none() {
            tracing::debug!(secret = name, "Secret not found");
        }
        secret
    }

    /// Fetch a single key from a secret, or the whole secret serialized when
    /// `key` is `None`.
    ///
    /// String values are returned as-is; other JSON values are serialized.
    pub async fn get_secret_value(&self, name: &str, key: Option<&str>) -> Option<String> {
        let secret = self.get_secret(name).await?;
        let value = match key {
            Some(key) => match secret.get(key) {
                Some(v) => v.clone(),
                None => {
                    tracing::warn!(secret = name, key, "Key not found in secret");
                    return None;
                }
            },
            None => secret,
        };
        match value {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
