/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Master key loading.
//!
//! The master key is loaded once at startup from the first source that yields
//! one, in the order configured on [`MasterKeyLoader`]:
//!
//! 1. an environment variable holding the hex-encoded key
//! 2. a file holding the hex-encoded key (surrounding whitespace ignored)
//! 3. an external [`SecretProvider`] such as an OpenBao KV v2 mount
//!
//! When no source yields a key, development deployments fall back to an
//! ephemeral random key (logged at error level, since everything encrypted
//! under it is lost on restart). Production deployments refuse.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rand::RngCore;
use serde::Deserialize;
use zeroize::Zeroizing;

use super::error::CryptoError;
use super::key_hierarchy::{KeyHierarchy, KEY_SIZE};

/// Environment variable holding the hex-encoded master key.
pub const MASTER_KEY_ENV_VAR: &str = "SIGNATURA_MASTER_KEY";

/// Environment variable naming a file that holds the hex-encoded master key.
pub const MASTER_KEY_FILE_ENV_VAR: &str = "SIGNATURA_MASTER_KEY_FILE";

/// External secret store that can supply the master key.
#[async_trait]
pub trait SecretProvider: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fetches the raw master key bytes, or `None` if the secret is absent.
    async fn fetch_master_key(&self) -> Result<Option<Zeroizing<Vec<u8>>>, CryptoError>;
}

/// One place the loader looks for the master key.
#[derive(Debug, Clone)]
pub enum MasterKeySource {
    /// Named environment variable containing hex.
    Env(String),
    /// File containing hex.
    File(PathBuf),
    /// External secret provider.
    Provider(Arc<dyn SecretProvider>),
}

impl MasterKeySource {
    async fn fetch(&self) -> Result<Option<Zeroizing<Vec<u8>>>, CryptoError> {
        match self {
            MasterKeySource::Env(var) => match std::env::var(var) {
                Ok(value) => {
                    let value = Zeroizing::new(value);
                    decode_hex_key(value.trim()).map(Some)
                }
                Err(_) => Ok(None),
            },
            MasterKeySource::File(path) => {
                let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
                    CryptoError::MasterKeySource(format!(
                        "failed to read master key file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let contents = Zeroizing::new(contents);
                decode_hex_key(contents.trim()).map(Some)
            }
            MasterKeySource::Provider(provider) => provider.fetch_master_key().await,
        }
    }

    fn describe(&self) -> String {
        match self {
            MasterKeySource::Env(var) => format!("env:{var}"),
            MasterKeySource::File(path) => format!("file:{}", path.display()),
            MasterKeySource::Provider(provider) => format!("provider:{}", provider.name()),
        }
    }
}

fn decode_hex_key(encoded: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let bytes = Zeroizing::new(
        hex::decode(encoded)
            .map_err(|_| CryptoError::MasterKeySource("master key is not valid hex".into()))?,
    );

    if bytes.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        });
    }

    Ok(bytes)
}

/// Resolves the master key from an ordered source chain.
#[derive(Debug, Clone)]
pub struct MasterKeyLoader {
    sources: Vec<MasterKeySource>,
    production: bool,
}

impl MasterKeyLoader {
    pub fn new(production: bool) -> Self {
        Self {
            sources: Vec::new(),
            production,
        }
    }

    /// Loader reading [`MASTER_KEY_ENV_VAR`] then, if set, the file named by
    /// [`MASTER_KEY_FILE_ENV_VAR`].
    pub fn from_env(production: bool) -> Self {
        let mut loader = Self::new(production).with_source(MasterKeySource::Env(
            MASTER_KEY_ENV_VAR.to_string(),
        ));
        if let Ok(path) = std::env::var(MASTER_KEY_FILE_ENV_VAR) {
            loader = loader.with_source(MasterKeySource::File(PathBuf::from(path)));
        }
        loader
    }

    pub fn with_source(mut self, source: MasterKeySource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_provider(self, provider: Arc<dyn SecretProvider>) -> Self {
        self.with_source(MasterKeySource::Provider(provider))
    }

    /// Returns the first key any source yields.
    ///
    /// A source that is configured but broken (bad hex, unreadable file,
    /// provider error) fails the whole load rather than silently falling
    /// through to the next source.
    pub async fn load(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        for source in &self.sources {
            if let Some(key) = source.fetch().await? {
                crate::security::audit::log_master_key_loaded(&source.describe(), self.production);
                return Ok(key);
            }
            tracing::debug!(source = %source.describe(), "master key source empty");
        }

        if self.production {
            tracing::error!("no master key configured in production mode");
            return Err(CryptoError::EphemeralKeyRefused);
        }

        tracing::error!(
            "no master key configured; generated an EPHEMERAL master key. \
             Data encrypted under it will be unreadable after restart"
        );
        let mut key = Zeroizing::new(vec![0u8; KEY_SIZE]);
        rand::thread_rng().fill_bytes(key.as_mut_slice());
        Ok(key)
    }

    /// Loads the key and installs it into `hierarchy`.
    pub async fn load_into(&self, hierarchy: &KeyHierarchy) -> Result<(), CryptoError> {
        let key = self.load().await?;
        hierarchy.load_master_key(&key)
    }
}

/// Reads the master key from an OpenBao (or Vault) KV v2 secret.
///
/// The secret at `<mount>/data/<path>` must carry the hex key under `field`.
#[derive(Clone)]
pub struct OpenBaoSecretProvider {
    addr: String,
    token: Zeroizing<String>,
    mount: String,
    path: String,
    field: String,
    http: reqwest::Client,
}

impl fmt::Debug for OpenBaoSecretProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenBaoSecretProvider")
            .field("addr", &self.addr)
            .field("mount", &self.mount)
            .field("path", &self.path)
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

impl OpenBaoSecretProvider {
    pub fn new(
        addr: impl Into<String>,
        token: impl Into<String>,
        mount: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            addr: addr.into().trim_end_matches('/').to_string(),
            token: Zeroizing::new(token.into()),
            mount: mount.into(),
            path: path.into(),
            field: "master_key".to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Overrides the secret field name (default `master_key`).
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    fn secret_url(&self) -> String {
        format!("{}/v1/{}/data/{}", self.addr, self.mount, self.path)
    }
}

#[derive(Debug, Deserialize)]
struct KvReadResponse {
    data: KvReadData,
}

#[derive(Debug, Deserialize)]
struct KvReadData {
    data: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
impl SecretProvider for OpenBaoSecretProvider {
    fn name(&self) -> &str {
        "openbao"
    }

    async fn fetch_master_key(&self) -> Result<Option<Zeroizing<Vec<u8>>>, CryptoError> {
        let response = self
            .http
            .get(self.secret_url())
            .header("X-Vault-Token", self.token.as_str())
            .send()
            .await
            .map_err(|e| CryptoError::MasterKeySource(format!("openbao request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            return Err(CryptoError::MasterKeySource(format!(
                "openbao read failed with status {status}"
            )));
        }

        let parsed: KvReadResponse = response
            .json()
            .await
            .map_err(|e| CryptoError::MasterKeySource(format!("unexpected openbao body: {e}")))?;

        match parsed.data.data.get(&self.field) {
            Some(serde_json::Value::String(hex_key)) => {
                let hex_key = Zeroizing::new(hex_key.clone());
                decode_hex_key(hex_key.trim()).map(Some)
            }
            Some(_) => Err(CryptoError::MasterKeySource(format!(
                "openbao field '{}' is not a string",
                self.field
            ))),
            None => Ok(None),
        }
    }
}
