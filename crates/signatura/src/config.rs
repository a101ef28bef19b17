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

//! Service configuration.
//!
//! [`SignatureConfig`] is immutable once built. Use
//! [`SignatureConfig::builder()`] in code or [`SignatureConfig::from_env()`]
//! in deployments:
//!
//! ```rust,ignore
//! let config = SignatureConfig::builder()
//!     .portal_base_url("https://portal.example.at")
//!     .batch_workers(4)
//!     .build()?;
//! ```

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::signing_api::{RetryPolicy, MAX_BATCH_DOCUMENTS};

/// Prefix of every environment variable read by [`SignatureConfig::from_env`].
pub const ENV_PREFIX: &str = "SIGNATURA_";

/// Longest lifetime a request or signer link may be given.
pub const MAX_EXPIRY_DAYS: i64 = 365;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}' ({reason})")]
    InvalidVar {
        name: String,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Deployment environment. Production refuses ephemeral master keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SignatureConfig {
    environment: Environment,
    database_url: String,
    callback_base_url: String,
    portal_base_url: String,
    link_expiry_days: i64,
    signature_cost_cents: Option<i64>,
    signing_retry: RetryPolicy,
    signing_timeout: Duration,
    batch_workers: usize,
    batch_max_documents: usize,
    oidc_pending_ttl: Duration,
    oidc_max_session_age: Duration,
    sweep_interval: Duration,
    audit_buffer: usize,
    audit_retention_batch: usize,
    rate_limit_window: Duration,
    rate_limit_max_attempts: u64,
    two_factor_setup_ttl: Duration,
    totp_issuer: String,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        SignatureConfigBuilder::default().config
    }
}

impl SignatureConfig {
    pub fn builder() -> SignatureConfigBuilder {
        SignatureConfigBuilder::default()
    }

    /// Loads `.env` if present, then reads `SIGNATURA_*` variables over the
    /// defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "failed to read .env file");
            }
        }

        let mut builder = Self::builder();
        if let Some(v) = env_var("ENV")? {
            builder = builder.environment(v);
        }
        if let Some(v) = env_var::<String>("DATABASE_URL")? {
            builder = builder.database_url(v);
        }
        if let Some(v) = env_var::<String>("CALLBACK_BASE_URL")? {
            builder = builder.callback_base_url(v);
        }
        if let Some(v) = env_var::<String>("PORTAL_BASE_URL")? {
            builder = builder.portal_base_url(v);
        }
        if let Some(v) = env_var("LINK_EXPIRY_DAYS")? {
            builder = builder.link_expiry_days(v);
        }
        if let Some(v) = env_var("SIGNATURE_COST_CENTS")? {
            builder = builder.signature_cost_cents(Some(v));
        }
        if let Some(v) = env_var("SIGNING_MAX_RETRIES")? {
            let policy = builder.config.signing_retry;
            builder = builder.signing_retry(RetryPolicy::new(v, policy.base_delay, policy.multiplier));
        }
        if let Some(v) = env_var("SIGNING_TIMEOUT_SECS")? {
            builder = builder.signing_timeout(Duration::from_secs(v));
        }
        if let Some(v) = env_var("BATCH_WORKERS")? {
            builder = builder.batch_workers(v);
        }
        if let Some(v) = env_var("SWEEP_INTERVAL_SECS")? {
            builder = builder.sweep_interval(Duration::from_secs(v));
        }
        if let Some(v) = env_var("AUDIT_BUFFER")? {
            builder = builder.audit_buffer(v);
        }
        if let Some(v) = env_var("RATE_LIMIT_WINDOW_SECS")? {
            builder = builder.rate_limit_window(Duration::from_secs(v));
        }
        if let Some(v) = env_var("RATE_LIMIT_MAX_ATTEMPTS")? {
            builder = builder.rate_limit_max_attempts(v);
        }
        if let Some(v) = env_var::<String>("TOTP_ISSUER")? {
            builder = builder.totp_issuer(v);
        }
        builder.build()
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Base URL the identity provider redirects back to.
    /// SQLite URL or path, `sqlite://` prefix optional.
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn callback_base_url(&self) -> &str {
        &self.callback_base_url
    }

    /// Full OIDC redirect URI.
    pub fn oidc_redirect_uri(&self) -> String {
        format!("{}/oidc/callback", self.callback_base_url.trim_end_matches('/'))
    }

    /// Base URL of the signer portal; signing links are `<portal>/sign/<token>`.
    pub fn portal_base_url(&self) -> &str {
        &self.portal_base_url
    }

    /// Default lifetime of a request and its signing links.
    pub fn link_expiry_days(&self) -> i64 {
        self.link_expiry_days
    }

    /// Price of one signature, if usage is billed.
    pub fn signature_cost_cents(&self) -> Option<i64> {
        self.signature_cost_cents
    }

    pub fn signing_retry(&self) -> RetryPolicy {
        self.signing_retry
    }

    /// Per-attempt timeout of a remote signing call.
    pub fn signing_timeout(&self) -> Duration {
        self.signing_timeout
    }

    /// Concurrent item workers per batch run.
    pub fn batch_workers(&self) -> usize {
        self.batch_workers
    }

    pub fn batch_max_documents(&self) -> usize {
        self.batch_max_documents
    }

    /// How long a handshake may stay unanswered.
    pub fn oidc_pending_ttl(&self) -> Duration {
        self.oidc_pending_ttl
    }

    /// Age after which any session row is deleted.
    pub fn oidc_max_session_age(&self) -> Duration {
        self.oidc_max_session_age
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    pub fn audit_buffer(&self) -> usize {
        self.audit_buffer
    }

    pub fn audit_retention_batch(&self) -> usize {
        self.audit_retention_batch
    }

    pub fn rate_limit_window(&self) -> Duration {
        self.rate_limit_window
    }

    pub fn rate_limit_max_attempts(&self) -> u64 {
        self.rate_limit_max_attempts
    }

    pub fn two_factor_setup_ttl(&self) -> Duration {
        self.two_factor_setup_ttl
    }

    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }
}

/// Builder for [`SignatureConfig`].
#[derive(Debug, Clone)]
pub struct SignatureConfigBuilder {
    config: SignatureConfig,
}

impl Default for SignatureConfigBuilder {
    fn default() -> Self {
        Self {
            config: SignatureConfig {
                environment: Environment::Development,
                database_url: "sqlite://signatura.db".to_string(),
                callback_base_url: "http://localhost:8080".to_string(),
                portal_base_url: "http://localhost:3000".to_string(),
                link_expiry_days: 14,
                signature_cost_cents: None,
                signing_retry: RetryPolicy::default(),
                signing_timeout: Duration::from_secs(30),
                batch_workers: 10,
                batch_max_documents: MAX_BATCH_DOCUMENTS,
                oidc_pending_ttl: Duration::from_secs(10 * 60),
                oidc_max_session_age: Duration::from_secs(60 * 60),
                sweep_interval: Duration::from_secs(60),
                audit_buffer: 1000,
                audit_retention_batch: 1000,
                rate_limit_window: Duration::from_secs(60),
                rate_limit_max_attempts: 10,
                two_factor_setup_ttl: Duration::from_secs(5 * 60),
                totp_issuer: "Signatura".to_string(),
            },
        }
    }
}

impl SignatureConfigBuilder {
    pub fn environment(mut self, value: Environment) -> Self {
        self.config.environment = value;
        self
    }

    pub fn database_url(mut self, value: impl Into<String>) -> Self {
        self.config.database_url = value.into();
        self
    }

    pub fn callback_base_url(mut self, value: impl Into<String>) -> Self {
        self.config.callback_base_url = value.into();
        self
    }

    pub fn portal_base_url(mut self, value: impl Into<String>) -> Self {
        self.config.portal_base_url = value.into();
        self
    }

    pub fn link_expiry_days(mut self, value: i64) -> Self {
        self.config.link_expiry_days = value;
        self
    }

    pub fn signature_cost_cents(mut self, value: Option<i64>) -> Self {
        self.config.signature_cost_cents = value;
        self
    }

    pub fn signing_retry(mut self, value: RetryPolicy) -> Self {
        self.config.signing_retry = value;
        self
    }

    pub fn signing_timeout(mut self, value: Duration) -> Self {
        self.config.signing_timeout = value;
        self
    }

    pub fn batch_workers(mut self, value: usize) -> Self {
        self.config.batch_workers = value;
        self
    }

    pub fn batch_max_documents(mut self, value: usize) -> Self {
        self.config.batch_max_documents = value;
        self
    }

    pub fn oidc_pending_ttl(mut self, value: Duration) -> Self {
        self.config.oidc_pending_ttl = value;
        self
    }

    pub fn oidc_max_session_age(mut self, value: Duration) -> Self {
        self.config.oidc_max_session_age = value;
        self
    }

    pub fn sweep_interval(mut self, value: Duration) -> Self {
        self.config.sweep_interval = value;
        self
    }

    pub fn audit_buffer(mut self, value: usize) -> Self {
        self.config.audit_buffer = value;
        self
    }

    pub fn audit_retention_batch(mut self, value: usize) -> Self {
        self.config.audit_retention_batch = value;
        self
    }

    pub fn rate_limit_window(mut self, value: Duration) -> Self {
        self.config.rate_limit_window = value;
        self
    }

    pub fn rate_limit_max_attempts(mut self, value: u64) -> Self {
        self.config.rate_limit_max_attempts = value;
        self
    }

    pub fn two_factor_setup_ttl(mut self, value: Duration) -> Self {
        self.config.two_factor_setup_ttl = value;
        self
    }

    pub fn totp_issuer(mut self, value: impl Into<String>) -> Self {
        self.config.totp_issuer = value.into();
        self
    }

    pub fn build(self) -> Result<SignatureConfig, ConfigError> {
        let c = &self.config;
        if !(1..=MAX_EXPIRY_DAYS).contains(&c.link_expiry_days) {
            return Err(ConfigError::Invalid(format!(
                "link_expiry_days must be between 1 and {MAX_EXPIRY_DAYS}"
            )));
        }
        if c.database_url.trim().is_empty() {
            return Err(ConfigError::Invalid("database_url must not be empty".into()));
        }
        if c.batch_workers == 0 {
            return Err(ConfigError::Invalid("batch_workers must be at least 1".into()));
        }
        if c.batch_max_documents == 0 || c.batch_max_documents > MAX_BATCH_DOCUMENTS {
            return Err(ConfigError::Invalid(format!(
                "batch_max_documents must be between 1 and {MAX_BATCH_DOCUMENTS}"
            )));
        }
        if c.oidc_pending_ttl > c.oidc_max_session_age {
            return Err(ConfigError::Invalid(
                "oidc_pending_ttl must not exceed oidc_max_session_age".into(),
            ));
        }
        if c.signature_cost_cents.is_some_and(|cents| cents < 0) {
            return Err(ConfigError::Invalid("signature_cost_cents must not be negative".into()));
        }
        for (name, url) in [
            ("callback_base_url", &c.callback_base_url),
            ("portal_base_url", &c.portal_base_url),
        ] {
            url::Url::parse(url).map_err(|e| ConfigError::InvalidVar {
                name: name.to_string(),
                value: url.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(self.config)
    }
}

fn env_var<T>(suffix: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let name = format!("{ENV_PREFIX}{suffix}");
    match std::env::var(&name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidVar {
                name,
                value,
                reason: e.to_string(),
            }),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::InvalidVar {
            name,
            value: String::new(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "ENV",
            "DATABASE_URL",
            "CALLBACK_BASE_URL",
            "PORTAL_BASE_URL",
            "LINK_EXPIRY_DAYS",
            "SIGNATURE_COST_CENTS",
            "SIGNING_MAX_RETRIES",
            "SIGNING_TIMEOUT_SECS",
            "BATCH_WORKERS",
            "SWEEP_INTERVAL_SECS",
            "AUDIT_BUFFER",
            "RATE_LIMIT_WINDOW_SECS",
            "RATE_LIMIT_MAX_ATTEMPTS",
            "TOTP_ISSUER",
        ] {
            std::env::remove_var(format!("{ENV_PREFIX}{key}"));
        }
    }

    #[test]
    fn test_defaults() {
        let config = SignatureConfig::default();
        assert_eq!(config.link_expiry_days(), 14);
        assert_eq!(config.batch_workers(), 10);
        assert_eq!(config.batch_max_documents(), 100);
        assert_eq!(config.oidc_pending_ttl(), Duration::from_secs(600));
        assert_eq!(config.oidc_max_session_age(), Duration::from_secs(3600));
        assert_eq!(config.signing_retry().max_retries, 3);
        assert_eq!(config.signing_timeout(), Duration::from_secs(30));
        assert_eq!(config.rate_limit_max_attempts(), 10);
        assert_eq!(config.signature_cost_cents(), None);
        assert_eq!(config.database_url(), "sqlite://signatura.db");
        assert!(!config.is_production());
    }

    #[test]
    fn test_builder_validation() {
        assert!(SignatureConfig::builder().batch_workers(0).build().is_err());
        assert!(SignatureConfig::builder().batch_max_documents(101).build().is_err());
        assert!(SignatureConfig::builder().link_expiry_days(366).build().is_err());
        assert!(SignatureConfig::builder().portal_base_url("not a url").build().is_err());
        assert!(SignatureConfig::builder()
            .oidc_pending_ttl(Duration::from_secs(7200))
            .build()
            .is_err());
    }

    #[test]
    fn test_redirect_uri() {
        let config = SignatureConfig::builder()
            .callback_base_url("https://sign.example.at/")
            .build()
            .unwrap();
        assert_eq!(config.oidc_redirect_uri(), "https://sign.example.at/oidc/callback");
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("SIGNATURA_ENV", "production");
        std::env::set_var("SIGNATURA_BATCH_WORKERS", "4");
        std::env::set_var("SIGNATURA_SIGNATURE_COST_CENTS", "25");
        std::env::set_var("SIGNATURA_SIGNING_MAX_RETRIES", "1");
        std::env::set_var("SIGNATURA_DATABASE_URL", "sqlite:///var/lib/signatura/store.db");

        let config = SignatureConfig::from_env().unwrap();
        assert!(config.is_production());
        assert_eq!(config.batch_workers(), 4);
        assert_eq!(config.signature_cost_cents(), Some(25));
        assert_eq!(config.signing_retry().max_retries, 1);
        assert_eq!(config.signing_retry().base_delay, Duration::from_secs(1));
        assert_eq!(config.database_url(), "sqlite:///var/lib/signatura/store.db");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        clear_env();
        std::env::set_var("SIGNATURA_BATCH_WORKERS", "many");
        let err = SignatureConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("SIGNATURA_BATCH_WORKERS"));
        clear_env();
    }
}
