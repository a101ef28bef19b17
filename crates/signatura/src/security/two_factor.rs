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

//! TOTP enrollment and verification.
//!
//! Setup is two-phase: [`TwoFactorService::begin_setup`] parks the raw secret
//! in the cache under `2fa_setup:<user>` for a short TTL, and only a correct
//! code presented to [`TwoFactorService::confirm_setup`] encrypts and persists
//! it. Secrets are encrypted under a key derived from the tenant key and the
//! user id; recovery codes under a second, independent derivation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::audit::{events, SecurityEventSink};
use super::rate_limit::{FailureMode, RateLimitError, RateLimiter};
use super::recovery_codes::RecoveryCodeSet;
use super::totp;
use crate::clock::SharedClock;
use crate::crypto::{decrypt, encrypt, CryptoError, DerivedKey, KeyHierarchy, KeyPurpose};
use crate::dal::DAL;
use crate::error::{ErrorKind, StorageError};
use crate::external::{Cache, CacheError};
use crate::models::{Outcome, SecurityEvent, Severity, TwoFactorRecord};

/// How long an unconfirmed setup secret survives.
pub const DEFAULT_SETUP_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum TwoFactorError {
    #[error("two-factor authentication is not enabled")]
    NotEnrolled,

    #[error("two-factor authentication is already enabled")]
    AlreadyEnrolled,

    #[error("two-factor setup expired or was never started")]
    SetupExpired,

    #[error("invalid verification code")]
    InvalidCode,

    #[error("invalid recovery code")]
    RecoveryCodeInvalid,

    #[error("all recovery codes have been used")]
    AllRecoveryCodesUsed,

    #[error("too many attempts, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("two-factor backend unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl TwoFactorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotEnrolled | Self::AlreadyEnrolled | Self::SetupExpired => ErrorKind::State,
            Self::InvalidCode | Self::RecoveryCodeInvalid | Self::AllRecoveryCodesUsed => {
                ErrorKind::Authorization
            }
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Crypto(_) => ErrorKind::Cryptographic,
            Self::Unavailable(_) | Self::Storage(_) | Self::Cache(_) => ErrorKind::Internal,
        }
    }
}

impl From<RateLimitError> for TwoFactorError {
    fn from(error: RateLimitError) -> Self {
        match error {
            RateLimitError::Exceeded { retry_after_secs } => Self::RateLimited { retry_after_secs },
            RateLimitError::Unavailable(reason) => Self::Unavailable(reason),
        }
    }
}

/// Material shown to the user while enrolling.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct TwoFactorSetup {
    pub secret_base32: String,
    pub provisioning_uri: String,
}

impl std::fmt::Debug for TwoFactorSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TwoFactorSetup([REDACTED])")
    }
}

/// Proof presented to authorize an administrative operation.
#[derive(Debug, Clone, Copy)]
pub enum SecondFactor<'a> {
    Totp(&'a str),
    RecoveryCode(&'a str),
}

fn setup_key(user_id: Uuid) -> String {
    format!("2fa_setup:{user_id}")
}

/// Two-factor enrollment, verification and recovery.
#[derive(Debug, Clone)]
pub struct TwoFactorService {
    dal: DAL,
    keys: Arc<KeyHierarchy>,
    cache: Arc<dyn Cache>,
    rate_limiter: RateLimiter,
    events: SecurityEventSink,
    clock: SharedClock,
    issuer: String,
    setup_ttl: Duration,
}

impl TwoFactorService {
    pub fn new(
        dal: DAL,
        keys: Arc<KeyHierarchy>,
        cache: Arc<dyn Cache>,
        rate_limiter: RateLimiter,
        events: SecurityEventSink,
        clock: SharedClock,
    ) -> Self {
        Self {
            dal,
            keys,
            cache,
            rate_limiter,
            events,
            clock,
            issuer: "Signatura".to_string(),
            setup_ttl: DEFAULT_SETUP_TTL,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_setup_ttl(mut self, ttl: Duration) -> Self {
        self.setup_ttl = ttl;
        self
    }

    fn unix_now(&self) -> u64 {
        u64::try_from(self.clock.now().timestamp()).unwrap_or(0)
    }

    fn totp_key(&self, tenant_id: Uuid, user_id: Uuid) -> Result<DerivedKey, CryptoError> {
        self.keys
            .derive_tenant_scoped(tenant_id, KeyPurpose::Totp, user_id)
    }

    fn recovery_key(&self, tenant_id: Uuid, user_id: Uuid) -> Result<DerivedKey, CryptoError> {
        self.keys
            .derive_tenant_scoped(tenant_id, KeyPurpose::Recovery, user_id)
    }

    async fn limit(&self, scope: &str, tenant_id: Uuid, user_id: Uuid) -> Result<(), TwoFactorError> {
        if let Err(e) = self
            .rate_limiter
            .check(scope, &user_id.to_string(), FailureMode::Closed)
            .await
        {
            if let RateLimitError::Exceeded { retry_after_secs } = &e {
                self.events
                    .rate_limited(Some(tenant_id), scope, *retry_after_secs)
                    .await;
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn emit(
        &self,
        event_type: &str,
        severity: Severity,
        outcome: Outcome,
        tenant_id: Uuid,
        user_id: Uuid,
        metadata: serde_json::Value,
    ) {
        let event = SecurityEvent::new(event_type, severity, outcome)
            .tenant(Some(tenant_id))
            .actor(user_id.to_string())
            .metadata(metadata);
        self.events.emit(event).await;
    }

    /// Reports cryptographic failures before handing them back.
    async fn crypto<T>(
        &self,
        tenant_id: Uuid,
        operation: &str,
        result: Result<T, CryptoError>,
    ) -> Result<T, TwoFactorError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::error!(tenant_id = %tenant_id, operation, error = %e, "2FA crypto failure");
                self.events.crypto_failure(Some(tenant_id), operation).await;
                Err(e.into())
            }
        }
    }

    async fn record(&self, tenant_id: Uuid, user_id: Uuid) -> Result<TwoFactorRecord, TwoFactorError> {
        self.dal
            .two_factor()
            .get(tenant_id, user_id)
            .await?
            .ok_or(TwoFactorError::NotEnrolled)
    }

    async fn secret_of(&self, record: &TwoFactorRecord) -> Result<Zeroizing<Vec<u8>>, TwoFactorError> {
        let opened = self
            .totp_key(record.tenant_id, record.user_id)
            .and_then(|key| decrypt(&record.encrypted_secret, key.as_bytes()));
        let secret = self.crypto(record.tenant_id, "decrypt_totp_secret", opened).await?;
        Ok(Zeroizing::new(secret))
    }

    async fn check_totp(&self, record: &TwoFactorRecord, code: &str) -> Result<(), TwoFactorError> {
        let secret = self.secret_of(record).await?;
        if totp::verify_code(&secret, code, self.unix_now()) {
            self.emit(
                events::TWO_FACTOR_VERIFY_SUCCESS,
                Severity::Info,
                Outcome::Success,
                record.tenant_id,
                record.user_id,
                json!({}),
            )
            .await;
            Ok(())
        } else {
            self.emit(
                events::TWO_FACTOR_VERIFY_FAILURE,
                Severity::Low,
                Outcome::Failure,
                record.tenant_id,
                record.user_id,
                json!({}),
            )
            .await;
            Err(TwoFactorError::InvalidCode)
        }
    }

    pub async fn is_enabled(&self, tenant_id: Uuid, user_id: Uuid) -> Result<bool, TwoFactorError> {
        Ok(self.dal.two_factor().get(tenant_id, user_id).await?.is_some())
    }

    /// Generates a secret and parks it in the cache until confirmed.
    pub async fn begin_setup(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        account_name: &str,
    ) -> Result<TwoFactorSetup, TwoFactorError> {
        if self.is_enabled(tenant_id, user_id).await? {
            return Err(TwoFactorError::AlreadyEnrolled);
        }

        let secret = totp::generate_secret();
        self.cache
            .set_ex(&setup_key(user_id), secret.to_vec(), self.setup_ttl)
            .await?;

        tracing::debug!(tenant_id = %tenant_id, user_id = %user_id, "2FA setup started");
        Ok(TwoFactorSetup {
            secret_base32: totp::base32_encode(&secret),
            provisioning_uri: totp::provisioning_uri(&self.issuer, account_name, &secret),
        })
    }

    /// Persists the parked secret once `code` proves the user holds it.
    ///
    /// Returns the plaintext recovery codes; they are not retrievable later.
    pub async fn confirm_setup(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        code: &str,
    ) -> Result<Vec<String>, TwoFactorError> {
        self.limit("2fa_setup", tenant_id, user_id).await?;

        let secret = Zeroizing::new(
            self.cache
                .get(&setup_key(user_id))
                .await?
                .ok_or(TwoFactorError::SetupExpired)?,
        );
        if !totp::verify_code(&secret, code, self.unix_now()) {
            return Err(TwoFactorError::InvalidCode);
        }

        let codes = RecoveryCodeSet::generate();
        let sealed = self
            .totp_key(tenant_id, user_id)
            .and_then(|key| encrypt(&secret, key.as_bytes()))
            .and_then(|encrypted_secret| {
                let key = self.recovery_key(tenant_id, user_id)?;
                Ok((encrypted_secret, codes.seal(&key)?))
            });
        let (encrypted_secret, encrypted_recovery_codes) =
            self.crypto(tenant_id, "seal_totp_enrollment", sealed).await?;

        let now = self.clock.now();
        self.dal
            .two_factor()
            .insert(TwoFactorRecord {
                user_id,
                tenant_id,
                encrypted_secret,
                encrypted_recovery_codes,
                enabled_at: now,
                updated_at: now,
            })
            .await
            .map_err(|e| match e {
                StorageError::UniqueViolation(_) => TwoFactorError::AlreadyEnrolled,
                other => other.into(),
            })?;
        self.cache.delete(&setup_key(user_id)).await?;

        self.emit(
            events::TWO_FACTOR_ENABLED,
            Severity::Medium,
            Outcome::Success,
            tenant_id,
            user_id,
            json!({}),
        )
        .await;
        Ok(codes.plaintext())
    }

    /// Checks a TOTP code for an enrolled user.
    pub async fn verify(&self, tenant_id: Uuid, user_id: Uuid, code: &str) -> Result<(), TwoFactorError> {
        self.limit("2fa_verify", tenant_id, user_id).await?;
        let record = self.record(tenant_id, user_id).await?;
        self.check_totp(&record, code).await
    }

    /// Consumes a recovery code. Returns how many remain.
    pub async fn redeem_recovery_code(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        code: &str,
    ) -> Result<usize, TwoFactorError> {
        self.limit("2fa_recovery", tenant_id, user_id).await?;
        let record = self.record(tenant_id, user_id).await?;

        let key = self
            .crypto(tenant_id, "derive_recovery_key", self.recovery_key(tenant_id, user_id))
            .await?;
        let opened = RecoveryCodeSet::open(&record.encrypted_recovery_codes, &key);
        let mut codes = self.crypto(tenant_id, "open_recovery_codes", opened).await?;

        if let Err(e) = codes.redeem(code) {
            self.emit(
                events::RECOVERY_CODE_REJECTED,
                Severity::Medium,
                Outcome::Failure,
                tenant_id,
                user_id,
                json!({ "remaining": codes.remaining() }),
            )
            .await;
            return Err(e);
        }

        let sealed = self.crypto(tenant_id, "seal_recovery_codes", codes.seal(&key)).await?;
        match self
            .dal
            .two_factor()
            .update_recovery_codes(
                tenant_id,
                user_id,
                record.encrypted_recovery_codes.clone(),
                sealed,
                self.clock.now(),
            )
            .await
        {
            Ok(()) => {}
            // Another redemption rewrote the set since it was read
            Err(StorageError::Conflict { .. }) => return Err(TwoFactorError::RecoveryCodeInvalid),
            Err(e) => return Err(e.into()),
        }

        let remaining = codes.remaining();
        self.emit(
            events::RECOVERY_CODE_USED,
            Severity::Medium,
            Outcome::Success,
            tenant_id,
            user_id,
            json!({ "remaining": remaining }),
        )
        .await;
        Ok(remaining)
    }

    /// Replaces all recovery codes. Requires a live TOTP code.
    pub async fn regenerate_recovery_codes(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        totp_code: &str,
    ) -> Result<Vec<String>, TwoFactorError> {
        self.limit("2fa_verify", tenant_id, user_id).await?;
        let record = self.record(tenant_id, user_id).await?;
        self.check_totp(&record, totp_code).await?;

        let codes = RecoveryCodeSet::generate();
        let sealed = self
            .recovery_key(tenant_id, user_id)
            .and_then(|key| codes.seal(&key));
        let sealed = self.crypto(tenant_id, "seal_recovery_codes", sealed).await?;
        self.dal
            .two_factor()
            .update_recovery_codes(
                tenant_id,
                user_id,
                record.encrypted_recovery_codes.clone(),
                sealed,
                self.clock.now(),
            )
            .await?;

        self.emit(
            events::RECOVERY_CODES_REGENERATED,
            Severity::Medium,
            Outcome::Success,
            tenant_id,
            user_id,
            json!({}),
        )
        .await;
        Ok(codes.plaintext())
    }

    /// Removes the enrollment. Requires a live TOTP code.
    pub async fn disable(&self, tenant_id: Uuid, user_id: Uuid, totp_code: &str) -> Result<(), TwoFactorError> {
        self.limit("2fa_disable", tenant_id, user_id).await?;
        let record = self.record(tenant_id, user_id).await?;
        self.check_totp(&record, totp_code).await?;

        self.dal.two_factor().delete(tenant_id, user_id).await?;
        self.emit(
            events::TWO_FACTOR_DISABLED,
            Severity::High,
            Outcome::Success,
            tenant_id,
            user_id,
            json!({}),
        )
        .await;
        Ok(())
    }

    /// Gates an administrative operation (re-keying, signature settings) on a
    /// second factor.
    pub async fn authorize_admin(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        operation: &str,
        proof: SecondFactor<'_>,
    ) -> Result<(), TwoFactorError> {
        let result = match proof {
            SecondFactor::Totp(code) => self.verify(tenant_id, user_id, code).await,
            SecondFactor::RecoveryCode(code) => self
                .redeem_recovery_code(tenant_id, user_id, code)
                .await
                .map(|_| ()),
        };

        let (event_type, severity, outcome) = match &result {
            Ok(()) => (events::ADMIN_AUTHORIZED, Severity::Medium, Outcome::Success),
            Err(_) => (events::ADMIN_AUTHORIZATION_FAILED, Severity::High, Outcome::Blocked),
        };
        self.emit(
            event_type,
            severity,
            outcome,
            tenant_id,
            user_id,
            json!({ "operation": operation }),
        )
        .await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::database::Database;
    use crate::external::MemoryCache;
    use crate::security::audit::DbSecurityEventStore;

    struct Fixture {
        service: TwoFactorService,
        dal: DAL,
        clock: ManualClock,
        cache: MemoryCache,
        tenant: Uuid,
        user: Uuid,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::starting_now();
        let shared: SharedClock = Arc::new(clock.clone());
        let dal = DAL::new(Database::in_memory().unwrap());
        let cache = MemoryCache::new(shared.clone());
        let keys = Arc::new(KeyHierarchy::with_master_key(&[9u8; 32]).unwrap());
        let limiter = RateLimiter::new(Arc::new(cache.clone()), Duration::from_secs(60), 10);
        let events = SecurityEventSink::new(shared.clone())
            .with_store(Arc::new(DbSecurityEventStore::new(dal.clone())));
        let service = TwoFactorService::new(
            dal.clone(),
            keys,
            Arc::new(cache.clone()),
            limiter,
            events,
            shared,
        );
        Fixture {
            service,
            dal,
            clock,
            cache,
            tenant: Uuid::new_v4(),
            user: Uuid::new_v4(),
        }
    }

    fn code_for(setup: &TwoFactorSetup, clock: &ManualClock) -> String {
        let secret = totp::base32_decode(&setup.secret_base32).unwrap();
        totp::generate_code(&secret, clock.now().timestamp() as u64)
    }

    /// A well-formed code outside the accepted window around `t`.
    fn wrong_code(secret: &[u8], t: u64) -> String {
        let valid: Vec<String> = [t - 30, t, t + 30]
            .iter()
            .map(|step| totp::generate_code(secret, *step))
            .collect();
        (0..1000)
            .map(|n| format!("{n:06}"))
            .find(|c| !valid.contains(c))
            .unwrap()
    }

    async fn enroll(f: &Fixture) -> (String, Vec<String>) {
        let setup = f.service.begin_setup(f.tenant, f.user, "alice@example.at").await.unwrap();
        let codes = f
            .service
            .confirm_setup(f.tenant, f.user, &code_for(&setup, &f.clock))
            .await
            .unwrap();
        (setup.secret_base32.clone(), codes)
    }

    #[tokio::test]
    async fn test_setup_then_verify() {
        let f = fixture();
        let (secret, codes) = enroll(&f).await;
        assert_eq!(codes.len(), 10);

        let record = f.dal.two_factor().get(f.tenant, f.user).await.unwrap().unwrap();
        let raw = totp::base32_decode(&secret).unwrap();
        assert!(!record.encrypted_secret.windows(raw.len()).any(|w| w == raw.as_slice()));

        let now = f.clock.now().timestamp() as u64;
        let code = totp::generate_code(&raw, now);
        f.service.verify(f.tenant, f.user, &code).await.unwrap();
        assert!(matches!(
            f.service.verify(f.tenant, f.user, &wrong_code(&raw, now)).await,
            Err(TwoFactorError::InvalidCode)
        ));

        // Setup secret is gone from the cache once confirmed
        assert!(f.cache.get(&setup_key(f.user)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_setup_expires() {
        let f = fixture();
        let setup = f.service.begin_setup(f.tenant, f.user, "bob").await.unwrap();
        f.clock.advance(chrono::Duration::minutes(6));
        let code = code_for(&setup, &f.clock);
        assert!(matches!(
            f.service.confirm_setup(f.tenant, f.user, &code).await,
            Err(TwoFactorError::SetupExpired)
        ));
    }

    #[tokio::test]
    async fn test_wrong_setup_code_keeps_pending_secret() {
        let f = fixture();
        let setup = f.service.begin_setup(f.tenant, f.user, "bob").await.unwrap();
        let good = code_for(&setup, &f.clock);
        let raw = totp::base32_decode(&setup.secret_base32).unwrap();
        let bad = wrong_code(&raw, f.clock.now().timestamp() as u64);
        assert!(matches!(
            f.service.confirm_setup(f.tenant, f.user, &bad).await,
            Err(TwoFactorError::InvalidCode)
        ));
        assert!(!f.service.is_enabled(f.tenant, f.user).await.unwrap());
        f.service.confirm_setup(f.tenant, f.user, &good).await.unwrap();
        assert!(matches!(
            f.service.begin_setup(f.tenant, f.user, "bob").await,
            Err(TwoFactorError::AlreadyEnrolled)
        ));
    }

    #[tokio::test]
    async fn test_recovery_code_single_use() {
        let f = fixture();
        let (_, codes) = enroll(&f).await;

        let remaining = f.service.redeem_recovery_code(f.tenant, f.user, &codes[0]).await.unwrap();
        assert_eq!(remaining, 9);
        assert!(matches!(
            f.service.redeem_recovery_code(f.tenant, f.user, &codes[0]).await,
            Err(TwoFactorError::RecoveryCodeInvalid)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_redemptions_never_lose_a_write() {
        let f = fixture();
        let (_, codes) = enroll(&f).await;

        let (a, b) = tokio::join!(
            f.service.redeem_recovery_code(f.tenant, f.user, &codes[0]),
            f.service.redeem_recovery_code(f.tenant, f.user, &codes[1]),
        );
        let mut consumed = 0;
        for (result, code) in [(a, &codes[0]), (b, &codes[1])] {
            match result {
                Ok(_) => {
                    consumed += 1;
                    assert!(matches!(
                        f.service.redeem_recovery_code(f.tenant, f.user, code).await,
                        Err(TwoFactorError::RecoveryCodeInvalid)
                    ));
                }
                Err(e) => assert!(matches!(e, TwoFactorError::RecoveryCodeInvalid)),
            }
        }
        assert!(consumed >= 1);

        let remaining = f.service.redeem_recovery_code(f.tenant, f.user, &codes[2]).await.unwrap();
        assert_eq!(remaining, 10 - consumed - 1);
    }

    #[tokio::test]
    async fn test_regenerate_and_disable_require_totp() {
        let f = fixture();
        let (secret, old_codes) = enroll(&f).await;
        let raw = totp::base32_decode(&secret).unwrap();
        let now = f.clock.now().timestamp() as u64;
        let code = totp::generate_code(&raw, now);
        let bad = wrong_code(&raw, now);

        assert!(matches!(
            f.service.regenerate_recovery_codes(f.tenant, f.user, &bad).await,
            Err(TwoFactorError::InvalidCode)
        ));
        let new_codes = f
            .service
            .regenerate_recovery_codes(f.tenant, f.user, &code)
            .await
            .unwrap();
        assert_ne!(new_codes, old_codes);
        assert!(f
            .service
            .redeem_recovery_code(f.tenant, f.user, &old_codes[0])
            .await
            .is_err());

        assert!(f.service.disable(f.tenant, f.user, &bad).await.is_err());
        f.service.disable(f.tenant, f.user, &code).await.unwrap();
        assert!(!f.service.is_enabled(f.tenant, f.user).await.unwrap());
    }

    #[tokio::test]
    async fn test_disable_fails_closed_without_cache() {
        let f = fixture();
        let (secret, _) = enroll(&f).await;
        let raw = totp::base32_decode(&secret).unwrap();
        let code = totp::generate_code(&raw, f.clock.now().timestamp() as u64);

        f.cache.set_unavailable(true);
        assert!(matches!(
            f.service.disable(f.tenant, f.user, &code).await,
            Err(TwoFactorError::Unavailable(_))
        ));
        assert!(f.service.is_enabled(f.tenant, f.user).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_rate_limited() {
        let f = fixture();
        enroll(&f).await;
        for _ in 0..10 {
            let _ = f.service.verify(f.tenant, f.user, "999999").await;
        }
        assert!(matches!(
            f.service.verify(f.tenant, f.user, "999999").await,
            Err(TwoFactorError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn test_authorize_admin_with_recovery_code() {
        let f = fixture();
        let (_, codes) = enroll(&f).await;

        f.service
            .authorize_admin(f.tenant, f.user, "rekey", SecondFactor::RecoveryCode(&codes[3]))
            .await
            .unwrap();
        assert!(f
            .service
            .authorize_admin(f.tenant, f.user, "rekey", SecondFactor::RecoveryCode(&codes[3]))
            .await
            .is_err());

        let stored = f.dal.security_event().list_for_tenant(f.tenant).await.unwrap();
        assert!(stored.iter().any(|e| e.event_type == events::ADMIN_AUTHORIZED));
        assert!(stored.iter().any(|e| e.event_type == events::ADMIN_AUTHORIZATION_FAILED));
    }

    #[tokio::test]
    async fn test_secrets_are_tenant_bound() {
        let f = fixture();
        enroll(&f).await;
        let other_tenant = Uuid::new_v4();
        assert!(matches!(
            f.service.verify(other_tenant, f.user, "123456").await,
            Err(TwoFactorError::NotEnrolled)
        ));
    }
}
