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

//! Security event logging for SIEM integration.
//!
//! This module provides classification-driven logging for authentication and
//! administrative operations:
//! - Two-factor enrollment, verification and recovery code use
//! - Cross-tenant access attempts
//! - Rate limit rejections
//! - Cryptographic failures
//!
//! Severity selects the log level (info/low at `info`, medium at `warn`,
//! high/critical at `error`). Events can additionally be forwarded to a
//! [`SecurityEventStore`]; a failing store is logged and never blocks the
//! caller.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::context::RequestContext;
use crate::dal::DAL;
use crate::error::StorageError;
use crate::models::{Outcome, SecurityEvent, Severity};

/// Event types for security operations.
pub mod events {
    /// A caller addressed an entity owned by another tenant.
    pub const CROSS_TENANT_ATTEMPT: &str = "cross_tenant_attempt";

    /// 2FA enrollment confirmed.
    pub const TWO_FACTOR_ENABLED: &str = "2fa.enabled";
    /// 2FA enrollment removed.
    pub const TWO_FACTOR_DISABLED: &str = "2fa.disabled";
    /// TOTP code accepted.
    pub const TWO_FACTOR_VERIFY_SUCCESS: &str = "2fa.verify.success";
    /// TOTP code rejected.
    pub const TWO_FACTOR_VERIFY_FAILURE: &str = "2fa.verify.failure";

    /// Recovery code accepted and consumed.
    pub const RECOVERY_CODE_USED: &str = "2fa.recovery_code.used";
    /// Recovery code rejected (unknown or already used).
    pub const RECOVERY_CODE_REJECTED: &str = "2fa.recovery_code.rejected";
    /// Recovery codes replaced.
    pub const RECOVERY_CODES_REGENERATED: &str = "2fa.recovery_codes.regenerated";

    /// Administrative operation authorized by a second factor.
    pub const ADMIN_AUTHORIZED: &str = "admin.authorized";
    /// Administrative operation refused.
    pub const ADMIN_AUTHORIZATION_FAILED: &str = "admin.authorization_failed";

    /// Request rejected by the rate limiter.
    pub const RATE_LIMIT_EXCEEDED: &str = "rate_limit.exceeded";
    /// Key material or ciphertext failure.
    pub const CRYPTO_FAILURE: &str = "crypto.failure";
}

/// Optional external destination for security events.
#[async_trait]
pub trait SecurityEventStore: Send + Sync + std::fmt::Debug {
    async fn store(&self, event: &SecurityEvent) -> Result<(), StorageError>;
}

/// Stores security events through the DAL.
#[derive(Debug, Clone)]
pub struct DbSecurityEventStore {
    dal: DAL,
}

impl DbSecurityEventStore {
    pub fn new(dal: DAL) -> Self {
        Self { dal }
    }
}

#[async_trait]
impl SecurityEventStore for DbSecurityEventStore {
    async fn store(&self, event: &SecurityEvent) -> Result<(), StorageError> {
        self.dal.security_event().insert(event.clone()).await.map(|_| ())
    }
}

/// Emits security events to the log and the optional store.
#[derive(Debug, Clone)]
pub struct SecurityEventSink {
    store: Option<Arc<dyn SecurityEventStore>>,
    clock: SharedClock,
}

impl SecurityEventSink {
    /// Log-only sink.
    pub fn new(clock: SharedClock) -> Self {
        Self { store: None, clock }
    }

    pub fn with_store(mut self, store: Arc<dyn SecurityEventStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Stamps, logs and forwards `event`.
    pub async fn emit(&self, mut event: SecurityEvent) {
        event.occurred_at = self.clock.now();
        log_security_event(&event);

        if let Some(store) = &self.store {
            if let Err(e) = store.store(&event).await {
                tracing::error!(
                    event_type = %event.event_type,
                    event_id = %event.id,
                    error = %e,
                    "Failed to persist security event"
                );
            }
        }
    }

    /// Records an attempt to reach another tenant's entity.
    pub async fn cross_tenant_attempt(
        &self,
        ctx: &RequestContext,
        resource_type: &str,
        resource_id: Uuid,
    ) {
        let event = SecurityEvent::new(events::CROSS_TENANT_ATTEMPT, Severity::Medium, Outcome::Blocked)
            .tenant(ctx.tenant_id)
            .actor(ctx.actor_label())
            .client(ctx.client_ip.clone(), ctx.user_agent.clone())
            .metadata(json!({
                "resource_type": resource_type,
                "resource_id": resource_id,
            }));
        self.emit(event).await;
    }

    /// Records a rate limit rejection.
    pub async fn rate_limited(&self, tenant_id: Option<Uuid>, scope: &str, retry_after_secs: u64) {
        let event = SecurityEvent::new(events::RATE_LIMIT_EXCEEDED, Severity::Low, Outcome::Blocked)
            .tenant(tenant_id)
            .metadata(json!({ "scope": scope, "retry_after_secs": retry_after_secs }));
        self.emit(event).await;
    }

    /// Records a cryptographic failure. Details stay in the log, not the event.
    pub async fn crypto_failure(&self, tenant_id: Option<Uuid>, operation: &str) {
        let event = SecurityEvent::new(events::CRYPTO_FAILURE, Severity::High, Outcome::Failure)
            .tenant(tenant_id)
            .metadata(json!({ "operation": operation }));
        self.emit(event).await;
    }
}

/// Writes `event` to the tracing log at the level its severity calls for.
pub fn log_security_event(event: &SecurityEvent) {
    let tenant_id = event.tenant_id.map(|t| t.to_string()).unwrap_or_default();
    let actor_id = event.actor_id.as_deref().unwrap_or("");
    match event.severity {
        Severity::Info | Severity::Low => tracing::info!(
            event_type = %event.event_type,
            severity = %event.severity,
            outcome = %event.outcome,
            tenant_id = %tenant_id,
            actor_id = %actor_id,
            metadata = %event.metadata,
            "Security event"
        ),
        Severity::Medium => tracing::warn!(
            event_type = %event.event_type,
            severity = %event.severity,
            outcome = %event.outcome,
            tenant_id = %tenant_id,
            actor_id = %actor_id,
            metadata = %event.metadata,
            "Security event"
        ),
        Severity::High | Severity::Critical => tracing::error!(
            event_type = %event.event_type,
            severity = %event.severity,
            outcome = %event.outcome,
            tenant_id = %tenant_id,
            actor_id = %actor_id,
            metadata = %event.metadata,
            "Security event"
        ),
    }
}

/// Log a master key load.
pub fn log_master_key_loaded(source: &str, production: bool) {
    tracing::info!(
        event_type = "key.master.loaded",
        source = %source,
        production,
        "Master key loaded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::database::Database;
    use std::io::Write;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    /// Captures formatted log output for assertions.
    #[derive(Clone, Default)]
    struct CaptureWriter {
        buf: Arc<Mutex<Vec<u8>>>,
    }

    impl CaptureWriter {
        fn contents(&self) -> String {
            String::from_utf8(self.buf.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for CaptureWriter {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.buf.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture<F: FnOnce()>(f: F) -> String {
        let writer = CaptureWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        writer.contents()
    }

    #[derive(Debug)]
    struct FailingStore;

    #[async_trait]
    impl SecurityEventStore for FailingStore {
        async fn store(&self, _event: &SecurityEvent) -> Result<(), StorageError> {
            Err(StorageError::InvalidRecord("store offline".into()))
        }
    }

    #[test]
    fn test_severity_selects_level() {
        let low = SecurityEvent::new(events::RECOVERY_CODE_USED, Severity::Low, Outcome::Success);
        let output = capture(|| log_security_event(&low));
        assert!(output.contains("INFO"));
        assert!(output.contains("2fa.recovery_code.used"));

        let medium = SecurityEvent::new(events::CROSS_TENANT_ATTEMPT, Severity::Medium, Outcome::Blocked);
        let output = capture(|| log_security_event(&medium));
        assert!(output.contains("WARN"));

        let critical = SecurityEvent::new(events::CRYPTO_FAILURE, Severity::Critical, Outcome::Failure);
        let output = capture(|| log_security_event(&critical));
        assert!(output.contains("ERROR"));
    }

    #[tokio::test]
    async fn test_emit_persists_through_db_store() {
        let dal = DAL::new(Database::in_memory().unwrap());
        let clock = ManualClock::starting_now();
        let sink = SecurityEventSink::new(Arc::new(clock.clone()))
            .with_store(Arc::new(DbSecurityEventStore::new(dal.clone())));

        let tenant = Uuid::new_v4();
        let ctx = RequestContext::user(tenant, Uuid::new_v4()).with_client("192.168.1.77", "curl/8");
        sink.cross_tenant_attempt(&ctx, "signature_request", Uuid::new_v4()).await;

        let stored = dal.security_event().list_for_tenant(tenant).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_type, events::CROSS_TENANT_ATTEMPT);
        assert_eq!(stored[0].severity, Severity::Medium);
        assert_eq!(stored[0].client_ip.as_deref(), Some("192.168.1.0"));
        assert_eq!(stored[0].occurred_at, clock.now());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_store_failure_does_not_propagate() {
        let sink = SecurityEventSink::new(Arc::new(ManualClock::starting_now()))
            .with_store(Arc::new(FailingStore));
        sink.rate_limited(None, "login", 30).await;
        assert!(logs_contain("Failed to persist security event"));
    }
}
