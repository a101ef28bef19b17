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

//! Service facade wiring the signature core together.
//!
//! [`SignatureService`] owns one instance of each component, shares a single
//! [`DAL`], clock and security event sink between them, and routes OIDC
//! callbacks to the signer or batch flow by the session's binding.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditLogger, AuditMode, AuditTrail};
use crate::batch::BatchExecutor;
use crate::clock::SharedClock;
use crate::config::SignatureConfig;
use crate::context::RequestContext;
use crate::crypto::KeyHierarchy;
use crate::dal::DAL;
use crate::error::SignatureError;
use crate::external::{Cache, DocumentStore, Mailer};
use crate::models::{Batch, SessionBinding, Signer};
use crate::notifier::Notifier;
use crate::oidc::{CallbackParams, IdentityProvider};
use crate::orchestrator::{OidcHandshake, SignatureOrchestrator, SigningOutcome};
use crate::security::{DbSecurityEventStore, RateLimiter, SecurityEventSink, TwoFactorService};
use crate::signing_api::SigningApi;
use crate::sweeper::ExpirySweeper;

/// External systems the core talks to.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub signing_api: Arc<dyn SigningApi>,
    pub identity_provider: Arc<dyn IdentityProvider>,
    pub documents: Arc<dyn DocumentStore>,
    pub mailer: Arc<dyn Mailer>,
    pub cache: Arc<dyn Cache>,
    pub clock: SharedClock,
}

/// Result of a routed OIDC callback.
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    Signer(SigningOutcome),
    Batch(Batch),
}

#[derive(Debug)]
pub struct SignatureService {
    dal: DAL,
    config: SignatureConfig,
    orchestrator: SignatureOrchestrator,
    batches: BatchExecutor,
    handshake: OidcHandshake,
    notifier: Notifier,
    sweeper: ExpirySweeper,
    two_factor: TwoFactorService,
    audit: Arc<AuditLogger>,
    security: SecurityEventSink,
}

impl SignatureService {
    /// Builds every component. Starts the async audit consumer, so this must
    /// be called inside a Tokio runtime.
    pub fn new(
        dal: DAL,
        config: SignatureConfig,
        collaborators: Collaborators,
        keys: Arc<KeyHierarchy>,
    ) -> Self {
        let Collaborators {
            signing_api,
            identity_provider,
            documents,
            mailer,
            cache,
            clock,
        } = collaborators;

        let security = SecurityEventSink::new(clock.clone())
            .with_store(Arc::new(DbSecurityEventStore::new(dal.clone())));
        let rate_limiter = RateLimiter::new(
            cache.clone(),
            config.rate_limit_window(),
            config.rate_limit_max_attempts(),
        );

        let handshake = OidcHandshake::new(dal.clone(), identity_provider, clock.clone())
            .with_pending_ttl(config.oidc_pending_ttl());
        let notifier = Notifier::new(
            dal.clone(),
            mailer,
            AuditTrail::new(dal.clone(), clock.clone()),
            config.portal_base_url(),
        );

        let orchestrator = SignatureOrchestrator::new(
            dal.clone(),
            config.clone(),
            signing_api.clone(),
            documents.clone(),
            handshake.clone(),
            notifier.clone(),
            security.clone(),
            clock.clone(),
        )
        .with_rate_limiter(rate_limiter.clone());

        let batches = BatchExecutor::new(
            dal.clone(),
            config.clone(),
            signing_api,
            documents,
            handshake.clone(),
            security.clone(),
            clock.clone(),
        )
        .with_rate_limiter(rate_limiter.clone());

        let sweeper = ExpirySweeper::new(dal.clone(), &config, clock.clone());

        let two_factor = TwoFactorService::new(
            dal.clone(),
            keys,
            cache,
            rate_limiter,
            security.clone(),
            clock.clone(),
        )
        .with_issuer(config.totp_issuer())
        .with_setup_ttl(config.two_factor_setup_ttl());

        let audit = Arc::new(
            AuditLogger::new(
                dal.clone(),
                clock,
                AuditMode::Async {
                    buffer: config.audit_buffer(),
                },
            )
            .with_retention_batch(config.audit_retention_batch()),
        );

        Self {
            dal,
            config,
            orchestrator,
            batches,
            handshake,
            notifier,
            sweeper,
            two_factor,
            audit,
            security,
        }
    }

    pub fn dal(&self) -> &DAL {
        &self.dal
    }

    pub fn config(&self) -> &SignatureConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &SignatureOrchestrator {
        &self.orchestrator
    }

    pub fn batches(&self) -> &BatchExecutor {
        &self.batches
    }

    pub fn sweeper(&self) -> &ExpirySweeper {
        &self.sweeper
    }

    pub fn two_factor(&self) -> &TwoFactorService {
        &self.two_factor
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn security(&self) -> &SecurityEventSink {
        &self.security
    }

    /// Claims the session named by the callback and resumes its flow.
    pub async fn handle_callback(
        &self,
        ctx: &RequestContext,
        params: &CallbackParams,
    ) -> Result<CallbackOutcome, SignatureError> {
        let session = self.handshake.claim(params).await?;
        match session.binding {
            SessionBinding::Signer(_) => self
                .orchestrator
                .complete_signing(ctx, &session, params)
                .await
                .map(CallbackOutcome::Signer),
            SessionBinding::Batch(_) => self
                .batches
                .complete(ctx, &session, params)
                .await
                .map(CallbackOutcome::Batch),
        }
    }

    /// Reminds a notified signer of the caller's tenant.
    pub async fn send_reminder(
        &self,
        ctx: &RequestContext,
        signer_id: Uuid,
    ) -> Result<Signer, SignatureError> {
        let tenant_id = ctx.require_tenant()?;
        self.notifier.send_reminder(tenant_id, signer_id).await
    }

    /// Runs the expiry sweeper on the current runtime until [`shutdown`](Self::shutdown).
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let sweeper = self.sweeper.clone();
        tokio::spawn(async move { sweeper.run().await })
    }

    /// Stops the sweeper and drains queued audit writes.
    pub async fn shutdown(&self) {
        self.sweeper.shutdown();
        self.audit.shutdown().await;
        info!("signature service stopped");
    }
}
