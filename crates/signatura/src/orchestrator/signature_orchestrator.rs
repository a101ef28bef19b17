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

//! Multi-party signature request workflow.
//!
//! Drives requests and signers through their state machines:
//!
//! ```text
//! request: pending ──first signer starts──▶ in_progress ──all signed──▶ completed
//!          pending | in_progress ──cancel──▶ cancelled
//! signer:  pending ──notify──▶ notified ──start──▶ signing ──callback + sign──▶ signed
//! ```
//!
//! Every state change is a compare-and-set in the DAL. The remote signing
//! call is the only step outside the store; a failure there rolls the signer
//! back to `notified` so they can try again with a fresh handshake.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::handshake::{OidcHandshake, VerifiedIdentity};
use super::types::{CreateSignatureRequest, RequestDetails, SigningInfo, SigningOutcome};
use crate::audit::{attribute, AuditTrail};
use crate::clock::SharedClock;
use crate::config::{SignatureConfig, MAX_EXPIRY_DAYS};
use crate::context::RequestContext;
use crate::crypto::sha256_hex;
use crate::dal::DAL;
use crate::error::{SignatureError, StorageError};
use crate::external::DocumentStore;
use crate::manifest::{ManifestSignature, SignatureManifest};
use crate::models::{
    ActorType, CertificateInfo, NewSignatureAuditEvent, OidcSession, RequestStatus,
    SessionBinding, SignatureEventType, SignatureField, SignatureRequest, Signer, SignerSignature,
    SignerStatus, UsageRecord,
};
use crate::notifier::Notifier;
use crate::oidc::CallbackParams;
use crate::security::{FailureMode, RateLimitError, RateLimiter, SecurityEventSink};
use crate::signing_api::{sign_within, SignRequest, SigningApi};

const RESOURCE: &str = "signature_request";

/// Creates, tracks and completes signature requests.
#[derive(Debug, Clone)]
pub struct SignatureOrchestrator {
    dal: DAL,
    config: SignatureConfig,
    signing_api: Arc<dyn SigningApi>,
    documents: Arc<dyn DocumentStore>,
    handshake: OidcHandshake,
    notifier: Notifier,
    trail: AuditTrail,
    security: SecurityEventSink,
    rate_limiter: Option<RateLimiter>,
    clock: SharedClock,
}

impl SignatureOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dal: DAL,
        config: SignatureConfig,
        signing_api: Arc<dyn SigningApi>,
        documents: Arc<dyn DocumentStore>,
        handshake: OidcHandshake,
        notifier: Notifier,
        security: SecurityEventSink,
        clock: SharedClock,
    ) -> Self {
        Self {
            trail: AuditTrail::new(dal.clone(), clock.clone()),
            dal,
            config,
            signing_api,
            documents,
            handshake,
            notifier,
            security,
            rate_limiter: None,
            clock,
        }
    }

    /// Rate-limits listings (fail-open).
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Opens a request and invites the eligible signers.
    pub async fn create_request(
        &self,
        ctx: &RequestContext,
        input: CreateSignatureRequest,
    ) -> Result<SignatureRequest, SignatureError> {
        let tenant_id = ctx.require_tenant()?;
        let created_by = ctx
            .actor_id
            .as_deref()
            .and_then(|a| Uuid::parse_str(a).ok())
            .ok_or_else(|| SignatureError::Validation("request creator must be a user".into()))?;
        let orders = validate_request(&input)?;

        let now = self.clock.now();
        let days = input.expires_in_days.unwrap_or(self.config.link_expiry_days());
        let expires_at = Duration::try_days(days)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| SignatureError::Validation(format!("expiry of {days} days is out of range")))?;
        // A signer link never outlives its request.
        let link_ttl = Duration::try_days(self.config.link_expiry_days())
            .unwrap_or(expires_at - now)
            .min(expires_at - now);

        let mut request = SignatureRequest::new(
            tenant_id,
            input.document_id,
            created_by,
            expires_at,
            input.is_sequential,
            now,
        );
        request.name = input.name;
        request.message = input.message;

        let signers: Vec<Signer> = input
            .signers
            .iter()
            .zip(&orders)
            .map(|(s, order)| {
                Signer::new(
                    request.id,
                    tenant_id,
                    s.email.trim(),
                    s.name.trim(),
                    *order,
                    link_ttl,
                    now,
                )
            })
            .collect();
        request.current_signer_index = orders.iter().copied().min().unwrap_or(0);

        let fields: Vec<SignatureField> = input
            .fields
            .iter()
            .map(|f| SignatureField {
                id: Uuid::new_v4(),
                request_id: request.id,
                signer_id: f.signer.map(|i| signers[i].id),
                page: f.page,
                x: f.x,
                y: f.y,
                width: f.width,
                height: f.height,
                show_name: f.show_name,
                show_date: f.show_date,
                show_reason: f.show_reason,
                reason: f.reason.clone(),
            })
            .collect();

        let signer_count = signers.len();
        let request = self
            .dal
            .signature_request()
            .create(request, signers, fields)
            .await?;

        self.trail
            .record_as(
                ctx,
                NewSignatureAuditEvent::new(tenant_id, SignatureEventType::RequestCreated)
                    .request(request.id)
                    .details(json!({
                        "signer_count": signer_count,
                        "is_sequential": request.is_sequential,
                        "expires_at": request.expires_at,
                    })),
            )
            .await?;
        info!(
            tenant_id = %tenant_id,
            request_id = %request.id,
            signer_count,
            sequential = request.is_sequential,
            "signature request created"
        );

        self.notifier.notify_eligible(&request).await?;
        Ok(request)
    }

    /// Loads a request with its signers and fields.
    pub async fn get_request(
        &self,
        ctx: &RequestContext,
        request_id: Uuid,
    ) -> Result<RequestDetails, SignatureError> {
        let request = self.load_request(ctx, request_id).await?;
        let signers = self
            .dal
            .signer()
            .list_for_request(request.tenant_id, request.id)
            .await?;
        let fields = self
            .dal
            .signature_field()
            .list_for_request(request.tenant_id, request.id)
            .await?;
        Ok(RequestDetails {
            request,
            signers,
            fields,
        })
    }

    /// Newest-first listing of the caller's requests.
    pub async fn list_requests(
        &self,
        ctx: &RequestContext,
        status: Option<RequestStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SignatureRequest>, SignatureError> {
        let tenant_id = ctx.require_tenant()?;
        if let Some(limiter) = &self.rate_limiter {
            if let Err(e) = limiter
                .check("list_requests", &ctx.actor_label(), FailureMode::Open)
                .await
            {
                if let RateLimitError::Exceeded { retry_after_secs } = &e {
                    self.security
                        .rate_limited(Some(tenant_id), "list_requests", *retry_after_secs)
                        .await;
                }
                return Err(e.into());
            }
        }
        Ok(self
            .dal
            .signature_request()
            .list(tenant_id, status, limit, offset)
            .await?)
    }

    /// Cancels an open request. Open signers are closed with it.
    pub async fn cancel_request(
        &self,
        ctx: &RequestContext,
        request_id: Uuid,
        reason: Option<String>,
    ) -> Result<SignatureRequest, SignatureError> {
        let request = self.load_request(ctx, request_id).await?;
        let previous = request.status;
        let cancelled = self
            .dal
            .signature_request()
            .cancel(request.tenant_id, request.id, self.clock.now())
            .await?;

        self.trail
            .record_as(
                ctx,
                NewSignatureAuditEvent::new(cancelled.tenant_id, SignatureEventType::RequestCancelled)
                    .request(cancelled.id)
                    .details(json!({ "previous_status": previous.as_str(), "reason": reason })),
            )
            .await?;
        Ok(cancelled)
    }

    /// Resolves a signing link.
    ///
    /// Fails with [`SignatureError::InvalidToken`] for unknown, used or
    /// expired tokens and closed requests, and with
    /// [`SignatureError::WaitingForPreviousSigner`] while an earlier signer of
    /// a sequential request has not signed.
    pub async fn get_signing_info(&self, token: &str) -> Result<SigningInfo, SignatureError> {
        let (request, signer, signers) = self.authorize_token(token).await?;
        let fields = self
            .dal
            .signature_field()
            .list_for_signer(signer.tenant_id, request.id, signer.id)
            .await?;
        Ok(SigningInfo {
            request,
            signer,
            fields,
            total_signers: signers.len(),
        })
    }

    /// Moves the signer to `signing` and opens the identity handshake.
    /// Returns the authorization URL.
    pub async fn start_signing(
        &self,
        ctx: &RequestContext,
        token: &str,
        redirect_after: Option<String>,
    ) -> Result<String, SignatureError> {
        let (request, signer, _) = self.authorize_token(token).await?;
        let tenant_id = signer.tenant_id;

        let url = self
            .handshake
            .open(tenant_id, SessionBinding::Signer(signer.id), redirect_after)
            .await?;

        let now = self.clock.now();
        self.dal.signer().begin_signing(tenant_id, signer.id, now).await?;
        self.dal
            .signature_request()
            .mark_in_progress(tenant_id, request.id, now)
            .await?;

        self.trail
            .record(signer_event(ctx, &signer, SignatureEventType::SigningStarted))
            .await?;
        Ok(url)
    }

    /// Finishes a signer handshake: authenticates, signs the document hash
    /// remotely and runs completion detection.
    pub async fn complete_signing(
        &self,
        ctx: &RequestContext,
        session: &OidcSession,
        params: &CallbackParams,
    ) -> Result<SigningOutcome, SignatureError> {
        let result = self.sign_for_session(ctx, session, params).await;
        self.handshake.finish(session).await;
        result
    }

    async fn sign_for_session(
        &self,
        ctx: &RequestContext,
        session: &OidcSession,
        params: &CallbackParams,
    ) -> Result<SigningOutcome, SignatureError> {
        let signer_id = session
            .binding
            .signer_id()
            .ok_or(SignatureError::InvalidSession)?;
        let tenant_id = session.tenant_id;
        let signer = self.dal.signer().get(tenant_id, signer_id).await?;
        if signer.status != SignerStatus::Signing {
            return Err(SignatureError::InvalidTransition(format!(
                "signer {} is {}",
                signer.id, signer.status
            )));
        }

        let request = self
            .dal
            .signature_request()
            .get(tenant_id, signer.request_id)
            .await?;
        let now = self.clock.now();
        if !request.status.is_open() || request.is_expired_at(now) || !signer.token_valid_at(now) {
            return Err(self
                .fail_signing(ctx, &signer, "validation", SignatureError::InvalidToken)
                .await);
        }

        let identity = match self.handshake.authenticate(session, params).await {
            Ok(identity) => identity,
            Err(e) => return Err(self.fail_signing(ctx, &signer, "authentication", e).await),
        };

        let content = match self.documents.get_document_content(request.document_id).await {
            Ok(content) => content,
            Err(e) => return Err(self.fail_signing(ctx, &signer, "document", e.into()).await),
        };
        let document_hash = sha256_hex(&content);

        let sign_request = SignRequest::sha256(document_hash.clone(), identity.subject.clone())
            .with_reason(format!("Signature on {}", request.title()));
        let timeout = self.config.signing_timeout();
        let response = match self
            .config
            .signing_retry()
            .run("sign", || sign_within(self.signing_api.as_ref(), &sign_request, timeout))
            .await
        {
            Ok(response) => response,
            Err(e) => return Err(self.fail_signing(ctx, &signer, "signing", e.into()).await),
        };

        let certificate = self.certificate_info(&identity).await;
        let signed = self
            .dal
            .signer()
            .mark_signed(
                tenant_id,
                signer.id,
                SignerSignature {
                    signature_value: response.signature_value,
                    signature_timestamp: response.timestamp_token,
                    certificate,
                    identity_subject: identity.subject.clone(),
                    bpk_hash: identity.bpk_hash.clone(),
                    signed_at: self.clock.now(),
                },
            )
            .await?;

        self.trail
            .record(
                signer_event(ctx, &signed, SignatureEventType::SigningCompleted).details(json!({
                    "order_index": signed.order_index,
                    "certificate_serial": signed.certificate.as_ref().map(|c| c.serial_number.clone()),
                })),
            )
            .await?;
        info!(
            tenant_id = %tenant_id,
            request_id = %request.id,
            signer_id = %signed.id,
            "signer signed"
        );

        let (request, next_signer) = self.advance(&request, &document_hash).await?;
        Ok(SigningOutcome {
            request,
            signer: signed,
            next_signer,
            redirect_after: session.redirect_after.clone(),
        })
    }

    /// Completion detection after a signer reached `signed`.
    async fn advance(
        &self,
        request: &SignatureRequest,
        document_hash: &str,
    ) -> Result<(SignatureRequest, Option<Uuid>), SignatureError> {
        let signers = self
            .dal
            .signer()
            .list_for_request(request.tenant_id, request.id)
            .await?;

        if signers.iter().all(|s| s.status == SignerStatus::Signed) {
            let completed = self.complete_request(request, &signers, document_hash).await?;
            return Ok((completed, None));
        }

        if !request.is_sequential {
            return Ok((request.clone(), None));
        }

        let Some(next) = signers.iter().find(|s| s.status != SignerStatus::Signed) else {
            return Ok((request.clone(), None));
        };
        let request = self
            .dal
            .signature_request()
            .advance_signer_index(request.tenant_id, request.id, next.order_index, self.clock.now())
            .await?;
        let notified = self.notifier.notify_eligible(&request).await?;
        Ok((request, notified.first().map(|s| s.id)))
    }

    async fn complete_request(
        &self,
        request: &SignatureRequest,
        signers: &[Signer],
        document_hash: &str,
    ) -> Result<SignatureRequest, SignatureError> {
        let now = self.clock.now();
        let manifest = SignatureManifest::new(
            request.document_id,
            document_hash,
            request.title(),
            signers.iter().filter_map(ManifestSignature::from_signer).collect(),
            now,
        );
        let bytes = manifest
            .to_bytes()
            .map_err(|e| SignatureError::Internal(format!("failed to encode manifest: {e}")))?;
        let signed_document_id = self
            .documents
            .store_signed_document(request.tenant_id, request.document_id, bytes, request.title())
            .await?;

        let completed = match self
            .dal
            .signature_request()
            .complete(request.tenant_id, request.id, signed_document_id, now)
            .await
        {
            Ok(completed) => completed,
            Err(StorageError::Conflict { .. }) => {
                // Another callback completed it first.
                return Ok(self
                    .dal
                    .signature_request()
                    .get(request.tenant_id, request.id)
                    .await?);
            }
            Err(e) => return Err(e.into()),
        };

        let signature_count = i32::try_from(signers.len()).unwrap_or(i32::MAX);
        self.dal
            .usage()
            .record(
                UsageRecord::new(
                    completed.tenant_id,
                    signature_count,
                    self.config.signature_cost_cents(),
                    now,
                )
                .for_request(completed.id),
            )
            .await?;

        self.trail
            .record(
                NewSignatureAuditEvent::new(completed.tenant_id, SignatureEventType::RequestCompleted)
                    .request(completed.id)
                    .details(json!({
                        "signed_document_id": signed_document_id,
                        "signer_count": signers.len(),
                    })),
            )
            .await?;
        info!(
            tenant_id = %completed.tenant_id,
            request_id = %completed.id,
            "signature request completed"
        );

        self.notifier.notify_completed(&completed, signers).await;
        Ok(completed)
    }

    /// Rolls the signer back to `notified` and records the failure. Returns
    /// `error` for the caller to propagate.
    async fn fail_signing(
        &self,
        ctx: &RequestContext,
        signer: &Signer,
        stage: &str,
        error: SignatureError,
    ) -> SignatureError {
        let code = failure_code(&error);
        warn!(
            tenant_id = %signer.tenant_id,
            signer_id = %signer.id,
            stage,
            code = %code,
            error = %error,
            "signing failed"
        );

        if let Err(e) = self
            .dal
            .signer()
            .rollback_to_notified(signer.tenant_id, signer.id, self.clock.now())
            .await
        {
            warn!(signer_id = %signer.id, error = %e, "failed to roll signer back");
        }

        let event = signer_event(ctx, signer, SignatureEventType::SigningFailed).details(json!({
            "stage": stage,
            "error_code": code,
        }));
        if let Err(e) = self.trail.record(event).await {
            warn!(signer_id = %signer.id, error = %e, "failed to record signing failure");
        }
        error
    }

    async fn certificate_info(&self, identity: &VerifiedIdentity) -> Option<CertificateInfo> {
        match self.signing_api.get_certificate_info(&identity.subject).await {
            Ok(details) => Some(CertificateInfo {
                subject: details.subject,
                serial_number: details.serial_number,
                issuer: details.issuer,
                valid_from: Some(details.valid_from),
                valid_until: Some(details.valid_until),
            }),
            Err(e) => {
                warn!(error = %e, "certificate details unavailable");
                None
            }
        }
    }

    /// Token checks shared by signing info and start.
    async fn authorize_token(
        &self,
        token: &str,
    ) -> Result<(SignatureRequest, Signer, Vec<Signer>), SignatureError> {
        let signer = match self.dal.signer().find_by_token(token).await {
            Ok(signer) => signer,
            Err(StorageError::NotFound { .. }) => return Err(SignatureError::InvalidToken),
            Err(e) => return Err(e.into()),
        };
        let now = self.clock.now();
        if !signer.token_valid_at(now) || !signer.status.is_open() {
            return Err(SignatureError::InvalidToken);
        }

        let request = self
            .dal
            .signature_request()
            .get(signer.tenant_id, signer.request_id)
            .await?;
        if !request.status.is_open() || request.is_expired_at(now) {
            return Err(SignatureError::InvalidToken);
        }

        let signers = self
            .dal
            .signer()
            .list_for_request(signer.tenant_id, request.id)
            .await?;
        if request.is_sequential
            && signers
                .iter()
                .any(|s| s.order_index < signer.order_index && s.status != SignerStatus::Signed)
        {
            return Err(SignatureError::WaitingForPreviousSigner);
        }
        Ok((request, signer, signers))
    }

    /// Loads a request of the caller's tenant. A lookup of another tenant's
    /// request is logged as a security event and reported as not found.
    async fn load_request(
        &self,
        ctx: &RequestContext,
        request_id: Uuid,
    ) -> Result<SignatureRequest, SignatureError> {
        let tenant_id = ctx.require_tenant()?;
        match self.dal.signature_request().get(tenant_id, request_id).await {
            Ok(request) => Ok(request),
            Err(StorageError::NotFound { .. }) => {
                if let Some(owner) = self.dal.signature_request().owner_tenant(request_id).await {
                    if owner != tenant_id {
                        self.security.cross_tenant_attempt(ctx, RESOURCE, request_id).await;
                    }
                }
                Err(SignatureError::NotFound(format!("{RESOURCE} {request_id}")))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn signer_event(
    ctx: &RequestContext,
    signer: &Signer,
    event_type: SignatureEventType,
) -> NewSignatureAuditEvent {
    attribute(
        NewSignatureAuditEvent::new(signer.tenant_id, event_type)
            .request(signer.request_id)
            .signer(signer.id),
        ctx,
    )
    .actor(ActorType::Signer, Some(signer.id.to_string()))
}

fn failure_code(error: &SignatureError) -> String {
    match error {
        SignatureError::SigningApi(e) => e.code.as_str().to_string(),
        SignatureError::Oidc(e) => e.code().unwrap_or("oidc_error").to_string(),
        SignatureError::Document(_) => "document_unavailable".to_string(),
        SignatureError::InvalidToken => "invalid_token".to_string(),
        _ => "internal".to_string(),
    }
}

/// Checks the request input. Returns the effective order index per signer.
fn validate_request(input: &CreateSignatureRequest) -> Result<Vec<i32>, SignatureError> {
    if input.signers.is_empty() {
        return Err(SignatureError::Validation("at least one signer is required".into()));
    }
    if let Some(days) = input.expires_in_days {
        if !(1..=MAX_EXPIRY_DAYS).contains(&days) {
            return Err(SignatureError::Validation(format!(
                "expiry must be between 1 and {MAX_EXPIRY_DAYS} days"
            )));
        }
    }

    let mut orders = Vec::with_capacity(input.signers.len());
    let mut seen = HashSet::new();
    for (position, signer) in input.signers.iter().enumerate() {
        let email = signer.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(SignatureError::Validation(format!(
                "signer {position} has an invalid email address"
            )));
        }
        if signer.name.trim().is_empty() {
            return Err(SignatureError::Validation(format!("signer {position} has no name")));
        }
        let order = signer
            .order_index
            .unwrap_or_else(|| i32::try_from(position).unwrap_or(i32::MAX));
        if order < 0 {
            return Err(SignatureError::Validation(format!(
                "signer {position} has a negative order index"
            )));
        }
        if !seen.insert(order) {
            return Err(SignatureError::Validation(format!(
                "duplicate signer order index {order}"
            )));
        }
        orders.push(order);
    }

    for (position, field) in input.fields.iter().enumerate() {
        if let Some(signer) = field.signer {
            if signer >= input.signers.len() {
                return Err(SignatureError::Validation(format!(
                    "field {position} refers to unknown signer {signer}"
                )));
            }
        }
        let candidate = SignatureField {
            id: Uuid::nil(),
            request_id: Uuid::nil(),
            signer_id: None,
            page: field.page,
            x: field.x,
            y: field.y,
            width: field.width,
            height: field.height,
            show_name: field.show_name,
            show_date: field.show_date,
            show_reason: field.show_reason,
            reason: None,
        };
        candidate
            .validate()
            .map_err(|e| SignatureError::Validation(format!("field {position}: {e}")))?;
    }
    Ok(orders)
}
