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

//! Bounded-parallel batch signing.
//!
//! One handshake authenticates the signer for every document in the batch.
//! Items are then signed by spawned tasks gated by a counting semaphore of
//! `batch_workers` permits. A task holds its permit from claim to final
//! status, so at most that many items are in `signing` at once. Items fail
//! independently; the aggregate status is computed after every task returned.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audit::{attribute, AuditTrail};
use crate::clock::SharedClock;
use crate::config::SignatureConfig;
use crate::context::RequestContext;
use crate::crypto::sha256_hex;
use crate::dal::DAL;
use crate::error::{SignatureError, StorageError};
use crate::external::DocumentStore;
use crate::manifest::{ManifestSignature, SignatureManifest};
use crate::models::{
    ActorType, Batch, BatchItem, BatchItemStatus, BatchStatus, NewSignatureAuditEvent, OidcSession,
    SessionBinding, SignatureEventType, UsageRecord,
};
use crate::oidc::CallbackParams;
use crate::orchestrator::{OidcHandshake, VerifiedIdentity};
use crate::security::{FailureMode, RateLimitError, RateLimiter, SecurityEventSink};
use crate::signing_api::{sign_within, SignRequest, SigningApi};

const CREATE_SCOPE: &str = "batch_create";

/// One document to include in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchDocument {
    pub document_id: Uuid,
    pub title: Option<String>,
}

impl BatchDocument {
    pub fn new(document_id: Uuid) -> Self {
        Self {
            document_id,
            title: None,
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateBatch {
    pub name: Option<String>,
    pub documents: Vec<BatchDocument>,
}

impl CreateBatch {
    pub fn new(documents: Vec<BatchDocument>) -> Self {
        Self {
            name: None,
            documents,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A batch with its items in submission order.
#[derive(Debug, Clone)]
pub struct BatchDetails {
    pub batch: Batch,
    pub items: Vec<BatchItem>,
}

/// Result of one item task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Signed,
    Failed,
    /// Item was not claimable (already taken or no longer pending).
    Skipped,
}

/// Everything an item task needs, cloned into each spawned task.
#[derive(Debug, Clone)]
struct ItemWorker {
    dal: DAL,
    signing_api: Arc<dyn SigningApi>,
    documents: Arc<dyn DocumentStore>,
    clock: SharedClock,
    timeout: Duration,
    tenant_id: Uuid,
    identity_subject: String,
}

impl ItemWorker {
    async fn run(self, item: BatchItem) -> ItemOutcome {
        let now = self.clock.now();
        match self
            .dal
            .batch()
            .claim_item(self.tenant_id, item.batch_id, item.id, now)
            .await
        {
            Ok(_) => {}
            Err(StorageError::Conflict { .. }) => {
                debug!(item_id = %item.id, "batch item already claimed");
                return ItemOutcome::Skipped;
            }
            Err(e) => {
                error!(item_id = %item.id, error = %e, "failed to claim batch item");
                return ItemOutcome::Skipped;
            }
        }

        match self.sign(&item).await {
            Ok(()) => ItemOutcome::Signed,
            Err(e) => {
                warn!(
                    batch_id = %item.batch_id,
                    item_id = %item.id,
                    position = item.position,
                    error = %e,
                    "batch item failed"
                );
                if let Err(e) = self
                    .dal
                    .batch()
                    .mark_item_failed(
                        self.tenant_id,
                        item.batch_id,
                        item.id,
                        e.to_string(),
                        self.clock.now(),
                    )
                    .await
                {
                    error!(item_id = %item.id, error = %e, "failed to record batch item failure");
                }
                ItemOutcome::Failed
            }
        }
    }

    async fn sign(&self, item: &BatchItem) -> Result<(), SignatureError> {
        let content = self.documents.get_document_content(item.document_id).await?;
        let hash = sha256_hex(&content);
        let title = item.title.clone().unwrap_or_else(|| item.document_id.to_string());

        let request = SignRequest::sha256(hash.clone(), self.identity_subject.clone())
            .with_reason(format!("Signature on {title}"));
        let response = sign_within(self.signing_api.as_ref(), &request, self.timeout).await?;

        let signed_at = self.clock.now();
        let manifest = SignatureManifest::new(
            item.document_id,
            hash.clone(),
            title.clone(),
            vec![ManifestSignature {
                signer_id: None,
                order_index: None,
                name: None,
                identity_subject: self.identity_subject.clone(),
                signature_value: response.signature_value.clone(),
                signature_timestamp: response.timestamp_token.clone(),
                certificate: None,
                signed_at,
            }],
            signed_at,
        );
        let bytes = manifest
            .to_bytes()
            .map_err(|e| SignatureError::Internal(format!("failed to encode manifest: {e}")))?;
        let signed_document_id = self
            .documents
            .store_signed_document(self.tenant_id, item.document_id, bytes, &title)
            .await?;

        self.dal
            .batch()
            .mark_item_signed(
                self.tenant_id,
                item.batch_id,
                item.id,
                hash,
                response.signature_value,
                signed_document_id,
                self.clock.now(),
            )
            .await?;
        Ok(())
    }
}

/// Creates batches and runs their signing passes.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    dal: DAL,
    config: SignatureConfig,
    signing_api: Arc<dyn SigningApi>,
    documents: Arc<dyn DocumentStore>,
    handshake: OidcHandshake,
    trail: AuditTrail,
    security: SecurityEventSink,
    rate_limiter: Option<RateLimiter>,
    clock: SharedClock,
}

impl BatchExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dal: DAL,
        config: SignatureConfig,
        signing_api: Arc<dyn SigningApi>,
        documents: Arc<dyn DocumentStore>,
        handshake: OidcHandshake,
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
            security,
            rate_limiter: None,
            clock,
        }
    }

    /// Rate-limits batch creation (fail-closed).
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    pub async fn create(
        &self,
        ctx: &RequestContext,
        input: CreateBatch,
    ) -> Result<Batch, SignatureError> {
        let tenant_id = ctx.require_tenant()?;
        let created_by = ctx
            .actor_id
            .as_deref()
            .and_then(|a| Uuid::parse_str(a).ok())
            .ok_or_else(|| SignatureError::Validation("batch creator must be a user".into()))?;

        let max = self.config.batch_max_documents();
        if input.documents.is_empty() {
            return Err(SignatureError::Validation("a batch needs at least one document".into()));
        }
        if input.documents.len() > max {
            return Err(SignatureError::Validation(format!(
                "a batch holds at most {max} documents, got {}",
                input.documents.len()
            )));
        }

        if let Some(limiter) = &self.rate_limiter {
            if let Err(e) = limiter
                .check(CREATE_SCOPE, &ctx.actor_label(), FailureMode::Closed)
                .await
            {
                if let RateLimitError::Exceeded { retry_after_secs } = &e {
                    self.security
                        .rate_limited(Some(tenant_id), CREATE_SCOPE, *retry_after_secs)
                        .await;
                }
                return Err(e.into());
            }
        }

        let now = self.clock.now();
        let total = i32::try_from(input.documents.len())
            .map_err(|_| SignatureError::Validation("too many documents".into()))?;
        let batch = Batch::new(tenant_id, created_by, input.name, total, now);
        let items = input
            .documents
            .into_iter()
            .enumerate()
            .map(|(position, doc)| {
                BatchItem::new(
                    batch.id,
                    i32::try_from(position).unwrap_or(i32::MAX),
                    doc.document_id,
                    doc.title,
                    now,
                )
            })
            .collect();
        let batch = self.dal.batch().create(batch, items).await?;

        self.trail
            .record_as(
                ctx,
                NewSignatureAuditEvent::new(tenant_id, SignatureEventType::BatchCreated)
                    .batch(batch.id)
                    .details(json!({ "total_documents": batch.total_documents })),
            )
            .await?;
        info!(tenant_id = %tenant_id, batch_id = %batch.id, total, "batch created");
        Ok(batch)
    }

    pub async fn get(
        &self,
        ctx: &RequestContext,
        batch_id: Uuid,
    ) -> Result<BatchDetails, SignatureError> {
        let tenant_id = ctx.require_tenant()?;
        let batch = self.dal.batch().get(tenant_id, batch_id).await?;
        let items = self.dal.batch().items(tenant_id, batch_id).await?;
        Ok(BatchDetails { batch, items })
    }

    /// Opens the handshake for a pending batch and returns the authorization URL.
    pub async fn start_batch_signing(
        &self,
        ctx: &RequestContext,
        batch_id: Uuid,
        redirect_after: Option<String>,
    ) -> Result<String, SignatureError> {
        let tenant_id = ctx.require_tenant()?;
        let batch = self.dal.batch().get(tenant_id, batch_id).await?;
        if batch.status != BatchStatus::Pending {
            return Err(SignatureError::InvalidTransition(format!(
                "batch {} is {}",
                batch.id, batch.status
            )));
        }
        self.handshake
            .open(tenant_id, SessionBinding::Batch(batch.id), redirect_after)
            .await
    }

    /// Authenticates the batch signer and signs every pending item.
    pub async fn complete(
        &self,
        ctx: &RequestContext,
        session: &OidcSession,
        params: &CallbackParams,
    ) -> Result<Batch, SignatureError> {
        let result = self.run_for_session(ctx, session, params).await;
        self.handshake.finish(session).await;
        result
    }

    async fn run_for_session(
        &self,
        ctx: &RequestContext,
        session: &OidcSession,
        params: &CallbackParams,
    ) -> Result<Batch, SignatureError> {
        let batch_id = session
            .binding
            .batch_id()
            .ok_or(SignatureError::InvalidSession)?;
        let tenant_id = session.tenant_id;

        let batch = self.dal.batch().get(tenant_id, batch_id).await?;
        if batch.status != BatchStatus::Pending {
            return Err(SignatureError::InvalidTransition(format!(
                "batch {} is {}",
                batch.id, batch.status
            )));
        }

        let identity = self.handshake.authenticate(session, params).await?;

        let now = self.clock.now();
        self.dal.batch().begin_run(tenant_id, batch_id, now).await?;
        let batch = self
            .dal
            .batch()
            .record_identity(
                tenant_id,
                batch_id,
                identity.subject.clone(),
                identity.bpk_hash.clone(),
                now,
            )
            .await?;

        let items: Vec<BatchItem> = self
            .dal
            .batch()
            .items(tenant_id, batch_id)
            .await?
            .into_iter()
            .filter(|i| i.status == BatchItemStatus::Pending)
            .collect();

        self.trail
            .record(
                batch_event(ctx, &batch, SignatureEventType::BatchStarted).details(json!({
                    "total_documents": batch.total_documents,
                    "pending_items": items.len(),
                    "workers": self.config.batch_workers(),
                })),
            )
            .await?;

        let signed_now = self.run_items(&batch, &identity, items).await;

        let batch = self
            .dal
            .batch()
            .finalize(tenant_id, batch_id, self.clock.now())
            .await?;

        if signed_now > 0 {
            self.dal
                .usage()
                .record(
                    UsageRecord::new(
                        tenant_id,
                        signed_now,
                        self.config.signature_cost_cents(),
                        self.clock.now(),
                    )
                    .for_batch(batch.id),
                )
                .await?;
        }

        self.trail
            .record(
                batch_event(ctx, &batch, SignatureEventType::BatchCompleted).details(json!({
                    "status": batch.status.as_str(),
                    "signed_count": batch.signed_count,
                    "failed_count": batch.failed_count,
                })),
            )
            .await?;
        info!(
            tenant_id = %tenant_id,
            batch_id = %batch.id,
            status = %batch.status,
            signed = batch.signed_count,
            failed = batch.failed_count,
            "batch run finished"
        );
        Ok(batch)
    }

    /// Fans `items` out over the worker pool and waits for all of them.
    /// Returns how many were signed by this run.
    async fn run_items(&self, batch: &Batch, identity: &VerifiedIdentity, items: Vec<BatchItem>) -> i32 {
        let semaphore = Arc::new(Semaphore::new(self.config.batch_workers()));
        let worker = ItemWorker {
            dal: self.dal.clone(),
            signing_api: self.signing_api.clone(),
            documents: self.documents.clone(),
            clock: self.clock.clone(),
            timeout: self.config.signing_timeout(),
            tenant_id: batch.tenant_id,
            identity_subject: identity.subject.clone(),
        };

        let handles = items.into_iter().map(|item| {
            let semaphore = semaphore.clone();
            let worker = worker.clone();
            tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return ItemOutcome::Skipped,
                };
                worker.run(item).await
            })
        });

        let mut signed = 0;
        for joined in join_all(handles).await {
            match joined {
                Ok(ItemOutcome::Signed) => signed += 1,
                Ok(_) => {}
                Err(e) => error!(batch_id = %batch.id, error = %e, "batch item task panicked"),
            }
        }
        signed
    }

    /// Resets failed items of a partially failed batch so a new handshake can
    /// retry them.
    pub async fn retry_failed_items(
        &self,
        ctx: &RequestContext,
        batch_id: Uuid,
    ) -> Result<Batch, SignatureError> {
        let tenant_id = ctx.require_tenant()?;
        let (batch, reset) = self
            .dal
            .batch()
            .reset_failed(tenant_id, batch_id, self.clock.now())
            .await?;

        self.trail
            .record_as(
                ctx,
                NewSignatureAuditEvent::new(tenant_id, SignatureEventType::BatchRetry)
                    .batch(batch.id)
                    .details(json!({ "reset_items": reset })),
            )
            .await?;
        info!(tenant_id = %tenant_id, batch_id = %batch.id, reset, "batch re-opened for retry");
        Ok(batch)
    }

    /// Cancels a batch that has not started.
    pub async fn cancel(
        &self,
        ctx: &RequestContext,
        batch_id: Uuid,
    ) -> Result<Batch, SignatureError> {
        let tenant_id = ctx.require_tenant()?;
        let batch = self
            .dal
            .batch()
            .cancel(tenant_id, batch_id, self.clock.now())
            .await?;

        self.trail
            .record_as(
                ctx,
                NewSignatureAuditEvent::new(tenant_id, SignatureEventType::BatchCancelled)
                    .batch(batch.id),
            )
            .await?;
        Ok(batch)
    }
}

fn batch_event(
    ctx: &RequestContext,
    batch: &Batch,
    event_type: SignatureEventType,
) -> NewSignatureAuditEvent {
    attribute(NewSignatureAuditEvent::new(batch.tenant_id, event_type).batch(batch.id), ctx)
        .actor(ActorType::User, Some(batch.created_by.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::database::Database;
    use crate::external::MemoryDocumentStore;
    use crate::oidc::UserInfo;
    use crate::signing_api::{ErrorCode, MockSigningApi, SigningApiError};
    use crate::testing::MockIdentityProvider;

    struct Fixture {
        dal: DAL,
        docs: MemoryDocumentStore,
        api: MockSigningApi,
        idp: MockIdentityProvider,
        executor: BatchExecutor,
        ctx: RequestContext,
    }

    /// Reads of `abort_on` panic mid-task, as a crashed backend client would.
    #[derive(Debug)]
    struct AbortingDocumentStore {
        inner: MemoryDocumentStore,
        abort_on: Uuid,
    }

    #[async_trait::async_trait]
    impl DocumentStore for AbortingDocumentStore {
        async fn get_document_content(
            &self,
            document_id: Uuid,
        ) -> Result<Vec<u8>, crate::external::DocumentStoreError> {
            if document_id == self.abort_on {
                panic!("document backend aborted");
            }
            self.inner.get_document_content(document_id).await
        }

        async fn store_signed_document(
            &self,
            tenant_id: Uuid,
            original_id: Uuid,
            content: Vec<u8>,
            title: &str,
        ) -> Result<Uuid, crate::external::DocumentStoreError> {
            self.inner
                .store_signed_document(tenant_id, original_id, content, title)
                .await
        }
    }

    fn fixture(workers: usize) -> Fixture {
        let docs = MemoryDocumentStore::new();
        fixture_with_store(workers, docs.clone(), Arc::new(docs))
    }

    fn fixture_with_store(
        workers: usize,
        docs: MemoryDocumentStore,
        store: Arc<dyn DocumentStore>,
    ) -> Fixture {
        let dal = DAL::new(Database::in_memory().unwrap());
        let clock: SharedClock = Arc::new(ManualClock::starting_now());
        let api = MockSigningApi::new();
        let idp = MockIdentityProvider::new();
        let config = SignatureConfig::builder().batch_workers(workers).build().unwrap();
        let handshake = OidcHandshake::new(dal.clone(), Arc::new(idp.clone()), clock.clone());
        let executor = BatchExecutor::new(
            dal.clone(),
            config,
            Arc::new(api.clone()),
            store,
            handshake,
            SecurityEventSink::new(clock.clone()),
            clock,
        );
        Fixture {
            dal,
            docs,
            api,
            idp,
            executor,
            ctx: RequestContext::user(Uuid::new_v4(), Uuid::new_v4()),
        }
    }

    async fn callback(f: &Fixture, batch_id: Uuid) -> Result<Batch, SignatureError> {
        let url = f
            .executor
            .start_batch_signing(&f.ctx, batch_id, None)
            .await
            .unwrap();
        let state = MockIdentityProvider::state_of(&url).unwrap();
        let code = f
            .idp
            .login(
                &state,
                UserInfo {
                    sub: "batch-signer".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let params = CallbackParams::success(code, state);
        let session = f.executor.handshake.claim(&params).await.unwrap();
        f.executor
            .complete(&RequestContext::anonymous(), &session, &params)
            .await
    }

    #[tokio::test]
    async fn test_create_bounds() {
        let f = fixture(2);
        let empty = f.executor.create(&f.ctx, CreateBatch::default()).await;
        assert!(matches!(empty, Err(SignatureError::Validation(_))));

        let docs = (0..101).map(|_| BatchDocument::new(Uuid::new_v4())).collect();
        let too_many = f.executor.create(&f.ctx, CreateBatch::new(docs)).await;
        assert!(matches!(too_many, Err(SignatureError::Validation(_))));
    }

    #[tokio::test]
    async fn test_failed_item_is_isolated_and_retryable() {
        let f = fixture(10);
        let ids: Vec<Uuid> = (0..3)
            .map(|i| f.docs.insert(&format!("doc {i}"), format!("content {i}")))
            .collect();
        f.api.fail_hash(
            sha256_hex(b"content 1"),
            SigningApiError::new(400, ErrorCode::InvalidHash, "rejected"),
        );

        let batch = f
            .executor
            .create(
                &f.ctx,
                CreateBatch::new(ids.iter().map(|id| BatchDocument::new(*id)).collect()),
            )
            .await
            .unwrap();
        let done = callback(&f, batch.id).await.unwrap();
        assert_eq!(done.status, BatchStatus::PartialFailure);
        assert_eq!((done.signed_count, done.failed_count), (2, 1));

        let items = f.dal.batch().items(batch.tenant_id, batch.id).await.unwrap();
        assert_eq!(items[1].status, BatchItemStatus::Failed);
        assert!(items[1].error_message.as_deref().unwrap().contains("INVALID_HASH"));
        assert_eq!(f.dal.usage().total_signatures(batch.tenant_id).await.unwrap(), 2);

        // Cancel is refused once the batch has run
        assert!(matches!(
            f.executor.cancel(&f.ctx, batch.id).await,
            Err(SignatureError::InvalidTransition(_))
        ));

        let reopened = f.executor.retry_failed_items(&f.ctx, batch.id).await.unwrap();
        assert_eq!(reopened.status, BatchStatus::Pending);
    }

    #[tokio::test]
    async fn test_aborted_item_is_failed_not_left_signing() {
        let docs = MemoryDocumentStore::new();
        let ids: Vec<Uuid> = (0..2)
            .map(|i| docs.insert(&format!("doc {i}"), format!("content {i}")))
            .collect();
        let store = AbortingDocumentStore {
            inner: docs.clone(),
            abort_on: ids[1],
        };
        let f = fixture_with_store(2, docs, Arc::new(store));

        let batch = f
            .executor
            .create(
                &f.ctx,
                CreateBatch::new(ids.iter().map(|id| BatchDocument::new(*id)).collect()),
            )
            .await
            .unwrap();
        let done = callback(&f, batch.id).await.unwrap();
        assert_eq!(done.status, BatchStatus::PartialFailure);
        assert_eq!((done.signed_count, done.failed_count), (1, 1));
        assert_eq!(done.signed_count + done.failed_count, done.total_documents);

        let items = f.dal.batch().items(batch.tenant_id, batch.id).await.unwrap();
        assert_eq!(items[0].status, BatchItemStatus::Signed);
        assert_eq!(items[1].status, BatchItemStatus::Failed);
        assert_eq!(
            items[1].error_message.as_deref(),
            Some(crate::dal::UNPROCESSED_ITEM_ERROR)
        );
        assert_eq!(f.dal.batch().count_signing(batch.tenant_id, batch.id).await.unwrap(), 0);

        // The failed item can be retried like any other
        let reopened = f.executor.retry_failed_items(&f.ctx, batch.id).await.unwrap();
        assert_eq!(reopened.status, BatchStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_pending_batch() {
        let f = fixture(2);
        let id = f.docs.insert("doc", "x");
        let batch = f
            .executor
            .create(&f.ctx, CreateBatch::new(vec![BatchDocument::new(id)]))
            .await
            .unwrap();
        let cancelled = f.executor.cancel(&f.ctx, batch.id).await.unwrap();
        assert_eq!(cancelled.status, BatchStatus::Cancelled);
        assert!(f.executor.start_batch_signing(&f.ctx, batch.id, None).await.is_err());
    }
}
