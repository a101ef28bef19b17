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

//! Batch signing through the service facade.

use std::time::Duration;

use signatura::batch::{BatchDocument, CreateBatch};
use signatura::config::SignatureConfig;
use signatura::crypto::sha256_hex;
use signatura::models::{Batch, BatchItemStatus, BatchStatus};
use signatura::signing_api::{ErrorCode, RetryPolicy, SigningApiError};
use signatura::CallbackOutcome;
use uuid::Uuid;

use crate::common::Harness;

fn batch_of(outcome: CallbackOutcome) -> Batch {
    match outcome {
        CallbackOutcome::Batch(batch) => batch,
        CallbackOutcome::Signer(outcome) => {
            panic!("expected batch outcome, got signer {}", outcome.signer.id)
        }
    }
}

async fn run_batch(h: &Harness, batch_id: Uuid, subject: &str) -> Batch {
    let url = h
        .service
        .batches()
        .start_batch_signing(&h.ctx, batch_id, None)
        .await
        .unwrap();
    batch_of(h.callback(&url, subject).await.unwrap())
}

#[tokio::test]
async fn test_failed_item_is_isolated_and_only_it_reruns() {
    let h = Harness::new();
    let ids: Vec<Uuid> = (1..=3)
        .map(|i| h.docs.insert(&format!("Invoice {i}"), format!("invoice {i}")))
        .collect();
    h.api.fail_hash(
        sha256_hex(b"invoice 2"),
        SigningApiError::new(400, ErrorCode::InvalidHash, "hash rejected"),
    );

    let batch = h
        .service
        .batches()
        .create(
            &h.ctx,
            CreateBatch::new(ids.iter().map(|id| BatchDocument::new(*id)).collect()).name("March"),
        )
        .await
        .unwrap();
    assert_eq!(batch.status, BatchStatus::Pending);
    assert_eq!(batch.total_documents, 3);

    let done = run_batch(&h, batch.id, "clerk").await;
    assert_eq!(done.status, BatchStatus::PartialFailure);
    assert_eq!((done.signed_count, done.failed_count), (2, 1));
    assert_eq!(done.identity_subject.as_deref(), Some("clerk"));

    let details = h.service.batches().get(&h.ctx, batch.id).await.unwrap();
    let statuses: Vec<BatchItemStatus> = details.items.iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![BatchItemStatus::Signed, BatchItemStatus::Failed, BatchItemStatus::Signed]
    );
    assert!(details.items[1]
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("INVALID_HASH"));
    assert!(details.items[0].signed_document_id.is_some());
    assert_eq!(h.dal.usage().total_signatures(h.tenant_id).await.unwrap(), 2);
    assert_eq!(h.dal.batch().count_signing(h.tenant_id, batch.id).await.unwrap(), 0);

    let api_calls = h.api.call_count();
    let reopened = h
        .service
        .batches()
        .retry_failed_items(&h.ctx, batch.id)
        .await
        .unwrap();
    assert_eq!(reopened.status, BatchStatus::Pending);

    let reset = h.service.batches().get(&h.ctx, batch.id).await.unwrap();
    assert_eq!(reset.items[1].status, BatchItemStatus::Pending);
    assert_eq!(reset.items[1].error_message, None);

    // Still failing: only the one reset item is attempted
    let again = run_batch(&h, batch.id, "clerk").await;
    assert_eq!(h.api.call_count(), api_calls + 1);
    assert_eq!(again.status, BatchStatus::PartialFailure);
    assert_eq!((again.signed_count, again.failed_count), (2, 1));
    assert_eq!(h.dal.usage().total_signatures(h.tenant_id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_worker_pool_bounds_concurrency() {
    let h = Harness::with_config(
        SignatureConfig::builder()
            .batch_workers(3)
            .signing_retry(RetryPolicy::none())
            .build()
            .unwrap(),
    );
    h.api.set_delay(Duration::from_millis(20));

    let documents = (0..12)
        .map(|i| {
            BatchDocument::new(h.docs.insert("Payslip", format!("payslip {i}")))
                .titled(format!("Payslip {i}"))
        })
        .collect();
    let batch = h
        .service
        .batches()
        .create(&h.ctx, CreateBatch::new(documents))
        .await
        .unwrap();

    let done = run_batch(&h, batch.id, "payroll").await;
    assert_eq!(done.status, BatchStatus::Completed);
    assert_eq!(done.signed_count, 12);
    assert!(done.completed_at.is_some());
    assert_eq!(h.api.call_count(), 12);
    assert!(h.api.max_concurrency() <= 3);
    assert!(h.api.max_concurrency() >= 1);
    assert_eq!(h.dal.batch().count_signing(h.tenant_id, batch.id).await.unwrap(), 0);

    let details = h.service.batches().get(&h.ctx, batch.id).await.unwrap();
    assert!(details
        .items
        .iter()
        .all(|i| i.status == BatchItemStatus::Signed && i.signature_value.is_some()));
}

#[tokio::test]
async fn test_finished_batch_cannot_restart() {
    let h = Harness::new();
    let doc = h.docs.insert("Offer", "offer");
    let batch = h
        .service
        .batches()
        .create(&h.ctx, CreateBatch::new(vec![BatchDocument::new(doc)]))
        .await
        .unwrap();
    let done = run_batch(&h, batch.id, "sales").await;
    assert_eq!(done.status, BatchStatus::Completed);

    assert!(h
        .service
        .batches()
        .start_batch_signing(&h.ctx, batch.id, None)
        .await
        .is_err());
    assert!(h.service.batches().cancel(&h.ctx, batch.id).await.is_err());
}
