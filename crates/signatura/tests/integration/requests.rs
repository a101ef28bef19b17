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

//! Request lifecycle: parallel, sequential, failure and cancellation paths.

use signatura::models::{RequestStatus, SignerStatus};
use signatura::signing_api::{ErrorCode, SigningApiError};
use signatura::{CallbackOutcome, RequestContext, SignatureError};

use crate::common::Harness;

fn signer_outcome(outcome: CallbackOutcome) -> signatura::orchestrator::SigningOutcome {
    match outcome {
        CallbackOutcome::Signer(outcome) => outcome,
        CallbackOutcome::Batch(batch) => panic!("expected signer outcome, got batch {}", batch.id),
    }
}

#[tokio::test]
async fn test_single_signer_happy_path() {
    let h = Harness::new();
    let request = h
        .service
        .orchestrator()
        .create_request(&h.ctx, h.request_for(&[("e1@example.at", "Eva")]))
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.expires_at, request.created_at + chrono::Duration::days(14));

    let signers = h.signers(request.id).await;
    assert_eq!(signers[0].status, SignerStatus::Notified);
    assert_eq!(h.mailer.requests().len(), 1);
    assert!(h.mailer.requests()[0].signing_url.ends_with(&signers[0].token));

    let outcome = signer_outcome(h.sign(&signers[0].token, "subject-eva").await.unwrap());
    assert!(outcome.request_completed());
    assert_eq!(outcome.request.status, RequestStatus::Completed);
    assert!(outcome.request.signed_document_id.is_some());
    assert_eq!(outcome.signer.status, SignerStatus::Signed);
    assert!(outcome.signer.token_used);
    assert!(outcome.signer.signed_at.is_some());
    assert_eq!(
        outcome.signer.certificate.as_ref().map(|c| c.subject.as_str()),
        Some("CN=subject-eva")
    );

    assert_eq!(
        h.request_events(request.id).await,
        vec![
            "request_created",
            "signer_notified",
            "signing_started",
            "signing_completed",
            "request_completed",
        ]
    );

    let usage = h.dal.usage().list_for_tenant(h.tenant_id).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].signature_count, 1);
    assert_eq!(usage[0].cost_cents, Some(150));

    // The signed artifact names the signer but carries no email or BPK
    let artifact = h.docs.get(outcome.request.signed_document_id.unwrap()).unwrap();
    let manifest = String::from_utf8(artifact.content).unwrap();
    assert!(manifest.contains("subject-eva"));
    assert!(!manifest.contains("e1@example.at"));
    assert!(!manifest.contains("BF:subject-eva"));
    assert_eq!(h.mailer.completions().len(), 1);

    // A used token is dead
    assert!(matches!(
        h.service.orchestrator().get_signing_info(&signers[0].token).await,
        Err(SignatureError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_sequential_signers_progress_in_order() {
    let h = Harness::new();
    let input = h
        .request_for(&[("a@example.at", "Anna"), ("b@example.at", "Bernd")])
        .sequential(true);
    let request = h
        .service
        .orchestrator()
        .create_request(&h.ctx, input)
        .await
        .unwrap();

    let signers = h.signers(request.id).await;
    assert_eq!(signers[0].status, SignerStatus::Notified);
    assert_eq!(signers[1].status, SignerStatus::Pending);
    assert_eq!(h.mailer.requests().len(), 1);

    let orchestrator = h.service.orchestrator();
    assert!(matches!(
        orchestrator.get_signing_info(&signers[1].token).await,
        Err(SignatureError::WaitingForPreviousSigner)
    ));
    assert!(matches!(
        orchestrator
            .start_signing(&RequestContext::anonymous(), &signers[1].token, None)
            .await,
        Err(SignatureError::WaitingForPreviousSigner)
    ));

    let info = orchestrator.get_signing_info(&signers[0].token).await.unwrap();
    assert_eq!(info.total_signers, 2);

    let first = signer_outcome(h.sign(&signers[0].token, "anna").await.unwrap());
    assert!(!first.request_completed());
    assert_eq!(first.request.status, RequestStatus::InProgress);
    assert_eq!(first.request.current_signer_index, 1);
    assert_eq!(first.next_signer, Some(signers[1].id));

    let signers = h.signers(request.id).await;
    assert_eq!(signers[1].status, SignerStatus::Notified);
    assert_eq!(h.mailer.requests().len(), 2);

    let second = signer_outcome(h.sign(&signers[1].token, "bernd").await.unwrap());
    assert!(second.request_completed());

    let details = orchestrator.get_request(&h.ctx, request.id).await.unwrap();
    assert!(details.signers.iter().all(|s| s.status == SignerStatus::Signed));
    assert!(details.signers[0].signed_at <= details.signers[1].signed_at);
}

#[tokio::test]
async fn test_remote_failure_rolls_signer_back() {
    let h = Harness::new();
    let request = h
        .service
        .orchestrator()
        .create_request(&h.ctx, h.request_for(&[("e1@example.at", "Eva")]))
        .await
        .unwrap();
    let token = h.signers(request.id).await[0].token.clone();

    h.api.fail_next(SigningApiError::new(
        422,
        ErrorCode::CertificateExpired,
        "certificate expired",
    ));
    let err = h.sign(&token, "eva").await.unwrap_err();
    assert!(matches!(err, SignatureError::SigningApi(_)));
    assert_eq!(h.api.call_count(), 1);

    let signer = &h.signers(request.id).await[0];
    assert_eq!(signer.status, SignerStatus::Notified);
    assert!(!signer.token_used);
    assert!(h.request_events(request.id).await.contains(&"signing_failed".to_string()));

    // Same link, fresh handshake
    let outcome = signer_outcome(h.sign(&token, "eva").await.unwrap());
    assert!(outcome.request_completed());
}

#[tokio::test]
async fn test_retryable_failure_is_retried() {
    let h = Harness::new();
    let request = h
        .service
        .orchestrator()
        .create_request(&h.ctx, h.request_for(&[("e1@example.at", "Eva")]))
        .await
        .unwrap();
    let token = h.signers(request.id).await[0].token.clone();

    h.api.fail_next(SigningApiError::new(503, ErrorCode::ServiceUnavailable, "busy"));
    h.api.fail_next(SigningApiError::new(429, ErrorCode::RateLimited, "slow down"));

    let outcome = signer_outcome(h.sign(&token, "eva").await.unwrap());
    assert!(outcome.request_completed());
    assert_eq!(h.api.call_count(), 3);
}

#[tokio::test]
async fn test_callback_session_is_single_use() {
    let h = Harness::new();
    let request = h
        .service
        .orchestrator()
        .create_request(
            &h.ctx,
            h.request_for(&[("a@example.at", "Anna"), ("b@example.at", "Bernd")]),
        )
        .await
        .unwrap();
    let token = h.signers(request.id).await[0].token.clone();

    let url = h
        .service
        .orchestrator()
        .start_signing(&RequestContext::anonymous(), &token, None)
        .await
        .unwrap();
    let state = signatura::testing::MockIdentityProvider::state_of(&url).unwrap();
    let code = h
        .idp
        .login(
            &state,
            signatura::oidc::UserInfo {
                sub: "anna".into(),
                ..Default::default()
            },
        )
        .unwrap();
    let params = signatura::oidc::CallbackParams::success(code, state);

    h.service
        .handle_callback(&RequestContext::anonymous(), &params)
        .await
        .unwrap();
    assert!(matches!(
        h.service
            .handle_callback(&RequestContext::anonymous(), &params)
            .await,
        Err(SignatureError::InvalidSession)
    ));
}

#[tokio::test]
async fn test_cancel_closes_request_and_signers() {
    let h = Harness::new();
    let orchestrator = h.service.orchestrator();
    let request = orchestrator
        .create_request(
            &h.ctx,
            h.request_for(&[("a@example.at", "Anna"), ("b@example.at", "Bernd")]),
        )
        .await
        .unwrap();

    let cancelled = orchestrator
        .cancel_request(&h.ctx, request.id, Some("wrong document".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);
    assert!(h
        .signers(request.id)
        .await
        .iter()
        .all(|s| s.status == SignerStatus::Expired));

    let token = h.signers(request.id).await[0].token.clone();
    assert!(matches!(
        orchestrator.get_signing_info(&token).await,
        Err(SignatureError::InvalidToken)
    ));
    assert!(matches!(
        orchestrator.cancel_request(&h.ctx, request.id, None).await,
        Err(SignatureError::InvalidTransition(_))
    ));
}

#[tokio::test]
async fn test_reminder_requires_notified_signer() {
    let h = Harness::new();
    let request = h
        .service
        .orchestrator()
        .create_request(&h.ctx, h.request_for(&[("a@example.at", "Anna")]))
        .await
        .unwrap();
    let signer = h.signers(request.id).await.remove(0);

    let reminded = h.service.send_reminder(&h.ctx, signer.id).await.unwrap();
    assert_eq!(reminded.reminder_count, 1);
    assert_eq!(h.mailer.reminders(), vec![("a@example.at".to_string(), 14)]);

    h.sign(&signer.token, "anna").await.unwrap();
    assert!(matches!(
        h.service.send_reminder(&h.ctx, signer.id).await,
        Err(SignatureError::InvalidTransition(_))
    ));
}

#[tokio::test]
async fn test_create_rejects_invalid_input() {
    let h = Harness::new();
    let orchestrator = h.service.orchestrator();

    let no_signers = h.request_for(&[]);
    assert!(matches!(
        orchestrator.create_request(&h.ctx, no_signers).await,
        Err(SignatureError::Validation(_))
    ));

    let bad_email = h.request_for(&[("not-an-email", "Anna")]);
    assert!(matches!(
        orchestrator.create_request(&h.ctx, bad_email).await,
        Err(SignatureError::Validation(_))
    ));

    assert!(matches!(
        orchestrator
            .create_request(&RequestContext::anonymous(), h.request_for(&[("a@example.at", "A")]))
            .await,
        Err(SignatureError::NoTenantContext)
    ));

    let far_future = h
        .request_for(&[("a@example.at", "Anna")])
        .expires_in_days(i64::MAX / 1000);
    assert!(matches!(
        orchestrator.create_request(&h.ctx, far_future).await,
        Err(SignatureError::Validation(_))
    ));
}

#[tokio::test]
async fn test_signer_links_expire_with_link_lifetime() {
    let h = Harness::new();
    let orchestrator = h.service.orchestrator();

    let long = orchestrator
        .create_request(
            &h.ctx,
            h.request_for(&[("a@example.at", "Anna")]).expires_in_days(60),
        )
        .await
        .unwrap();
    assert_eq!(long.expires_at, long.created_at + chrono::Duration::days(60));
    let signer = h.signers(long.id).await.remove(0);
    assert_eq!(signer.token_expires_at, long.created_at + chrono::Duration::days(14));

    // A shorter request caps the link
    let short = orchestrator
        .create_request(
            &h.ctx,
            h.request_for(&[("b@example.at", "Bernd")]).expires_in_days(3),
        )
        .await
        .unwrap();
    let signer = h.signers(short.id).await.remove(0);
    assert_eq!(signer.token_expires_at, short.expires_at);
}

#[tokio::test]
async fn test_restarted_handshake_supersedes_earlier_one() {
    let h = Harness::new();
    let orchestrator = h.service.orchestrator();
    let request = orchestrator
        .create_request(&h.ctx, h.request_for(&[("a@example.at", "Anna")]))
        .await
        .unwrap();
    let token = h.signers(request.id).await[0].token.clone();

    let abandoned = orchestrator
        .start_signing(&RequestContext::anonymous(), &token, None)
        .await
        .unwrap();
    let current = orchestrator
        .start_signing(&RequestContext::anonymous(), &token, None)
        .await
        .unwrap();

    assert!(matches!(
        h.callback(&abandoned, "anna").await,
        Err(SignatureError::InvalidSession)
    ));
    let outcome = signer_outcome(h.callback(&current, "anna").await.unwrap());
    assert_eq!(outcome.signer.status, SignerStatus::Signed);
    assert_eq!(h.api.call_count(), 1);
}
