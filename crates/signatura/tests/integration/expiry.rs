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

//! Expiry sweeping through the service.

use signatura::models::{RequestStatus, SignerStatus};
use signatura::{RequestContext, SignatureError};

use crate::common::Harness;

#[tokio::test]
async fn test_overdue_request_expires_and_link_dies() {
    let h = Harness::new();
    let request = h
        .service
        .orchestrator()
        .create_request(
            &h.ctx,
            h.request_for(&[("a@example.at", "Anna")]).expires_in_days(1),
        )
        .await
        .unwrap();
    let token = h.signers(request.id).await[0].token.clone();

    // Not yet due
    let report = h.service.sweeper().run_once().await.unwrap();
    assert_eq!(report.expired_requests, 0);

    h.clock
        .advance(chrono::Duration::days(1) + chrono::Duration::seconds(1));
    let report = h.service.sweeper().run_once().await.unwrap();
    assert_eq!(report.expired_requests, 1);

    let details = h
        .service
        .orchestrator()
        .get_request(&h.ctx, request.id)
        .await
        .unwrap();
    assert_eq!(details.request.status, RequestStatus::Expired);
    assert_eq!(details.signers[0].status, SignerStatus::Expired);
    assert_eq!(
        h.request_events(request.id).await.last().map(String::as_str),
        Some("request_expired")
    );

    assert!(matches!(
        h.service
            .orchestrator()
            .start_signing(&RequestContext::anonymous(), &token, None)
            .await,
        Err(SignatureError::InvalidToken)
    ));

    // A second pass finds nothing left to do
    assert_eq!(
        h.service.sweeper().run_once().await.unwrap().expired_requests,
        0
    );
}

#[tokio::test]
async fn test_overdue_link_is_refused_before_sweep() {
    let h = Harness::new();
    let request = h
        .service
        .orchestrator()
        .create_request(
            &h.ctx,
            h.request_for(&[("a@example.at", "Anna")]).expires_in_days(2),
        )
        .await
        .unwrap();
    let token = h.signers(request.id).await[0].token.clone();

    h.clock.advance(chrono::Duration::days(3));
    assert!(matches!(
        h.service.orchestrator().get_signing_info(&token).await,
        Err(SignatureError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_abandoned_handshake_is_swept() {
    let h = Harness::new();
    let request = h
        .service
        .orchestrator()
        .create_request(&h.ctx, h.request_for(&[("a@example.at", "Anna")]))
        .await
        .unwrap();
    let token = h.signers(request.id).await[0].token.clone();
    let url = h
        .service
        .orchestrator()
        .start_signing(&RequestContext::anonymous(), &token, None)
        .await
        .unwrap();

    let ttl = chrono::Duration::from_std(h.service.config().oidc_pending_ttl()).unwrap();
    h.clock.advance(ttl + chrono::Duration::seconds(1));
    let report = h.service.sweeper().run_once().await.unwrap();
    assert_eq!(report.deleted_sessions, 1);

    assert!(matches!(
        h.callback(&url, "anna").await,
        Err(SignatureError::InvalidSession)
    ));
}
