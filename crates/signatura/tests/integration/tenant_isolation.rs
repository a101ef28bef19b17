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

//! Tenant scoping of requests, audit data and security events.

use serde_json::json;
use signatura::audit::AuditError;
use signatura::models::AuditLogFilter;
use signatura::security::audit::events;
use signatura::{RequestContext, SignatureError};
use uuid::Uuid;

use crate::common::Harness;

#[tokio::test]
async fn test_foreign_request_is_not_found_and_flagged() {
    let h = Harness::new();
    let request = h
        .service
        .orchestrator()
        .create_request(&h.ctx, h.request_for(&[("a@example.at", "Anna")]))
        .await
        .unwrap();

    let intruder_tenant = Uuid::new_v4();
    let intruder = RequestContext::user(intruder_tenant, Uuid::new_v4());
    let orchestrator = h.service.orchestrator();

    assert!(matches!(
        orchestrator.get_request(&intruder, request.id).await,
        Err(SignatureError::NotFound(_))
    ));
    assert!(matches!(
        orchestrator.cancel_request(&intruder, request.id, None).await,
        Err(SignatureError::NotFound(_))
    ));
    assert!(orchestrator
        .list_requests(&intruder, None, 50, 0)
        .await
        .unwrap()
        .is_empty());

    let flagged = h
        .dal
        .security_event()
        .list_for_tenant(intruder_tenant)
        .await
        .unwrap();
    assert_eq!(flagged.len(), 2);
    assert!(flagged
        .iter()
        .all(|e| e.event_type == events::CROSS_TENANT_ATTEMPT));
    assert_eq!(flagged[0].metadata["resource_id"], json!(request.id));

    // The owner is unaffected
    let details = orchestrator.get_request(&h.ctx, request.id).await.unwrap();
    assert_eq!(details.request.id, request.id);
    assert_eq!(orchestrator.list_requests(&h.ctx, None, 50, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_request_is_not_flagged() {
    let h = Harness::new();
    assert!(matches!(
        h.service.orchestrator().get_request(&h.ctx, Uuid::new_v4()).await,
        Err(SignatureError::NotFound(_))
    ));
    assert!(h
        .dal
        .security_event()
        .list_for_tenant(h.tenant_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_missing_tenant_context_is_refused() {
    let h = Harness::new();
    let anonymous = RequestContext::anonymous();

    assert!(matches!(
        h.service
            .orchestrator()
            .list_requests(&anonymous, None, 10, 0)
            .await,
        Err(SignatureError::NoTenantContext)
    ));
    assert!(matches!(
        h.service.send_reminder(&anonymous, Uuid::new_v4()).await,
        Err(SignatureError::NoTenantContext)
    ));
    assert!(matches!(
        h.service
            .audit()
            .query(&anonymous, &AuditLogFilter::default())
            .await,
        Err(AuditError::NoTenantContext)
    ));
    assert!(matches!(
        h.service.audit().stats(&anonymous).await,
        Err(AuditError::NoTenantContext)
    ));
}

#[tokio::test]
async fn test_audit_log_is_tenant_scoped() {
    let h = Harness::new();
    let other = RequestContext::user(Uuid::new_v4(), Uuid::new_v4());

    h.service
        .audit()
        .record(
            &h.ctx,
            "document.upload",
            "document",
            Some("doc-1".into()),
            json!({ "size": 1024 }),
        )
        .await
        .unwrap();
    h.service.shutdown().await;

    let own = h
        .service
        .audit()
        .query(&h.ctx, &AuditLogFilter::default())
        .await
        .unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].action, "document.upload");
    assert_eq!(own[0].resource_id.as_deref(), Some("doc-1"));

    assert!(h
        .service
        .audit()
        .query(&other, &AuditLogFilter::default())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(h.service.audit().stats(&other).await.unwrap().total, 0);
}
