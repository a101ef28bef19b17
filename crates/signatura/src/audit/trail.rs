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

//! Signature workflow audit trail.
//!
//! Every request, signer and batch transition appends one
//! [`SignatureAuditEvent`] row. The row is written in the same logical step as
//! the transition; a failed append is an error for the caller.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::clock::SharedClock;
use crate::context::RequestContext;
use crate::dal::DAL;
use crate::error::StorageError;
use crate::models::{NewSignatureAuditEvent, SignatureAuditEvent};

/// Appends signature audit events stamped with the service clock.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    dal: DAL,
    clock: SharedClock,
}

impl AuditTrail {
    pub fn new(dal: DAL, clock: SharedClock) -> Self {
        Self { dal, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn record(
        &self,
        event: NewSignatureAuditEvent,
    ) -> Result<SignatureAuditEvent, StorageError> {
        let stored = self.dal.audit_event().create(event, self.clock.now()).await?;
        info!(
            event_type = %stored.event_type,
            tenant_id = %stored.tenant_id,
            request_id = ?stored.request_id,
            signer_id = ?stored.signer_id,
            batch_id = ?stored.batch_id,
            actor_type = stored.actor_type.as_str(),
            "signature audit event"
        );
        Ok(stored)
    }

    /// Records `event` attributed to the caller in `ctx`.
    pub async fn record_as(
        &self,
        ctx: &RequestContext,
        event: NewSignatureAuditEvent,
    ) -> Result<SignatureAuditEvent, StorageError> {
        self.record(attribute(event, ctx)).await
    }
}

/// Copies actor and client metadata from `ctx` onto `event`.
pub fn attribute(event: NewSignatureAuditEvent, ctx: &RequestContext) -> NewSignatureAuditEvent {
    event
        .actor(ctx.actor_type, ctx.actor_id.clone())
        .client(ctx.client_ip.clone(), ctx.user_agent.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::database::Database;
    use crate::models::{ActorType, SignatureEventType};
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_record_as_anonymizes_client() {
        let dal = DAL::new(Database::in_memory().unwrap());
        let clock = ManualClock::starting_now();
        let trail = AuditTrail::new(dal.clone(), Arc::new(clock.clone()));
        let tenant = Uuid::new_v4();
        let ctx = RequestContext::user(tenant, Uuid::new_v4()).with_client("192.168.10.77", "agent");

        let stored = trail
            .record_as(
                &ctx,
                NewSignatureAuditEvent::new(tenant, SignatureEventType::RequestCreated),
            )
            .await
            .unwrap();

        assert_eq!(stored.actor_type, ActorType::User);
        assert_eq!(stored.client_ip.as_deref(), Some("192.168.10.0"));
        assert_eq!(stored.created_at, clock.now());
        assert_eq!(dal.audit_event().list_for_tenant(tenant).await.unwrap().len(), 1);
    }
}
