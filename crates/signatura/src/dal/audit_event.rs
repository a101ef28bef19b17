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

//! Signature audit event DAL.
//!
//! Append-only. Client IPs are anonymized and user agents truncated here, on
//! insert, so no caller can persist the raw values.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::models::{decode_all, uuid_to_blob, SqliteSignatureAuditEvent};
use super::DAL;
use crate::audit::anonymize::{anonymize_opt_ip, truncate_opt_user_agent};
use crate::database::schema::signature_audit_events as events;
use crate::error::StorageError;
use crate::models::{NewSignatureAuditEvent, SignatureAuditEvent};

enum Scope {
    Tenant,
    Request(Vec<u8>),
    Batch(Vec<u8>),
}

#[derive(Clone)]
pub struct SignatureAuditEventDAL<'a> {
    dal: &'a DAL,
}

impl<'a> SignatureAuditEventDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    pub async fn create(
        &self,
        new_event: NewSignatureAuditEvent,
        now: DateTime<Utc>,
    ) -> Result<SignatureAuditEvent, StorageError> {
        let event = SignatureAuditEvent {
            id: Uuid::new_v4(),
            tenant_id: new_event.tenant_id,
            request_id: new_event.request_id,
            signer_id: new_event.signer_id,
            batch_id: new_event.batch_id,
            verification_id: new_event.verification_id,
            event_type: new_event.event_type.as_str().to_string(),
            details: new_event.details,
            actor_type: new_event.actor_type,
            actor_id: new_event.actor_id,
            client_ip: anonymize_opt_ip(new_event.client_ip),
            user_agent: truncate_opt_user_agent(new_event.user_agent),
            created_at: now,
        };

        let row = SqliteSignatureAuditEvent::from(&event);
        self.dal
            .database
            .interact(move |conn| {
                diesel::insert_into(events::table).values(&row).execute(conn)?;
                Ok(())
            })
            .await?;
        Ok(event)
    }

    /// Events of one request in insertion order.
    pub async fn list_for_request(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
    ) -> Result<Vec<SignatureAuditEvent>, StorageError> {
        self.list(tenant_id, Scope::Request(uuid_to_blob(&request_id))).await
    }

    /// Events of one batch in insertion order.
    pub async fn list_for_batch(
        &self,
        tenant_id: Uuid,
        batch_id: Uuid,
    ) -> Result<Vec<SignatureAuditEvent>, StorageError> {
        self.list(tenant_id, Scope::Batch(uuid_to_blob(&batch_id))).await
    }

    /// All events of one tenant in insertion order.
    pub async fn list_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<SignatureAuditEvent>, StorageError> {
        self.list(tenant_id, Scope::Tenant).await
    }

    async fn list(&self, tenant_id: Uuid, scope: Scope) -> Result<Vec<SignatureAuditEvent>, StorageError> {
        let tenant = uuid_to_blob(&tenant_id);
        let rows = self
            .dal
            .database
            .interact(move |conn| {
                let mut query = events::table
                    .filter(events::tenant_id.eq(tenant))
                    .into_boxed();
                query = match scope {
                    Scope::Tenant => query,
                    Scope::Request(id) => query.filter(events::request_id.eq(id)),
                    Scope::Batch(id) => query.filter(events::batch_id.eq(id)),
                };
                Ok(query
                    .order(events::seq.asc())
                    .select(SqliteSignatureAuditEvent::as_select())
                    .load::<SqliteSignatureAuditEvent>(conn)?)
            })
            .await?;
        decode_all(rows)
    }
}
