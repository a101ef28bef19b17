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

//! Security event DAL.

use diesel::prelude::*;
use uuid::Uuid;

use super::models::{decode_all, uuid_to_blob, SqliteSecurityEvent};
use super::DAL;
use crate::audit::anonymize::{anonymize_opt_ip, truncate_opt_user_agent};
use crate::database::schema::security_events;
use crate::error::StorageError;
use crate::models::SecurityEvent;

#[derive(Clone)]
pub struct SecurityEventDAL<'a> {
    dal: &'a DAL,
}

impl<'a> SecurityEventDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    pub async fn insert(&self, mut event: SecurityEvent) -> Result<SecurityEvent, StorageError> {
        event.client_ip = anonymize_opt_ip(event.client_ip.take());
        event.user_agent = truncate_opt_user_agent(event.user_agent.take());
        let row = SqliteSecurityEvent::from(&event);
        self.dal
            .database
            .interact(move |conn| {
                diesel::insert_into(security_events::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(())
            })
            .await?;
        Ok(event)
    }

    pub async fn list_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<SecurityEvent>, StorageError> {
        let tenant = uuid_to_blob(&tenant_id);
        let rows = self
            .dal
            .database
            .interact(move |conn| {
                Ok(security_events::table
                    .filter(security_events::tenant_id.eq(tenant))
                    .order(security_events::seq.asc())
                    .select(SqliteSecurityEvent::as_select())
                    .load::<SqliteSecurityEvent>(conn)?)
            })
            .await?;
        decode_all(rows)
    }
}
