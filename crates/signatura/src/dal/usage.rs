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

//! Usage record DAL.

use diesel::dsl::sum;
use diesel::prelude::*;
use uuid::Uuid;

use super::models::{decode_all, uuid_to_blob, SqliteUsageRecord};
use super::DAL;
use crate::database::schema::usage_records;
use crate::error::StorageError;
use crate::models::UsageRecord;

#[derive(Clone)]
pub struct UsageDAL<'a> {
    dal: &'a DAL,
}

impl<'a> UsageDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    pub async fn record(&self, usage: UsageRecord) -> Result<UsageRecord, StorageError> {
        if usage.signature_count < 0 {
            return Err(StorageError::InvalidRecord(
                "signature_count must not be negative".into(),
            ));
        }
        let row = SqliteUsageRecord::from(&usage);
        self.dal
            .database
            .interact(move |conn| {
                diesel::insert_into(usage_records::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(())
            })
            .await?;
        Ok(usage)
    }

    pub async fn list_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<UsageRecord>, StorageError> {
        let tenant = uuid_to_blob(&tenant_id);
        let rows = self
            .dal
            .database
            .interact(move |conn| {
                Ok(usage_records::table
                    .filter(usage_records::tenant_id.eq(tenant))
                    .order(usage_records::seq.asc())
                    .select(SqliteUsageRecord::as_select())
                    .load::<SqliteUsageRecord>(conn)?)
            })
            .await?;
        decode_all(rows)
    }

    /// Total billable signatures for a tenant.
    pub async fn total_signatures(&self, tenant_id: Uuid) -> Result<i64, StorageError> {
        let tenant = uuid_to_blob(&tenant_id);
        let total: Option<i64> = self
            .dal
            .database
            .interact(move |conn| {
                Ok(usage_records::table
                    .filter(usage_records::tenant_id.eq(tenant))
                    .select(sum(usage_records::signature_count))
                    .first(conn)?)
            })
            .await?;
        Ok(total.unwrap_or(0))
    }
}
