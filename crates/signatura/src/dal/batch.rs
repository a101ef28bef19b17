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

//! Batch and batch item DAL.
//!
//! Item claims are the per-item `UPDATE signature_batch_items SET status =
//! 'signing' WHERE id = ? AND status = 'pending'`; concurrent workers never
//! process the same item twice. Aggregate counters are only recomputed by
//! [`BatchDAL::finalize`], after every worker has returned.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use tracing::warn;
use uuid::Uuid;

use super::models::{datetime_to_string, decode_all, uuid_to_blob, SqliteBatch, SqliteBatchItem};
use super::DAL;
use crate::database::schema::{signature_batch_items as items, signature_batches as batches};
use crate::error::StorageError;
use crate::models::{Batch, BatchItem, BatchItemStatus, BatchStatus};

const BATCH: &str = "batch";
const ITEM: &str = "batch_item";

/// Error recorded on items a run left unfinished.
pub const UNPROCESSED_ITEM_ERROR: &str = "item was not processed before the run ended";

#[derive(Clone)]
pub struct BatchDAL<'a> {
    dal: &'a DAL,
}

impl<'a> BatchDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    pub async fn create(&self, batch: Batch, new_items: Vec<BatchItem>) -> Result<Batch, StorageError> {
        if usize::try_from(batch.total_documents).ok() != Some(new_items.len()) {
            return Err(StorageError::InvalidRecord(format!(
                "batch declares {} documents but has {} items",
                batch.total_documents,
                new_items.len()
            )));
        }
        if new_items.iter().any(|i| i.batch_id != batch.id) {
            return Err(StorageError::InvalidRecord(
                "item does not belong to batch".into(),
            ));
        }

        let row = SqliteBatch::from(&batch);
        let item_rows: Vec<SqliteBatchItem> = new_items.iter().map(SqliteBatchItem::from).collect();
        self.dal
            .database
            .transaction(move |conn| {
                diesel::insert_into(batches::table).values(&row).execute(conn)?;
                if !item_rows.is_empty() {
                    diesel::insert_into(items::table)
                        .values(&item_rows)
                        .execute(conn)?;
                }
                Ok(())
            })
            .await?;
        Ok(batch)
    }

    pub async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Batch, StorageError> {
        let (tenant, key) = (uuid_to_blob(&tenant_id), uuid_to_blob(&id));
        let row = self
            .dal
            .database
            .interact(move |conn| Ok(find_batch(conn, &tenant, &key)?))
            .await?;
        row.ok_or_else(|| StorageError::not_found(BATCH, id))?
            .try_into()
    }

    /// Items of a batch ordered by position.
    pub async fn items(&self, tenant_id: Uuid, batch_id: Uuid) -> Result<Vec<BatchItem>, StorageError> {
        let (tenant, key) = (uuid_to_blob(&tenant_id), uuid_to_blob(&batch_id));
        let rows = self
            .dal
            .database
            .interact(move |conn| {
                require_batch(conn, &tenant, &key, batch_id)?;
                Ok(items::table
                    .filter(items::batch_id.eq(&key))
                    .order(items::position.asc())
                    .select(SqliteBatchItem::as_select())
                    .load::<SqliteBatchItem>(conn)?)
            })
            .await?;
        decode_all(rows)
    }

    /// Items currently claimed by a worker.
    pub async fn count_signing(&self, tenant_id: Uuid, batch_id: Uuid) -> Result<usize, StorageError> {
        let (tenant, key) = (uuid_to_blob(&tenant_id), uuid_to_blob(&batch_id));
        let count = self
            .dal
            .database
            .interact(move |conn| {
                require_batch(conn, &tenant, &key, batch_id)?;
                let count: i64 = items::table
                    .filter(items::batch_id.eq(&key))
                    .filter(items::status.eq(BatchItemStatus::Signing.as_str()))
                    .count()
                    .get_result(conn)?;
                Ok(count)
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// `pending → signing` for the batch as a whole.
    pub async fn begin_run(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Batch, StorageError> {
        let now = datetime_to_string(&now);
        self.transition(tenant_id, id, move |conn, tenant, key| {
            diesel::update(batches::table)
                .filter(batches::id.eq(key))
                .filter(batches::tenant_id.eq(tenant))
                .filter(batches::status.eq(BatchStatus::Pending.as_str()))
                .set((
                    batches::status.eq(BatchStatus::Signing.as_str()),
                    batches::updated_at.eq(&now),
                ))
                .returning(SqliteBatch::as_returning())
                .get_result(conn)
                .optional()
        })
        .await
    }

    /// Stores the identity the handshake established.
    pub async fn record_identity(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        subject: String,
        bpk_hash: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Batch, StorageError> {
        let now = datetime_to_string(&now);
        self.transition(tenant_id, id, move |conn, tenant, key| {
            diesel::update(batches::table)
                .filter(batches::id.eq(key))
                .filter(batches::tenant_id.eq(tenant))
                .filter(batches::status.eq(BatchStatus::Signing.as_str()))
                .set((
                    batches::identity_subject.eq(Some(subject)),
                    batches::bpk_hash.eq(bpk_hash),
                    batches::updated_at.eq(&now),
                ))
                .returning(SqliteBatch::as_returning())
                .get_result(conn)
                .optional()
        })
        .await
    }

    /// `pending → cancelled`. Running or finished batches cannot be cancelled.
    pub async fn cancel(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Batch, StorageError> {
        let now = datetime_to_string(&now);
        self.transition(tenant_id, id, move |conn, tenant, key| {
            diesel::update(batches::table)
                .filter(batches::id.eq(key))
                .filter(batches::tenant_id.eq(tenant))
                .filter(batches::status.eq(BatchStatus::Pending.as_str()))
                .set((
                    batches::status.eq(BatchStatus::Cancelled.as_str()),
                    batches::updated_at.eq(&now),
                ))
                .returning(SqliteBatch::as_returning())
                .get_result(conn)
                .optional()
        })
        .await
    }

    /// Atomically claims a pending item for signing.
    pub async fn claim_item(
        &self,
        tenant_id: Uuid,
        batch_id: Uuid,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<BatchItem, StorageError> {
        let now = datetime_to_string(&now);
        self.item_transition(tenant_id, batch_id, item_id, move |conn, batch, key| {
            diesel::update(items::table)
                .filter(items::id.eq(key))
                .filter(items::batch_id.eq(batch))
                .filter(items::status.eq(BatchItemStatus::Pending.as_str()))
                .set((
                    items::status.eq(BatchItemStatus::Signing.as_str()),
                    items::updated_at.eq(&now),
                ))
                .returning(SqliteBatchItem::as_returning())
                .get_result(conn)
                .optional()
        })
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn mark_item_signed(
        &self,
        tenant_id: Uuid,
        batch_id: Uuid,
        item_id: Uuid,
        document_hash: String,
        signature_value: String,
        signed_document_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<BatchItem, StorageError> {
        let now = datetime_to_string(&now);
        let signed_document = uuid_to_blob(&signed_document_id);
        self.item_transition(tenant_id, batch_id, item_id, move |conn, batch, key| {
            diesel::update(items::table)
                .filter(items::id.eq(key))
                .filter(items::batch_id.eq(batch))
                .filter(items::status.eq(BatchItemStatus::Signing.as_str()))
                .set((
                    items::status.eq(BatchItemStatus::Signed.as_str()),
                    items::document_hash.eq(Some(document_hash)),
                    items::signature_value.eq(Some(signature_value)),
                    items::signed_document_id.eq(Some(signed_document)),
                    items::error_message.eq(None::<String>),
                    items::signed_at.eq(Some(now.clone())),
                    items::updated_at.eq(&now),
                ))
                .returning(SqliteBatchItem::as_returning())
                .get_result(conn)
                .optional()
        })
        .await
    }

    pub async fn mark_item_failed(
        &self,
        tenant_id: Uuid,
        batch_id: Uuid,
        item_id: Uuid,
        error_message: String,
        now: DateTime<Utc>,
    ) -> Result<BatchItem, StorageError> {
        let now = datetime_to_string(&now);
        self.item_transition(tenant_id, batch_id, item_id, move |conn, batch, key| {
            diesel::update(items::table)
                .filter(items::id.eq(key))
                .filter(items::batch_id.eq(batch))
                .filter(items::status.eq(BatchItemStatus::Signing.as_str()))
                .set((
                    items::status.eq(BatchItemStatus::Failed.as_str()),
                    items::error_message.eq(Some(error_message)),
                    items::updated_at.eq(&now),
                ))
                .returning(SqliteBatchItem::as_returning())
                .get_result(conn)
                .optional()
        })
        .await
    }

    /// Closes a run: items still `pending` or `signing` become `failed`,
    /// counters are recomputed from item rows, and `signing` moves to its
    /// terminal status for this run.
    pub async fn finalize(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Batch, StorageError> {
        let (tenant, key) = (uuid_to_blob(&tenant_id), uuid_to_blob(&id));
        let now = datetime_to_string(&now);
        let (row, stranded) = self
            .dal
            .database
            .transaction(move |conn| {
                let current = find_batch(conn, &tenant, &key)?
                    .ok_or_else(|| StorageError::not_found(BATCH, id))?;
                if current.status != BatchStatus::Signing.as_str() {
                    return Err(batch_conflict(id, current.status));
                }

                let stranded = diesel::update(items::table)
                    .filter(items::batch_id.eq(&key))
                    .filter(items::status.eq_any(vec![
                        BatchItemStatus::Pending.as_str(),
                        BatchItemStatus::Signing.as_str(),
                    ]))
                    .set((
                        items::status.eq(BatchItemStatus::Failed.as_str()),
                        items::error_message.eq(Some(UNPROCESSED_ITEM_ERROR)),
                        items::updated_at.eq(&now),
                    ))
                    .execute(conn)?;

                let signed = count_items(conn, &key, BatchItemStatus::Signed)?;
                let failed = count_items(conn, &key, BatchItemStatus::Failed)?;
                let status = BatchStatus::after_run(signed, failed, current.total_documents);

                let updated: Option<SqliteBatch> = diesel::update(batches::table)
                    .filter(batches::id.eq(&key))
                    .filter(batches::tenant_id.eq(&tenant))
                    .filter(batches::status.eq(BatchStatus::Signing.as_str()))
                    .set((
                        batches::signed_count.eq(signed),
                        batches::failed_count.eq(failed),
                        batches::status.eq(status.as_str()),
                        batches::completed_at.eq(Some(now.clone())),
                        batches::updated_at.eq(&now),
                    ))
                    .returning(SqliteBatch::as_returning())
                    .get_result(conn)
                    .optional()?;
                match updated {
                    Some(row) => Ok((row, stranded)),
                    None => Err(batch_miss(conn, &tenant, &key, id)),
                }
            })
            .await?;

        if stranded > 0 {
            warn!(batch_id = %id, stranded, "unfinished batch items marked failed");
        }
        row.try_into()
    }

    /// Resets failed items to pending and re-opens a partially failed batch.
    ///
    /// Returns the re-opened batch and the number of items reset.
    pub async fn reset_failed(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(Batch, usize), StorageError> {
        let (tenant, key) = (uuid_to_blob(&tenant_id), uuid_to_blob(&id));
        let now = datetime_to_string(&now);
        let (row, reset) = self
            .dal
            .database
            .transaction(move |conn| {
                let updated: Option<SqliteBatch> = diesel::update(batches::table)
                    .filter(batches::id.eq(&key))
                    .filter(batches::tenant_id.eq(&tenant))
                    .filter(batches::status.eq(BatchStatus::PartialFailure.as_str()))
                    .set((
                        batches::status.eq(BatchStatus::Pending.as_str()),
                        batches::failed_count.eq(0),
                        batches::completed_at.eq(None::<String>),
                        batches::updated_at.eq(&now),
                    ))
                    .returning(SqliteBatch::as_returning())
                    .get_result(conn)
                    .optional()?;
                let Some(row) = updated else {
                    return Err(batch_miss(conn, &tenant, &key, id));
                };

                let reset = diesel::update(items::table)
                    .filter(items::batch_id.eq(&key))
                    .filter(items::status.eq(BatchItemStatus::Failed.as_str()))
                    .set((
                        items::status.eq(BatchItemStatus::Pending.as_str()),
                        items::error_message.eq(None::<String>),
                        items::updated_at.eq(&now),
                    ))
                    .execute(conn)?;
                Ok((row, reset))
            })
            .await?;
        Ok((row.try_into()?, reset))
    }

    async fn transition<F>(&self, tenant_id: Uuid, id: Uuid, update: F) -> Result<Batch, StorageError>
    where
        F: FnOnce(&mut SqliteConnection, &[u8], &[u8]) -> QueryResult<Option<SqliteBatch>>
            + Send
            + 'static,
    {
        let (tenant, key) = (uuid_to_blob(&tenant_id), uuid_to_blob(&id));
        let row = self
            .dal
            .database
            .transaction(move |conn| match update(conn, &tenant, &key)? {
                Some(row) => Ok(row),
                None => Err(batch_miss(conn, &tenant, &key, id)),
            })
            .await?;
        row.try_into()
    }

    async fn item_transition<F>(
        &self,
        tenant_id: Uuid,
        batch_id: Uuid,
        item_id: Uuid,
        update: F,
    ) -> Result<BatchItem, StorageError>
    where
        F: FnOnce(&mut SqliteConnection, &[u8], &[u8]) -> QueryResult<Option<SqliteBatchItem>>
            + Send
            + 'static,
    {
        let tenant = uuid_to_blob(&tenant_id);
        let (batch, key) = (uuid_to_blob(&batch_id), uuid_to_blob(&item_id));
        let row = self
            .dal
            .database
            .transaction(move |conn| {
                require_batch(conn, &tenant, &batch, batch_id)?;
                if let Some(row) = update(conn, &batch, &key)? {
                    return Ok(row);
                }
                let current: Option<String> = items::table
                    .filter(items::id.eq(&key))
                    .filter(items::batch_id.eq(&batch))
                    .select(items::status)
                    .first(conn)
                    .optional()?;
                Err(match current {
                    Some(found) => StorageError::Conflict {
                        entity: ITEM,
                        id: item_id,
                        found,
                    },
                    None => StorageError::not_found(ITEM, item_id),
                })
            })
            .await?;
        row.try_into()
    }
}

fn find_batch(conn: &mut SqliteConnection, tenant: &[u8], key: &[u8]) -> QueryResult<Option<SqliteBatch>> {
    batches::table
        .filter(batches::id.eq(key))
        .filter(batches::tenant_id.eq(tenant))
        .select(SqliteBatch::as_select())
        .first(conn)
        .optional()
}

fn require_batch(
    conn: &mut SqliteConnection,
    tenant: &[u8],
    key: &[u8],
    id: Uuid,
) -> Result<(), StorageError> {
    match find_batch(conn, tenant, key)? {
        Some(_) => Ok(()),
        None => Err(StorageError::not_found(BATCH, id)),
    }
}

fn count_items(conn: &mut SqliteConnection, batch: &[u8], status: BatchItemStatus) -> QueryResult<i32> {
    let count: i64 = items::table
        .filter(items::batch_id.eq(batch))
        .filter(items::status.eq(status.as_str()))
        .count()
        .get_result(conn)?;
    Ok(i32::try_from(count).unwrap_or(i32::MAX))
}

fn batch_miss(conn: &mut SqliteConnection, tenant: &[u8], key: &[u8], id: Uuid) -> StorageError {
    match find_batch(conn, tenant, key) {
        Ok(Some(row)) => batch_conflict(id, row.status),
        Ok(None) => StorageError::not_found(BATCH, id),
        Err(e) => e.into(),
    }
}

fn batch_conflict(id: Uuid, found: String) -> StorageError {
    StorageError::Conflict {
        entity: BATCH,
        id,
        found,
    }
}
