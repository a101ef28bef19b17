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

//! Signature request DAL.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use uuid::Uuid;

use super::models::{
    datetime_to_string, decode_all, uuid_to_blob, SqliteSignatureField, SqliteSignatureRequest,
    SqliteSigner,
};
use super::signer::expire_open_signers;
use super::DAL;
use crate::database::schema::{signature_fields, signature_requests, signers};
use crate::error::StorageError;
use crate::models::{RequestStatus, SignatureField, SignatureRequest, Signer, SignerStatus};

const ENTITY: &str = "signature_request";

/// Largest page a listing returns.
pub const MAX_LIST_LIMIT: usize = 100;

fn open_statuses() -> Vec<&'static str> {
    vec![RequestStatus::Pending.as_str(), RequestStatus::InProgress.as_str()]
}

#[derive(Clone)]
pub struct SignatureRequestDAL<'a> {
    dal: &'a DAL,
}

impl<'a> SignatureRequestDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts a request together with its signers and fields.
    ///
    /// Enforces: expiry after creation, `(request, order_index)` uniqueness,
    /// global token uniqueness, field geometry, and that bound fields point at
    /// signers of this request.
    pub async fn create(
        &self,
        request: SignatureRequest,
        signers: Vec<Signer>,
        fields: Vec<SignatureField>,
    ) -> Result<SignatureRequest, StorageError> {
        if request.expires_at <= request.created_at {
            return Err(StorageError::InvalidRecord(
                "expiry must be after creation".into(),
            ));
        }

        let mut orders = HashSet::new();
        let mut tokens = HashSet::new();
        for signer in &signers {
            if signer.request_id != request.id || signer.tenant_id != request.tenant_id {
                return Err(StorageError::InvalidRecord(
                    "signer does not belong to request".into(),
                ));
            }
            if !orders.insert(signer.order_index) {
                return Err(StorageError::UniqueViolation("signer(request_id, order_index)"));
            }
            if !tokens.insert(signer.token.as_str()) {
                return Err(StorageError::UniqueViolation("signer.token"));
            }
        }

        let signer_ids: HashSet<Uuid> = signers.iter().map(|s| s.id).collect();
        for field in &fields {
            field.validate().map_err(StorageError::InvalidRecord)?;
            if field.request_id != request.id {
                return Err(StorageError::InvalidRecord(
                    "field does not belong to request".into(),
                ));
            }
            if let Some(signer_id) = field.signer_id {
                if !signer_ids.contains(&signer_id) {
                    return Err(StorageError::InvalidRecord(format!(
                        "field bound to unknown signer {signer_id}"
                    )));
                }
            }
        }

        let request_row = SqliteSignatureRequest::from(&request);
        let signer_rows = signers
            .iter()
            .map(SqliteSigner::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let field_rows: Vec<SqliteSignatureField> = fields.iter().map(Into::into).collect();

        self.dal
            .database
            .transaction(move |conn| {
                diesel::insert_into(signature_requests::table)
                    .values(&request_row)
                    .execute(conn)?;
                if !signer_rows.is_empty() {
                    diesel::insert_into(signers::table)
                        .values(&signer_rows)
                        .execute(conn)?;
                }
                if !field_rows.is_empty() {
                    diesel::insert_into(signature_fields::table)
                        .values(&field_rows)
                        .execute(conn)?;
                }
                Ok(())
            })
            .await?;

        Ok(request)
    }

    pub async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<SignatureRequest, StorageError> {
        let (tenant, key) = (uuid_to_blob(&tenant_id), uuid_to_blob(&id));
        let row = self
            .dal
            .database
            .interact(move |conn| Ok(find(conn, &tenant, &key)?))
            .await?;
        row.ok_or_else(|| StorageError::not_found(ENTITY, id))?
            .try_into()
    }

    /// Tenant that owns `id`, if any. Used only to classify cross-tenant
    /// lookups for the security log; never to return data.
    pub(crate) async fn owner_tenant(&self, id: Uuid) -> Option<Uuid> {
        let key = uuid_to_blob(&id);
        let owner = self
            .dal
            .database
            .interact(move |conn| {
                Ok(signature_requests::table
                    .filter(signature_requests::id.eq(key))
                    .select(signature_requests::tenant_id)
                    .first::<Vec<u8>>(conn)
                    .optional()?)
            })
            .await
            .ok()
            .flatten()?;
        Uuid::from_slice(&owner).ok()
    }

    /// Newest-first listing for one tenant.
    pub async fn list(
        &self,
        tenant_id: Uuid,
        status: Option<RequestStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SignatureRequest>, StorageError> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT) as i64;
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let tenant = uuid_to_blob(&tenant_id);

        let rows = self
            .dal
            .database
            .interact(move |conn| {
                let mut query = signature_requests::table
                    .filter(signature_requests::tenant_id.eq(tenant))
                    .select(SqliteSignatureRequest::as_select())
                    .into_boxed();
                if let Some(status) = status {
                    query = query.filter(signature_requests::status.eq(status.as_str()));
                }
                Ok(query
                    .order((signature_requests::created_at.desc(), signature_requests::id.asc()))
                    .limit(limit)
                    .offset(offset)
                    .load::<SqliteSignatureRequest>(conn)?)
            })
            .await?;
        decode_all(rows)
    }

    /// Moves a pending request to `in_progress`. Already in progress is a no-op.
    pub async fn mark_in_progress(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SignatureRequest, StorageError> {
        let (tenant, key, now) = (uuid_to_blob(&tenant_id), uuid_to_blob(&id), datetime_to_string(&now));
        let row = self
            .dal
            .database
            .transaction(move |conn| {
                let updated: Option<SqliteSignatureRequest> = diesel::update(signature_requests::table)
                    .filter(signature_requests::id.eq(&key))
                    .filter(signature_requests::tenant_id.eq(&tenant))
                    .filter(signature_requests::status.eq(RequestStatus::Pending.as_str()))
                    .set((
                        signature_requests::status.eq(RequestStatus::InProgress.as_str()),
                        signature_requests::updated_at.eq(&now),
                    ))
                    .returning(SqliteSignatureRequest::as_returning())
                    .get_result(conn)
                    .optional()?;
                if let Some(row) = updated {
                    return Ok(row);
                }
                match find(conn, &tenant, &key)? {
                    Some(row) if row.status == RequestStatus::InProgress.as_str() => Ok(row),
                    Some(row) => Err(conflict(id, row.status)),
                    None => Err(StorageError::not_found(ENTITY, id)),
                }
            })
            .await?;
        row.try_into()
    }

    /// Raises `current_signer_index` to `index`. Never lowers it.
    pub async fn advance_signer_index(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        index: i32,
        now: DateTime<Utc>,
    ) -> Result<SignatureRequest, StorageError> {
        let (tenant, key, now) = (uuid_to_blob(&tenant_id), uuid_to_blob(&id), datetime_to_string(&now));
        let row = self
            .dal
            .database
            .transaction(move |conn| {
                let updated: Option<SqliteSignatureRequest> = diesel::update(signature_requests::table)
                    .filter(signature_requests::id.eq(&key))
                    .filter(signature_requests::tenant_id.eq(&tenant))
                    .filter(signature_requests::current_signer_index.lt(index))
                    .set((
                        signature_requests::current_signer_index.eq(index),
                        signature_requests::updated_at.eq(&now),
                    ))
                    .returning(SqliteSignatureRequest::as_returning())
                    .get_result(conn)
                    .optional()?;
                match updated {
                    Some(row) => Ok(row),
                    None => find(conn, &tenant, &key)?.ok_or_else(|| StorageError::not_found(ENTITY, id)),
                }
            })
            .await?;
        row.try_into()
    }

    /// Completes an open request whose signers have all signed.
    pub async fn complete(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        signed_document_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SignatureRequest, StorageError> {
        let (tenant, key, now) = (uuid_to_blob(&tenant_id), uuid_to_blob(&id), datetime_to_string(&now));
        let signed_document = uuid_to_blob(&signed_document_id);
        let row = self
            .dal
            .database
            .transaction(move |conn| {
                let current = find(conn, &tenant, &key)?
                    .ok_or_else(|| StorageError::not_found(ENTITY, id))?;
                if !open_statuses().iter().any(|s| *s == current.status) {
                    return Err(conflict(id, current.status));
                }

                let unsigned: i64 = signers::table
                    .filter(signers::request_id.eq(&key))
                    .filter(signers::status.ne(SignerStatus::Signed.as_str()))
                    .count()
                    .get_result(conn)?;
                if unsigned > 0 {
                    return Err(StorageError::InvalidRecord(
                        "cannot complete a request with unsigned signers".into(),
                    ));
                }

                let updated: Option<SqliteSignatureRequest> = diesel::update(signature_requests::table)
                    .filter(signature_requests::id.eq(&key))
                    .filter(signature_requests::tenant_id.eq(&tenant))
                    .filter(signature_requests::status.eq_any(open_statuses()))
                    .set((
                        signature_requests::status.eq(RequestStatus::Completed.as_str()),
                        signature_requests::signed_document_id.eq(Some(signed_document)),
                        signature_requests::completed_at.eq(Some(now.clone())),
                        signature_requests::updated_at.eq(&now),
                    ))
                    .returning(SqliteSignatureRequest::as_returning())
                    .get_result(conn)
                    .optional()?;
                match updated {
                    Some(row) => Ok(row),
                    None => Err(miss(conn, &tenant, &key, id)),
                }
            })
            .await?;
        row.try_into()
    }

    /// Cancels an open request and closes its open signers.
    pub async fn cancel(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SignatureRequest, StorageError> {
        let (tenant, key, now) = (uuid_to_blob(&tenant_id), uuid_to_blob(&id), datetime_to_string(&now));
        let row = self
            .dal
            .database
            .transaction(move |conn| {
                let updated: Option<SqliteSignatureRequest> = diesel::update(signature_requests::table)
                    .filter(signature_requests::id.eq(&key))
                    .filter(signature_requests::tenant_id.eq(&tenant))
                    .filter(signature_requests::status.eq_any(open_statuses()))
                    .set((
                        signature_requests::status.eq(RequestStatus::Cancelled.as_str()),
                        signature_requests::updated_at.eq(&now),
                    ))
                    .returning(SqliteSignatureRequest::as_returning())
                    .get_result(conn)
                    .optional()?;
                let Some(row) = updated else {
                    return Err(miss(conn, &tenant, &key, id));
                };
                expire_open_signers(conn, vec![key.clone()], &now)?;
                Ok(row)
            })
            .await?;
        row.try_into()
    }

    /// Expires every pending request whose expiry lies before `now`, in one
    /// atomic sweep, and closes their open signers. Returns the expired rows.
    pub async fn expire_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SignatureRequest>, StorageError> {
        let now = datetime_to_string(&now);
        let rows = self
            .dal
            .database
            .transaction(move |conn| {
                let expired: Vec<SqliteSignatureRequest> = diesel::update(signature_requests::table)
                    .filter(signature_requests::status.eq(RequestStatus::Pending.as_str()))
                    .filter(signature_requests::expires_at.lt(&now))
                    .set((
                        signature_requests::status.eq(RequestStatus::Expired.as_str()),
                        signature_requests::updated_at.eq(&now),
                    ))
                    .returning(SqliteSignatureRequest::as_returning())
                    .get_results(conn)?;
                if !expired.is_empty() {
                    let ids = expired.iter().map(|r| r.id.clone()).collect();
                    expire_open_signers(conn, ids, &now)?;
                }
                Ok(expired)
            })
            .await?;
        decode_all(rows)
    }
}

fn find(
    conn: &mut SqliteConnection,
    tenant: &[u8],
    key: &[u8],
) -> QueryResult<Option<SqliteSignatureRequest>> {
    signature_requests::table
        .filter(signature_requests::id.eq(key))
        .filter(signature_requests::tenant_id.eq(tenant))
        .select(SqliteSignatureRequest::as_select())
        .first(conn)
        .optional()
}

/// Explains why a compare-and-set matched no row.
fn miss(conn: &mut SqliteConnection, tenant: &[u8], key: &[u8], id: Uuid) -> StorageError {
    match find(conn, tenant, key) {
        Ok(Some(row)) => conflict(id, row.status),
        Ok(None) => StorageError::not_found(ENTITY, id),
        Err(e) => e.into(),
    }
}

fn conflict(id: Uuid, found: String) -> StorageError {
    StorageError::Conflict {
        entity: ENTITY,
        id,
        found,
    }
}
