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

//! OIDC session DAL.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use super::models::{
    binding_columns, blob_to_uuid, datetime_to_string, decode_all, string_to_datetime, uuid_to_blob,
    SqliteOidcSession,
};
use super::DAL;
use crate::database::schema::oidc_sessions;
use crate::error::StorageError;
use crate::models::{OidcSession, SessionBinding, SessionStatus};

const ENTITY: &str = "oidc_session";

#[derive(Clone)]
pub struct OidcSessionDAL<'a> {
    dal: &'a DAL,
}

impl<'a> OidcSessionDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts a session. `state` must be unique.
    ///
    /// Any other `pending` session bound to the same signer or batch is
    /// expired in the same transaction, so only the newest handshake can
    /// complete.
    pub async fn create(&self, session: OidcSession) -> Result<OidcSession, StorageError> {
        let row = SqliteOidcSession::from(&session);
        let superseded = self
            .dal
            .database
            .transaction(move |conn| {
                let superseded = diesel::update(oidc_sessions::table)
                    .filter(oidc_sessions::binding_kind.eq(&row.binding_kind))
                    .filter(oidc_sessions::binding_id.eq(&row.binding_id))
                    .filter(oidc_sessions::status.eq(SessionStatus::Pending.as_str()))
                    .set((
                        oidc_sessions::status.eq(SessionStatus::Expired.as_str()),
                        oidc_sessions::updated_at.eq(&row.created_at),
                    ))
                    .execute(conn)?;
                diesel::insert_into(oidc_sessions::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(superseded)
            })
            .await?;
        if superseded > 0 {
            debug!(session_id = %session.id, superseded, "expired earlier pending sessions");
        }
        Ok(session)
    }

    pub async fn find_by_state(&self, state: &str) -> Result<OidcSession, StorageError> {
        let state = state.to_string();
        let row = self
            .dal
            .database
            .interact(move |conn| Ok(by_state(conn, &state)?))
            .await?;
        row.ok_or_else(|| StorageError::not_found(ENTITY, "state"))?
            .try_into()
    }

    /// Sessions bound to a signer or batch, oldest first.
    pub async fn list_for_binding(
        &self,
        binding: &SessionBinding,
    ) -> Result<Vec<OidcSession>, StorageError> {
        let (kind, bound) = binding_columns(binding);
        let rows = self
            .dal
            .database
            .interact(move |conn| {
                Ok(oidc_sessions::table
                    .filter(oidc_sessions::binding_kind.eq(kind))
                    .filter(oidc_sessions::binding_id.eq(bound))
                    .order(oidc_sessions::created_at.asc())
                    .select(SqliteOidcSession::as_select())
                    .load::<SqliteOidcSession>(conn)?)
            })
            .await?;
        decode_all(rows)
    }

    /// Consumes the callback for `state`: `pending → authenticated`.
    ///
    /// Succeeds once per session and only within `pending_ttl` of creation.
    /// A session found past its TTL is marked `expired`.
    pub async fn claim(
        &self,
        state: &str,
        pending_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<OidcSession, StorageError> {
        let state = state.to_string();
        let row = self
            .dal
            .database
            .transaction(move |conn| {
                let current = by_state(conn, &state)?
                    .ok_or_else(|| StorageError::not_found(ENTITY, "state"))?;
                let id = blob_to_uuid(&current.id)?;
                if current.status != SessionStatus::Pending.as_str() {
                    return Err(conflict(id, current.status));
                }

                let stale = now - string_to_datetime(&current.created_at)? > pending_ttl;
                let stamp = datetime_to_string(&now);
                let (status, authenticated_at) = if stale {
                    (SessionStatus::Expired, None)
                } else {
                    (SessionStatus::Authenticated, Some(stamp.clone()))
                };

                let updated: Option<SqliteOidcSession> = diesel::update(oidc_sessions::table)
                    .filter(oidc_sessions::id.eq(&current.id))
                    .filter(oidc_sessions::status.eq(SessionStatus::Pending.as_str()))
                    .set((
                        oidc_sessions::status.eq(status.as_str()),
                        oidc_sessions::authenticated_at.eq(authenticated_at),
                        oidc_sessions::updated_at.eq(&stamp),
                    ))
                    .returning(SqliteOidcSession::as_returning())
                    .get_result(conn)
                    .optional()?;
                updated.ok_or_else(|| miss(conn, &current.id, id))
            })
            .await?;
        row.try_into()
    }

    pub async fn record_identity(
        &self,
        id: Uuid,
        subject: String,
        bpk_hash: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<OidcSession, StorageError> {
        let key = uuid_to_blob(&id);
        let now = datetime_to_string(&now);
        let row = self
            .dal
            .database
            .interact(move |conn| {
                let updated: Option<SqliteOidcSession> = diesel::update(oidc_sessions::table)
                    .filter(oidc_sessions::id.eq(&key))
                    .set((
                        oidc_sessions::identity_subject.eq(Some(subject)),
                        oidc_sessions::bpk_hash.eq(bpk_hash),
                        oidc_sessions::updated_at.eq(&now),
                    ))
                    .returning(SqliteOidcSession::as_returning())
                    .get_result(conn)
                    .optional()?;
                updated.ok_or_else(|| StorageError::not_found(ENTITY, id))
            })
            .await?;
        row.try_into()
    }

    /// `authenticated → used` once the bound flow has finished.
    pub async fn mark_used(&self, id: Uuid, now: DateTime<Utc>) -> Result<OidcSession, StorageError> {
        let key = uuid_to_blob(&id);
        let now = datetime_to_string(&now);
        let row = self
            .dal
            .database
            .transaction(move |conn| {
                let updated: Option<SqliteOidcSession> = diesel::update(oidc_sessions::table)
                    .filter(oidc_sessions::id.eq(&key))
                    .filter(oidc_sessions::status.eq(SessionStatus::Authenticated.as_str()))
                    .set((
                        oidc_sessions::status.eq(SessionStatus::Used.as_str()),
                        oidc_sessions::updated_at.eq(&now),
                    ))
                    .returning(SqliteOidcSession::as_returning())
                    .get_result(conn)
                    .optional()?;
                updated.ok_or_else(|| miss(conn, &key, id))
            })
            .await?;
        row.try_into()
    }

    /// Deletes sessions older than `pending_ttl` that are not authenticated,
    /// and every session older than `max_age`. Returns the number deleted.
    pub async fn delete_stale(
        &self,
        now: DateTime<Utc>,
        pending_ttl: Duration,
        max_age: Duration,
    ) -> Result<usize, StorageError> {
        let ttl_cutoff = cutoff(now, pending_ttl);
        let age_cutoff = cutoff(now, max_age);
        self.dal
            .database
            .interact(move |conn| {
                Ok(diesel::delete(
                    oidc_sessions::table.filter(
                        oidc_sessions::created_at
                            .lt(ttl_cutoff)
                            .and(oidc_sessions::status.ne(SessionStatus::Authenticated.as_str()))
                            .or(oidc_sessions::created_at.lt(age_cutoff)),
                    ),
                )
                .execute(conn)?)
            })
            .await
    }

    pub async fn count(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .dal
            .database
            .interact(|conn| Ok(oidc_sessions::table.count().get_result(conn)?))
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn by_state(conn: &mut SqliteConnection, state: &str) -> QueryResult<Option<SqliteOidcSession>> {
    oidc_sessions::table
        .filter(oidc_sessions::state.eq(state))
        .select(SqliteOidcSession::as_select())
        .first(conn)
        .optional()
}

fn miss(conn: &mut SqliteConnection, key: &[u8], id: Uuid) -> StorageError {
    let current: QueryResult<Option<String>> = oidc_sessions::table
        .filter(oidc_sessions::id.eq(key))
        .select(oidc_sessions::status)
        .first(conn)
        .optional();
    match current {
        Ok(Some(found)) => conflict(id, found),
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

/// Timestamp `age` before `now`, as stored.
fn cutoff(now: DateTime<Utc>, age: Duration) -> String {
    datetime_to_string(&now.checked_sub_signed(age).unwrap_or(DateTime::<Utc>::MIN_UTC))
}
