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

//! Signer DAL.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use uuid::Uuid;

use super::models::{datetime_to_string, decode_all, encode_certificate, uuid_to_blob, SqliteSigner};
use super::DAL;
use crate::database::schema::{signature_requests, signers};
use crate::error::StorageError;
use crate::models::{Signer, SignerSignature, SignerStatus};

const ENTITY: &str = "signer";

fn statuses(from: &[SignerStatus]) -> Vec<&'static str> {
    from.iter().map(SignerStatus::as_str).collect()
}

#[derive(Clone)]
pub struct SignerDAL<'a> {
    dal: &'a DAL,
}

impl<'a> SignerDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    pub async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Signer, StorageError> {
        let (tenant, key) = (uuid_to_blob(&tenant_id), uuid_to_blob(&id));
        let row = self
            .dal
            .database
            .interact(move |conn| Ok(find(conn, &tenant, &key)?))
            .await?;
        row.ok_or_else(|| StorageError::not_found(ENTITY, id))?
            .try_into()
    }

    /// Looks a signer up by its opaque token.
    ///
    /// The token is the caller's only credential, so this is the one read
    /// that is not tenant-scoped; the tenant comes from the returned row.
    pub async fn find_by_token(&self, token: &str) -> Result<Signer, StorageError> {
        let token = token.to_string();
        let row = self
            .dal
            .database
            .interact(move |conn| {
                Ok(signers::table
                    .filter(signers::token.eq(token))
                    .select(SqliteSigner::as_select())
                    .first(conn)
                    .optional()?)
            })
            .await?;
        row.ok_or_else(|| StorageError::not_found(ENTITY, "token"))?
            .try_into()
    }

    /// Signers of a request ordered by `order_index`.
    pub async fn list_for_request(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
    ) -> Result<Vec<Signer>, StorageError> {
        let (tenant, request) = (uuid_to_blob(&tenant_id), uuid_to_blob(&request_id));
        let rows = self
            .dal
            .database
            .interact(move |conn| {
                let owned: i64 = signature_requests::table
                    .filter(signature_requests::id.eq(&request))
                    .filter(signature_requests::tenant_id.eq(&tenant))
                    .count()
                    .get_result(conn)?;
                if owned == 0 {
                    return Err(StorageError::not_found("signature_request", request_id));
                }
                Ok(signers::table
                    .filter(signers::request_id.eq(&request))
                    .order(signers::order_index.asc())
                    .select(SqliteSigner::as_select())
                    .load::<SqliteSigner>(conn)?)
            })
            .await?;
        decode_all(rows)
    }

    /// Lowest-order signer still in `pending`, if any.
    pub async fn next_pending(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
    ) -> Result<Option<Signer>, StorageError> {
        Ok(self
            .list_for_request(tenant_id, request_id)
            .await?
            .into_iter()
            .find(|s| s.status == SignerStatus::Pending))
    }

    /// `pending → notified`.
    pub async fn mark_notified(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Signer, StorageError> {
        let now = datetime_to_string(&now);
        self.transition(tenant_id, id, move |conn, tenant, key| {
            diesel::update(signers::table)
                .filter(signers::id.eq(key))
                .filter(signers::tenant_id.eq(tenant))
                .filter(signers::status.eq_any(statuses(&[SignerStatus::Pending])))
                .set((
                    signers::status.eq(SignerStatus::Notified.as_str()),
                    signers::notified_at.eq(Some(now.clone())),
                    signers::updated_at.eq(&now),
                ))
                .returning(SqliteSigner::as_returning())
                .get_result(conn)
                .optional()
        })
        .await
    }

    /// `pending | notified | signing → signing`.
    ///
    /// Re-entering `signing` lets a signer restart an abandoned handshake;
    /// opening the new handshake expires the abandoned one.
    pub async fn begin_signing(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Signer, StorageError> {
        let now = datetime_to_string(&now);
        let from = statuses(&[
            SignerStatus::Pending,
            SignerStatus::Notified,
            SignerStatus::Signing,
        ]);
        self.transition(tenant_id, id, move |conn, tenant, key| {
            diesel::update(signers::table)
                .filter(signers::id.eq(key))
                .filter(signers::tenant_id.eq(tenant))
                .filter(signers::status.eq_any(from))
                .set((
                    signers::status.eq(SignerStatus::Signing.as_str()),
                    signers::updated_at.eq(&now),
                ))
                .returning(SqliteSigner::as_returning())
                .get_result(conn)
                .optional()
        })
        .await
    }

    /// `signing → notified` after a failed attempt.
    pub async fn rollback_to_notified(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Signer, StorageError> {
        let now = datetime_to_string(&now);
        self.transition(tenant_id, id, move |conn, tenant, key| {
            diesel::update(signers::table)
                .filter(signers::id.eq(key))
                .filter(signers::tenant_id.eq(tenant))
                .filter(signers::status.eq_any(statuses(&[SignerStatus::Signing])))
                .set((
                    signers::status.eq(SignerStatus::Notified.as_str()),
                    signers::updated_at.eq(&now),
                ))
                .returning(SqliteSigner::as_returning())
                .get_result(conn)
                .optional()
        })
        .await
    }

    /// `signing → signed`, consuming the token and storing the signature.
    pub async fn mark_signed(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        signature: SignerSignature,
    ) -> Result<Signer, StorageError> {
        let certificate = encode_certificate(signature.certificate.as_ref())?;
        let signed_at = datetime_to_string(&signature.signed_at);
        self.transition(tenant_id, id, move |conn, tenant, key| {
            diesel::update(signers::table)
                .filter(signers::id.eq(key))
                .filter(signers::tenant_id.eq(tenant))
                .filter(signers::status.eq_any(statuses(&[SignerStatus::Signing])))
                .set((
                    signers::status.eq(SignerStatus::Signed.as_str()),
                    signers::token_used.eq(true),
                    signers::signature_value.eq(Some(signature.signature_value)),
                    signers::signature_timestamp.eq(signature.signature_timestamp),
                    signers::certificate.eq(certificate),
                    signers::identity_subject.eq(Some(signature.identity_subject)),
                    signers::bpk_hash.eq(signature.bpk_hash),
                    signers::signed_at.eq(Some(signed_at.clone())),
                    signers::updated_at.eq(&signed_at),
                ))
                .returning(SqliteSigner::as_returning())
                .get_result(conn)
                .optional()
        })
        .await
    }

    /// Counts a reminder. Only valid while the signer is `notified`.
    pub async fn record_reminder(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Signer, StorageError> {
        let now = datetime_to_string(&now);
        self.transition(tenant_id, id, move |conn, tenant, key| {
            diesel::update(signers::table)
                .filter(signers::id.eq(key))
                .filter(signers::tenant_id.eq(tenant))
                .filter(signers::status.eq_any(statuses(&[SignerStatus::Notified])))
                .set((
                    signers::reminder_count.eq(signers::reminder_count + 1),
                    signers::last_reminder_at.eq(Some(now.clone())),
                    signers::updated_at.eq(&now),
                ))
                .returning(SqliteSigner::as_returning())
                .get_result(conn)
                .optional()
        })
        .await
    }

    /// Runs one compare-and-set `update`. No row back means the signer is
    /// missing for this tenant or was not in an accepted state.
    async fn transition<F>(&self, tenant_id: Uuid, id: Uuid, update: F) -> Result<Signer, StorageError>
    where
        F: FnOnce(&mut SqliteConnection, &[u8], &[u8]) -> QueryResult<Option<SqliteSigner>>
            + Send
            + 'static,
    {
        let (tenant, key) = (uuid_to_blob(&tenant_id), uuid_to_blob(&id));
        let row = self
            .dal
            .database
            .transaction(move |conn| match update(conn, &tenant, &key)? {
                Some(row) => Ok(row),
                None => Err(match find(conn, &tenant, &key) {
                    Ok(Some(current)) => StorageError::Conflict {
                        entity: ENTITY,
                        id,
                        found: current.status,
                    },
                    Ok(None) => StorageError::not_found(ENTITY, id),
                    Err(e) => e.into(),
                }),
            })
            .await?;
        row.try_into()
    }
}

fn find(conn: &mut SqliteConnection, tenant: &[u8], key: &[u8]) -> QueryResult<Option<SqliteSigner>> {
    signers::table
        .filter(signers::id.eq(key))
        .filter(signers::tenant_id.eq(tenant))
        .select(SqliteSigner::as_select())
        .first(conn)
        .optional()
}

/// Closes every open signer of the given requests.
pub(super) fn expire_open_signers(
    conn: &mut SqliteConnection,
    request_ids: Vec<Vec<u8>>,
    now: &str,
) -> QueryResult<usize> {
    diesel::update(signers::table)
        .filter(signers::request_id.eq_any(request_ids))
        .filter(signers::status.eq_any(statuses(&[
            SignerStatus::Pending,
            SignerStatus::Notified,
            SignerStatus::Signing,
        ])))
        .set((
            signers::status.eq(SignerStatus::Expired.as_str()),
            signers::updated_at.eq(now),
        ))
        .execute(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::models::SignatureRequest;
    use chrono::Duration;

    async fn seeded() -> (DAL, Uuid, Signer) {
        let dal = DAL::new(Database::in_memory().unwrap());
        let now = Utc::now();
        let tenant = Uuid::new_v4();
        let request = SignatureRequest::new(
            tenant,
            Uuid::new_v4(),
            Uuid::new_v4(),
            now + Duration::days(14),
            false,
            now,
        );
        let signer = Signer::new(request.id, tenant, "a@example.at", "A", 0, Duration::days(14), now);
        dal.signature_request()
            .create(request, vec![signer.clone()], vec![])
            .await
            .unwrap();
        (dal, tenant, signer)
    }

    #[tokio::test]
    async fn test_find_by_token() {
        let (dal, _, signer) = seeded().await;
        let found = dal.signer().find_by_token(&signer.token).await.unwrap();
        assert_eq!(found.id, signer.id);
        assert!(dal.signer().find_by_token("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_progression_and_token_consumption() {
        let (dal, tenant, signer) = seeded().await;
        let now = Utc::now();

        dal.signer().mark_notified(tenant, signer.id, now).await.unwrap();
        dal.signer().begin_signing(tenant, signer.id, now).await.unwrap();

        let signed = dal
            .signer()
            .mark_signed(
                tenant,
                signer.id,
                SignerSignature {
                    signature_value: "SIG".into(),
                    signature_timestamp: None,
                    certificate: None,
                    identity_subject: "sub-1".into(),
                    bpk_hash: None,
                    signed_at: now,
                },
            )
            .await
            .unwrap();

        assert_eq!(signed.status, SignerStatus::Signed);
        assert!(signed.token_used);
        assert_eq!(signed.signed_at, Some(now));

        // No regression out of signed.
        assert!(matches!(
            dal.signer().begin_signing(tenant, signer.id, now).await,
            Err(StorageError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_reminder_requires_notified() {
        let (dal, tenant, signer) = seeded().await;
        let now = Utc::now();

        assert!(dal.signer().record_reminder(tenant, signer.id, now).await.is_err());

        dal.signer().mark_notified(tenant, signer.id, now).await.unwrap();
        let reminded = dal.signer().record_reminder(tenant, signer.id, now).await.unwrap();
        assert_eq!(reminded.reminder_count, 1);
        assert_eq!(reminded.last_reminder_at, Some(now));
    }

    #[tokio::test]
    async fn test_foreign_tenant_cannot_read() {
        let (dal, _, signer) = seeded().await;
        assert!(matches!(
            dal.signer().get(Uuid::new_v4(), signer.id).await,
            Err(StorageError::NotFound { .. })
        ));
    }
}
