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

//! Two-factor enrollment DAL.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::models::{datetime_to_string, uuid_to_blob, SqliteTwoFactorEnrollment};
use super::DAL;
use crate::database::schema::two_factor_enrollments as enrollments;
use crate::error::StorageError;
use crate::models::TwoFactorRecord;

const ENTITY: &str = "two_factor";

#[derive(Clone)]
pub struct TwoFactorDAL<'a> {
    dal: &'a DAL,
}

impl<'a> TwoFactorDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    pub async fn get(&self, tenant_id: Uuid, user_id: Uuid) -> Result<Option<TwoFactorRecord>, StorageError> {
        let (tenant, user) = (uuid_to_blob(&tenant_id), uuid_to_blob(&user_id));
        let row = self
            .dal
            .database
            .interact(move |conn| {
                Ok(enrollments::table
                    .filter(enrollments::tenant_id.eq(tenant))
                    .filter(enrollments::user_id.eq(user))
                    .select(SqliteTwoFactorEnrollment::as_select())
                    .first(conn)
                    .optional()?)
            })
            .await?;
        row.map(TwoFactorRecord::try_from).transpose()
    }

    /// Inserts a new enrollment. An existing one is a unique violation.
    pub async fn insert(&self, record: TwoFactorRecord) -> Result<TwoFactorRecord, StorageError> {
        let row = SqliteTwoFactorEnrollment::from(&record);
        self.dal
            .database
            .interact(move |conn| {
                diesel::insert_into(enrollments::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(())
            })
            .await?;
        Ok(record)
    }

    /// Replaces the sealed recovery codes if they still equal `expected`.
    ///
    /// A concurrent writer that got there first leaves a different ciphertext
    /// behind, and this call fails with [`StorageError::Conflict`].
    pub async fn update_recovery_codes(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        expected: Vec<u8>,
        encrypted_recovery_codes: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let (tenant, user) = (uuid_to_blob(&tenant_id), uuid_to_blob(&user_id));
        let now = datetime_to_string(&now);
        self.dal
            .database
            .transaction(move |conn| {
                let updated = diesel::update(enrollments::table)
                    .filter(enrollments::tenant_id.eq(&tenant))
                    .filter(enrollments::user_id.eq(&user))
                    .filter(enrollments::encrypted_recovery_codes.eq(expected))
                    .set((
                        enrollments::encrypted_recovery_codes.eq(encrypted_recovery_codes),
                        enrollments::updated_at.eq(now),
                    ))
                    .execute(conn)?;
                if updated == 1 {
                    return Ok(());
                }

                let exists: i64 = enrollments::table
                    .filter(enrollments::tenant_id.eq(&tenant))
                    .filter(enrollments::user_id.eq(&user))
                    .count()
                    .get_result(conn)?;
                Err(if exists == 0 {
                    StorageError::not_found(ENTITY, user_id)
                } else {
                    StorageError::Conflict {
                        entity: ENTITY,
                        id: user_id,
                        found: "recovery codes changed".into(),
                    }
                })
            })
            .await
    }

    /// Removes an enrollment. Returns whether one existed.
    pub async fn delete(&self, tenant_id: Uuid, user_id: Uuid) -> Result<bool, StorageError> {
        let (tenant, user) = (uuid_to_blob(&tenant_id), uuid_to_blob(&user_id));
        let deleted = self
            .dal
            .database
            .interact(move |conn| {
                Ok(diesel::delete(
                    enrollments::table
                        .filter(enrollments::tenant_id.eq(tenant))
                        .filter(enrollments::user_id.eq(user)),
                )
                .execute(conn)?)
            })
            .await?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    fn record(tenant: Uuid, user: Uuid) -> TwoFactorRecord {
        let now = Utc::now();
        TwoFactorRecord {
            user_id: user,
            tenant_id: tenant,
            encrypted_secret: vec![1, 2, 3],
            encrypted_recovery_codes: vec![10, 11],
            enabled_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_one_enrollment_per_user() {
        let dal = DAL::new(Database::in_memory().unwrap());
        let (tenant, user) = (Uuid::new_v4(), Uuid::new_v4());
        dal.two_factor().insert(record(tenant, user)).await.unwrap();
        assert!(matches!(
            dal.two_factor().insert(record(tenant, user)).await,
            Err(StorageError::UniqueViolation("two_factor(tenant_id, user_id)"))
        ));
        // Same user under another tenant is a separate enrollment
        dal.two_factor().insert(record(Uuid::new_v4(), user)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_recovery_code_write_is_rejected() {
        let dal = DAL::new(Database::in_memory().unwrap());
        let (tenant, user) = (Uuid::new_v4(), Uuid::new_v4());
        dal.two_factor().insert(record(tenant, user)).await.unwrap();
        let now = Utc::now();

        // Two writers read [10, 11]; the first one wins.
        dal.two_factor()
            .update_recovery_codes(tenant, user, vec![10, 11], vec![20], now)
            .await
            .unwrap();
        let stale = dal
            .two_factor()
            .update_recovery_codes(tenant, user, vec![10, 11], vec![30], now)
            .await;
        assert!(matches!(stale, Err(StorageError::Conflict { .. })));

        let stored = dal.two_factor().get(tenant, user).await.unwrap().unwrap();
        assert_eq!(stored.encrypted_recovery_codes, vec![20]);

        let missing = dal
            .two_factor()
            .update_recovery_codes(tenant, Uuid::new_v4(), vec![20], vec![40], now)
            .await;
        assert!(matches!(missing, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let dal = DAL::new(Database::in_memory().unwrap());
        let (tenant, user) = (Uuid::new_v4(), Uuid::new_v4());
        dal.two_factor().insert(record(tenant, user)).await.unwrap();
        assert!(dal.two_factor().delete(tenant, user).await.unwrap());
        assert!(!dal.two_factor().delete(tenant, user).await.unwrap());
        assert!(dal.two_factor().get(tenant, user).await.unwrap().is_none());
    }
}
