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

//! Operational audit log DAL.
//!
//! Every read takes the tenant as a mandatory argument. There is no
//! "all tenants" query.

use chrono::{DateTime, Duration, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use uuid::Uuid;

use super::models::{datetime_to_string, decode_all, uuid_to_blob, SqliteAuditLogEntry};
use super::DAL;
use crate::audit::anonymize::{anonymize_opt_ip, truncate_opt_user_agent};
use crate::database::schema::audit_logs;
use crate::error::StorageError;
use crate::models::{AuditLogEntry, AuditLogFilter, AuditLogStats, NewAuditLogEntry};

#[derive(Clone)]
pub struct AuditLogDAL<'a> {
    dal: &'a DAL,
}

impl<'a> AuditLogDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    pub async fn insert(&self, entry: NewAuditLogEntry) -> Result<AuditLogEntry, StorageError> {
        let mut inserted = self.insert_many(vec![entry]).await?;
        inserted
            .pop()
            .ok_or_else(|| StorageError::InvalidRecord("insert returned no row".into()))
    }

    pub async fn insert_many(
        &self,
        entries: Vec<NewAuditLogEntry>,
    ) -> Result<Vec<AuditLogEntry>, StorageError> {
        let entries: Vec<AuditLogEntry> = entries.into_iter().map(into_row).collect();
        if entries.is_empty() {
            return Ok(entries);
        }
        let rows: Vec<SqliteAuditLogEntry> = entries.iter().map(SqliteAuditLogEntry::from).collect();
        self.dal
            .database
            .transaction(move |conn| {
                diesel::insert_into(audit_logs::table).values(&rows).execute(conn)?;
                Ok(())
            })
            .await?;
        Ok(entries)
    }

    /// Newest-first page of one tenant's entries matching `filter`.
    pub async fn query(
        &self,
        tenant_id: Uuid,
        filter: &AuditLogFilter,
    ) -> Result<Vec<AuditLogEntry>, StorageError> {
        let tenant = uuid_to_blob(&tenant_id);
        let filter = filter.clone();
        let limit = i64::try_from(filter.effective_limit()).unwrap_or(i64::MAX);
        let offset = i64::try_from(filter.offset).unwrap_or(i64::MAX);
        let rows = self
            .dal
            .database
            .interact(move |conn| {
                let mut query = audit_logs::table
                    .filter(audit_logs::tenant_id.eq(tenant))
                    .into_boxed();
                if let Some(user_id) = filter.user_id {
                    query = query.filter(audit_logs::user_id.eq(uuid_to_blob(&user_id)));
                }
                if let Some(action) = filter.action {
                    query = query.filter(audit_logs::action.eq(action));
                }
                if let Some(resource_type) = filter.resource_type {
                    query = query.filter(audit_logs::resource_type.eq(resource_type));
                }
                if let Some(resource_id) = filter.resource_id {
                    query = query.filter(audit_logs::resource_id.eq(resource_id));
                }
                if let Some(from) = filter.from {
                    query = query.filter(audit_logs::created_at.ge(datetime_to_string(&from)));
                }
                if let Some(to) = filter.to {
                    query = query.filter(audit_logs::created_at.le(datetime_to_string(&to)));
                }
                Ok(query
                    .order((audit_logs::created_at.desc(), audit_logs::seq.desc()))
                    .offset(offset)
                    .limit(limit)
                    .select(SqliteAuditLogEntry::as_select())
                    .load::<SqliteAuditLogEntry>(conn)?)
            })
            .await?;
        decode_all(rows)
    }

    /// Aggregates by action and resource type plus rolling windows ending at `now`.
    pub async fn stats(&self, tenant_id: Uuid, now: DateTime<Utc>) -> Result<AuditLogStats, StorageError> {
        let tenant = uuid_to_blob(&tenant_id);
        let day = datetime_to_string(&(now - Duration::hours(24)));
        let week = datetime_to_string(&(now - Duration::days(7)));
        let month = datetime_to_string(&(now - Duration::days(30)));

        self.dal
            .database
            .interact(move |conn| {
                let by_action: Vec<(String, i64)> = audit_logs::table
                    .filter(audit_logs::tenant_id.eq(&tenant))
                    .group_by(audit_logs::action)
                    .select((audit_logs::action, count_star()))
                    .load(conn)?;
                let by_resource_type: Vec<(String, i64)> = audit_logs::table
                    .filter(audit_logs::tenant_id.eq(&tenant))
                    .group_by(audit_logs::resource_type)
                    .select((audit_logs::resource_type, count_star()))
                    .load(conn)?;

                let mut stats = AuditLogStats {
                    by_action: by_action.into_iter().map(|(k, n)| (k, as_u64(n))).collect(),
                    by_resource_type: by_resource_type
                        .into_iter()
                        .map(|(k, n)| (k, as_u64(n)))
                        .collect(),
                    ..Default::default()
                };
                stats.total = stats.by_action.values().sum();
                stats.last_24h = count_since(conn, &tenant, &day)?;
                stats.last_7d = count_since(conn, &tenant, &week)?;
                stats.last_30d = count_since(conn, &tenant, &month)?;
                Ok(stats)
            })
            .await
    }

    /// Deletes one tenant's entries older than `cutoff`, `batch_size` rows per
    /// write, until none remain. Returns the total deleted.
    pub async fn delete_older_than(
        &self,
        tenant_id: Uuid,
        cutoff: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<usize, StorageError> {
        let batch_size = batch_size.max(1);
        let limit = i64::try_from(batch_size).unwrap_or(i64::MAX);
        let tenant = uuid_to_blob(&tenant_id);
        let cutoff = datetime_to_string(&cutoff);
        let mut total = 0;

        loop {
            let (tenant, cutoff) = (tenant.clone(), cutoff.clone());
            let deleted = self
                .dal
                .database
                .transaction(move |conn| {
                    let doomed: Vec<i64> = audit_logs::table
                        .filter(audit_logs::tenant_id.eq(&tenant))
                        .filter(audit_logs::created_at.lt(&cutoff))
                        .order(audit_logs::seq.asc())
                        .limit(limit)
                        .select(audit_logs::seq)
                        .load(conn)?;
                    Ok(diesel::delete(audit_logs::table.filter(audit_logs::seq.eq_any(doomed)))
                        .execute(conn)?)
                })
                .await?;

            total += deleted;
            if deleted < batch_size {
                break;
            }
            tokio::task::yield_now().await;
        }

        tracing::info!(tenant_id = %tenant_id, deleted = total, "audit log retention applied");
        Ok(total)
    }
}

fn count_since(conn: &mut SqliteConnection, tenant: &[u8], since: &str) -> QueryResult<u64> {
    let count: i64 = audit_logs::table
        .filter(audit_logs::tenant_id.eq(tenant))
        .filter(audit_logs::created_at.ge(since))
        .count()
        .get_result(conn)?;
    Ok(as_u64(count))
}

fn as_u64(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}

fn into_row(entry: NewAuditLogEntry) -> AuditLogEntry {
    AuditLogEntry {
        id: Uuid::new_v4(),
        tenant_id: entry.tenant_id,
        user_id: entry.user_id,
        action: entry.action,
        resource_type: entry.resource_type,
        resource_id: entry.resource_id,
        details: entry.details,
        ip_address: anonymize_opt_ip(entry.ip_address),
        user_agent: truncate_opt_user_agent(entry.user_agent),
        created_at: entry.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    async fn seed(dal: &DAL, tenant: Uuid, now: DateTime<Utc>) {
        let entries = vec![
            NewAuditLogEntry::new(tenant, "login", "session", now - Duration::hours(1)),
            NewAuditLogEntry::new(tenant, "login", "session", now - Duration::days(3)),
            NewAuditLogEntry::new(tenant, "update", "credential", now - Duration::days(20))
                .resource("cred-1"),
            NewAuditLogEntry::new(tenant, "delete", "credential", now - Duration::days(60)),
        ];
        dal.audit_log().insert_many(entries).await.unwrap();
    }

    #[tokio::test]
    async fn test_query_filters() {
        let dal = DAL::new(Database::in_memory().unwrap());
        let tenant = Uuid::new_v4();
        let now = Utc::now();
        seed(&dal, tenant, now).await;

        let filter = AuditLogFilter {
            action: Some("login".into()),
            ..Default::default()
        };
        let rows = dal.audit_log().query(tenant, &filter).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].created_at > rows[1].created_at);

        let filter = AuditLogFilter {
            resource_id: Some("cred-1".into()),
            ..Default::default()
        };
        assert_eq!(dal.audit_log().query(tenant, &filter).await.unwrap().len(), 1);

        let other = dal
            .audit_log()
            .query(Uuid::new_v4(), &AuditLogFilter::default())
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_stats_windows() {
        let dal = DAL::new(Database::in_memory().unwrap());
        let tenant = Uuid::new_v4();
        let now = Utc::now();
        seed(&dal, tenant, now).await;

        let stats = dal.audit_log().stats(tenant, now).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.last_24h, 1);
        assert_eq!(stats.last_7d, 2);
        assert_eq!(stats.last_30d, 3);
        assert_eq!(stats.by_action.get("login"), Some(&2));
        assert_eq!(stats.by_resource_type.get("credential"), Some(&2));
    }

    #[tokio::test]
    async fn test_retention_deletes_in_batches() {
        let dal = DAL::new(Database::in_memory().unwrap());
        let tenant = Uuid::new_v4();
        let other = Uuid::new_v4();
        let now = Utc::now();

        let old: Vec<_> = (0..5)
            .map(|_| NewAuditLogEntry::new(tenant, "login", "session", now - Duration::days(400)))
            .collect();
        dal.audit_log().insert_many(old).await.unwrap();
        dal.audit_log()
            .insert(NewAuditLogEntry::new(other, "login", "session", now - Duration::days(400)))
            .await
            .unwrap();
        dal.audit_log()
            .insert(NewAuditLogEntry::new(tenant, "login", "session", now))
            .await
            .unwrap();

        let deleted = dal
            .audit_log()
            .delete_older_than(tenant, now - Duration::days(365), 2)
            .await
            .unwrap();
        assert_eq!(deleted, 5);

        let left = dal.audit_log().stats(tenant, now).await.unwrap();
        assert_eq!(left.total, 1);
        let untouched = dal.audit_log().stats(other, now).await.unwrap();
        assert_eq!(untouched.total, 1);
    }
}
