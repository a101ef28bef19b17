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

//! SQLite storage behind a deadpool-diesel connection pool.
//!
//! [`Database`] is a cheaply cloneable pool handle. Embedded migrations run
//! once per handle, on the first checkout. DAL writes run inside
//! [`Database::transaction`]; state changes are single
//! `UPDATE ... WHERE status IN (...) RETURNING *` statements and uniqueness is
//! enforced by the schema's unique indexes.
//!
//! ```rust,ignore
//! let database = Database::new("sqlite:///var/lib/signatura/store.db")?;
//! database.run_migrations().await?;
//! let dal = DAL::new(database);
//! ```

pub mod schema;

use std::sync::Arc;

use deadpool_diesel::sqlite::{Manager as SqliteManager, Pool as SqlitePool, Runtime};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::StorageError;

/// Embedded SQLite migrations.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");

/// URL of a private in-process database.
pub const IN_MEMORY_URL: &str = ":memory:";

/// Pooled connection checked out of a [`Database`].
pub type PooledConnection = deadpool::managed::Object<SqliteManager>;

/// Handle to the signature store.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    url: String,
    migrated: Arc<OnceCell<()>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("url", &self.url)
            .field("pool", &self.pool.status())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens a pool over `url`, a file path or `sqlite://` URL.
    ///
    /// The pool holds a single connection; SQLite serializes writers and a
    /// `:memory:` database lives only as long as its one connection.
    pub fn new(url: &str) -> Result<Self, StorageError> {
        let url = build_sqlite_url(url);
        let manager = SqliteManager::new(url.clone(), Runtime::Tokio1);
        let pool = SqlitePool::builder(manager)
            .max_size(1)
            .build()
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        debug!(url = %url, "opened sqlite pool");
        Ok(Self {
            pool,
            url,
            migrated: Arc::new(OnceCell::new()),
        })
    }

    /// Opens an empty private in-memory database.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::new(IN_MEMORY_URL)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Applies pending migrations. Runs at most once per handle; later calls
    /// return immediately.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        self.migrated
            .get_or_try_init(|| async {
                let conn = self.checkout().await?;
                let applied = conn
                    .interact(|conn| {
                        // In-memory databases answer "memory" and keep their mode.
                        diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
                        diesel::sql_query("PRAGMA busy_timeout=30000;").execute(conn)?;
                        conn.run_pending_migrations(MIGRATIONS)
                            .map(|versions| versions.len())
                            .map_err(|e| StorageError::Migration(e.to_string()))
                    })
                    .await
                    .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;
                info!(url = %self.url, applied, "database migrations complete");
                Ok::<(), StorageError>(())
            })
            .await
            .map(|_| ())
    }

    /// Checks out a connection, migrating first if needed.
    pub async fn get_connection(&self) -> Result<PooledConnection, StorageError> {
        self.run_migrations().await?;
        self.checkout().await
    }

    async fn checkout(&self) -> Result<PooledConnection, StorageError> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))
    }

    /// Runs `query` on a pooled connection.
    pub(crate) async fn interact<R, F>(&self, query: F) -> Result<R, StorageError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<R, StorageError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.get_connection().await?;
        conn.interact(query)
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
    }

    /// Runs `write` inside one transaction. Any `Err` rolls back every
    /// statement it issued.
    pub(crate) async fn transaction<R, F>(&self, write: F) -> Result<R, StorageError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<R, StorageError> + Send + 'static,
        R: Send + 'static,
    {
        self.interact(move |conn| conn.transaction(write)).await
    }
}

/// Strips the `sqlite://` scheme diesel does not understand.
fn build_sqlite_url(url: &str) -> String {
    url.strip_prefix("sqlite://").unwrap_or(url).to_string()
}

/// Maps a SQLite unique-violation message to the constraint it names.
///
/// SQLite reports `UNIQUE constraint failed: table.col[, table.col]`.
pub(crate) fn unique_constraint(message: &str) -> &'static str {
    let columns = message.rsplit(": ").next().unwrap_or(message);
    match columns {
        "signers.token" => "signer.token",
        "signers.request_id, signers.order_index" => "signer(request_id, order_index)",
        "signature_batch_items.batch_id, signature_batch_items.position" => {
            "batch_item(batch_id, position)"
        }
        "oidc_sessions.state" => "oidc_session.state",
        "two_factor_enrollments.tenant_id, two_factor_enrollments.user_id" => {
            "two_factor(tenant_id, user_id)"
        }
        "signature_requests.id" => "signature_request.id",
        "signature_batches.id" => "batch.id",
        _ => "primary key",
    }
}

#[cfg(test)]
mod tests {
    use super::schema::usage_records;
    use super::*;

    #[test]
    fn test_sqlite_url_scheme_is_stripped() {
        assert_eq!(build_sqlite_url("sqlite:///tmp/a.db"), "/tmp/a.db");
        assert_eq!(build_sqlite_url("signatura.db"), "signatura.db");
        assert_eq!(build_sqlite_url(IN_MEMORY_URL), ":memory:");
    }

    #[test]
    fn test_unique_constraint_names() {
        assert_eq!(
            unique_constraint("UNIQUE constraint failed: signers.token"),
            "signer.token"
        );
        assert_eq!(
            unique_constraint("UNIQUE constraint failed: signers.request_id, signers.order_index"),
            "signer(request_id, order_index)"
        );
        assert_eq!(unique_constraint("UNIQUE constraint failed: x.y"), "primary key");
    }

    #[tokio::test]
    async fn test_migrations_run_once() {
        let db = Database::in_memory().unwrap();
        db.run_migrations().await.unwrap();
        db.run_migrations().await.unwrap();

        let count = db
            .interact(|conn| Ok(usage_records::table.count().get_result::<i64>(conn)?))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_failed_transaction_rolls_back() {
        let db = Database::in_memory().unwrap();
        let result: Result<(), StorageError> = db
            .transaction(|conn| {
                diesel::insert_into(usage_records::table)
                    .values((
                        usage_records::id.eq(uuid::Uuid::new_v4().as_bytes().to_vec()),
                        usage_records::tenant_id.eq(uuid::Uuid::new_v4().as_bytes().to_vec()),
                        usage_records::signature_count.eq(1),
                        usage_records::created_at.eq("2026-01-01T00:00:00.000000000Z"),
                    ))
                    .execute(conn)?;
                Err(StorageError::InvalidRecord("abort".into()))
            })
            .await;
        assert!(matches!(result, Err(StorageError::InvalidRecord(_))));

        let count = db
            .interact(|conn| Ok(usage_records::table.count().get_result::<i64>(conn)?))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
