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

//! Operational audit logger.
//!
//! Writes go through an [`AuditSink`] either inline ([`AuditMode::Sync`]) or
//! through a bounded queue drained by a single background consumer
//! ([`AuditMode::Async`]). Producers never wait on the queue: when it is full
//! the entry is written inline and a warning is logged. [`AuditLogger::shutdown`]
//! drains whatever is still queued.
//!
//! Reads require a tenant. A context without one gets
//! [`AuditError::NoTenantContext`] and no rows.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::context::RequestContext;
use crate::dal::DAL;
use crate::error::StorageError;
use crate::models::{AuditLogEntry, AuditLogFilter, AuditLogStats, NewAuditLogEntry};

/// Default queue capacity for asynchronous writes.
pub const DEFAULT_AUDIT_BUFFER: usize = 1000;

/// Default rows deleted per retention write.
pub const DEFAULT_RETENTION_BATCH: usize = 1000;

/// Entries the consumer writes per batch.
const CONSUMER_BATCH: usize = 100;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("no tenant context")]
    NoTenantContext,

    #[error("audit storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for AuditError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NoTenantContext => Self::NoTenantContext,
            other => Self::Storage(other),
        }
    }
}

/// Destination for audit rows.
#[async_trait]
pub trait AuditSink: Send + Sync + std::fmt::Debug {
    async fn write(&self, entries: Vec<NewAuditLogEntry>) -> Result<(), StorageError>;
}

/// Writes audit rows through the DAL.
#[derive(Debug, Clone)]
pub struct DbAuditSink {
    dal: DAL,
}

impl DbAuditSink {
    pub fn new(dal: DAL) -> Self {
        Self { dal }
    }
}

#[async_trait]
impl AuditSink for DbAuditSink {
    async fn write(&self, entries: Vec<NewAuditLogEntry>) -> Result<(), StorageError> {
        self.dal.audit_log().insert_many(entries).await.map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditMode {
    Sync,
    Async { buffer: usize },
}

impl Default for AuditMode {
    fn default() -> Self {
        AuditMode::Async {
            buffer: DEFAULT_AUDIT_BUFFER,
        }
    }
}

#[derive(Debug)]
pub struct AuditLogger {
    dal: DAL,
    sink: Arc<dyn AuditSink>,
    clock: SharedClock,
    sender: Mutex<Option<mpsc::Sender<NewAuditLogEntry>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    retention_batch: usize,
}

impl AuditLogger {
    /// Creates a logger writing through the DAL.
    ///
    /// In async mode the consumer task is spawned immediately, so this must
    /// be called inside a Tokio runtime.
    pub fn new(dal: DAL, clock: SharedClock, mode: AuditMode) -> Self {
        let sink: Arc<dyn AuditSink> = Arc::new(DbAuditSink::new(dal.clone()));
        Self::with_sink(dal, sink, clock, mode)
    }

    pub fn with_sink(dal: DAL, sink: Arc<dyn AuditSink>, clock: SharedClock, mode: AuditMode) -> Self {
        let (sender, worker) = match mode {
            AuditMode::Sync => (None, None),
            AuditMode::Async { buffer } => {
                let (tx, rx) = mpsc::channel(buffer.max(1));
                let handle = tokio::spawn(consume(rx, sink.clone()));
                (Some(tx), Some(handle))
            }
        };
        Self {
            dal,
            sink,
            clock,
            sender: Mutex::new(sender),
            worker: Mutex::new(worker),
            retention_batch: DEFAULT_RETENTION_BATCH,
        }
    }

    pub fn with_retention_batch(mut self, batch: usize) -> Self {
        self.retention_batch = batch.max(1);
        self
    }

    /// Queues or writes `entry`.
    pub async fn log(&self, entry: NewAuditLogEntry) -> Result<(), AuditError> {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            return Ok(self.sink.write(vec![entry]).await?);
        };

        match sender.try_send(entry) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(entry)) => {
                tracing::warn!(
                    tenant_id = %entry.tenant_id,
                    action = %entry.action,
                    "audit buffer full, writing synchronously"
                );
                Ok(self.sink.write(vec![entry]).await?)
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                tracing::warn!(
                    tenant_id = %entry.tenant_id,
                    action = %entry.action,
                    "audit consumer stopped, writing synchronously"
                );
                Ok(self.sink.write(vec![entry]).await?)
            }
        }
    }

    /// Logs an action on behalf of the caller in `ctx`.
    pub async fn record(
        &self,
        ctx: &RequestContext,
        action: &str,
        resource_type: &str,
        resource_id: Option<String>,
        details: serde_json::Value,
    ) -> Result<(), AuditError> {
        let tenant_id = ctx.require_tenant()?;
        let mut entry = NewAuditLogEntry::new(tenant_id, action, resource_type, self.clock.now())
            .details(details)
            .client(ctx.client_ip.clone(), ctx.user_agent.clone());
        if let Some(user_id) = ctx.actor_id.as_deref().and_then(|a| Uuid::parse_str(a).ok()) {
            entry = entry.user(user_id);
        }
        if let Some(resource_id) = resource_id {
            entry = entry.resource(resource_id);
        }
        self.log(entry).await
    }

    pub async fn query(
        &self,
        ctx: &RequestContext,
        filter: &AuditLogFilter,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        let tenant_id = ctx.require_tenant()?;
        Ok(self.dal.audit_log().query(tenant_id, filter).await?)
    }

    pub async fn stats(&self, ctx: &RequestContext) -> Result<AuditLogStats, AuditError> {
        let tenant_id = ctx.require_tenant()?;
        Ok(self.dal.audit_log().stats(tenant_id, self.clock.now()).await?)
    }

    /// Deletes the tenant's entries older than `retention`.
    pub async fn apply_retention(
        &self,
        ctx: &RequestContext,
        retention: chrono::Duration,
    ) -> Result<usize, AuditError> {
        let tenant_id = ctx.require_tenant()?;
        let cutoff = self.clock.now() - retention;
        Ok(self
            .dal
            .audit_log()
            .delete_older_than(tenant_id, cutoff, self.retention_batch)
            .await?)
    }

    /// Stops accepting queued writes and waits for the consumer to drain.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "audit consumer task failed");
            }
        }
        tracing::debug!("audit logger shut down");
    }
}

async fn consume(mut rx: mpsc::Receiver<NewAuditLogEntry>, sink: Arc<dyn AuditSink>) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while batch.len() < CONSUMER_BATCH {
            match rx.try_recv() {
                Ok(entry) => batch.push(entry),
                Err(_) => break,
            }
        }
        let count = batch.len();
        if let Err(e) = sink.write(batch).await {
            tracing::error!(error = %e, count, "failed to write queued audit entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::database::Database;
    use tracing_test::traced_test;

    fn setup(mode: AuditMode) -> (AuditLogger, DAL, ManualClock) {
        let dal = DAL::new(Database::in_memory().unwrap());
        let clock = ManualClock::starting_now();
        let logger = AuditLogger::new(dal.clone(), Arc::new(clock.clone()), mode);
        (logger, dal, clock)
    }

    #[tokio::test]
    async fn test_sync_write_visible_immediately() {
        let (logger, _, _) = setup(AuditMode::Sync);
        let tenant = Uuid::new_v4();
        let ctx = RequestContext::user(tenant, Uuid::new_v4()).with_client("2001:db8:1:2:3:4:5:6", "agent");

        logger
            .record(&ctx, "credential.update", "credential", Some("c-1".into()), serde_json::json!({}))
            .await
            .unwrap();

        let rows = logger.query(&ctx, &AuditLogFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ip_address.as_deref(), Some("2001:db8:1:2::"));
        assert!(rows[0].user_id.is_some());
    }

    #[tokio::test]
    async fn test_reads_require_tenant() {
        let (logger, _, _) = setup(AuditMode::Sync);
        let ctx = RequestContext::anonymous();
        assert!(matches!(
            logger.query(&ctx, &AuditLogFilter::default()).await,
            Err(AuditError::NoTenantContext)
        ));
        assert!(matches!(logger.stats(&ctx).await, Err(AuditError::NoTenantContext)));
        assert!(matches!(
            logger
                .record(&ctx, "x", "y", None, serde_json::json!({}))
                .await,
            Err(AuditError::NoTenantContext)
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_overflow_falls_back_to_sync_write() {
        let (logger, dal, clock) = setup(AuditMode::Async { buffer: 1 });
        let tenant = Uuid::new_v4();

        // Single-threaded runtime: the consumer cannot run until we yield.
        for i in 0..3 {
            logger
                .log(NewAuditLogEntry::new(tenant, format!("a{i}"), "r", clock.now()))
                .await
                .unwrap();
        }
        assert_eq!(dal.audit_log().stats(tenant, clock.now()).await.unwrap().total, 2);
        assert!(logs_contain("audit buffer full"));

        logger.shutdown().await;
        assert_eq!(dal.audit_log().stats(tenant, clock.now()).await.unwrap().total, 3);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let (logger, dal, clock) = setup(AuditMode::default());
        let tenant = Uuid::new_v4();
        for _ in 0..250 {
            logger
                .log(NewAuditLogEntry::new(tenant, "login", "session", clock.now()))
                .await
                .unwrap();
        }
        logger.shutdown().await;
        assert_eq!(dal.audit_log().stats(tenant, clock.now()).await.unwrap().total, 250);

        // Writes after shutdown still land
        logger
            .log(NewAuditLogEntry::new(tenant, "logout", "session", clock.now()))
            .await
            .unwrap();
        assert_eq!(dal.audit_log().stats(tenant, clock.now()).await.unwrap().total, 251);
    }

    #[tokio::test]
    async fn test_retention() {
        let (logger, dal, clock) = setup(AuditMode::Sync);
        let tenant = Uuid::new_v4();
        let ctx = RequestContext::user(tenant, Uuid::new_v4());
        dal.audit_log()
            .insert(NewAuditLogEntry::new(
                tenant,
                "old",
                "r",
                clock.now() - chrono::Duration::days(100),
            ))
            .await
            .unwrap();
        dal.audit_log()
            .insert(NewAuditLogEntry::new(tenant, "new", "r", clock.now()))
            .await
            .unwrap();

        let deleted = logger
            .apply_retention(&ctx, chrono::Duration::days(90))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(logger.stats(&ctx).await.unwrap().total, 1);
    }
}
