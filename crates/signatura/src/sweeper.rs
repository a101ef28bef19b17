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

//! Periodic expiry sweep.
//!
//! Each pass expires pending requests past their deadline and deletes stale
//! OIDC sessions. [`ExpirySweeper::run`] repeats the pass every
//! `sweep_interval` until [`ExpirySweeper::shutdown`] is called.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::audit::AuditTrail;
use crate::clock::{to_chrono, SharedClock};
use crate::config::SignatureConfig;
use crate::dal::DAL;
use crate::error::SignatureError;
use crate::models::{ActorType, NewSignatureAuditEvent, SignatureEventType};

const COMPONENT: &str = "expiry_sweeper";

/// What one sweep pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_requests: usize,
    pub deleted_sessions: usize,
}

#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    dal: DAL,
    trail: AuditTrail,
    clock: SharedClock,
    interval: Duration,
    pending_ttl: chrono::Duration,
    max_session_age: chrono::Duration,
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ExpirySweeper {
    pub fn new(dal: DAL, config: &SignatureConfig, clock: SharedClock) -> Self {
        Self {
            trail: AuditTrail::new(dal.clone(), clock.clone()),
            dal,
            clock,
            interval: config.sweep_interval(),
            pending_ttl: to_chrono(config.oidc_pending_ttl()),
            max_session_age: to_chrono(config.oidc_max_session_age()),
            shutdown: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Runs one sweep at the clock's current instant.
    pub async fn run_once(&self) -> Result<SweepReport, SignatureError> {
        let now = self.clock.now();

        let expired = self.dal.signature_request().expire_pending(now).await?;
        for request in &expired {
            self.trail
                .record(
                    NewSignatureAuditEvent::new(request.tenant_id, SignatureEventType::RequestExpired)
                        .request(request.id)
                        .details(json!({ "expires_at": request.expires_at }))
                        .actor(ActorType::System, Some(COMPONENT.to_string())),
                )
                .await?;
        }

        let deleted_sessions = self
            .dal
            .oidc_session()
            .delete_stale(now, self.pending_ttl, self.max_session_age)
            .await?;

        let report = SweepReport {
            expired_requests: expired.len(),
            deleted_sessions,
        };
        if report != SweepReport::default() {
            info!(
                expired_requests = report.expired_requests,
                deleted_sessions = report.deleted_sessions,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweeps every interval until shut down. A failed pass is logged and
    /// retried on the next tick.
    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "expiry sweeper started");
        while !self.shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "expiry sweep failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    debug!("sweep interval elapsed");
                }
                _ = self.notify.notified() => {
                    debug!("expiry sweeper shutdown signal received");
                }
            }
        }
        info!("expiry sweeper stopped");
    }

    /// Stops [`run`](Self::run) after the pass in progress.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }
}
