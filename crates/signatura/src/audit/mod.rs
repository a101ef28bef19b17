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

//! Operational audit logging.
//!
//! This module provides:
//! - [`AuditLogger`] with synchronous or bounded asynchronous writes
//! - Tenant-scoped queries, statistics and retention
//! - IP anonymization and user-agent truncation applied on insert
//! - [`AuditTrail`] for signature workflow events

pub mod anonymize;
mod logger;
mod trail;

pub use logger::{
    AuditError, AuditLogger, AuditMode, AuditSink, DbAuditSink, DEFAULT_AUDIT_BUFFER,
    DEFAULT_RETENTION_BATCH,
};
pub use trail::{attribute, AuditTrail};
