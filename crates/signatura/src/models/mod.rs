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

//! Domain models for signature orchestration.
//!
//! These are the records the [`crate::dal::DAL`] persists. Status enums carry
//! their canonical lowercase string form (`as_str` / `from_str`) which is what
//! appears in audit details and API payloads.

pub mod audit_log;
pub mod batch;
pub mod oidc_session;
pub mod security_event;
pub mod signature_audit_event;
pub mod signature_field;
pub mod signature_request;
pub mod signer;
pub mod two_factor;
pub mod usage;

pub use audit_log::{AuditLogEntry, AuditLogFilter, AuditLogStats, NewAuditLogEntry};
pub use batch::{Batch, BatchItem, BatchItemStatus, BatchStatus};
pub use oidc_session::{OidcSession, SessionBinding, SessionStatus};
pub use security_event::{Outcome, SecurityEvent, Severity};
pub use signature_audit_event::{
    ActorType, NewSignatureAuditEvent, SignatureAuditEvent, SignatureEventType,
};
pub use signature_field::SignatureField;
pub use signature_request::{RequestStatus, SignatureRequest};
pub use signer::{CertificateInfo, Signer, SignerSignature, SignerStatus};
pub use two_factor::TwoFactorRecord;
pub use usage::UsageRecord;
