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

//! SQLite row models.
//!
//! UUIDs are stored as 16-byte BLOBs, timestamps as fixed-width RFC3339
//! TEXT, JSON payloads as TEXT. Rows convert to and from the domain models in
//! [`crate::models`] at the DAL boundary; a row that does not decode is an
//! [`StorageError::InvalidRecord`].

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::database::schema::*;
use crate::error::StorageError;
use crate::models::{
    ActorType, AuditLogEntry, Batch, BatchItem, BatchItemStatus, BatchStatus, CertificateInfo,
    OidcSession, Outcome, RequestStatus, SecurityEvent, SessionBinding, SessionStatus, Severity,
    SignatureAuditEvent, SignatureField, SignatureRequest, Signer, SignerStatus, TwoFactorRecord,
    UsageRecord,
};

// ============================================================================
// Column codecs
// ============================================================================

pub(crate) fn uuid_to_blob(id: &Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

pub(crate) fn blob_to_uuid(blob: &[u8]) -> Result<Uuid, StorageError> {
    Uuid::from_slice(blob).map_err(|e| StorageError::InvalidRecord(format!("bad uuid: {e}")))
}

fn opt_blob_to_uuid(blob: Option<Vec<u8>>) -> Result<Option<Uuid>, StorageError> {
    blob.as_deref().map(blob_to_uuid).transpose()
}

/// Nanosecond precision with a `Z` suffix; every value has the same width.
pub(crate) fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidRecord(format!("bad timestamp '{s}': {e}")))
}

fn opt_string_to_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, StorageError> {
    s.as_deref().map(string_to_datetime).transpose()
}

fn opt_datetime_to_string(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(datetime_to_string)
}

fn decode_status<T>(column: &str, value: &str, parse: fn(&str) -> Option<T>) -> Result<T, StorageError> {
    parse(value).ok_or_else(|| StorageError::InvalidRecord(format!("unknown {column} '{value}'")))
}

fn decode_json(column: &str, value: &str) -> Result<serde_json::Value, StorageError> {
    serde_json::from_str(value)
        .map_err(|e| StorageError::InvalidRecord(format!("bad json in {column}: {e}")))
}

// ============================================================================
// Signature requests
// ============================================================================

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = signature_requests)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct SqliteSignatureRequest {
    pub id: Vec<u8>,
    pub tenant_id: Vec<u8>,
    pub document_id: Vec<u8>,
    pub name: Option<String>,
    pub message: Option<String>,
    pub expires_at: String,
    pub status: String,
    pub is_sequential: bool,
    pub current_signer_index: i32,
    pub signed_document_id: Option<Vec<u8>>,
    pub created_by: Vec<u8>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl From<&SignatureRequest> for SqliteSignatureRequest {
    fn from(r: &SignatureRequest) -> Self {
        Self {
            id: uuid_to_blob(&r.id),
            tenant_id: uuid_to_blob(&r.tenant_id),
            document_id: uuid_to_blob(&r.document_id),
            name: r.name.clone(),
            message: r.message.clone(),
            expires_at: datetime_to_string(&r.expires_at),
            status: r.status.as_str().to_string(),
            is_sequential: r.is_sequential,
            current_signer_index: r.current_signer_index,
            signed_document_id: r.signed_document_id.as_ref().map(uuid_to_blob),
            created_by: uuid_to_blob(&r.created_by),
            created_at: datetime_to_string(&r.created_at),
            updated_at: datetime_to_string(&r.updated_at),
            completed_at: opt_datetime_to_string(r.completed_at),
        }
    }
}

impl TryFrom<SqliteSignatureRequest> for SignatureRequest {
    type Error = StorageError;

    fn try_from(s: SqliteSignatureRequest) -> Result<Self, Self::Error> {
        Ok(SignatureRequest {
            id: blob_to_uuid(&s.id)?,
            tenant_id: blob_to_uuid(&s.tenant_id)?,
            document_id: blob_to_uuid(&s.document_id)?,
            name: s.name,
            message: s.message,
            expires_at: string_to_datetime(&s.expires_at)?,
            status: decode_status("request status", &s.status, RequestStatus::from_str)?,
            is_sequential: s.is_sequential,
            current_signer_index: s.current_signer_index,
            signed_document_id: opt_blob_to_uuid(s.signed_document_id)?,
            created_by: blob_to_uuid(&s.created_by)?,
            created_at: string_to_datetime(&s.created_at)?,
            updated_at: string_to_datetime(&s.updated_at)?,
            completed_at: opt_string_to_datetime(s.completed_at)?,
        })
    }
}

// ============================================================================
// Signers
// ============================================================================

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = signers)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct SqliteSigner {
    pub id: Vec<u8>,
    pub request_id: Vec<u8>,
    pub tenant_id: Vec<u8>,
    pub email: String,
    pub name: String,
    pub order_index: i32,
    pub token: String,
    pub token_expires_at: String,
    pub token_used: bool,
    pub status: String,
    pub certificate: Option<String>,
    pub signature_value: Option<String>,
    pub signature_timestamp: Option<String>,
    pub identity_subject: Option<String>,
    pub bpk_hash: Option<String>,
    pub notified_at: Option<String>,
    pub signed_at: Option<String>,
    pub reminder_count: i32,
    pub last_reminder_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub(crate) fn encode_certificate(cert: Option<&CertificateInfo>) -> Result<Option<String>, StorageError> {
    cert.map(serde_json::to_string)
        .transpose()
        .map_err(|e| StorageError::InvalidRecord(format!("certificate does not encode: {e}")))
}

impl TryFrom<&Signer> for SqliteSigner {
    type Error = StorageError;

    fn try_from(s: &Signer) -> Result<Self, Self::Error> {
        Ok(Self {
            id: uuid_to_blob(&s.id),
            request_id: uuid_to_blob(&s.request_id),
            tenant_id: uuid_to_blob(&s.tenant_id),
            email: s.email.clone(),
            name: s.name.clone(),
            order_index: s.order_index,
            token: s.token.clone(),
            token_expires_at: datetime_to_string(&s.token_expires_at),
            token_used: s.token_used,
            status: s.status.as_str().to_string(),
            certificate: encode_certificate(s.certificate.as_ref())?,
            signature_value: s.signature_value.clone(),
            signature_timestamp: s.signature_timestamp.clone(),
            identity_subject: s.identity_subject.clone(),
            bpk_hash: s.bpk_hash.clone(),
            notified_at: opt_datetime_to_string(s.notified_at),
            signed_at: opt_datetime_to_string(s.signed_at),
            reminder_count: s.reminder_count,
            last_reminder_at: opt_datetime_to_string(s.last_reminder_at),
            created_at: datetime_to_string(&s.created_at),
            updated_at: datetime_to_string(&s.updated_at),
        })
    }
}

impl TryFrom<SqliteSigner> for Signer {
    type Error = StorageError;

    fn try_from(s: SqliteSigner) -> Result<Self, Self::Error> {
        let certificate = s
            .certificate
            .as_deref()
            .map(serde_json::from_str::<CertificateInfo>)
            .transpose()
            .map_err(|e| StorageError::InvalidRecord(format!("bad certificate: {e}")))?;

        Ok(Signer {
            id: blob_to_uuid(&s.id)?,
            request_id: blob_to_uuid(&s.request_id)?,
            tenant_id: blob_to_uuid(&s.tenant_id)?,
            email: s.email,
            name: s.name,
            order_index: s.order_index,
            token: s.token,
            token_expires_at: string_to_datetime(&s.token_expires_at)?,
            token_used: s.token_used,
            status: decode_status("signer status", &s.status, SignerStatus::from_str)?,
            certificate,
            signature_value: s.signature_value,
            signature_timestamp: s.signature_timestamp,
            identity_subject: s.identity_subject,
            bpk_hash: s.bpk_hash,
            notified_at: opt_string_to_datetime(s.notified_at)?,
            signed_at: opt_string_to_datetime(s.signed_at)?,
            reminder_count: s.reminder_count,
            last_reminder_at: opt_string_to_datetime(s.last_reminder_at)?,
            created_at: string_to_datetime(&s.created_at)?,
            updated_at: string_to_datetime(&s.updated_at)?,
        })
    }
}

// ============================================================================
// Signature fields
// ============================================================================

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = signature_fields)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct SqliteSignatureField {
    pub id: Vec<u8>,
    pub request_id: Vec<u8>,
    pub signer_id: Option<Vec<u8>>,
    pub page: i32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub show_name: bool,
    pub show_date: bool,
    pub show_reason: bool,
    pub reason: Option<String>,
}

impl From<&SignatureField> for SqliteSignatureField {
    fn from(f: &SignatureField) -> Self {
        Self {
            id: uuid_to_blob(&f.id),
            request_id: uuid_to_blob(&f.request_id),
            signer_id: f.signer_id.as_ref().map(uuid_to_blob),
            page: f.page,
            x: f.x,
            y: f.y,
            width: f.width,
            height: f.height,
            show_name: f.show_name,
            show_date: f.show_date,
            show_reason: f.show_reason,
            reason: f.reason.clone(),
        }
    }
}

impl TryFrom<SqliteSignatureField> for SignatureField {
    type Error = StorageError;

    fn try_from(s: SqliteSignatureField) -> Result<Self, Self::Error> {
        Ok(SignatureField {
            id: blob_to_uuid(&s.id)?,
            request_id: blob_to_uuid(&s.request_id)?,
            signer_id: opt_blob_to_uuid(s.signer_id)?,
            page: s.page,
            x: s.x,
            y: s.y,
            width: s.width,
            height: s.height,
            show_name: s.show_name,
            show_date: s.show_date,
            show_reason: s.show_reason,
            reason: s.reason,
        })
    }
}

// ============================================================================
// Batches
// ============================================================================

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = signature_batches)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct SqliteBatch {
    pub id: Vec<u8>,
    pub tenant_id: Vec<u8>,
    pub created_by: Vec<u8>,
    pub name: Option<String>,
    pub total_documents: i32,
    pub status: String,
    pub signed_count: i32,
    pub failed_count: i32,
    pub identity_subject: Option<String>,
    pub bpk_hash: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl From<&Batch> for SqliteBatch {
    fn from(b: &Batch) -> Self {
        Self {
            id: uuid_to_blob(&b.id),
            tenant_id: uuid_to_blob(&b.tenant_id),
            created_by: uuid_to_blob(&b.created_by),
            name: b.name.clone(),
            total_documents: b.total_documents,
            status: b.status.as_str().to_string(),
            signed_count: b.signed_count,
            failed_count: b.failed_count,
            identity_subject: b.identity_subject.clone(),
            bpk_hash: b.bpk_hash.clone(),
            created_at: datetime_to_string(&b.created_at),
            updated_at: datetime_to_string(&b.updated_at),
            completed_at: opt_datetime_to_string(b.completed_at),
        }
    }
}

impl TryFrom<SqliteBatch> for Batch {
    type Error = StorageError;

    fn try_from(s: SqliteBatch) -> Result<Self, Self::Error> {
        Ok(Batch {
            id: blob_to_uuid(&s.id)?,
            tenant_id: blob_to_uuid(&s.tenant_id)?,
            created_by: blob_to_uuid(&s.created_by)?,
            name: s.name,
            total_documents: s.total_documents,
            status: decode_status("batch status", &s.status, BatchStatus::from_str)?,
            signed_count: s.signed_count,
            failed_count: s.failed_count,
            identity_subject: s.identity_subject,
            bpk_hash: s.bpk_hash,
            created_at: string_to_datetime(&s.created_at)?,
            updated_at: string_to_datetime(&s.updated_at)?,
            completed_at: opt_string_to_datetime(s.completed_at)?,
        })
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = signature_batch_items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct SqliteBatchItem {
    pub id: Vec<u8>,
    pub batch_id: Vec<u8>,
    pub position: i32,
    pub document_id: Vec<u8>,
    pub title: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub document_hash: Option<String>,
    pub signature_value: Option<String>,
    pub signed_document_id: Option<Vec<u8>>,
    pub signed_at: Option<String>,
    pub updated_at: String,
}

impl From<&BatchItem> for SqliteBatchItem {
    fn from(i: &BatchItem) -> Self {
        Self {
            id: uuid_to_blob(&i.id),
            batch_id: uuid_to_blob(&i.batch_id),
            position: i.position,
            document_id: uuid_to_blob(&i.document_id),
            title: i.title.clone(),
            status: i.status.as_str().to_string(),
            error_message: i.error_message.clone(),
            document_hash: i.document_hash.clone(),
            signature_value: i.signature_value.clone(),
            signed_document_id: i.signed_document_id.as_ref().map(uuid_to_blob),
            signed_at: opt_datetime_to_string(i.signed_at),
            updated_at: datetime_to_string(&i.updated_at),
        }
    }
}

impl TryFrom<SqliteBatchItem> for BatchItem {
    type Error = StorageError;

    fn try_from(s: SqliteBatchItem) -> Result<Self, Self::Error> {
        Ok(BatchItem {
            id: blob_to_uuid(&s.id)?,
            batch_id: blob_to_uuid(&s.batch_id)?,
            position: s.position,
            document_id: blob_to_uuid(&s.document_id)?,
            title: s.title,
            status: decode_status("batch item status", &s.status, BatchItemStatus::from_str)?,
            error_message: s.error_message,
            document_hash: s.document_hash,
            signature_value: s.signature_value,
            signed_document_id: opt_blob_to_uuid(s.signed_document_id)?,
            signed_at: opt_string_to_datetime(s.signed_at)?,
            updated_at: string_to_datetime(&s.updated_at)?,
        })
    }
}

// ============================================================================
// Signature audit events
// ============================================================================

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = signature_audit_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct SqliteSignatureAuditEvent {
    pub id: Vec<u8>,
    pub tenant_id: Vec<u8>,
    pub request_id: Option<Vec<u8>>,
    pub signer_id: Option<Vec<u8>>,
    pub batch_id: Option<Vec<u8>>,
    pub verification_id: Option<Vec<u8>>,
    pub event_type: String,
    pub details: String,
    pub actor_type: String,
    pub actor_id: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
}

impl From<&SignatureAuditEvent> for SqliteSignatureAuditEvent {
    fn from(e: &SignatureAuditEvent) -> Self {
        Self {
            id: uuid_to_blob(&e.id),
            tenant_id: uuid_to_blob(&e.tenant_id),
            request_id: e.request_id.as_ref().map(uuid_to_blob),
            signer_id: e.signer_id.as_ref().map(uuid_to_blob),
            batch_id: e.batch_id.as_ref().map(uuid_to_blob),
            verification_id: e.verification_id.as_ref().map(uuid_to_blob),
            event_type: e.event_type.clone(),
            details: e.details.to_string(),
            actor_type: e.actor_type.as_str().to_string(),
            actor_id: e.actor_id.clone(),
            client_ip: e.client_ip.clone(),
            user_agent: e.user_agent.clone(),
            created_at: datetime_to_string(&e.created_at),
        }
    }
}

impl TryFrom<SqliteSignatureAuditEvent> for SignatureAuditEvent {
    type Error = StorageError;

    fn try_from(s: SqliteSignatureAuditEvent) -> Result<Self, Self::Error> {
        Ok(SignatureAuditEvent {
            id: blob_to_uuid(&s.id)?,
            tenant_id: blob_to_uuid(&s.tenant_id)?,
            request_id: opt_blob_to_uuid(s.request_id)?,
            signer_id: opt_blob_to_uuid(s.signer_id)?,
            batch_id: opt_blob_to_uuid(s.batch_id)?,
            verification_id: opt_blob_to_uuid(s.verification_id)?,
            event_type: s.event_type,
            details: decode_json("details", &s.details)?,
            actor_type: decode_status("actor type", &s.actor_type, ActorType::from_str)?,
            actor_id: s.actor_id,
            client_ip: s.client_ip,
            user_agent: s.user_agent,
            created_at: string_to_datetime(&s.created_at)?,
        })
    }
}

// ============================================================================
// OIDC sessions
// ============================================================================

const BINDING_SIGNER: &str = "signer";
const BINDING_BATCH: &str = "batch";

pub(crate) fn binding_columns(binding: &SessionBinding) -> (&'static str, Vec<u8>) {
    match binding {
        SessionBinding::Signer(id) => (BINDING_SIGNER, uuid_to_blob(id)),
        SessionBinding::Batch(id) => (BINDING_BATCH, uuid_to_blob(id)),
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = oidc_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct SqliteOidcSession {
    pub id: Vec<u8>,
    pub tenant_id: Vec<u8>,
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    pub binding_kind: String,
    pub binding_id: Vec<u8>,
    pub redirect_after: Option<String>,
    pub status: String,
    pub identity_subject: Option<String>,
    pub bpk_hash: Option<String>,
    pub created_at: String,
    pub authenticated_at: Option<String>,
    pub updated_at: String,
}

impl From<&OidcSession> for SqliteOidcSession {
    fn from(s: &OidcSession) -> Self {
        let (binding_kind, binding_id) = binding_columns(&s.binding);
        Self {
            id: uuid_to_blob(&s.id),
            tenant_id: uuid_to_blob(&s.tenant_id),
            state: s.state.clone(),
            nonce: s.nonce.clone(),
            code_verifier: s.code_verifier.clone(),
            binding_kind: binding_kind.to_string(),
            binding_id,
            redirect_after: s.redirect_after.clone(),
            status: s.status.as_str().to_string(),
            identity_subject: s.identity_subject.clone(),
            bpk_hash: s.bpk_hash.clone(),
            created_at: datetime_to_string(&s.created_at),
            authenticated_at: opt_datetime_to_string(s.authenticated_at),
            updated_at: datetime_to_string(&s.updated_at),
        }
    }
}

impl TryFrom<SqliteOidcSession> for OidcSession {
    type Error = StorageError;

    fn try_from(s: SqliteOidcSession) -> Result<Self, Self::Error> {
        let bound = blob_to_uuid(&s.binding_id)?;
        let binding = match s.binding_kind.as_str() {
            BINDING_SIGNER => SessionBinding::Signer(bound),
            BINDING_BATCH => SessionBinding::Batch(bound),
            other => {
                return Err(StorageError::InvalidRecord(format!(
                    "unknown session binding '{other}'"
                )))
            }
        };

        Ok(OidcSession {
            id: blob_to_uuid(&s.id)?,
            tenant_id: blob_to_uuid(&s.tenant_id)?,
            state: s.state,
            nonce: s.nonce,
            code_verifier: s.code_verifier,
            binding,
            redirect_after: s.redirect_after,
            status: decode_status("session status", &s.status, SessionStatus::from_str)?,
            identity_subject: s.identity_subject,
            bpk_hash: s.bpk_hash,
            created_at: string_to_datetime(&s.created_at)?,
            authenticated_at: opt_string_to_datetime(s.authenticated_at)?,
            updated_at: string_to_datetime(&s.updated_at)?,
        })
    }
}

// ============================================================================
// Usage, audit log, security events, two-factor
// ============================================================================

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = usage_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct SqliteUsageRecord {
    pub id: Vec<u8>,
    pub tenant_id: Vec<u8>,
    pub request_id: Option<Vec<u8>>,
    pub batch_id: Option<Vec<u8>>,
    pub signature_count: i32,
    pub cost_cents: Option<i64>,
    pub created_at: String,
}

impl From<&UsageRecord> for SqliteUsageRecord {
    fn from(u: &UsageRecord) -> Self {
        Self {
            id: uuid_to_blob(&u.id),
            tenant_id: uuid_to_blob(&u.tenant_id),
            request_id: u.request_id.as_ref().map(uuid_to_blob),
            batch_id: u.batch_id.as_ref().map(uuid_to_blob),
            signature_count: u.signature_count,
            cost_cents: u.cost_cents,
            created_at: datetime_to_string(&u.created_at),
        }
    }
}

impl TryFrom<SqliteUsageRecord> for UsageRecord {
    type Error = StorageError;

    fn try_from(s: SqliteUsageRecord) -> Result<Self, Self::Error> {
        Ok(UsageRecord {
            id: blob_to_uuid(&s.id)?,
            tenant_id: blob_to_uuid(&s.tenant_id)?,
            request_id: opt_blob_to_uuid(s.request_id)?,
            batch_id: opt_blob_to_uuid(s.batch_id)?,
            signature_count: s.signature_count,
            cost_cents: s.cost_cents,
            created_at: string_to_datetime(&s.created_at)?,
        })
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = audit_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct SqliteAuditLogEntry {
    pub id: Vec<u8>,
    pub tenant_id: Vec<u8>,
    pub user_id: Option<Vec<u8>>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
}

impl From<&AuditLogEntry> for SqliteAuditLogEntry {
    fn from(e: &AuditLogEntry) -> Self {
        Self {
            id: uuid_to_blob(&e.id),
            tenant_id: uuid_to_blob(&e.tenant_id),
            user_id: e.user_id.as_ref().map(uuid_to_blob),
            action: e.action.clone(),
            resource_type: e.resource_type.clone(),
            resource_id: e.resource_id.clone(),
            details: e.details.to_string(),
            ip_address: e.ip_address.clone(),
            user_agent: e.user_agent.clone(),
            created_at: datetime_to_string(&e.created_at),
        }
    }
}

impl TryFrom<SqliteAuditLogEntry> for AuditLogEntry {
    type Error = StorageError;

    fn try_from(s: SqliteAuditLogEntry) -> Result<Self, Self::Error> {
        Ok(AuditLogEntry {
            id: blob_to_uuid(&s.id)?,
            tenant_id: blob_to_uuid(&s.tenant_id)?,
            user_id: opt_blob_to_uuid(s.user_id)?,
            action: s.action,
            resource_type: s.resource_type,
            resource_id: s.resource_id,
            details: decode_json("details", &s.details)?,
            ip_address: s.ip_address,
            user_agent: s.user_agent,
            created_at: string_to_datetime(&s.created_at)?,
        })
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = security_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct SqliteSecurityEvent {
    pub id: Vec<u8>,
    pub event_type: String,
    pub severity: String,
    pub outcome: String,
    pub tenant_id: Option<Vec<u8>>,
    pub actor_id: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: String,
    pub occurred_at: String,
}

impl From<&SecurityEvent> for SqliteSecurityEvent {
    fn from(e: &SecurityEvent) -> Self {
        Self {
            id: uuid_to_blob(&e.id),
            event_type: e.event_type.clone(),
            severity: e.severity.as_str().to_string(),
            outcome: e.outcome.as_str().to_string(),
            tenant_id: e.tenant_id.as_ref().map(uuid_to_blob),
            actor_id: e.actor_id.clone(),
            client_ip: e.client_ip.clone(),
            user_agent: e.user_agent.clone(),
            metadata: e.metadata.to_string(),
            occurred_at: datetime_to_string(&e.occurred_at),
        }
    }
}

impl TryFrom<SqliteSecurityEvent> for SecurityEvent {
    type Error = StorageError;

    fn try_from(s: SqliteSecurityEvent) -> Result<Self, Self::Error> {
        Ok(SecurityEvent {
            id: blob_to_uuid(&s.id)?,
            event_type: s.event_type,
            severity: decode_status("severity", &s.severity, Severity::from_str)?,
            outcome: decode_status("outcome", &s.outcome, Outcome::from_str)?,
            tenant_id: opt_blob_to_uuid(s.tenant_id)?,
            actor_id: s.actor_id,
            client_ip: s.client_ip,
            user_agent: s.user_agent,
            metadata: decode_json("metadata", &s.metadata)?,
            occurred_at: string_to_datetime(&s.occurred_at)?,
        })
    }
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = two_factor_enrollments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct SqliteTwoFactorEnrollment {
    pub tenant_id: Vec<u8>,
    pub user_id: Vec<u8>,
    pub encrypted_secret: Vec<u8>,
    pub encrypted_recovery_codes: Vec<u8>,
    pub enabled_at: String,
    pub updated_at: String,
}

impl From<&TwoFactorRecord> for SqliteTwoFactorEnrollment {
    fn from(r: &TwoFactorRecord) -> Self {
        Self {
            tenant_id: uuid_to_blob(&r.tenant_id),
            user_id: uuid_to_blob(&r.user_id),
            encrypted_secret: r.encrypted_secret.clone(),
            encrypted_recovery_codes: r.encrypted_recovery_codes.clone(),
            enabled_at: datetime_to_string(&r.enabled_at),
            updated_at: datetime_to_string(&r.updated_at),
        }
    }
}

impl TryFrom<SqliteTwoFactorEnrollment> for TwoFactorRecord {
    type Error = StorageError;

    fn try_from(s: SqliteTwoFactorEnrollment) -> Result<Self, Self::Error> {
        Ok(TwoFactorRecord {
            user_id: blob_to_uuid(&s.user_id)?,
            tenant_id: blob_to_uuid(&s.tenant_id)?,
            encrypted_secret: s.encrypted_secret,
            encrypted_recovery_codes: s.encrypted_recovery_codes,
            enabled_at: string_to_datetime(&s.enabled_at)?,
            updated_at: string_to_datetime(&s.updated_at)?,
        })
    }
}

/// Decodes a list of rows, failing on the first bad one.
pub(crate) fn decode_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StorageError>
where
    T: TryFrom<R, Error = StorageError>,
{
    rows.into_iter().map(T::try_from).collect()
}
