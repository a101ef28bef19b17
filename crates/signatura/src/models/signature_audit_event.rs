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

//! Signature audit event model.
//!
//! Append-only trail of every signature workflow transition. Rows carry
//! anonymized client IPs and truncated user agents; personal data (email,
//! BPK, certificate private material) never appears in `details`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who performed the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    Signer,
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::User => "user",
            ActorType::Signer => "signer",
            ActorType::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(ActorType::User),
            "signer" => Some(ActorType::Signer),
            "system" => Some(ActorType::System),
            _ => None,
        }
    }
}

/// Workflow transitions recorded in the signature audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureEventType {
    // Request lifecycle
    RequestCreated,
    RequestCompleted,
    RequestCancelled,
    RequestExpired,

    // Signer lifecycle
    SignerNotified,
    SignerReminded,
    SigningStarted,
    SigningCompleted,
    SigningFailed,

    // Batch lifecycle
    BatchCreated,
    BatchStarted,
    BatchCompleted,
    BatchCancelled,
    BatchRetry,
}

impl SignatureEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureEventType::RequestCreated => "request_created",
            SignatureEventType::RequestCompleted => "request_completed",
            SignatureEventType::RequestCancelled => "request_cancelled",
            SignatureEventType::RequestExpired => "request_expired",
            SignatureEventType::SignerNotified => "signer_notified",
            SignatureEventType::SignerReminded => "signer_reminded",
            SignatureEventType::SigningStarted => "signing_started",
            SignatureEventType::SigningCompleted => "signing_completed",
            SignatureEventType::SigningFailed => "signing_failed",
            SignatureEventType::BatchCreated => "batch_created",
            SignatureEventType::BatchStarted => "batch_started",
            SignatureEventType::BatchCompleted => "batch_completed",
            SignatureEventType::BatchCancelled => "batch_cancelled",
            SignatureEventType::BatchRetry => "batch_retry",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "request_created" => Some(SignatureEventType::RequestCreated),
            "request_completed" => Some(SignatureEventType::RequestCompleted),
            "request_cancelled" => Some(SignatureEventType::RequestCancelled),
            "request_expired" => Some(SignatureEventType::RequestExpired),
            "signer_notified" => Some(SignatureEventType::SignerNotified),
            "signer_reminded" => Some(SignatureEventType::SignerReminded),
            "signing_started" => Some(SignatureEventType::SigningStarted),
            "signing_completed" => Some(SignatureEventType::SigningCompleted),
            "signing_failed" => Some(SignatureEventType::SigningFailed),
            "batch_created" => Some(SignatureEventType::BatchCreated),
            "batch_started" => Some(SignatureEventType::BatchStarted),
            "batch_completed" => Some(SignatureEventType::BatchCompleted),
            "batch_cancelled" => Some(SignatureEventType::BatchCancelled),
            "batch_retry" => Some(SignatureEventType::BatchRetry),
            _ => None,
        }
    }

    pub fn is_batch_event(&self) -> bool {
        matches!(
            self,
            SignatureEventType::BatchCreated
                | SignatureEventType::BatchStarted
                | SignatureEventType::BatchCompleted
                | SignatureEventType::BatchCancelled
                | SignatureEventType::BatchRetry
        )
    }
}

/// A persisted signature audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureAuditEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub request_id: Option<Uuid>,
    pub signer_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub verification_id: Option<Uuid>,
    pub event_type: String,
    pub details: serde_json::Value,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    /// Anonymized on insert.
    pub client_ip: Option<String>,
    /// Truncated on insert.
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Structure for appending a signature audit event.
#[derive(Debug, Clone)]
pub struct NewSignatureAuditEvent {
    pub tenant_id: Uuid,
    pub request_id: Option<Uuid>,
    pub signer_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    pub verification_id: Option<Uuid>,
    pub event_type: SignatureEventType,
    pub details: serde_json::Value,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl NewSignatureAuditEvent {
    pub fn new(tenant_id: Uuid, event_type: SignatureEventType) -> Self {
        Self {
            tenant_id,
            request_id: None,
            signer_id: None,
            batch_id: None,
            verification_id: None,
            event_type,
            details: serde_json::Value::Object(Default::default()),
            actor_type: ActorType::System,
            actor_id: None,
            client_ip: None,
            user_agent: None,
        }
    }

    pub fn request(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn signer(mut self, signer_id: Uuid) -> Self {
        self.signer_id = Some(signer_id);
        self
    }

    pub fn batch(mut self, batch_id: Uuid) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn actor(mut self, actor_type: ActorType, actor_id: Option<String>) -> Self {
        self.actor_type = actor_type;
        self.actor_id = actor_id;
        self
    }

    pub fn client(mut self, client_ip: Option<String>, user_agent: Option<String>) -> Self {
        self.client_ip = client_ip;
        self.user_agent = user_agent;
        self
    }
}
