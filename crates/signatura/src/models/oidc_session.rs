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

//! OIDC session model.
//!
//! Persisted continuation of a signing handshake, keyed by the OAuth `state`
//! parameter. The callback looks the row up and resumes the flow.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the handshake is signing for. Exactly one of the two, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SessionBinding {
    Signer(Uuid),
    Batch(Uuid),
}

impl SessionBinding {
    pub fn signer_id(&self) -> Option<Uuid> {
        match self {
            SessionBinding::Signer(id) => Some(*id),
            SessionBinding::Batch(_) => None,
        }
    }

    pub fn batch_id(&self) -> Option<Uuid> {
        match self {
            SessionBinding::Batch(id) => Some(*id),
            SessionBinding::Signer(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Authenticated,
    Used,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::Used => "used",
            SessionStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SessionStatus::Pending),
            "authenticated" => Some(SessionStatus::Authenticated),
            "used" => Some(SessionStatus::Used),
            "expired" => Some(SessionStatus::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OidcSession {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Unique across all sessions.
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    pub binding: SessionBinding,
    pub redirect_after: Option<String>,
    pub status: SessionStatus,
    pub identity_subject: Option<String>,
    pub bpk_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub authenticated_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for OidcSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcSession")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("binding", &self.binding)
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl OidcSession {
    pub fn new(
        tenant_id: Uuid,
        binding: SessionBinding,
        state: String,
        nonce: String,
        code_verifier: String,
        redirect_after: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            state,
            nonce,
            code_verifier,
            binding,
            redirect_after,
            status: SessionStatus::Pending,
            identity_subject: None,
            bpk_hash: None,
            created_at: now,
            authenticated_at: None,
            updated_at: now,
        }
    }
}
