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

//! Signature request model.
//!
//! A request is the unit a requester creates: one document, one or more
//! signers, and an absolute expiry. Requests are never deleted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a signature request.
///
/// `Completed`, `Expired` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
    Expired,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Expired => "expired",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "in_progress" => Some(RequestStatus::InProgress),
            "completed" => Some(RequestStatus::Completed),
            "expired" => Some(RequestStatus::Expired),
            "cancelled" => Some(RequestStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Expired | RequestStatus::Cancelled
        )
    }

    /// Whether the request may still be signed or cancelled.
    pub fn is_open(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::InProgress)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A multi-party signature request over one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Document store reference of the document to sign.
    pub document_id: Uuid,
    pub name: Option<String>,
    pub message: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub status: RequestStatus,
    /// Signers complete in `order_index` order when set.
    pub is_sequential: bool,
    /// Order index of the signer currently allowed to sign (sequential mode).
    pub current_signer_index: i32,
    /// Set iff `status == Completed`.
    pub signed_document_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SignatureRequest {
    pub fn new(
        tenant_id: Uuid,
        document_id: Uuid,
        created_by: Uuid,
        expires_at: DateTime<Utc>,
        is_sequential: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            document_id,
            name: None,
            message: None,
            expires_at,
            status: RequestStatus::Pending,
            is_sequential,
            current_signer_index: 0,
            signed_document_id: None,
            created_by,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Display title used in notifications and the signed artifact.
    pub fn title(&self) -> &str {
        self.name.as_deref().unwrap_or("Document")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_terminality() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::InProgress,
            RequestStatus::Completed,
            RequestStatus::Expired,
            RequestStatus::Cancelled,
        ] {
            assert_eq!(RequestStatus::from_str(status.as_str()), Some(status));
            assert_eq!(status.is_terminal(), !status.is_open());
        }
        assert_eq!(RequestStatus::from_str("signed"), None);
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&RequestStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
