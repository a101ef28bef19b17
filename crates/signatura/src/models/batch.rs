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

//! Batch signing models.
//!
//! A batch lets one signer sign up to a bounded number of documents with a
//! single identity handshake. Items succeed or fail independently.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Signing,
    Completed,
    PartialFailure,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Signing => "signing",
            BatchStatus::Completed => "completed",
            BatchStatus::PartialFailure => "partial_failure",
            BatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BatchStatus::Pending),
            "signing" => Some(BatchStatus::Signing),
            "completed" => Some(BatchStatus::Completed),
            "partial_failure" => Some(BatchStatus::PartialFailure),
            "cancelled" => Some(BatchStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal for a run. `PartialFailure` can still be re-opened by retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::PartialFailure | BatchStatus::Cancelled
        )
    }

    /// Status after a run that left `signed` and `failed` items out of `total`.
    ///
    /// There is no `failed` terminal state: a run in which nothing was signed
    /// still ends in `PartialFailure` so the caller can retry.
    pub fn after_run(signed: i32, failed: i32, total: i32) -> Self {
        if failed == 0 && signed == total {
            BatchStatus::Completed
        } else {
            BatchStatus::PartialFailure
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemStatus {
    Pending,
    Signing,
    Signed,
    Failed,
}

impl BatchItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchItemStatus::Pending => "pending",
            BatchItemStatus::Signing => "signing",
            BatchItemStatus::Signed => "signed",
            BatchItemStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BatchItemStatus::Pending),
            "signing" => Some(BatchItemStatus::Signing),
            "signed" => Some(BatchItemStatus::Signed),
            "failed" => Some(BatchItemStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for BatchItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub created_by: Uuid,
    pub name: Option<String>,
    pub total_documents: i32,
    pub status: BatchStatus,
    pub signed_count: i32,
    pub failed_count: i32,
    /// Identity established by the last handshake.
    pub identity_subject: Option<String>,
    pub bpk_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Batch {
    pub fn new(
        tenant_id: Uuid,
        created_by: Uuid,
        name: Option<String>,
        total_documents: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            created_by,
            name,
            total_documents,
            status: BatchStatus::Pending,
            signed_count: 0,
            failed_count: 0,
            identity_subject: None,
            bpk_hash: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub id: Uuid,
    pub batch_id: Uuid,
    /// Position of the document in the submitted list.
    pub position: i32,
    pub document_id: Uuid,
    pub title: Option<String>,
    pub status: BatchItemStatus,
    pub error_message: Option<String>,
    pub document_hash: Option<String>,
    pub signature_value: Option<String>,
    pub signed_document_id: Option<Uuid>,
    pub signed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl BatchItem {
    pub fn new(
        batch_id: Uuid,
        position: i32,
        document_id: Uuid,
        title: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            position,
            document_id,
            title,
            status: BatchItemStatus::Pending,
            error_message: None,
            document_hash: None,
            signature_value: None,
            signed_document_id: None,
            signed_at: None,
            updated_at: now,
        }
    }
}
