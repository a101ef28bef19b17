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

//! Operational audit log model.
//!
//! General-purpose "who did what to which resource" rows, separate from the
//! signature workflow trail. All reads are tenant-scoped.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on rows returned by one query.
pub const MAX_QUERY_LIMIT: usize = 100;

/// Rows returned when a filter sets no limit.
pub const DEFAULT_QUERY_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: serde_json::Value,
    /// Anonymized on insert.
    pub ip_address: Option<String>,
    /// Truncated on insert.
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditLogEntry {
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Stamped by the producer so async writes keep their own timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewAuditLogEntry {
    pub fn new(
        tenant_id: Uuid,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            user_id: None,
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: None,
            details: serde_json::Value::Object(Default::default()),
            ip_address: None,
            user_agent: None,
            created_at,
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// Query filter. The tenant is not part of the filter; it is a separate,
/// mandatory argument to every read.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub user_id: Option<Uuid>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl AuditLogFilter {
    /// Limit after applying the default and the upper bound.
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT)
    }
}

/// Aggregates over one tenant's audit log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogStats {
    pub total: u64,
    pub by_action: BTreeMap<String, u64>,
    pub by_resource_type: BTreeMap<String, u64>,
    pub last_24h: u64,
    pub last_7d: u64,
    pub last_30d: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_clamped() {
        let mut filter = AuditLogFilter::default();
        assert_eq!(filter.effective_limit(), DEFAULT_QUERY_LIMIT);

        filter.limit = Some(10_000);
        assert_eq!(filter.effective_limit(), MAX_QUERY_LIMIT);

        filter.limit = Some(0);
        assert_eq!(filter.effective_limit(), 1);
    }
}
