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

//! Billable usage records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Signatures produced by one completed request or one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub request_id: Option<Uuid>,
    pub batch_id: Option<Uuid>,
    /// Successfully signed documents only.
    pub signature_count: i32,
    pub cost_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Usage for `signature_count` signatures at `unit_cost_cents` each.
    pub fn new(
        tenant_id: Uuid,
        signature_count: i32,
        unit_cost_cents: Option<i64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            request_id: None,
            batch_id: None,
            signature_count,
            cost_cents: unit_cost_cents.map(|c| c * i64::from(signature_count)),
            created_at: now,
        }
    }

    pub fn for_request(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn for_batch(mut self, batch_id: Uuid) -> Self {
        self.batch_id = Some(batch_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_scales_with_count() {
        let usage = UsageRecord::new(Uuid::new_v4(), 3, Some(25), Utc::now());
        assert_eq!(usage.cost_cents, Some(75));

        let free = UsageRecord::new(Uuid::new_v4(), 3, None, Utc::now());
        assert_eq!(free.cost_cents, None);
    }
}
