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

//! Persisted two-factor enrollment.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A user's confirmed TOTP enrollment.
///
/// Both blobs are AES-256-GCM `nonce || ciphertext || tag` under keys derived
/// from the tenant key and the user id; nothing here is usable without the
/// master key.
#[derive(Clone)]
pub struct TwoFactorRecord {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub encrypted_secret: Vec<u8>,
    pub encrypted_recovery_codes: Vec<u8>,
    pub enabled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for TwoFactorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoFactorRecord")
            .field("user_id", &self.user_id)
            .field("tenant_id", &self.tenant_id)
            .field("enabled_at", &self.enabled_at)
            .finish_non_exhaustive()
    }
}
