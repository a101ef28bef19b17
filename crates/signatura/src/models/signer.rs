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

//! Signer model.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::generate_secure_token;

/// Lifecycle status of one signer.
///
/// ```text
/// pending ──notify──▶ notified ──start──▶ signing ──sign──▶ signed
/// notified, signing ──request cancelled/expired──▶ expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerStatus {
    Pending,
    Notified,
    Signing,
    Signed,
    Expired,
}

impl SignerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerStatus::Pending => "pending",
            SignerStatus::Notified => "notified",
            SignerStatus::Signing => "signing",
            SignerStatus::Signed => "signed",
            SignerStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SignerStatus::Pending),
            "notified" => Some(SignerStatus::Notified),
            "signing" => Some(SignerStatus::Signing),
            "signed" => Some(SignerStatus::Signed),
            "expired" => Some(SignerStatus::Expired),
            _ => None,
        }
    }

    /// Signer has not finished and the request has not closed on them.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            SignerStatus::Pending | SignerStatus::Notified | SignerStatus::Signing
        )
    }
}

impl fmt::Display for SignerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public details of the certificate used for a signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub subject: String,
    pub serial_number: String,
    pub issuer: String,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// One party asked to sign a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signer {
    pub id: Uuid,
    pub request_id: Uuid,
    /// Denormalized from the parent request so every read can carry the
    /// tenant predicate.
    pub tenant_id: Uuid,
    pub email: String,
    pub name: String,
    /// Unique within the request.
    pub order_index: i32,
    /// Opaque 256-bit hex token, globally unique.
    #[serde(skip_serializing, default)]
    pub token: String,
    pub token_expires_at: DateTime<Utc>,
    /// Implies `status == Signed`.
    pub token_used: bool,
    pub status: SignerStatus,
    pub certificate: Option<CertificateInfo>,
    pub signature_value: Option<String>,
    pub signature_timestamp: Option<String>,
    pub identity_subject: Option<String>,
    /// SHA-256 of the BPK; the plaintext is never stored.
    pub bpk_hash: Option<String>,
    pub notified_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub reminder_count: i32,
    pub last_reminder_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Signer {
    /// New pending signer with a fresh token valid for `token_ttl`.
    pub fn new(
        request_id: Uuid,
        tenant_id: Uuid,
        email: impl Into<String>,
        name: impl Into<String>,
        order_index: i32,
        token_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            tenant_id,
            email: email.into(),
            name: name.into(),
            order_index,
            token: generate_secure_token(),
            token_expires_at: now + token_ttl,
            token_used: false,
            status: SignerStatus::Pending,
            certificate: None,
            signature_value: None,
            signature_timestamp: None,
            identity_subject: None,
            bpk_hash: None,
            notified_at: None,
            signed_at: None,
            reminder_count: 0,
            last_reminder_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Token exists, is unused and has not expired at `now`.
    pub fn token_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.token_used && now < self.token_expires_at
    }
}

/// Result of a successful remote signature, applied to a signer in one step.
#[derive(Debug, Clone)]
pub struct SignerSignature {
    pub signature_value: String,
    pub signature_timestamp: Option<String>,
    pub certificate: Option<CertificateInfo>,
    pub identity_subject: String,
    pub bpk_hash: Option<String>,
    pub signed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_signer_has_unique_token() {
        let now = Utc::now();
        let request = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let a = Signer::new(request, tenant, "a@example.at", "A", 0, Duration::days(14), now);
        let b = Signer::new(request, tenant, "b@example.at", "B", 1, Duration::days(14), now);

        assert_eq!(a.token.len(), 64);
        assert_ne!(a.token, b.token);
        assert_eq!(a.token_expires_at, now + Duration::days(14));
    }

    #[test]
    fn test_token_validity() {
        let now = Utc::now();
        let mut signer = Signer::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "a@example.at",
            "A",
            0,
            Duration::days(14),
            now,
        );
        assert!(signer.token_valid_at(now));
        assert!(!signer.token_valid_at(now + Duration::days(14)));

        signer.token_used = true;
        assert!(!signer.token_valid_at(now));
    }

    #[test]
    fn test_token_not_serialized() {
        let signer = Signer::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "a@example.at",
            "A",
            0,
            Duration::days(14),
            Utc::now(),
        );
        let json = serde_json::to_value(&signer).unwrap();
        assert!(json.get("token").is_none());
    }
}
