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

//! Request and response bodies of the remote signing API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{ErrorCode, SigningApiError};

/// The only hash algorithm the orchestration core uses.
pub const HASH_ALGORITHM_SHA256: &str = "SHA256";

/// Documents accepted by one batch call.
pub const MAX_BATCH_DOCUMENTS: usize = 100;

/// Checks that `hash` is a hex-encoded SHA-256 digest.
pub fn validate_sha256_hex(hash: &str) -> Result<(), SigningApiError> {
    if hash.len() == 64 && hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(SigningApiError::new(
            400,
            ErrorCode::InvalidHash,
            "hash must be 64 hex characters",
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignRequest {
    pub hash: String,
    pub hash_algorithm: String,
    pub signer_cert_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_info: Option<String>,
}

impl SignRequest {
    pub fn sha256(hash: impl Into<String>, signer_cert_id: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            hash_algorithm: HASH_ALGORITHM_SHA256.to_string(),
            signer_cert_id: signer_cert_id.into(),
            reason: None,
            location: None,
            contact_info: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignResponse {
    /// Base64 signature value.
    pub signature_value: String,
    pub signed_at: DateTime<Utc>,
    /// Base64 DER signer certificate.
    pub certificate: String,
    #[serde(default)]
    pub certificate_chain: Vec<String>,
    #[serde(default)]
    pub timestamp_token: Option<String>,
    #[serde(default)]
    pub tsa_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSignDocument {
    pub document_id: String,
    pub hash: String,
    pub hash_algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSignRequest {
    pub signer_cert_id: String,
    pub documents: Vec<BatchSignDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSignResult {
    pub document_id: String,
    pub success: bool,
    #[serde(default)]
    pub signature_value: Option<String>,
    #[serde(default)]
    pub error_code: Option<ErrorCode>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSignResponse {
    pub results: Vec<BatchSignResult>,
    pub signed_at: DateTime<Utc>,
    #[serde(default)]
    pub certificate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampResponse {
    pub token: String,
    pub time: DateTime<Utc>,
    pub authority: String,
    pub serial_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateDetails {
    pub certificate_id: String,
    pub subject: String,
    pub serial_number: String,
    pub issuer: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default)]
    pub revoked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    #[serde(default)]
    pub version: Option<String>,
}

/// Error body returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_validation() {
        let digest = "a".repeat(64);
        assert!(validate_sha256_hex(&digest).is_ok());
        let err = validate_sha256_hex("abc").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidHash);
        assert!(validate_sha256_hex(&"g".repeat(64)).is_err());
    }

    #[test]
    fn test_sign_request_omits_empty_options() {
        let body = serde_json::to_value(SignRequest::sha256("ab", "cert-1")).unwrap();
        assert_eq!(body["hash_algorithm"], "SHA256");
        assert!(body.get("reason").is_none());
    }
}
