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

//! Remote signing API errors.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes reported by the signing API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidHash,
    InvalidCertificate,
    CertificateExpired,
    CertificateRevoked,
    SignatureFailed,
    TimestampFailed,
    ServiceUnavailable,
    RateLimited,
    Unauthorized,
    BatchTooLarge,
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::InvalidHash => "INVALID_HASH",
            ErrorCode::InvalidCertificate => "INVALID_CERTIFICATE",
            ErrorCode::CertificateExpired => "CERTIFICATE_EXPIRED",
            ErrorCode::CertificateRevoked => "CERTIFICATE_REVOKED",
            ErrorCode::SignatureFailed => "SIGNATURE_FAILED",
            ErrorCode::TimestampFailed => "TIMESTAMP_FAILED",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::BatchTooLarge => "BATCH_TOO_LARGE",
            ErrorCode::Other(code) => code,
        }
    }

    /// Best-guess code for an error response without a usable body.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorCode::Unauthorized,
            413 => ErrorCode::BatchTooLarge,
            429 => ErrorCode::RateLimited,
            503 | 504 => ErrorCode::ServiceUnavailable,
            _ => ErrorCode::SignatureFailed,
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "INVALID_HASH" => ErrorCode::InvalidHash,
            "INVALID_CERTIFICATE" => ErrorCode::InvalidCertificate,
            "CERTIFICATE_EXPIRED" => ErrorCode::CertificateExpired,
            "CERTIFICATE_REVOKED" => ErrorCode::CertificateRevoked,
            "SIGNATURE_FAILED" => ErrorCode::SignatureFailed,
            "TIMESTAMP_FAILED" => ErrorCode::TimestampFailed,
            "SERVICE_UNAVAILABLE" => ErrorCode::ServiceUnavailable,
            "RATE_LIMITED" => ErrorCode::RateLimited,
            "UNAUTHORIZED" => ErrorCode::Unauthorized,
            "BATCH_TOO_LARGE" => ErrorCode::BatchTooLarge,
            other => ErrorCode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(ErrorCode::from(code.as_str()))
    }
}

/// Error returned by the signing API or raised while talking to it.
#[derive(Debug, Clone, Error)]
#[error("signing API error {status_code} {code}: {message}")]
pub struct SigningApiError {
    pub status_code: u16,
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl SigningApiError {
    pub fn new(status_code: u16, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status_code,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Transport failure (connect, timeout, unreadable body).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(503, ErrorCode::ServiceUnavailable, message)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.code, ErrorCode::ServiceUnavailable | ErrorCode::RateLimited)
            || self.status_code >= 500
    }

    /// Status a gateway should answer with: 422 when the input or the
    /// signer's certificate is at fault, 502 otherwise.
    pub fn gateway_status(&self) -> u16 {
        match self.code {
            ErrorCode::InvalidHash
            | ErrorCode::InvalidCertificate
            | ErrorCode::CertificateExpired
            | ErrorCode::CertificateRevoked => 422,
            _ => 502,
        }
    }
}

impl From<reqwest::Error> for SigningApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::new(504, ErrorCode::ServiceUnavailable, format!("request timed out: {error}"));
        }
        Self::transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(SigningApiError::new(503, ErrorCode::ServiceUnavailable, "").is_retryable());
        assert!(SigningApiError::new(429, ErrorCode::RateLimited, "").is_retryable());
        assert!(SigningApiError::new(500, ErrorCode::SignatureFailed, "").is_retryable());
        assert!(!SigningApiError::new(400, ErrorCode::InvalidHash, "").is_retryable());
        assert!(!SigningApiError::new(401, ErrorCode::Unauthorized, "").is_retryable());
    }

    #[test]
    fn test_code_strings() {
        let parsed: ErrorCode = serde_json::from_str("\"CERTIFICATE_REVOKED\"").unwrap();
        assert_eq!(parsed, ErrorCode::CertificateRevoked);
        let unknown: ErrorCode = serde_json::from_str("\"QUOTA\"").unwrap();
        assert_eq!(unknown, ErrorCode::Other("QUOTA".into()));
        assert_eq!(serde_json::to_string(&ErrorCode::BatchTooLarge).unwrap(), "\"BATCH_TOO_LARGE\"");
    }

    #[test]
    fn test_message_carries_code() {
        let error = SigningApiError::new(400, ErrorCode::InvalidHash, "hash must be hex");
        assert!(error.to_string().contains("INVALID_HASH"));
        assert_eq!(error.gateway_status(), 422);
    }
}
