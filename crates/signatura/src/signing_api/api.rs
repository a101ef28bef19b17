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

//! Signing API capability set.

use async_trait::async_trait;

use super::error::SigningApiError;
use super::types::{
    BatchSignRequest, BatchSignResponse, CertificateDetails, HealthStatus, SignRequest,
    SignResponse, TimestampResponse,
};

/// Operations offered by a remote qualified-signature service.
///
/// Implemented by [`HttpSigningApi`](super::HttpSigningApi) for production and
/// [`MockSigningApi`](super::MockSigningApi) for offline tests.
#[async_trait]
pub trait SigningApi: Send + Sync + std::fmt::Debug {
    async fn sign(&self, request: &SignRequest) -> Result<SignResponse, SigningApiError>;

    async fn batch_sign(&self, request: &BatchSignRequest) -> Result<BatchSignResponse, SigningApiError>;

    async fn get_timestamp(&self, hash: &str) -> Result<TimestampResponse, SigningApiError>;

    async fn get_certificate_info(&self, certificate_id: &str) -> Result<CertificateDetails, SigningApiError>;

    async fn health_check(&self) -> Result<HealthStatus, SigningApiError>;
}

/// Calls `sign`, failing with a retryable transport error when `timeout`
/// elapses first.
pub async fn sign_within(
    api: &dyn SigningApi,
    request: &SignRequest,
    timeout: std::time::Duration,
) -> Result<SignResponse, SigningApiError> {
    match tokio::time::timeout(timeout, api.sign(request)).await {
        Ok(result) => result,
        Err(_) => Err(SigningApiError::transport(format!(
            "signing request timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256_hex;
    use crate::signing_api::MockSigningApi;
    use std::time::Duration;

    #[tokio::test]
    async fn test_timeout_is_retryable() {
        let api = MockSigningApi::new();
        api.set_delay(Duration::from_millis(200));
        let request = SignRequest::sha256(sha256_hex(b"doc"), "sub");

        let err = sign_within(&api, &request, Duration::from_millis(10)).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.status_code, 503);
    }
}
