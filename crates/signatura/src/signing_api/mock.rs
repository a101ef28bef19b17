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

//! Deterministic in-process signing API.
//!
//! Signs any well-formed hash, and can be told to fail specific hashes, fail
//! the next N calls, or hold each call for a while so concurrency can be
//! observed.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::api::SigningApi;
use super::error::SigningApiError;
use super::types::{
    validate_sha256_hex, BatchSignRequest, BatchSignResponse, BatchSignResult, CertificateDetails,
    HealthStatus, SignRequest, SignResponse, TimestampResponse,
};

#[derive(Debug, Default)]
struct MockState {
    failing_hashes: Mutex<HashMap<String, SigningApiError>>,
    queued_failures: Mutex<VecDeque<SigningApiError>>,
    delay: Mutex<Duration>,
    calls: Mutex<Vec<SignRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct MockSigningApi {
    state: Arc<MockState>,
}

/// Decrements the in-flight counter when a call ends, however it ends.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockSigningApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `sign` of `hash` fails with `error`.
    pub fn fail_hash(&self, hash: impl Into<String>, error: SigningApiError) {
        self.state.failing_hashes.lock().insert(hash.into(), error);
    }

    /// The next `sign` call fails with `error`. Calls queue up.
    pub fn fail_next(&self, error: SigningApiError) {
        self.state.queued_failures.lock().push_back(error);
    }

    /// Holds every `sign` call for `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock() = delay;
    }

    /// Most `sign` calls observed running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn sign_calls(&self) -> Vec<SignRequest> {
        self.state.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().len()
    }

    fn signature_for(hash: &str, signer_cert_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"mock-signature:");
        hasher.update(hash.as_bytes());
        hasher.update(signer_cert_id.as_bytes());
        BASE64.encode(hasher.finalize())
    }

    fn certificate_for(signer_cert_id: &str) -> String {
        BASE64.encode(format!("mock-certificate:{signer_cert_id}"))
    }
}

#[async_trait]
impl SigningApi for MockSigningApi {
    async fn sign(&self, request: &SignRequest) -> Result<SignResponse, SigningApiError> {
        self.state.calls.lock().push(request.clone());

        let current = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.state.in_flight);
        self.state.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.state.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.state.queued_failures.lock().pop_front() {
            return Err(error);
        }
        validate_sha256_hex(&request.hash)?;
        if let Some(error) = self.state.failing_hashes.lock().get(&request.hash) {
            return Err(error.clone());
        }

        Ok(SignResponse {
            signature_value: Self::signature_for(&request.hash, &request.signer_cert_id),
            signed_at: Utc::now(),
            certificate: Self::certificate_for(&request.signer_cert_id),
            certificate_chain: vec![BASE64.encode("mock-ca")],
            timestamp_token: Some(BASE64.encode(format!("tst:{}", request.hash))),
            tsa_name: Some("Mock TSA".to_string()),
        })
    }

    async fn batch_sign(&self, request: &BatchSignRequest) -> Result<BatchSignResponse, SigningApiError> {
        let mut results = Vec::with_capacity(request.documents.len());
        for document in &request.documents {
            let single = SignRequest::sha256(document.hash.clone(), request.signer_cert_id.clone());
            results.push(match self.sign(&single).await {
                Ok(response) => BatchSignResult {
                    document_id: document.document_id.clone(),
                    success: true,
                    signature_value: Some(response.signature_value),
                    error_code: None,
                    error_message: None,
                },
                Err(e) => BatchSignResult {
                    document_id: document.document_id.clone(),
                    success: false,
                    signature_value: None,
                    error_code: Some(e.code),
                    error_message: Some(e.message),
                },
            });
        }
        Ok(BatchSignResponse {
            results,
            signed_at: Utc::now(),
            certificate: Some(Self::certificate_for(&request.signer_cert_id)),
        })
    }

    async fn get_timestamp(&self, hash: &str) -> Result<TimestampResponse, SigningApiError> {
        validate_sha256_hex(hash)?;
        Ok(TimestampResponse {
            token: BASE64.encode(format!("tst:{hash}")),
            time: Utc::now(),
            authority: "Mock TSA".to_string(),
            serial_number: hash[..16].to_string(),
        })
    }

    async fn get_certificate_info(&self, certificate_id: &str) -> Result<CertificateDetails, SigningApiError> {
        let now = Utc::now();
        Ok(CertificateDetails {
            certificate_id: certificate_id.to_string(),
            subject: format!("CN={certificate_id}"),
            serial_number: hex::encode(&Sha256::digest(certificate_id.as_bytes())[..8]),
            issuer: "CN=Mock Qualified CA".to_string(),
            valid_from: now - chrono::Duration::days(30),
            valid_until: now + chrono::Duration::days(335),
            revoked: false,
        })
    }

    async fn health_check(&self) -> Result<HealthStatus, SigningApiError> {
        Ok(HealthStatus {
            healthy: true,
            version: Some("mock".to_string()),
        })
    }
}
