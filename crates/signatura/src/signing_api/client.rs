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

//! HTTP client for the remote signing API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::api::SigningApi;
use super::error::{ErrorCode, SigningApiError};
use super::types::{
    validate_sha256_hex, BatchSignRequest, BatchSignResponse, CertificateDetails, ErrorBody,
    HealthStatus, SignRequest, SignResponse, TimestampResponse, HASH_ALGORITHM_SHA256,
    MAX_BATCH_DOCUMENTS,
};

/// Per-attempt timeout for signing calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct SigningApiConfig {
    /// Base URL, e.g. `"https://sign.example.at/api"`.
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for SigningApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningApiConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SigningApiConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpSigningApi {
    config: SigningApiConfig,
    http: Client,
}

impl HttpSigningApi {
    pub fn new(config: SigningApiConfig) -> Result<Self, SigningApiError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, SigningApiError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| SigningApiError::new(502, ErrorCode::SignatureFailed, format!("invalid response body: {e}")));
        }

        let text = response.text().await.unwrap_or_default();
        let error = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => {
                let error = SigningApiError::new(status.as_u16(), body.code, body.message);
                match body.details {
                    Some(details) => error.with_details(details),
                    None => error,
                }
            }
            Err(_) => SigningApiError::new(
                status.as_u16(),
                ErrorCode::from_status(status.as_u16()),
                format!("request failed with status {status}"),
            ),
        };
        Err(error)
    }
}

#[async_trait]
impl SigningApi for HttpSigningApi {
    async fn sign(&self, request: &SignRequest) -> Result<SignResponse, SigningApiError> {
        validate_sha256_hex(&request.hash)?;
        let response = self
            .http
            .post(self.url("/v1/sign"))
            .header("X-API-Key", &self.config.api_key)
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn batch_sign(&self, request: &BatchSignRequest) -> Result<BatchSignResponse, SigningApiError> {
        if request.documents.len() > MAX_BATCH_DOCUMENTS {
            return Err(SigningApiError::new(
                400,
                ErrorCode::BatchTooLarge,
                format!("at most {MAX_BATCH_DOCUMENTS} documents per batch"),
            ));
        }
        for document in &request.documents {
            validate_sha256_hex(&document.hash)?;
        }
        let response = self
            .http
            .post(self.url("/v1/sign/batch"))
            .header("X-API-Key", &self.config.api_key)
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn get_timestamp(&self, hash: &str) -> Result<TimestampResponse, SigningApiError> {
        validate_sha256_hex(hash)?;
        let response = self
            .http
            .post(self.url("/v1/timestamp"))
            .header("X-API-Key", &self.config.api_key)
            .json(&json!({ "hash": hash, "hash_algorithm": HASH_ALGORITHM_SHA256 }))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn get_certificate_info(&self, certificate_id: &str) -> Result<CertificateDetails, SigningApiError> {
        let mut url = url::Url::parse(&self.url("/v1/certificates/"))
            .map_err(|e| SigningApiError::transport(format!("invalid base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SigningApiError::transport("base url cannot carry a path"))?
            .pop_if_empty()
            .push(certificate_id);

        let response = self
            .http
            .get(url)
            .header("X-API-Key", &self.config.api_key)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn health_check(&self) -> Result<HealthStatus, SigningApiError> {
        let response = self.http.get(self.url("/v1/health")).send().await?;
        Self::decode(response).await
    }
}
