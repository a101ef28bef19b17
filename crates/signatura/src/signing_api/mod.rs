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

//! Remote signing API integration.
//!
//! This module provides:
//! - [`SigningApi`] capability trait (sign, batch sign, timestamp, certificate info, health)
//! - [`HttpSigningApi`] production client and [`MockSigningApi`] offline double
//! - [`SigningApiError`] with retry classification and gateway status mapping
//! - [`RetryPolicy`] exponential backoff for retryable failures

mod api;
mod client;
mod error;
pub mod mock;
mod retry;
mod types;

pub use api::{sign_within, SigningApi};
pub use client::{HttpSigningApi, SigningApiConfig, DEFAULT_REQUEST_TIMEOUT};
pub use error::{ErrorCode, SigningApiError};
pub use mock::MockSigningApi;
pub use retry::RetryPolicy;
pub use types::{
    validate_sha256_hex, BatchSignDocument, BatchSignRequest, BatchSignResponse, BatchSignResult,
    CertificateDetails, HealthStatus, SignRequest, SignResponse, TimestampResponse,
    HASH_ALGORITHM_SHA256, MAX_BATCH_DOCUMENTS,
};
