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

//! Signature request orchestration.
//!
//! This module provides:
//! - [`SignatureOrchestrator`] for the request and signer lifecycles
//! - [`OidcHandshake`] for the persisted OIDC + PKCE handshake shared with batches
//! - Input and result types for orchestrator operations

mod handshake;
mod signature_orchestrator;
mod types;

pub use handshake::{OidcHandshake, VerifiedIdentity, DEFAULT_PENDING_TTL};
pub use signature_orchestrator::SignatureOrchestrator;
pub use types::{
    CreateSignatureRequest, FieldInput, RequestDetails, SignerInput, SigningInfo, SigningOutcome,
};
