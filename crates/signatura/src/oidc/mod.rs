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

//! OpenID Connect handshake support.
//!
//! This module provides:
//! - [`IdentityProvider`] trait and the [`OidcClient`] HTTP implementation
//! - State, nonce and PKCE S256 generation
//! - Callback validation, ID token nonce binding and error classification

mod client;
mod error;
mod pkce;

pub use client::{
    validate_callback, verify_id_token_nonce, CallbackParams, DiscoveryDocument, IdentityProvider,
    OidcClient, OidcConfig, TokenResponse, UserInfo, DEFAULT_SCOPES,
};
pub use error::{OidcError, NONCE_MISMATCH, STATE_MISMATCH};
pub use pkce::{
    code_challenge, generate_code_verifier, generate_nonce, generate_state, AuthorizationRequest,
};
