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

//! State, nonce and PKCE (RFC 7636, S256) generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::crypto::generate_url_safe_token;

/// Random bytes behind `state` and `nonce` (256 bits).
pub const STATE_BYTES: usize = 32;

/// PKCE verifier length in characters.
pub const VERIFIER_LEN: usize = 64;

const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

pub fn generate_state() -> String {
    generate_url_safe_token(STATE_BYTES)
}

pub fn generate_nonce() -> String {
    generate_url_safe_token(STATE_BYTES)
}

/// 64 characters from the RFC 3986 unreserved set.
pub fn generate_code_verifier() -> String {
    let mut rng = rand::thread_rng();
    (0..VERIFIER_LEN)
        .map(|_| char::from(UNRESERVED[rng.gen_range(0..UNRESERVED.len())]))
        .collect()
}

/// `base64url(SHA256(verifier))` without padding.
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Parameters of one authorization round trip.
#[derive(Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
}

impl std::fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_challenge() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_generated_shapes() {
        let verifier = generate_code_verifier();
        assert_eq!(verifier.len(), VERIFIER_LEN);
        assert!(verifier.bytes().all(|b| UNRESERVED.contains(&b)));

        // 32 bytes -> 43 base64url characters
        let state = generate_state();
        assert_eq!(state.len(), 43);
        assert_ne!(state, generate_state());
        assert_eq!(generate_nonce().len(), 43);
    }
}
