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

//! OIDC error type and classification.

use thiserror::Error;

/// Message carried by [`OidcError::InvalidRequest`] when the callback state
/// does not match the session.
pub const STATE_MISMATCH: &str = "state mismatch";

/// Message carried by [`OidcError::InvalidRequest`] when the ID token's
/// `nonce` claim does not match the session.
pub const NONCE_MISMATCH: &str = "nonce mismatch";

const RETRYABLE_CODES: &[&str] = &["server_error", "temporarily_unavailable"];

const USER_ACTION_CODES: &[&str] = &[
    "access_denied",
    "login_required",
    "consent_required",
    "interaction_required",
];

#[derive(Debug, Error)]
pub enum OidcError {
    /// The provider returned an OAuth error (`error` / `error_description`).
    #[error("identity provider error {code}: {description}")]
    Provider { code: String, description: String },

    /// The callback or a request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error("unexpected response from identity provider: {0}")]
    UnexpectedResponse(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl OidcError {
    pub fn provider(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Provider {
            code: code.into(),
            description: description.into(),
        }
    }

    /// OAuth error code, when the provider sent one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Provider { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Transient provider or transport failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { code, .. } => RETRYABLE_CODES.contains(&code.as_str()),
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// The user has to do something (log in, consent) before retrying.
    pub fn is_user_action_required(&self) -> bool {
        self.code().is_some_and(|code| USER_ACTION_CODES.contains(&code))
    }

    pub fn is_state_mismatch(&self) -> bool {
        matches!(self, Self::InvalidRequest(msg) if msg == STATE_MISMATCH)
    }

    pub fn is_nonce_mismatch(&self) -> bool {
        matches!(self, Self::InvalidRequest(msg) if msg == NONCE_MISMATCH)
    }
}
