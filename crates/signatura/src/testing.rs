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

//! In-process test doubles for the identity provider and mailer.
//!
//! Always compiled so downstream crates can drive the full signing flow
//! offline. [`MockIdentityProvider`] plays both the provider and the user's
//! browser: [`MockIdentityProvider::login`] stands in for the user
//! authenticating and returns the code the callback would carry.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use parking_lot::Mutex;
use serde_json::json;
use url::Url;

use crate::crypto::generate_url_safe_token;
use crate::external::{MailError, Mailer, SignatureCompleteEmail, SignatureRequestEmail};
use crate::oidc::{
    code_challenge, generate_code_verifier, generate_nonce, generate_state, AuthorizationRequest,
    IdentityProvider, OidcError, TokenResponse, UserInfo,
};

const AUTHORIZE_URL: &str = "https://idp.example.at/authorize";

#[derive(Debug, Default)]
struct ProviderState {
    /// state → (code challenge, nonce) issued with it.
    challenges: HashMap<String, (String, String)>,
    /// code → (challenge, nonce, user).
    codes: HashMap<String, (String, String, UserInfo)>,
    /// Nonce the next ID token carries instead of the issued one.
    nonce_override: Option<String>,
    /// access token → user.
    tokens: HashMap<String, UserInfo>,
    exchange_failures: VecDeque<OidcError>,
    exchanges: usize,
}

/// Scriptable identity provider.
#[derive(Debug, Clone, Default)]
pub struct MockIdentityProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticates `user` for the authorization request issued with
    /// `state` and returns the one-time code.
    pub fn login(&self, state: &str, user: UserInfo) -> Result<String, OidcError> {
        let mut inner = self.state.lock();
        let (challenge, nonce) = inner
            .challenges
            .remove(state)
            .ok_or_else(|| OidcError::InvalidRequest(format!("unknown state {state}")))?;
        let code = generate_url_safe_token(16);
        inner.codes.insert(code.clone(), (challenge, nonce, user));
        Ok(code)
    }

    /// Makes the next ID token carry `nonce` instead of the one sent with
    /// the authorization request.
    pub fn issue_next_id_token_with_nonce(&self, nonce: impl Into<String>) {
        self.state.lock().nonce_override = Some(nonce.into());
    }

    /// Makes the next code exchange fail with `error`.
    pub fn fail_next_exchange(&self, error: OidcError) {
        self.state.lock().exchange_failures.push_back(error);
    }

    pub fn exchange_count(&self) -> usize {
        self.state.lock().exchanges
    }

    /// Extracts the `state` parameter from an authorization URL.
    pub fn state_of(authorization_url: &str) -> Option<String> {
        Url::parse(authorization_url)
            .ok()?
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn authorization_request(&self) -> Result<AuthorizationRequest, OidcError> {
        let state = generate_state();
        let nonce = generate_nonce();
        let code_verifier = generate_code_verifier();
        let challenge = code_challenge(&code_verifier);

        let mut url = Url::parse(AUTHORIZE_URL)
            .map_err(|e| OidcError::Discovery(format!("invalid authorization endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("state", &state)
            .append_pair("nonce", &nonce)
            .append_pair("code_challenge", &challenge)
            .append_pair("code_challenge_method", "S256");

        self.state
            .lock()
            .challenges
            .insert(state.clone(), (challenge, nonce.clone()));
        Ok(AuthorizationRequest {
            url: url.to_string(),
            state,
            nonce,
            code_verifier,
        })
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenResponse, OidcError> {
        let mut inner = self.state.lock();
        inner.exchanges += 1;
        if let Some(error) = inner.exchange_failures.pop_front() {
            return Err(error);
        }

        let (challenge, nonce, user) = inner
            .codes
            .remove(code)
            .ok_or_else(|| OidcError::provider("invalid_grant", "unknown or used code"))?;
        if code_challenge(code_verifier) != challenge {
            return Err(OidcError::provider("invalid_grant", "PKCE verification failed"));
        }

        let nonce = inner.nonce_override.take().unwrap_or(nonce);
        let id_token = unsigned_id_token(&user.sub, &nonce);
        let access_token = generate_url_safe_token(24);
        inner.tokens.insert(access_token.clone(), user);
        Ok(TokenResponse {
            access_token,
            token_type: Some("Bearer".into()),
            expires_in: Some(300),
            refresh_token: None,
            id_token: Some(id_token),
            scope: Some("openid profile signature".into()),
        })
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse, OidcError> {
        Err(OidcError::provider("invalid_grant", "refresh not supported"))
    }

    async fn userinfo(&self, access_token: &str) -> Result<UserInfo, OidcError> {
        self.state
            .lock()
            .tokens
            .get(access_token)
            .cloned()
            .ok_or_else(|| OidcError::UnexpectedResponse("unknown access token".into()))
    }
}

/// `header.payload.` with `alg: none`.
fn unsigned_id_token(sub: &str, nonce: &str) -> String {
    format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(json!({ "alg": "none" }).to_string()),
        URL_SAFE_NO_PAD.encode(json!({ "sub": sub, "nonce": nonce }).to_string())
    )
}

#[derive(Debug, Default)]
struct Outbox {
    requests: Vec<SignatureRequestEmail>,
    reminders: Vec<(SignatureRequestEmail, i64)>,
    completions: Vec<SignatureCompleteEmail>,
    failing: bool,
}

/// Mailer that keeps every message in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    outbox: Arc<Mutex<Outbox>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every send fails after being recorded.
    pub fn fail_deliveries(&self, failing: bool) {
        self.outbox.lock().failing = failing;
    }

    pub fn requests(&self) -> Vec<SignatureRequestEmail> {
        self.outbox.lock().requests.clone()
    }

    /// `(recipient, days_left)` per reminder.
    pub fn reminders(&self) -> Vec<(String, i64)> {
        self.outbox
            .lock()
            .reminders
            .iter()
            .map(|(email, days)| (email.to.clone(), *days))
            .collect()
    }

    pub fn completions(&self) -> Vec<SignatureCompleteEmail> {
        self.outbox.lock().completions.clone()
    }

    fn outcome(failing: bool) -> Result<(), MailError> {
        if failing {
            Err(MailError::Delivery("recording mailer set to fail".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_signature_request(&self, email: &SignatureRequestEmail) -> Result<(), MailError> {
        let mut outbox = self.outbox.lock();
        outbox.requests.push(email.clone());
        Self::outcome(outbox.failing)
    }

    async fn send_signature_reminder(
        &self,
        email: &SignatureRequestEmail,
        days_left: i64,
    ) -> Result<(), MailError> {
        let mut outbox = self.outbox.lock();
        outbox.reminders.push((email.clone(), days_left));
        Self::outcome(outbox.failing)
    }

    async fn send_signature_complete(&self, email: &SignatureCompleteEmail) -> Result<(), MailError> {
        let mut outbox = self.outbox.lock();
        outbox.completions.push(email.clone());
        Self::outcome(outbox.failing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserInfo {
        UserInfo {
            sub: "sub-1".into(),
            bpk: Some("BPK-1".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_pkce_is_enforced() {
        let idp = MockIdentityProvider::new();
        let auth = idp.authorization_request().await.unwrap();
        assert_eq!(MockIdentityProvider::state_of(&auth.url).as_deref(), Some(auth.state.as_str()));

        let code = idp.login(&auth.state, user()).unwrap();
        let err = idp.exchange_code(&code, "wrong-verifier").await.unwrap_err();
        assert_eq!(err.code(), Some("invalid_grant"));
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let idp = MockIdentityProvider::new();
        let auth = idp.authorization_request().await.unwrap();
        let code = idp.login(&auth.state, user()).unwrap();

        let tokens = idp.exchange_code(&code, &auth.code_verifier).await.unwrap();
        assert_eq!(idp.userinfo(&tokens.access_token).await.unwrap().sub, "sub-1");
        crate::oidc::verify_id_token_nonce(tokens.id_token.as_deref(), &auth.nonce).unwrap();
        assert!(idp.exchange_code(&code, &auth.code_verifier).await.is_err());
        assert_eq!(idp.exchange_count(), 2);
    }

    #[tokio::test]
    async fn test_recording_mailer_can_fail() {
        let mailer = RecordingMailer::new();
        mailer.fail_deliveries(true);
        let email = SignatureCompleteEmail {
            to: "a@example.at".into(),
            name: "A".into(),
            document_title: "Doc".into(),
            signer_count: 1,
        };
        assert!(mailer.send_signature_complete(&email).await.is_err());
        assert_eq!(mailer.completions().len(), 1);
    }
}
