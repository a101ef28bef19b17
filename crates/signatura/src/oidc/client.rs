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

//! OpenID Connect client with discovery, PKCE and callback validation.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio::sync::OnceCell;
use url::Url;

use super::error::{OidcError, NONCE_MISMATCH, STATE_MISMATCH};
use super::pkce::{
    code_challenge, generate_code_verifier, generate_nonce, generate_state, AuthorizationRequest,
};

/// Scopes requested for signing handshakes.
pub const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "signature"];

/// Subset of the provider metadata document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Userinfo claims used by the signing flow.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    /// Sector-specific identifier. Hashed before anything is persisted.
    #[serde(default)]
    pub bpk: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
}

impl std::fmt::Debug for UserInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserInfo")
            .field("sub", &self.sub)
            .field("bpk", &self.bpk.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

/// Query parameters delivered to the redirect URI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn success(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            state: Some(state.into()),
            ..Default::default()
        }
    }
}

/// Checks a callback against the state we issued and returns the code.
pub fn validate_callback(params: &CallbackParams, expected_state: &str) -> Result<String, OidcError> {
    if let Some(code) = &params.error {
        return Err(OidcError::provider(
            code.clone(),
            params.error_description.clone().unwrap_or_default(),
        ));
    }

    let state = params.state.as_deref().unwrap_or("");
    if !bool::from(state.as_bytes().ct_eq(expected_state.as_bytes())) {
        return Err(OidcError::InvalidRequest(STATE_MISMATCH.to_string()));
    }

    match params.code.as_deref() {
        Some(code) if !code.is_empty() => Ok(code.to_string()),
        _ => Err(OidcError::InvalidRequest("missing authorization code".to_string())),
    }
}

/// Checks that the ID token was issued for the authorization request that
/// carried `expected_nonce`.
///
/// Only the payload is decoded; the token arrives over the back-channel
/// token request, so its signature is not checked here.
pub fn verify_id_token_nonce(id_token: Option<&str>, expected_nonce: &str) -> Result<(), OidcError> {
    let id_token = id_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OidcError::UnexpectedResponse("token response without id_token".into()))?;

    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| OidcError::UnexpectedResponse("id_token is not a JWT".into()))?;
    let payload = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| OidcError::UnexpectedResponse(format!("id_token payload: {e}")))?;
    let claims: serde_json::Value = serde_json::from_slice(&payload)
        .map_err(|e| OidcError::UnexpectedResponse(format!("id_token claims: {e}")))?;

    let nonce = claims.get("nonce").and_then(|n| n.as_str()).unwrap_or("");
    if nonce.is_empty() || !bool::from(nonce.as_bytes().ct_eq(expected_nonce.as_bytes())) {
        return Err(OidcError::InvalidRequest(NONCE_MISMATCH.to_string()));
    }
    Ok(())
}

/// Identity provider operations used by the signing handshake.
#[async_trait]
pub trait IdentityProvider: Send + Sync + std::fmt::Debug {
    /// Fresh state, nonce and PKCE verifier plus the URL to send the user to.
    async fn authorization_request(&self) -> Result<AuthorizationRequest, OidcError>;

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenResponse, OidcError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, OidcError>;

    async fn userinfo(&self, access_token: &str) -> Result<UserInfo, OidcError>;
}

#[derive(Debug, Clone)]
pub struct OidcConfig {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub timeout: Duration,
}

impl OidcConfig {
    pub fn new(
        issuer_url: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// HTTP client for an OpenID Connect provider.
///
/// The discovery document is fetched on first use and cached for the
/// lifetime of the client.
#[derive(Debug)]
pub struct OidcClient {
    config: OidcConfig,
    http: Client,
    discovery: OnceCell<DiscoveryDocument>,
}

impl OidcClient {
    pub fn new(config: OidcConfig) -> Result<Self, OidcError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            config,
            http,
            discovery: OnceCell::new(),
        })
    }

    /// Client with a known discovery document (no network fetch).
    pub fn with_discovery(config: OidcConfig, discovery: DiscoveryDocument) -> Result<Self, OidcError> {
        let client = Self::new(config)?;
        client
            .discovery
            .set(discovery)
            .map_err(|_| OidcError::Discovery("discovery already initialized".into()))?;
        Ok(client)
    }

    pub async fn discovery(&self) -> Result<&DiscoveryDocument, OidcError> {
        self.discovery
            .get_or_try_init(|| async {
                let url = format!(
                    "{}/.well-known/openid-configuration",
                    self.config.issuer_url.trim_end_matches('/')
                );
                tracing::debug!(url = %url, "fetching OIDC discovery document");

                let response = self.http.get(&url).send().await?;
                if !response.status().is_success() {
                    let status = response.status();
                    return Err(OidcError::Discovery(format!(
                        "discovery request failed with status {status}"
                    )));
                }
                let document: DiscoveryDocument = response.json().await?;
                Ok(document)
            })
            .await
    }

    /// Builds the authorization URL for the given parameters.
    pub fn build_authorization_url(
        &self,
        discovery: &DiscoveryDocument,
        state: &str,
        nonce: &str,
        code_verifier: &str,
    ) -> Result<String, OidcError> {
        let mut url = Url::parse(&discovery.authorization_endpoint)
            .map_err(|e| OidcError::Discovery(format!("invalid authorization endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("nonce", nonce)
            .append_pair("code_challenge", &code_challenge(code_verifier))
            .append_pair("code_challenge_method", "S256");
        Ok(url.to_string())
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, OidcError> {
        let discovery = self.discovery().await?;
        let mut params: Vec<(&str, &str)> = form.to_vec();
        params.push(("client_id", self.config.client_id.as_str()));
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http
            .post(&discovery.token_endpoint)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => OidcError::provider(body.error, body.error_description.unwrap_or_default()),
                Err(_) if status.is_server_error() => {
                    OidcError::provider("server_error", format!("token endpoint returned {status}"))
                }
                Err(_) => OidcError::UnexpectedResponse(format!(
                    "token request failed with status {status}"
                )),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl IdentityProvider for OidcClient {
    async fn authorization_request(&self) -> Result<AuthorizationRequest, OidcError> {
        let discovery = self.discovery().await?;
        let state = generate_state();
        let nonce = generate_nonce();
        let code_verifier = generate_code_verifier();
        let url = self.build_authorization_url(discovery, &state, &nonce, &code_verifier)?;
        Ok(AuthorizationRequest {
            url,
            state,
            nonce,
            code_verifier,
        })
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenResponse, OidcError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ])
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, OidcError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn userinfo(&self, access_token: &str) -> Result<UserInfo, OidcError> {
        let discovery = self.discovery().await?;
        let response = self
            .http
            .get(&discovery.userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(OidcError::UnexpectedResponse(format!(
                "userinfo request failed with status {status}"
            )));
        }

        let info: UserInfo = response.json().await?;
        if info.sub.is_empty() {
            return Err(OidcError::UnexpectedResponse("userinfo without sub claim".into()));
        }
        Ok(info)
    }
}
