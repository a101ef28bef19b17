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

//! OIDC handshake sessions.
//!
//! A handshake is persisted as an [`OidcSession`] keyed by the OAuth `state`.
//! The callback claims the row (`pending → authenticated`, once, within the
//! pending TTL), exchanges the code with the stored PKCE verifier, checks the
//! ID token's nonce against the session and records the identity. The BPK is hashed before it is written anywhere.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::{to_chrono, SharedClock};
use crate::crypto::hash_bpk;
use crate::dal::DAL;
use crate::error::{SignatureError, StorageError};
use crate::models::{OidcSession, SessionBinding, SessionStatus};
use crate::oidc::{
    validate_callback, verify_id_token_nonce, CallbackParams, IdentityProvider, OidcError,
};

/// Default lifetime of an unanswered handshake.
pub const DEFAULT_PENDING_TTL: std::time::Duration = std::time::Duration::from_secs(10 * 60);

/// Identity established by a completed handshake.
#[derive(Clone)]
pub struct VerifiedIdentity {
    /// Provider subject; used as the signing certificate id.
    pub subject: String,
    pub bpk_hash: Option<String>,
    pub display_name: Option<String>,
}

impl std::fmt::Debug for VerifiedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedIdentity")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct OidcHandshake {
    dal: DAL,
    provider: Arc<dyn IdentityProvider>,
    clock: SharedClock,
    pending_ttl: Duration,
}

impl OidcHandshake {
    pub fn new(dal: DAL, provider: Arc<dyn IdentityProvider>, clock: SharedClock) -> Self {
        Self {
            dal,
            provider,
            clock,
            pending_ttl: to_chrono(DEFAULT_PENDING_TTL),
        }
    }

    pub fn with_pending_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.pending_ttl = to_chrono(ttl);
        self
    }

    /// Persists a new session bound to `binding` and returns the URL to send
    /// the user to.
    pub async fn open(
        &self,
        tenant_id: Uuid,
        binding: SessionBinding,
        redirect_after: Option<String>,
    ) -> Result<String, SignatureError> {
        let auth = self.provider.authorization_request().await?;
        let session = OidcSession::new(
            tenant_id,
            binding,
            auth.state.clone(),
            auth.nonce.clone(),
            auth.code_verifier.clone(),
            redirect_after,
            self.clock.now(),
        );
        let session = self.dal.oidc_session().create(session).await?;
        debug!(session_id = %session.id, binding = ?session.binding, "opened OIDC handshake");
        Ok(auth.url)
    }

    /// Claims the session named by the callback's `state`.
    ///
    /// Unknown, already claimed and expired sessions are all
    /// [`SignatureError::InvalidSession`].
    pub async fn claim(&self, params: &CallbackParams) -> Result<OidcSession, SignatureError> {
        let state = params
            .state
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(SignatureError::InvalidSession)?;

        let session = match self
            .dal
            .oidc_session()
            .claim(state, self.pending_ttl, self.clock.now())
            .await
        {
            Ok(session) => session,
            Err(StorageError::NotFound { .. } | StorageError::Conflict { .. }) => {
                return Err(SignatureError::InvalidSession)
            }
            Err(e) => return Err(e.into()),
        };

        if session.status == SessionStatus::Expired {
            debug!(session_id = %session.id, "OIDC session expired before callback");
            return Err(SignatureError::InvalidSession);
        }
        Ok(session)
    }

    /// Validates the callback, exchanges the code and records the identity
    /// on the session.
    pub async fn authenticate(
        &self,
        session: &OidcSession,
        params: &CallbackParams,
    ) -> Result<VerifiedIdentity, SignatureError> {
        let code = validate_callback(params, &session.state)?;
        let tokens = self
            .provider
            .exchange_code(&code, &session.code_verifier)
            .await?;
        if let Err(e) = verify_id_token_nonce(tokens.id_token.as_deref(), &session.nonce) {
            warn!(session_id = %session.id, error = %e, "ID token rejected");
            return Err(e.into());
        }
        let info = self.provider.userinfo(&tokens.access_token).await?;
        if info.sub.is_empty() {
            return Err(OidcError::UnexpectedResponse("userinfo without sub claim".into()).into());
        }

        let identity = VerifiedIdentity {
            bpk_hash: info.bpk.as_deref().map(hash_bpk),
            display_name: info.name.clone(),
            subject: info.sub,
        };
        self.dal
            .oidc_session()
            .record_identity(
                session.id,
                identity.subject.clone(),
                identity.bpk_hash.clone(),
                self.clock.now(),
            )
            .await?;
        Ok(identity)
    }

    /// Marks the session used once its flow has ended, successfully or not.
    pub async fn finish(&self, session: &OidcSession) {
        if let Err(e) = self
            .dal
            .oidc_session()
            .mark_used(session.id, self.clock.now())
            .await
        {
            warn!(session_id = %session.id, error = %e, "failed to mark OIDC session used");
        }
    }
}
