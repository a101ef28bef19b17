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

//! Error types for signature orchestration.
//!
//! Each subsystem owns a focused error enum; [`SignatureError`] unifies them at
//! the orchestration boundary and classifies them into the taxonomy the
//! transport layer maps onto status codes. Internal and cryptographic failures
//! never surface their details through [`SignatureError::public_message`].

use thiserror::Error;
use uuid::Uuid;

use crate::crypto::CryptoError;
use crate::external::DocumentStoreError;
use crate::oidc::OidcError;
use crate::security::{RateLimitError, TwoFactorError};
use crate::signing_api::SigningApiError;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("unique constraint violated: {0}")]
    UniqueViolation(&'static str),

    #[error("no tenant context")]
    NoTenantContext,

    #[error("{entity} {id} is in state '{found}', which does not permit this change")]
    Conflict {
        entity: &'static str,
        id: Uuid,
        found: String,
    },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("connection pool error: {0}")]
    ConnectionPool(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("database error: {0}")]
    Database(diesel::result::Error),
}

impl From<diesel::result::Error> for StorageError {
    fn from(error: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match error {
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::UniqueViolation(crate::database::unique_constraint(info.message()))
            }
            other => Self::Database(other),
        }
    }
}

impl StorageError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Coarse error classes used by handlers to choose a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or incomplete input.
    Validation,
    /// Missing tenant, bad token, state mismatch and similar.
    Authorization,
    /// The addressed entity does not exist for this tenant.
    NotFound,
    /// The entity is not in a state that allows the operation.
    State,
    /// A remote dependency rejected or failed the call.
    External,
    /// Key material or ciphertext problems.
    Cryptographic,
    /// Too many attempts.
    RateLimited,
    /// Anything else.
    Internal,
}

/// Unified error for orchestrator, batch and service operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no tenant context")]
    NoTenantContext,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid or expired signing token")]
    InvalidToken,

    #[error("invalid session")]
    InvalidSession,

    #[error("waiting for previous signer")]
    WaitingForPreviousSigner,

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error(transparent)]
    Oidc(#[from] OidcError),

    #[error(transparent)]
    SigningApi(#[from] SigningApiError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    TwoFactor(#[from] TwoFactorError),

    #[error(transparent)]
    Document(#[from] DocumentStoreError),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for SignatureError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound { entity, id } => Self::NotFound(format!("{entity} {id}")),
            StorageError::NoTenantContext => Self::NoTenantContext,
            StorageError::Conflict { entity, id, found } => {
                Self::InvalidTransition(format!("{entity} {id} is {found}"))
            }
            other => Self::Storage(other),
        }
    }
}

impl From<RateLimitError> for SignatureError {
    fn from(error: RateLimitError) -> Self {
        match error {
            RateLimitError::Exceeded { retry_after_secs } => Self::RateLimited { retry_after_secs },
            RateLimitError::Unavailable(reason) => {
                Self::Internal(format!("rate limiter unavailable: {reason}"))
            }
        }
    }
}

impl SignatureError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NoTenantContext | Self::InvalidToken | Self::InvalidSession => {
                ErrorKind::Authorization
            }
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::WaitingForPreviousSigner | Self::InvalidTransition(_) => ErrorKind::State,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Oidc(e) => {
                if e.is_state_mismatch() || e.is_user_action_required() {
                    ErrorKind::Authorization
                } else {
                    ErrorKind::External
                }
            }
            Self::SigningApi(_) | Self::Document(_) => ErrorKind::External,
            Self::Crypto(_) => ErrorKind::Cryptographic,
            Self::TwoFactor(e) => e.kind(),
            Self::Storage(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP-style status code for the error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoTenantContext => 403,
            Self::SigningApi(e) => e.gateway_status(),
            _ => match self.kind() {
                ErrorKind::Validation => 400,
                ErrorKind::Authorization => 401,
                ErrorKind::NotFound => 404,
                ErrorKind::State => 409,
                ErrorKind::External => 502,
                ErrorKind::RateLimited => 429,
                ErrorKind::Cryptographic | ErrorKind::Internal => 500,
            },
        }
    }

    /// Message safe to return to callers.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Cryptographic | ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Seconds a client should wait before retrying, for rate-limit errors.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            Self::TwoFactor(TwoFactorError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            _ => None,
        }
    }
}
