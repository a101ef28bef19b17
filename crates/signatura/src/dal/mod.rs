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

//! Data access layer.
//!
//! [`DAL`] hands out short-lived per-entity accessors (`dal.signer()`,
//! `dal.batch()`, ...). Every read carries a tenant predicate; state changes
//! are compare-and-set on the current status and fail with
//! [`StorageError::Conflict`](crate::error::StorageError::Conflict) when the
//! row is not in one of the expected states.

mod audit_event;
mod audit_log;
mod batch;
mod models;
mod oidc_session;
mod security_event;
mod signature_field;
mod signature_request;
mod signer;
mod two_factor;
mod usage;

pub use audit_event::SignatureAuditEventDAL;
pub use audit_log::AuditLogDAL;
pub use batch::{BatchDAL, UNPROCESSED_ITEM_ERROR};
pub use oidc_session::OidcSessionDAL;
pub use security_event::SecurityEventDAL;
pub use signature_field::SignatureFieldDAL;
pub use signature_request::SignatureRequestDAL;
pub use signer::SignerDAL;
pub use two_factor::TwoFactorDAL;
pub use usage::UsageDAL;

use crate::database::Database;

/// Entry point to all persisted entities.
#[derive(Clone, Debug)]
pub struct DAL {
    pub database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn signature_request(&self) -> SignatureRequestDAL<'_> {
        SignatureRequestDAL::new(self)
    }

    pub fn signer(&self) -> SignerDAL<'_> {
        SignerDAL::new(self)
    }

    pub fn signature_field(&self) -> SignatureFieldDAL<'_> {
        SignatureFieldDAL::new(self)
    }

    pub fn batch(&self) -> BatchDAL<'_> {
        BatchDAL::new(self)
    }

    pub fn audit_event(&self) -> SignatureAuditEventDAL<'_> {
        SignatureAuditEventDAL::new(self)
    }

    pub fn oidc_session(&self) -> OidcSessionDAL<'_> {
        OidcSessionDAL::new(self)
    }

    pub fn usage(&self) -> UsageDAL<'_> {
        UsageDAL::new(self)
    }

    pub fn audit_log(&self) -> AuditLogDAL<'_> {
        AuditLogDAL::new(self)
    }

    pub fn security_event(&self) -> SecurityEventDAL<'_> {
        SecurityEventDAL::new(self)
    }

    pub fn two_factor(&self) -> TwoFactorDAL<'_> {
        TwoFactorDAL::new(self)
    }
}
