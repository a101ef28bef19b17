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

//! Request context carried through tenant-scoped operations.
//!
//! A [`RequestContext`] is built by the transport layer for each inbound call.
//! Tenant-scoped reads must go through [`RequestContext::require_tenant`];
//! an absent tenant is a domain error, never a wildcard.

use uuid::Uuid;

use crate::error::StorageError;
use crate::models::ActorType;

/// Caller identity and connection metadata for a single operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Tenant the caller is authenticated against, if any.
    pub tenant_id: Option<Uuid>,
    /// Kind of actor performing the operation.
    pub actor_type: ActorType,
    /// Actor identifier (user id, signer id, or a system component name).
    pub actor_id: Option<String>,
    /// Raw client IP address; anonymized before any persistence.
    pub client_ip: Option<String>,
    /// Raw user agent; truncated before any persistence.
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Context for an authenticated tenant user.
    pub fn user(tenant_id: Uuid, user_id: Uuid) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            actor_type: ActorType::User,
            actor_id: Some(user_id.to_string()),
            client_ip: None,
            user_agent: None,
        }
    }

    /// Context for background components such as the expiry sweeper.
    pub fn system(component: &str) -> Self {
        Self {
            tenant_id: None,
            actor_type: ActorType::System,
            actor_id: Some(component.to_string()),
            client_ip: None,
            user_agent: None,
        }
    }

    /// Context with no tenant bound. Tenant-scoped reads fail closed on it.
    pub fn anonymous() -> Self {
        Self {
            tenant_id: None,
            actor_type: ActorType::User,
            actor_id: None,
            client_ip: None,
            user_agent: None,
        }
    }

    /// Attaches client connection metadata.
    pub fn with_client(mut self, ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Returns the bound tenant or [`StorageError::NoTenantContext`].
    pub fn require_tenant(&self) -> Result<Uuid, StorageError> {
        self.tenant_id.ok_or(StorageError::NoTenantContext)
    }

    /// Actor id used in audit rows.
    pub fn actor_label(&self) -> String {
        self.actor_id.clone().unwrap_or_else(|| "anonymous".to_string())
    }
}
