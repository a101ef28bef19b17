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

//! Outbound email interface.
//!
//! Delivery is always best-effort from the caller's point of view: a failed
//! send is logged and never rolls back a state transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// Invitation or reminder to sign.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureRequestEmail {
    pub to: String,
    pub name: String,
    pub signing_url: String,
    pub document_title: String,
    pub message: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Notice that every signer has signed.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureCompleteEmail {
    pub to: String,
    pub name: String,
    pub document_title: String,
    pub signer_count: usize,
}

#[async_trait]
pub trait Mailer: Send + Sync + std::fmt::Debug {
    async fn send_signature_request(&self, email: &SignatureRequestEmail) -> Result<(), MailError>;

    async fn send_signature_reminder(
        &self,
        email: &SignatureRequestEmail,
        days_left: i64,
    ) -> Result<(), MailError>;

    async fn send_signature_complete(&self, email: &SignatureCompleteEmail) -> Result<(), MailError>;
}

/// Mailer that only logs. Recipient addresses are reduced to their domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMailer;

fn recipient_domain(address: &str) -> &str {
    address.rsplit_once('@').map_or("unknown", |(_, domain)| domain)
}

#[async_trait]
impl Mailer for LoggingMailer {
    async fn send_signature_request(&self, email: &SignatureRequestEmail) -> Result<(), MailError> {
        tracing::info!(
            recipient_domain = recipient_domain(&email.to),
            document_title = %email.document_title,
            expires_at = %email.expires_at,
            "signature request email"
        );
        Ok(())
    }

    async fn send_signature_reminder(
        &self,
        email: &SignatureRequestEmail,
        days_left: i64,
    ) -> Result<(), MailError> {
        tracing::info!(
            recipient_domain = recipient_domain(&email.to),
            document_title = %email.document_title,
            days_left,
            "signature reminder email"
        );
        Ok(())
    }

    async fn send_signature_complete(&self, email: &SignatureCompleteEmail) -> Result<(), MailError> {
        tracing::info!(
            recipient_domain = recipient_domain(&email.to),
            document_title = %email.document_title,
            signer_count = email.signer_count,
            "signature complete email"
        );
        Ok(())
    }
}
