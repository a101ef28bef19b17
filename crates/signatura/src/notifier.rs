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

//! Signer notifications.
//!
//! The notifier owns the `pending → notified` transition. Email delivery is
//! best-effort: a failed send is logged and never undoes the transition.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::audit::AuditTrail;
use crate::dal::DAL;
use crate::error::{SignatureError, StorageError};
use crate::external::{Mailer, SignatureCompleteEmail, SignatureRequestEmail};
use crate::models::{
    NewSignatureAuditEvent, SignatureEventType, SignatureRequest, Signer, SignerStatus,
};

/// Sends invitations, reminders and completion notices.
#[derive(Debug, Clone)]
pub struct Notifier {
    dal: DAL,
    mailer: Arc<dyn Mailer>,
    trail: AuditTrail,
    portal_base_url: String,
}

impl Notifier {
    pub fn new(
        dal: DAL,
        mailer: Arc<dyn Mailer>,
        trail: AuditTrail,
        portal_base_url: impl Into<String>,
    ) -> Self {
        Self {
            dal,
            mailer,
            trail,
            portal_base_url: portal_base_url.into(),
        }
    }

    /// Link a signer follows to open their signing page.
    pub fn signing_url(&self, token: &str) -> String {
        format!("{}/sign/{}", self.portal_base_url.trim_end_matches('/'), token)
    }

    /// Signers of `request` that should hold an invitation right now.
    ///
    /// Parallel: every pending signer. Sequential: the lowest-order signer
    /// that has not signed, if still pending.
    pub async fn eligible_signers(
        &self,
        request: &SignatureRequest,
    ) -> Result<Vec<Signer>, StorageError> {
        let signers = self
            .dal
            .signer()
            .list_for_request(request.tenant_id, request.id)
            .await?;

        if !request.is_sequential {
            return Ok(signers
                .into_iter()
                .filter(|s| s.status == SignerStatus::Pending)
                .collect());
        }

        Ok(signers
            .into_iter()
            .find(|s| s.status != SignerStatus::Signed)
            .filter(|s| s.status == SignerStatus::Pending)
            .into_iter()
            .collect())
    }

    /// Notifies every currently eligible signer. Idempotent: signers already
    /// notified are skipped. Returns the signers notified by this call.
    pub async fn notify_eligible(
        &self,
        request: &SignatureRequest,
    ) -> Result<Vec<Signer>, SignatureError> {
        if !request.status.is_open() {
            return Ok(Vec::new());
        }

        let mut notified = Vec::new();
        for signer in self.eligible_signers(request).await? {
            let now = self.trail.now();
            let signer = match self
                .dal
                .signer()
                .mark_notified(request.tenant_id, signer.id, now)
                .await
            {
                Ok(signer) => signer,
                Err(StorageError::Conflict { .. }) => {
                    debug!(signer_id = %signer.id, "signer already notified");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            self.trail
                .record(
                    NewSignatureAuditEvent::new(request.tenant_id, SignatureEventType::SignerNotified)
                        .request(request.id)
                        .signer(signer.id)
                        .details(json!({ "order_index": signer.order_index })),
                )
                .await?;

            let email = self.request_email(request, &signer);
            if let Err(e) = self.mailer.send_signature_request(&email).await {
                warn!(
                    request_id = %request.id,
                    signer_id = %signer.id,
                    error = %e,
                    "failed to deliver signature request email"
                );
            }
            notified.push(signer);
        }
        Ok(notified)
    }

    /// Reminds a signer who was notified but has not started signing.
    pub async fn send_reminder(&self, tenant_id: Uuid, signer_id: Uuid) -> Result<Signer, SignatureError> {
        let signer = self.dal.signer().get(tenant_id, signer_id).await?;
        let request = self
            .dal
            .signature_request()
            .get(tenant_id, signer.request_id)
            .await?;
        if !request.status.is_open() {
            return Err(SignatureError::InvalidTransition(format!(
                "request {} is {}",
                request.id, request.status
            )));
        }

        let now = self.trail.now();
        let signer = self.dal.signer().record_reminder(tenant_id, signer_id, now).await?;
        let days_left = (request.expires_at - now).num_days().max(0);

        self.trail
            .record(
                NewSignatureAuditEvent::new(tenant_id, SignatureEventType::SignerReminded)
                    .request(request.id)
                    .signer(signer.id)
                    .details(json!({
                        "reminder_count": signer.reminder_count,
                        "days_left": days_left,
                    })),
            )
            .await?;

        let email = self.request_email(&request, &signer);
        if let Err(e) = self.mailer.send_signature_reminder(&email, days_left).await {
            warn!(
                request_id = %request.id,
                signer_id = %signer.id,
                error = %e,
                "failed to deliver signature reminder"
            );
        }
        Ok(signer)
    }

    /// Tells every signer that the request is complete.
    pub async fn notify_completed(&self, request: &SignatureRequest, signers: &[Signer]) {
        for signer in signers {
            let email = SignatureCompleteEmail {
                to: signer.email.clone(),
                name: signer.name.clone(),
                document_title: request.title().to_string(),
                signer_count: signers.len(),
            };
            if let Err(e) = self.mailer.send_signature_complete(&email).await {
                warn!(
                    request_id = %request.id,
                    signer_id = %signer.id,
                    error = %e,
                    "failed to deliver completion email"
                );
            }
        }
    }

    fn request_email(&self, request: &SignatureRequest, signer: &Signer) -> SignatureRequestEmail {
        SignatureRequestEmail {
            to: signer.email.clone(),
            name: signer.name.clone(),
            signing_url: self.signing_url(&signer.token),
            document_title: request.title().to_string(),
            message: request.message.clone(),
            expires_at: request.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::database::Database;
    use crate::testing::RecordingMailer;
    use chrono::Duration;

    struct Fixture {
        dal: DAL,
        clock: ManualClock,
        mailer: RecordingMailer,
        notifier: Notifier,
    }

    fn fixture() -> Fixture {
        let dal = DAL::new(Database::in_memory().unwrap());
        let clock = ManualClock::starting_now();
        let mailer = RecordingMailer::new();
        let trail = AuditTrail::new(dal.clone(), Arc::new(clock.clone()));
        let notifier = Notifier::new(
            dal.clone(),
            Arc::new(mailer.clone()),
            trail,
            "https://portal.example.at/",
        );
        Fixture {
            dal,
            clock,
            mailer,
            notifier,
        }
    }

    async fn seed(f: &Fixture, sequential: bool, signers: usize) -> (SignatureRequest, Vec<Signer>) {
        let now = f.clock.now();
        let tenant = Uuid::new_v4();
        let mut request = SignatureRequest::new(
            tenant,
            Uuid::new_v4(),
            Uuid::new_v4(),
            now + Duration::days(14),
            sequential,
            now,
        );
        request.name = Some("Lease".into());
        let signers: Vec<Signer> = (0..signers)
            .map(|i| {
                Signer::new(
                    request.id,
                    tenant,
                    format!("s{i}@example.at"),
                    format!("Signer {i}"),
                    i as i32,
                    Duration::days(14),
                    now,
                )
            })
            .collect();
        let request = f
            .dal
            .signature_request()
            .create(request, signers.clone(), vec![])
            .await
            .unwrap();
        (request, signers)
    }

    #[tokio::test]
    async fn test_parallel_notifies_everyone_once() {
        let f = fixture();
        let (request, _) = seed(&f, false, 3).await;

        let first = f.notifier.notify_eligible(&request).await.unwrap();
        assert_eq!(first.len(), 3);
        let second = f.notifier.notify_eligible(&request).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(f.mailer.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_sequential_notifies_only_first() {
        let f = fixture();
        let (request, signers) = seed(&f, true, 2).await;

        let notified = f.notifier.notify_eligible(&request).await.unwrap();
        assert_eq!(notified.len(), 1);
        assert_eq!(notified[0].id, signers[0].id);

        let sent = f.mailer.requests();
        assert_eq!(sent[0].to, "s0@example.at");
        assert_eq!(
            sent[0].signing_url,
            format!("https://portal.example.at/sign/{}", signers[0].token)
        );
    }

    #[tokio::test]
    async fn test_mail_failure_does_not_block_transition() {
        let f = fixture();
        f.mailer.fail_deliveries(true);
        let (request, signers) = seed(&f, false, 1).await;

        let notified = f.notifier.notify_eligible(&request).await.unwrap();
        assert_eq!(notified.len(), 1);
        let stored = f.dal.signer().get(request.tenant_id, signers[0].id).await.unwrap();
        assert_eq!(stored.status, SignerStatus::Notified);
    }

    #[tokio::test]
    async fn test_reminder_requires_notified() {
        let f = fixture();
        let (request, signers) = seed(&f, false, 1).await;

        let early = f.notifier.send_reminder(request.tenant_id, signers[0].id).await;
        assert!(matches!(early, Err(SignatureError::InvalidTransition(_))));

        f.notifier.notify_eligible(&request).await.unwrap();
        f.clock.advance(Duration::days(4));
        let reminded = f.notifier.send_reminder(request.tenant_id, signers[0].id).await.unwrap();
        assert_eq!(reminded.reminder_count, 1);
        assert_eq!(reminded.last_reminder_at, Some(f.clock.now()));
        assert_eq!(f.mailer.reminders(), vec![("s0@example.at".to_string(), 10)]);

        let events = f
            .dal
            .audit_event()
            .list_for_request(request.tenant_id, request.id)
            .await
            .unwrap();
        assert_eq!(events.last().unwrap().event_type, "signer_reminded");
    }
}
