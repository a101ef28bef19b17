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

//! Shared harness: a fully wired service over mocks and a manual clock.

use std::sync::Arc;
use std::time::Duration;

use signatura::clock::ManualClock;
use signatura::config::SignatureConfig;
use signatura::crypto::KeyHierarchy;
use signatura::dal::DAL;
use signatura::database::Database;
use signatura::external::{MemoryCache, MemoryDocumentStore};
use signatura::models::Signer;
use signatura::oidc::{CallbackParams, UserInfo};
use signatura::orchestrator::{CreateSignatureRequest, SignerInput};
use signatura::signing_api::{MockSigningApi, RetryPolicy};
use signatura::testing::{MockIdentityProvider, RecordingMailer};
use signatura::{CallbackOutcome, Collaborators, RequestContext, SignatureError, SignatureService};
use uuid::Uuid;

pub struct Harness {
    pub service: SignatureService,
    pub dal: DAL,
    pub clock: ManualClock,
    pub api: MockSigningApi,
    pub idp: MockIdentityProvider,
    pub docs: MemoryDocumentStore,
    pub mailer: RecordingMailer,
    pub tenant_id: Uuid,
    pub ctx: RequestContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(
            SignatureConfig::builder()
                .signing_retry(RetryPolicy::new(3, Duration::from_millis(1), 2))
                .signature_cost_cents(Some(150))
                .build()
                .unwrap(),
        )
    }

    pub fn with_config(config: SignatureConfig) -> Self {
        let dal = DAL::new(Database::in_memory().unwrap());
        let clock = ManualClock::starting_now();
        let api = MockSigningApi::new();
        let idp = MockIdentityProvider::new();
        let docs = MemoryDocumentStore::new();
        let mailer = RecordingMailer::new();
        let keys = Arc::new(KeyHierarchy::with_master_key(&[7u8; 32]).unwrap());

        let service = SignatureService::new(
            dal.clone(),
            config,
            Collaborators {
                signing_api: Arc::new(api.clone()),
                identity_provider: Arc::new(idp.clone()),
                documents: Arc::new(docs.clone()),
                mailer: Arc::new(mailer.clone()),
                cache: Arc::new(MemoryCache::new(Arc::new(clock.clone()))),
                clock: Arc::new(clock.clone()),
            },
            keys,
        );

        let tenant_id = Uuid::new_v4();
        Self {
            service,
            dal,
            clock,
            api,
            idp,
            docs,
            mailer,
            tenant_id,
            ctx: RequestContext::user(tenant_id, Uuid::new_v4()),
        }
    }

    /// A document plus a request over it for `signers` (email, name).
    pub fn request_for(&self, signers: &[(&str, &str)]) -> CreateSignatureRequest {
        let document_id = self.docs.insert("Rental agreement", "rental agreement v1");
        signers
            .iter()
            .fold(CreateSignatureRequest::new(document_id), |input, (email, name)| {
                input.signer(SignerInput::new(*email, *name))
            })
    }

    pub async fn signers(&self, request_id: Uuid) -> Vec<Signer> {
        self.service
            .orchestrator()
            .get_request(&self.ctx, request_id)
            .await
            .unwrap()
            .signers
    }

    /// Runs the full signer flow for `token` as identity `subject`.
    pub async fn sign(&self, token: &str, subject: &str) -> Result<CallbackOutcome, SignatureError> {
        let url = self
            .service
            .orchestrator()
            .start_signing(&RequestContext::anonymous(), token, None)
            .await?;
        self.callback(&url, subject).await
    }

    /// Logs `subject` in at the provider and delivers the callback.
    pub async fn callback(&self, url: &str, subject: &str) -> Result<CallbackOutcome, SignatureError> {
        let state = MockIdentityProvider::state_of(url).expect("state in authorization url");
        let code = self
            .idp
            .login(
                &state,
                UserInfo {
                    sub: subject.to_string(),
                    bpk: Some(format!("BF:{subject}")),
                    name: Some(subject.to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        self.service
            .handle_callback(&RequestContext::anonymous(), &CallbackParams::success(code, state))
            .await
    }

    pub async fn request_events(&self, request_id: Uuid) -> Vec<String> {
        self.dal
            .audit_event()
            .list_for_request(self.tenant_id, request_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }
}
