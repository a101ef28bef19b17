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

//! Collaborators outside the signing core.
//!
//! Each is a trait with an in-process implementation used by tests and
//! single-node deployments. Production deployments plug in their own
//! (Redis cache, object storage, SMTP relay).

mod cache;
mod document_store;
mod mailer;

pub use cache::{Cache, CacheError, MemoryCache};
pub use document_store::{DocumentStore, DocumentStoreError, MemoryDocumentStore, StoredDocument};
pub use mailer::{
    LoggingMailer, MailError, Mailer, SignatureCompleteEmail, SignatureRequestEmail,
};
