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

//! # Signatura
//!
//! Multi-party electronic signature orchestration.
//!
//! A signature request invites one or more signers, in parallel or in a fixed
//! order. Each signer proves their identity through an OIDC handshake with
//! PKCE, after which the document hash is signed by a remote qualified
//! signature service. Batches let a single signer sign many documents with one
//! handshake, in parallel under a fixed worker bound. Every transition is
//! recorded in a tenant-scoped audit trail.
//!
//! ## Components
//!
//! - [`orchestrator::SignatureOrchestrator`]: request and signer lifecycles
//! - [`batch::BatchExecutor`]: bounded-parallel batch signing
//! - [`orchestrator::OidcHandshake`]: persisted OIDC sessions keyed by `state`
//! - [`notifier::Notifier`]: invitations, reminders and completion notices
//! - [`sweeper::ExpirySweeper`]: periodic expiry of requests and sessions
//! - [`security::TwoFactorService`]: TOTP and recovery codes gating admin operations
//! - [`audit::AuditLogger`]: operational audit log with async buffering
//! - [`service::SignatureService`]: facade wiring all of the above
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use signatura::clock::SystemClock;
//! use signatura::config::SignatureConfig;
//! use signatura::crypto::KeyHierarchy;
//! use signatura::dal::DAL;
//! use signatura::database::Database;
//! use signatura::external::{LoggingMailer, MemoryCache, MemoryDocumentStore};
//! use signatura::service::{Collaborators, SignatureService};
//! use signatura::signing_api::MockSigningApi;
//! use signatura::testing::MockIdentityProvider;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! signatura::logging::init_tracing("signatura=info");
//! let clock = Arc::new(SystemClock);
//! let config = SignatureConfig::from_env()?;
//! let database = Database::new(config.database_url())?;
//! let service = SignatureService::new(
//!     DAL::new(database),
//!     config,
//!     Collaborators {
//!         signing_api: Arc::new(MockSigningApi::new()),
//!         identity_provider: Arc::new(MockIdentityProvider::new()),
//!         documents: Arc::new(MemoryDocumentStore::new()),
//!         mailer: Arc::new(LoggingMailer),
//!         cache: Arc::new(MemoryCache::new(clock.clone())),
//!         clock,
//!     },
//!     Arc::new(KeyHierarchy::new()),
//! );
//! let sweeper = service.spawn_sweeper();
//! service.shutdown().await;
//! sweeper.await?;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod batch;
pub mod clock;
pub mod config;
pub mod context;
pub mod crypto;
pub mod dal;
pub mod database;
pub mod error;
pub mod external;
pub mod logging;
pub mod manifest;
pub mod models;
pub mod notifier;
pub mod oidc;
pub mod orchestrator;
pub mod security;
pub mod service;
pub mod signing_api;
pub mod sweeper;
pub mod testing;

pub use config::SignatureConfig;
pub use context::RequestContext;
pub use error::{ErrorKind, SignatureError, StorageError};
pub use service::{CallbackOutcome, Collaborators, SignatureService};
