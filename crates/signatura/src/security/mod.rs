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

//! Security module for second-factor authentication and abuse controls.
//!
//! This module provides:
//! - RFC 6238 TOTP codes and `otpauth://` provisioning
//! - Encrypted single-use recovery codes
//! - [`TwoFactorService`] for enrollment, verification and admin authorization
//! - [`RateLimiter`] with fail-open and fail-closed modes
//! - Security event logging for SIEM integration

pub mod audit;
mod rate_limit;
mod recovery_codes;
pub mod totp;
mod two_factor;

pub use audit::{DbSecurityEventStore, SecurityEventSink, SecurityEventStore};
pub use rate_limit::{FailureMode, RateLimitError, RateLimiter};
pub use recovery_codes::{RecoveryCodeSet, RECOVERY_CODE_COUNT};
pub use two_factor::{SecondFactor, TwoFactorError, TwoFactorService, TwoFactorSetup, DEFAULT_SETUP_TTL};
