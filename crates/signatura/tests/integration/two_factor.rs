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

//! TOTP enrollment, recovery codes and admin gating.

use signatura::clock::Clock;
use signatura::security::totp;
use signatura::security::{SecondFactor, TwoFactorError, RECOVERY_CODE_COUNT};
use uuid::Uuid;

use crate::common::Harness;

/// Enrolls `user` and returns the decoded secret and the recovery codes.
async fn enroll(h: &Harness, user: Uuid) -> (Vec<u8>, Vec<String>) {
    let setup = h
        .service
        .two_factor()
        .begin_setup(h.tenant_id, user, "clerk@example.at")
        .await
        .unwrap();
    assert!(setup.provisioning_uri.starts_with("otpauth://totp/"));

    let secret = totp::base32_decode(&setup.secret_base32).unwrap();
    let code = totp::generate_code(&secret, now(h));
    let codes = h
        .service
        .two_factor()
        .confirm_setup(h.tenant_id, user, &code)
        .await
        .unwrap();
    (secret, codes)
}

fn now(h: &Harness) -> u64 {
    u64::try_from(h.clock.now().timestamp()).unwrap()
}

#[tokio::test]
async fn test_recovery_codes_are_single_use() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let (_, codes) = enroll(&h, user).await;
    assert_eq!(codes.len(), RECOVERY_CODE_COUNT);
    assert_eq!(codes.len(), 10);

    let two_factor = h.service.two_factor();
    assert!(two_factor.is_enabled(h.tenant_id, user).await.unwrap());
    assert_eq!(
        two_factor
            .redeem_recovery_code(h.tenant_id, user, &codes[0])
            .await
            .unwrap(),
        9
    );
    assert!(matches!(
        two_factor
            .redeem_recovery_code(h.tenant_id, user, &codes[0])
            .await,
        Err(TwoFactorError::RecoveryCodeInvalid)
    ));
    assert_eq!(
        two_factor
            .redeem_recovery_code(h.tenant_id, user, &codes[1])
            .await
            .unwrap(),
        8
    );
}

#[tokio::test]
async fn test_admin_operation_requires_second_factor() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let two_factor = h.service.two_factor();

    assert!(matches!(
        two_factor
            .authorize_admin(h.tenant_id, user, "rotate_keys", SecondFactor::Totp("000000"))
            .await,
        Err(TwoFactorError::NotEnrolled)
    ));

    let (secret, codes) = enroll(&h, user).await;
    let code = totp::generate_code(&secret, now(&h));
    two_factor
        .authorize_admin(h.tenant_id, user, "rotate_keys", SecondFactor::Totp(&code))
        .await
        .unwrap();
    two_factor
        .authorize_admin(
            h.tenant_id,
            user,
            "signature_settings",
            SecondFactor::RecoveryCode(&codes[3]),
        )
        .await
        .unwrap();

    let wrong = if code == "000000" { "111111" } else { "000000" };
    assert!(matches!(
        two_factor
            .authorize_admin(h.tenant_id, user, "rotate_keys", SecondFactor::Totp(wrong))
            .await,
        Err(TwoFactorError::InvalidCode)
    ));
}

#[tokio::test]
async fn test_enrollment_is_tenant_scoped() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    enroll(&h, user).await;

    let two_factor = h.service.two_factor();
    assert!(!two_factor.is_enabled(Uuid::new_v4(), user).await.unwrap());
    assert!(matches!(
        two_factor.begin_setup(h.tenant_id, user, "clerk@example.at").await,
        Err(TwoFactorError::AlreadyEnrolled)
    ));
}

#[tokio::test]
async fn test_unconfirmed_setup_expires() {
    let h = Harness::new();
    let user = Uuid::new_v4();
    let setup = h
        .service
        .two_factor()
        .begin_setup(h.tenant_id, user, "clerk@example.at")
        .await
        .unwrap();
    let secret = totp::base32_decode(&setup.secret_base32).unwrap();

    let ttl = chrono::Duration::from_std(h.service.config().two_factor_setup_ttl()).unwrap();
    h.clock.advance(ttl + chrono::Duration::seconds(1));
    let code = totp::generate_code(&secret, now(&h));
    assert!(matches!(
        h.service
            .two_factor()
            .confirm_setup(h.tenant_id, user, &code)
            .await,
        Err(TwoFactorError::SetupExpired)
    ));
}
