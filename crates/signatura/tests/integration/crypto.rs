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

//! Per-tenant, per-credential key separation.

use signatura::crypto::{decrypt, encrypt, CryptoError, KeyHierarchy};
use uuid::Uuid;

fn hierarchy() -> KeyHierarchy {
    KeyHierarchy::with_master_key(&[0x5au8; 32]).unwrap()
}

#[test]
fn test_credential_ciphertext_is_bound_to_tenant_and_credential() {
    let keys = hierarchy();
    let (tenant_a, tenant_b) = (Uuid::new_v4(), Uuid::new_v4());
    let credential = Uuid::new_v4();

    let own = keys.derive_credential_key(tenant_a, credential).unwrap();
    let sealed = encrypt(b"PIN:1234", own.as_bytes()).unwrap();
    assert!(!sealed.windows(8).any(|w| w == b"PIN:1234"));

    let foreign = keys.derive_credential_key(tenant_b, credential).unwrap();
    assert!(matches!(
        decrypt(&sealed, foreign.as_bytes()),
        Err(CryptoError::DecryptionFailed)
    ));

    let sibling = keys.derive_credential_key(tenant_a, Uuid::new_v4()).unwrap();
    assert!(matches!(
        decrypt(&sealed, sibling.as_bytes()),
        Err(CryptoError::DecryptionFailed)
    ));

    assert_eq!(decrypt(&sealed, own.as_bytes()).unwrap(), b"PIN:1234");
}

#[test]
fn test_derivation_is_stable_across_instances() {
    let tenant = Uuid::new_v4();
    let credential = Uuid::new_v4();
    let sealed = encrypt(
        b"api-secret",
        hierarchy()
            .derive_credential_key(tenant, credential)
            .unwrap()
            .as_bytes(),
    )
    .unwrap();

    let reopened = hierarchy().derive_credential_key(tenant, credential).unwrap();
    assert_eq!(decrypt(&sealed, reopened.as_bytes()).unwrap(), b"api-secret");
}

#[test]
fn test_cleared_hierarchy_refuses_derivation() {
    let keys = hierarchy();
    keys.clear();
    assert!(matches!(
        keys.derive_credential_key(Uuid::new_v4(), Uuid::new_v4()),
        Err(CryptoError::KeyNotLoaded)
    ));
}
