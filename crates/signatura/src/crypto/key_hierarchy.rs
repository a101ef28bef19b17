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

//! HKDF-SHA256 key hierarchy.
//!
//! A single 32-byte master key is the root. Every other key is derived on
//! demand with `HKDF(IKM = parent, salt = scoping UUID bytes, info = label)`
//! and dropped (and zeroed) as soon as the caller is done with it:
//!
//! ```text
//! master ──tenant-key(tenant)──▶ tenant key ──credential-key(credential)──▶ credential key
//!                                           ├─totp-key(user)──────────────▶ TOTP key
//!                                           └─recovery-key(user)──────────▶ recovery key
//! master ──export-key(scope)──▶ export key
//! ```

use std::fmt;

use hkdf::Hkdf;
use parking_lot::RwLock;
use sha2::Sha256;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::error::CryptoError;

/// Size of the master key and of every derived key, in bytes.
pub const KEY_SIZE: usize = 32;

/// HKDF info labels for each level of the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    Tenant,
    Credential,
    Totp,
    Recovery,
    Export,
}

impl KeyPurpose {
    pub fn label(&self) -> &'static str {
        match self {
            KeyPurpose::Tenant => "tenant-key",
            KeyPurpose::Credential => "credential-key",
            KeyPurpose::Totp => "totp-key",
            KeyPurpose::Recovery => "recovery-key",
            KeyPurpose::Export => "export-key",
        }
    }
}

/// A 32-byte derived key, zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Single HKDF-SHA256 expansion producing a 32-byte key.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyLength`] if `ikm` is not 32 bytes.
pub fn hkdf_derive(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<DerivedKey, CryptoError> {
    if ikm.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: ikm.len(),
        });
    }

    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    // Allocated as the final type so an expansion error still zeroes it on drop.
    let mut key = DerivedKey([0u8; KEY_SIZE]);
    hk.expand(info, &mut key.0)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;

    Ok(key)
}

/// Holds the master key and derives scoped keys from it.
///
/// Read-mostly: derivations take a shared lock, loading and clearing the
/// master take the write lock.
pub struct KeyHierarchy {
    master: RwLock<Option<Zeroizing<[u8; KEY_SIZE]>>>,
}

impl fmt::Debug for KeyHierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHierarchy")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl Default for KeyHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyHierarchy {
    /// Creates a hierarchy with no master key loaded.
    pub fn new() -> Self {
        Self {
            master: RwLock::new(None),
        }
    }

    /// Creates a hierarchy rooted at `master`.
    pub fn with_master_key(master: &[u8]) -> Result<Self, CryptoError> {
        let hierarchy = Self::new();
        hierarchy.load_master_key(master)?;
        Ok(hierarchy)
    }

    /// Installs the master key, replacing (and zeroing) any previous one.
    pub fn load_master_key(&self, master: &[u8]) -> Result<(), CryptoError> {
        if master.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: master.len(),
            });
        }

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(master);
        *self.master.write() = Some(key);

        tracing::info!("master key loaded");
        Ok(())
    }

    /// Drops the master key. Subsequent derivations fail with `KeyNotLoaded`.
    pub fn clear(&self) {
        *self.master.write() = None;
        tracing::info!("master key cleared");
    }

    pub fn is_loaded(&self) -> bool {
        self.master.read().is_some()
    }

    /// Derives a first-level key directly from the master.
    pub fn derive(&self, purpose: KeyPurpose, scope: Uuid) -> Result<DerivedKey, CryptoError> {
        let guard = self.master.read();
        let master = guard.as_ref().ok_or(CryptoError::KeyNotLoaded)?;
        hkdf_derive(master.as_ref(), scope.as_bytes(), purpose.label().as_bytes())
    }

    /// Derives the per-tenant key.
    pub fn derive_tenant_key(&self, tenant_id: Uuid) -> Result<DerivedKey, CryptoError> {
        self.derive(KeyPurpose::Tenant, tenant_id)
    }

    /// Two-level derivation: master → tenant key → credential key.
    pub fn derive_credential_key(
        &self,
        tenant_id: Uuid,
        credential_id: Uuid,
    ) -> Result<DerivedKey, CryptoError> {
        self.derive_tenant_scoped(tenant_id, KeyPurpose::Credential, credential_id)
    }

    /// Two-level derivation: master → tenant key → `purpose` key salted
    /// with `subject` (a credential or user id).
    pub fn derive_tenant_scoped(
        &self,
        tenant_id: Uuid,
        purpose: KeyPurpose,
        subject: Uuid,
    ) -> Result<DerivedKey, CryptoError> {
        let tenant_key = self.derive_tenant_key(tenant_id)?;
        hkdf_derive(
            tenant_key.as_bytes(),
            subject.as_bytes(),
            purpose.label().as_bytes(),
        )
    }

    /// Key used to export material for `scope` outside the tenant boundary.
    pub fn derive_export_key(&self, scope: Uuid) -> Result<DerivedKey, CryptoError> {
        self.derive(KeyPurpose::Export, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> KeyHierarchy {
        KeyHierarchy::with_master_key(&[0x42u8; KEY_SIZE]).unwrap()
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let scope = Uuid::new_v4();
        let a = hierarchy().derive(KeyPurpose::Tenant, scope).unwrap();
        let b = hierarchy().derive(KeyPurpose::Tenant, scope).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_labels_and_salts_separate_keys() {
        let keys = hierarchy();
        let scope = Uuid::new_v4();

        let tenant = keys.derive(KeyPurpose::Tenant, scope).unwrap();
        let export = keys.derive(KeyPurpose::Export, scope).unwrap();
        let other = keys.derive(KeyPurpose::Tenant, Uuid::new_v4()).unwrap();

        assert_ne!(tenant.as_bytes(), export.as_bytes());
        assert_ne!(tenant.as_bytes(), other.as_bytes());
    }

    #[test]
    fn test_credential_key_is_two_level() {
        let keys = hierarchy();
        let tenant = Uuid::new_v4();
        let credential = Uuid::new_v4();

        let tenant_key = keys.derive_tenant_key(tenant).unwrap();
        let expected = hkdf_derive(
            tenant_key.as_bytes(),
            credential.as_bytes(),
            b"credential-key",
        )
        .unwrap();

        let actual = keys.derive_credential_key(tenant, credential).unwrap();
        assert_eq!(actual.as_bytes(), expected.as_bytes());
    }

    #[test]
    fn test_hkdf_derive_matches_direct_expansion() {
        let ikm = [0x0bu8; KEY_SIZE];
        let salt = [0x00u8, 0x01, 0x02, 0x03];
        let info = b"tenant-key";

        let mut expected = [0u8; KEY_SIZE];
        Hkdf::<Sha256>::new(Some(&salt), &ikm)
            .expand(info, &mut expected)
            .unwrap();

        let derived = hkdf_derive(&ikm, &salt, info).unwrap();
        assert_eq!(derived.as_bytes(), &expected);
    }

    #[test]
    fn test_missing_master_key() {
        let keys = KeyHierarchy::new();
        assert!(matches!(
            keys.derive(KeyPurpose::Totp, Uuid::new_v4()),
            Err(CryptoError::KeyNotLoaded)
        ));
    }

    #[test]
    fn test_clear_unloads_master() {
        let keys = hierarchy();
        assert!(keys.is_loaded());
        keys.clear();
        assert!(!keys.is_loaded());
        assert!(keys.derive_tenant_key(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_invalid_master_length() {
        assert!(matches!(
            KeyHierarchy::with_master_key(&[0u8; 16]),
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));
        assert!(matches!(
            hkdf_derive(&[0u8; 31], b"salt", b"info"),
            Err(CryptoError::InvalidKeyLength { .. })
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = hierarchy().derive_tenant_key(Uuid::new_v4()).unwrap();
        assert_eq!(format!("{:?}", key), "DerivedKey([REDACTED])");
    }
}
