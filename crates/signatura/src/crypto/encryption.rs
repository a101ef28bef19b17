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

//! AES-256-GCM authenticated encryption.
//!
//! Two layouts are supported:
//! - [`encrypt`] generates a fresh random nonce and returns
//!   `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! - [`encrypt_with_nonce`] uses a caller-supplied nonce and returns
//!   `ciphertext || tag` only; the caller stores the nonce separately and is
//!   responsible for never reusing a (key, nonce) pair.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use super::error::CryptoError;
use super::key_hierarchy::KEY_SIZE;

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-256-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key.len(),
        });
    }

    Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_SIZE,
        actual: key.len(),
    })
}

/// Encrypts `plaintext` under `key` with a random nonce.
///
/// # Returns
///
/// `nonce || ciphertext || tag`
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyLength`] if the key is not 32 bytes.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = encrypt_with_nonce(plaintext, key, &nonce_bytes)?;

    let mut encrypted = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    encrypted.extend_from_slice(&nonce_bytes);
    encrypted.extend_from_slice(&ciphertext);

    Ok(encrypted)
}

/// Encrypts `plaintext` under `key` with a caller-supplied nonce.
///
/// # Returns
///
/// `ciphertext || tag` (the nonce is not included)
pub fn encrypt_with_nonce(
    plaintext: &[u8],
    key: &[u8],
    nonce: &[u8; NONCE_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher_for(key)?;

    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Decrypts data produced by [`encrypt`].
///
/// # Errors
///
/// - [`CryptoError::InvalidCiphertext`] if the input is shorter than nonce + tag
/// - [`CryptoError::DecryptionFailed`] if authentication fails
pub fn decrypt(encrypted: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if encrypted.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::InvalidCiphertext);
    }

    let (nonce, ciphertext) = encrypted.split_at(NONCE_SIZE);
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    nonce_bytes.copy_from_slice(nonce);

    decrypt_with_nonce(ciphertext, key, &nonce_bytes)
}

/// Decrypts `ciphertext || tag` produced by [`encrypt_with_nonce`].
pub fn decrypt_with_nonce(
    ciphertext: &[u8],
    key: &[u8],
    nonce: &[u8; NONCE_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::InvalidCiphertext);
    }

    let cipher = cipher_for(key)?;

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = [0x01u8; 32];
        let plaintext = b"PIN:1234";

        let encrypted = encrypt(plaintext, &key).unwrap();
        assert_eq!(encrypted.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);

        let decrypted = decrypt(&encrypted, &key).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let key = [0x07u8; 32];
        let encrypted = encrypt(b"", &key).unwrap();
        assert_eq!(encrypted.len(), NONCE_SIZE + TAG_SIZE);
        assert!(decrypt(&encrypted, &key).unwrap().is_empty());
    }

    #[test]
    fn test_random_nonces_differ() {
        let key = [0x01u8; 32];
        let a = encrypt(b"same", &key).unwrap();
        let b = encrypt(b"same", &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = encrypt(b"secret", &[0x01u8; 32]).unwrap();
        let result = decrypt(&encrypted, &[0x02u8; 32]);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_invalid_key_length() {
        let result = encrypt(b"secret", &[0x01u8; 16]);
        assert!(matches!(
            result,
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_short_input_is_invalid_ciphertext() {
        let result = decrypt(&[0u8; NONCE_SIZE + TAG_SIZE - 1], &[0x01u8; 32]);
        assert!(matches!(result, Err(CryptoError::InvalidCiphertext)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = [0x01u8; 32];
        let mut encrypted = encrypt(b"some longer secret value", &key).unwrap();
        encrypted[NONCE_SIZE + 3] ^= 0xFF;

        assert!(matches!(
            decrypt(&encrypted, &key),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_caller_supplied_nonce_excludes_nonce_from_output() {
        let key = [0x03u8; 32];
        let nonce = [0x09u8; NONCE_SIZE];

        let ciphertext = encrypt_with_nonce(b"credential", &key, &nonce).unwrap();
        assert_eq!(ciphertext.len(), b"credential".len() + TAG_SIZE);

        let plaintext = decrypt_with_nonce(&ciphertext, &key, &nonce).unwrap();
        assert_eq!(plaintext, b"credential");

        let other_nonce = [0x0Au8; NONCE_SIZE];
        assert!(decrypt_with_nonce(&ciphertext, &key, &other_nonce).is_err());
    }
}
