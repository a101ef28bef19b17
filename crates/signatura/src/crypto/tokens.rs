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

//! Random tokens and digests.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Byte length of signer tokens before hex encoding.
const SECURE_TOKEN_BYTES: usize = 32;

/// 256-bit CSPRNG token, hex-encoded (64 characters).
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; SECURE_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `n` CSPRNG bytes, base64url-encoded without padding.
pub fn generate_url_safe_token(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash of a BPK (sector-specific identifier). The plaintext is never stored.
pub fn hash_bpk(bpk: &str) -> String {
    sha256_hex(bpk.trim().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_token_shape() {
        let token = generate_secure_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_secure_token());
    }

    #[test]
    fn test_url_safe_token_alphabet() {
        let token = generate_url_safe_token(32);
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_bpk_hash_hides_input() {
        let hashed = hash_bpk("BF:abc123==");
        assert_eq!(hashed.len(), 64);
        assert!(!hashed.contains("abc123"));
        assert_eq!(hashed, hash_bpk(" BF:abc123== "));
    }
}
