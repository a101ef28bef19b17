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

//! Cryptographic building blocks.
//!
//! This module provides:
//! - AES-256-GCM authenticated encryption with random or caller-supplied nonces
//! - An HKDF-SHA256 key hierarchy rooted in a single 32-byte master key
//! - Master key loading from environment, file, or an external secret provider
//! - Secure token generation and SHA-256 helpers

mod encryption;
mod error;
mod key_hierarchy;
mod master_key;
mod tokens;

pub use encryption::{decrypt, decrypt_with_nonce, encrypt, encrypt_with_nonce, NONCE_SIZE, TAG_SIZE};
pub use error::CryptoError;
pub use key_hierarchy::{hkdf_derive, DerivedKey, KeyHierarchy, KeyPurpose, KEY_SIZE};
pub use master_key::{
    MasterKeyLoader, MasterKeySource, OpenBaoSecretProvider, SecretProvider,
    MASTER_KEY_ENV_VAR, MASTER_KEY_FILE_ENV_VAR,
};
pub use tokens::{generate_secure_token, generate_url_safe_token, hash_bpk, sha256_hex};
