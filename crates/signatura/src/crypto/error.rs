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

use thiserror::Error;

/// Errors from key management and authenticated encryption.
///
/// Messages are deliberately terse; callers must not forward them to clients.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("master key not loaded")]
    KeyNotLoaded,

    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid ciphertext: input too short")]
    InvalidCiphertext,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("key derivation failed")]
    KeyDerivationFailed,

    #[error("master key source error: {0}")]
    MasterKeySource(String),

    #[error("refusing to generate an ephemeral master key in production")]
    EphemeralKeyRefused,

    #[error("serialization error: {0}")]
    Serialization(String),
}
