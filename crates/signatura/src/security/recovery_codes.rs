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

//! One-time recovery codes for accounts with TOTP enabled.
//!
//! A user holds exactly [`RECOVERY_CODE_COUNT`] codes of the form
//! `XXXX-XXXX-XXXX`. The set is stored as an encrypted JSON container; every
//! redemption decrypts, marks the code used, and re-encrypts.

use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use super::two_factor::TwoFactorError;
use crate::crypto::{decrypt, encrypt, CryptoError, DerivedKey};

/// Codes issued per user.
pub const RECOVERY_CODE_COUNT: usize = 10;

/// Unambiguous alphabet: no 0/O, 1/I.
const ALPHABET: &[u8; 32] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

const GROUPS: usize = 3;
const GROUP_LEN: usize = 4;

#[derive(Clone, Serialize, Deserialize, Zeroize)]
struct RecoveryCode {
    code: String,
    used: bool,
}

/// A user's recovery codes. Contents are wiped on drop.
pub struct RecoveryCodeSet {
    codes: Vec<RecoveryCode>,
}

impl Drop for RecoveryCodeSet {
    fn drop(&mut self) {
        self.codes.zeroize();
    }
}

impl std::fmt::Debug for RecoveryCodeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCodeSet")
            .field("remaining", &self.remaining())
            .finish_non_exhaustive()
    }
}

fn random_code() -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(GROUPS * GROUP_LEN + GROUPS - 1);
    for group in 0..GROUPS {
        if group > 0 {
            code.push('-');
        }
        for _ in 0..GROUP_LEN {
            code.push(char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]));
        }
    }
    code
}

/// Uppercases and strips whitespace so users can type codes loosely.
fn normalize(code: &str) -> Zeroizing<String> {
    Zeroizing::new(
        code.chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect(),
    )
}

impl RecoveryCodeSet {
    /// A fresh set of distinct codes.
    pub fn generate() -> Self {
        let mut codes: Vec<RecoveryCode> = Vec::with_capacity(RECOVERY_CODE_COUNT);
        while codes.len() < RECOVERY_CODE_COUNT {
            let code = random_code();
            if codes.iter().all(|c| c.code != code) {
                codes.push(RecoveryCode { code, used: false });
            }
        }
        Self { codes }
    }

    /// Builds a set from known plaintext codes.
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            codes: codes
                .into_iter()
                .map(|c| RecoveryCode {
                    code: normalize(c.as_ref()).to_string(),
                    used: false,
                })
                .collect(),
        }
    }

    /// Plaintext codes, shown to the user once at issue time.
    pub fn plaintext(&self) -> Vec<String> {
        self.codes.iter().map(|c| c.code.clone()).collect()
    }

    pub fn remaining(&self) -> usize {
        self.codes.iter().filter(|c| !c.used).count()
    }

    /// Consumes `presented` if it matches an unused code.
    ///
    /// Every stored code is compared so the position of a match does not show
    /// in timing.
    pub fn redeem(&mut self, presented: &str) -> Result<(), TwoFactorError> {
        if self.remaining() == 0 {
            return Err(TwoFactorError::AllRecoveryCodesUsed);
        }

        let presented = normalize(presented);
        let mut hit: Option<usize> = None;
        for (index, code) in self.codes.iter().enumerate() {
            let equal: bool = code.code.as_bytes().ct_eq(presented.as_bytes()).into();
            if equal && !code.used {
                hit = Some(index);
            }
        }

        match hit {
            Some(index) => {
                self.codes[index].used = true;
                Ok(())
            }
            None => Err(TwoFactorError::RecoveryCodeInvalid),
        }
    }

    /// Encrypts the set as JSON under `key`.
    pub fn seal(&self, key: &DerivedKey) -> Result<Vec<u8>, CryptoError> {
        let json = Zeroizing::new(
            serde_json::to_vec(&self.codes).map_err(|e| CryptoError::Serialization(e.to_string()))?,
        );
        encrypt(&json, key.as_bytes())
    }

    /// Decrypts a set produced by [`seal`](Self::seal).
    pub fn open(sealed: &[u8], key: &DerivedKey) -> Result<Self, CryptoError> {
        let json = Zeroizing::new(decrypt(sealed, key.as_bytes())?);
        let codes = serde_json::from_slice(&json).map_err(|e| CryptoError::Serialization(e.to_string()))?;
        Ok(Self { codes })
    }
}
