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

//! RFC 6238 time-based one-time passwords.
//!
//! HMAC-SHA1, 30-second steps, 6 digits, one step of clock skew tolerated in
//! either direction.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use subtle::ConstantTimeEq;
use url::Url;
use zeroize::Zeroizing;

/// Length of one TOTP step in seconds.
pub const STEP_SECS: u64 = 30;

/// Number of digits in a code.
pub const DIGITS: u32 = 6;

/// Steps of drift accepted on either side of the current one.
pub const SKEW_STEPS: i64 = 1;

/// Raw secret length (160 bits, the RFC 4226 recommendation).
pub const SECRET_LEN: usize = 20;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Fresh random TOTP secret.
pub fn generate_secret() -> Zeroizing<Vec<u8>> {
    let mut secret = Zeroizing::new(vec![0u8; SECRET_LEN]);
    rand::thread_rng().fill_bytes(secret.as_mut_slice());
    secret
}

/// RFC 4648 base32 without padding.
pub fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut buffer: u64 = 0;
    let mut bits = 0u32;

    for &byte in data {
        buffer = (buffer << 8) | u64::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            let index = ((buffer >> bits) & 0x1f) as usize;
            out.push(char::from(BASE32_ALPHABET[index]));
        }
    }
    if bits > 0 {
        let index = ((buffer << (5 - bits)) & 0x1f) as usize;
        out.push(char::from(BASE32_ALPHABET[index]));
    }
    out
}

/// Decodes base32, ignoring case, spaces and padding.
pub fn base32_decode(encoded: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(encoded.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits = 0u32;

    for c in encoded.chars().filter(|c| !c.is_whitespace() && *c != '=') {
        let upper = c.to_ascii_uppercase();
        let value = BASE32_ALPHABET.iter().position(|&a| char::from(a) == upper)? as u64;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }
    Some(out)
}

/// HOTP value for `counter` (RFC 4226 dynamic truncation).
fn hotp(secret: &[u8], counter: u64) -> u32 {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = match Hmac::<Sha1>::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return u32::MAX,
    };
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = usize::from(digest[digest.len() - 1] & 0x0f);
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    binary % 10u32.pow(DIGITS)
}

/// Code for the step containing `unix_time`.
pub fn generate_code(secret: &[u8], unix_time: u64) -> String {
    format_code(hotp(secret, unix_time / STEP_SECS))
}

fn format_code(value: u32) -> String {
    format!("{:0width$}", value, width = DIGITS as usize)
}

/// Checks `code` against the steps around `unix_time`.
///
/// Every candidate step is compared so timing does not reveal which (if any)
/// matched.
pub fn verify_code(secret: &[u8], code: &str, unix_time: u64) -> bool {
    let code = code.trim();
    if code.len() != DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let current = (unix_time / STEP_SECS) as i64;
    let mut matched = subtle::Choice::from(0u8);
    for offset in -SKEW_STEPS..=SKEW_STEPS {
        let step = current + offset;
        if step < 0 {
            continue;
        }
        let expected = format_code(hotp(secret, step as u64));
        matched |= expected.as_bytes().ct_eq(code.as_bytes());
    }
    matched.into()
}

/// `otpauth://totp/<issuer>:<account>?secret=...` URI for authenticator apps.
pub fn provisioning_uri(issuer: &str, account: &str, secret: &[u8]) -> String {
    let base = "otpauth://totp/";
    let mut uri = match Url::parse(base) {
        Ok(uri) => uri,
        Err(_) => return String::new(),
    };
    uri.set_path(&format!("{issuer}:{account}"));
    uri.query_pairs_mut()
        .append_pair("secret", &base32_encode(secret))
        .append_pair("issuer", issuer)
        .append_pair("algorithm", "SHA1")
        .append_pair("digits", &DIGITS.to_string())
        .append_pair("period", &STEP_SECS.to_string());
    uri.to_string()
}
