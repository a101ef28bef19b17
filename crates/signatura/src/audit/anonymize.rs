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

//! PII reduction applied to every audit row on insert.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Maximum stored user-agent length, in characters.
pub const MAX_USER_AGENT_LEN: usize = 255;

/// Zeroes the host part of an IP address.
///
/// IPv4 loses its last octet, IPv6 its last 64 bits. Unparseable input is
/// dropped rather than stored verbatim.
pub fn anonymize_ip(raw: &str) -> Option<String> {
    let addr: IpAddr = raw.trim().parse().ok()?;
    let anonymized = match addr {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            IpAddr::V4(Ipv4Addr::new(a, b, c, 0))
        }
        IpAddr::V6(v6) => {
            let s = v6.segments();
            IpAddr::V6(Ipv6Addr::new(s[0], s[1], s[2], s[3], 0, 0, 0, 0))
        }
    };
    Some(anonymized.to_string())
}

/// Truncates a user agent to [`MAX_USER_AGENT_LEN`] characters.
pub fn truncate_user_agent(raw: &str) -> String {
    raw.chars().take(MAX_USER_AGENT_LEN).collect()
}

pub(crate) fn anonymize_opt_ip(raw: Option<String>) -> Option<String> {
    raw.as_deref().and_then(anonymize_ip)
}

pub(crate) fn truncate_opt_user_agent(raw: Option<String>) -> Option<String> {
    raw.as_deref().map(truncate_user_agent)
}
