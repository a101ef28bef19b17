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

//! Exponential backoff for retryable signing API errors.

use std::future::Future;
use std::time::Duration;

use super::error::SigningApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, multiplier: u32) -> Self {
        Self {
            max_retries,
            base_delay,
            multiplier,
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, 1)
    }

    /// Wait before retry number `retry` (1-based): base, base×m, base×m², ...
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `attempt` until it succeeds, fails with a non-retryable error, or
    /// the retries are spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, SigningApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SigningApiError>>,
    {
        let mut retry = 0;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retry < self.max_retries => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    tracing::warn!(
                        operation,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        code = %e.code,
                        "retrying signing API call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
