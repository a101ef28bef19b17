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

//! Cache-backed fixed-window rate limiter.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::external::Cache;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    Exceeded { retry_after_secs: u64 },

    #[error("rate limiter unavailable: {0}")]
    Unavailable(String),
}

/// What to do when the counter backend cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Let the request through (read-only listings).
    Open,
    /// Refuse the request (login, 2FA, batch creation).
    Closed,
}

/// Counts attempts per key inside a fixed window.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    cache: Arc<dyn Cache>,
    window: Duration,
    max_attempts: u64,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn Cache>, window: Duration, max_attempts: u64) -> Self {
        Self {
            cache,
            window,
            max_attempts,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_attempts(&self) -> u64 {
        self.max_attempts
    }

    /// Counts one attempt for `scope`/`key` and rejects it when the window's
    /// budget is spent.
    pub async fn check(&self, scope: &str, key: &str, mode: FailureMode) -> Result<(), RateLimitError> {
        let counter = format!("ratelimit:{scope}:{key}");
        match self.cache.incr_with_expiry(&counter, self.window).await {
            Ok((count, _)) if count <= self.max_attempts => Ok(()),
            Ok((count, remaining)) => {
                let retry_after_secs = remaining.as_secs().max(1);
                tracing::warn!(scope, count, retry_after_secs, "rate limit exceeded");
                Err(RateLimitError::Exceeded { retry_after_secs })
            }
            Err(e) => match mode {
                FailureMode::Open => {
                    tracing::warn!(scope, error = %e, "rate limiter unavailable, failing open");
                    Ok(())
                }
                FailureMode::Closed => {
                    tracing::error!(scope, error = %e, "rate limiter unavailable, failing closed");
                    Err(RateLimitError::Unavailable(e.to_string()))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::external::MemoryCache;

    fn limiter(max: u64) -> (RateLimiter, MemoryCache, ManualClock) {
        let clock = ManualClock::starting_now();
        let cache = MemoryCache::new(Arc::new(clock.clone()));
        let limiter = RateLimiter::new(Arc::new(cache.clone()), Duration::from_secs(60), max);
        (limiter, cache, clock)
    }

    #[tokio::test]
    async fn test_budget_then_reject() {
        let (limiter, _, clock) = limiter(3);
        for _ in 0..3 {
            limiter.check("login", "u1", FailureMode::Closed).await.unwrap();
        }

        clock.advance(chrono::Duration::seconds(15));
        match limiter.check("login", "u1", FailureMode::Closed).await {
            Err(RateLimitError::Exceeded { retry_after_secs }) => assert_eq!(retry_after_secs, 45),
            other => panic!("expected Exceeded, got {other:?}"),
        }

        // Keys are independent
        limiter.check("login", "u2", FailureMode::Closed).await.unwrap();

        clock.advance(chrono::Duration::seconds(46));
        limiter.check("login", "u1", FailureMode::Closed).await.unwrap();
    }

    #[tokio::test]
    async fn test_outage_modes() {
        let (limiter, cache, _) = limiter(3);
        cache.set_unavailable(true);

        assert!(limiter.check("list", "t1", FailureMode::Open).await.is_ok());
        assert!(matches!(
            limiter.check("2fa_disable", "u1", FailureMode::Closed).await,
            Err(RateLimitError::Unavailable(_))
        ));
    }
}
