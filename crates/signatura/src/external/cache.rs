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

//! Key/value cache with TTL and an atomic counter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;

use crate::clock::{to_chrono, SharedClock, SystemClock};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Cache: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// `SETEX`: stores `value` under `key` for `ttl`, replacing any value.
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Atomic `INCR` + `EXPIRE`: increments the counter at `key`, starting a
    /// `window`-long expiry when the counter is created.
    ///
    /// Returns the new count and the time left in the window.
    async fn incr_with_expiry(&self, key: &str, window: Duration)
        -> Result<(u64, Duration), CacheError>;
}

#[derive(Debug)]
enum Value {
    Bytes(Vec<u8>),
    Counter(u64),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// In-process cache honoring TTLs against an injectable clock.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: SharedClock,
    unavailable: Arc<AtomicBool>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryCache {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Simulates a backend outage: every call fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("connection refused".into()));
        }
        Ok(())
    }

    fn live<'m>(
        entries: &'m mut HashMap<String, Entry>,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<&'m mut Entry> {
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.check()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        Ok(Self::live(&mut entries, key, now).and_then(|e| match &e.value {
            Value::Bytes(bytes) => Some(bytes.clone()),
            Value::Counter(_) => None,
        }))
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        let expires_at = self.clock.now() + to_chrono(ttl);
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(value),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check()?;
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn incr_with_expiry(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<(u64, Duration), CacheError> {
        self.check()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Counter(0),
            expires_at: now + to_chrono(window),
        });

        let count = match entry.value {
            Value::Counter(count) => count + 1,
            Value::Bytes(_) => 1,
        };
        entry.value = Value::Counter(count);

        let remaining = (entry.expires_at - now).to_std().unwrap_or(Duration::ZERO);
        Ok((count, remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_set_ex_expires() {
        let clock = ManualClock::starting_now();
        let cache = MemoryCache::new(Arc::new(clock.clone()));

        cache
            .set_ex("2fa_setup:u1", b"secret".to_vec(), Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(
            cache.get("2fa_setup:u1").await.unwrap().as_deref(),
            Some(&b"secret"[..])
        );

        clock.advance(chrono::Duration::seconds(301));
        assert_eq!(cache.get("2fa_setup:u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_counter_window() {
        let clock = ManualClock::starting_now();
        let cache = MemoryCache::new(Arc::new(clock.clone()));
        let window = Duration::from_secs(60);

        assert_eq!(cache.incr_with_expiry("rl:k", window).await.unwrap().0, 1);
        clock.advance(chrono::Duration::seconds(20));
        let (count, remaining) = cache.incr_with_expiry("rl:k", window).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(remaining, Duration::from_secs(40));

        clock.advance(chrono::Duration::seconds(41));
        assert_eq!(cache.incr_with_expiry("rl:k", window).await.unwrap().0, 1);
    }

    #[tokio::test]
    async fn test_outage() {
        let cache = MemoryCache::default();
        cache.set_unavailable(true);
        assert!(cache.get("k").await.is_err());
        cache.set_unavailable(false);
        assert!(cache.get("k").await.unwrap().is_none());
    }
}
