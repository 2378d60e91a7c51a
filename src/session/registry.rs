// ABOUTME: Concurrent session registry
// Owns the session-key -> client mapping behind a single mutex and
// enforces single construction per key and atomic sweeps.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::transport::SpawnError;

/// One pooled session: a shared client handle plus its last-used instant
///
/// `last_used` is mutated only through the registry's access path.
#[derive(Debug)]
pub struct SessionEntry<C> {
    /// Shared client handle for this session
    pub client: Arc<C>,
    last_used: Instant,
}

impl<C> SessionEntry<C> {
    /// Idle duration of this session
    #[must_use]
    pub fn idle(&self, now: Instant) -> Duration {
        now.duration_since(self.last_used)
    }
}

/// Mapping from session key to live client handle
///
/// All reads and writes go through one mutex; `get_or_create` and
/// [`SessionRegistry::sweep`] never interleave. The lock is held across
/// client construction — a slow spawn serializes creation of all
/// sessions, which is the accepted cost of guaranteeing exactly one
/// client per key. It is never held across request forwarding.
///
/// Generic over the client type so the lock and TTL discipline can be
/// exercised without spawning subprocesses.
#[derive(Debug)]
pub struct SessionRegistry<C> {
    sessions: Mutex<HashMap<String, SessionEntry<C>>>,
}

impl<C> Default for SessionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> SessionRegistry<C> {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Return the client for `key`, constructing it on first use
    ///
    /// A hit refreshes `last_used` and returns the existing handle. On a
    /// miss, `build` runs while the lock is held, so no two concurrent
    /// callers for the same new key ever both construct a client.
    ///
    /// # Errors
    /// Propagates the builder's [`SpawnError`]; nothing is inserted on
    /// failure, so the next request for the key tries again.
    pub async fn get_or_create<F, Fut>(&self, key: &str, build: F) -> Result<Arc<C>, SpawnError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<C>, SpawnError>>,
    {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();

        if let Some(entry) = sessions.get_mut(key) {
            entry.last_used = now;
            debug!(session = %key, "reusing session client");
            return Ok(Arc::clone(&entry.client));
        }

        let client = build().await?;
        sessions.insert(
            key.to_string(),
            SessionEntry {
                client: Arc::clone(&client),
                last_used: now,
            },
        );
        info!(session = %key, sessions = sessions.len(), "created session client");
        Ok(client)
    }

    /// Remove every session idle strictly longer than `ttl`
    ///
    /// The current time is read once and the scan-and-remove happens
    /// under the lock, so a session can never be evicted mid-refresh.
    /// Returns the evicted entries; actual client teardown is the
    /// caller's job.
    pub async fn sweep(&self, ttl: Duration) -> Vec<(String, Arc<C>)> {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();

        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| entry.idle(now) > ttl)
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for key in expired {
            if let Some(entry) = sessions.remove(&key) {
                debug!(session = %key, "evicted idle session");
                removed.push((key, entry.client));
            }
        }
        removed
    }

    /// Remove and return every session (shutdown hook)
    pub async fn drain(&self) -> Vec<(String, Arc<C>)> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .drain()
            .map(|(key, entry)| (key, entry.client))
            .collect()
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
