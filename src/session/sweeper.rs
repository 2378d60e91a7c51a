// ABOUTME: Background eviction sweeper
// Periodically sweeps the session registry and tears down evicted
// clients; best-effort, one bad entry never stops the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::registry::SessionRegistry;
use super::SessionClient;

/// Fixed pause between sweep cycles.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the eviction loop
///
/// Runs until `shutdown` is set. Each cycle calls
/// [`SessionRegistry::sweep`] and explicitly terminates every evicted
/// client; a failed teardown is logged and the rest of the cycle
/// continues. Callers start this only in pooled-session mode — other
/// modes never insert into the registry, so the task would idle forever.
pub fn spawn_sweeper<C>(
    registry: Arc<SessionRegistry<C>>,
    ttl: Duration,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()>
where
    C: SessionClient,
{
    tokio::spawn(async move {
        debug!(ttl_secs = ttl.as_secs(), "session sweeper started");
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        // The first tick of a tokio interval completes immediately;
        // consume it so the first sweep happens one full interval in.
        interval.tick().await;

        loop {
            interval.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            let evicted = registry.sweep(ttl).await;
            if evicted.is_empty() {
                continue;
            }

            info!(count = evicted.len(), "sweep evicted idle sessions");
            for (key, client) in evicted {
                if let Err(e) = client.shutdown().await {
                    warn!(session = %key, error = %e, "failed to tear down evicted client");
                }
            }
        }

        debug!("session sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Default)]
    struct StubClient {
        shutdowns: AtomicUsize,
        fail: bool,
    }

    impl SessionClient for StubClient {
        async fn shutdown(&self) -> std::io::Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
            } else {
                Ok(())
            }
        }
    }

    async fn insert(registry: &SessionRegistry<StubClient>, key: &str, client: StubClient) {
        registry
            .get_or_create(key, || async move { Ok(Arc::new(client)) })
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_and_tears_down() {
        let registry = Arc::new(SessionRegistry::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let client = registry
            .get_or_create("stale", || async { Ok(Arc::new(StubClient::default())) })
            .await
            .unwrap();

        let handle = spawn_sweeper(Arc::clone(&registry), Duration::from_secs(30), Arc::clone(&shutdown));

        // One interval is enough once the entry is older than the TTL
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(registry.is_empty().await);
        assert_eq!(client.shutdowns.load(Ordering::SeqCst), 1);

        shutdown.store(true, Ordering::SeqCst);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_survives_teardown_failure() {
        let registry = Arc::new(SessionRegistry::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        insert(
            &registry,
            "bad",
            StubClient {
                fail: true,
                ..StubClient::default()
            },
        )
        .await;
        insert(&registry, "good", StubClient::default()).await;

        let handle = spawn_sweeper(Arc::clone(&registry), Duration::from_secs(30), Arc::clone(&shutdown));

        // Both entries are evicted in the same cycle even though one
        // teardown errors.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(registry.is_empty().await);

        // The loop is still alive: a newly stale entry is evicted on a
        // later cycle.
        insert(&registry, "later", StubClient::default()).await;
        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(registry.is_empty().await);

        shutdown.store(true, Ordering::SeqCst);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_spares_fresh_entries() {
        let registry = Arc::new(SessionRegistry::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        insert(&registry, "fresh", StubClient::default()).await;

        let handle = spawn_sweeper(
            Arc::clone(&registry),
            Duration::from_secs(3600),
            Arc::clone(&shutdown),
        );

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(registry.len().await, 1);

        shutdown.store(true, Ordering::SeqCst);
        handle.abort();
    }
}
