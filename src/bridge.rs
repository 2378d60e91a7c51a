// ABOUTME: Bridge context and per-request dispatch policy
// Owns the registry, resolver, builder, and sweeper; decides per request
// whether to build fresh (single-shot / no-reuse) or go through the pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::session::{spawn_sweeper, SessionContext, SessionKeyResolver, SessionRegistry};
use crate::transport::{SpawnError, StdioClient, StdioClientBuilder};

/// The bridge's session core, constructed once at process start
///
/// `acquire_client` is the single entry point the forwarding layer uses
/// to obtain a subprocess-backed client for the current request. All
/// process-wide mutable state (session map, anonymous-key counter) lives
/// here rather than in globals, and `shutdown` is the explicit teardown
/// hook that drains every pooled session.
pub struct CodexBridge {
    config: BridgeConfig,
    builder: StdioClientBuilder,
    resolver: SessionKeyResolver,
    registry: Arc<SessionRegistry<StdioClient>>,
    shutdown: Arc<AtomicBool>,
    sweeper: Option<JoinHandle<()>>,
    started: bool,
}

impl std::fmt::Debug for CodexBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodexBridge")
            .field("config", &self.config)
            .field("started", &self.started)
            .finish()
    }
}

impl CodexBridge {
    /// Build the bridge from a configuration snapshot
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        let builder = StdioClientBuilder::from_config(&config);
        let resolver = SessionKeyResolver::new(config.allow_global_fallback);

        Self {
            config,
            builder,
            resolver,
            registry: Arc::new(SessionRegistry::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            sweeper: None,
            started: false,
        }
    }

    /// The configuration this bridge was built from
    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Start background work
    ///
    /// Spawns the eviction sweeper when pooled-session mode is active.
    /// Single-shot and non-reuse modes never accumulate registry entries,
    /// so no sweeper is started for them. Calling `start` twice is a
    /// no-op.
    pub fn start(&mut self) {
        if self.started {
            debug!("bridge already started");
            return;
        }
        self.started = true;

        if self.config.pooled() {
            info!(
                ttl_secs = self.config.session_ttl.as_secs(),
                "pooled-session mode active, starting sweeper"
            );
            self.sweeper = Some(spawn_sweeper(
                Arc::clone(&self.registry),
                self.config.session_ttl,
                Arc::clone(&self.shutdown),
            ));
        } else {
            info!(
                single_shot = self.config.single_shot,
                "session pooling inactive, sweeper not started"
            );
        }
    }

    /// Obtain a client for the current request
    ///
    /// Decision order: single-shot mode always builds a fresh client and
    /// never consults the registry; without the reuse flag a fresh client
    /// is built as well (pooling is opt-in); otherwise the session key is
    /// resolved and the registry returns the shared handle, creating it
    /// on first use.
    ///
    /// # Errors
    /// A [`SpawnError`] fails only the request that triggered
    /// construction; the next request simply tries again.
    pub async fn acquire_client(
        &self,
        ctx: &dyn SessionContext,
    ) -> Result<Arc<StdioClient>, SpawnError> {
        if self.config.single_shot {
            debug!("single-shot mode, building isolated client");
            return self.builder.build().await.map(Arc::new);
        }

        if !self.config.reuse_sessions {
            debug!("session reuse disabled, building isolated client");
            return self.builder.build().await.map(Arc::new);
        }

        let key = self.resolver.resolve(ctx);
        let builder = &self.builder;
        self.registry
            .get_or_create(&key, move || async move {
                builder.build().await.map(Arc::new)
            })
            .await
    }

    /// Number of live pooled sessions
    pub async fn session_count(&self) -> usize {
        self.registry.len().await
    }

    /// Stop the sweeper and drain every pooled session
    ///
    /// Each drained client is explicitly terminated; failures are logged
    /// and do not interrupt the drain.
    pub async fn shutdown(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }

        let drained = self.registry.drain().await;
        if !drained.is_empty() {
            info!(count = drained.len(), "draining pooled sessions");
        }
        for (key, client) in drained {
            if let Err(e) = client.terminate().await {
                warn!(session = %key, error = %e, "failed to terminate drained client");
            }
        }

        info!("bridge shutdown complete");
    }
}
