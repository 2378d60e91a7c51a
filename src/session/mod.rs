// ABOUTME: Session lifecycle core for the Codex bridge
// Maps session keys to subprocess clients, with identity resolution,
// a lock-disciplined registry, and TTL-based eviction.

use std::future::Future;

pub mod identity;
pub mod registry;
pub mod sweeper;

pub use identity::{
    NoSessionContext, SessionContext, SessionKeyResolver, StaticSessionContext,
    GLOBAL_SESSION_KEY,
};
pub use registry::{SessionEntry, SessionRegistry};
pub use sweeper::{spawn_sweeper, SWEEP_INTERVAL};

/// What the session layer needs from a pooled client handle
///
/// The registry and sweeper only ever hand handles out and tear them
/// down; everything else about a client is the forwarding layer's
/// business. Teardown is best-effort — a failure is reported, not fatal.
pub trait SessionClient: Send + Sync + 'static {
    /// Tear down the underlying subprocess
    fn shutdown(&self) -> impl Future<Output = std::io::Result<()>> + Send;
}

impl SessionClient for crate::transport::StdioClient {
    async fn shutdown(&self) -> std::io::Result<()> {
        self.terminate().await
    }
}
