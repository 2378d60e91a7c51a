// ABOUTME: Session identity resolution
// Derives a stable session key from the ambient request context, or
// synthesizes one ("global" sentinel or monotonic anon-<n>) without it.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Sentinel key shared by all identity-less requests when global
/// fallback is enabled.
pub const GLOBAL_SESSION_KEY: &str = "global";

/// Prefix for synthesized anonymous session keys.
pub const ANON_KEY_PREFIX: &str = "anon-";

/// Read-only capability: "session identifier of the current request"
///
/// Provided by the host. Implementations must swallow any failure to
/// read the ambient context and report it as `None`; absence of identity
/// is never an error at this boundary.
pub trait SessionContext: Send + Sync {
    /// The current session identifier, if one exists
    fn session_id(&self) -> Option<String>;
}

/// Models a request with no ambient context at all
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSessionContext;

impl SessionContext for NoSessionContext {
    fn session_id(&self) -> Option<String> {
        None
    }
}

/// Context with a fixed, known identity
#[derive(Debug, Clone)]
pub struct StaticSessionContext {
    id: String,
}

impl StaticSessionContext {
    /// Wrap a known session identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl SessionContext for StaticSessionContext {
    fn session_id(&self) -> Option<String> {
        Some(self.id.clone())
    }
}

/// Resolves the session key for one inbound request
///
/// A present, non-empty identifier is returned verbatim. Without one:
/// the `"global"` sentinel when fallback is enabled (logged at WARN,
/// since unrelated callers then share a client), otherwise a fresh
/// `anon-<n>` key from a process-wide monotonic counter. Anonymous keys
/// are never reused, so each such request gets its own client.
#[derive(Debug)]
pub struct SessionKeyResolver {
    allow_global_fallback: bool,
    anon_counter: AtomicU64,
}

impl SessionKeyResolver {
    /// Create a resolver
    #[must_use]
    pub const fn new(allow_global_fallback: bool) -> Self {
        Self {
            allow_global_fallback,
            anon_counter: AtomicU64::new(0),
        }
    }

    /// Resolve the session key for the current request
    pub fn resolve(&self, ctx: &dyn SessionContext) -> String {
        if let Some(id) = ctx.session_id() {
            if !id.is_empty() {
                return id;
            }
        }

        if self.allow_global_fallback {
            warn!(
                session = GLOBAL_SESSION_KEY,
                "no session identity; falling back to shared global session"
            );
            return GLOBAL_SESSION_KEY.to_string();
        }

        let n = self.anon_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let key = format!("{ANON_KEY_PREFIX}{n}");
        debug!(session = %key, "no session identity; synthesized anonymous key");
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_context_id_returned_verbatim() {
        let resolver = SessionKeyResolver::new(false);
        let ctx = StaticSessionContext::new("mcp-abc123");
        assert_eq!(resolver.resolve(&ctx), "mcp-abc123");
    }

    #[test]
    fn test_empty_id_treated_as_missing() {
        let resolver = SessionKeyResolver::new(false);
        let ctx = StaticSessionContext::new("");
        assert_eq!(resolver.resolve(&ctx), "anon-1");
    }

    #[test]
    fn test_global_fallback() {
        let resolver = SessionKeyResolver::new(true);
        assert_eq!(resolver.resolve(&NoSessionContext), "global");
        assert_eq!(resolver.resolve(&NoSessionContext), "global");
    }

    #[test]
    fn test_anonymous_keys_monotonic() {
        let resolver = SessionKeyResolver::new(false);
        assert_eq!(resolver.resolve(&NoSessionContext), "anon-1");
        assert_eq!(resolver.resolve(&NoSessionContext), "anon-2");
        assert_eq!(resolver.resolve(&NoSessionContext), "anon-3");
    }

    #[test]
    fn test_identity_beats_fallback() {
        let resolver = SessionKeyResolver::new(true);
        let ctx = StaticSessionContext::new("real-session");
        assert_eq!(resolver.resolve(&ctx), "real-session");
    }

    #[tokio::test]
    async fn test_anonymous_keys_unique_under_concurrency() {
        let resolver = Arc::new(SessionKeyResolver::new(false));
        let mut handles = Vec::new();

        for _ in 0..32 {
            let resolver = Arc::clone(&resolver);
            handles.push(tokio::spawn(async move {
                resolver.resolve(&NoSessionContext)
            }));
        }

        let mut keys = HashSet::new();
        for handle in handles {
            keys.insert(handle.await.unwrap());
        }

        assert_eq!(keys.len(), 32);
        for n in 1..=32 {
            assert!(keys.contains(&format!("anon-{n}")));
        }
    }
}
