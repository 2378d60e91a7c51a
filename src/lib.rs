// ABOUTME: Library crate for the Codex bridge exposing the session core
// for embedding hosts and for integration tests

#![allow(missing_docs)]

pub mod bridge;
pub mod config;
pub mod session;
pub mod transport;

pub use bridge::CodexBridge;
pub use config::BridgeConfig;
pub use session::{
    NoSessionContext, SessionContext, SessionKeyResolver, SessionRegistry, StaticSessionContext,
};
pub use transport::{SpawnError, StdioClient, StdioClientBuilder};
