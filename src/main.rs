// ABOUTME: Main entry point for codex-bridge
//
// Binary: codex-bridge
// Usage: codex-bridge [COMMAND]
// - No command / run: host the session core until interrupted
// - check: print effective config and probe a subprocess spawn
//
// Protocol forwarding is mounted by the embedding host; this binary
// owns configuration, logging, and the session core's lifecycle.

#![allow(missing_docs)]

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

mod cli;

use codex_bridge::{BridgeConfig, CodexBridge, StdioClientBuilder};

#[tokio::main]
async fn main() -> Result<()> {
    let config = BridgeConfig::from_env();
    setup_logging(&config)?;

    let args = cli::Cli::parse();
    match args.command.unwrap_or(cli::Commands::Run) {
        cli::Commands::Run => run(config).await,
        cli::Commands::Check => check(config).await,
    }
}

/// Host the session core until ctrl-c, then drain gracefully
async fn run(config: BridgeConfig) -> Result<()> {
    let mut bridge = CodexBridge::new(config);
    bridge.start();

    info!(
        pooled = bridge.config().pooled(),
        single_shot = bridge.config().single_shot,
        "codex bridge ready, press ctrl-c to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("interrupt received, shutting down");
    bridge.shutdown().await;
    Ok(())
}

/// Print the effective configuration and probe one spawn
async fn check(config: BridgeConfig) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("Failed to render configuration")?
    );

    let builder = StdioClientBuilder::from_config(&config);
    let client = builder
        .build()
        .await
        .context("Spawn probe failed; check CODEX_COMMAND and PATH")?;

    println!("spawn ok: pid {}", client.pid());
    client.terminate().await.context("Failed to reap probe")?;
    Ok(())
}

fn setup_logging(config: &BridgeConfig) -> Result<()> {
    use std::fs::OpenOptions;
    use tracing_subscriber::prelude::*;

    let filter = tracing_subscriber::EnvFilter::new(&config.log_filter);

    // Human-readable logs go to stderr; stdout stays free for protocol
    // traffic when a forwarding layer is mounted.
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    // Optional JSONL file sink for long-lived deployments
    let file_layer = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log dir {}", dir.display()))?;

            let log_file = dir.join(format!(
                "codex-bridge-{}.jsonl",
                chrono::Local::now().format("%Y%m%d-%H%M%S")
            ));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .with_context(|| format!("Failed to create log file {}", log_file.display()))?;

            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(file)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(filter)
        .init();

    Ok(())
}
