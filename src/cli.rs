// ABOUTME: CLI argument parsing for codex-bridge
//
// Provides the command-line interface:
// - run: host the session core until interrupted (default)
// - check: print the effective configuration and probe a spawn

use clap::{Parser, Subcommand};

/// Session-aware bridge pooling Codex CLI subprocesses per caller session
#[derive(Parser)]
#[command(name = "codex-bridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the bridge until interrupted (default if no command given)
    Run,

    /// Print the effective configuration and probe a subprocess spawn
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_no_command() {
        let cli = Cli::parse_from(["codex-bridge"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from(["codex-bridge", "check"]);
        assert!(matches!(cli.command, Some(Commands::Check)));

        let cli = Cli::parse_from(["codex-bridge", "run"]);
        assert!(matches!(cli.command, Some(Commands::Run)));
    }
}
