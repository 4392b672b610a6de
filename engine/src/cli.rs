//! CLI interface for the arena harness
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for running evaluations.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Arena evaluation harness
///
/// Drives scripted missions inside the simulator, asks a reasoning service
/// for the agent's actions and scores the result against each mission's goals.
#[derive(Parser, Debug)]
#[command(name = "arena")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate every mission in a catalog file
    Run {
        /// Mission catalog (JSON list of missions)
        #[arg(long, value_name = "FILE")]
        missions: PathBuf,

        /// Session id prefix, overriding the configured one
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Parse and compile a mission catalog without touching the simulator
    Validate {
        /// Mission catalog (JSON list of missions)
        #[arg(long, value_name = "FILE")]
        missions: PathBuf,
    },

    /// Check that the reasoning service is reachable
    Healthcheck,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_globals() {
        let cli = Cli::parse_from([
            "arena",
            "--log",
            "debug",
            "run",
            "--missions",
            "missions.json",
            "--prefix",
            "Eval",
        ]);
        assert_eq!(cli.log.as_deref(), Some("debug"));
        match cli.command {
            Command::Run { missions, prefix } => {
                assert_eq!(missions, PathBuf::from("missions.json"));
                assert_eq!(prefix.as_deref(), Some("Eval"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_validate_requires_missions() {
        assert!(Cli::try_parse_from(["arena", "validate"]).is_err());
    }
}
