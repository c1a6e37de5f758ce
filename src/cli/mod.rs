//! Command-line interface for havoc.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Havoc - controlled failure injection with concurrent health monitoring.
#[derive(Parser)]
#[command(name = "havoc")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (JSON)
    #[arg(short, long, env = "HAVOC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "HAVOC_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run chaos experiments against the target while monitoring it
    Run {
        /// Stop after this long (e.g. "90s", "5m"); runs until Ctrl-C when absent
        #[arg(short, long)]
        duration: Option<String>,

        /// Directory for the health history, experiment log and report
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Base URL of the target service
        #[arg(short, long, env = "HAVOC_TARGET")]
        target: Option<String>,

        /// Suspend this process for service disruption experiments
        #[arg(long)]
        target_pid: Option<u32>,

        /// Seed for experiment selection
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the experiment catalog as JSON
    Catalog,

    /// Take one health sample of the target and print it as JSON
    Probe {
        /// Base URL of the target service
        #[arg(short, long, env = "HAVOC_TARGET")]
        target: Option<String>,
    },

    /// Show version information
    Version,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "havoc", "run", "--duration", "90s", "--output", "out", "--seed", "7",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                duration,
                output,
                seed,
                ..
            } => {
                assert_eq!(duration.as_deref(), Some("90s"));
                assert_eq!(output, Some(PathBuf::from("out")));
                assert_eq!(seed, Some(7));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from(["havoc", "--log-level", "debug", "catalog"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::Catalog));
    }
}
