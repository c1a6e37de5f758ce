//! Havoc CLI - Main entry point.

use havoc::chaos::{sample_definitions, ExecutorSet, ExperimentCatalog};
use havoc::cli::{Cli, Commands};
use havoc::config::humantime_serde::parse_duration;
use havoc::config::HavocConfig;
use havoc::monitor::{HealthMonitor, HttpProbe, SysinfoSampler};
use havoc::RunOptions;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    let mut config = match &cli.config {
        Some(path) => HavocConfig::from_file(path)?,
        None => HavocConfig::development(),
    };
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    config.observability.json_logs |= cli.json_logs;

    match cli.command {
        Commands::Run {
            duration,
            output,
            target,
            target_pid,
            seed,
        } => {
            if let Some(target) = target {
                config.monitor.probe_url = target;
            }
            if seed.is_some() {
                config.orchestrator.seed = seed;
            }
            let duration = duration
                .as_deref()
                .map(parse_duration)
                .transpose()
                .map_err(|e| anyhow::anyhow!("Invalid --duration: {}", e))?;

            havoc::observability::init(&config.observability)?;

            let report = havoc::run(
                config,
                RunOptions {
                    duration,
                    output,
                    target_pid,
                },
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Catalog => {
            let definitions = if config.experiments.is_empty() {
                sample_definitions()
            } else {
                config.experiments
            };
            let executors = ExecutorSet::standard(&config.orchestrator);
            let catalog = ExperimentCatalog::build(definitions, &executors)?;
            let definitions: Vec<_> = catalog.definitions().collect();
            println!("{}", serde_json::to_string_pretty(&definitions)?);
        }

        Commands::Probe { target } => {
            if let Some(target) = target {
                config.monitor.probe_url = target;
            }
            havoc::observability::init(&config.observability)?;

            let probe = Arc::new(HttpProbe::new(
                &config.monitor.probe_url,
                config.monitor.probe_timeout,
            )?);
            let monitor = HealthMonitor::new(config.monitor, probe, Box::new(SysinfoSampler::new()));
            let snapshot = monitor.sample().await;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }

        Commands::Version => {
            println!("havoc {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
