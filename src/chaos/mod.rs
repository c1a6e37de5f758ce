//! Chaos experiment orchestration.
//!
//! Selects experiments from a catalog on a fixed cadence, runs each one
//! concurrently under a hard deadline, and guarantees every run terminates
//! and releases what it acquired.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Chaos Orchestrator                       │
//! │     tick loop  │  active-run registry  │  history log       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    Experiment Catalog                       │
//! │        definitions resolved to executors at build time      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CPU │ Memory │ Latency │ Disruption │ Disk │ Hang          │
//! ├─────────────────────────────────────────────────────────────┤
//! │   Run signal  │  Fault hooks  │  Resource ledger            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use havoc::chaos::{
//!     sample_definitions, ChaosOrchestrator, ExecutorSet, ExperimentCatalog, OrchestratorConfig,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> havoc::error::Result<()> {
//! let config = OrchestratorConfig::default();
//! let executors = ExecutorSet::standard(&config);
//! let catalog = Arc::new(ExperimentCatalog::build(sample_definitions(), &executors)?);
//!
//! let orchestrator = ChaosOrchestrator::new(config);
//! orchestrator.start(catalog, Duration::from_secs(20)).await?;
//! // ...
//! let summary = orchestrator.stop().await?;
//! println!("{} drained, {} forced", summary.drained, summary.forced);
//! # Ok(())
//! # }
//! ```

// Submodules
mod catalog;
mod config;
pub mod executor;
mod experiment;
mod hooks;
mod ledger;
mod orchestrator;
mod rng;
mod service;
mod signal;
mod types;

// Re-export configuration types
pub use config::OrchestratorConfig;

// Re-export core types
pub use types::{ChaosType, DefinitionBuilder, ExperimentDefinition, ParamValue, Parameters};

// Re-export run types
pub use experiment::{ActiveRunSnapshot, ExperimentRun, RunOutcome, RunStatus};

// Re-export catalog and executors
pub use catalog::{sample_definitions, CatalogEntry, ExperimentCatalog};
pub use executor::{ExecutionReport, Executor, ExecutorSet};

// Re-export orchestrator types
pub use orchestrator::{ChaosEvent, ChaosOrchestrator, StopSummary};

// Re-export shared fault-injection state
pub use hooks::{FaultHooks, HookGuard};
pub use ledger::{LedgerEntry, LedgerSnapshot, ResourceKind, ResourceLedger};
pub use rng::{RandomSource, ScriptedRandom, SeededRandom};
#[cfg(unix)]
pub use service::ProcessSignalService;
pub use service::{HookedService, ServiceControl};
pub use signal::{RunSignal, StopCause, MAX_POLL_INTERVAL};
