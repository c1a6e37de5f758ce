//! Memory stress: hold heap ballast until the run stops.

use super::{ExecutionReport, Executor};
use crate::chaos::ledger::{LedgerEntry, ResourceKind, ResourceLedger};
use crate::chaos::signal::RunSignal;
use crate::chaos::types::{ChaosType, Parameters};
use crate::error::{HavocError, Result};
use std::sync::Arc;
use sysinfo::System;
use tracing::{debug, warn};

const DEFAULT_TARGET_MB: u64 = 100;
const BLOCK_SIZE: usize = 1024 * 1024;
/// Blocks allocated between stop checks.
const BLOCKS_PER_CHECK: u64 = 16;

pub struct MemoryStressExecutor {
    ledger: Arc<ResourceLedger>,
    ceiling_fraction: f64,
}

/// Allocated blocks and their ledger entry. Blocks are freed before the
/// entry is released.
struct Ballast {
    blocks: Vec<Vec<u8>>,
    entry: LedgerEntry,
}

impl Ballast {
    fn mb(&self) -> u64 {
        self.blocks.len() as u64
    }
}

impl MemoryStressExecutor {
    pub fn new(ledger: Arc<ResourceLedger>, ceiling_fraction: f64) -> Self {
        Self {
            ledger,
            ceiling_fraction,
        }
    }

    fn target_mb(parameters: &Parameters) -> Result<u64> {
        let target = parameters
            .get_u64("target_mb")?
            .unwrap_or(DEFAULT_TARGET_MB);
        if target == 0 {
            return Err(HavocError::invalid_parameter("target_mb", "must be positive"));
        }
        Ok(target)
    }

    /// Largest ballast allowed right now, in MB.
    fn ceiling_mb(&self) -> u64 {
        let mut system = System::new();
        system.refresh_memory();
        let available = system.available_memory();
        ((available as f64 * self.ceiling_fraction) / BLOCK_SIZE as f64) as u64
    }
}

#[async_trait::async_trait]
impl Executor for MemoryStressExecutor {
    fn chaos_type(&self) -> ChaosType {
        ChaosType::MemoryStress
    }

    fn validate(&self, parameters: &Parameters) -> Result<()> {
        Self::target_mb(parameters).map(|_| ())
    }

    async fn run(&self, parameters: &Parameters, signal: RunSignal) -> Result<ExecutionReport> {
        let requested = Self::target_mb(parameters)?;
        let ceiling = self.ceiling_mb();
        let target = requested.min(ceiling);

        let mut ballast = Ballast {
            blocks: Vec::with_capacity(target as usize),
            entry: self.ledger.acquire(ResourceKind::MemoryBytes, 0),
        };
        let mut shortfall = None;

        while ballast.mb() < target {
            if ballast.mb() % BLOCKS_PER_CHECK == 0 {
                if let Some(cause) = signal.check() {
                    return Ok(ExecutionReport::stopped(cause));
                }
                tokio::task::yield_now().await;
            }

            let mut block = Vec::new();
            if let Err(e) = block.try_reserve_exact(BLOCK_SIZE) {
                warn!(held_mb = ballast.mb(), target_mb = target, error = %e, "Memory allocation failed");
                shortfall = Some(format!(
                    "allocated {} of {} MB: {}",
                    ballast.mb(),
                    requested,
                    HavocError::ResourceExhausted(e.to_string())
                ));
                break;
            }
            // touch every page so the memory is actually committed
            block.resize(BLOCK_SIZE, 0xA5);
            ballast.blocks.push(block);
            ballast.entry.grow(BLOCK_SIZE as u64);
        }

        if shortfall.is_none() && target < requested {
            shortfall = Some(format!(
                "capped at {} of {} MB by available memory",
                target, requested
            ));
        }
        debug!(held_mb = ballast.mb(), "Memory ballast allocated");

        let cause = signal.hold().await;
        drop(ballast);

        Ok(ExecutionReport::stopped(cause).with_shortfall(shortfall))
    }
}
