//! Disk pressure: write a filler file, delete it when the run stops.

use super::{ExecutionReport, Executor};
use crate::chaos::ledger::{LedgerEntry, ResourceKind, ResourceLedger};
use crate::chaos::signal::RunSignal;
use crate::chaos::types::{ChaosType, Parameters};
use crate::error::{HavocError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const DEFAULT_TARGET_MB: u64 = 10;
const CHUNK_SIZE: usize = 1024 * 1024;

pub struct DiskPressureExecutor {
    scratch_dir: PathBuf,
    ledger: Arc<ResourceLedger>,
}

/// The filler file and its ledger entries. The file is removed before the
/// entries are released.
struct Filler {
    file: NamedTempFile,
    bytes: LedgerEntry,
    _count: LedgerEntry,
}

impl DiskPressureExecutor {
    pub fn new(scratch_dir: PathBuf, ledger: Arc<ResourceLedger>) -> Self {
        Self {
            scratch_dir,
            ledger,
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
}

#[async_trait::async_trait]
impl Executor for DiskPressureExecutor {
    fn chaos_type(&self) -> ChaosType {
        ChaosType::DiskPressure
    }

    fn validate(&self, parameters: &Parameters) -> Result<()> {
        Self::target_mb(parameters)?;
        parameters.get_path("path")?;
        Ok(())
    }

    async fn run(&self, parameters: &Parameters, signal: RunSignal) -> Result<ExecutionReport> {
        let target = Self::target_mb(parameters)?;
        let dir = parameters
            .get_path("path")?
            .unwrap_or_else(|| self.scratch_dir.clone());

        let file = tempfile::Builder::new()
            .prefix("havoc-fill-")
            .tempfile_in(&dir)?;
        let mut filler = Filler {
            _count: self.ledger.acquire(ResourceKind::TempFiles, 1),
            bytes: self.ledger.acquire(ResourceKind::DiskBytes, 0),
            file,
        };
        debug!(path = %filler.file.path().display(), target_mb = target, "Filler file created");

        let mut writer = tokio::fs::File::from_std(filler.file.reopen()?);
        let chunk = vec![0u8; CHUNK_SIZE];
        let mut written_mb = 0u64;
        let mut shortfall = None;

        while written_mb < target {
            if let Some(cause) = signal.check() {
                return Ok(ExecutionReport::stopped(cause));
            }
            match writer.write_all(&chunk).await {
                Ok(()) => {
                    written_mb += 1;
                    filler.bytes.grow(CHUNK_SIZE as u64);
                }
                Err(e) => {
                    warn!(written_mb, target_mb = target, error = %e, "Filler write failed");
                    shortfall = Some(format!(
                        "wrote {} of {} MB: {}",
                        written_mb,
                        target,
                        HavocError::ResourceExhausted(e.to_string())
                    ));
                    break;
                }
            }
        }
        if let Err(e) = writer.flush().await {
            warn!(error = %e, "Filler flush failed");
        }

        let cause = signal.hold().await;
        drop(writer);
        drop(filler);

        Ok(ExecutionReport::stopped(cause).with_shortfall(shortfall))
    }
}
