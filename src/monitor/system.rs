//! Host resource sampling.

use super::snapshot::SystemMetrics;
use crate::error::Result;
use std::path::{Path, PathBuf};
use sysinfo::{Disks, System};

/// Source of host resource readings.
pub trait SystemSampler: Send {
    fn sample(&mut self) -> Result<SystemMetrics>;
}

/// Samples the local host through `sysinfo`.
///
/// CPU usage is computed between consecutive refreshes, so the first sample
/// after construction may read low. Mounts are listed once at construction
/// and only their usage is refreshed afterwards.
pub struct SysinfoSampler {
    system: System,
    disks: Disks,
    disk_mount: PathBuf,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self::for_mount("/")
    }

    /// Report disk usage for the filesystem mounted at `mount`.
    pub fn for_mount(mount: impl AsRef<Path>) -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            disk_mount: mount.as_ref().to_path_buf(),
        }
    }

    fn disk_pct(&mut self) -> f64 {
        self.disks.refresh();
        let disk = self
            .disks
            .list()
            .iter()
            .filter(|d| self.disk_mount.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len());

        match disk {
            Some(d) if d.total_space() > 0 => {
                let used = d.total_space().saturating_sub(d.available_space());
                used as f64 / d.total_space() as f64 * 100.0
            }
            _ => 0.0,
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler for SysinfoSampler {
    fn sample(&mut self) -> Result<SystemMetrics> {
        self.system.refresh_cpu();
        self.system.refresh_memory();

        let cpu_pct = f64::from(self.system.global_cpu_info().cpu_usage());
        let total = self.system.total_memory();
        let mem_pct = if total > 0 {
            self.system.used_memory() as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let load = System::load_average();

        Ok(SystemMetrics {
            cpu_pct,
            mem_pct,
            disk_pct: self.disk_pct(),
            load_avg: [load.one, load.five, load.fifteen],
            cpu_count: self.system.cpus().len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysinfo_readings_in_range() {
        let mut sampler = SysinfoSampler::new();
        let metrics = sampler.sample().unwrap();
        assert!((0.0..=100.0).contains(&metrics.mem_pct));
        assert!((0.0..=100.0).contains(&metrics.disk_pct));
        assert!(metrics.cpu_count > 0);
    }

    #[test]
    fn test_disk_list_is_reused_across_samples() {
        let mut sampler = SysinfoSampler::new();
        let mounts = sampler.disks.list().len();
        for _ in 0..3 {
            let metrics = sampler.sample().unwrap();
            assert!((0.0..=100.0).contains(&metrics.disk_pct));
        }
        assert_eq!(sampler.disks.list().len(), mounts);
    }
}
