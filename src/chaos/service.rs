//! Control over the target service for disruption experiments.

use super::hooks::{FaultHooks, HookGuard};
use crate::error::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// Suspends and resumes the target service.
#[async_trait::async_trait]
pub trait ServiceControl: Send + Sync {
    /// Take the target down. Suspending an already suspended target is a no-op.
    async fn suspend(&self) -> Result<()>;

    /// Bring the target back. Resuming a running target is a no-op.
    async fn resume(&self) -> Result<()>;

    async fn is_running(&self) -> bool;
}

/// Disrupts the target by refusing calls through the fault hooks.
pub struct HookedService {
    hooks: Arc<FaultHooks>,
    disruption: Mutex<Option<HookGuard>>,
}

impl HookedService {
    pub fn new(hooks: Arc<FaultHooks>) -> Self {
        Self {
            hooks,
            disruption: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl ServiceControl for HookedService {
    async fn suspend(&self) -> Result<()> {
        let mut slot = self.disruption.lock();
        if slot.is_none() {
            *slot = Some(self.hooks.install_disruption());
        }
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.disruption.lock().take();
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.disruption.lock().is_none()
    }
}

#[cfg(unix)]
pub use self::unix::ProcessSignalService;

#[cfg(unix)]
mod unix {
    use super::ServiceControl;
    use crate::error::{HavocError, Result};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tracing::info;

    /// Freezes a local process with SIGSTOP and thaws it with SIGCONT.
    pub struct ProcessSignalService {
        pid: i32,
        stopped: AtomicBool,
    }

    impl ProcessSignalService {
        pub fn new(pid: u32) -> Result<Self> {
            let pid = i32::try_from(pid)
                .map_err(|_| HavocError::InvalidArgument(format!("pid {} out of range", pid)))?;
            if pid <= 0 {
                return Err(HavocError::InvalidArgument(format!(
                    "refusing to signal pid {}",
                    pid
                )));
            }
            Ok(Self {
                pid,
                stopped: AtomicBool::new(false),
            })
        }

        fn signal(&self, sig: libc::c_int) -> Result<()> {
            // SAFETY: kill(2) takes plain integers and has no memory effects.
            let rc = unsafe { libc::kill(self.pid, sig) };
            if rc != 0 {
                return Err(HavocError::ExecutorFault(format!(
                    "signal {} to pid {} failed: {}",
                    sig,
                    self.pid,
                    std::io::Error::last_os_error()
                )));
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl ServiceControl for ProcessSignalService {
        async fn suspend(&self) -> Result<()> {
            if !self.stopped.swap(true, Ordering::SeqCst) {
                self.signal(libc::SIGSTOP)?;
                info!(pid = self.pid, "Target process suspended");
            }
            Ok(())
        }

        async fn resume(&self) -> Result<()> {
            if self.stopped.swap(false, Ordering::SeqCst) {
                self.signal(libc::SIGCONT)?;
                info!(pid = self.pid, "Target process resumed");
            }
            Ok(())
        }

        async fn is_running(&self) -> bool {
            !self.stopped.load(Ordering::SeqCst)
        }
    }
}
