//! Accounting of resources held by running experiments.
//!
//! Executors register everything they acquire through a [`LedgerEntry`],
//! which gives the amount back when dropped. A ledger that reads clean after
//! every run has finished proves the executors released what they took.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Kinds of resources tracked by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Heap bytes held as ballast
    MemoryBytes,
    /// Bytes written to filler files
    DiskBytes,
    /// Filler files present on disk
    TempFiles,
    /// Live stress worker threads
    WorkerThreads,
    /// Installed fault hooks
    Hooks,
}

/// Shared resource counters.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    memory_bytes: AtomicU64,
    disk_bytes: AtomicU64,
    temp_files: AtomicU64,
    worker_threads: AtomicU64,
    hooks: AtomicU64,
}

impl ResourceLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn counter(&self, kind: ResourceKind) -> &AtomicU64 {
        match kind {
            ResourceKind::MemoryBytes => &self.memory_bytes,
            ResourceKind::DiskBytes => &self.disk_bytes,
            ResourceKind::TempFiles => &self.temp_files,
            ResourceKind::WorkerThreads => &self.worker_threads,
            ResourceKind::Hooks => &self.hooks,
        }
    }

    /// Record `amount` of `kind` as held until the returned entry is dropped.
    pub fn acquire(self: &Arc<Self>, kind: ResourceKind, amount: u64) -> LedgerEntry {
        self.counter(kind).fetch_add(amount, Ordering::SeqCst);
        LedgerEntry {
            ledger: Arc::clone(self),
            kind,
            amount,
        }
    }

    pub fn held(&self, kind: ResourceKind) -> u64 {
        self.counter(kind).load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            memory_bytes: self.held(ResourceKind::MemoryBytes),
            disk_bytes: self.held(ResourceKind::DiskBytes),
            temp_files: self.held(ResourceKind::TempFiles),
            worker_threads: self.held(ResourceKind::WorkerThreads),
            hooks: self.held(ResourceKind::Hooks),
        }
    }
}

/// Point-in-time copy of the ledger counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub memory_bytes: u64,
    pub disk_bytes: u64,
    pub temp_files: u64,
    pub worker_threads: u64,
    pub hooks: u64,
}

impl LedgerSnapshot {
    /// True when nothing is held.
    pub fn is_clean(&self) -> bool {
        *self == LedgerSnapshot::default()
    }
}

/// A held amount of one resource kind, released on drop.
#[derive(Debug)]
pub struct LedgerEntry {
    ledger: Arc<ResourceLedger>,
    kind: ResourceKind,
    amount: u64,
}

impl LedgerEntry {
    /// Add to the amount held by this entry.
    pub fn grow(&mut self, amount: u64) {
        self.ledger.counter(self.kind).fetch_add(amount, Ordering::SeqCst);
        self.amount += amount;
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }
}

impl Drop for LedgerEntry {
    fn drop(&mut self) {
        self.ledger
            .counter(self.kind)
            .fetch_sub(self.amount, Ordering::SeqCst);
    }
}
