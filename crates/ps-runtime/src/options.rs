//! Scheduler tuning.

use ps_project::LoadPolicy;
use std::path::PathBuf;

use crate::error::{RuntimeError, RuntimeResult};

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Save a snapshot every N completed cycles.
    pub snapshot_every: u64,
    /// Snapshots queued for the writer thread before new ones are skipped.
    pub snapshot_queue_depth: usize,
    /// Consecutive failed saves before persistence is declared dead.
    pub max_snapshot_failures: u32,
    /// Re-save the configuration here after every accepted diff.
    pub persist_config_to: Option<PathBuf>,
    /// How the static configuration is loaded at start.
    pub load_policy: LoadPolicy,
    /// Stop by itself after this many cycles.
    pub max_cycles: Option<u64>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            snapshot_every: 10,
            snapshot_queue_depth: 4,
            max_snapshot_failures: 3,
            persist_config_to: None,
            load_policy: LoadPolicy::Strict,
            max_cycles: None,
        }
    }
}

impl SchedulerOptions {
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.snapshot_every == 0 {
            return Err(RuntimeError::InvalidOption {
                what: "snapshot_every must be at least 1",
            });
        }
        if self.snapshot_queue_depth == 0 {
            return Err(RuntimeError::InvalidOption {
                what: "snapshot_queue_depth must be at least 1",
            });
        }
        if self.max_snapshot_failures == 0 {
            return Err(RuntimeError::InvalidOption {
                what: "max_snapshot_failures must be at least 1",
            });
        }
        Ok(())
    }
}
