//! Error types for the runtime.

use ps_graph::{CycleReport, ValidationError};
use ps_project::ProjectError;
use ps_snapshot::SnapshotError;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Fatal or startup errors. A running scheduler that hits one stops.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Loading or validating the configuration failed.
    #[error("Configuration error: {0}")]
    Project(#[from] ProjectError),

    /// Reading the snapshot at startup failed.
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Scheduler option or period out of range.
    #[error("Invalid option: {what}")]
    InvalidOption { what: &'static str },

    /// Configured type has no registered implementation.
    #[error("Instance '{name}' has unregistered type '{type_tag}'")]
    Unregistered { name: String, type_tag: String },

    /// Too many consecutive snapshot saves failed.
    #[error("Snapshot persistence failed {failures} times in a row: {last}")]
    PersistenceFailed { failures: u32, last: String },

    /// The OS refused to start a thread.
    #[error("Failed to spawn {what} thread: {source}")]
    Spawn {
        what: &'static str,
        source: std::io::Error,
    },

    /// The scheduler thread died without a report.
    #[error("Scheduler thread panicked")]
    Panicked,
}

/// Why a diff was not applied. The running configuration is unchanged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DiffRejected {
    /// A single operation failed validation.
    #[error("Invalid diff: {0}")]
    Invalid(#[from] ValidationError),

    /// The result has a loop and no usable manual order.
    #[error("Resulting graph cannot be ordered: {0}")]
    Unresolvable(CycleReport),

    /// The result differs from the diff's full configuration.
    #[error("Resulting configuration does not match the supplied full configuration")]
    Inconsistent,

    /// An added instance has no registered implementation.
    #[error("Instance '{name}' has unregistered type '{type_tag}'")]
    Unregistered { name: String, type_tag: String },
}
