//! ps-snapshot: crash-recovery snapshots of live values and internal state.

pub mod merge;
pub mod store;
pub mod types;

pub use merge::{MergedState, merge};
pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotManager, SnapshotStore};
pub use types::*;

pub type SnapshotResult<T> = Result<T, SnapshotError>;

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid snapshot path: {message}")]
    InvalidPath { message: String },

    #[error("Snapshot store unavailable: {message}")]
    Unavailable { message: String },
}
