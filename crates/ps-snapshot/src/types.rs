//! Snapshot data types.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ps_core::{InternalState, ValueMap};
use serde::{Deserialize, Serialize};

/// Instance name -> opaque internal state.
pub type StateMap = IndexMap<String, InternalState>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub timestamp: DateTime<Utc>,
    /// Cycle after which the values were captured.
    pub cycle: u64,
    /// `"instance.param"` -> value.
    pub values: ValueMap,
    #[serde(default)]
    pub states: StateMap,
}

impl SnapshotRecord {
    pub fn new(cycle: u64, values: ValueMap, states: StateMap) -> Self {
        Self {
            timestamp: Utc::now(),
            cycle,
            values,
            states,
        }
    }
}
