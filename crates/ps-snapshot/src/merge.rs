//! Merging a snapshot into static configuration at startup.

use indexmap::IndexMap;
use ps_core::{SignalKey, ValueMap};
use ps_graph::TypeCatalog;
use ps_project::ProjectConfig;
use tracing::{info, warn};

use crate::types::{SnapshotRecord, StateMap};

/// Initial runtime state.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedState {
    /// Static config with snapshot values written over matching params.
    pub config: ProjectConfig,
    /// Live-table seeds restored from the snapshot, only for instances
    /// still configured.
    pub values: ValueMap,
    pub states: StateMap,
    /// Snapshot keys dropped because their instance no longer exists or
    /// their values would leave the instance with invalid params.
    pub discarded: Vec<String>,
}

/// Combine `config` with the latest snapshot.
///
/// Snapshot values override matching `instance.param` defaults; config
/// entries without a snapshot value keep their defaults; snapshot entries
/// naming instances that are gone are discarded. An instance whose
/// overridden params fail `catalog` validation keeps its static params and
/// loses those snapshot values. The result does not depend on snapshot entry
/// order, and merging the same snapshot again changes nothing.
pub fn merge(
    config: &ProjectConfig,
    snapshot: Option<&SnapshotRecord>,
    catalog: &dyn TypeCatalog,
) -> MergedState {
    let mut merged = MergedState {
        config: config.clone(),
        values: ValueMap::new(),
        states: StateMap::new(),
        discarded: Vec::new(),
    };
    let Some(snapshot) = snapshot else {
        return merged;
    };
    let mut overridden: IndexMap<String, Vec<String>> = IndexMap::new();

    for (raw, value) in &snapshot.values {
        let key = match SignalKey::parse(raw) {
            Ok(key) => key,
            Err(e) => {
                warn!(key = %raw, error = %e, "skipping malformed snapshot key");
                merged.discarded.push(raw.clone());
                continue;
            }
        };
        let Some(spec) = merged.config.instance_mut(key.instance()) else {
            merged.discarded.push(raw.clone());
            continue;
        };
        if let Some(param) = spec.params.get_mut(key.param()) {
            *param = value.clone();
            overridden
                .entry(key.instance().to_owned())
                .or_default()
                .push(raw.clone());
        }
        merged.values.insert(raw.clone(), value.clone());
    }

    for (name, keys) in overridden {
        let Some((_, original)) = config.instance(&name) else {
            continue;
        };
        let Some(spec) = merged.config.instance_mut(&name) else {
            continue;
        };
        if let Err(reason) = catalog.validate_params(&spec.type_tag, &spec.params) {
            warn!(
                instance = %name,
                reason = %reason,
                dropped = keys.len(),
                "snapshot params rejected, keeping configured values"
            );
            spec.params = original.params.clone();
            for raw in keys {
                merged.values.shift_remove(&raw);
                merged.discarded.push(raw);
            }
        }
    }

    for (name, state) in &snapshot.states {
        if merged.config.instance(name).is_some() {
            merged.states.insert(name.clone(), state.clone());
        } else {
            merged.discarded.push(name.clone());
        }
    }

    info!(
        restored = merged.values.len(),
        states = merged.states.len(),
        discarded = merged.discarded.len(),
        snapshot_cycle = snapshot.cycle,
        "snapshot merged"
    );
    merged
}
