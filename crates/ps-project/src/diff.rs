//! Incremental configuration changes.

use ps_core::ValueMap;
use ps_graph::{Connection, InstanceKind, ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::schema::ProjectConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedInstance {
    pub name: String,
    pub kind: InstanceKind,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub params: ValueMap,
}

/// Params merged into an existing instance; omitted keys are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiedInstance {
    pub name: String,
    pub params: ValueMap,
}

/// What a diff does to the manual execution order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderChange {
    #[default]
    Keep,
    Set(Vec<String>),
    Clear,
}

/// A configuration change, applied at most once and all-or-nothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Diff {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<AddedInstance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modified: Vec<ModifiedInstance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added_connections: Vec<Connection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_connections: Vec<Connection>,
    #[serde(default)]
    pub cycle_time_changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_cycle_time_s: Option<f64>,
    #[serde(default)]
    pub execution_order: OrderChange,
    /// Expected configuration after the diff, checked after applying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_config: Option<ProjectConfig>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
            && self.added_connections.is_empty()
            && self.removed_connections.is_empty()
            && !self.cycle_time_changed
            && self.execution_order == OrderChange::Keep
    }

    /// Shape checks that need no store.
    pub fn check_shape(&self) -> ValidationResult<()> {
        if self.cycle_time_changed != self.new_cycle_time_s.is_some() {
            return Err(ValidationError::MalformedDiff {
                reason: "cycle_time_changed and new_cycle_time_s must be set together".into(),
            });
        }
        let mut seen = HashSet::new();
        for add in &self.added {
            if !seen.insert(add.name.as_str()) {
                return Err(ValidationError::MalformedDiff {
                    reason: format!("instance '{}' added twice", add.name),
                });
            }
        }
        let removed: HashSet<&str> = self.removed.iter().map(String::as_str).collect();
        for m in &self.modified {
            if removed.contains(m.name.as_str()) {
                return Err(ValidationError::MalformedDiff {
                    reason: format!("instance '{}' is both removed and modified", m.name),
                });
            }
        }
        Ok(())
    }

    /// Builder-style helpers.
    pub fn add_instance(
        mut self,
        name: &str,
        kind: InstanceKind,
        type_tag: &str,
        params: ValueMap,
    ) -> Self {
        self.added.push(AddedInstance {
            name: name.to_string(),
            kind,
            type_tag: type_tag.to_string(),
            params,
        });
        self
    }

    pub fn remove_instance(mut self, name: &str) -> Self {
        self.removed.push(name.to_string());
        self
    }

    pub fn modify(mut self, name: &str, params: ValueMap) -> Self {
        self.modified.push(ModifiedInstance {
            name: name.to_string(),
            params,
        });
        self
    }

    pub fn connect(mut self, from: &str, to: &str) -> Self {
        self.added_connections.push(Connection::new(from, to));
        self
    }

    pub fn disconnect(mut self, from: &str, to: &str) -> Self {
        self.removed_connections.push(Connection::new(from, to));
        self
    }

    pub fn with_cycle_time(mut self, cycle_time_s: f64) -> Self {
        self.cycle_time_changed = true;
        self.new_cycle_time_s = Some(cycle_time_s);
        self
    }

    pub fn with_order(mut self, order: &[&str]) -> Self {
        self.execution_order = OrderChange::Set(order.iter().map(|s| s.to_string()).collect());
        self
    }
}

/// Compute the diff that turns `old` into `new`.
///
/// An instance whose kind or type changes, or whose params lose a key, is
/// removed and re-added (its internal state restarts). Otherwise differing
/// params become a modification carrying the full new params.
pub fn analyze_config_diff(old: &ProjectConfig, new: &ProjectConfig) -> Diff {
    let mut diff = Diff::default();

    for (kind, name, spec) in old.instances() {
        let replaced = match new.instance(name) {
            None => true,
            Some((new_kind, new_spec)) => {
                new_kind != kind
                    || new_spec.type_tag != spec.type_tag
                    || spec.params.keys().any(|k| !new_spec.params.contains_key(k))
            }
        };
        if replaced {
            diff.removed.push(name.to_string());
        }
    }

    for (kind, name, spec) in new.instances() {
        let is_added = old.instance(name).is_none() || diff.removed.iter().any(|r| r == name);
        if is_added {
            diff.added.push(AddedInstance {
                name: name.to_string(),
                kind,
                type_tag: spec.type_tag.clone(),
                params: spec.params.clone(),
            });
        } else if let Some((_, old_spec)) = old.instance(name) {
            if old_spec.params != spec.params {
                diff.modified.push(ModifiedInstance {
                    name: name.to_string(),
                    params: spec.params.clone(),
                });
            }
        }
    }

    let old_conns: HashSet<&Connection> = old.connections.iter().collect();
    let new_conns: HashSet<&Connection> = new.connections.iter().collect();
    diff.removed_connections = old
        .connections
        .iter()
        .filter(|c| !new_conns.contains(c))
        .cloned()
        .collect();
    diff.added_connections = new
        .connections
        .iter()
        .filter(|c| !old_conns.contains(c))
        .cloned()
        .collect();

    // Connections that survive but touch a re-added instance were cascaded
    // away by its removal and must be re-added.
    for conn in &new.connections {
        if old_conns.contains(conn) && diff.removed.iter().any(|r| conn.touches(r)) {
            diff.added_connections.push(conn.clone());
        }
    }

    if old.cycle_time_s != new.cycle_time_s {
        diff.cycle_time_changed = true;
        diff.new_cycle_time_s = Some(new.cycle_time_s);
    }

    diff.execution_order = match (&old.execution_order, &new.execution_order) {
        (a, b) if a == b => OrderChange::Keep,
        (_, Some(order)) => OrderChange::Set(order.clone()),
        (Some(_), None) => OrderChange::Clear,
        (None, None) => OrderChange::Keep,
    };

    diff.full_config = Some(new.clone());
    diff
}
