//! Configuration schema definitions.

use indexmap::IndexMap;
use ps_core::ValueMap;
use ps_graph::{Connection, GraphStore, InstanceKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const LATEST_VERSION: u32 = 1;
pub const DEFAULT_CYCLE_TIME_S: f64 = 0.5;

fn default_version() -> u32 {
    LATEST_VERSION
}

fn default_cycle_time() -> f64 {
    DEFAULT_CYCLE_TIME_S
}

/// Static controller configuration.
///
/// Declaration order is `models` in file order, then `algorithms` in file
/// order; it is the tie-break for automatic ordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_cycle_time")]
    pub cycle_time_s: f64,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub models: IndexMap<String, InstanceSpec>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub algorithms: IndexMap<String, InstanceSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_order: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceSpec {
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub params: ValueMap,
}

impl InstanceSpec {
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            params: ValueMap::new(),
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            version: LATEST_VERSION,
            cycle_time_s: DEFAULT_CYCLE_TIME_S,
            models: IndexMap::new(),
            algorithms: IndexMap::new(),
            connections: Vec::new(),
            execution_order: None,
        }
    }
}

impl ProjectConfig {
    /// All instances in declaration order.
    pub fn instances(&self) -> impl Iterator<Item = (InstanceKind, &str, &InstanceSpec)> {
        let models = self
            .models
            .iter()
            .map(|(n, s)| (InstanceKind::Model, n.as_str(), s));
        let algorithms = self
            .algorithms
            .iter()
            .map(|(n, s)| (InstanceKind::Algorithm, n.as_str(), s));
        models.chain(algorithms)
    }

    pub fn instance(&self, name: &str) -> Option<(InstanceKind, &InstanceSpec)> {
        self.models
            .get(name)
            .map(|s| (InstanceKind::Model, s))
            .or_else(|| self.algorithms.get(name).map(|s| (InstanceKind::Algorithm, s)))
    }

    pub fn instance_mut(&mut self, name: &str) -> Option<&mut InstanceSpec> {
        if self.models.contains_key(name) {
            self.models.get_mut(name)
        } else {
            self.algorithms.get_mut(name)
        }
    }

    pub fn instance_count(&self) -> usize {
        self.models.len() + self.algorithms.len()
    }

    /// Snapshot the live store back into file form.
    pub fn from_store(store: &GraphStore) -> Self {
        let mut config = ProjectConfig {
            cycle_time_s: store.cycle_time_s(),
            connections: store.connections().to_vec(),
            execution_order: store.manual_order().map(<[String]>::to_vec),
            ..Self::default()
        };
        for def in store.instances() {
            let spec = InstanceSpec {
                type_tag: def.type_tag.clone(),
                params: def.params.clone(),
            };
            match def.kind {
                InstanceKind::Model => config.models.insert(def.name.clone(), spec),
                InstanceKind::Algorithm => config.algorithms.insert(def.name.clone(), spec),
            };
        }
        config
    }

    /// Same instances, connections, period and manual order, ignoring
    /// declaration and connection order.
    pub fn equivalent(&self, other: &ProjectConfig) -> bool {
        if self.cycle_time_s != other.cycle_time_s
            || self.execution_order != other.execution_order
            || self.instance_count() != other.instance_count()
            || self.connections.len() != other.connections.len()
        {
            return false;
        }
        let same_instances = self
            .instances()
            .all(|(kind, name, spec)| other.instance(name) == Some((kind, spec)));
        let mine: HashSet<&Connection> = self.connections.iter().collect();
        same_instances && other.connections.iter().all(|c| mine.contains(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_core::Value;

    const SAMPLE: &str = r#"
cycle_time_s: 0.25
models:
  valve1:
    type: valve
    params: { full_travel_time: 5 }
  tank1:
    type: cylindrical_tank
algorithms:
  pid1:
    type: pid
    params: { kp: 12, sv: 1.2 }
connections:
  - { from: pid1.mv, to: valve1.target_opening }
execution_order: [pid1, valve1, tank1]
"#;

    #[test]
    fn parses_with_defaults() {
        let cfg: ProjectConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.version, LATEST_VERSION);
        assert_eq!(cfg.cycle_time_s, 0.25);
        let names: Vec<&str> = cfg.instances().map(|(_, n, _)| n).collect();
        assert_eq!(names, ["valve1", "tank1", "pid1"]);
        let (kind, pid) = cfg.instance("pid1").unwrap();
        assert_eq!(kind, InstanceKind::Algorithm);
        assert_eq!(pid.params.get("sv"), Some(&Value::Float(1.2)));
        assert_eq!(pid.params.get("kp"), Some(&Value::Int(12)));
        assert!(cfg.models["tank1"].params.is_empty());
    }

    #[test]
    fn empty_document_is_default() {
        let cfg: ProjectConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, ProjectConfig::default());
    }

    #[test]
    fn equivalent_ignores_order() {
        let a: ProjectConfig = serde_yaml::from_str(SAMPLE).unwrap();
        let mut b = a.clone();
        b.connections.reverse();
        let valve = b.models.shift_remove("valve1").unwrap();
        b.models.insert("valve1".into(), valve);
        assert!(a.equivalent(&b));

        b.instance_mut("pid1")
            .unwrap()
            .params
            .insert("kp".into(), Value::Int(1));
        assert!(!a.equivalent(&b));
    }
}
