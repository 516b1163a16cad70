//! The configuration store: instances, connections, cycle period.

use indexmap::IndexMap;
use ps_core::{SignalKey, ValueMap};
use serde::{Deserialize, Serialize};

use crate::error::{GraphResult, ValidationError, ValidationResult};
use crate::resolver::{self, ExecutionOrder};

/// Namespace an instance was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceKind {
    /// Physical process model (valve, tank).
    Model,
    /// Control algorithm (PID).
    Algorithm,
}

/// One configured instance.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceDef {
    pub name: String,
    pub kind: InstanceKind,
    /// Selects the registered implementation.
    pub type_tag: String,
    pub params: ValueMap,
}

/// Directed signal link: `from` is copied into `to` before the consumer runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
}

impl Connection {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn source(&self) -> ValidationResult<SignalKey> {
        endpoint(&self.from)
    }

    pub fn target(&self) -> ValidationResult<SignalKey> {
        endpoint(&self.to)
    }

    /// Instance part of `from`, if well formed.
    pub fn producer(&self) -> Option<&str> {
        instance_part(&self.from)
    }

    /// Instance part of `to`, if well formed.
    pub fn consumer(&self) -> Option<&str> {
        instance_part(&self.to)
    }

    /// True if either endpoint names `instance`.
    pub fn touches(&self, instance: &str) -> bool {
        self.producer() == Some(instance) || self.consumer() == Some(instance)
    }
}

fn instance_part(raw: &str) -> Option<&str> {
    match raw.split_once('.') {
        Some((inst, param)) if !inst.is_empty() && !param.is_empty() => Some(inst),
        _ => None,
    }
}

pub(crate) fn endpoint(raw: &str) -> ValidationResult<SignalKey> {
    SignalKey::parse(raw).map_err(|_| ValidationError::MalformedKey {
        key: raw.to_string(),
    })
}

/// Current configuration graph.
///
/// Read access is public; mutation goes through [`crate::OnlineMutator`].
/// The resolved execution order is cached and recomputed lazily after any
/// mutation marks the store dirty.
#[derive(Debug, Clone)]
pub struct GraphStore {
    instances: IndexMap<String, InstanceDef>,
    connections: Vec<Connection>,
    cycle_time_s: f64,
    manual_order: Option<Vec<String>>,
    cached_order: Option<ExecutionOrder>,
    dirty: bool,
}

impl GraphStore {
    pub fn new(cycle_time_s: f64) -> ValidationResult<Self> {
        check_cycle_time(cycle_time_s)?;
        Ok(Self {
            instances: IndexMap::new(),
            connections: Vec::new(),
            cycle_time_s,
            manual_order: None,
            cached_order: None,
            dirty: true,
        })
    }

    pub fn instances(&self) -> impl Iterator<Item = &InstanceDef> {
        self.instances.values()
    }

    /// Instance names in declaration order.
    pub fn instance_names(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    pub fn instance(&self, name: &str) -> Option<&InstanceDef> {
        self.instances.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn has_connection(&self, from: &str, to: &str) -> bool {
        self.connections.iter().any(|c| c.from == from && c.to == to)
    }

    /// Connections whose `to` endpoint belongs to `instance`.
    pub fn inbound(&self, instance: &str) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |c| c.consumer() == Some(instance))
    }

    pub fn cycle_time_s(&self) -> f64 {
        self.cycle_time_s
    }

    pub fn manual_order(&self) -> Option<&[String]> {
        self.manual_order.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Resolve (or return the cached) execution order.
    pub fn execution_order(&mut self) -> GraphResult<&ExecutionOrder> {
        let order = match self.cached_order.take() {
            Some(order) if !self.dirty => order,
            _ => self.resolve_order()?,
        };
        self.dirty = false;
        Ok(self.cached_order.insert(order))
    }

    /// Resolve the execution order without touching the cache.
    pub fn resolve_order(&self) -> GraphResult<ExecutionOrder> {
        let graph = resolver::build_graph(self.instance_names(), &self.connections)?;
        resolver::resolve(&graph, self.manual_order.as_deref())
    }

    fn invalidate(&mut self) {
        self.dirty = true;
        self.cached_order = None;
    }

    pub(crate) fn insert_instance(&mut self, def: InstanceDef) {
        self.instances.insert(def.name.clone(), def);
        self.invalidate();
    }

    pub(crate) fn instance_mut(&mut self, name: &str) -> Option<&mut InstanceDef> {
        if self.instances.contains_key(name) {
            self.invalidate();
        }
        self.instances.get_mut(name)
    }

    pub(crate) fn take_instance(&mut self, name: &str) -> Option<InstanceDef> {
        let removed = self.instances.shift_remove(name);
        if removed.is_some() {
            self.invalidate();
        }
        removed
    }

    pub(crate) fn push_connection(&mut self, conn: Connection) {
        self.connections.push(conn);
        self.invalidate();
    }

    /// Remove every connection matching `pred`, returning what was removed.
    pub(crate) fn drain_connections(
        &mut self,
        mut pred: impl FnMut(&Connection) -> bool,
    ) -> Vec<Connection> {
        let (removed, kept): (Vec<_>, Vec<_>) = self.connections.drain(..).partition(|c| pred(c));
        self.connections = kept;
        if !removed.is_empty() {
            self.invalidate();
        }
        removed
    }

    pub(crate) fn set_manual_order(&mut self, order: Option<Vec<String>>) {
        self.manual_order = order;
        self.invalidate();
    }

    pub(crate) fn set_cycle_time(&mut self, value: f64) -> ValidationResult<()> {
        check_cycle_time(value)?;
        self.cycle_time_s = value;
        self.invalidate();
        Ok(())
    }
}

fn check_cycle_time(value: f64) -> ValidationResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidCycleTime { value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_endpoints() {
        let c = Connection::new("pid1.mv", "valve1.target_opening");
        assert_eq!(c.producer(), Some("pid1"));
        assert_eq!(c.consumer(), Some("valve1"));
        assert!(c.touches("pid1"));
        assert!(!c.touches("tank1"));
        assert_eq!(c.target().unwrap().param(), "target_opening");

        let bad = Connection::new("pid1", "valve1.x");
        assert_eq!(bad.producer(), None);
        assert!(matches!(
            bad.source(),
            Err(ValidationError::MalformedKey { .. })
        ));
    }

    #[test]
    fn rejects_bad_cycle_time() {
        for v in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(GraphStore::new(v).is_err());
        }
    }

    #[test]
    fn new_store_starts_dirty_and_empty() {
        let mut store = GraphStore::new(0.1).unwrap();
        assert!(store.is_dirty());
        assert!(store.is_empty());
        assert!(store.execution_order().unwrap().as_slice().is_empty());
        assert!(!store.is_dirty());
    }
}
