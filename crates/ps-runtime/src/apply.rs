//! All-or-nothing diff application against a copy of the store.

use ps_core::ValueMap;
use ps_graph::{
    GraphError, GraphStore, OnlineMutator, TypeCatalog, build_graph, validate_permutation,
};
use ps_project::{Diff, OrderChange, ProjectConfig};
use tracing::debug;

use crate::error::DiffRejected;

/// A diff that applied cleanly, with the store it produced.
#[derive(Debug, Clone)]
pub struct AppliedDiff {
    pub store: GraphStore,
    pub removed: Vec<String>,
    pub added: Vec<String>,
    /// Name and the partial params merged in.
    pub modified: Vec<(String, ValueMap)>,
    /// New period written to the store but not to the live timer.
    pub cycle_time_recorded: Option<f64>,
}

/// Apply `diff` to a clone of `current`.
///
/// Order: connection removals, instance removals (cascading), instance
/// additions, connection additions, modifications, period, manual order.
/// The result must resolve to an execution order and, when the diff
/// carries one, match its full configuration. On any failure `current` is
/// untouched and the clone is dropped.
pub fn apply_diff(
    current: &GraphStore,
    diff: &Diff,
    catalog: &dyn TypeCatalog,
) -> Result<AppliedDiff, DiffRejected> {
    diff.check_shape()?;

    let mut next = current.clone();
    let mut modified = Vec::with_capacity(diff.modified.len());
    {
        let mut m = OnlineMutator::new(&mut next, catalog);

        for conn in &diff.removed_connections {
            m.remove_connection(&conn.from, &conn.to);
        }
        for name in &diff.removed {
            m.remove_instance(name)?;
        }
        for add in &diff.added {
            m.add_instance(&add.name, add.kind, &add.type_tag, add.params.clone())?;
        }
        for conn in &diff.added_connections {
            m.add_connection(&conn.from, &conn.to)?;
        }
        for change in &diff.modified {
            m.update_instance(&change.name, &change.params)?;
            modified.push((change.name.clone(), change.params.clone()));
        }
        if let Some(period) = diff.new_cycle_time_s {
            m.set_cycle_time(period)?;
        }
        match &diff.execution_order {
            OrderChange::Keep => {}
            OrderChange::Clear => m.set_execution_order(None),
            OrderChange::Set(order) => {
                let graph = build_graph(m.store().instance_names(), m.store().connections())?;
                validate_permutation(&graph, order)?;
                m.set_execution_order(Some(order.clone()));
            }
        }
    }

    match next.execution_order() {
        Ok(order) => debug!(instances = order.len(), manual = order.is_manual(), "diff order resolved"),
        Err(GraphError::Cyclic(report)) => return Err(DiffRejected::Unresolvable(report)),
        Err(GraphError::Validation(e)) => return Err(DiffRejected::Invalid(e)),
    }

    if let Some(expected) = &diff.full_config {
        if !ProjectConfig::from_store(&next).equivalent(expected) {
            return Err(DiffRejected::Inconsistent);
        }
    }

    Ok(AppliedDiff {
        store: next,
        removed: diff.removed.clone(),
        added: diff.added.iter().map(|a| a.name.clone()).collect(),
        modified,
        cycle_time_recorded: diff.new_cycle_time_s,
    })
}
