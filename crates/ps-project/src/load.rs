//! Building a live [`GraphStore`] from a configuration.

use ps_graph::{
    Connection, GraphStore, OnlineMutator, TypeCatalog, ValidationError, build_graph,
    validate_permutation,
};
use tracing::{info, warn};

use crate::schema::ProjectConfig;
use crate::validate::validate_config;
use crate::{ProjectError, ProjectResult};

/// How strictly an offline load treats broken references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Any dangling or duplicate connection, or a manual order that is not a
    /// permutation of the instances, fails the load.
    #[default]
    Strict,
    /// Such entries are pruned with a warning and listed in the report.
    Lenient,
}

/// What a lenient load left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub pruned_connections: Vec<(Connection, ValidationError)>,
    pub dropped_order: Option<ValidationError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.pruned_connections.is_empty() && self.dropped_order.is_none()
    }
}

/// Validate `config` and load it into a fresh store through the mutator.
///
/// The resulting store always resolves to an execution order; a graph that
/// is cyclic without a usable manual order is an error under either policy.
pub fn build_store(
    config: &ProjectConfig,
    catalog: &dyn TypeCatalog,
    policy: LoadPolicy,
) -> ProjectResult<(GraphStore, LoadReport)> {
    validate_config(config)?;

    let mut store = GraphStore::new(config.cycle_time_s)?;
    let mut report = LoadReport::default();
    {
        let mut m = OnlineMutator::new(&mut store, catalog);
        for (kind, name, spec) in config.instances() {
            m.add_instance(name, kind, &spec.type_tag, spec.params.clone())?;
        }

        for conn in &config.connections {
            match m.add_connection(&conn.from, &conn.to) {
                Ok(()) => {}
                Err(e) if policy == LoadPolicy::Lenient => {
                    warn!(from = %conn.from, to = %conn.to, error = %e, "pruning connection");
                    report.pruned_connections.push((conn.clone(), e));
                }
                Err(ValidationError::NotFound { name }) => {
                    return Err(ValidationError::DanglingReference {
                        from: conn.from.clone(),
                        to: conn.to.clone(),
                        missing: name,
                    }
                    .into());
                }
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(order) = &config.execution_order {
            let graph = build_graph(m.store().instance_names(), m.store().connections())?;
            match validate_permutation(&graph, order) {
                Ok(()) => m.set_execution_order(Some(order.clone())),
                Err(e) if policy == LoadPolicy::Lenient => {
                    warn!(error = %e, "dropping manual execution order");
                    report.dropped_order = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    let manual = store.execution_order().map_err(ProjectError::Graph)?.is_manual();
    info!(
        instances = store.len(),
        connections = store.connections().len(),
        manual,
        "configuration loaded"
    );
    Ok((store, report))
}
