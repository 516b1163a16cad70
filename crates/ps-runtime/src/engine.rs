//! Single-threaded cycle execution.
//!
//! The engine owns the live value table and every internal state. It never
//! locks and never sleeps: the scheduler (or a test) calls
//! [`CycleEngine::execute_cycle`] once per period and touches nothing else
//! while that runs.

use indexmap::IndexMap;
use ps_controls::{ComputationError, ExecContext, InstanceBehavior, Registry};
use ps_core::{InternalState, SignalKey, Value, ValueMap};
use ps_graph::{GraphError, GraphStore};
use ps_project::{LoadPolicy, LoadReport, ProjectError, build_store};
use ps_snapshot::{MergedState, StateMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::apply;
use crate::error::{DiffRejected, RuntimeError, RuntimeResult};
use crate::staging::DiffSummary;

/// One inbound connection, pre-split for the hot path.
#[derive(Debug, Clone)]
struct Link {
    from_instance: String,
    from_param: String,
    to_param: String,
}

/// One instance in execution order.
#[derive(Clone)]
struct Step {
    name: String,
    behavior: Arc<dyn InstanceBehavior>,
    inbound: Vec<Link>,
}

enum PlanError {
    Graph(GraphError),
    Unregistered { name: String, type_tag: String },
}

fn build_plan(store: &mut GraphStore, registry: &Registry) -> Result<Vec<Step>, PlanError> {
    let order: Vec<String> = store
        .execution_order()
        .map_err(PlanError::Graph)?
        .as_slice()
        .to_vec();

    let mut plan = Vec::with_capacity(order.len());
    for name in order {
        let Some(def) = store.instance(&name) else {
            continue;
        };
        let behavior = registry
            .get(&def.type_tag)
            .cloned()
            .ok_or_else(|| PlanError::Unregistered {
                name: name.clone(),
                type_tag: def.type_tag.clone(),
            })?;
        let mut inbound = Vec::new();
        for conn in store.inbound(&name) {
            // Keys were validated when the connection was inserted.
            if let (Ok(source), Ok(target)) = (conn.source(), conn.target()) {
                inbound.push(Link {
                    from_instance: source.instance().to_string(),
                    from_param: source.param().to_string(),
                    to_param: target.param().to_string(),
                });
            }
        }
        plan.push(Step {
            name,
            behavior,
            inbound,
        });
    }
    Ok(plan)
}

/// Result of one cycle.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    /// Zero-based index of the cycle that ran.
    pub cycle: u64,
    pub executed: usize,
    /// Instances whose execution failed; their outputs kept prior values.
    pub failed: Vec<(String, ComputationError)>,
}

/// Read-only view of every live value, taken after a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedFrame {
    /// Cycles completed when the frame was taken.
    pub cycle: u64,
    pub sim_time_s: f64,
    /// Live period, which diffs never change.
    pub cycle_time_s: f64,
    /// `"instance.param"` -> value.
    pub values: ValueMap,
}

impl PublishedFrame {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }
}

/// Owns the live graph, the value table and the internal states.
pub struct CycleEngine {
    store: GraphStore,
    registry: Registry,
    plan: Vec<Step>,
    /// Instance -> param -> value.
    slots: IndexMap<String, ValueMap>,
    states: StateMap,
    cycle: u64,
    sim_time_s: f64,
    live_period_s: f64,
}

impl CycleEngine {
    /// Engine over an already-validated store, with slots seeded from params.
    pub fn new(mut store: GraphStore, registry: Registry) -> RuntimeResult<Self> {
        let plan = build_plan(&mut store, &registry).map_err(|e| match e {
            PlanError::Graph(e) => RuntimeError::Project(ProjectError::Graph(e)),
            PlanError::Unregistered { name, type_tag } => {
                RuntimeError::Unregistered { name, type_tag }
            }
        })?;
        let slots = store
            .instances()
            .map(|def| (def.name.clone(), def.params.clone()))
            .collect();
        let live_period_s = store.cycle_time_s();
        Ok(Self {
            store,
            registry,
            plan,
            slots,
            states: StateMap::new(),
            cycle: 0,
            sim_time_s: 0.0,
            live_period_s,
        })
    }

    /// Load a merged configuration and restore its snapshot values and states.
    pub fn from_merged(
        merged: &MergedState,
        registry: Registry,
        policy: LoadPolicy,
    ) -> RuntimeResult<(Self, LoadReport)> {
        let (store, report) = build_store(&merged.config, &registry, policy)?;
        let mut engine = Self::new(store, registry)?;
        for (raw, value) in &merged.values {
            let Ok(key) = SignalKey::parse(raw) else {
                continue;
            };
            if let Some(slot) = engine.slots.get_mut(key.instance()) {
                slot.insert(key.param().to_string(), value.clone());
            }
        }
        for (name, state) in &merged.states {
            if engine.store.contains(name) {
                engine.states.insert(name.clone(), state.clone());
            }
        }
        info!(
            instances = engine.store.len(),
            restored_values = merged.values.len(),
            restored_states = engine.states.len(),
            "engine ready"
        );
        Ok((engine, report))
    }

    /// Propagate and execute every instance once, in execution order.
    ///
    /// Each instance first copies its inbound connections from the live
    /// table, so producers earlier in the order deliver this cycle's value
    /// and later ones deliver last cycle's. A failing instance keeps its
    /// previous outputs and state.
    pub fn execute_cycle(&mut self) -> CycleOutcome {
        let ctx = ExecContext {
            cycle: self.cycle,
            dt_s: self.live_period_s,
            sim_time_s: self.sim_time_s,
        };
        let mut outcome = CycleOutcome {
            cycle: self.cycle,
            ..CycleOutcome::default()
        };
        let fresh = InternalState::fresh();

        for step in &self.plan {
            for link in &step.inbound {
                let value = self
                    .slots
                    .get(&link.from_instance)
                    .and_then(|slot| slot.get(&link.from_param))
                    .cloned();
                if let (Some(value), Some(slot)) = (value, self.slots.get_mut(&step.name)) {
                    slot.insert(link.to_param.clone(), value);
                }
            }

            let (Some(def), Some(slot)) =
                (self.store.instance(&step.name), self.slots.get_mut(&step.name))
            else {
                continue;
            };
            let state = self.states.get(&step.name).unwrap_or(&fresh);
            match step.behavior.execute(&ctx, slot, &def.params, state) {
                Ok(out) => {
                    slot.extend(out.outputs);
                    self.states.insert(step.name.clone(), out.state);
                    outcome.executed += 1;
                }
                Err(e) => {
                    warn!(instance = %step.name, cycle = self.cycle, error = %e, "execution failed");
                    outcome.failed.push((step.name.clone(), e));
                }
            }
        }

        self.cycle += 1;
        self.sim_time_s += self.live_period_s;
        debug!(
            cycle = outcome.cycle,
            executed = outcome.executed,
            failed = outcome.failed.len(),
            "cycle complete"
        );
        outcome
    }

    /// Every live value, flattened to `"instance.param"` keys.
    pub fn values(&self) -> ValueMap {
        let mut values = ValueMap::new();
        for (instance, slot) in &self.slots {
            for (param, value) in slot {
                values.insert(format!("{instance}.{param}"), value.clone());
            }
        }
        values
    }

    pub fn frame(&self) -> PublishedFrame {
        PublishedFrame {
            cycle: self.cycle,
            sim_time_s: self.sim_time_s,
            cycle_time_s: self.live_period_s,
            values: self.values(),
        }
    }

    /// Copy of the values and states for a snapshot.
    pub fn capture(&self) -> (ValueMap, StateMap) {
        (self.values(), self.states.clone())
    }

    pub fn value(&self, key: &SignalKey) -> Option<&Value> {
        self.slots.get(key.instance())?.get(key.param())
    }

    /// Overwrite one live slot. Returns `false` if the instance is unknown.
    pub fn write_value(&mut self, key: &SignalKey, value: Value) -> bool {
        match self.slots.get_mut(key.instance()) {
            Some(slot) => {
                slot.insert(key.param().to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Apply a diff between cycles.
    ///
    /// On rejection nothing changes. On success removed instances lose their
    /// slots and states, added ones start from their params with no state,
    /// and merged params overwrite the matching slots. The live period is
    /// left alone.
    pub fn apply_diff(&mut self, diff: &ps_project::Diff) -> Result<DiffSummary, DiffRejected> {
        let mut applied = apply::apply_diff(&self.store, diff, &self.registry)?;
        let plan = build_plan(&mut applied.store, &self.registry).map_err(|e| match e {
            PlanError::Graph(GraphError::Cyclic(report)) => DiffRejected::Unresolvable(report),
            PlanError::Graph(GraphError::Validation(e)) => DiffRejected::Invalid(e),
            PlanError::Unregistered { name, type_tag } => {
                DiffRejected::Unregistered { name, type_tag }
            }
        })?;

        for name in &applied.removed {
            self.slots.shift_remove(name);
            self.states.shift_remove(name);
        }
        for name in &applied.added {
            if let Some(def) = applied.store.instance(name) {
                self.slots.insert(name.clone(), def.params.clone());
            }
        }
        for (name, partial) in &applied.modified {
            if let Some(slot) = self.slots.get_mut(name) {
                slot.extend(partial.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        if let Some(period) = applied.cycle_time_recorded {
            info!(
                live = self.live_period_s,
                recorded = period,
                "cycle time change recorded, takes effect on restart"
            );
        }

        self.store = applied.store;
        self.plan = plan;
        Ok(DiffSummary {
            added: applied.added,
            removed: applied.removed,
            modified: applied.modified.into_iter().map(|(name, _)| name).collect(),
            cycle_time_recorded: applied.cycle_time_recorded,
        })
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Cycles completed.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn live_period_s(&self) -> f64 {
        self.live_period_s
    }

    pub fn states(&self) -> &StateMap {
        &self.states
    }

    /// Instance names in the order they run.
    pub fn order(&self) -> impl Iterator<Item = &str> {
        self.plan.iter().map(|s| s.name.as_str())
    }
}

impl std::fmt::Debug for CycleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleEngine")
            .field("cycle", &self.cycle)
            .field("order", &self.order().collect::<Vec<_>>())
            .field("live_period_s", &self.live_period_s)
            .finish_non_exhaustive()
    }
}
