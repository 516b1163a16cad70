//! ps-graph: configuration graph layer for plcsim.
//!
//! Provides:
//! - `GraphStore`, the single source of truth for instances, connections
//!   and the cycle period
//! - `OnlineMutator`, the exclusive mutation API over a store
//! - the dependency resolver (`build_graph`, `topological_sort`,
//!   `ExecutionOrder`, cycle reports, circuit analysis)
//!
//! # Example
//!
//! ```
//! use ps_core::ValueMap;
//! use ps_graph::{GraphStore, InstanceKind, OnlineMutator, TypeCatalog};
//!
//! struct AnyType;
//! impl TypeCatalog for AnyType {
//!     fn contains(&self, _type_tag: &str) -> bool {
//!         true
//!     }
//! }
//!
//! let mut store = GraphStore::new(0.5).unwrap();
//! let mut m = OnlineMutator::new(&mut store, &AnyType);
//! m.add_instance("src", InstanceKind::Model, "const", ValueMap::new()).unwrap();
//! m.add_instance("dst", InstanceKind::Model, "sink", ValueMap::new()).unwrap();
//! m.add_connection("src.out", "dst.in").unwrap();
//!
//! let order = store.execution_order().unwrap();
//! assert_eq!(order.as_slice(), ["src", "dst"]);
//! ```

pub mod error;
pub mod mutator;
pub mod resolver;
pub mod store;

pub use error::{CycleReport, GraphError, GraphResult, ValidationError, ValidationResult};
pub use mutator::{OnlineMutator, TypeCatalog};
pub use resolver::{
    Circuit, DependencyGraph, ExecutionOrder, build_graph, circuits, resolve, topological_sort,
    validate_permutation,
};
pub use store::{Connection, GraphStore, InstanceDef, InstanceKind};
