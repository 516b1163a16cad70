//! Exclusive mutation API over a [`GraphStore`].

use ps_core::ValueMap;
use tracing::debug;

use crate::error::{ValidationError, ValidationResult};
use crate::store::{Connection, GraphStore, InstanceDef, InstanceKind, endpoint};

/// Registry of instance implementations, as far as configuration cares.
pub trait TypeCatalog {
    /// Is `type_tag` registered?
    fn contains(&self, type_tag: &str) -> bool;

    /// Check a full parameter set for `type_tag`. Default accepts anything.
    fn validate_params(&self, _type_tag: &str, _params: &ValueMap) -> Result<(), String> {
        Ok(())
    }
}

/// The only way to change a [`GraphStore`].
///
/// Holding the `&mut` borrow makes every operation exclusive. Each method
/// either succeeds completely or returns an error with the store untouched.
pub struct OnlineMutator<'a> {
    store: &'a mut GraphStore,
    catalog: &'a dyn TypeCatalog,
}

impl<'a> OnlineMutator<'a> {
    pub fn new(store: &'a mut GraphStore, catalog: &'a dyn TypeCatalog) -> Self {
        Self { store, catalog }
    }

    pub fn store(&self) -> &GraphStore {
        self.store
    }

    pub fn add_instance(
        &mut self,
        name: &str,
        kind: InstanceKind,
        type_tag: &str,
        params: ValueMap,
    ) -> ValidationResult<()> {
        check_name(name)?;
        if self.store.contains(name) {
            return Err(ValidationError::DuplicateName {
                name: name.to_string(),
            });
        }
        if !self.catalog.contains(type_tag) {
            return Err(ValidationError::UnknownType {
                name: name.to_string(),
                type_tag: type_tag.to_string(),
            });
        }
        self.catalog
            .validate_params(type_tag, &params)
            .map_err(|reason| ValidationError::InvalidParams {
                name: name.to_string(),
                reason,
            })?;

        debug!(instance = name, type_tag, ?kind, "instance added");
        self.store.insert_instance(InstanceDef {
            name: name.to_string(),
            kind,
            type_tag: type_tag.to_string(),
            params,
        });
        Ok(())
    }

    /// Merge `partial` into the instance's params key by key.
    pub fn update_instance(&mut self, name: &str, partial: &ValueMap) -> ValidationResult<()> {
        let current = self
            .store
            .instance(name)
            .ok_or_else(|| ValidationError::NotFound {
                name: name.to_string(),
            })?;

        let mut merged = current.params.clone();
        for (k, v) in partial {
            merged.insert(k.clone(), v.clone());
        }
        self.catalog
            .validate_params(&current.type_tag, &merged)
            .map_err(|reason| ValidationError::InvalidParams {
                name: name.to_string(),
                reason,
            })?;

        if let Some(def) = self.store.instance_mut(name) {
            def.params = merged;
        }
        debug!(instance = name, keys = partial.len(), "instance updated");
        Ok(())
    }

    /// Remove an instance and every connection naming it.
    ///
    /// Returns the instance and the cascaded connections.
    pub fn remove_instance(
        &mut self,
        name: &str,
    ) -> ValidationResult<(InstanceDef, Vec<Connection>)> {
        let def = self
            .store
            .take_instance(name)
            .ok_or_else(|| ValidationError::NotFound {
                name: name.to_string(),
            })?;
        let cascaded = self.store.drain_connections(|c| c.touches(name));
        debug!(
            instance = name,
            cascaded = cascaded.len(),
            "instance removed"
        );
        Ok((def, cascaded))
    }

    pub fn add_connection(&mut self, from: &str, to: &str) -> ValidationResult<()> {
        let source = endpoint(from)?;
        let target = endpoint(to)?;
        for inst in [source.instance(), target.instance()] {
            if !self.store.contains(inst) {
                return Err(ValidationError::NotFound {
                    name: inst.to_string(),
                });
            }
        }
        if self.store.has_connection(from, to) {
            return Err(ValidationError::DuplicateConnection {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        self.store.push_connection(Connection::new(from, to));
        Ok(())
    }

    /// Idempotent: returns whether anything was removed.
    pub fn remove_connection(&mut self, from: &str, to: &str) -> bool {
        !self
            .store
            .drain_connections(|c| c.from == from && c.to == to)
            .is_empty()
    }

    /// Set or clear the manual execution order. Validity against the
    /// instance set is checked when the order is resolved.
    pub fn set_execution_order(&mut self, order: Option<Vec<String>>) {
        self.store.set_manual_order(order);
    }

    pub fn set_cycle_time(&mut self, cycle_time_s: f64) -> ValidationResult<()> {
        self.store.set_cycle_time(cycle_time_s)
    }
}

fn check_name(name: &str) -> ValidationResult<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.contains('.') {
        "name contains '.'"
    } else if name.chars().any(char::is_whitespace) {
        "name contains whitespace"
    } else {
        return Ok(());
    };
    Err(ValidationError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_core::Value;

    struct Catalog;

    impl TypeCatalog for Catalog {
        fn contains(&self, type_tag: &str) -> bool {
            matches!(type_tag, "pid" | "valve" | "tank")
        }

        fn validate_params(&self, type_tag: &str, params: &ValueMap) -> Result<(), String> {
            match (type_tag, params.get("h").and_then(Value::as_f64)) {
                ("pid", Some(h)) if h <= 0.0 => Err("h must be positive".into()),
                _ => Ok(()),
            }
        }
    }

    fn params(pairs: &[(&str, f64)]) -> ValueMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::Float(*v)))
            .collect()
    }

    fn loop_store() -> GraphStore {
        let mut store = GraphStore::new(0.5).unwrap();
        let mut m = OnlineMutator::new(&mut store, &Catalog);
        m.add_instance("pid1", InstanceKind::Algorithm, "pid", ValueMap::new())
            .unwrap();
        m.add_instance("valve1", InstanceKind::Model, "valve", ValueMap::new())
            .unwrap();
        m.add_instance("tank1", InstanceKind::Model, "tank", ValueMap::new())
            .unwrap();
        m.add_connection("pid1.mv", "valve1.opening").unwrap();
        m.add_connection("valve1.opening", "tank1.valve_opening")
            .unwrap();
        m.add_connection("tank1.level", "pid1.pv").unwrap();
        store
    }

    #[test]
    fn duplicate_name_across_kinds() {
        let mut store = loop_store();
        let mut m = OnlineMutator::new(&mut store, &Catalog);
        let err = m
            .add_instance("pid1", InstanceKind::Model, "valve", ValueMap::new())
            .unwrap_err();
        assert_eq!(err, ValidationError::DuplicateName { name: "pid1".into() });
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn unknown_type_rejected() {
        let mut store = GraphStore::new(0.5).unwrap();
        let mut m = OnlineMutator::new(&mut store, &Catalog);
        let err = m
            .add_instance("x", InstanceKind::Model, "reactor", ValueMap::new())
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownType { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn bad_names_rejected() {
        let mut store = GraphStore::new(0.5).unwrap();
        let mut m = OnlineMutator::new(&mut store, &Catalog);
        for name in ["", "a.b", "a b"] {
            assert!(matches!(
                m.add_instance(name, InstanceKind::Model, "valve", ValueMap::new()),
                Err(ValidationError::InvalidName { .. })
            ));
        }
    }

    #[test]
    fn partial_updates_accumulate() {
        let mut store = loop_store();
        let mut m = OnlineMutator::new(&mut store, &Catalog);
        m.update_instance("pid1", &params(&[("a", 1.0)])).unwrap();
        m.update_instance("pid1", &params(&[("b", 2.0)])).unwrap();
        m.update_instance("pid1", &params(&[("a", 3.0)])).unwrap();
        let p = &store.instance("pid1").unwrap().params;
        assert_eq!(p.get("a"), Some(&Value::Float(3.0)));
        assert_eq!(p.get("b"), Some(&Value::Float(2.0)));
    }

    #[test]
    fn update_rejected_by_catalog_leaves_params() {
        let mut store = loop_store();
        let mut m = OnlineMutator::new(&mut store, &Catalog);
        m.update_instance("pid1", &params(&[("h", 100.0)])).unwrap();
        let err = m
            .update_instance("pid1", &params(&[("h", -1.0), ("kp", 2.0)]))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParams { .. }));
        let p = &store.instance("pid1").unwrap().params;
        assert_eq!(p.get("h"), Some(&Value::Float(100.0)));
        assert!(p.get("kp").is_none());
    }

    #[test]
    fn update_missing_is_not_found() {
        let mut store = loop_store();
        let mut m = OnlineMutator::new(&mut store, &Catalog);
        assert!(matches!(
            m.update_instance("ghost", &ValueMap::new()),
            Err(ValidationError::NotFound { .. })
        ));
    }

    #[test]
    fn remove_cascades_connections() {
        let mut store = loop_store();
        assert_eq!(store.connections().len(), 3);
        let mut m = OnlineMutator::new(&mut store, &Catalog);
        let (def, cascaded) = m.remove_instance("valve1").unwrap();
        assert_eq!(def.type_tag, "valve");
        assert_eq!(cascaded.len(), 2);
        assert_eq!(store.connections().len(), 1);
        assert!(store.connections().iter().all(|c| !c.touches("valve1")));
    }

    #[test]
    fn add_connection_checks() {
        let mut store = loop_store();
        let before = store.connections().to_vec();
        let mut m = OnlineMutator::new(&mut store, &Catalog);
        assert_eq!(
            m.add_connection("ghost.x", "valve1.opening").unwrap_err(),
            ValidationError::NotFound { name: "ghost".into() }
        );
        assert!(matches!(
            m.add_connection("pid1.mv", "valve1.opening"),
            Err(ValidationError::DuplicateConnection { .. })
        ));
        assert!(matches!(
            m.add_connection("pid1", "valve1.opening"),
            Err(ValidationError::MalformedKey { .. })
        ));
        assert_eq!(store.connections(), before.as_slice());
    }

    #[test]
    fn remove_connection_is_idempotent() {
        let mut store = loop_store();
        let mut m = OnlineMutator::new(&mut store, &Catalog);
        assert!(m.remove_connection("pid1.mv", "valve1.opening"));
        assert!(!m.remove_connection("pid1.mv", "valve1.opening"));
        assert!(!m.remove_connection("nope.a", "nope.b"));
        assert_eq!(store.connections().len(), 2);
    }

    #[test]
    fn mutation_invalidates_cached_order() {
        let mut store = GraphStore::new(0.5).unwrap();
        {
            let mut m = OnlineMutator::new(&mut store, &Catalog);
            m.add_instance("b", InstanceKind::Model, "valve", ValueMap::new())
                .unwrap();
            m.add_instance("a", InstanceKind::Model, "valve", ValueMap::new())
                .unwrap();
        }
        assert_eq!(store.execution_order().unwrap().as_slice(), ["b", "a"]);
        assert!(!store.is_dirty());

        OnlineMutator::new(&mut store, &Catalog)
            .add_connection("a.o", "b.i")
            .unwrap();
        assert!(store.is_dirty());
        assert_eq!(store.execution_order().unwrap().as_slice(), ["a", "b"]);
    }
}
