//! Type tag -> implementation registry.

use indexmap::IndexMap;
use ps_core::ValueMap;
use ps_graph::TypeCatalog;
use std::sync::Arc;

use crate::error::{ControlError, ControlResult};
use crate::instance::InstanceBehavior;
use crate::pid::PidType;
use crate::tank::TankType;
use crate::valve::ValveType;

/// Maps configuration type tags to shared behaviors.
#[derive(Clone, Default)]
pub struct Registry {
    types: IndexMap<String, Arc<dyn InstanceBehavior>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `pid`, `valve` and `cylindrical_tank`.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        for behavior in [
            Arc::new(PidType) as Arc<dyn InstanceBehavior>,
            Arc::new(ValveType),
            Arc::new(TankType),
        ] {
            reg.types.insert(behavior.type_tag().to_string(), behavior);
        }
        reg
    }

    pub fn register(&mut self, behavior: Arc<dyn InstanceBehavior>) -> ControlResult<()> {
        let tag = behavior.type_tag().to_string();
        if self.types.contains_key(&tag) {
            return Err(ControlError::DuplicateType { type_tag: tag });
        }
        self.types.insert(tag, behavior);
        Ok(())
    }

    pub fn get(&self, type_tag: &str) -> Option<&Arc<dyn InstanceBehavior>> {
        self.types.get(type_tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TypeCatalog for Registry {
    fn contains(&self, type_tag: &str) -> bool {
        self.types.contains_key(type_tag)
    }

    fn validate_params(&self, type_tag: &str, params: &ValueMap) -> Result<(), String> {
        match self.types.get(type_tag) {
            Some(behavior) => behavior.validate(params).map_err(|e| e.to_string()),
            None => Err(format!("type '{type_tag}' is not registered")),
        }
    }
}
