use core::fmt;
use thiserror::Error;

pub type ValidationResult<T> = Result<T, ValidationError>;
pub type GraphResult<T> = Result<T, GraphError>;

/// A rejected configuration operation. Raising one never changes the store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// An instance with this name already exists.
    #[error("Duplicate instance name '{name}'")]
    DuplicateName { name: String },

    /// Name is empty or contains a dot or whitespace.
    #[error("Invalid instance name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// No implementation is registered for the type tag.
    #[error("Unknown type '{type_tag}' for instance '{name}'")]
    UnknownType { name: String, type_tag: String },

    /// Referenced instance does not exist.
    #[error("Instance '{name}' not found")]
    NotFound { name: String },

    /// The same edge is already present.
    #[error("Duplicate connection {from} -> {to}")]
    DuplicateConnection { from: String, to: String },

    /// A connection endpoint names a missing instance.
    #[error("Connection {from} -> {to} references missing instance '{missing}'")]
    DanglingReference {
        from: String,
        to: String,
        missing: String,
    },

    /// Key is not of the form `instance.param`.
    #[error("Malformed signal key '{key}'")]
    MalformedKey { key: String },

    /// The type rejected the parameter set.
    #[error("Invalid parameters for '{name}': {reason}")]
    InvalidParams { name: String, reason: String },

    /// Manual order is not a permutation of the instances.
    #[error("Invalid execution order: {reason}")]
    InvalidOrder { reason: String },

    /// Cycle period is zero, negative or not finite.
    #[error("Invalid cycle time {value}: must be positive and finite")]
    InvalidCycleTime { value: f64 },

    /// Diff is internally inconsistent.
    #[error("Malformed diff: {reason}")]
    MalformedDiff { reason: String },
}

/// Automatic ordering is impossible for the current graph.
///
/// `unresolved` is everything Kahn's algorithm could not place (cycle
/// members plus anything downstream of them), in declaration order.
/// `cycles` lists each strongly connected component that actually loops.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub unresolved: Vec<String>,
    pub cycles: Vec<Vec<String>>,
}

impl CycleReport {
    /// Every instance that sits on some cycle.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.cycles.iter().flatten().map(String::as_str)
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "automatic ordering impossible, unresolved: [{}]",
            self.unresolved.join(", ")
        )?;
        for cycle in &self.cycles {
            write!(f, "; cycle: [{}]", cycle.join(" -> "))?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Cyclic dependency: {0}")]
    Cyclic(CycleReport),
}
