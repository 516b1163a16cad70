use ps_core::CoreError;
use thiserror::Error;

pub type ControlResult<T> = Result<T, ControlError>;
pub type ComputationResult<T> = Result<T, ComputationError>;

/// Configuration-time errors: registry and parameter problems.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Parameter value outside its allowed range.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// Parameter present but not a number.
    #[error("Parameter '{param}' must be numeric")]
    NotNumeric { param: String },

    /// Registering a type tag twice.
    #[error("Type '{type_tag}' is already registered")]
    DuplicateType { type_tag: String },
}

/// Raised by an instance during one execution. Never fatal to the loop.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ComputationError {
    /// Params stopped validating at execution time.
    #[error("Invalid parameters: {0}")]
    Params(#[from] ControlError),

    /// Inbound signal is not a number.
    #[error("Input '{input}' must be numeric")]
    BadInput { input: String },

    /// Computation produced NaN or infinity.
    #[error("Non-finite result for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    /// Internal state could not be encoded or decoded.
    #[error(transparent)]
    State(#[from] CoreError),

    /// Instance-specific failure.
    #[error("{reason}")]
    Failed { reason: String },
}
