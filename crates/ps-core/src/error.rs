use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Malformed signal key '{key}': expected 'instance.param'")]
    MalformedKey { key: String },

    #[error("Internal state of type '{type_name}' could not be encoded: {reason}")]
    StateEncode {
        type_name: &'static str,
        reason: String,
    },

    #[error("Internal state of type '{type_name}' could not be decoded: {reason}")]
    StateDecode {
        type_name: &'static str,
        reason: String,
    },
}
