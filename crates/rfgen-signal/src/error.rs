//! Signal error types

/// Errors raised while registering signals or flattening command tables
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("Signal definition must be an object, found {0}")]
    NotAnObject(&'static str),

    #[error("Command table must be an object, found {0}")]
    InvalidCommandTable(&'static str),

    #[error("Command name '{name}' contains reserved separator '{separator}'")]
    ReservedSeparator {
        name: String,
        separator: &'static str,
    },

    #[error("Command key '{key}' is produced by more than one command")]
    CommandCollision { key: String },

    #[error("Unknown command transform '{0}'")]
    UnknownTransform(String),

    #[error("Signal id '{id}' is already bound to different content")]
    IdConflict { id: String },

    #[error("Signal id must be a string or number")]
    InvalidId,

    #[error("JCS canonicalization error: {0}")]
    JcsError(String),
}

/// Name of a JSON value's type, for error messages
pub(crate) fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
