//! Signal registry for rfgen
//!
//! Deduplicates RF signal definitions by canonical content and flattens
//! typed/subtyped command tables into a single collision-free namespace.

mod canonical;
mod commands;
mod error;
mod registry;

pub use canonical::{CanonicalSignal, SignalId, ID_FIELD, TRANSFORM_FIELD};
pub use commands::{
    normalize_commands, CommandTable, CommandTransform, DEFAULT_KEY, SUBTYPE_SEPARATOR,
    TYPE_SEPARATOR,
};
pub use error::SignalError;
pub use registry::{Registration, RegisteredSignal, SignalRegistry, DEFAULT_MAX_SENSITIVITY};
