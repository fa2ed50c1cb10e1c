//! Compile error taxonomy
//!
//! Every module error converges into [`CompileError`]. Each variant maps to a
//! stable [`ErrorCode`] so callers can branch without matching messages.

use rfgen_signal::SignalError;

use crate::fragment::{FragmentError, PathError, ReaderError};
use crate::locale::LocaleError;
use crate::output::OutputError;
use crate::resolve::ResolveError;
use crate::settings::SettingsError;

/// Stable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Circular `extends` chain
    Cycle,
    /// Undefined view, device class or signal reference
    NotFound,
    /// Required pairing option left unset
    MissingOption,
    /// Translation key used as both leaf and container
    TranslationCollision,
    /// Malformed signal or command table
    InvalidSignal,
    /// Invalid relative path
    InvalidPath,
    /// Fragment with an unexpected shape
    InvalidFragment,
    /// Config or locale file could not be read or parsed
    ReadFailed,
    /// Settings rejected by validation
    InvalidSettings,
    /// Output requested before a successful finalize
    NotFinalized,
    /// Output files could not be written
    WriteFailed,
}

impl ErrorCode {
    /// Returns the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Cycle => "CYCLE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::MissingOption => "MISSING_OPTION",
            ErrorCode::TranslationCollision => "TRANSLATION_COLLISION",
            ErrorCode::InvalidSignal => "INVALID_SIGNAL",
            ErrorCode::InvalidPath => "INVALID_PATH",
            ErrorCode::InvalidFragment => "INVALID_FRAGMENT",
            ErrorCode::ReadFailed => "READ_FAILED",
            ErrorCode::InvalidSettings => "INVALID_SETTINGS",
            ErrorCode::NotFinalized => "NOT_FINALIZED",
            ErrorCode::WriteFailed => "WRITE_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structural compile failure. Any of these aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("View option '{option}' is required for view '{view}' in device '{device}'")]
    MissingOption {
        device: String,
        view: String,
        option: String,
    },

    #[error("Could not find view '{view}' for device '{device}'")]
    UnknownView { device: String, view: String },

    #[error("Device '{device}' has no signal and no global signal is set")]
    NoSignal { device: String },

    #[error("Device '{device}' refers to undeclared signal '{signal}'")]
    UnknownSignal { device: String, signal: String },

    #[error("Invalid signal for device '{device}': {source}")]
    InvalidSignal {
        device: String,
        #[source]
        source: SignalError,
    },

    #[error(transparent)]
    Locale(#[from] LocaleError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Fragment(#[from] FragmentError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("Compiler has not been finalized")]
    NotFinalized,

    #[error(transparent)]
    Output(#[from] OutputError),
}

impl CompileError {
    /// Returns the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            CompileError::Resolve(ResolveError::Cycle { .. }) => ErrorCode::Cycle,
            CompileError::Resolve(ResolveError::NotFound { .. }) => ErrorCode::NotFound,
            CompileError::Resolve(_) => ErrorCode::InvalidFragment,
            CompileError::MissingOption { .. } => ErrorCode::MissingOption,
            CompileError::UnknownView { .. }
            | CompileError::NoSignal { .. }
            | CompileError::UnknownSignal { .. } => ErrorCode::NotFound,
            CompileError::InvalidSignal { .. } => ErrorCode::InvalidSignal,
            CompileError::Locale(LocaleError::Collision { .. }) => ErrorCode::TranslationCollision,
            CompileError::Locale(_) => ErrorCode::ReadFailed,
            CompileError::Path(_) => ErrorCode::InvalidPath,
            CompileError::Reader(_) => ErrorCode::ReadFailed,
            CompileError::Fragment(_) => ErrorCode::InvalidFragment,
            CompileError::Settings(_) => ErrorCode::InvalidSettings,
            CompileError::NotFinalized => ErrorCode::NotFinalized,
            CompileError::Output(_) => ErrorCode::WriteFailed,
        }
    }
}
