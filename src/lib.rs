//! rfgen - RF device driver configuration compiler
//!
//! Merges partial configurations (built-in defaults, shared bases, project
//! files) into one resolved device configuration, a platform manifest and
//! backfilled translation tables for 433 MHz, 868 MHz and infrared drivers.

pub mod compiler;
pub mod error;
pub mod fragment;
pub mod locale;
pub mod output;
pub mod resolve;
pub mod settings;

pub use compiler::{AppManifest, CompileReport, CompilerOptions, ConfigCompiler};
pub use error::{CompileError, ErrorCode};
pub use fragment::{ConfigReader, FileReader, Fragment};
pub use locale::{LocaleSet, LocaleStore, SentinelPolicy};
pub use output::{OutputError, StagedWrites};
pub use settings::{CompilerSettings, ConfigType};
