//! Layered compiler settings
//!
//! Four layers, later ones taking precedence:
//! 1. Built-in defaults
//! 2. Host settings (~/.config/rfgen/settings.toml)
//! 3. Project settings (<root>/.rfgen.toml)
//! 4. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{
    CompilerSettings, ConfigType, SettingsError, SettingsOrigin, SettingsSource,
    HOST_SETTINGS_PATH, PROJECT_SETTINGS_FILE,
};
pub use merge::{deep_merge, merge_layers};
