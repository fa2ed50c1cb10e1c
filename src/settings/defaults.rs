//! Built-in settings (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default settings values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Radio family the compiled signals belong to (default: "433")
    pub config_type: String,

    /// Directory holding the project fragment, relative to the root
    pub config_dir: String,

    /// Directory the drivers are emitted into, relative to the root
    pub driver_dir: String,

    /// Directory holding `<lang>.json` locale files, relative to the root
    pub locales_dir: String,

    /// How fallback translations are persisted (default: "keep")
    pub sentinel: String,

    /// Upper bound for signal sensitivity (default: 0.5)
    pub max_sensitivity: f64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            config_type: "433".to_string(),
            config_dir: "433_generator".to_string(),
            driver_dir: "drivers".to_string(),
            locales_dir: "locales".to_string(),
            sentinel: "keep".to_string(),
            max_sensitivity: rfgen_signal::DEFAULT_MAX_SENSITIVITY,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "config_type": self.config_type,
            "config_dir": self.config_dir,
            "driver_dir": self.driver_dir,
            "locales": {
                "dir": self.locales_dir,
                "sentinel": self.sentinel
            },
            "signal": {
                "max_sensitivity": self.max_sensitivity
            }
        })
    }
}
