//! Configuration fragments
//!
//! A fragment is one partial configuration (built-in defaults, a shared
//! base, a project file). Its well-known sections are split out; every
//! other top-level key is a global (`driver`, `signal`, `flow`, ...).

mod paths;
mod reader;

pub use paths::{is_relative_reference, join_safe, relative_between, PathError, PathRewriter};
pub use reader::{toml_to_json, ConfigReader, FileReader, ReaderError, CONFIG_FILE_NAMES};

use serde_json::{Map, Value};
use thiserror::Error;

pub const VIEWS_KEY: &str = "views";
pub const DEVICE_CLASSES_KEY: &str = "deviceClasses";
pub const DEVICES_KEY: &str = "devices";
pub const SIGNALS_KEY: &str = "signals";
pub const DRIVERS_KEY: &str = "drivers";
pub const LOCALES_KEY: &str = "locales";

/// Errors raised for a malformed fragment
#[derive(Debug, Error)]
pub enum FragmentError {
    #[error("Fragment must be an object, got {0}")]
    NotAnObject(&'static str),

    #[error("Fragment section '{section}' must be {expected}")]
    InvalidSection {
        section: String,
        expected: &'static str,
    },
}

/// One partial configuration, split by section
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub views: Map<String, Value>,
    pub device_classes: Map<String, Value>,
    pub devices: Map<String, Value>,
    /// Declared signals, keyed by config type then id
    pub signals: Map<String, Value>,
    /// Raw driver entries passed through to the manifest
    pub drivers: Vec<Value>,
    pub locales: Option<Map<String, Value>>,
    pub globals: Map<String, Value>,
}

impl Fragment {
    pub fn from_value(value: Value) -> Result<Self, FragmentError> {
        let Value::Object(mut root) = value else {
            return Err(FragmentError::NotAnObject(type_name(&value)));
        };

        let views = take_object(&mut root, VIEWS_KEY)?;
        let device_classes = take_object(&mut root, DEVICE_CLASSES_KEY)?;
        let devices = take_object(&mut root, DEVICES_KEY)?;

        let signals = take_object(&mut root, SIGNALS_KEY)?;
        for (config_type, declared) in &signals {
            if !declared.is_object() {
                return Err(FragmentError::InvalidSection {
                    section: format!("{}.{}", SIGNALS_KEY, config_type),
                    expected: "an object of signal definitions",
                });
            }
        }

        let drivers = match root.shift_remove(DRIVERS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(FragmentError::InvalidSection {
                    section: DRIVERS_KEY.to_string(),
                    expected: "an array",
                })
            }
        };

        let locales = match root.shift_remove(LOCALES_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(_) => {
                return Err(FragmentError::InvalidSection {
                    section: LOCALES_KEY.to_string(),
                    expected: "an object keyed by language",
                })
            }
        };

        Ok(Self {
            views,
            device_classes,
            devices,
            signals,
            drivers,
            locales,
            globals: root,
        })
    }

    /// Rewrite relative path leaves of every section except locales
    pub fn rewrite_paths(&self, rewriter: &PathRewriter) -> Result<Self, PathError> {
        let object = |map: &Map<String, Value>| -> Result<Map<String, Value>, PathError> {
            match rewriter.rewrite(&Value::Object(map.clone()))? {
                Value::Object(rewritten) => Ok(rewritten),
                _ => Ok(Map::new()),
            }
        };

        let drivers = self
            .drivers
            .iter()
            .map(|driver| rewriter.rewrite(driver))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            views: object(&self.views)?,
            device_classes: object(&self.device_classes)?,
            devices: object(&self.devices)?,
            signals: object(&self.signals)?,
            drivers,
            locales: self.locales.clone(),
            globals: object(&self.globals)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
            && self.device_classes.is_empty()
            && self.devices.is_empty()
            && self.signals.is_empty()
            && self.drivers.is_empty()
            && self.locales.is_none()
            && self.globals.is_empty()
    }
}

fn take_object(root: &mut Map<String, Value>, key: &str) -> Result<Map<String, Value>, FragmentError> {
    match root.shift_remove(key) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(FragmentError::InvalidSection {
            section: key.to_string(),
            expected: "an object keyed by id",
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
