//! Structured config reading
//!
//! Fragments are stored as JSON or TOML. A directory location resolves to
//! the `config.json` (or `config.toml`) inside it.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

/// File names tried when a directory is given
pub const CONFIG_FILE_NAMES: &[&str] = &["config.json", "config.toml"];

/// Errors raised while reading structured data
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("IO error reading {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("Parse error in {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported config format: {}", .path.display())]
    Unsupported { path: PathBuf },

    #[error("No config file found in {}", .path.display())]
    NotFound { path: PathBuf },
}

/// Reads structured data from a location
pub trait ConfigReader {
    fn read(&self, location: &Path) -> Result<Value, ReaderError>;
}

/// Reads `.json` and `.toml` files from disk
#[derive(Debug, Default, Clone, Copy)]
pub struct FileReader;

impl FileReader {
    /// Resolve a location to the concrete file that would be read
    pub fn locate(&self, location: &Path) -> Result<PathBuf, ReaderError> {
        if !location.is_dir() {
            return Ok(location.to_path_buf());
        }
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| location.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ReaderError::NotFound {
                path: location.to_path_buf(),
            })
    }
}

impl ConfigReader for FileReader {
    fn read(&self, location: &Path) -> Result<Value, ReaderError> {
        let path = self.locate(location)?;
        let contents = fs::read_to_string(&path).map_err(|e| ReaderError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents).map_err(|e| ReaderError::Parse {
                path: path.clone(),
                message: e.to_string(),
            }),
            Some("toml") => {
                let value: toml::Value =
                    toml::from_str(&contents).map_err(|e| ReaderError::Parse {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                Ok(toml_to_json(value))
            }
            _ => Err(ReaderError::Unsupported { path }),
        }
    }
}

/// Convert a TOML value to a JSON value
pub fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("base.json");
        fs::write(&path, r#"{"driver": "./driver.js", "views": {}}"#).unwrap();

        let value = FileReader.read(&path).unwrap();
        assert_eq!(value["driver"], "./driver.js");
    }

    #[test]
    fn test_read_toml_keeps_declaration_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[devices.zeta]\nextends = \"switch\"\n\n[devices.alpha]\nextends = \"switch\"\n",
        )
        .unwrap();

        let value = FileReader.read(&path).unwrap();
        let ids: Vec<&String> = value["devices"].as_object().unwrap().keys().collect();
        assert_eq!(ids, ["zeta", "alpha"]);
    }

    #[test]
    fn test_directory_resolves_to_config_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.json"), r#"{"devices": {}}"#).unwrap();

        let value = FileReader.read(dir.path()).unwrap();
        assert!(value["devices"].is_object());
    }

    #[test]
    fn test_directory_without_config() {
        let dir = TempDir::new().unwrap();

        assert!(matches!(
            FileReader.read(dir.path()),
            Err(ReaderError::NotFound { .. })
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.js");
        fs::write(&path, "module.exports = {};").unwrap();

        assert!(matches!(
            FileReader.read(&path),
            Err(ReaderError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = FileReader.read(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
