//! Effective compiler settings with provenance
//!
//! The merged settings object plus the list of sources that contributed
//! to it, each file source identified by path and content digest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use crate::compiler::CompilerOptions;
use crate::fragment::toml_to_json;
use crate::locale::SentinelPolicy;

/// Schema version for serialized settings
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "rfgen/settings@1";

/// Host settings file, relative to the home directory
pub const HOST_SETTINGS_PATH: &str = ".config/rfgen/settings.toml";

/// Project settings file, relative to the project root
pub const PROJECT_SETTINGS_FILE: &str = ".rfgen.toml";

/// Radio family a compilation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigType {
    #[serde(rename = "433")]
    Rf433,
    #[serde(rename = "868")]
    Rf868,
    #[serde(rename = "ir")]
    Ir,
}

impl ConfigType {
    pub const ALL: [ConfigType; 3] = [ConfigType::Rf433, ConfigType::Rf868, ConfigType::Ir];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigType::Rf433 => "433",
            ConfigType::Rf868 => "868",
            ConfigType::Ir => "ir",
        }
    }

    /// Namespace of runtime strings in the built-in locales
    pub fn generator_namespace(&self) -> String {
        format!("{}_generator", self.as_str())
    }
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConfigType {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "433" => Ok(ConfigType::Rf433),
            "868" => Ok(ConfigType::Rf868),
            "ir" => Ok(ConfigType::Ir),
            other => Err(SettingsError::ValidationError(format!(
                "config_type must be one of 433, 868, ir; got '{}'",
                other
            ))),
        }
    }
}

/// Origin of a settings source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettingsOrigin {
    Builtin,
    Host,
    Project,
    Cli,
}

/// A contributing settings source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsSource {
    pub origin: SettingsOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged compiler settings with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerSettings {
    pub schema_version: u32,
    pub schema_id: String,

    /// When these settings were computed
    pub created_at: DateTime<Utc>,

    /// The merged settings object
    pub settings: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<SettingsSource>,
}

impl CompilerSettings {
    /// Build settings from layers. Missing files are skipped.
    pub fn build(
        host_path: Option<&Path>,
        project_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, SettingsError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![SettingsSource {
            origin: SettingsOrigin::Builtin,
            path: None,
            digest: None,
        }];

        for (origin, path) in [
            (SettingsOrigin::Host, host_path),
            (SettingsOrigin::Project, project_path),
        ] {
            let Some(path) = path.filter(|p| p.exists()) else {
                continue;
            };
            let (value, digest) = Self::load_toml_file(path)?;
            layers.push(value);
            sources.push(SettingsSource {
                origin,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(SettingsSource {
                origin: SettingsOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let settings = merge_layers(layers);
        Self::validate(&settings)?;

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            settings,
            sources,
        })
    }

    /// Build settings for a project root, reading the host file from
    /// `$HOME` and the project file from the root.
    pub fn for_root(root: &Path, cli_overrides: Option<Value>) -> Result<Self, SettingsError> {
        let host = std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(HOST_SETTINGS_PATH));
        let project = root.join(PROJECT_SETTINGS_FILE);

        Self::build(host.as_deref(), Some(&project), cli_overrides)
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), SettingsError> {
        let bytes = fs::read(path).map_err(|e| SettingsError::IoError(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| SettingsError::ParseError(format!("Invalid UTF-8: {}", e)))?;
        let toml_value: toml::Value = toml::from_str(&contents)
            .map_err(|e| SettingsError::ParseError(format!("TOML parse error: {}", e)))?;

        Ok((toml_to_json(toml_value), digest))
    }

    fn validate(settings: &Value) -> Result<(), SettingsError> {
        config_type_of(settings)?;

        match settings.pointer("/signal/max_sensitivity") {
            None => {}
            Some(value) => match value.as_f64() {
                Some(max) if max > 0.0 && max <= 2.0 => {}
                _ => {
                    return Err(SettingsError::ValidationError(
                        "signal.max_sensitivity must be in (0, 2]".to_string(),
                    ))
                }
            },
        }

        if let Some(sentinel) = settings.pointer("/locales/sentinel") {
            let sentinel = sentinel.as_str().unwrap_or_default();
            sentinel.parse::<SentinelPolicy>().map_err(|_| {
                SettingsError::ValidationError(format!(
                    "locales.sentinel must be 'keep' or 'strip'; got '{}'",
                    sentinel
                ))
            })?;
        }

        for key in ["config_dir", "driver_dir"] {
            if let Some(value) = settings.get(key) {
                if !value.is_string() {
                    return Err(SettingsError::ValidationError(format!(
                        "{} must be a string",
                        key
                    )));
                }
            }
        }

        Ok(())
    }

    /// Get a settings value by path (dot-separated)
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.settings;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(|v| v.as_f64())
    }

    pub fn config_type(&self) -> ConfigType {
        config_type_of(&self.settings).unwrap_or(ConfigType::Rf433)
    }

    pub fn config_dir(&self) -> &str {
        self.get_str("config_dir").unwrap_or("433_generator")
    }

    pub fn driver_dir(&self) -> &str {
        self.get_str("driver_dir").unwrap_or("drivers")
    }

    pub fn locales_dir(&self) -> &str {
        self.get_str("locales.dir").unwrap_or("locales")
    }

    pub fn sentinel_policy(&self) -> SentinelPolicy {
        self.get_str("locales.sentinel")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub fn max_sensitivity(&self) -> f64 {
        self.get_f64("signal.max_sensitivity")
            .unwrap_or(rfgen_signal::DEFAULT_MAX_SENSITIVITY)
    }

    /// Options for a compiler driven by these settings
    pub fn compiler_options(&self) -> CompilerOptions {
        CompilerOptions {
            config_type: self.config_type(),
            max_sensitivity: self.max_sensitivity(),
            driver_dir: self.driver_dir().trim_matches('/').to_string(),
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// `config_type` may be written as a string or as a bare number in TOML
fn config_type_of(settings: &Value) -> Result<ConfigType, SettingsError> {
    match settings.get("config_type") {
        None => Ok(ConfigType::Rf433),
        Some(Value::String(s)) => s.parse(),
        Some(Value::Number(n)) => n.to_string().parse(),
        Some(other) => Err(SettingsError::ValidationError(format!(
            "config_type must be one of 433, 868, ir; got {}",
            other
        ))),
    }
}

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_build_with_defaults_only() {
        let settings = CompilerSettings::build(None, None, None).unwrap();

        assert_eq!(settings.schema_version, SCHEMA_VERSION);
        assert_eq!(settings.config_type(), ConfigType::Rf433);
        assert_eq!(settings.locales_dir(), "locales");
        assert_eq!(settings.sentinel_policy(), SentinelPolicy::Keep);
        assert_eq!(settings.max_sensitivity(), 0.5);
    }

    #[test]
    fn test_cli_override() {
        let cli = serde_json::json!({"config_type": "ir", "locales": {"sentinel": "strip"}});
        let settings = CompilerSettings::build(None, None, Some(cli)).unwrap();

        assert_eq!(settings.config_type(), ConfigType::Ir);
        assert_eq!(settings.sentinel_policy(), SentinelPolicy::Strip);
        assert_eq!(settings.locales_dir(), "locales");
    }

    #[test]
    fn test_numeric_config_type_from_toml() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "config_type = 868").unwrap();

        let settings = CompilerSettings::build(None, Some(temp.path()), None).unwrap();
        assert_eq!(settings.config_type(), ConfigType::Rf868);
        assert_eq!(settings.compiler_options().config_type, ConfigType::Rf868);
    }

    #[test]
    fn test_invalid_config_type() {
        let cli = serde_json::json!({"config_type": "915"});
        let err = CompilerSettings::build(None, None, Some(cli)).unwrap_err();

        assert!(err.to_string().contains("config_type"));
    }

    #[test]
    fn test_max_sensitivity_range() {
        for bad in [serde_json::json!(0.0), serde_json::json!(2.5), serde_json::json!("high")] {
            let cli = serde_json::json!({"signal": {"max_sensitivity": bad}});
            let err = CompilerSettings::build(None, None, Some(cli)).unwrap_err();
            assert!(err.to_string().contains("max_sensitivity"));
        }
    }

    #[test]
    fn test_invalid_sentinel() {
        let cli = serde_json::json!({"locales": {"sentinel": "mark"}});
        assert!(CompilerSettings::build(None, None, Some(cli)).is_err());
    }

    #[test]
    fn test_layers_and_sources() {
        let mut host = NamedTempFile::new().unwrap();
        writeln!(host, "[signal]").unwrap();
        writeln!(host, "max_sensitivity = 0.8").unwrap();
        let mut project = NamedTempFile::new().unwrap();
        writeln!(project, "driver_dir = \"app/drivers\"").unwrap();

        let cli = serde_json::json!({"signal": {"max_sensitivity": 0.4}});
        let settings =
            CompilerSettings::build(Some(host.path()), Some(project.path()), Some(cli)).unwrap();

        assert_eq!(settings.max_sensitivity(), 0.4);
        assert_eq!(settings.driver_dir(), "app/drivers");

        let origins: Vec<&SettingsOrigin> = settings.sources.iter().map(|s| &s.origin).collect();
        assert_eq!(
            origins,
            [
                &SettingsOrigin::Builtin,
                &SettingsOrigin::Host,
                &SettingsOrigin::Project,
                &SettingsOrigin::Cli
            ]
        );
        assert_eq!(settings.sources[1].digest.as_ref().map(String::len), Some(64));
        assert!(settings.sources[3].path.is_none());
    }

    #[test]
    fn test_missing_files_skipped() {
        let settings = CompilerSettings::build(
            Some(Path::new("/nonexistent/settings.toml")),
            Some(Path::new("/nonexistent/.rfgen.toml")),
            None,
        )
        .unwrap();

        assert_eq!(settings.sources.len(), 1);
    }
}
