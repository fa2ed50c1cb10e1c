//! Compile report
//!
//! Summary of one run: what was compiled, which settings sources were in
//! effect, and every non-fatal finding.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::manifest::Advisory;
use crate::locale::LocaleWarning;
use crate::settings::{ConfigType, SettingsSource};

/// Schema version for compile reports
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "rfgen/compile_report@1";

/// Entity counts of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompileCounts {
    pub fragments: usize,
    pub views: usize,
    pub device_classes: usize,
    pub devices: usize,
    pub signals: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompileReport {
    pub schema_version: u32,
    pub schema_id: String,
    pub created_at: DateTime<Utc>,
    pub config_type: ConfigType,
    pub counts: CompileCounts,

    /// Settings sources in precedence order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub settings_sources: Vec<SettingsSource>,

    pub advisories: Vec<Advisory>,
    pub missing_translations: Vec<LocaleWarning>,
}

impl CompileReport {
    pub fn new(config_type: ConfigType, counts: CompileCounts) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config_type,
            counts,
            settings_sources: Vec::new(),
            advisories: Vec::new(),
            missing_translations: Vec::new(),
        }
    }

    pub fn with_settings_sources(mut self, sources: Vec<SettingsSource>) -> Self {
        self.settings_sources = sources;
        self
    }

    /// Number of non-fatal findings
    pub fn warning_count(&self) -> usize {
        self.advisories.len() + self.missing_translations.len()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsOrigin;

    #[test]
    fn test_report_serialization() {
        let mut report = CompileReport::new(
            ConfigType::Rf433,
            CompileCounts {
                fragments: 2,
                views: 3,
                device_classes: 1,
                devices: 1,
                signals: 1,
            },
        )
        .with_settings_sources(vec![SettingsSource {
            origin: SettingsOrigin::Builtin,
            path: None,
            digest: None,
        }]);
        report.advisories.push(Advisory {
            device: "lamp1".into(),
            message: "No icon set".into(),
        });

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["schema_id"], SCHEMA_ID);
        assert_eq!(value["config_type"], "433");
        assert_eq!(value["counts"]["views"], 3);
        assert_eq!(value["settings_sources"][0]["origin"], "builtin");
        assert_eq!(value["advisories"][0]["device"], "lamp1");
        assert_eq!(report.warning_count(), 1);
    }

    #[test]
    fn test_empty_sources_omitted() {
        let report = CompileReport::new(ConfigType::Ir, CompileCounts::default());

        let raw = report.to_json().unwrap();
        assert!(raw.contains("\"config_type\": \"ir\""));
        assert!(!raw.contains("settings_sources"));
    }
}
