//! Platform manifest emission
//!
//! Builds the `{signals, drivers, flow}` descriptor the host platform reads
//! from finalized devices. Text keys are replaced by `{lang: text}` maps.

use std::fmt;

use rfgen_signal::SignalRegistry;
use serde::Serialize;
use serde_json::{Map, Value};

use super::device::{is_truthy, FLOW_SECTIONS, VIEWS_KEY};
use crate::error::CompileError;
use crate::fragment::{is_relative_reference, PathRewriter};
use crate::locale::LocaleSet;
use crate::resolve::{IMAGES_KEY, OPTIONS_KEY, PAIR_KEY};
use crate::settings::ConfigType;

/// Keys whose string values are localized in manifest output
const LOCALIZED_KEYS: &[&str] = &["label", "title", "placeholder"];

/// Advisory finding about a device. Never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advisory {
    pub device: String,
    pub message: String,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.device, self.message)
    }
}

/// Check a finalized device for fields the platform expects
pub fn advisories(id: &str, device: &Map<String, Value>) -> Vec<Advisory> {
    let images = device.get(IMAGES_KEY);
    let checks = [
        (device.get("name"), "No name set"),
        (device.get("class"), "No device class set"),
        (device.get("icon"), "No icon set"),
        (images.and_then(|i| i.get("small")), "No small image set"),
        (images.and_then(|i| i.get("large")), "No large image set"),
    ];

    checks
        .into_iter()
        .filter(|(value, _)| !is_truthy(*value))
        .map(|(_, message)| Advisory {
            device: id.to_string(),
            message: message.to_string(),
        })
        .collect()
}

/// Prev/next links of one pairing step
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Navigation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// One step of a driver's pairing wizard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairStep {
    pub id: String,
    /// Platform-provided template name; local templates are omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    pub navigation: Navigation,
}

/// Driver entry generated from a device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestDriver {
    pub id: String,
    pub name: Value,
    pub class: Value,
    pub capabilities: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair: Option<Vec<PairStep>>,
}

/// A generated driver or a raw one passed through from a fragment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ManifestEntry {
    Generated(ManifestDriver),
    Raw(Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowCards {
    pub triggers: Vec<Value>,
    pub conditions: Vec<Value>,
    pub actions: Vec<Value>,
}

impl FlowCards {
    fn section_mut(&mut self, section: &str) -> Option<&mut Vec<Value>> {
        match section {
            "triggers" => Some(&mut self.triggers),
            "conditions" => Some(&mut self.conditions),
            "actions" => Some(&mut self.actions),
            _ => None,
        }
    }
}

/// Platform manifest descriptor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppManifest {
    /// Signals keyed by config type, then id
    pub signals: Map<String, Value>,
    pub drivers: Vec<ManifestEntry>,
    pub flow: FlowCards,
}

impl AppManifest {
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Inputs for one manifest build
pub(crate) struct ManifestBuilder<'a> {
    pub config_type: ConfigType,
    pub devices: &'a Map<String, Value>,
    pub raw_drivers: &'a [Value],
    pub declared_signals: &'a Map<String, Value>,
    pub global_flow: Option<&'a Value>,
    pub registry: &'a SignalRegistry,
    pub locales: &'a LocaleSet,
    pub path_prefix: &'a str,
}

impl ManifestBuilder<'_> {
    pub fn build(&self) -> Result<AppManifest, CompileError> {
        let rewriter = PathRewriter::new(self.path_prefix)?;

        let mut drivers = Vec::with_capacity(self.devices.len() + self.raw_drivers.len());
        let mut flow = FlowCards::default();

        for (id, device) in self.devices {
            let device = rewriter.rewrite(device)?;
            let Value::Object(device) = device else {
                continue;
            };
            drivers.push(ManifestEntry::Generated(self.driver(id, &device)));

            for section in FLOW_SECTIONS {
                if let (Some(Value::Array(cards)), Some(out)) = (device.get(section), flow.section_mut(section)) {
                    out.extend(cards.iter().map(|card| self.localize(card.clone())));
                }
            }
        }

        for raw in self.raw_drivers {
            drivers.push(ManifestEntry::Raw(rewriter.rewrite(raw)?));
        }

        if let Some(global) = self.global_flow {
            let global = self.localize(global.clone());
            for section in FLOW_SECTIONS {
                if let (Some(Value::Array(cards)), Some(out)) = (global.get(section), flow.section_mut(section)) {
                    out.extend(cards.iter().cloned());
                }
            }
        }

        Ok(AppManifest {
            signals: self.signals(),
            drivers,
            flow,
        })
    }

    fn signals(&self) -> Map<String, Value> {
        let mut signals = Map::new();
        for config_type in ConfigType::ALL {
            signals.insert(config_type.as_str().to_string(), Value::Object(Map::new()));
        }

        for (config_type, declared) in self.declared_signals {
            let slot = signals
                .entry(config_type.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let (Value::Object(slot), Value::Object(declared)) = (slot, declared) {
                for (id, definition) in declared {
                    slot.insert(id.clone(), definition.clone());
                }
            }
        }

        if let Some(Value::Object(slot)) = signals.get_mut(self.config_type.as_str()) {
            for signal in self.registry.iter() {
                let mut definition = signal.content.clone();
                if let Some(commands) = signal.commands {
                    definition.insert("cmds".to_string(), Value::Object(commands.clone()));
                }
                slot.insert(signal.id.to_string(), Value::Object(definition));
            }
        }

        signals
    }

    fn driver(&self, id: &str, device: &Map<String, Value>) -> ManifestDriver {
        let name = match device.get("name") {
            Some(Value::String(name)) => self.locales.localized(name),
            Some(other) => other.clone(),
            None => Value::Null,
        };

        ManifestDriver {
            id: id.to_string(),
            name,
            class: device.get("class").cloned().unwrap_or(Value::Null),
            capabilities: device
                .get("capabilities")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new())),
            images: device.get(IMAGES_KEY).cloned(),
            settings: device.get("settings").map(|s| self.localize(s.clone())),
            pair: pair_steps(device),
        }
    }

    /// Replace text keys with `{lang: text}` maps
    fn localize(&self, mut value: Value) -> Value {
        localize_in_place(&mut value, self.locales);
        value
    }
}

fn localize_in_place(value: &mut Value, locales: &LocaleSet) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let localized = match &*child {
                    Value::String(text) if LOCALIZED_KEYS.contains(&key.as_str()) => {
                        Some(locales.localized(text))
                    }
                    _ => None,
                };
                match localized {
                    Some(localized) => *child = localized,
                    None => localize_in_place(child, locales),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                localize_in_place(item, locales);
            }
        }
        _ => {}
    }
}

/// Pairing steps with navigation derived from position or explicit ids
fn pair_steps(device: &Map<String, Value>) -> Option<Vec<PairStep>> {
    let views = device
        .get(PAIR_KEY)
        .and_then(|p| p.get(VIEWS_KEY))
        .and_then(Value::as_array)
        .filter(|views| !views.is_empty())?;

    let ids: Vec<String> = views
        .iter()
        .map(|v| v.get("id").and_then(Value::as_str).unwrap_or_default().to_string())
        .collect();

    let steps = views
        .iter()
        .enumerate()
        .map(|(index, view)| {
            let template = view
                .get("template")
                .and_then(Value::as_str)
                .filter(|t| !is_relative_reference(t))
                .map(str::to_string);

            let options = view.get(OPTIONS_KEY);
            let link = |option: &str, neighbour: Option<usize>| -> Option<String> {
                let value = options.and_then(|o| o.get(option));
                match value {
                    Some(Value::String(target)) if !target.is_empty() => Some(target.clone()),
                    _ if is_truthy(value) => neighbour.and_then(|n| ids.get(n)).cloned(),
                    _ => None,
                }
            };

            PairStep {
                id: ids[index].clone(),
                template,
                navigation: Navigation {
                    prev: link("previous", index.checked_sub(1)),
                    next: link("next", Some(index + 1)),
                },
            }
        })
        .collect();

    Some(steps)
}
