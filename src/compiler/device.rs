//! Device finalization
//!
//! Turns a device resolved through its class lineage into its emitted
//! form: driver and signal fallbacks applied, the signal registered, the
//! pairing flow expanded into concrete views, and flow cards namespaced.

use rfgen_signal::{SignalError, SignalRegistry, ID_FIELD};
use serde_json::{json, Map, Value};

use crate::error::CompileError;
use crate::resolve::{Entity, APPEND_KEY, OPTIONS_KEY, PAIR_KEY, PREPEND_KEY, VIEW_OPTIONS_KEY, VIEW_ORDER_KEY};

pub const DRIVER_KEY: &str = "driver";
pub const SIGNAL_KEY: &str = "signal";
pub const SIGNAL_DEFINITION_KEY: &str = "signalDefinition";
pub const CMDS_KEY: &str = "cmds";
pub const VIEWS_KEY: &str = "views";

/// Flow card sections of a device
pub const FLOW_SECTIONS: [&str; 3] = ["triggers", "conditions", "actions"];

/// Inputs shared by every device of one finalize pass
pub(crate) struct DeviceFinalizer<'a> {
    pub views: &'a Map<String, Value>,
    /// Declared signals of the active config type, by id
    pub declared_signals: Option<&'a Map<String, Value>>,
    pub global_driver: Option<&'a Value>,
    pub global_signal: Option<&'a Value>,
}

impl DeviceFinalizer<'_> {
    pub fn finalize(
        &self,
        id: &str,
        mut device: Entity,
        registry: &mut SignalRegistry,
    ) -> Result<Entity, CompileError> {
        if is_unset(device.get(DRIVER_KEY)) {
            if let Some(driver) = self.global_driver {
                device.insert(DRIVER_KEY.to_string(), driver.clone());
            }
        }

        self.assign_signal(id, &mut device, registry)?;

        if let Some(Value::Object(pair)) = device.get(PAIR_KEY) {
            if pair.contains_key(VIEW_ORDER_KEY) {
                let expanded = self.expand_pair(id, pair)?;
                device.insert(PAIR_KEY.to_string(), Value::Object(expanded));
            }
        }

        for section in FLOW_SECTIONS {
            if let Some(Value::Array(cards)) = device.get_mut(section) {
                for card in cards.iter_mut() {
                    namespace_card(id, card);
                }
            }
        }

        Ok(device)
    }

    fn assign_signal(
        &self,
        id: &str,
        device: &mut Entity,
        registry: &mut SignalRegistry,
    ) -> Result<(), CompileError> {
        let signal = match device.get(SIGNAL_KEY) {
            Some(value) if !value.is_null() => value.clone(),
            _ => self
                .global_signal
                .cloned()
                .ok_or_else(|| CompileError::NoSignal {
                    device: id.to_string(),
                })?,
        };

        let definition = match signal {
            Value::String(reference) => self.declared(id, &reference, registry)?,
            other => other,
        };

        let invalid = |source: SignalError| CompileError::InvalidSignal {
            device: id.to_string(),
            source,
        };
        let registration = registry.register(&definition).map_err(invalid)?;

        let mut signal_definition = registration.content;
        if let Some(commands) = registration.commands {
            signal_definition.insert(
                CMDS_KEY.to_string(),
                Value::Array(commands.into_iter().map(Value::String).collect()),
            );
        }

        device.insert(SIGNAL_KEY.to_string(), Value::String(registration.id.to_string()));
        device.insert(
            SIGNAL_DEFINITION_KEY.to_string(),
            Value::Object(signal_definition),
        );
        Ok(())
    }

    /// Definition of a signal referenced by id: a declared signal, or one
    /// already registered under that id
    fn declared(
        &self,
        device: &str,
        reference: &str,
        registry: &SignalRegistry,
    ) -> Result<Value, CompileError> {
        if let Some(Value::Object(declared)) = self.declared_signals.and_then(|s| s.get(reference)) {
            let mut definition = declared.clone();
            definition.insert(ID_FIELD.to_string(), Value::String(reference.to_string()));
            return Ok(Value::Object(definition));
        }

        if let Some(registered) = registry.get(reference) {
            let mut definition = registered.content.clone();
            definition.insert(ID_FIELD.to_string(), Value::String(reference.to_string()));
            return Ok(Value::Object(definition));
        }

        Err(CompileError::UnknownSignal {
            device: device.to_string(),
            signal: reference.to_string(),
        })
    }

    /// Replace a pairing descriptor with `{viewOrder, views}`, each view
    /// carrying its resolved option values
    fn expand_pair(&self, device: &str, pair: &Map<String, Value>) -> Result<Map<String, Value>, CompileError> {
        let order = pair.get(VIEW_ORDER_KEY).cloned().unwrap_or(Value::Null);
        let names: Vec<String> = match &order {
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(name) => Ok(name.clone()),
                    other => Err(CompileError::UnknownView {
                        device: device.to_string(),
                        view: other.to_string(),
                    }),
                })
                .collect::<Result<_, _>>()?,
            Value::String(name) => vec![name.clone()],
            _ => Vec::new(),
        };

        let overrides = pair.get(VIEW_OPTIONS_KEY).and_then(Value::as_object);

        let mut views = Vec::with_capacity(names.len());
        for name in &names {
            let Some(Value::Object(view)) = self.views.get(name) else {
                return Err(CompileError::UnknownView {
                    device: device.to_string(),
                    view: name.clone(),
                });
            };

            let mut values = overrides
                .and_then(|o| o.get(name))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();

            let mut schema = view
                .get(OPTIONS_KEY)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            schema.insert(PREPEND_KEY.to_string(), json!({}));
            schema.insert(APPEND_KEY.to_string(), json!({}));

            for (option, fields) in &schema {
                if values.contains_key(option) {
                    continue;
                }
                match fields.get("default") {
                    Some(default) => {
                        values.insert(option.clone(), default.clone());
                    }
                    None if is_truthy(fields.get("required")) => {
                        return Err(CompileError::MissingOption {
                            device: device.to_string(),
                            view: name.clone(),
                            option: option.clone(),
                        });
                    }
                    None => {
                        values.insert(option.clone(), Value::String(String::new()));
                    }
                }
            }

            let mut expanded = view.clone();
            expanded.insert(OPTIONS_KEY.to_string(), Value::Object(values));
            expanded.insert("id".to_string(), Value::String(name.clone()));
            views.push(Value::Object(expanded));
        }

        let mut out = Map::new();
        out.insert(VIEW_ORDER_KEY.to_string(), order);
        out.insert(VIEWS_KEY.to_string(), Value::Array(views));
        Ok(out)
    }
}

/// Prefix a card id with the device id and append the device argument
fn namespace_card(device: &str, card: &mut Value) {
    let Value::Object(card) = card else {
        return;
    };

    let id = match card.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    card.insert("id".to_string(), Value::String(format!("{}:{}", device, id)));

    let args = card
        .entry("args".to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !args.is_array() {
        *args = Value::Array(Vec::new());
    }
    if let Value::Array(args) = args {
        args.push(json!({
            "name": "device",
            "type": "device",
            "filter": format!("driver_id={}", device),
        }));
    }
}

fn is_unset(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Loose truthiness: false, null, 0, "" and absence are false
pub(crate) fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn views() -> Map<String, Value> {
        json!({
            "choice": {
                "template": "./pair/choice.html",
                "options": {"title": {"required": true}, "body": {"default": "pair.choice.body"}},
                "prepend": [],
                "append": []
            },
            "done": {
                "template": "./pair/done.html",
                "options": {"title": {"required": true}},
                "prepend": [],
                "append": []
            }
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn device(value: Value) -> Entity {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_global_fallbacks() {
        let views = views();
        let driver = json!("./drivers/driver.js");
        let signal = json!({"sof": [1, 2]});
        let finalizer = DeviceFinalizer {
            views: &views,
            declared_signals: None,
            global_driver: Some(&driver),
            global_signal: Some(&signal),
        };
        let mut registry = SignalRegistry::new();

        let lamp = finalizer
            .finalize("lamp1", device(json!({"id": "lamp1"})), &mut registry)
            .unwrap();

        assert_eq!(lamp["driver"], "./drivers/driver.js");
        assert_eq!(lamp["signalDefinition"]["sof"], json!([1, 2]));
        assert!(registry.contains(lamp["signal"].as_str().unwrap()));
    }

    #[test]
    fn test_no_signal() {
        let views = views();
        let finalizer = DeviceFinalizer {
            views: &views,
            declared_signals: None,
            global_driver: None,
            global_signal: None,
        };

        let err = finalizer
            .finalize("lamp1", device(json!({})), &mut SignalRegistry::new())
            .unwrap_err();
        assert!(matches!(err, CompileError::NoSignal { ref device } if device == "lamp1"));
    }

    #[test]
    fn test_declared_signal_reference() {
        let views = views();
        let declared = json!({"kaku": {"sof": [9], "cmds": {"on": 1, "off": 0}}});
        let finalizer = DeviceFinalizer {
            views: &views,
            declared_signals: declared.as_object(),
            global_driver: None,
            global_signal: None,
        };
        let mut registry = SignalRegistry::new();

        let lamp = finalizer
            .finalize("lamp1", device(json!({"signal": "kaku"})), &mut registry)
            .unwrap();

        assert_eq!(lamp["signal"], "kaku");
        assert_eq!(lamp["signalDefinition"]["cmds"], json!(["on", "off"]));

        let err = finalizer
            .finalize("lamp2", device(json!({"signal": "ghost"})), &mut registry)
            .unwrap_err();
        assert!(matches!(err, CompileError::UnknownSignal { ref signal, .. } if signal == "ghost"));
    }

    #[test]
    fn test_pair_expansion() {
        let views = views();
        let signal = json!({"sof": [1]});
        let finalizer = DeviceFinalizer {
            views: &views,
            declared_signals: None,
            global_driver: None,
            global_signal: Some(&signal),
        };

        let lamp = finalizer
            .finalize(
                "lamp1",
                device(json!({"pair": {
                    "viewOrder": ["choice", "done"],
                    "viewOptions": {
                        "choice": {"title": "pair.begin", "prepend": ["<b>"], "append": []},
                        "done": {"title": "done!"}
                    }
                }})),
                &mut SignalRegistry::new(),
            )
            .unwrap();

        let pair = &lamp["pair"];
        assert_eq!(pair["viewOrder"], json!(["choice", "done"]));
        assert!(pair.get("viewOptions").is_none());

        let choice = &pair["views"][0];
        assert_eq!(choice["id"], "choice");
        assert_eq!(choice["template"], "./pair/choice.html");
        assert_eq!(choice["options"]["title"], "pair.begin");
        assert_eq!(choice["options"]["body"], "pair.choice.body");
        assert_eq!(choice["options"]["prepend"], json!(["<b>"]));

        let done = &pair["views"][1];
        assert_eq!(done["options"]["title"], "done!");
        assert_eq!(done["options"]["prepend"], "");
        assert_eq!(done["options"]["append"], "");
    }

    #[test]
    fn test_missing_required_option() {
        let views = views();
        let signal = json!({"sof": [1]});
        let finalizer = DeviceFinalizer {
            views: &views,
            declared_signals: None,
            global_driver: None,
            global_signal: Some(&signal),
        };

        let err = finalizer
            .finalize(
                "lamp1",
                device(json!({"pair": {"viewOrder": ["done"]}})),
                &mut SignalRegistry::new(),
            )
            .unwrap_err();

        match err {
            CompileError::MissingOption { device, view, option } => {
                assert_eq!(device, "lamp1");
                assert_eq!(view, "done");
                assert_eq!(option, "title");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_view() {
        let views = views();
        let signal = json!({"sof": [1]});
        let finalizer = DeviceFinalizer {
            views: &views,
            declared_signals: None,
            global_driver: None,
            global_signal: Some(&signal),
        };

        let err = finalizer
            .finalize(
                "lamp1",
                device(json!({"pair": {"viewOrder": ["ghost"]}})),
                &mut SignalRegistry::new(),
            )
            .unwrap_err();
        assert!(matches!(err, CompileError::UnknownView { ref view, .. } if view == "ghost"));
    }

    #[test]
    fn test_flow_cards_namespaced() {
        let views = views();
        let signal = json!({"sof": [1]});
        let finalizer = DeviceFinalizer {
            views: &views,
            declared_signals: None,
            global_driver: None,
            global_signal: Some(&signal),
        };

        let lamp = finalizer
            .finalize(
                "lamp1",
                device(json!({
                    "triggers": [{"id": "received", "title": "flow.received"}],
                    "actions": [{"id": "send", "args": [{"name": "state", "type": "checkbox"}]}]
                })),
                &mut SignalRegistry::new(),
            )
            .unwrap();

        assert_eq!(lamp["triggers"][0]["id"], "lamp1:received");
        assert_eq!(
            lamp["triggers"][0]["args"],
            json!([{"name": "device", "type": "device", "filter": "driver_id=lamp1"}])
        );
        assert_eq!(lamp["actions"][0]["id"], "lamp1:send");
        assert_eq!(lamp["actions"][0]["args"][1]["filter"], "driver_id=lamp1");
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!("generic_done"))));
        assert!(!is_truthy(Some(&json!(false))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(None));
    }
}
