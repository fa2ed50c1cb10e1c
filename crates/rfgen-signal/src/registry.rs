//! Signal registry
//!
//! Assigns one id per distinct signal content and binds each id to the
//! command table of its first registration.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::canonical::{CanonicalSignal, SignalId, ID_FIELD, TRANSFORM_FIELD};
use crate::commands::{normalize_commands, CommandTable, CommandTransform};
use crate::error::SignalError;

/// Highest receiver sensitivity the host platform accepts
pub const DEFAULT_MAX_SENSITIVITY: f64 = 0.5;

const CMDS_FIELD: &str = "cmds";
const SENSITIVITY_FIELD: &str = "sensitivity";

type SharedTransform = Arc<dyn CommandTransform + Send + Sync>;

/// Outcome of a single `register` call
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// Id bound to the signal content
    pub id: SignalId,
    /// Stored content (bookkeeping fields removed, sensitivity clamped)
    pub content: Map<String, Value>,
    /// Flattened command names bound to this id, if the signal has commands
    pub commands: Option<Vec<String>>,
    /// Whether this call created the id
    pub is_new: bool,
}

/// Read-only view of a registered signal
#[derive(Debug, Clone, Copy)]
pub struct RegisteredSignal<'a> {
    pub id: &'a SignalId,
    pub content: &'a Map<String, Value>,
    pub commands: Option<&'a CommandTable>,
}

#[derive(Debug, Clone)]
struct Entry {
    id: SignalId,
    canonical: CanonicalSignal,
    commands: Option<CommandTable>,
}

/// Registry of signal definitions for one compilation run
#[derive(Clone)]
pub struct SignalRegistry {
    entries: Vec<Entry>,
    by_id: HashMap<SignalId, usize>,
    by_content: HashMap<Vec<u8>, usize>,
    transforms: HashMap<String, SharedTransform>,
    max_sensitivity: f64,
}

impl Default for SignalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SignalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut transforms: Vec<&String> = self.transforms.keys().collect();
        transforms.sort();
        f.debug_struct("SignalRegistry")
            .field("signals", &self.entries.iter().map(|e| &e.id).collect::<Vec<_>>())
            .field("transforms", &transforms)
            .field("max_sensitivity", &self.max_sensitivity)
            .finish()
    }
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_id: HashMap::new(),
            by_content: HashMap::new(),
            transforms: HashMap::new(),
            max_sensitivity: DEFAULT_MAX_SENSITIVITY,
        }
    }

    /// Set the sensitivity ceiling applied before hashing
    pub fn with_max_sensitivity(mut self, max: f64) -> Self {
        self.max_sensitivity = max;
        self
    }

    /// Make a transform available to definitions naming it in `transform`
    pub fn register_transform<T>(&mut self, name: impl Into<String>, transform: T)
    where
        T: CommandTransform + Send + Sync + 'static,
    {
        self.transforms.insert(name.into(), Arc::new(transform));
    }

    /// Register a signal definition and return its id.
    ///
    /// Equal content always maps to the same id. A caller-supplied `id`
    /// takes precedence over the content hash. An id keeps the definition
    /// and command table of its first registration; later registrations
    /// under that id reuse them.
    pub fn register(&mut self, definition: &Value) -> Result<Registration, SignalError> {
        let definition = self.clamp_sensitivity(definition);
        let canonical = CanonicalSignal::from_definition(&definition)?;
        let supplied = supplied_id(&definition)?;

        let existing = match &supplied {
            Some(id) => self.by_id.get(id).copied(),
            None => self.by_content.get(canonical.as_bytes()).copied(),
        };

        if let Some(index) = existing {
            let entry = &self.entries[index];
            if entry.canonical.as_bytes() != canonical.as_bytes() {
                debug!(signal = %entry.id, "definition differs from first registration, keeping the first");
            } else if entry.commands.is_some() {
                debug!(signal = %entry.id, "reusing command table of first registration");
            }
            return Ok(registration(entry, false));
        }

        let id = supplied
            .clone()
            .unwrap_or_else(|| canonical.content_id());
        if self.by_id.contains_key(&id) {
            return Err(SignalError::IdConflict { id: id.to_string() });
        }

        let commands = match canonical.content().get(CMDS_FIELD) {
            Some(cmds) => {
                let transform = self.transform_for(&definition)?;
                let transform = transform
                    .as_ref()
                    .map(|t| &**t as &dyn CommandTransform);
                Some(normalize_commands(cmds, transform)?)
            }
            None => None,
        };

        let index = self.entries.len();
        self.by_content
            .entry(canonical.as_bytes().to_vec())
            .or_insert(index);
        self.entries.push(Entry {
            id: id.clone(),
            canonical,
            commands,
        });
        self.by_id.insert(id.clone(), index);
        debug!(signal = %id, "registered signal");

        Ok(registration(&self.entries[index], true))
    }

    /// Whether an id is registered
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(&SignalId::new(id))
    }

    /// Look up a registered signal
    pub fn get(&self, id: &str) -> Option<RegisteredSignal<'_>> {
        self.by_id
            .get(&SignalId::new(id))
            .map(|&index| view(&self.entries[index]))
    }

    /// Registered signals in registration order
    pub fn iter(&self) -> impl Iterator<Item = RegisteredSignal<'_>> {
        self.entries.iter().map(view)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn clamp_sensitivity(&self, definition: &Value) -> Value {
        let mut definition = definition.clone();
        if let Some(map) = definition.as_object_mut() {
            let sensitivity = map.get(SENSITIVITY_FIELD).and_then(Value::as_f64);
            if let Some(sensitivity) = sensitivity {
                if sensitivity > self.max_sensitivity {
                    warn!(
                        sensitivity,
                        max = self.max_sensitivity,
                        "signal sensitivity above supported maximum, clamping"
                    );
                    map.insert(SENSITIVITY_FIELD.to_string(), Value::from(self.max_sensitivity));
                }
            }
        }
        definition
    }

    fn transform_for(&self, definition: &Value) -> Result<Option<SharedTransform>, SignalError> {
        match definition.get(TRANSFORM_FIELD) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(name)) => self
                .transforms
                .get(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| SignalError::UnknownTransform(name.clone())),
            Some(other) => Err(SignalError::UnknownTransform(other.to_string())),
        }
    }
}

fn supplied_id(definition: &Value) -> Result<Option<SignalId>, SignalError> {
    match definition.get(ID_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(SignalId::new(id.clone()))),
        Some(Value::Number(n)) => Ok(Some(SignalId::new(n.to_string()))),
        Some(_) => Err(SignalError::InvalidId),
    }
}

fn view(entry: &Entry) -> RegisteredSignal<'_> {
    RegisteredSignal {
        id: &entry.id,
        content: entry.canonical.content(),
        commands: entry.commands.as_ref(),
    }
}

fn registration(entry: &Entry, is_new: bool) -> Registration {
    Registration {
        id: entry.id.clone(),
        content: entry.canonical.content().clone(),
        commands: entry
            .commands
            .as_ref()
            .map(|table| table.keys().cloned().collect()),
        is_new,
    }
}
