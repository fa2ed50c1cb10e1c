//! Locale tables
//!
//! A [`LocaleTable`] is one language's tree of dotted-path translations.
//! Whether a leaf was written by a human or filled in from a built-in
//! default is tracked in a side table, never inside the text. The reserved
//! [`SENTINEL`] suffix only exists in files on disk (see [`SentinelPolicy`]).

mod resolver;
mod store;

pub use resolver::{LocaleResolver, LocaleWarning};
pub use store::{LocaleStore, AUTOFILL_SUFFIX};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// On-disk marker for a leaf filled from a built-in default
pub const SENTINEL: char = '\u{0}';

/// Language that falls back to the raw key path
pub const DEFAULT_LANGUAGE: &str = "en";

/// Errors raised while building or persisting locale tables
#[derive(Debug, Error)]
pub enum LocaleError {
    #[error(
        "Translation key '{leaf}' collides with key '{path}'; \
         '{leaf}' cannot be a string and an object at the same time"
    )]
    Collision { leaf: String, path: String },

    #[error("Locale '{language}' must be an object")]
    NotAnObject { language: String },

    #[error("IO error on locale file {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("Parse error in locale file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

/// Where a translation leaf came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Authored,
    Fallback,
}

/// How fallback leaves are encoded when persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentinelPolicy {
    /// Suffix fallback leaves with [`SENTINEL`]
    #[default]
    Keep,
    /// Write clean text and list fallback paths in a side file
    Strip,
}

impl FromStr for SentinelPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(SentinelPolicy::Keep),
            "strip" => Ok(SentinelPolicy::Strip),
            other => Err(format!("unknown sentinel policy '{}'", other)),
        }
    }
}

impl fmt::Display for SentinelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentinelPolicy::Keep => write!(f, "keep"),
            SentinelPolicy::Strip => write!(f, "strip"),
        }
    }
}

/// One language's translations plus leaf provenance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocaleTable {
    tree: Map<String, Value>,
    fallback: BTreeSet<String>,
}

impl LocaleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a tree read from disk. Sentinel-suffixed leaves lose the
    /// marker and are recorded as fallback.
    pub fn from_tree(language: &str, tree: Value) -> Result<Self, LocaleError> {
        let Value::Object(mut tree) = tree else {
            return Err(LocaleError::NotAnObject {
                language: language.to_string(),
            });
        };

        let mut fallback = BTreeSet::new();
        let mut path = Vec::new();
        for (key, value) in tree.iter_mut() {
            path.push(key.clone());
            decode_sentinels(value, &mut path, &mut fallback);
            path.pop();
        }

        Ok(Self { tree, fallback })
    }

    /// Mark leaves as fallback (read from a side file). Paths that do not
    /// lead to a string leaf are ignored.
    pub fn mark_fallback<I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = String>,
    {
        for path in paths {
            if self.text(&path).is_some() {
                self.fallback.insert(path);
            }
        }
    }

    pub fn tree(&self) -> &Map<String, Value> {
        &self.tree
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.tree.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// The string at `path`, if any
    pub fn text(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn provenance(&self, path: &str) -> Option<Provenance> {
        self.text(path).map(|_| {
            if self.fallback.contains(path) {
                Provenance::Fallback
            } else {
                Provenance::Authored
            }
        })
    }

    /// Human-authored text at `path`. Fallback leaves and leaves equal to
    /// their own path do not count.
    pub fn authored(&self, path: &str) -> Option<&str> {
        self.text(path)
            .filter(|text| *text != path && !self.fallback.contains(path))
    }

    /// Any usable text at `path`, regardless of provenance
    pub fn translation(&self, path: &str) -> Option<&str> {
        self.text(path).filter(|text| *text != path)
    }

    /// Set a leaf, creating intermediate containers as needed.
    ///
    /// An intermediate segment holding a string, or a target holding a
    /// container, is a collision. `null` leaves are replaceable.
    pub fn set(&mut self, path: &str, value: Value, provenance: Provenance) -> Result<(), LocaleError> {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return Ok(());
        };

        let mut current = &mut self.tree;
        for (depth, segment) in parents.iter().enumerate() {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if slot.is_null() {
                *slot = Value::Object(Map::new());
            }
            current = match slot {
                Value::Object(map) => map,
                _ => {
                    return Err(LocaleError::Collision {
                        leaf: segments[..=depth].join("."),
                        path: path.to_string(),
                    })
                }
            };
        }

        if let Some(Value::Object(children)) = current.get(*last) {
            let child = children.keys().next().map(String::as_str).unwrap_or_default();
            return Err(LocaleError::Collision {
                leaf: path.to_string(),
                path: format!("{}.{}", path, child),
            });
        }

        current.insert(last.to_string(), value);
        match provenance {
            Provenance::Fallback => {
                self.fallback.insert(path.to_string());
            }
            Provenance::Authored => {
                self.fallback.remove(path);
            }
        }
        Ok(())
    }

    /// Paths of leaves filled from built-in defaults
    pub fn fallback_paths(&self) -> impl Iterator<Item = &String> {
        self.fallback.iter()
    }

    /// Tree as persisted under `policy`
    pub fn render(&self, policy: SentinelPolicy) -> Value {
        let mut tree = Value::Object(self.tree.clone());
        if policy == SentinelPolicy::Keep {
            for path in &self.fallback {
                if let Some(Value::String(text)) = pointer_mut(&mut tree, path) {
                    text.push(SENTINEL);
                }
            }
        }
        tree
    }

    /// String leaves in depth-first order
    pub fn leaves(&self) -> Vec<(String, &str)> {
        let mut out = Vec::new();
        for (key, value) in &self.tree {
            collect_leaves(key.clone(), value, &mut out);
        }
        out
    }
}

/// Every language of one run
#[derive(Debug, Clone, PartialEq)]
pub struct LocaleSet {
    tables: BTreeMap<String, LocaleTable>,
}

impl Default for LocaleSet {
    fn default() -> Self {
        Self::new()
    }
}

impl LocaleSet {
    /// A set holding an empty default-language table
    pub fn new() -> Self {
        let mut tables = BTreeMap::new();
        tables.insert(DEFAULT_LANGUAGE.to_string(), LocaleTable::new());
        Self { tables }
    }

    /// Build from `{lang: tree}` (authored leaves, sentinels decoded)
    pub fn from_value(value: &Value) -> Result<Self, LocaleError> {
        let mut set = Self::new();
        set.extend_authored(value)?;
        Ok(set)
    }

    pub fn insert(&mut self, language: impl Into<String>, table: LocaleTable) {
        self.tables.insert(language.into(), table);
    }

    pub fn get(&self, language: &str) -> Option<&LocaleTable> {
        self.tables.get(language)
    }

    pub fn get_mut(&mut self, language: &str) -> Option<&mut LocaleTable> {
        self.tables.get_mut(language)
    }

    pub fn languages(&self) -> impl Iterator<Item = &String> {
        self.tables.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &LocaleTable)> {
        self.tables.iter()
    }

    /// Merge `{lang: tree}` as authored text. Sentinel-marked leaves are
    /// skipped: a file's fallbacks never become another table's source.
    pub fn extend_authored(&mut self, locales: &Value) -> Result<(), LocaleError> {
        let Value::Object(languages) = locales else {
            return Ok(());
        };

        for (language, tree) in languages {
            if !tree.is_object() {
                return Err(LocaleError::NotAnObject {
                    language: language.clone(),
                });
            }
            let incoming = LocaleTable::from_tree(language, tree.clone())?;
            let table = self.tables.entry(language.clone()).or_default();
            for (path, text) in incoming.leaves() {
                if incoming.provenance(&path) == Some(Provenance::Authored) {
                    table.set(&path, Value::String(text.to_string()), Provenance::Authored)?;
                }
            }
        }
        Ok(())
    }

    /// `{lang: text}` for consumer output. Languages without text are
    /// omitted, except the default language which falls back to the path.
    pub fn localized(&self, path: &str) -> Value {
        let mut out = Map::new();
        for (language, table) in &self.tables {
            if let Some(text) = table.text(path) {
                out.insert(language.clone(), Value::String(text.to_string()));
            } else if language == DEFAULT_LANGUAGE {
                out.insert(language.clone(), Value::String(path.to_string()));
            }
        }
        Value::Object(out)
    }
}

fn decode_sentinels(value: &mut Value, path: &mut Vec<String>, fallback: &mut BTreeSet<String>) {
    match value {
        Value::String(text) if text.ends_with(SENTINEL) => {
            while text.ends_with(SENTINEL) {
                text.pop();
            }
            fallback.insert(path.join("."));
        }
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                path.push(key.clone());
                decode_sentinels(child, path, fallback);
                path.pop();
            }
        }
        _ => {}
    }
}

fn collect_leaves<'a>(path: String, value: &'a Value, out: &mut Vec<(String, &'a str)>) {
    match value {
        Value::String(text) => out.push((path, text)),
        Value::Object(map) => {
            for (key, child) in map {
                collect_leaves(format!("{}.{}", path, key), child, out);
            }
        }
        _ => {}
    }
}

fn pointer_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    Some(current)
}
