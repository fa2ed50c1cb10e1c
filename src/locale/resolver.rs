//! Translation backfill
//!
//! Walks a finalized device tree for string leaves that are translation
//! keys, then makes sure every language has an entry for each key.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{LocaleError, LocaleSet, Provenance, DEFAULT_LANGUAGE};

/// Keys whose string value is always a translation key
const TEXT_KEYS: &[&str] = &["label", "title", "placeholder"];

/// A key path that could not be translated for a language
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocaleWarning {
    pub language: String,
    pub path: String,
}

impl fmt::Display for LocaleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No '{}' translation for '{}'", self.language, self.path)
    }
}

/// Fills missing translations from built-in defaults
#[derive(Debug, Clone, Default)]
pub struct LocaleResolver {
    namespace: Option<String>,
}

impl LocaleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also resolve every leaf under this namespace of the built-in
    /// default-language table
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Translation key paths referenced by a tree, in first-seen order
    pub fn key_paths(tree: &Value) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        walk(tree, None, &mut Vec::new(), &mut |key| {
            if seen.insert(key.to_string()) {
                out.push(key.to_string());
            }
        });
        out
    }

    /// Return a copy of `project` where every key path has an entry in
    /// every language.
    ///
    /// Per path and language: authored project text is kept; otherwise the
    /// built-in text is copied as fallback; otherwise the default language
    /// gets the raw path and other languages get `null` plus a warning.
    pub fn resolve_all(
        &self,
        device_tree: &Value,
        project: &LocaleSet,
        builtin: &LocaleSet,
    ) -> Result<(LocaleSet, Vec<LocaleWarning>), LocaleError> {
        let mut paths = Self::key_paths(device_tree);
        if let Some(namespace) = &self.namespace {
            let known: HashSet<String> = paths.iter().cloned().collect();
            let runtime = builtin
                .get(DEFAULT_LANGUAGE)
                .map(|table| table.leaves())
                .unwrap_or_default()
                .into_iter()
                .map(|(path, _)| path)
                .filter(|path| path.starts_with(&format!("{}.", namespace)))
                .filter(|path| !known.contains(path))
                .collect::<Vec<_>>();
            paths.extend(runtime);
        }
        debug!(paths = paths.len(), "resolving translation keys");

        let mut filled = project.clone();
        let languages: Vec<String> = filled.languages().cloned().collect();
        let mut warnings = Vec::new();

        for path in &paths {
            for language in &languages {
                let Some(table) = filled.get_mut(language) else {
                    continue;
                };
                if table.authored(path).is_some() {
                    continue;
                }

                let default = builtin
                    .get(language)
                    .and_then(|t| t.translation(path))
                    .map(str::to_string);

                match default {
                    Some(text) => table.set(path, Value::String(text), Provenance::Fallback)?,
                    None if language == DEFAULT_LANGUAGE => {
                        table.set(path, Value::String(path.clone()), Provenance::Authored)?
                    }
                    None => {
                        table.set(path, Value::Null, Provenance::Authored)?;
                        warnings.push(LocaleWarning {
                            language: language.clone(),
                            path: path.clone(),
                        });
                    }
                }
            }
        }

        Ok((filled, warnings))
    }
}

fn walk(value: &Value, key: Option<&str>, path: &mut Vec<String>, emit: &mut dyn FnMut(&str)) {
    match value {
        Value::String(text) => {
            if let Some(key) = key {
                if is_key_path(key, text, path) {
                    emit(text);
                }
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                path.push(index.to_string());
                walk(item, None, path, emit);
                path.pop();
            }
        }
        Value::Object(map) => {
            for (child_key, child) in map {
                path.push(child_key.clone());
                walk(child, Some(child_key), path, emit);
                path.pop();
            }
        }
        _ => {}
    }
}

fn is_key_path(key: &str, text: &str, path: &[String]) -> bool {
    if text.is_empty() || text.contains(' ') {
        return false;
    }
    let under = |segment: &str| path.iter().any(|p| p == segment);

    TEXT_KEYS.contains(&key)
        || (key == "name" && !under("args"))
        || ((text.contains("deviceClasses.") || text.contains("views."))
            && (under("options") || under("viewOptions")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builtin() -> LocaleSet {
        LocaleSet::from_value(&json!({
            "en": {
                "views": {"done": {"title": "Done!"}},
                "433_generator": {"generic": {"on": "On", "off": "Off"}}
            },
            "nl": {
                "views": {"done": {"title": "Klaar!"}},
                "433_generator": {"generic": {"on": "Aan"}}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_key_path_detection() {
        let tree = json!({
            "lamp1": {
                "name": "devices.lamp1.name",
                "icon": "./icon.svg",
                "pair": {"views": [{
                    "options": {"title": "views.done.title", "body": "views.done.body", "svg": "<svg></svg>"}
                }]},
                "triggers": [{
                    "title": "flow.received",
                    "args": [{"name": "device", "type": "device"}]
                }],
                "settings": [{"label": "has a space", "placeholder": "settings.code"}]
            }
        });

        let paths = LocaleResolver::key_paths(&tree);
        assert_eq!(
            paths,
            [
                "devices.lamp1.name",
                "views.done.title",
                "views.done.body",
                "flow.received",
                "settings.code"
            ]
        );
    }

    #[test]
    fn test_backfill_marks_fallback() {
        let tree = json!({"lamp1": {"title": "views.done.title"}});
        let project = LocaleSet::new();

        let (filled, warnings) = LocaleResolver::new()
            .resolve_all(&tree, &project, &builtin())
            .unwrap();

        let en = filled.get("en").unwrap();
        assert_eq!(en.text("views.done.title"), Some("Done!"));
        assert_eq!(en.provenance("views.done.title"), Some(Provenance::Fallback));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_second_pass_rebackfills_fallback() {
        let tree = json!({"lamp1": {"title": "views.done.title"}});
        let project = LocaleSet::from_value(&json!({
            "en": {"views": {"done": {"title": "Old default\u{0}"}}}
        }))
        .unwrap();

        let (filled, _) = LocaleResolver::new()
            .resolve_all(&tree, &project, &builtin())
            .unwrap();

        let en = filled.get("en").unwrap();
        assert_eq!(en.text("views.done.title"), Some("Done!"));
        assert_eq!(en.provenance("views.done.title"), Some(Provenance::Fallback));
    }

    #[test]
    fn test_authored_text_kept() {
        let tree = json!({"lamp1": {"title": "views.done.title"}});
        let project = LocaleSet::from_value(&json!({
            "en": {"views": {"done": {"title": "All set"}}}
        }))
        .unwrap();

        let (filled, _) = LocaleResolver::new()
            .resolve_all(&tree, &project, &builtin())
            .unwrap();

        assert_eq!(filled.get("en").unwrap().authored("views.done.title"), Some("All set"));
    }

    #[test]
    fn test_default_language_gets_path_others_null() {
        let tree = json!({"lamp1": {"name": "devices.lamp1.name"}});
        let project = LocaleSet::from_value(&json!({"en": {}, "de": {}})).unwrap();

        let (filled, warnings) = LocaleResolver::new()
            .resolve_all(&tree, &project, &builtin())
            .unwrap();

        assert_eq!(filled.get("en").unwrap().text("devices.lamp1.name"), Some("devices.lamp1.name"));
        assert_eq!(filled.get("de").unwrap().get("devices.lamp1.name"), Some(&Value::Null));
        assert_eq!(
            warnings,
            [LocaleWarning {
                language: "de".into(),
                path: "devices.lamp1.name".into()
            }]
        );
    }

    #[test]
    fn test_namespace_leaves_resolved() {
        let project = LocaleSet::from_value(&json!({"en": {}, "nl": {}})).unwrap();

        let (filled, warnings) = LocaleResolver::new()
            .with_namespace("433_generator")
            .resolve_all(&json!({}), &project, &builtin())
            .unwrap();

        assert_eq!(filled.get("en").unwrap().text("433_generator.generic.off"), Some("Off"));
        assert_eq!(filled.get("nl").unwrap().text("433_generator.generic.on"), Some("Aan"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].path, "433_generator.generic.off");
    }

    #[test]
    fn test_collision_aborts() {
        let tree = json!({"a": {"title": "pair"}, "b": {"title": "pair.begin"}});

        let err = LocaleResolver::new()
            .resolve_all(&tree, &LocaleSet::new(), &builtin())
            .unwrap_err();
        assert!(matches!(err, LocaleError::Collision { .. }));
    }
}
