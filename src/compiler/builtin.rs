//! Built-in views, device classes and translations

use serde_json::Value;

use crate::error::CompileError;
use crate::fragment::{Fragment, ReaderError};
use crate::locale::LocaleSet;

/// Prefix the built-in fragment's relative paths are anchored under
pub const BUILTIN_PREFIX: &str = "./lib";

const DEFAULT_CONFIG: &str = include_str!("../../assets/default_config.json");

const LOCALES: &[(&str, &str)] = &[
    ("en", include_str!("../../assets/locales/en.json")),
    ("nl", include_str!("../../assets/locales/nl.json")),
];

fn parse(name: &str, raw: &str) -> Result<Value, CompileError> {
    serde_json::from_str(raw).map_err(|e| {
        CompileError::Reader(ReaderError::Parse {
            path: name.into(),
            message: e.to_string(),
        })
    })
}

/// Generic views and device classes every project can extend
pub fn builtin_fragment() -> Result<Fragment, CompileError> {
    Ok(Fragment::from_value(parse("default_config.json", DEFAULT_CONFIG)?)?)
}

/// Built-in translations, one table per language
pub fn builtin_locales() -> Result<LocaleSet, CompileError> {
    let mut set = LocaleSet::new();
    for (language, raw) in LOCALES {
        let mut wrapped = serde_json::Map::new();
        wrapped.insert(language.to_string(), parse(&format!("{}.json", language), raw)?);
        set.extend_authored(&Value::Object(wrapped))?;
    }
    Ok(set)
}
