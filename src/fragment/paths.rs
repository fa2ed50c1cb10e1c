//! Relative path rewriting
//!
//! Fragments refer to templates, drivers and images with paths relative to
//! their own directory (`./pair/info.html`, `../assets/light.svg`). When a
//! fragment is merged into a compilation rooted elsewhere, every such leaf
//! is re-anchored under the fragment's prefix.

use std::path::{Component, Path};

use regex_lite::Regex;
use serde_json::Value;
use thiserror::Error;

/// Characters that can never appear in a portable path
const INVALID_PATH_PATTERN: &str = r#"[<>:"|?*\x00-\x1F]"#;

/// Errors raised while rewriting paths
#[derive(Debug, Error)]
pub enum PathError {
    #[error("Path '{path}' at '{location}' is not valid")]
    Invalid { path: String, location: String },

    #[error("Invalid path pattern: {0}")]
    Pattern(#[from] regex_lite::Error),
}

/// Whether a string is a relative file reference (`./x` or `../x`)
pub fn is_relative_reference(value: &str) -> bool {
    value.starts_with("./") || value.starts_with("../")
}

/// Rewrites relative file references inside a nested structure
#[derive(Debug, Clone)]
pub struct PathRewriter {
    prefix: String,
    invalid: Regex,
}

impl PathRewriter {
    pub fn new(prefix: impl Into<String>) -> Result<Self, PathError> {
        Ok(Self {
            prefix: prefix.into(),
            invalid: Regex::new(INVALID_PATH_PATTERN)?,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Return a copy of `value` with every relative reference joined onto
    /// the prefix. An empty prefix leaves the structure untouched.
    pub fn rewrite(&self, value: &Value) -> Result<Value, PathError> {
        let mut out = value.clone();
        if !self.prefix.is_empty() {
            self.rewrite_in_place(&mut out, &mut Vec::new())?;
        }
        Ok(out)
    }

    /// Join a single reference onto the prefix
    pub fn join(&self, reference: &str) -> String {
        join_safe(&self.prefix, reference)
    }

    fn rewrite_in_place(&self, value: &mut Value, location: &mut Vec<String>) -> Result<(), PathError> {
        match value {
            Value::String(s) if is_relative_reference(s) => {
                if self.invalid.is_match(s) {
                    return Err(PathError::Invalid {
                        path: s.clone(),
                        location: location.join("."),
                    });
                }
                *s = self.join(s);
            }
            Value::Array(items) => {
                for (index, item) in items.iter_mut().enumerate() {
                    location.push(index.to_string());
                    self.rewrite_in_place(item, location)?;
                    location.pop();
                }
            }
            Value::Object(map) => {
                for (key, item) in map.iter_mut() {
                    location.push(key.clone());
                    self.rewrite_in_place(item, location)?;
                    location.pop();
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Join two forward-slash paths and normalize `.`/`..` segments.
///
/// A leading `./` on the prefix is preserved, and `..` segments that climb
/// above the start are kept.
pub fn join_safe(prefix: &str, reference: &str) -> String {
    let prefix = prefix.replace('\\', "/");
    let reference = reference.replace('\\', "/");
    let absolute = prefix.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in prefix.split('/').chain(reference.split('/')) {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else if prefix.starts_with("./") && !joined.starts_with("../") {
        format!("./{}", joined)
    } else {
        joined
    }
}

/// Relative forward-slash path leading from directory `from` to directory
/// `to`. Both paths are compared lexically, component by component.
pub fn relative_between(from: &Path, to: &Path) -> String {
    let from: Vec<Component> = from.components().filter(|c| *c != Component::CurDir).collect();
    let to: Vec<Component> = to.components().filter(|c| *c != Component::CurDir).collect();

    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<String> = Vec::new();
    parts.extend(std::iter::repeat("..".to_string()).take(from.len() - common));
    parts.extend(
        to[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_keeps_leading_dot() {
        assert_eq!(join_safe("./lib", "./pair/info.html"), "./lib/pair/info.html");
        assert_eq!(
            join_safe("./lib", "../../assets/433_generator/images/light.svg"),
            "../assets/433_generator/images/light.svg"
        );
    }

    #[test]
    fn test_join_climbs_above_start() {
        assert_eq!(
            join_safe("../433_generator", "./drivers/driver.js"),
            "../433_generator/drivers/driver.js"
        );
        assert_eq!(join_safe("..", "../x"), "../../x");
    }

    #[test]
    fn test_join_normalizes_backslashes() {
        assert_eq!(join_safe("..\\gen", "./views/test.html"), "../gen/views/test.html");
    }

    #[test]
    fn test_rewrite_only_relative_leaves() {
        let rewriter = PathRewriter::new("../433_generator").unwrap();
        let config = json!({
            "driver": "./drivers/driver.js",
            "views": {
                "test": {"template": "./views/test.html", "options": {"body": "pair.test.body"}}
            },
            "images": ["./a.png", "https://example.com/b.png"],
            "count": 3
        });

        let rewritten = rewriter.rewrite(&config).unwrap();

        assert_eq!(rewritten["driver"], "../433_generator/drivers/driver.js");
        assert_eq!(rewritten["views"]["test"]["template"], "../433_generator/views/test.html");
        assert_eq!(rewritten["views"]["test"]["options"]["body"], "pair.test.body");
        assert_eq!(rewritten["images"][0], "../433_generator/a.png");
        assert_eq!(rewritten["images"][1], "https://example.com/b.png");
        assert_eq!(rewritten["count"], 3);
    }

    #[test]
    fn test_empty_prefix_is_identity() {
        let rewriter = PathRewriter::new("").unwrap();
        let config = json!({"driver": "./driver.js"});

        assert_eq!(rewriter.rewrite(&config).unwrap(), config);
    }

    #[test]
    fn test_invalid_path_reports_location() {
        let rewriter = PathRewriter::new("./lib").unwrap();
        let config = json!({"views": {"bad": {"template": "./pair/<info>.html"}}});

        let err = rewriter.rewrite(&config).unwrap_err();
        match err {
            PathError::Invalid { path, location } => {
                assert_eq!(path, "./pair/<info>.html");
                assert_eq!(location, "views.bad.template");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_relative_between() {
        assert_eq!(
            relative_between(Path::new("/app/drivers"), Path::new("/app/433_generator")),
            "../433_generator"
        );
        assert_eq!(relative_between(Path::new("/app"), Path::new("/app")), ".");
        assert_eq!(relative_between(Path::new("/app"), Path::new("/app/gen/sub")), "gen/sub");
    }
}
