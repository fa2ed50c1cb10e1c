//! Pairing view resolution
//!
//! Option schemas merge per option name with `required` and `default`
//! independently overridable. `prepend`/`append` content concatenates in
//! ancestor order with the view's own content last.

use serde_json::{Map, Value};

use super::{as_list, Entity, EntityKind, ExtensionResolver, Inherit};

pub const OPTIONS_KEY: &str = "options";
pub const PREPEND_KEY: &str = "prepend";
pub const APPEND_KEY: &str = "append";

/// Resolver for pairing views
pub type ViewResolver = ExtensionResolver<ViewInherit>;

/// Combination rules for pairing views
#[derive(Debug, Default, Clone, Copy)]
pub struct ViewInherit;

impl Inherit for ViewInherit {
    const KIND: EntityKind = EntityKind::View;

    fn combine(&self, _id: &str, ancestors: Vec<Entity>, mut own: Entity) -> Entity {
        if let Some(options) = own.get_mut(OPTIONS_KEY) {
            normalize_options(options);
        }

        let mut merged = Entity::new();
        let mut options = Map::new();
        let mut prepend = Vec::new();
        let mut append = Vec::new();

        for source in ancestors.iter().chain(std::iter::once(&own)) {
            for (key, value) in source {
                match key.as_str() {
                    OPTIONS_KEY | PREPEND_KEY | APPEND_KEY => {}
                    _ => {
                        merged.insert(key.clone(), value.clone());
                    }
                }
            }
            if let Some(Value::Object(schema)) = source.get(OPTIONS_KEY) {
                for (name, fields) in schema {
                    merge_option(&mut options, name, fields);
                }
            }
            prepend.extend(as_list(source.get(PREPEND_KEY)));
            append.extend(as_list(source.get(APPEND_KEY)));
        }

        merged.insert(OPTIONS_KEY.to_string(), Value::Object(options));
        merged.insert(PREPEND_KEY.to_string(), Value::Array(prepend));
        merged.insert(APPEND_KEY.to_string(), Value::Array(append));
        merged
    }
}

/// Turn raw option values into `{default: value}` schemas
pub fn normalize_options(options: &mut Value) {
    let Value::Object(options) = options else {
        return;
    };
    for schema in options.values_mut() {
        if !schema.is_object() {
            let default = std::mem::take(schema);
            let mut fields = Map::new();
            fields.insert("default".to_string(), default);
            *schema = Value::Object(fields);
        }
    }
}

fn merge_option(options: &mut Map<String, Value>, name: &str, fields: &Value) {
    let Value::Object(fields) = fields else {
        return;
    };
    let entry = options
        .entry(name.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(existing) = entry {
        for (field, value) in fields {
            existing.insert(field.clone(), value.clone());
        }
    }
}
