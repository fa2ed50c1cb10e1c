//! Device class resolution
//!
//! Scalar fields override by later source. `images` merge shallowly and
//! are only present when some source defines them. The pairing descriptor
//! merges per view: `prepend`/`append` concatenate, other option fields
//! override. `viewOrder` is taken whole from the most-derived definition.

use serde_json::{Map, Value};

use super::view::{APPEND_KEY, PREPEND_KEY};
use super::{as_list, Entity, EntityKind, ExtensionResolver, Inherit};

pub const IMAGES_KEY: &str = "images";
pub const PAIR_KEY: &str = "pair";
pub const VIEW_ORDER_KEY: &str = "viewOrder";
pub const VIEW_OPTIONS_KEY: &str = "viewOptions";

/// Resolver for device classes (and devices, via `resolve_detached`)
pub type DeviceClassResolver = ExtensionResolver<DeviceClassInherit>;

/// Combination rules for device classes
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceClassInherit;

impl Inherit for DeviceClassInherit {
    const KIND: EntityKind = EntityKind::DeviceClass;

    fn combine(&self, id: &str, ancestors: Vec<Entity>, own: Entity) -> Entity {
        let sources: Vec<&Entity> = ancestors.iter().chain(std::iter::once(&own)).collect();

        let mut merged = Entity::new();
        for source in &sources {
            for (key, value) in source.iter() {
                if key != IMAGES_KEY && key != PAIR_KEY {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }

        let image_sets: Vec<&Map<String, Value>> = sources
            .iter()
            .filter_map(|s| s.get(IMAGES_KEY).and_then(Value::as_object))
            .collect();
        if !image_sets.is_empty() {
            let mut images = Map::new();
            for set in image_sets {
                for (key, value) in set {
                    images.insert(key.clone(), value.clone());
                }
            }
            merged.insert(IMAGES_KEY.to_string(), Value::Object(images));
        }

        let pairs: Vec<&Map<String, Value>> = sources
            .iter()
            .filter_map(|s| s.get(PAIR_KEY).and_then(Value::as_object))
            .collect();
        if !pairs.is_empty() {
            merged.insert(PAIR_KEY.to_string(), Value::Object(merge_pairs(&pairs)));
        }

        merged.insert("id".to_string(), Value::String(id.to_string()));
        merged
    }
}

fn merge_pairs(pairs: &[&Map<String, Value>]) -> Map<String, Value> {
    let mut pair = Map::new();
    let mut view_options = Map::new();

    for source in pairs {
        for (key, value) in source.iter() {
            if key == VIEW_OPTIONS_KEY {
                merge_view_options(&mut view_options, value);
            } else {
                // viewOrder included: a later definition replaces it whole
                pair.insert(key.clone(), value.clone());
            }
        }
    }

    pair.insert(VIEW_OPTIONS_KEY.to_string(), Value::Object(view_options));
    pair
}

fn merge_view_options(acc: &mut Map<String, Value>, value: &Value) {
    let Value::Object(per_view) = value else {
        return;
    };

    for (view, options) in per_view {
        let entry = acc.entry(view.clone()).or_insert_with(|| {
            let mut fresh = Map::new();
            fresh.insert(PREPEND_KEY.to_string(), Value::Array(Vec::new()));
            fresh.insert(APPEND_KEY.to_string(), Value::Array(Vec::new()));
            Value::Object(fresh)
        });
        let (Value::Object(existing), Value::Object(options)) = (entry, options) else {
            continue;
        };

        for (field, value) in options {
            match field.as_str() {
                PREPEND_KEY | APPEND_KEY => {
                    let mut list = as_list(existing.get(field));
                    list.extend(as_list(Some(value)));
                    existing.insert(field.clone(), Value::Array(list));
                }
                _ => {
                    existing.insert(field.clone(), value.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::Pool;
    use serde_json::json;

    fn classes(value: Value) -> Pool {
        let mut pool = Pool::new();
        pool.extend(value.as_object().cloned().unwrap_or_default());
        pool
    }

    #[test]
    fn test_scalar_override_and_id() {
        let pool = classes(json!({
            "switch": {"class": "light", "capabilities": ["onoff"]},
            "socket": {"extends": "switch", "class": "socket"}
        }));
        let mut resolver = DeviceClassResolver::default();
        let socket = resolver.resolve("socket", &pool).unwrap();

        assert_eq!(socket["class"], "socket");
        assert_eq!(socket["capabilities"], json!(["onoff"]));
        assert_eq!(socket["id"], "socket");
    }

    #[test]
    fn test_images_absent_when_never_defined() {
        let pool = classes(json!({
            "signal_only": {"signal": {"sof": [1]}},
            "leaf": {"extends": "signal_only"}
        }));
        let mut resolver = DeviceClassResolver::default();
        let leaf = resolver.resolve("leaf", &pool).unwrap();

        assert!(!leaf.contains_key("images"));
        assert!(!leaf.contains_key("pair"));
    }

    #[test]
    fn test_images_merge_shallow() {
        let pool = classes(json!({
            "base": {"images": {"small": "./s.png", "large": "./l.png"}},
            "leaf": {"extends": "base", "images": {"large": "./leaf.png"}}
        }));
        let mut resolver = DeviceClassResolver::default();
        let leaf = resolver.resolve("leaf", &pool).unwrap();

        assert_eq!(leaf["images"], json!({"small": "./s.png", "large": "./leaf.png"}));
    }

    #[test]
    fn test_view_order_replaced_not_merged() {
        let pool = classes(json!({
            "switch": {"pair": {"viewOrder": ["choice", "imitate", "done"]}},
            "toggle": {"extends": "switch", "pair": {"viewOrder": ["imitate", "done"]}}
        }));
        let mut resolver = DeviceClassResolver::default();
        let toggle = resolver.resolve("toggle", &pool).unwrap();

        assert_eq!(toggle["pair"]["viewOrder"], json!(["imitate", "done"]));
    }

    #[test]
    fn test_view_order_inherited_when_absent() {
        let pool = classes(json!({
            "switch": {"pair": {"viewOrder": ["choice", "done"]}},
            "socket": {
                "extends": "switch",
                "pair": {"viewOptions": {"done": {"title": "socket.done"}}}
            }
        }));
        let mut resolver = DeviceClassResolver::default();
        let socket = resolver.resolve("socket", &pool).unwrap();

        assert_eq!(socket["pair"]["viewOrder"], json!(["choice", "done"]));
        assert_eq!(socket["pair"]["viewOptions"]["done"]["title"], "socket.done");
    }

    #[test]
    fn test_view_options_merge_per_view() {
        let pool = classes(json!({
            "switch": {"pair": {"viewOptions": {
                "choice": {"title": "pair.begin", "prepend": "<a>"},
                "done": {"title": "done!"}
            }}},
            "socket": {"extends": "switch", "pair": {"viewOptions": {
                "choice": {"body": "socket.body", "prepend": ["<b>"]}
            }}}
        }));
        let mut resolver = DeviceClassResolver::default();
        let socket = resolver.resolve("socket", &pool).unwrap();
        let options = &socket["pair"]["viewOptions"];

        assert_eq!(options["choice"]["title"], "pair.begin");
        assert_eq!(options["choice"]["body"], "socket.body");
        assert_eq!(options["choice"]["prepend"], json!(["<a>", "<b>"]));
        assert_eq!(options["done"]["title"], "done!");
        assert_eq!(options["done"]["append"], json!([]));
    }

    #[test]
    fn test_device_resolved_detached() {
        let pool = classes(json!({
            "my_signal": {"signal": {"sof": [275, 2640]}},
            "empty_device": {"driver": "./drivers/driver.js", "class": "other", "capabilities": []}
        }));
        let mut resolver = DeviceClassResolver::default();
        let device = resolver
            .resolve_detached(
                "test_device",
                &json!({"extends": ["my_signal", "empty_device"]}),
                &pool,
            )
            .unwrap();

        assert_eq!(device["id"], "test_device");
        assert_eq!(device["signal"]["sof"], json!([275, 2640]));
        assert_eq!(device["driver"], "./drivers/driver.js");
    }
}
