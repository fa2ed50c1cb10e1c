//! Inheritance resolution for views and device classes
//!
//! Declarations live in a [`Pool`] keyed by id. An entity may list parents
//! in `extends` (a single id or an ordered list). [`ExtensionResolver`]
//! expands the parents depth-first, left to right, and hands the resolved
//! ancestors plus the entity's own fields to an [`Inherit`] strategy that
//! decides how fields combine.
//!
//! The ancestry chain travels as an explicit argument through the recursion,
//! so one resolver can serve unrelated chains. Results are memoized per pool
//! snapshot; any mutation of the pool yields a new snapshot and drops the
//! memo on the next call.

mod device_class;
mod view;

pub use device_class::{
    DeviceClassInherit, DeviceClassResolver, IMAGES_KEY, PAIR_KEY, VIEW_OPTIONS_KEY, VIEW_ORDER_KEY,
};
pub use view::{normalize_options, ViewInherit, ViewResolver, APPEND_KEY, OPTIONS_KEY, PREPEND_KEY};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Key listing the parents of an entity
pub const EXTENDS_KEY: &str = "extends";

/// A flattened entity (object fields)
pub type Entity = Map<String, Value>;

static NEXT_SNAPSHOT: AtomicU64 = AtomicU64::new(1);

/// Kind of entity taking part in resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    View,
    DeviceClass,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::View => write!(f, "view"),
            EntityKind::DeviceClass => write!(f, "device class"),
        }
    }
}

/// Errors raised while resolving an extends chain
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Circular extends in {kind}: {}", .chain.join(" -> "))]
    Cycle { kind: EntityKind, chain: Vec<String> },

    #[error("{kind} '{id}' cannot be found{}", referred_by(.referrer))]
    NotFound {
        kind: EntityKind,
        id: String,
        referrer: Option<String>,
    },

    #[error("{kind} '{id}' must be an object")]
    NotAnObject { kind: EntityKind, id: String },

    #[error("{kind} '{id}' has an invalid extends value; expected an id or a list of ids")]
    InvalidExtends { kind: EntityKind, id: String },
}

fn referred_by(referrer: &Option<String>) -> String {
    match referrer {
        Some(r) => format!(" (extended by '{}')", r),
        None => String::new(),
    }
}

/// Identity of one state of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Snapshot(u64);

impl Snapshot {
    fn next() -> Self {
        Snapshot(NEXT_SNAPSHOT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Declarations of one entity kind, accumulated across fragments
#[derive(Debug, Clone)]
pub struct Pool {
    entries: Map<String, Value>,
    snapshot: Snapshot,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    pub fn new() -> Self {
        Self {
            entries: Map::new(),
            snapshot: Snapshot::next(),
        }
    }

    /// Add or replace declarations by id. Field-level combination only
    /// happens during resolution.
    pub fn extend(&mut self, declarations: Map<String, Value>) {
        if declarations.is_empty() {
            return;
        }
        for (id, declaration) in declarations {
            self.entries.insert(id, declaration);
        }
        self.snapshot = Snapshot::next();
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Ids in declaration order
    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
    }
}

/// Field combination strategy for one entity kind
pub trait Inherit {
    /// Kind reported in errors
    const KIND: EntityKind;

    /// Combine resolved ancestors (in `extends` order) with the entity's own
    /// fields. `own` never contains `extends`.
    fn combine(&self, id: &str, ancestors: Vec<Entity>, own: Entity) -> Entity;
}

/// Generic `extends` resolver with cycle detection and memoization
#[derive(Debug)]
pub struct ExtensionResolver<S> {
    strategy: S,
    memo: HashMap<String, Entity>,
    snapshot: Option<Snapshot>,
}

impl<S: Inherit + Default> Default for ExtensionResolver<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: Inherit> ExtensionResolver<S> {
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            memo: HashMap::new(),
            snapshot: None,
        }
    }

    /// Resolve one entity of the pool
    pub fn resolve(&mut self, name: &str, pool: &Pool) -> Result<Entity, ResolveError> {
        self.sync(pool);
        self.resolve_in(name, pool, &[])
    }

    /// Resolve every entity of the pool, in declaration order
    pub fn resolve_all(&mut self, pool: &Pool) -> Result<Map<String, Value>, ResolveError> {
        self.sync(pool);
        let mut resolved = Map::new();
        for id in pool.ids() {
            let entity = self.resolve_in(id, pool, &[])?;
            resolved.insert(id.clone(), Value::Object(entity));
        }
        Ok(resolved)
    }

    /// Resolve a declaration that is not itself part of the pool but
    /// extends entities of it. Detached results are not memoized, and the
    /// id may coincide with a pool id.
    pub fn resolve_detached(
        &mut self,
        id: &str,
        declaration: &Value,
        pool: &Pool,
    ) -> Result<Entity, ResolveError> {
        self.sync(pool);
        self.expand(id, declaration, pool, &[])
    }

    fn sync(&mut self, pool: &Pool) {
        if self.snapshot != Some(pool.snapshot()) {
            if !self.memo.is_empty() {
                debug!(kind = %S::KIND, "pool changed, dropping memoized resolutions");
            }
            self.memo.clear();
            self.snapshot = Some(pool.snapshot());
        }
    }

    fn resolve_in(
        &mut self,
        name: &str,
        pool: &Pool,
        ancestry: &[String],
    ) -> Result<Entity, ResolveError> {
        if ancestry.iter().any(|a| a == name) {
            let mut chain = ancestry.to_vec();
            chain.push(name.to_string());
            return Err(ResolveError::Cycle {
                kind: S::KIND,
                chain,
            });
        }

        if let Some(hit) = self.memo.get(name) {
            return Ok(hit.clone());
        }

        let declaration = pool.get(name).ok_or_else(|| ResolveError::NotFound {
            kind: S::KIND,
            id: name.to_string(),
            referrer: ancestry.last().cloned(),
        })?;

        let mut chain = ancestry.to_vec();
        chain.push(name.to_string());
        let entity = self.expand(name, declaration, pool, &chain)?;

        self.memo.insert(name.to_string(), entity.clone());
        Ok(entity)
    }

    fn expand(
        &mut self,
        id: &str,
        declaration: &Value,
        pool: &Pool,
        chain: &[String],
    ) -> Result<Entity, ResolveError> {
        let Value::Object(own) = declaration else {
            return Err(ResolveError::NotAnObject {
                kind: S::KIND,
                id: id.to_string(),
            });
        };

        let mut own = own.clone();
        let parents = extends_list(own.shift_remove(EXTENDS_KEY), S::KIND, id)?;

        let mut ancestors = Vec::with_capacity(parents.len());
        for parent in &parents {
            ancestors.push(self.resolve_in(parent, pool, chain)?);
        }

        Ok(self.strategy.combine(id, ancestors, own))
    }
}

/// Normalize an `extends` value into an ordered list of parent ids
fn extends_list(
    value: Option<Value>,
    kind: EntityKind,
    id: &str,
) -> Result<Vec<String>, ResolveError> {
    let invalid = || ResolveError::InvalidExtends {
        kind,
        id: id.to_string(),
    };

    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(parent)) => Ok(vec![parent]),
        Some(Value::Array(parents)) => parents
            .into_iter()
            .map(|p| match p {
                Value::String(s) => Ok(s),
                _ => Err(invalid()),
            })
            .collect(),
        Some(_) => Err(invalid()),
    }
}

/// `None`/`null` as an empty list, arrays as-is, anything else as one item
pub(crate) fn as_list(value: Option<&Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Plain override-by-later strategy, enough to exercise the generic parts
    #[derive(Default)]
    struct Overlay;

    impl Inherit for Overlay {
        const KIND: EntityKind = EntityKind::View;

        fn combine(&self, _id: &str, ancestors: Vec<Entity>, own: Entity) -> Entity {
            let mut merged = Entity::new();
            for source in ancestors.into_iter().chain(std::iter::once(own)) {
                merged.extend(source);
            }
            merged
        }
    }

    fn pool(value: Value) -> Pool {
        let mut pool = Pool::new();
        pool.extend(value.as_object().cloned().unwrap_or_default());
        pool
    }

    #[test]
    fn test_single_string_extends() {
        let pool = pool(json!({
            "a": {"x": 1, "y": 1},
            "b": {"extends": "a", "y": 2}
        }));
        let mut resolver = ExtensionResolver::new(Overlay);
        let b = resolver.resolve("b", &pool).unwrap();

        assert_eq!(b["x"], 1);
        assert_eq!(b["y"], 2);
        assert!(!b.contains_key("extends"));
    }

    #[test]
    fn test_later_parent_wins() {
        let pool = pool(json!({
            "a": {"x": "a"},
            "b": {"x": "b"},
            "c": {"extends": ["a", "b"]}
        }));
        let mut resolver = ExtensionResolver::new(Overlay);

        assert_eq!(resolver.resolve("c", &pool).unwrap()["x"], "b");
    }

    #[test]
    fn test_cycle_names_chain() {
        let pool = pool(json!({
            "a": {"extends": "b"},
            "b": {"extends": "a"}
        }));
        let mut resolver = ExtensionResolver::new(Overlay);
        let err = resolver.resolve("a", &pool).unwrap_err();

        match &err {
            ResolveError::Cycle { chain, .. } => {
                assert_eq!(chain, &["a", "b", "a"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
        let message = err.to_string();
        assert!(message.contains("a -> b -> a"));
    }

    #[test]
    fn test_self_extends_is_cycle() {
        let pool = pool(json!({"a": {"extends": "a"}}));
        let mut resolver = ExtensionResolver::new(Overlay);

        assert!(matches!(
            resolver.resolve("a", &pool),
            Err(ResolveError::Cycle { .. })
        ));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let pool = pool(json!({
            "base": {"x": 0},
            "left": {"extends": "base", "l": 1},
            "right": {"extends": "base", "r": 1},
            "leaf": {"extends": ["left", "right"]}
        }));
        let mut resolver = ExtensionResolver::new(Overlay);
        let leaf = resolver.resolve("leaf", &pool).unwrap();

        assert_eq!(leaf["x"], 0);
        assert_eq!(leaf["l"], 1);
        assert_eq!(leaf["r"], 1);
    }

    #[test]
    fn test_missing_parent() {
        let pool = pool(json!({"b": {"extends": "ghost"}}));
        let mut resolver = ExtensionResolver::new(Overlay);
        let err = resolver.resolve("b", &pool).unwrap_err();

        assert!(matches!(
            err,
            ResolveError::NotFound { ref id, ref referrer, .. }
                if id == "ghost" && referrer.as_deref() == Some("b")
        ));
        assert!(err.to_string().contains("extended by 'b'"));
    }

    #[test]
    fn test_memoized_until_pool_changes() {
        let mut pool = pool(json!({"a": {"x": 1}, "b": {"extends": "a"}}));
        let mut resolver = ExtensionResolver::new(Overlay);

        let first = resolver.resolve("b", &pool).unwrap();
        let second = resolver.resolve("b", &pool).unwrap();
        assert_eq!(first, second);

        pool.extend(json!({"a": {"x": 2}}).as_object().cloned().unwrap());
        let third = resolver.resolve("b", &pool).unwrap();
        assert_eq!(third["x"], 2);
    }

    #[test]
    fn test_resolver_reusable_after_error() {
        let pool = pool(json!({
            "loop": {"extends": "loop"},
            "fine": {"x": 1}
        }));
        let mut resolver = ExtensionResolver::new(Overlay);

        assert!(resolver.resolve("loop", &pool).is_err());
        assert_eq!(resolver.resolve("fine", &pool).unwrap()["x"], 1);
    }

    #[test]
    fn test_detached_declaration() {
        let pool = pool(json!({"switch": {"class": "socket"}}));
        let mut resolver = ExtensionResolver::new(Overlay);
        let lamp = resolver
            .resolve_detached("lamp", &json!({"extends": "switch", "name": "lamp"}), &pool)
            .unwrap();

        assert_eq!(lamp["class"], "socket");
        assert_eq!(lamp["name"], "lamp");
    }

    #[test]
    fn test_detached_id_shared_with_pool() {
        let pool = pool(json!({"switch": {"class": "socket"}}));
        let mut resolver = ExtensionResolver::new(Overlay);
        let device = resolver
            .resolve_detached("switch", &json!({"extends": "switch"}), &pool)
            .unwrap();

        assert_eq!(device["class"], "socket");
    }

    #[test]
    fn test_invalid_extends() {
        let pool = pool(json!({"a": {"extends": 3}}));
        let mut resolver = ExtensionResolver::new(Overlay);

        assert!(matches!(
            resolver.resolve("a", &pool),
            Err(ResolveError::InvalidExtends { .. })
        ));
    }
}
