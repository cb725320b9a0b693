/*!
 * Keyed text catalogs.
 *
 * A `Catalog` is the ordered `key -> value` view of one language file, with
 * nested objects already flattened into dotted keys. Values stay JSON values
 * so that non-text leaves survive a read/write cycle untouched.
 *
 * - `CatalogReader` / `CatalogWriter`: persistence seams used by the run
 * - `InMemoryCatalog`: in-process store for tests and dry runs
 * - `json_dir::JsonDirCatalog`: one `<lang>.json` per language on disk
 */

pub mod json_dir;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use json_dir::JsonDirCatalog;

/// True for absent, null, empty or whitespace-only strings and empty objects
pub fn is_missing_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

/// Ordered flat catalog of one language
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    entries: Map<String, Value>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an already flat JSON object; other values yield an empty catalog
    pub fn from_flat_json(value: Value) -> Self {
        match value {
            Value::Object(entries) => Self { entries },
            _ => Self::default(),
        }
    }

    /// Flatten nested objects into dotted keys, keeping first-appearance order
    pub fn from_nested_json(value: &Value) -> Self {
        let mut catalog = Self::default();
        if let Value::Object(map) = value {
            flatten_into(&mut catalog.entries, "", map);
        }
        catalog
    }

    /// Rebuild the nested form; keys that collide with a leaf stay dotted
    pub fn to_nested_json(&self) -> Value {
        let mut root = Map::new();
        for (key, value) in &self.entries {
            insert_nested(&mut root, key, value.clone());
        }
        Value::Object(root)
    }

    pub fn to_flat_json(&self) -> Value {
        Value::Object(self.entries.clone())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Non-missing string value
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// Source text of a leaf; non-string scalars are rendered as JSON
    pub fn source_text(&self, key: &str) -> Option<String> {
        let value = self.entries.get(key)?;
        if is_missing_value(Some(value)) {
            return None;
        }
        match value {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn is_missing(&self, key: &str) -> bool {
        is_missing_value(self.entries.get(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace; an existing key keeps its position
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn set_text(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.insert(key, Value::String(text.into()));
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Catalog {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        let mut catalog = Catalog::new();
        for (key, value) in iter {
            catalog.insert(key, value);
        }
        catalog
    }
}

fn flatten_into(out: &mut Map<String, Value>, prefix: &str, map: &Map<String, Value>) {
    for (key, value) in map {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(child) if !child.is_empty() => flatten_into(out, &full_key, child),
            leaf => {
                out.insert(full_key, leaf.clone());
            }
        }
    }
}

fn insert_nested(map: &mut Map<String, Value>, key: &str, value: Value) {
    if let Some((head, tail)) = key.split_once('.') {
        if matches!(map.get(head), None | Some(Value::Object(_))) {
            let slot = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = slot {
                insert_nested(child, tail, value);
                return;
            }
        }
    }
    map.insert(key.to_string(), value);
}

/// Reads per-language catalogs
pub trait CatalogReader: Send + Sync {
    /// `None` when no catalog exists for the language
    fn read(&self, language: &str) -> Result<Option<Catalog>>;

    /// Languages with a stored catalog, sorted
    fn languages(&self) -> Result<Vec<String>>;
}

/// Persists per-language catalogs
pub trait CatalogWriter: Send + Sync {
    fn write(&self, language: &str, catalog: &Catalog) -> Result<()>;
}

/// Catalog store kept in memory
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    catalogs: RwLock<BTreeMap<String, Catalog>>,
    writes: AtomicUsize,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(self, language: &str, catalog: Catalog) -> Self {
        self.catalogs.write().insert(language.to_string(), catalog);
        self
    }

    /// Number of `write` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self, language: &str) -> Option<Catalog> {
        self.catalogs.read().get(language).cloned()
    }
}

impl CatalogReader for InMemoryCatalog {
    fn read(&self, language: &str) -> Result<Option<Catalog>> {
        Ok(self.snapshot(language))
    }

    fn languages(&self) -> Result<Vec<String>> {
        Ok(self.catalogs.read().keys().cloned().collect())
    }
}

impl CatalogWriter for InMemoryCatalog {
    fn write(&self, language: &str, catalog: &Catalog) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.catalogs
            .write()
            .insert(language.to_string(), catalog.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_values() {
        assert!(is_missing_value(None));
        assert!(is_missing_value(Some(&Value::Null)));
        assert!(is_missing_value(Some(&json!("   "))));
        assert!(is_missing_value(Some(&json!({}))));
        assert!(!is_missing_value(Some(&json!("Hej"))));
        assert!(!is_missing_value(Some(&json!(0))));
    }

    #[test]
    fn test_flatten_keeps_order_and_unflatten_restores() {
        let nested = json!({
            "home": {"title": "Hem", "body": {"intro": "Välkommen"}},
            "empty": {},
            "count": 3
        });
        let catalog = Catalog::from_nested_json(&nested);
        let keys: Vec<_> = catalog.keys().cloned().collect();
        assert_eq!(keys, vec!["home.title", "home.body.intro", "empty", "count"]);
        assert!(catalog.is_missing("empty"));
        assert_eq!(catalog.source_text("count").as_deref(), Some("3"));
        assert_eq!(catalog.to_nested_json(), nested);
    }

    #[test]
    fn test_insert_existing_key_keeps_position() {
        let mut catalog: Catalog = [("a", json!(null)), ("b", json!("B"))].into_iter().collect();
        catalog.set_text("a", "A");
        let keys: Vec<_> = catalog.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(catalog.text("a"), Some("A"));
    }

    #[test]
    fn test_unflatten_collision_keeps_dotted_key() {
        let catalog: Catalog = [("a", json!("leaf")), ("a.b", json!("child"))]
            .into_iter()
            .collect();
        assert_eq!(catalog.to_nested_json(), json!({"a": "leaf", "a.b": "child"}));
    }

    #[test]
    fn test_in_memory_catalog_counts_writes() -> Result<()> {
        let store = InMemoryCatalog::new().with_catalog("en", Catalog::new());
        assert_eq!(store.languages()?, vec!["en"]);
        store.write("fr", &Catalog::new())?;
        assert_eq!(store.write_count(), 1);
        assert!(store.read("fr")?.is_some());
        Ok(())
    }
}
