//! User settings as a small key-value store.
//!
//! Keys are dotted paths (`radio.favorites`) addressing nested TOML tables.
//! The core only ever touches two of them: the favorites list and the home
//! country used by refresh.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::debug;

pub const FAVORITES_KEY: &str = "radio.favorites";
pub const COUNTRY_KEY: &str = "radio.country";

pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
}

fn lookup(table: &Table, key: &str) -> Option<Value> {
    let mut parts = key.split('.').peekable();
    let mut current = table;
    while let Some(part) = parts.next() {
        let value = current.get(part)?;
        if parts.peek().is_none() {
            return Some(value.clone());
        }
        current = value.as_table()?;
    }
    None
}

fn insert(table: &mut Table, key: &str, value: Value) -> Result<()> {
    let (parents, leaf) = match key.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, key),
    };
    let mut current = table;
    for part in parents.into_iter().flat_map(|p| p.split('.')) {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        current = entry
            .as_table_mut()
            .ok_or_else(|| Error::Settings(format!("'{part}' in '{key}' is not a table")))?;
    }
    current.insert(leaf.to_string(), value);
    Ok(())
}

/// In-process store; nothing is persisted.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    table: Table,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        lookup(&self.table, key)
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        insert(&mut self.table, key, value)
    }
}

/// Store backed by a TOML file, rewritten in full on every `set`.
#[derive(Debug)]
pub struct TomlFileStore {
    path: PathBuf,
    table: Table,
}

impl TomlFileStore {
    /// Open the store.  A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = match std::fs::read_to_string(&path) {
            Ok(content) => content.parse::<Table>().map_err(|e| {
                Error::Settings(format!("cannot parse {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Table::new(),
            Err(e) => return Err(Error::storage(&path, e)),
        };
        Ok(Self { path, table })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, table: &Table) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::storage(parent, e))?;
        }
        let content =
            toml::to_string_pretty(table).map_err(|e| Error::Settings(e.to_string()))?;
        std::fs::write(&self.path, content).map_err(|e| Error::storage(&self.path, e))?;
        debug!("settings written to {}", self.path.display());
        Ok(())
    }
}

impl KeyValueStore for TomlFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        lookup(&self.table, key)
    }

    /// The in-memory table only changes once the file is written.
    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut table = self.table.clone();
        insert(&mut table, key, value)?;
        self.save(&table)?;
        self.table = table;
        Ok(())
    }
}

/// Favorites and home country on top of a [`KeyValueStore`].
pub struct FavoritesStore<S> {
    store: S,
}

impl<S: KeyValueStore> FavoritesStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Favorited station ids in insertion order.
    pub fn ids(&self) -> Vec<String> {
        match self.store.get(FAVORITES_KEY) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids().iter().any(|f| f == id)
    }

    /// Add `id` when absent, remove it when present.  Returns the new membership.
    pub fn toggle(&mut self, id: &str) -> Result<bool> {
        let mut ids = self.ids();
        let added = if ids.iter().any(|f| f == id) {
            ids.retain(|f| f != id);
            false
        } else {
            ids.push(id.to_string());
            true
        };
        let value = Value::Array(ids.into_iter().map(Value::String).collect());
        self.store.set(FAVORITES_KEY, value)?;
        Ok(added)
    }

    pub fn home_country(&self) -> Option<String> {
        match self.store.get(COUNTRY_KEY) {
            Some(Value::String(country)) if !country.trim().is_empty() => Some(country),
            _ => None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dotted_keys_nest() {
        let mut store = MemoryStore::new();
        store.set("radio.country", Value::String("Japan".into())).unwrap();
        assert_eq!(store.get("radio.country"), Some(Value::String("Japan".into())));
        assert!(store.get("radio").unwrap().is_table());
        assert!(store.get("radio.missing").is_none());
        assert!(store.get("other.country").is_none());
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut store = MemoryStore::new();
        store.set("radio", Value::Integer(1)).unwrap();
        assert!(matches!(
            store.set("radio.favorites", Value::Array(vec![])),
            Err(Error::Settings(_))
        ));
    }

    #[test]
    fn test_toggle_twice_restores_content() {
        let mut favorites = FavoritesStore::new(MemoryStore::new());
        favorites.toggle("a").unwrap();
        favorites.toggle("b").unwrap();
        let before = favorites.ids();

        assert!(favorites.toggle("c").unwrap());
        assert!(favorites.contains("c"));
        assert!(!favorites.toggle("c").unwrap());
        assert_eq!(favorites.ids(), before);

        assert!(!favorites.toggle("a").unwrap());
        assert!(favorites.toggle("a").unwrap());
        let mut after = favorites.ids();
        after.sort();
        assert_eq!(after, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_toggle_removes_exact_matches_only() {
        let mut favorites = FavoritesStore::new(MemoryStore::new());
        favorites.toggle("abc").unwrap();
        favorites.toggle("abcdef").unwrap();
        favorites.toggle("abc").unwrap();
        assert_eq!(favorites.ids(), vec!["abcdef".to_string()]);
    }

    #[test]
    fn test_home_country() {
        let mut favorites = FavoritesStore::new(MemoryStore::new());
        assert!(favorites.home_country().is_none());
        favorites
            .store_mut()
            .set(COUNTRY_KEY, Value::String("Germany".into()))
            .unwrap();
        assert_eq!(favorites.home_country().as_deref(), Some("Germany"));
    }

    #[test]
    fn test_file_store_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let mut favorites = FavoritesStore::new(TomlFileStore::open(&path).unwrap());
        favorites.toggle("uuid-1").unwrap();
        assert!(path.exists());

        let reopened = FavoritesStore::new(TomlFileStore::open(&path).unwrap());
        assert_eq!(reopened.ids(), vec!["uuid-1".to_string()]);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[radio]"));
    }

    #[test]
    fn test_failed_write_keeps_memory_in_sync() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        let mut favorites =
            FavoritesStore::new(TomlFileStore::open(sub.join("settings.toml")).unwrap());
        std::fs::write(&sub, "not a directory").unwrap();

        let err = favorites.toggle("uuid-1").unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
        assert!(favorites.ids().is_empty());
        assert!(!favorites.contains("uuid-1"));
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        assert!(matches!(TomlFileStore::open(&path), Err(Error::Settings(_))));
    }
}
