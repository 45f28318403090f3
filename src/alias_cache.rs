//! Session-scoped cache of column aliases.
//!
//! The cache holds a single slot: the last saved column definition list,
//! serialized as JSON. Only the `name -> alias` pairs matter when it is read
//! back. Reads and writes are best effort; the [`AliasCache`] methods report
//! failures as [`CacheError`] and callers fall back to default aliases.

use log::{debug, warn};
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::CacheError;
use crate::ingest::ColumnDefinition;

/// Key under which the column definition list is stored.
pub const ALIAS_CACHE_KEY: &str = "geojsonFieldAliasesCache";

/// A narrow key-value store that lives as long as the user's session.
pub trait SessionStore {
    fn get(&self, key: &str) -> io::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a JSON object in a file, for sessions spanning several
/// command invocations. Deleting the file ends the session.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> io::Result<HashMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(err),
        }
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        // A corrupt session file is replaced rather than blocking writes.
        let mut entries = self.read_all().unwrap_or_default();
        entries.insert(key.to_string(), value.to_string());
        let text = serde_json::to_string_pretty(&entries)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        fs::write(&self.path, text)
    }
}

// Only name and alias are read back; other fields are ignored.
#[derive(Deserialize)]
struct CachedAlias {
    name: String,
    alias: String,
}

pub struct AliasCache<'a> {
    store: &'a dyn SessionStore,
}

impl<'a> AliasCache<'a> {
    pub fn new(store: &'a dyn SessionStore) -> Self {
        Self { store }
    }

    /// Overwrites the slot with the full definition list.
    pub fn save(&self, definitions: &[ColumnDefinition]) -> Result<(), CacheError> {
        let text = serde_json::to_string(definitions)?;
        self.store.set(ALIAS_CACHE_KEY, &text)?;
        debug!("Saved {} column aliases to session cache", definitions.len());
        Ok(())
    }

    /// Returns the saved `name -> alias` pairs, or an empty map when nothing
    /// was saved yet.
    pub fn load(&self) -> Result<HashMap<String, String>, CacheError> {
        let Some(text) = self.store.get(ALIAS_CACHE_KEY)? else {
            return Ok(HashMap::new());
        };
        let entries: Vec<CachedAlias> = serde_json::from_str(&text)?;
        Ok(entries
            .into_iter()
            .map(|entry| (entry.name, entry.alias))
            .collect())
    }

    /// Like [`AliasCache::load`], but a failed read means "no overrides".
    pub fn load_or_default(&self) -> HashMap<String, String> {
        self.load().unwrap_or_else(|err| {
            warn!("Ignoring unreadable alias cache: {}", err);
            HashMap::new()
        })
    }

    /// Like [`AliasCache::save`], but failures are only logged.
    pub fn save_best_effort(&self, definitions: &[ColumnDefinition]) {
        if let Err(err) = self.save(definitions) {
            warn!("Could not save column aliases: {}", err);
        }
    }
}
