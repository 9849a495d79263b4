//! Persisted user settings key-value store.
//!
//! The engine core only ever reads and writes user settings through the
//! [`SettingsStore`] trait. [`JsonFileSettingsStore`] keeps the document in a
//! `user-settings.json` file; [`MemorySettingsStore`] keeps it in memory.

use std::sync::{Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde_json::map::Entry;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::error::ConfigError;

/// File name of the persisted user settings document.
pub const USER_SETTINGS_FILE_NAME: &str = "user-settings.json";

/// Suffix of the copy kept when a malformed document is rewritten.
const BACKUP_SUFFIX: &str = ".bak";

/// Key stamped with the crate version on every write.
const VERSION_KEY: &str = "version";

/// Key-value access to persisted user settings.
pub trait SettingsStore: Send + Sync {
    /// Returns the stored value for a top-level key.
    fn get_key(&self, name: &str) -> Option<Value>;

    /// Deep-merges `value` into the stored value for `name`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::StoreIo` when the document cannot be persisted.
    fn set_key(&self, name: &str, value: Value) -> Result<(), ConfigError>;

    /// Location of the persisted document, when backed by a file.
    fn storage_path(&self) -> Option<Utf8PathBuf>;
}

/// Recursively merges `overlay` into `base`.
///
/// Objects are merged key by key; any other overlay value replaces the base.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.entry(key) {
                    Entry::Occupied(mut slot) => deep_merge(slot.get_mut(), overlay_value),
                    Entry::Vacant(slot) => {
                        slot.insert(overlay_value);
                    }
                }
            }
        }
        (slot, replacement) => *slot = replacement,
    }
}

fn merge_key(document: &mut Map<String, Value>, name: &str, value: Value) {
    match document.entry(name) {
        Entry::Occupied(mut slot) => deep_merge(slot.get_mut(), value),
        Entry::Vacant(slot) => {
            slot.insert(value);
        }
    }
    document.insert(
        String::from(VERSION_KEY),
        Value::String(String::from(env!("CARGO_PKG_VERSION"))),
    );
}

/// In-memory [`SettingsStore`].
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    document: Mutex<Map<String, Value>>,
}

impl MemorySettingsStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with an existing document.
    #[must_use]
    pub fn with_document(document: Map<String, Value>) -> Self {
        Self {
            document: Mutex::new(document),
        }
    }

    /// Returns a copy of the whole document.
    #[must_use]
    pub fn snapshot(&self) -> Map<String, Value> {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get_key(&self, name: &str) -> Option<Value> {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn set_key(&self, name: &str, value: Value) -> Result<(), ConfigError> {
        let mut document = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        merge_key(&mut document, name, value);
        Ok(())
    }

    fn storage_path(&self) -> Option<Utf8PathBuf> {
        None
    }
}

/// [`SettingsStore`] persisted as a pretty-printed JSON document.
#[derive(Debug)]
pub struct JsonFileSettingsStore {
    path: Utf8PathBuf,
    // Serialises read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileSettingsStore {
    /// Creates a store backed by the document at `path`.
    ///
    /// The file does not need to exist yet.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Default document location: `<data dir>/podbridge/user-settings.json`.
    #[must_use]
    pub fn default_path() -> Option<Utf8PathBuf> {
        let data_dir = dirs::data_dir()?;
        let utf8 = Utf8PathBuf::from_path_buf(data_dir).ok()?;
        Some(utf8.join("podbridge").join(USER_SETTINGS_FILE_NAME))
    }

    /// Path of the backing document.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn parent_and_name(&self) -> (&Utf8Path, &str) {
        let parent = self
            .path
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let name = self.path.file_name().unwrap_or(USER_SETTINGS_FILE_NAME);
        (parent, name)
    }

    fn store_error(&self, message: String) -> ConfigError {
        ConfigError::StoreIo {
            path: self.path.clone().into_std_path_buf(),
            message,
        }
    }

    /// Reads the whole document. Missing or malformed documents read as `{}`.
    #[must_use]
    pub fn read_document(&self) -> Map<String, Value> {
        self.load_document().unwrap_or_else(|problem| {
            error!(target: "podbridge::settings", path = %self.path, %problem, "unable to read settings document");
            Map::new()
        })
    }

    /// Reads the document, reporting a malformed one as an error. A missing
    /// document reads as `{}`.
    fn load_document(&self) -> Result<Map<String, Value>, String> {
        let (parent, name) = self.parent_and_name();
        let Ok(dir) = Dir::open_ambient_dir(parent, ambient_authority()) else {
            debug!(target: "podbridge::settings", path = %self.path, "settings directory missing");
            return Ok(Map::new());
        };
        let Ok(contents) = dir.read_to_string(name) else {
            debug!(target: "podbridge::settings", path = %self.path, "settings document missing");
            return Ok(Map::new());
        };
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(_) => Err(String::from("settings document is not an object")),
            Err(parse_error) => Err(parse_error.to_string()),
        }
    }

    /// Path a malformed document is moved to before it is rewritten.
    #[must_use]
    pub fn backup_path(&self) -> Utf8PathBuf {
        let (parent, name) = self.parent_and_name();
        parent.join(format!("{name}{BACKUP_SUFFIX}"))
    }

    /// Moves a malformed document aside so a write does not discard it.
    fn preserve_malformed(&self, problem: &str) -> Result<(), ConfigError> {
        let (parent, name) = self.parent_and_name();
        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|e| self.store_error(format!("failed to open directory {parent}: {e}")))?;
        let backup = format!("{name}{BACKUP_SUFFIX}");
        dir.rename(name, &dir, &backup).map_err(|e| {
            self.store_error(format!(
                "settings document is malformed ({problem}) and could not be moved aside: {e}"
            ))
        })?;
        error!(
            target: "podbridge::settings",
            path = %self.path,
            backup = %self.backup_path(),
            %problem,
            "malformed settings document moved aside"
        );
        Ok(())
    }

    fn write_document(&self, document: &Map<String, Value>) -> Result<(), ConfigError> {
        let (parent, name) = self.parent_and_name();
        Dir::create_ambient_dir_all(parent, ambient_authority())
            .map_err(|e| self.store_error(format!("failed to create directory {parent}: {e}")))?;
        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|e| self.store_error(format!("failed to open directory {parent}: {e}")))?;
        let contents = serde_json::to_string_pretty(document)
            .map_err(|e| self.store_error(format!("failed to encode settings: {e}")))?;
        dir.write(name, contents)
            .map_err(|e| self.store_error(format!("failed to write settings: {e}")))
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn get_key(&self, name: &str) -> Option<Value> {
        self.read_document().remove(name)
    }

    fn set_key(&self, name: &str, value: Value) -> Result<(), ConfigError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut document = match self.load_document() {
            Ok(document) => document,
            Err(problem) => {
                self.preserve_malformed(&problem)?;
                Map::new()
            }
        };
        merge_key(&mut document, name, value);
        self.write_document(&document)?;
        debug!(target: "podbridge::settings", path = %self.path, key = name, "settings key updated");
        Ok(())
    }

    fn storage_path(&self) -> Option<Utf8PathBuf> {
        Some(self.path.clone())
    }
}
