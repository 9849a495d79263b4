//! Typed views over the persisted user settings document.
//!
//! Global settings live under top-level keys (`startApi`, `logging`,
//! `connector`); per-connector overrides live under the connector id.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::store::SettingsStore;
use crate::engine::settings::EngineUserSettings;
use crate::error::ConfigError;

const START_API_KEY: &str = "startApi";
const MINIMIZE_TO_SYSTEM_TRAY_KEY: &str = "minimizeToSystemTray";
const LOGGING_KEY: &str = "logging";
const CONNECTOR_KEY: &str = "connector";
const FLAT_DEFAULT_CONNECTOR_KEY: &str = "connector.default";

/// Persisted logging preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter, such as `debug`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Persisted connector preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorPreferences {
    /// Identifier of the connector to use by default.
    pub default: String,
}

/// Application-wide user settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalUserSettings {
    /// Start the engine API when the application starts.
    pub start_api: bool,
    /// Minimise to the system tray instead of closing.
    pub minimize_to_system_tray: bool,
    /// Location of the settings document, when file-backed.
    pub path: Option<Utf8PathBuf>,
    /// Logging preferences.
    pub logging: LoggingSettings,
    /// Connector preferences.
    pub connector: ConnectorPreferences,
}

/// A partial update of [`GlobalUserSettings`]. Absent fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalUserSettingsUpdate {
    /// New `startApi` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_api: Option<bool>,
    /// New `minimizeToSystemTray` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimize_to_system_tray: Option<bool>,
    /// New logging preferences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSettings>,
    /// New connector preferences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<ConnectorPreferences>,
}

fn bool_key(store: &dyn SettingsStore, name: &str) -> bool {
    store
        .get_key(name)
        .and_then(|value| value.as_bool())
        .unwrap_or(false)
}

fn default_connector(store: &dyn SettingsStore, fallback: &str) -> String {
    let nested = store
        .get_key(CONNECTOR_KEY)
        .and_then(|value| value.get("default").and_then(Value::as_str).map(String::from));
    nested
        .or_else(|| {
            store
                .get_key(FLAT_DEFAULT_CONNECTOR_KEY)
                .and_then(|value| value.as_str().map(String::from))
        })
        .unwrap_or_else(|| String::from(fallback))
}

/// Reads the global user settings, filling gaps with defaults.
#[must_use]
pub fn get_global_user_settings(
    store: &dyn SettingsStore,
    default_connector_id: &str,
) -> GlobalUserSettings {
    let level = store
        .get_key(LOGGING_KEY)
        .and_then(|value| value.get("level").and_then(Value::as_str).map(String::from));
    GlobalUserSettings {
        start_api: bool_key(store, START_API_KEY),
        minimize_to_system_tray: bool_key(store, MINIMIZE_TO_SYSTEM_TRAY_KEY),
        path: store.storage_path(),
        logging: LoggingSettings { level },
        connector: ConnectorPreferences {
            default: default_connector(store, default_connector_id),
        },
    }
}

/// Writes every field present in `update` and returns the refreshed view.
///
/// # Errors
///
/// Returns `ConfigError::StoreIo` when the document cannot be persisted.
pub fn set_global_user_settings(
    store: &dyn SettingsStore,
    update: &GlobalUserSettingsUpdate,
    default_connector_id: &str,
) -> Result<GlobalUserSettings, ConfigError> {
    let serialized = serde_json::to_value(update).map_err(|err| ConfigError::InvalidValue {
        field: String::from("user settings"),
        reason: err.to_string(),
    })?;
    if let Value::Object(entries) = serialized {
        for (key, value) in entries {
            store.set_key(&key, value)?;
        }
    }
    Ok(get_global_user_settings(store, default_connector_id))
}

/// Reads the override document of connector `id`.
///
/// A missing document reads as no overrides; a malformed one is logged and
/// ignored.
#[must_use]
pub fn get_engine_user_settings(store: &dyn SettingsStore, id: &str) -> EngineUserSettings {
    let Some(value) = store.get_key(id) else {
        return EngineUserSettings::default();
    };
    serde_json::from_value(value).unwrap_or_else(|err| {
        warn!(target: "podbridge::settings", connector = id, error = %err, "ignoring malformed connector overrides");
        EngineUserSettings::default()
    })
}

/// Merges `overrides` into the document of connector `id` and returns the
/// stored result.
///
/// # Errors
///
/// Returns `ConfigError::StoreIo` when the document cannot be persisted.
pub fn set_engine_user_settings(
    store: &dyn SettingsStore,
    id: &str,
    overrides: &EngineUserSettings,
) -> Result<EngineUserSettings, ConfigError> {
    let value = serde_json::to_value(overrides).map_err(|err| ConfigError::InvalidValue {
        field: String::from(id),
        reason: err.to_string(),
    })?;
    store.set_key(id, value)?;
    Ok(get_engine_user_settings(store, id))
}
