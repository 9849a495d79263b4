//! Configuration system for podbridge.
//!
//! This module provides the application configuration, the CLI definitions and
//! the persisted user settings store. Configuration loading and precedence
//! merging is handled by the `ortho_config` crate: CLI flags override
//! environment variables, which override configuration files, which override
//! defaults.
//!
//! The configuration file is expected at `~/.config/podbridge/config.toml` by
//! default.
//!
//! # Example Configuration
//!
//! ```toml
//! connector = "podman.subsystem.lima"
//! log_level = "debug"
//!
//! [api]
//! retry_count = 20
//! retry_wait_ms = 2000
//!
//! [stopper]
//! path = "/opt/homebrew/bin/limactl"
//! args = ["stop", "podman"]
//!
//! [engine]
//! minimum_version = "4.0.0"
//! ```

mod cli;
mod loader;
mod store;
mod types;
mod user_settings;

#[cfg(test)]
mod tests;

pub use cli::{Cli, Commands, FormatArgs};
pub use loader::{env_var_names, load_config, load_config_with_env};
pub use store::{
    JsonFileSettingsStore, MemorySettingsStore, SettingsStore, USER_SETTINGS_FILE_NAME, deep_merge,
};
pub use types::{
    ApiConfig, AppConfig, CommandConfig, DEFAULT_LOG_LEVEL, EngineConfig, default_connector_kind,
};
pub use user_settings::{
    ConnectorPreferences, GlobalUserSettings, GlobalUserSettingsUpdate, LoggingSettings,
    get_engine_user_settings, get_global_user_settings, set_engine_user_settings,
    set_global_user_settings,
};
