//! Configuration data types for podbridge.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::engine::kind::EngineKind;
use crate::engine::runner::{
    DEFAULT_RETRY_COUNT, DEFAULT_RETRY_WAIT_MS, RetryPolicy, RunnerStarterOptions,
    RunnerStopperOptions,
};
use crate::engine::settings::HostOs;
use crate::engine::version::SemVerTriple;

/// Default log level filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// The connector used when none is configured: native Podman on Linux, the
/// Lima instance on macOS and the WSL distribution on Windows.
#[must_use]
pub const fn default_connector_kind() -> EngineKind {
    match HostOs::current() {
        HostOs::Linux => EngineKind::NativePodman,
        HostOs::MacOs => EngineKind::PodmanVirtualizedLima,
        HostOs::Windows => EngineKind::PodmanVirtualizedWsl,
    }
}

/// API readiness polling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct ApiConfig {
    /// Number of status checks while starting the API.
    #[default(DEFAULT_RETRY_COUNT)]
    pub retry_count: u32,

    /// Delay between status checks, in milliseconds.
    #[default(DEFAULT_RETRY_WAIT_MS)]
    pub retry_wait_ms: u64,
}

impl ApiConfig {
    /// The runner retry policy described by this section.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, Duration::from_millis(self.retry_wait_ms))
    }
}

/// A program invocation used to start or stop the API service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Program to run. The connector default applies when unset.
    pub path: Option<String>,

    /// Program arguments.
    pub args: Vec<String>,
}

impl CommandConfig {
    /// Starter options, when a program is configured.
    #[must_use]
    pub fn starter(&self) -> Option<RunnerStarterOptions> {
        self.path
            .as_ref()
            .map(|path| RunnerStarterOptions::new(path.clone(), self.args.iter().cloned()))
    }

    /// Stopper options, when a program is configured.
    #[must_use]
    pub fn stopper(&self) -> Option<RunnerStopperOptions> {
        self.path
            .as_ref()
            .map(|path| RunnerStopperOptions::new(path.clone(), self.args.iter().cloned()))
    }
}

/// Engine requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Oldest engine version treated as available.
    pub minimum_version: Option<SemVerTriple>,
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `PODBRIDGE_CONFIG_PATH` environment variable
/// 2. `.podbridge.toml` in the current working directory
/// 3. `.podbridge.toml` in the home directory
/// 4. `~/.config/podbridge/config.toml` (XDG default)
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig, SmartDefault)]
#[serde(default)]
#[ortho_config(
    prefix = "PODBRIDGE",
    post_merge_hook,
    discovery(
        app_name = "podbridge",
        env_var = "PODBRIDGE_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".podbridge.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// Connector id: an engine kind key or a custom id with stored overrides.
    #[default(String::from(default_connector_kind().key()))]
    pub connector: String,

    /// Persisted user settings document. Defaults to the platform data
    /// directory.
    pub settings_file: Option<Utf8PathBuf>,

    /// Log level filter used when neither `RUST_LOG` nor the user settings
    /// set one.
    #[default(String::from(DEFAULT_LOG_LEVEL))]
    pub log_level: String,

    /// API readiness polling.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub api: ApiConfig,

    /// Starter replacing the connector default.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub starter: CommandConfig,

    /// Stopper replacing the connector default.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub stopper: CommandConfig,

    /// Engine requirements.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub engine: EngineConfig,
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        if self.api.retry_count == 0 {
            return Err(Arc::new(OrthoError::Validation {
                key: String::from("api.retry_count"),
                message: String::from("must be at least 1"),
            }));
        }
        if self.connector.trim().is_empty() {
            self.connector = String::from(default_connector_kind().key());
        }
        Ok(())
    }
}
