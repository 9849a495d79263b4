//! Configuration loading with layered precedence.
//!
//! This module provides functions to load configuration with the precedence order
//! (lowest to highest): application defaults, configuration file, environment
//! variables, command-line arguments.
//!
//! # Architecture Note: Why Manual Layer Composition?
//!
//! The `OrthoConfig` derive macro provides `load()` and `compose_layers()` methods
//! that handle discovery, environment variables, and CLI parsing automatically.
//! This loader composes the layers itself because the `Cli` struct owns subcommand
//! dispatch, typed environment values must fail fast, and `--config` must win over
//! XDG discovery.
//!
//! # Environment Variable Handling
//!
//! Environment variables with unparseable values (e.g.,
//! `PODBRIDGE_API_RETRY_COUNT=often`) return an error immediately rather than
//! silently falling back to defaults.
//!
//! String fields (e.g., `PODBRIDGE_CONNECTOR`) are always accepted. Typed fields
//! such as integers (`PODBRIDGE_API_RETRY_WAIT_MS`) or versions
//! (`PODBRIDGE_ENGINE_MINIMUM_VERSION`) must have valid values.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use mockable::{DefaultEnv, Env};
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::engine::version::SemVerTriple;
use crate::error::{ConfigError, Result};

// ============================================================================
// Environment Variable Specification Table
// ============================================================================

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Unsigned 32-bit integer. Invalid values return an error.
    U32,
    /// Unsigned 64-bit integer. Invalid values return an error.
    U64,
    /// `X.Y.Z` version. Invalid values return an error.
    Version,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `PODBRIDGE_CONNECTOR`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["api", "retry_count"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

/// Table of all environment variables and their JSON paths.
///
/// Adding or modifying environment variable mappings is a single-line change here.
/// The order doesn't matter as the table is processed in a single pass.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    // Top-level fields
    EnvVarSpec {
        env_var: "PODBRIDGE_CONNECTOR",
        path: &["connector"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "PODBRIDGE_SETTINGS_FILE",
        path: &["settings_file"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "PODBRIDGE_LOG_LEVEL",
        path: &["log_level"],
        var_type: EnvVarType::String,
    },
    // API fields
    EnvVarSpec {
        env_var: "PODBRIDGE_API_RETRY_COUNT",
        path: &["api", "retry_count"],
        var_type: EnvVarType::U32,
    },
    EnvVarSpec {
        env_var: "PODBRIDGE_API_RETRY_WAIT_MS",
        path: &["api", "retry_wait_ms"],
        var_type: EnvVarType::U64,
    },
    // Starter and stopper programs
    EnvVarSpec {
        env_var: "PODBRIDGE_STARTER_PATH",
        path: &["starter", "path"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "PODBRIDGE_STOPPER_PATH",
        path: &["stopper", "path"],
        var_type: EnvVarType::String,
    },
    // Engine fields
    EnvVarSpec {
        env_var: "PODBRIDGE_ENGINE_MINIMUM_VERSION",
        path: &["engine", "minimum_version"],
        var_type: EnvVarType::Version,
    },
];

/// Returns the list of environment variable names recognised by the config loader.
///
/// This is primarily useful for tests that need to clear all `PODBRIDGE_*` environment
/// variables to ensure isolation. Using this function instead of a hard-coded list
/// ensures the test stays in sync with the loader's actual environment variable
/// mappings.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load a configuration file and push it to the composer.
///
/// Uses `cap_std::fs_utf8` for capability-oriented filesystem access as per
/// project conventions. The function opens the parent directory of the config
/// file and reads from there.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    // Open the parent directory using ambient authority, then read the file.
    let current_dir = Utf8PathBuf::from(".");
    let parent = path.parent().unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Load configuration with full layer precedence.
///
/// This function loads configuration from all available sources:
/// 1. Application defaults defined in the struct
/// 2. Configuration file (discovered via XDG paths or `PODBRIDGE_CONFIG_PATH`)
/// 3. Environment variables prefixed with `PODBRIDGE_`
/// 4. Command-line arguments (from the provided `Cli`)
///
/// Later sources override earlier ones.
///
/// # Errors
///
/// Returns `ConfigError` if configuration loading fails due to:
/// - A `--config` path that does not exist
/// - Malformed configuration files
/// - Invalid typed environment variable values (e.g., a non-numeric
///   `PODBRIDGE_API_RETRY_COUNT`)
/// - Validation failures after merge (e.g., `api.retry_count = 0`)
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    load_config_with_env(cli, &DefaultEnv::new())
}

/// Load configuration reading environment variables from `env`.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with_env(cli: &Cli, env: &impl Env) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    // Layer 1: Defaults (serialised from AppConfig::default()).
    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    // Layer 2: Configuration file.
    if let Some(explicit) = cli.config.as_ref()
        && !explicit.exists()
    {
        return Err(ConfigError::FileNotFound {
            path: explicit.clone().into_std_path_buf(),
        }
        .into());
    }
    let config_path: Option<Utf8PathBuf> = cli.config.clone().or_else(|| {
        let discovery = ConfigDiscovery::builder("podbridge")
            .env_var("PODBRIDGE_CONFIG_PATH")
            .config_file_name("config.toml")
            .dotfile_name(".podbridge.toml")
            .build();
        discovery
            .candidates()
            .into_iter()
            .filter(|p| p.exists())
            .find_map(|p| Utf8PathBuf::try_from(p).ok())
    });

    if let Some(ref path) = config_path {
        load_config_file(path, &mut composer)?;
    }

    // Layer 3: Environment variables.
    let env_values = collect_env_vars(env)?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    // Layer 4: CLI overrides.
    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;

    Ok(config)
}

fn invalid_env_value(spec: &EnvVarSpec, expected: &str, raw_value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: spec.env_var.to_owned(),
        reason: format!("expected {expected}, got '{raw_value}'"),
    }
}

/// Collect environment variables with the `PODBRIDGE_` prefix into a JSON value.
///
/// All mappings are defined in [`ENV_VAR_SPECS`].
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a typed environment variable has an
/// unparseable value.
fn collect_env_vars(env: &impl Env) -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Some(raw_value) = env.string(spec.env_var) else {
            continue;
        };

        let json_value = match spec.var_type {
            EnvVarType::String => Value::String(raw_value),
            EnvVarType::U32 => raw_value
                .parse::<u32>()
                .map(|n| Value::Number(n.into()))
                .map_err(|_| invalid_env_value(spec, "unsigned integer", &raw_value))?,
            EnvVarType::U64 => raw_value
                .parse::<u64>()
                .map(|n| Value::Number(n.into()))
                .map_err(|_| invalid_env_value(spec, "unsigned integer", &raw_value))?,
            EnvVarType::Version => SemVerTriple::parse(&raw_value)
                .map(|version| Value::String(version.to_string()))
                .ok_or_else(|| invalid_env_value(spec, "version (X.Y.Z)", &raw_value))?,
        };

        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

/// Insert a value at a nested path in a JSON map.
///
/// For a path like `["api", "retry_count"]`, this creates the intermediate
/// `api` object if needed and inserts `retry_count` within it.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(field.to_owned(), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();

    if let Some(ref connector) = cli.connector {
        overrides.insert("connector".to_owned(), Value::String(connector.clone()));
    }

    if let Some(ref settings_file) = cli.settings_file {
        overrides.insert(
            "settings_file".to_owned(),
            Value::String(settings_file.to_string()),
        );
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}
