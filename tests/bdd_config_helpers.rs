//! Behavioural test helpers for podbridge configuration.

use std::collections::HashMap;
use std::sync::Arc;

use camino::Utf8PathBuf;
use mockable::MockEnv;
use podbridge::config::{AppConfig, Cli, Commands, load_config_with_env};
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::{ScenarioState, given, then, when};
use tempfile::TempDir;

/// Step result type for BDD tests.
pub type StepResult<T> = Result<T, String>;

/// Outcome of loading the configuration.
#[derive(Clone)]
pub enum LoadOutcome {
    /// Loading succeeded.
    Loaded(Box<AppConfig>),
    /// Loading failed with the rendered error.
    Failed(String),
}

/// State shared across configuration test scenarios.
#[derive(Default, ScenarioState)]
pub struct ConfigState {
    /// Directory holding the scenario's configuration file.
    temp_dir: Slot<Arc<TempDir>>,
    /// Path of the configuration file passed with `--config`.
    config_path: Slot<Utf8PathBuf>,
    /// Environment variables seen by the loader.
    env_vars: Slot<HashMap<String, String>>,
    /// Value of the `--connector` flag.
    connector_flag: Slot<String>,
    /// Result of loading.
    outcome: Slot<LoadOutcome>,
}

/// Fixture providing a fresh configuration state.
#[fixture]
pub fn config_state() -> ConfigState {
    let state = ConfigState::default();
    state.env_vars.set(HashMap::new());
    state
}

/// Writes `contents` as the scenario's configuration file.
fn write_config_file(config_state: &ConfigState, contents: &str) -> StepResult<()> {
    let dir = tempfile::tempdir().map_err(|_| String::from("failed to create temp dir"))?;
    let path = Utf8PathBuf::from_path_buf(dir.path().join("config.toml"))
        .map_err(|_| String::from("temp dir path is not UTF-8"))?;
    std::fs::write(&path, contents)
        .map_err(|_| String::from("failed to write configuration file"))?;
    config_state.temp_dir.set(Arc::new(dir));
    config_state.config_path.set(path);
    Ok(())
}

fn check<T: PartialEq + std::fmt::Debug>(what: &str, actual: T, expected: T) -> StepResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {what} {expected:?}, got {actual:?}"))
    }
}

fn loaded_config(config_state: &ConfigState) -> StepResult<AppConfig> {
    match config_state.outcome.get() {
        Some(LoadOutcome::Loaded(config)) => Ok(*config),
        Some(LoadOutcome::Failed(_)) => Err(String::from("configuration failed to load")),
        None => Err(String::from("configuration should have been loaded")),
    }
}

#[given("an empty configuration file")]
fn empty_configuration_file(config_state: &ConfigState) -> StepResult<()> {
    write_config_file(config_state, "")
}

#[given("a configuration file selecting {connector}")]
fn configuration_file_selecting(config_state: &ConfigState, connector: String) -> StepResult<()> {
    write_config_file(config_state, &format!("connector = \"{connector}\"\n"))
}

#[given("a configuration file with a retry count of {count}")]
fn configuration_file_with_retry_count(config_state: &ConfigState, count: u32) -> StepResult<()> {
    write_config_file(config_state, &format!("[api]\nretry_count = {count}\n"))
}

#[given("a configuration file path that does not exist")]
fn configuration_file_path_missing(config_state: &ConfigState) -> StepResult<()> {
    let dir = tempfile::tempdir().map_err(|_| String::from("failed to create temp dir"))?;
    let path = Utf8PathBuf::from_path_buf(dir.path().join("absent.toml"))
        .map_err(|_| String::from("temp dir path is not UTF-8"))?;
    config_state.temp_dir.set(Arc::new(dir));
    config_state.config_path.set(path);
    Ok(())
}

#[given("{name} is set to {value}")]
fn environment_variable_is_set(
    config_state: &ConfigState,
    name: String,
    value: String,
) -> StepResult<()> {
    let mut vars = config_state
        .env_vars
        .get()
        .ok_or_else(|| String::from("env_vars should be initialised"))?;
    vars.insert(name, value);
    config_state.env_vars.set(vars);
    Ok(())
}

#[given("the connector flag is {connector}")]
fn connector_flag_is(config_state: &ConfigState, connector: String) {
    config_state.connector_flag.set(connector);
}

#[when("the configuration is loaded")]
fn configuration_is_loaded(config_state: &ConfigState) -> StepResult<()> {
    let vars = config_state
        .env_vars
        .get()
        .ok_or_else(|| String::from("env_vars should be initialised"))?;
    let mut env = MockEnv::new();
    env.expect_string()
        .returning(move |key| vars.get(key).cloned());

    let cli = Cli {
        command: Commands::Settings,
        config: config_state.config_path.get(),
        connector: config_state.connector_flag.get(),
        settings_file: None,
    };
    let outcome = match load_config_with_env(&cli, &env) {
        Ok(config) => LoadOutcome::Loaded(Box::new(config)),
        Err(error) => LoadOutcome::Failed(error.to_string()),
    };
    config_state.outcome.set(outcome);
    Ok(())
}

#[then("the connector is {connector}")]
fn connector_is(config_state: &ConfigState, connector: String) -> StepResult<()> {
    let config = loaded_config(config_state)?;
    check("connector", config.connector, connector)
}

#[then("the API retry budget is {count} checks")]
fn retry_budget_is(config_state: &ConfigState, count: u32) -> StepResult<()> {
    let config = loaded_config(config_state)?;
    check("retry count", config.api.retry_count, count)
}

#[then("the log level is {level}")]
fn log_level_is(config_state: &ConfigState, level: String) -> StepResult<()> {
    let config = loaded_config(config_state)?;
    check("log level", config.log_level, level)
}

#[then("the starter program is {path}")]
fn starter_program_is(config_state: &ConfigState, path: String) -> StepResult<()> {
    let config = loaded_config(config_state)?;
    check("starter", config.starter.path, Some(path))
}

#[then("loading fails")]
fn loading_fails(config_state: &ConfigState) -> StepResult<()> {
    match config_state.outcome.get() {
        Some(LoadOutcome::Failed(_)) => Ok(()),
        Some(LoadOutcome::Loaded(_)) => {
            Err(String::from("configuration loaded but should have failed"))
        }
        None => Err(String::from("configuration should have been loaded")),
    }
}

#[then("loading fails mentioning {text}")]
fn loading_fails_mentioning(config_state: &ConfigState, text: String) -> StepResult<()> {
    match config_state.outcome.get() {
        Some(LoadOutcome::Failed(message)) if message.contains(&text) => Ok(()),
        Some(LoadOutcome::Failed(message)) => {
            Err(format!("expected '{text}' in error: {message}"))
        }
        Some(LoadOutcome::Loaded(_)) => {
            Err(String::from("configuration loaded but should have failed"))
        }
        None => Err(String::from("configuration should have been loaded")),
    }
}
