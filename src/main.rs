//! `podbridge` application entry point.
//!
//! This binary queries and drives a single container engine connector. It uses
//! `eyre` for opaque error handling at the application boundary, converting
//! domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/podbridge/config.toml` or path from
//!    `PODBRIDGE_CONFIG_PATH`)
//! 3. Environment variables (`PODBRIDGE_*`)
//! 4. Command-line arguments

use std::sync::Arc;

use clap::Parser;
use eyre::{Report, Result as EyreResult};
use mockable::DefaultEnv;
use podbridge::config::{
    AppConfig, Cli, Commands, JsonFileSettingsStore, MemorySettingsStore, SettingsStore,
    get_global_user_settings, load_config,
};
use podbridge::engine::{
    Connector, EngineClient, HostPaths, LifecycleOptions, TracingNotifier,
};
use podbridge::error::{ConnectorError, Result as PodbridgeResult};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// Loads configuration with layered precedence via `OrthoConfig`, installs
/// logging, then dispatches to the subcommand handler on a Tokio runtime.
fn main() -> EyreResult<()> {
    let cli = Cli::parse();

    // Load configuration with layered precedence: defaults < file < env < CLI.
    let config = load_config(&cli).map_err(Report::from)?;
    let store = open_store(&config);
    init_tracing(&config, store.as_ref());

    let runtime = tokio::runtime::Runtime::new()?;
    runtime
        .block_on(run(&cli, &config, store))
        .map_err(Report::from)
}

/// Opens the persisted user settings, falling back to memory when no data
/// directory is known.
fn open_store(config: &AppConfig) -> Arc<dyn SettingsStore> {
    config
        .settings_file
        .clone()
        .or_else(JsonFileSettingsStore::default_path)
        .map_or_else(
            || Arc::new(MemorySettingsStore::new()) as Arc<dyn SettingsStore>,
            |path| Arc::new(JsonFileSettingsStore::new(path)) as Arc<dyn SettingsStore>,
        )
}

/// Installs the log subscriber.
///
/// `RUST_LOG` wins, then the persisted `logging.level`, then `log_level`.
fn init_tracing(config: &AppConfig, store: &dyn SettingsStore) {
    let persisted = get_global_user_settings(store, &config.connector)
        .logging
        .level;
    let level = persisted.as_deref().unwrap_or(&config.log_level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(podbridge::config::DEFAULT_LOG_LEVEL));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the client for the configured connector.
fn build_client(config: &AppConfig, store: Arc<dyn SettingsStore>) -> PodbridgeResult<EngineClient> {
    let connector = Connector::from_id(&config.connector, store.as_ref())?;
    let paths = HostPaths::from_env(&DefaultEnv::new());
    let lifecycle = LifecycleOptions {
        retry: config.api.retry_policy(),
        starter: config.starter.starter(),
        stopper: config.stopper.stopper(),
    };
    Ok(EngineClient::for_host(
        connector,
        store,
        paths,
        config.engine.minimum_version,
        Arc::new(TracingNotifier),
    )
    .with_lifecycle(lifecycle))
}

/// Execute the CLI command, returning domain-specific errors.
///
/// Keeps semantic errors inside the run loop so the CLI boundary owns
/// conversion to `eyre::Report`.
async fn run(cli: &Cli, config: &AppConfig, store: Arc<dyn SettingsStore>) -> PodbridgeResult<()> {
    if matches!(cli.command, Commands::UserSettings) {
        return print_json(&get_global_user_settings(store.as_ref(), &config.connector));
    }

    let client = build_client(config, store)?;
    match &cli.command {
        Commands::Availability => print_json(&client.check_availability().await),
        Commands::Settings => print_json(&client.get_current_settings().await),
        Commands::Machines(args) => print_json(&client.get_machines(args.format.as_deref()).await),
        Commands::Info(args) => print_json(&client.get_system_info(args.format.as_deref()).await),
        Commands::Connections(args) => {
            print_json(&client.get_system_connections(args.format.as_deref()).await)
        }
        Commands::ApiStatus => print_json(&client.is_api_running().await),
        Commands::ServeApi => serve_api(&client).await,
        // Printed before the client is built.
        Commands::UserSettings => Ok(()),
    }
}

/// Starts the API, waits for Ctrl-C, then stops it.
async fn serve_api(client: &EngineClient) -> PodbridgeResult<()> {
    if !client.start_api().await {
        return Err(ConnectorError::ProcessError {
            message: String::from("engine API did not start, see the log for details"),
        }
        .into());
    }
    info!(connector = %client.connector().id, "engine API running, press Ctrl-C to stop");
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "unable to wait for Ctrl-C, stopping now");
    }
    if !client.stop_api().await {
        warn!(connector = %client.connector().id, "engine API stop reported failure");
    }
    Ok(())
}

/// Prints `value` as pretty JSON on standard output.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn print_json<T: Serialize>(value: &T) -> PodbridgeResult<()> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|err| ConnectorError::DecodeFailed {
            command: String::from("render output"),
            message: err.to_string(),
        })?;
    println!("{rendered}");
    Ok(())
}
