//! The engine client: read queries and API lifecycle for one connector.
//!
//! Every read query runs the same template:
//!
//! 1. check availability, returning the empty value when it fails; the
//!    engine program is only run for its version once the program or
//!    controller resolves and the instance is running;
//! 2. resolve settings and the connector's wrapper;
//! 3. build the command, appending format flags only where the engine
//!    version emits structured output;
//! 4. execute it;
//! 5. return the empty value on a non-zero exit;
//! 6. decode standard output, returning the empty value when it is malformed.
//!
//! Connector variants differ only in the settings the resolver produces, so
//! there is one client type for all of them.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use super::api_probe::{ApiProbe, ApiStatus, BollardApiProbe};
use super::availability::{Availability, AvailabilityChecker};
use super::executor::{CommandExecutor, ExecOptions, ProcessExecutor, ProcessSpawner};
use super::kind::ContainerEngine;
use super::notify::LifecycleNotifier;
use super::runner::{
    RetryPolicy, Runner, RunnerStarterOptions, RunnerStopperOptions, ServiceOpts,
};
use super::settings::variant::{default_starter, default_stopper};
use super::settings::{
    CommandHostProbe, Connector, EngineConnectorSettings, HostPaths, HostProbe, SettingsResolver,
};
use super::version::SemVerTriple;
use crate::config::SettingsStore;
use crate::error::ConnectorError;

/// Default value of a query's `format` argument.
pub const DEFAULT_FORMAT: &str = "json";

/// Go template Docker uses for JSON output.
const DOCKER_JSON_TEMPLATE: &str = "{{json .}}";

/// The read queries shared by every connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Query {
    Machines,
    SystemInfo,
    SystemConnections,
}

impl Query {
    const fn label(self) -> &'static str {
        match self {
            Self::Machines => "machines list",
            Self::SystemInfo => "system info",
            Self::SystemConnections => "system connections list",
        }
    }

    const fn is_list(self) -> bool {
        !matches!(self, Self::SystemInfo)
    }
}

/// A command line built for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryCommand {
    args: Vec<String>,
    structured: bool,
}

impl QueryCommand {
    fn new<const N: usize>(args: [&str; N], format: Option<&str>) -> Self {
        let mut built: Vec<String> = args.into_iter().map(String::from).collect();
        let structured = format.is_some();
        if let Some(value) = format {
            built.extend([String::from("--format"), String::from(value)]);
        }
        Self {
            args: built,
            structured,
        }
    }
}

/// Builds the command for `query`, or `None` when the engine has no
/// equivalent.
fn build_command(
    engine: ContainerEngine,
    version: SemVerTriple,
    query: Query,
    format: &str,
) -> Option<QueryCommand> {
    match engine {
        ContainerEngine::Podman => Some(match query {
            Query::Machines => QueryCommand::new(["machine", "list"], Some(format)),
            Query::SystemInfo => QueryCommand::new(["system", "info"], Some(format)),
            Query::SystemConnections => QueryCommand::new(
                ["system", "connection", "list"],
                version.supports_json_connections().then_some(format),
            ),
        }),
        ContainerEngine::Docker => {
            let template = if format == DEFAULT_FORMAT {
                DOCKER_JSON_TEMPLATE
            } else {
                format
            };
            match query {
                Query::Machines => None,
                Query::SystemInfo => Some(QueryCommand::new(["system", "info"], Some(template))),
                Query::SystemConnections => {
                    Some(QueryCommand::new(["context", "ls"], Some(template)))
                }
            }
        }
    }
}

/// Decodes structured query output.
///
/// List queries also accept one JSON document per line, which is what Go
/// templates such as `{{json .}}` print for each item.
fn decode_output(query: Query, command: &str, stdout: &str) -> Result<Value, ConnectorError> {
    let whole_error = match serde_json::from_str::<Value>(stdout) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };
    if query.is_list() {
        let lines: Result<Vec<Value>, _> = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(serde_json::from_str::<Value>)
            .collect();
        if let Ok(items) = lines {
            return Ok(Value::Array(items));
        }
    }
    Err(ConnectorError::DecodeFailed {
        command: String::from(command),
        message: whole_error.to_string(),
    })
}

fn into_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            warn!(target: "podbridge::client", kind = json_kind(&other), "system info is not an object");
            Map::new()
        }
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// API lifecycle configuration of a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleOptions {
    /// Readiness polling budget for `start_api`.
    pub retry: RetryPolicy,
    /// Starter replacing the connector's default.
    pub starter: Option<RunnerStarterOptions>,
    /// Stopper replacing the connector's default.
    pub stopper: Option<RunnerStopperOptions>,
}

/// Collaborators an [`EngineClient`] delegates to.
pub struct ClientParts {
    /// Resolves the connector's effective settings.
    pub resolver: SettingsResolver,
    /// Checks the connector's prerequisites.
    pub checker: AvailabilityChecker,
    /// Runs engine commands.
    pub executor: Arc<dyn CommandExecutor>,
    /// Pings the engine API.
    pub api_probe: Arc<dyn ApiProbe>,
    /// Owns the API service lifecycle.
    pub runner: Arc<Runner>,
}

/// Client for one configured connector.
pub struct EngineClient {
    connector: Connector,
    resolver: SettingsResolver,
    checker: AvailabilityChecker,
    executor: Arc<dyn CommandExecutor>,
    api_probe: Arc<dyn ApiProbe>,
    runner: Arc<Runner>,
    lifecycle: LifecycleOptions,
}

impl EngineClient {
    /// Creates a client from explicit collaborators.
    #[must_use]
    pub fn new(connector: Connector, parts: ClientParts) -> Self {
        let ClientParts {
            resolver,
            checker,
            executor,
            api_probe,
            runner,
        } = parts;
        Self {
            connector,
            resolver,
            checker,
            executor,
            api_probe,
            runner,
            lifecycle: LifecycleOptions::default(),
        }
    }

    /// Creates a client that runs real processes on this host.
    #[must_use]
    pub fn for_host(
        connector: Connector,
        store: Arc<dyn SettingsStore>,
        paths: HostPaths,
        minimum_version: Option<SemVerTriple>,
        notifier: Arc<dyn LifecycleNotifier>,
    ) -> Self {
        let executor: Arc<dyn CommandExecutor> = Arc::new(ProcessExecutor);
        let probe: Arc<dyn HostProbe> = Arc::new(CommandHostProbe::new(Arc::clone(&executor)));
        let runner = Runner::new(Arc::clone(&executor), Arc::new(ProcessSpawner), notifier);
        Self::new(
            connector,
            ClientParts {
                resolver: SettingsResolver::new(store, Arc::clone(&probe), paths),
                checker: AvailabilityChecker::new(probe, minimum_version),
                executor,
                api_probe: Arc::new(BollardApiProbe),
                runner: Arc::new(runner),
            },
        )
    }

    /// Replaces the lifecycle configuration.
    #[must_use]
    pub fn with_lifecycle(mut self, lifecycle: LifecycleOptions) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// The connector this client talks to.
    #[must_use]
    pub const fn connector(&self) -> &Connector {
        &self.connector
    }

    /// The runner owning this client's API service.
    #[must_use]
    pub const fn runner(&self) -> &Arc<Runner> {
        &self.runner
    }

    /// Resolves the connector's effective settings.
    pub async fn get_current_settings(&self) -> EngineConnectorSettings {
        self.resolver.get_current_settings(&self.connector).await
    }

    /// Checks the connector's prerequisites.
    pub async fn check_availability(&self) -> Availability {
        self.checked_settings().await.1
    }

    /// Pings the connector's engine API.
    pub async fn is_api_running(&self) -> ApiStatus {
        let settings = self.resolver.resolve_without_version(&self.connector).await;
        self.api_probe.ping(&settings.api).await
    }

    /// Resolves settings and checks them, detecting the engine version only
    /// after the program and instance prerequisites hold.
    async fn checked_settings(&self) -> (EngineConnectorSettings, Availability) {
        let unprobed = self.resolver.resolve_without_version(&self.connector).await;
        let prerequisites = self.checker.check_prerequisites(&unprobed).await;
        if !prerequisites.available {
            return (unprobed, prerequisites);
        }
        let settings = self.resolver.detect_version(unprobed).await;
        let availability = self.checker.check_minimum_version(&settings);
        (settings, availability)
    }

    /// Lists virtual machines. Empty when unavailable or undecodable.
    pub async fn get_machines(&self, format: Option<&str>) -> Vec<Value> {
        self.query_or_empty(Query::Machines, format)
            .await
            .map_or_else(Vec::new, into_list)
    }

    /// Reads engine system information. Empty when unavailable or
    /// undecodable.
    pub async fn get_system_info(&self, format: Option<&str>) -> Map<String, Value> {
        self.query_or_empty(Query::SystemInfo, format)
            .await
            .map_or_else(Map::new, into_object)
    }

    /// Lists engine connections. Empty when unavailable, undecodable or when
    /// the engine version cannot emit structured output.
    pub async fn get_system_connections(&self, format: Option<&str>) -> Vec<Value> {
        self.query_or_empty(Query::SystemConnections, format)
            .await
            .map_or_else(Vec::new, into_list)
    }

    async fn query_or_empty(&self, query: Query, format: Option<&str>) -> Option<Value> {
        match self.run_query(query, format).await {
            Ok(value) => value,
            Err(err @ ConnectorError::Unavailable { .. }) => {
                warn!(target: "podbridge::client", query = query.label(), error = %err, "availability notice");
                None
            }
            Err(err) => {
                error!(target: "podbridge::client", connector = %self.connector.id, query = query.label(), error = %err, "query failed");
                None
            }
        }
    }

    async fn run_query(
        &self,
        query: Query,
        format: Option<&str>,
    ) -> Result<Option<Value>, ConnectorError> {
        let (settings, availability) = self.checked_settings().await;
        if !availability.available {
            return Err(ConnectorError::Unavailable {
                connector: settings.id,
                reason: availability.reason.unwrap_or_default(),
            });
        }

        let Some(command) = build_command(
            settings.engine.engine(),
            settings.program.version,
            query,
            format.unwrap_or(DEFAULT_FORMAT),
        ) else {
            debug!(target: "podbridge::client", query = query.label(), engine = ?settings.engine, "query not supported by engine");
            return Ok(None);
        };

        let options = ExecOptions::wrapped(settings.wrapper());
        let result = self
            .executor
            .execute(&settings.program.path, &command.args, &options)
            .await;
        let command_line = format!("{} {}", settings.program.path, command.args.join(" "));
        if !result.success {
            return Err(ConnectorError::ExecutionFailed {
                program: command_line,
                code: result.code,
                stderr: result.stderr,
            });
        }
        if !command.structured {
            warn!(
                target: "podbridge::client",
                error = %ConnectorError::UnsupportedFormat { command: command_line },
                version = %settings.program.version,
                "leaving output unparsed"
            );
            return Ok(None);
        }
        if result.stdout.trim().is_empty() {
            return Ok(None);
        }
        decode_output(query, &command_line, &result.stdout).map(Some)
    }

    /// Starter for this connector: the configured one, else the variant
    /// default.
    #[must_use]
    pub fn starter_options(&self, settings: &EngineConnectorSettings) -> RunnerStarterOptions {
        self.lifecycle
            .starter
            .clone()
            .or_else(|| default_starter(settings))
            .unwrap_or_default()
    }

    /// Stopper for this connector: the configured one, else the variant
    /// default.
    #[must_use]
    pub fn stopper_options(&self, settings: &EngineConnectorSettings) -> Option<RunnerStopperOptions> {
        self.lifecycle
            .stopper
            .clone()
            .or_else(|| default_stopper(settings))
    }

    /// Starts the engine API service and waits for it to answer pings.
    pub async fn start_api(&self) -> bool {
        let settings = self.resolver.resolve_without_version(&self.connector).await;
        let starter = self.starter_options(&settings);
        let opts = self.service_opts(&settings);
        self.runner.start_api(&opts, &starter).await
    }

    /// Stops the engine API service started by [`Self::start_api`].
    pub async fn stop_api(&self) -> bool {
        let settings = self.resolver.resolve_without_version(&self.connector).await;
        let stopper = self.stopper_options(&settings);
        self.runner.stop_api(Some(&settings), stopper.as_ref()).await
    }

    fn service_opts(&self, settings: &EngineConnectorSettings) -> ServiceOpts {
        let probe = Arc::clone(&self.api_probe);
        let api = settings.api.clone();
        let connector = self.connector.id.clone();
        ServiceOpts::new(self.lifecycle.retry, move || {
            let pinger = Arc::clone(&probe);
            let endpoint = api.clone();
            Box::pin(async move { pinger.ping(&endpoint).await.success })
        })
        .with_on_status_check(move |attempt, max| {
            debug!(target: "podbridge::client", %connector, attempt, max, "waiting for engine API");
        })
    }
}
