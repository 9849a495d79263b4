//! In-memory host standing in for engine binaries and virtualization tools.

use std::sync::{Arc, PoisonError};

use camino::Utf8PathBuf;
use podbridge::config::MemorySettingsStore;
use podbridge::engine::api_probe::ApiStatusFuture;
use podbridge::engine::executor::{ExecuteFuture, ServiceSpawner, SpawnFuture};
use podbridge::engine::settings::{
    ApiSettings, HostOs, HostProbe, InstanceInfo, InstancesFuture, VersionFuture,
};
use podbridge::engine::{
    ApiProbe, ApiStatus, AvailabilityChecker, ClientParts, CommandExecutor, CommandResult,
    Connector, EngineClient, EngineKind, ExecOptions, HostPaths, Runner, SemVerTriple,
    SettingsResolver, TracingNotifier, Virtualization,
};
use podbridge::error::ConnectorError;

use super::state::Invocations;

/// A Linux host where every program lives under `/usr/bin` (when `found`),
/// a running `podman` instance exists, and every engine command answers
/// with `output`.
pub(crate) struct FakeHost {
    pub(crate) found: bool,
    pub(crate) version: SemVerTriple,
    pub(crate) output: CommandResult,
    pub(crate) invocations: Invocations,
}

impl HostProbe for FakeHost {
    fn resolve_program(&self, program: &str) -> Option<String> {
        self.found.then(|| format!("/usr/bin/{program}"))
    }

    fn list_instances(&self, _virtualization: Virtualization, _controller: &str) -> InstancesFuture<'_> {
        Box::pin(async { Ok(vec![InstanceInfo::new("podman", true)]) })
    }

    fn program_version(&self, _program: &str, _options: &ExecOptions) -> VersionFuture<'_> {
        let version = self.version;
        Box::pin(async move { Some(version) })
    }
}

impl CommandExecutor for FakeHost {
    fn execute(&self, program: &str, args: &[String], options: &ExecOptions) -> ExecuteFuture<'_> {
        let (launched, launched_args) = options.wrapper.as_ref().map_or_else(
            || (String::from(program), args.to_vec()),
            |wrapper| wrapper.invocation(program, args),
        );
        let line = std::iter::once(launched)
            .chain(launched_args)
            .collect::<Vec<_>>()
            .join(" ");
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
        let answer = self.output.clone();
        Box::pin(async move { answer })
    }
}

/// An API that never answers.
struct SilentApi;

impl ApiProbe for SilentApi {
    fn ping(&self, _api: &ApiSettings) -> ApiStatusFuture<'_> {
        Box::pin(async { ApiStatus::failed("no engine in behavioural tests") })
    }
}

/// A spawner that refuses to launch anything.
struct NoSpawn;

impl ServiceSpawner for NoSpawn {
    fn spawn(&self, program: &str, _args: &[String]) -> SpawnFuture<'_> {
        let message = format!("{program} is not launched in behavioural tests");
        Box::pin(async move { Err(ConnectorError::ProcessError { message }) })
    }
}

/// Builds a client for `kind` backed entirely by `host`.
pub(crate) fn client_for(kind: EngineKind, host: FakeHost) -> EngineClient {
    let shared = Arc::new(host);
    let probe: Arc<dyn HostProbe> = Arc::<FakeHost>::clone(&shared);
    let executor: Arc<dyn CommandExecutor> = shared;
    let paths = HostPaths {
        os: HostOs::Linux,
        home: Some(Utf8PathBuf::from("/home/user")),
        xdg_runtime_dir: Some(Utf8PathBuf::from("/run/user/1000")),
    };
    let runner = Runner::new(
        Arc::clone(&executor),
        Arc::new(NoSpawn),
        Arc::new(TracingNotifier),
    );
    EngineClient::new(
        Connector::builtin(kind),
        ClientParts {
            resolver: SettingsResolver::new(
                Arc::new(MemorySettingsStore::new()),
                Arc::clone(&probe),
                paths,
            ),
            checker: AvailabilityChecker::new(probe, None),
            executor,
            api_probe: Arc::new(SilentApi),
            runner: Arc::new(runner),
        },
    )
}
