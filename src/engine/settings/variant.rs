//! Per-variant templates: default paths, wrappers and connection strings.
//!
//! Everything that differs between the six connector variants lives here so
//! the query template and the resolver stay variant-agnostic.

use camino::Utf8PathBuf;

use super::{ControllerSettings, EngineConnectorSettings, HostOs, HostPaths};
use crate::engine::api_probe::socket_uri;
use crate::engine::executor::WrapperCommand;
use crate::engine::kind::{ContainerEngine, EngineKind, Virtualization};
use crate::engine::runner::{RunnerStarterOptions, RunnerStopperOptions};

/// Socket the WSL Podman service listens on inside the distribution.
const WSL_PODMAN_SERVICE_URI: &str = "unix:///run/podman/podman.sock";

/// Program path inside the VM or distribution for virtualized variants.
///
/// Native variants resolve the program from `PATH` instead.
pub(crate) const fn default_program_path(kind: EngineKind) -> Option<&'static str> {
    if !kind.is_virtualized() {
        return None;
    }
    match kind.engine() {
        ContainerEngine::Podman => Some("/usr/bin/podman"),
        ContainerEngine::Docker => Some("/usr/bin/docker"),
    }
}

/// The controller program of a virtualization backend.
pub(crate) const fn controller_program(virtualization: Virtualization) -> Option<&'static str> {
    match virtualization {
        Virtualization::Native => None,
        Virtualization::Lima => Some("limactl"),
        Virtualization::Wsl => Some("wsl.exe"),
    }
}

/// Preferred instance name; WSL distributions are always discovered.
pub(crate) const fn default_scope(kind: EngineKind) -> Option<&'static str> {
    match kind.virtualization() {
        Virtualization::Lima => Some(kind.engine().program_name()),
        Virtualization::Native | Virtualization::Wsl => None,
    }
}

/// Builds the wrapper routing commands into the connector's backend.
pub(crate) fn wrapper_for(
    kind: EngineKind,
    controller: Option<&ControllerSettings>,
) -> Option<WrapperCommand> {
    let settings = controller?;
    match kind.virtualization() {
        Virtualization::Native => None,
        Virtualization::Lima => {
            let scope = settings.scope.as_deref()?;
            Some(WrapperCommand::new(settings.path.as_str(), ["shell", scope]))
        }
        Virtualization::Wsl => Some(settings.scope.as_deref().map_or_else(
            || WrapperCommand::new(settings.path.as_str(), ["--exec"]),
            |scope| {
                WrapperCommand::new(
                    settings.path.as_str(),
                    ["--distribution", scope, "--exec"],
                )
            },
        )),
    }
}

/// Derives the API connection string of a variant on this host.
///
/// Returns `None` when a required scope or directory is unknown.
pub(crate) fn connection_string_for(
    kind: EngineKind,
    program_name: &str,
    scope: Option<&str>,
    paths: &HostPaths,
) -> Option<String> {
    match (kind.virtualization(), kind.engine()) {
        (Virtualization::Lima, _) => {
            let home = paths.home.as_ref()?;
            let socket: Utf8PathBuf = home
                .join(".lima")
                .join(scope?)
                .join("sock")
                .join(format!("{program_name}.sock"));
            Some(socket.into_string())
        }
        (Virtualization::Wsl, _) => Some(format!("//./pipe/{program_name}-wsl-{}", scope?)),
        (Virtualization::Native, ContainerEngine::Podman) => native_podman_socket(paths),
        (Virtualization::Native, ContainerEngine::Docker) => Some(String::from(match paths.os {
            HostOs::Windows => "//./pipe/docker_engine",
            HostOs::Linux | HostOs::MacOs => "/var/run/docker.sock",
        })),
    }
}

fn native_podman_socket(paths: &HostPaths) -> Option<String> {
    match paths.os {
        HostOs::Linux => Some(paths.xdg_runtime_dir.as_ref().map_or_else(
            || String::from("/run/podman/podman.sock"),
            |runtime| runtime.join("podman").join("podman.sock").into_string(),
        )),
        HostOs::MacOs => paths.home.as_ref().map(|home| {
            home.join(".local/share/containers/podman/machine/podman.sock")
                .into_string()
        }),
        HostOs::Windows => Some(String::from("//./pipe/podman-machine-default")),
    }
}

/// Default command starting the API service of a connector.
///
/// Docker variants rely on an externally managed daemon and have none, and
/// native Podman has none until its socket path is known.
pub(crate) fn default_starter(settings: &EngineConnectorSettings) -> Option<RunnerStarterOptions> {
    let controller = settings.controller.as_ref();
    match settings.engine {
        EngineKind::NativePodman if settings.api.connection_string.is_empty() => None,
        EngineKind::NativePodman => Some(RunnerStarterOptions::new(
            settings.program.path.as_str(),
            [
                String::from("system"),
                String::from("service"),
                String::from("--time=0"),
                socket_uri(&settings.api.connection_string),
            ],
        )),
        EngineKind::PodmanVirtualizedLima | EngineKind::DockerVirtualizedLima => {
            let controller_settings = controller?;
            let scope = controller_settings.scope.clone()?;
            Some(RunnerStarterOptions::new(
                controller_settings.path.as_str(),
                [String::from("start"), scope],
            ))
        }
        EngineKind::PodmanVirtualizedWsl => {
            let controller_settings = controller?;
            let scope = controller_settings.scope.clone()?;
            Some(RunnerStarterOptions::new(
                controller_settings.path.as_str(),
                [
                    String::from("--distribution"),
                    scope,
                    String::from("--exec"),
                    settings.program.path.clone(),
                    String::from("system"),
                    String::from("service"),
                    String::from("--time=0"),
                    String::from(WSL_PODMAN_SERVICE_URI),
                ],
            ))
        }
        EngineKind::NativeDocker | EngineKind::DockerVirtualizedWsl => None,
    }
}

/// Default command stopping the API service of a connector.
///
/// Only Lima has one; other variants stop by terminating the spawned service.
pub(crate) fn default_stopper(settings: &EngineConnectorSettings) -> Option<RunnerStopperOptions> {
    if settings.engine.virtualization() != Virtualization::Lima {
        return None;
    }
    let controller = settings.controller.as_ref()?;
    let scope = controller.scope.clone()?;
    Some(RunnerStopperOptions::new(
        controller.path.as_str(),
        [String::from("stop"), scope],
    ))
}
