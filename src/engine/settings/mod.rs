//! Connector settings resolution.
//!
//! [`SettingsResolver`] turns a [`Connector`] into a concrete
//! [`EngineConnectorSettings`] snapshot by overlaying the persisted
//! per-connector overrides onto the variant's default template and probing
//! the host for whatever is left: program location and version, and the
//! controller scope of virtualized connectors.
//!
//! Resolution never fails. When discovery goes wrong the best-known default
//! is used and the availability checker reports the problem downstream.

mod probe;
pub(crate) mod variant;

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use self::probe::{
    CommandHostProbe, HostProbe, InstanceInfo, InstancesFuture, VersionFuture,
};
use super::executor::{ExecOptions, WrapperCommand};
use super::kind::EngineKind;
use super::version::SemVerTriple;
use crate::config::{SettingsStore, get_engine_user_settings};
use crate::error::ConfigError;

/// The engine program driven by a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramSettings {
    /// Program name, such as `podman`.
    pub name: String,
    /// Resolved path of the program. Inside the VM for virtualized connectors.
    pub path: String,
    /// Detected version, `0.0.0` when unknown.
    pub version: SemVerTriple,
}

/// The virtualization controller of a virtualized connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerSettings {
    /// Instance or distribution targeted by the wrapper.
    pub scope: Option<String>,
    /// Resolved path of the controller program (`limactl`, `wsl.exe`).
    pub path: String,
}

/// How clients reach the engine API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiSettings {
    /// Base URL for HTTP requests against the API.
    #[serde(rename = "baseURL")]
    pub base_url: String,
    /// Socket path or named pipe. Empty when it could not be derived.
    #[serde(rename = "connectionString")]
    pub connection_string: String,
}

/// Immutable snapshot of a connector's resolved settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineConnectorSettings {
    /// Connector identifier.
    pub id: String,
    /// Connector variant.
    pub engine: EngineKind,
    /// Engine program.
    pub program: ProgramSettings,
    /// Virtualization controller, `None` for native connectors.
    pub controller: Option<ControllerSettings>,
    /// API endpoint.
    pub api: ApiSettings,
}

impl EngineConnectorSettings {
    /// Returns the wrapper that routes commands into this connector's backend.
    #[must_use]
    pub fn wrapper(&self) -> Option<WrapperCommand> {
        variant::wrapper_for(self.engine, self.controller.as_ref())
    }

    /// The program that must resolve on the host: the controller for
    /// virtualized connectors, the engine program otherwise.
    #[must_use]
    pub fn required_program(&self) -> &str {
        self.controller
            .as_ref()
            .map_or(self.program.path.as_str(), |controller| controller.path.as_str())
    }

    /// Returns the controller scope, when one is set.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.controller
            .as_ref()
            .and_then(|controller| controller.scope.as_deref())
    }
}

/// Persisted program overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProgramOverrides {
    /// Program name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Program path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Program version, skipping detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<SemVerTriple>,
}

/// Persisted controller overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerOverrides {
    /// Instance or distribution name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Controller program path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Persisted API overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiOverrides {
    /// API base URL.
    #[serde(
        rename = "baseURL",
        alias = "baseUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub base_url: Option<String>,
    /// API socket path or named pipe. May contain `~`, `$HOME` or
    /// `$XDG_RUNTIME_DIR`.
    #[serde(rename = "connectionString", skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

/// Per-connector user overrides, stored under the connector id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineUserSettings {
    /// Variant of a custom connector id. Ignored for the built-in keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineKind>,
    /// Program overrides.
    pub program: ProgramOverrides,
    /// Controller overrides.
    pub controller: ControllerOverrides,
    /// API overrides.
    pub api: ApiOverrides,
}

/// A configured connector: an id and the variant it drives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Connector {
    /// Connector identifier; the variant key for built-in connectors.
    pub id: String,
    /// Connector variant.
    pub engine: EngineKind,
}

impl Connector {
    /// The built-in connector of a variant.
    #[must_use]
    pub fn builtin(engine: EngineKind) -> Self {
        Self {
            id: String::from(engine.key()),
            engine,
        }
    }

    /// Resolves a connector id: a variant key, or a custom id whose stored
    /// overrides name the variant.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when the id is neither.
    pub fn from_id(id: &str, store: &dyn SettingsStore) -> Result<Self, ConfigError> {
        if let Some(engine) = EngineKind::from_key(id) {
            return Ok(Self::builtin(engine));
        }
        get_engine_user_settings(store, id)
            .engine
            .map(|engine| Self {
                id: String::from(id),
                engine,
            })
            .ok_or_else(|| ConfigError::InvalidValue {
                field: String::from("connector"),
                reason: format!("'{id}' is not a known engine and has no stored engine override"),
            })
    }
}

/// Operating system family, which decides native connection strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    /// Linux and other Unix hosts.
    Linux,
    /// macOS hosts.
    MacOs,
    /// Windows hosts.
    Windows,
}

impl HostOs {
    /// The family of the running host.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }
}

/// Host directories used to derive and expand connection strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    /// Operating system family.
    pub os: HostOs,
    /// User home directory.
    pub home: Option<Utf8PathBuf>,
    /// `XDG_RUNTIME_DIR`, when set.
    pub xdg_runtime_dir: Option<Utf8PathBuf>,
}

impl HostPaths {
    /// Reads `HOME` (or `USERPROFILE`) and `XDG_RUNTIME_DIR` from `env`,
    /// falling back to the platform home directory.
    #[must_use]
    pub fn from_env(env: &impl mockable::Env) -> Self {
        let non_empty = |name: &str| env.string(name).filter(|value| !value.is_empty());
        let home = non_empty("HOME")
            .or_else(|| non_empty("USERPROFILE"))
            .map(Utf8PathBuf::from)
            .or_else(|| dirs::home_dir().and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok()));
        Self {
            os: HostOs::current(),
            home,
            xdg_runtime_dir: non_empty("XDG_RUNTIME_DIR").map(Utf8PathBuf::from),
        }
    }

    /// Expands `~`, `$HOME`, `${HOME}`, `$XDG_RUNTIME_DIR` and
    /// `${XDG_RUNTIME_DIR}`.
    ///
    /// Returns `None` when a placeholder is present but its value is unknown.
    #[must_use]
    pub fn expand(&self, text: &str) -> Option<String> {
        let home = self.home.as_deref().map(Utf8Path::as_str);
        let runtime = self.xdg_runtime_dir.as_deref().map(Utf8Path::as_str);
        let placeholders = [
            ("${HOME}", home),
            ("$HOME", home),
            ("${XDG_RUNTIME_DIR}", runtime),
            ("$XDG_RUNTIME_DIR", runtime),
        ];

        let mut expanded = match text.strip_prefix('~') {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("{}{rest}", home?),
            _ => String::from(text),
        };
        for (token, value) in placeholders {
            if expanded.contains(token) {
                expanded = expanded.replace(token, value?);
            }
        }
        Some(expanded)
    }
}

/// Computes [`EngineConnectorSettings`] snapshots for connectors.
#[derive(Clone)]
pub struct SettingsResolver {
    store: Arc<dyn SettingsStore>,
    probe: Arc<dyn HostProbe>,
    paths: HostPaths,
}

impl SettingsResolver {
    /// Creates a resolver over a settings store, a host probe and host paths.
    #[must_use]
    pub fn new(store: Arc<dyn SettingsStore>, probe: Arc<dyn HostProbe>, paths: HostPaths) -> Self {
        Self {
            store,
            probe,
            paths,
        }
    }

    /// The host probe used for discovery.
    #[must_use]
    pub fn probe(&self) -> &Arc<dyn HostProbe> {
        &self.probe
    }

    /// The host paths used for derivation.
    #[must_use]
    pub const fn paths(&self) -> &HostPaths {
        &self.paths
    }

    /// Produces a fresh settings snapshot for `connector`.
    ///
    /// Persisted overrides take precedence; everything else comes from the
    /// variant template and host discovery. The engine version is only
    /// detected when the required program resolves. Persisted state is never
    /// written.
    pub async fn get_current_settings(&self, connector: &Connector) -> EngineConnectorSettings {
        let settings = self.resolve_without_version(connector).await;
        if self.probe.resolve_program(settings.required_program()).is_none() {
            return settings;
        }
        self.detect_version(settings).await
    }

    /// Produces a settings snapshot without running the engine program.
    ///
    /// The version is the configured one, or [`SemVerTriple::UNKNOWN`].
    pub async fn resolve_without_version(&self, connector: &Connector) -> EngineConnectorSettings {
        let overrides = get_engine_user_settings(self.store.as_ref(), &connector.id);
        let kind = connector.engine;
        let program_name = overrides
            .program
            .name
            .clone()
            .unwrap_or_else(|| String::from(kind.engine().program_name()));

        let controller = self.resolve_controller(kind, &overrides.controller).await;
        let program_path = self.resolve_program_path(kind, &program_name, &overrides.program);

        let scope = controller
            .as_ref()
            .and_then(|settings| settings.scope.as_deref());
        let connection_string = self.resolve_connection_string(
            kind,
            &program_name,
            scope,
            overrides.api.connection_string.as_deref(),
        );

        let settings = EngineConnectorSettings {
            id: connector.id.clone(),
            engine: kind,
            program: ProgramSettings {
                name: program_name,
                path: program_path,
                version: overrides.program.version.unwrap_or(SemVerTriple::UNKNOWN),
            },
            controller,
            api: ApiSettings {
                base_url: overrides
                    .api
                    .base_url
                    .unwrap_or_else(|| String::from(kind.engine().api_base_url())),
                connection_string,
            },
        };
        debug!(target: "podbridge::settings", connector = %settings.id, ?settings, "resolved connector settings");
        settings
    }

    /// Runs the engine program, through the connector's wrapper, to fill in
    /// an unknown version. A known version is kept as is.
    pub async fn detect_version(
        &self,
        mut settings: EngineConnectorSettings,
    ) -> EngineConnectorSettings {
        if !settings.program.version.is_unknown() {
            return settings;
        }
        let options = ExecOptions::wrapped(settings.wrapper());
        if let Some(version) = self
            .probe
            .program_version(&settings.program.path, &options)
            .await
        {
            debug!(target: "podbridge::settings", connector = %settings.id, %version, "detected engine version");
            settings.program.version = version;
        }
        settings
    }

    fn resolve_program_path(
        &self,
        kind: EngineKind,
        program_name: &str,
        overrides: &ProgramOverrides,
    ) -> String {
        if let Some(path) = overrides.path.as_deref() {
            return self.paths.expand(path).unwrap_or_else(|| String::from(path));
        }
        if let Some(path) = variant::default_program_path(kind) {
            return String::from(path);
        }
        self.probe
            .resolve_program(program_name)
            .unwrap_or_else(|| String::from(program_name))
    }

    async fn resolve_controller(
        &self,
        kind: EngineKind,
        overrides: &ControllerOverrides,
    ) -> Option<ControllerSettings> {
        let program = variant::controller_program(kind.virtualization())?;
        let path = overrides.path.as_deref().map_or_else(
            || {
                self.probe
                    .resolve_program(program)
                    .unwrap_or_else(|| String::from(program))
            },
            |path| self.paths.expand(path).unwrap_or_else(|| String::from(path)),
        );
        let scope = self
            .discover_scope(kind, &path, overrides.scope.as_deref())
            .await;
        Some(ControllerSettings { scope, path })
    }

    async fn discover_scope(
        &self,
        kind: EngineKind,
        controller: &str,
        configured: Option<&str>,
    ) -> Option<String> {
        if let Some(scope) = configured {
            return Some(String::from(scope));
        }
        let preferred = variant::default_scope(kind);
        if self.probe.resolve_program(controller).is_none() {
            debug!(target: "podbridge::settings", engine = %kind, controller, "controller not found, using default scope");
            return preferred.map(String::from);
        }
        let instances = match self
            .probe
            .list_instances(kind.virtualization(), controller)
            .await
        {
            Ok(instances) => instances,
            Err(error) => {
                warn!(target: "podbridge::settings", engine = %kind, %error, "scope discovery failed, using default scope");
                return preferred.map(String::from);
            }
        };
        pick_scope(preferred, &instances)
    }

    fn resolve_connection_string(
        &self,
        kind: EngineKind,
        program_name: &str,
        scope: Option<&str>,
        configured: Option<&str>,
    ) -> String {
        if let Some(raw) = configured {
            if let Some(expanded) = self.paths.expand(raw) {
                return expanded;
            }
            warn!(target: "podbridge::settings", engine = %kind, connection = raw, "unable to expand configured connection string");
        }
        variant::connection_string_for(kind, program_name, scope, &self.paths).unwrap_or_else(|| {
            warn!(target: "podbridge::settings", engine = %kind, "unable to derive connection string");
            String::new()
        })
    }
}

/// Chooses a controller scope from discovered instances.
///
/// The variant's default instance wins when it exists, then the first
/// running instance, then the default name itself, then any instance.
fn pick_scope(preferred: Option<&str>, instances: &[InstanceInfo]) -> Option<String> {
    preferred
        .filter(|name| instances.iter().any(|instance| instance.name == *name))
        .map(String::from)
        .or_else(|| {
            instances
                .iter()
                .find(|instance| instance.running)
                .map(|instance| instance.name.clone())
        })
        .or_else(|| preferred.map(String::from))
        .or_else(|| instances.first().map(|instance| instance.name.clone()))
}
