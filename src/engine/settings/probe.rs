//! Host discovery: program lookup, virtualization instances and versions.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use camino::Utf8PathBuf;
use serde::Deserialize;
use tracing::debug;

use crate::engine::executor::{CommandExecutor, ExecOptions};
use crate::engine::kind::Virtualization;
use crate::engine::version::SemVerTriple;
use crate::error::ConnectorError;

/// A virtualization instance (Lima VM or WSL distribution).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Instance or distribution name.
    pub name: String,
    /// Whether the instance is currently running.
    pub running: bool,
}

impl InstanceInfo {
    /// Creates an instance description.
    #[must_use]
    pub fn new(name: impl Into<String>, running: bool) -> Self {
        Self {
            name: name.into(),
            running,
        }
    }
}

/// Boxed future type returned by [`HostProbe::list_instances`].
pub type InstancesFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<InstanceInfo>, ConnectorError>> + Send + 'a>>;

/// Boxed future type returned by [`HostProbe::program_version`].
pub type VersionFuture<'a> = Pin<Box<dyn Future<Output = Option<SemVerTriple>> + Send + 'a>>;

/// Queries the host needed by settings resolution and availability checks.
pub trait HostProbe: Send + Sync {
    /// Resolves a program name or path to an existing executable path.
    fn resolve_program(&self, program: &str) -> Option<String>;

    /// Lists the instances known to a virtualization controller.
    fn list_instances(&self, virtualization: Virtualization, controller: &str)
    -> InstancesFuture<'_>;

    /// Detects the version of `program`, run with `options`.
    fn program_version(&self, program: &str, options: &ExecOptions) -> VersionFuture<'_>;
}

/// [`HostProbe`] that runs controller commands through a [`CommandExecutor`].
#[derive(Clone)]
pub struct CommandHostProbe {
    executor: Arc<dyn CommandExecutor>,
}

impl CommandHostProbe {
    /// Creates a probe running commands through `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }
}

#[derive(Deserialize)]
struct LimaInstance {
    name: String,
    #[serde(default)]
    status: String,
}

impl HostProbe for CommandHostProbe {
    fn resolve_program(&self, program: &str) -> Option<String> {
        if program.contains('/') || program.contains('\\') {
            return Path::new(program)
                .is_file()
                .then(|| String::from(program));
        }
        let found = which::which(program).ok()?;
        Utf8PathBuf::from_path_buf(found)
            .ok()
            .map(Utf8PathBuf::into_string)
    }

    fn list_instances(
        &self,
        virtualization: Virtualization,
        controller: &str,
    ) -> InstancesFuture<'_> {
        let controller_owned = String::from(controller);
        Box::pin(async move {
            match virtualization {
                Virtualization::Native => Ok(Vec::new()),
                Virtualization::Lima => self.lima_instances(&controller_owned).await,
                Virtualization::Wsl => self.wsl_distributions(&controller_owned).await,
            }
        })
    }

    fn program_version(&self, program: &str, options: &ExecOptions) -> VersionFuture<'_> {
        let program_owned = String::from(program);
        let options_owned = options.clone();
        Box::pin(async move {
            let result = self
                .executor
                .execute(&program_owned, &[String::from("--version")], &options_owned)
                .await;
            if !result.success {
                debug!(target: "podbridge::settings", program = %program_owned, code = result.code, "version probe failed");
                return None;
            }
            SemVerTriple::find_in(&result.stdout)
        })
    }
}

impl CommandHostProbe {
    async fn run_listing(&self, controller: &str, args: &[&str]) -> Result<String, ConnectorError> {
        let argv: Vec<String> = args.iter().map(|arg| String::from(*arg)).collect();
        let result = self
            .executor
            .execute(controller, &argv, &ExecOptions::default())
            .await;
        if result.success {
            Ok(result.stdout)
        } else {
            Err(ConnectorError::ExecutionFailed {
                program: String::from(controller),
                code: result.code,
                stderr: result.stderr,
            })
        }
    }

    async fn lima_instances(&self, controller: &str) -> Result<Vec<InstanceInfo>, ConnectorError> {
        let stdout = self.run_listing(controller, &["list", "--json"]).await?;
        parse_lima_instances(&stdout).map_err(|message| ConnectorError::DecodeFailed {
            command: format!("{controller} list --json"),
            message,
        })
    }

    async fn wsl_distributions(
        &self,
        controller: &str,
    ) -> Result<Vec<InstanceInfo>, ConnectorError> {
        let all = self.run_listing(controller, &["--list", "--quiet"]).await?;
        let running = self
            .run_listing(controller, &["--list", "--running", "--quiet"])
            .await
            .unwrap_or_default();
        let running_names = wsl_names(&running);
        Ok(wsl_names(&all)
            .into_iter()
            .map(|name| {
                let is_running = running_names.contains(&name);
                InstanceInfo::new(name, is_running)
            })
            .collect())
    }
}

/// Parses `limactl list --json` output: one JSON object per line.
pub(crate) fn parse_lima_instances(stdout: &str) -> Result<Vec<InstanceInfo>, String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<LimaInstance>(line)
                .map(|instance| {
                    let running = instance.status.eq_ignore_ascii_case("running");
                    InstanceInfo::new(instance.name, running)
                })
                .map_err(|error| error.to_string())
        })
        .collect()
}

/// Splits `wsl.exe --list --quiet` output into distribution names.
///
/// `wsl.exe` writes UTF-16, which shows up as interleaved NUL bytes when
/// captured as UTF-8.
pub(crate) fn wsl_names(stdout: &str) -> Vec<String> {
    stdout
        .replace(['\0', '\u{feff}'], "")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
