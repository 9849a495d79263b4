//! Connector variants: which engine runs, and how it is reached.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The container engine program driven by a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerEngine {
    /// The Podman engine.
    Podman,
    /// The Docker engine.
    Docker,
}

impl ContainerEngine {
    /// Returns the default program name of the engine CLI.
    #[must_use]
    pub const fn program_name(self) -> &'static str {
        match self {
            Self::Podman => "podman",
            Self::Docker => "docker",
        }
    }

    /// Returns the base URL used by HTTP clients of the engine API.
    #[must_use]
    pub const fn api_base_url(self) -> &'static str {
        match self {
            Self::Podman => "http://d/v3.0.0/libpod",
            Self::Docker => "http://localhost",
        }
    }
}

/// How the engine CLI is reached from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Virtualization {
    /// The engine runs directly on the host.
    Native,
    /// The engine runs inside a WSL distribution.
    Wsl,
    /// The engine runs inside a Lima virtual machine.
    Lima,
}

/// A `{engine × virtualization}` pair identifying a connector variant.
///
/// Serialized as its stable key, for example `podman.subsystem.lima`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    /// Podman installed on the host.
    #[serde(rename = "podman.native")]
    NativePodman,
    /// Docker installed on the host.
    #[serde(rename = "docker.native")]
    NativeDocker,
    /// Podman inside a WSL distribution.
    #[serde(rename = "podman.subsystem.wsl")]
    PodmanVirtualizedWsl,
    /// Docker inside a WSL distribution.
    #[serde(rename = "docker.subsystem.wsl")]
    DockerVirtualizedWsl,
    /// Podman inside a Lima instance.
    #[serde(rename = "podman.subsystem.lima")]
    PodmanVirtualizedLima,
    /// Docker inside a Lima instance.
    #[serde(rename = "docker.subsystem.lima")]
    DockerVirtualizedLima,
}

impl EngineKind {
    /// Every connector variant, native first.
    pub const ALL: [Self; 6] = [
        Self::NativePodman,
        Self::NativeDocker,
        Self::PodmanVirtualizedWsl,
        Self::DockerVirtualizedWsl,
        Self::PodmanVirtualizedLima,
        Self::DockerVirtualizedLima,
    ];

    /// Returns the engine driven by this variant.
    #[must_use]
    pub const fn engine(self) -> ContainerEngine {
        match self {
            Self::NativePodman | Self::PodmanVirtualizedWsl | Self::PodmanVirtualizedLima => {
                ContainerEngine::Podman
            }
            Self::NativeDocker | Self::DockerVirtualizedWsl | Self::DockerVirtualizedLima => {
                ContainerEngine::Docker
            }
        }
    }

    /// Returns how this variant reaches the engine.
    #[must_use]
    pub const fn virtualization(self) -> Virtualization {
        match self {
            Self::NativePodman | Self::NativeDocker => Virtualization::Native,
            Self::PodmanVirtualizedWsl | Self::DockerVirtualizedWsl => Virtualization::Wsl,
            Self::PodmanVirtualizedLima | Self::DockerVirtualizedLima => Virtualization::Lima,
        }
    }

    /// Returns true when commands must be routed through a wrapper.
    #[must_use]
    pub const fn is_virtualized(self) -> bool {
        !matches!(self.virtualization(), Virtualization::Native)
    }

    /// Returns the stable key of this variant.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::NativePodman => "podman.native",
            Self::NativeDocker => "docker.native",
            Self::PodmanVirtualizedWsl => "podman.subsystem.wsl",
            Self::DockerVirtualizedWsl => "docker.subsystem.wsl",
            Self::PodmanVirtualizedLima => "podman.subsystem.lima",
            Self::DockerVirtualizedLima => "docker.subsystem.lima",
        }
    }

    /// Looks up a variant by its stable key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for EngineKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_key(value.trim()).ok_or_else(|| ConfigError::InvalidValue {
            field: String::from("engine"),
            reason: format!("unknown engine '{value}'"),
        })
    }
}
