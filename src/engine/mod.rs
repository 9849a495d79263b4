//! Container engine connectors.
//!
//! A connector is a container engine (Podman or Docker) reached either
//! natively or through a virtualization backend (a Lima VM or a WSL
//! distribution). For each connector this module resolves effective settings,
//! checks availability, runs read-only engine queries and supervises the
//! engine's API service:
//!
//! - [`settings`] merges variant defaults, persisted overrides and host
//!   discovery into [`EngineConnectorSettings`];
//! - [`availability`] checks binaries, instances and versions;
//! - [`client`] runs the shared query template;
//! - [`runner`] starts and stops the API service;
//! - [`executor`] runs programs, optionally through a wrapper command.

pub mod api_probe;
pub mod availability;
pub mod client;
pub mod executor;
pub mod kind;
pub mod notify;
pub mod runner;
pub mod settings;
pub mod version;

pub use api_probe::{ApiProbe, ApiStatus, BollardApiProbe};
pub use availability::{Availability, AvailabilityChecker};
pub use client::{ClientParts, EngineClient, LifecycleOptions};
pub use executor::{
    CommandExecutor, CommandResult, ExecOptions, ProcessExecutor, ProcessSpawner, WrapperCommand,
};
pub use kind::{ContainerEngine, EngineKind, Virtualization};
pub use notify::{BroadcastNotifier, LifecycleEvent, LifecycleNotifier, TracingNotifier};
pub use runner::{
    RetryPolicy, Runner, RunnerStarterOptions, RunnerState, RunnerStopperOptions, ServiceOpts,
};
pub use settings::{Connector, EngineConnectorSettings, HostPaths, SettingsResolver};
pub use version::SemVerTriple;
