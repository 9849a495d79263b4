//! Command-line argument definitions for podbridge.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Command-line interface for podbridge.
#[derive(Debug, Parser)]
#[command(name = "podbridge")]
#[command(
    author,
    version,
    about = "Query and run native or virtualized Podman and Docker engines"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Connector id, such as `podman.native` or `podman.subsystem.lima`.
    #[arg(long, global = true)]
    pub connector: Option<String>,

    /// Path of the persisted user settings document.
    #[arg(long, global = true)]
    pub settings_file: Option<Utf8PathBuf>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check whether the connector's prerequisites hold.
    Availability,

    /// Print the connector's resolved settings.
    Settings,

    /// List engine virtual machines.
    Machines(FormatArgs),

    /// Print engine system information.
    Info(FormatArgs),

    /// List engine system connections.
    Connections(FormatArgs),

    /// Ping the engine API.
    ApiStatus,

    /// Start the engine API, wait for Ctrl-C, then stop it.
    ServeApi,

    /// Print the global user settings.
    UserSettings,
}

/// Output format arguments shared by the query subcommands.
#[derive(Debug, Args)]
pub struct FormatArgs {
    /// Format passed to the engine's `--format` flag.
    #[arg(long)]
    pub format: Option<String>,
}
