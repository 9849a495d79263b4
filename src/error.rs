//! Semantic error types for the podbridge library.
//!
//! Errors are modelled as `thiserror` enums for conditions the caller might
//! inspect or retry. Inside the engine core these errors travel as ordinary
//! `Result` values; the public `EngineClient` and `Runner` methods convert them
//! into empty results or `false` after logging, so nothing in this hierarchy
//! escapes a query or lifecycle call. Opaque `eyre::Report` values are reserved
//! for the binary boundary.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during configuration loading, validation and
/// persisted settings access.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The persisted user settings document could not be read or written.
    #[error("user settings store error at '{path}': {message}")]
    StoreIo {
        /// The settings document path.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    ///
    /// This wraps errors from the layered configuration system, including:
    /// - Configuration file parsing errors
    /// - Environment variable parsing errors
    /// - CLI argument parsing errors
    /// - Missing required fields after layer merging
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors raised while talking to a container engine connector.
///
/// The first five variants form the connector failure taxonomy: a missing
/// prerequisite, a failed command, undecodable output, an exhausted startup
/// retry budget and a failing service process.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// A prerequisite of the connector is not satisfied on this host.
    #[error("connector '{connector}' is unavailable: {reason}")]
    Unavailable {
        /// The connector identifier.
        connector: String,
        /// Human-readable reason reported by the availability checker.
        reason: String,
    },

    /// A command completed with a non-zero exit status or could not launch.
    #[error("command '{program}' failed with exit code {code}: {stderr}")]
    ExecutionFailed {
        /// The program that was invoked.
        program: String,
        /// The exit code (`-1` when the program could not be launched).
        code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// Command output could not be decoded as the expected structured format.
    #[error("failed to decode output of '{command}': {message}")]
    DecodeFailed {
        /// The command line whose output failed to decode.
        command: String,
        /// The decoder error.
        message: String,
    },

    /// The API did not become ready within the retry budget.
    #[error("API did not become ready after {attempts} status checks")]
    StartupTimeout {
        /// The number of status checks performed.
        attempts: u32,
    },

    /// The spawned API service process reported an error or exited early.
    #[error("API service process error: {message}")]
    ProcessError {
        /// A description of the process failure.
        message: String,
    },

    /// The engine version does not support structured output for a command.
    #[error("structured output is not supported for '{command}' by this engine version")]
    UnsupportedFormat {
        /// The command line that produced unparsed output.
        command: String,
    },

    /// The API service program could not be spawned.
    #[error("failed to spawn '{program}': {message}")]
    SpawnFailed {
        /// The program that failed to spawn.
        program: String,
        /// A description of the spawn failure.
        message: String,
    },

    /// No starter program is configured for this connector.
    #[error("starter program not configured")]
    StarterNotConfigured,

    /// Failed to reach the engine API endpoint.
    #[error("failed to reach engine API at '{connection}': {message}")]
    ApiUnreachable {
        /// The connection string that was probed.
        connection: String,
        /// A description of the failure.
        message: String,
    },

    /// The engine API socket was not found.
    #[error("engine API socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the engine API socket.
    #[error("permission denied accessing engine API socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// The engine API ping timed out.
    #[error("engine API ping timed out after {seconds} seconds")]
    ApiTimeout {
        /// The timeout duration in seconds.
        seconds: u64,
    },
}

/// Top-level error type for the podbridge library.
///
/// At the application boundary (`main.rs`) these errors are converted to
/// `eyre::Report` for human-readable reporting.
#[derive(Debug, Error)]
pub enum PodbridgeError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred while driving a connector.
    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

/// A specialised `Result` type for podbridge operations.
pub type Result<T> = std::result::Result<T, PodbridgeError>;
