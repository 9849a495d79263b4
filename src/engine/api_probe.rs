//! Engine API reachability checks.
//!
//! `isApiRunning` is answered by connecting to the resolved connection string
//! with the Docker-compatible Bollard client and sending a ping. Both Podman
//! and Docker answer the `/_ping` endpoint.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use bollard::Docker;
use serde::Serialize;
use tracing::debug;

use super::settings::ApiSettings;
use crate::error::ConnectorError;

/// Connection timeout in seconds for engine API connections.
const CONNECTION_TIMEOUT_SECS: u64 = 120;

/// Timeout in seconds for a single ping.
pub const PING_TIMEOUT_SECS: u64 = 10;

/// Result of an API reachability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiStatus {
    /// True when the API answered the ping.
    pub success: bool,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiStatus {
    /// A reachable API.
    #[must_use]
    pub const fn running() -> Self {
        Self {
            success: true,
            details: None,
        }
    }

    /// An unreachable API with a reason.
    #[must_use]
    pub fn failed(details: impl Into<String>) -> Self {
        Self {
            success: false,
            details: Some(details.into()),
        }
    }
}

/// Boxed future type returned by [`ApiProbe::ping`].
pub type ApiStatusFuture<'a> = Pin<Box<dyn Future<Output = ApiStatus> + Send + 'a>>;

/// Behaviour required to check whether an engine API is up.
pub trait ApiProbe: Send + Sync {
    /// Ping the API described by `api`.
    fn ping(&self, api: &ApiSettings) -> ApiStatusFuture<'_>;
}

/// [`ApiProbe`] backed by Bollard.
#[derive(Debug, Clone, Copy, Default)]
pub struct BollardApiProbe;

impl ApiProbe for BollardApiProbe {
    fn ping(&self, api: &ApiSettings) -> ApiStatusFuture<'_> {
        let connection = api.connection_string.clone();
        Box::pin(async move {
            match ping_endpoint(&connection).await {
                Ok(()) => ApiStatus::running(),
                Err(error) => {
                    debug!(target: "podbridge::api", %connection, %error, "engine API ping failed");
                    ApiStatus::failed(error.to_string())
                }
            }
        })
    }
}

async fn ping_endpoint(connection: &str) -> Result<(), ConnectorError> {
    if connection.is_empty() {
        return Err(ConnectorError::ApiUnreachable {
            connection: String::new(),
            message: String::from("connection string is not resolved"),
        });
    }
    let docker = connect(connection)?;
    let timeout = Duration::from_secs(PING_TIMEOUT_SECS);
    tokio::time::timeout(timeout, docker.ping())
        .await
        .map_err(|_| ConnectorError::ApiTimeout {
            seconds: PING_TIMEOUT_SECS,
        })?
        .map_err(|error| classify_connection_error(&error, &socket_uri(connection)))?;
    Ok(())
}

/// Classifies endpoint strings for connection handling.
enum EndpointType {
    /// Unix socket or Windows named pipe with explicit scheme.
    Socket,
    /// HTTP, HTTPS, or TCP endpoint (TCP is rewritten to HTTP).
    Http,
    /// Bare path without scheme prefix.
    BarePath,
}

impl EndpointType {
    fn classify(endpoint: &str) -> Self {
        if endpoint.starts_with("unix://") || endpoint.starts_with("npipe://") {
            Self::Socket
        } else if endpoint.starts_with("tcp://")
            || endpoint.starts_with("http://")
            || endpoint.starts_with("https://")
        {
            Self::Http
        } else {
            Self::BarePath
        }
    }
}

/// Normalizes a connection string into a URI with an explicit scheme.
///
/// Bare paths starting with `\\` or `//` are named pipes; other bare paths
/// are Unix sockets. Detection is syntax-based, not platform-based.
#[must_use]
pub fn socket_uri(connection: &str) -> String {
    match EndpointType::classify(connection) {
        EndpointType::Socket | EndpointType::Http => String::from(connection),
        EndpointType::BarePath if connection.starts_with("\\\\") || connection.starts_with("//") => {
            format!("npipe://{connection}")
        }
        EndpointType::BarePath => format!("unix://{connection}"),
    }
}

fn connect(connection: &str) -> Result<Docker, ConnectorError> {
    let uri = socket_uri(connection);
    match EndpointType::classify(&uri) {
        EndpointType::Http => {
            // Bollard only understands http:// for TCP endpoints.
            let http = uri.replacen("tcp://", "http://", 1);
            Docker::connect_with_http(&http, CONNECTION_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        }
        EndpointType::Socket | EndpointType::BarePath => {
            Docker::connect_with_socket(&uri, CONNECTION_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        }
    }
    .map_err(|error| classify_connection_error(&error, &uri))
}

fn extract_socket_path(uri: &str) -> Option<&Path> {
    uri.strip_prefix("unix://")
        .or_else(|| uri.strip_prefix("npipe://"))
        .map(Path::new)
}

fn classify_io_error_kind(
    kind: std::io::ErrorKind,
    uri: &str,
    message: String,
) -> ConnectorError {
    let socket_path = extract_socket_path(uri);
    match (kind, socket_path) {
        (std::io::ErrorKind::PermissionDenied, Some(path)) => ConnectorError::PermissionDenied {
            path: path.to_path_buf(),
        },
        (std::io::ErrorKind::NotFound, Some(path)) => ConnectorError::SocketNotFound {
            path: path.to_path_buf(),
        },
        _ => ConnectorError::ApiUnreachable {
            connection: String::from(uri),
            message,
        },
    }
}

/// Maps a Bollard error to the most specific connector error.
fn classify_connection_error(error: &bollard::errors::Error, uri: &str) -> ConnectorError {
    let message = error.to_string();
    match error {
        bollard::errors::Error::SocketNotFoundError(_) => {
            if let Some(path) = extract_socket_path(uri) {
                return ConnectorError::SocketNotFound {
                    path: path.to_path_buf(),
                };
            }
        }
        bollard::errors::Error::IOError { err } => {
            let kind = io_error_kind_in_chain(err).unwrap_or_else(|| err.kind());
            return classify_io_error_kind(kind, uri, message);
        }
        _ => {}
    }

    match io_error_kind_in_chain(error) {
        Some(kind) => classify_io_error_kind(kind, uri, message),
        None => ConnectorError::ApiUnreachable {
            connection: String::from(uri),
            message,
        },
    }
}

/// Walk the error source chain looking for an `io::Error` kind.
fn io_error_kind_in_chain(error: &dyn std::error::Error) -> Option<std::io::ErrorKind> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = error.source();
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return Some(io_err.kind());
        }
        current = err.source();
    }
    None
}
