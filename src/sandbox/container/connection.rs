//! Engine socket resolution and connection.
//!
//! The socket is taken from configuration when set, then from the first
//! non-empty of `DOCKER_HOST`, `CONTAINER_HOST` and `PODMAN_HOST`, and finally
//! from the platform default.

use std::time::Duration;

use bollard::Docker;
use tracing::debug;

use super::errors::classify_connection_error;
use crate::error::{ContainerError, PlayError};
use crate::sandbox::SANDBOX_TARGET;

const FALLBACK_ENV_VARS: [&str; 3] = ["DOCKER_HOST", "CONTAINER_HOST", "PODMAN_HOST"];

/// Seconds bollard waits on any single API request.
const REQUEST_TIMEOUT_SECS: u64 = 120;

const PING_TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(unix)]
const DEFAULT_SOCKET: &str = "unix:///var/run/docker.sock";

#[cfg(windows)]
const DEFAULT_SOCKET: &str = "npipe:////./pipe/docker_engine";

/// Looks up engine endpoints in the environment.
pub struct SocketResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> SocketResolver<'a, E> {
    /// Create a resolver reading from `env`.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Return the first non-empty fallback variable, if any.
    #[must_use]
    pub fn resolve_from_env(&self) -> Option<String> {
        FALLBACK_ENV_VARS
            .iter()
            .filter_map(|name| self.env.string(name))
            .find(|value| !value.is_empty())
    }

    /// Return the configured socket, else the environment, else the
    /// platform default.
    #[must_use]
    pub fn resolve(&self, configured: Option<&str>) -> String {
        configured
            .filter(|socket| !socket.is_empty())
            .map(String::from)
            .or_else(|| self.resolve_from_env())
            .unwrap_or_else(|| String::from(DEFAULT_SOCKET))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Socket,
    Http,
    BarePath,
}

impl Endpoint {
    fn classify(socket: &str) -> Self {
        if socket.starts_with("unix://") || socket.starts_with("npipe://") {
            Self::Socket
        } else if ["tcp://", "http://", "https://"]
            .iter()
            .any(|scheme| socket.starts_with(scheme))
        {
            Self::Http
        } else {
            Self::BarePath
        }
    }
}

/// Opens bollard clients for the container substrate.
pub struct EngineConnector;

impl EngineConnector {
    /// Open a client for `socket`.
    ///
    /// Accepts `unix://`, `npipe://`, `tcp://`, `http://` and `https://`
    /// endpoints. A bare path starting with `//` or `\\` is a named pipe;
    /// any other bare path is a Unix socket.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::ConnectionFailed`] when bollard rejects the
    /// endpoint.
    pub fn connect(socket: &str) -> Result<Docker, PlayError> {
        let client = match Endpoint::classify(socket) {
            Endpoint::Socket => Docker::connect_with_socket(
                socket,
                REQUEST_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            Endpoint::Http => Docker::connect_with_http(
                &socket.replacen("tcp://", "http://", 1),
                REQUEST_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            Endpoint::BarePath => Docker::connect_with_socket(
                &Self::bare_path_uri(socket),
                REQUEST_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
        };
        client.map_err(|error| {
            PlayError::from(ContainerError::ConnectionFailed {
                message: error.to_string(),
            })
        })
    }

    /// Resolve the endpoint through `resolver` and open a client for it.
    ///
    /// # Errors
    ///
    /// See [`Self::connect`].
    pub fn connect_with_fallback<E: mockable::Env>(
        configured: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> Result<Docker, PlayError> {
        let socket = resolver.resolve(configured);
        debug!(target: SANDBOX_TARGET, socket = %socket, "connecting to container engine");
        Self::connect(&socket)
    }

    /// Ping the engine behind `client`, classifying socket failures.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::SocketNotFound`] or
    /// [`ContainerError::PermissionDenied`] when the socket itself is the
    /// problem, and [`ContainerError::ConnectionFailed`] otherwise.
    pub async fn verify(client: &Docker, socket: &str) -> Result<(), PlayError> {
        match tokio::time::timeout(PING_TIMEOUT, client.ping()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(error)) => Err(PlayError::from(classify_connection_error(&error, socket))),
            Err(_) => Err(PlayError::from(ContainerError::ConnectionFailed {
                message: format!("engine did not answer within {}s", PING_TIMEOUT.as_secs()),
            })),
        }
    }

    fn bare_path_uri(path: &str) -> String {
        if path.starts_with("\\\\") || path.starts_with("//") {
            format!("npipe://{path}")
        } else {
            format!("unix://{path}")
        }
    }
}
