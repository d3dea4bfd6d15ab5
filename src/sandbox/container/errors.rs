//! Mapping of bollard failures onto [`ContainerError`].

use std::io;
use std::path::Path;

use crate::error::ContainerError;

fn socket_path(socket_uri: &str) -> Option<&Path> {
    socket_uri
        .strip_prefix("unix://")
        .or_else(|| socket_uri.strip_prefix("npipe://"))
        .map(Path::new)
}

fn from_io_kind(kind: io::ErrorKind, path: Option<&Path>, message: String) -> ContainerError {
    match (kind, path) {
        (io::ErrorKind::PermissionDenied, Some(socket)) => ContainerError::PermissionDenied {
            path: socket.to_path_buf(),
        },
        (io::ErrorKind::NotFound, Some(socket)) => ContainerError::SocketNotFound {
            path: socket.to_path_buf(),
        },
        _ => ContainerError::ConnectionFailed { message },
    }
}

/// Classify a failure to reach the engine at `socket_uri`.
pub(super) fn classify_connection_error(
    error: &bollard::errors::Error,
    socket_uri: &str,
) -> ContainerError {
    let path = socket_path(socket_uri);
    let message = error.to_string();

    if let bollard::errors::Error::SocketNotFoundError(_) = error
        && let Some(socket) = path
    {
        return ContainerError::SocketNotFound {
            path: socket.to_path_buf(),
        };
    }
    if let bollard::errors::Error::IOError { err } = error {
        let kind = io_kind_in_sources(err).unwrap_or_else(|| err.kind());
        return from_io_kind(kind, path, message);
    }
    match io_kind_in_sources(error) {
        Some(kind) => from_io_kind(kind, path, message),
        None => ContainerError::ConnectionFailed { message },
    }
}

/// Return the kind of the first `io::Error` in the source chain of `error`.
fn io_kind_in_sources(error: &dyn std::error::Error) -> Option<io::ErrorKind> {
    let mut source = error.source();
    while let Some(cause) = source {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
        source = cause.source();
    }
    None
}
