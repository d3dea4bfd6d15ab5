//! Container substrate driven through the Docker or Podman API.
//!
//! Each run gets a fresh container created from a minimal image. The container
//! has no network, drops every capability and cannot gain new privileges. The
//! synthetic filesystem and the program executable are uploaded as one tar
//! archive before the container starts. The container is force-removed when
//! the harness releases the run.

mod connection;
mod errors;

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    AttachContainerOptionsBuilder, CreateContainerOptions, KillContainerOptionsBuilder,
    RemoveContainerOptionsBuilder, StartContainerOptions, UploadToContainerOptionsBuilder,
    WaitContainerOptions,
};
use bollard::{Docker, body_full};
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

pub use connection::{EngineConnector, SocketResolver};

use super::fsimage::{EXECUTABLE_PATH, FsImage};
use super::{
    ControlFuture, LaunchFuture, OutputChunk, OutputStream, ProgramControl, RunLimits,
    RunningProgram, SANDBOX_TARGET, Substrate,
};
use crate::build::Artifact;
use crate::config::SandboxConfig;
use crate::error::{ConfigError, ContainerError, PlayError, SubstrateError};
use crate::events::EventKind;

const SANDBOX_USER: &str = "65534:65534";
const NETWORK_NONE: &str = "none";
const DROP_ALL_CAPABILITIES: &str = "ALL";
const NO_NEW_PRIVILEGES: &str = "no-new-privileges";
const KILL_SIGNAL: &str = "SIGKILL";
const UPLOAD_ROOT: &str = "/";

/// Boxed future type returned by [`ContainerEngine`] implementors.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BollardError>> + Send + 'a>>;

/// Multiplexed output of an attached container.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<LogOutput, BollardError>> + Send>>;

/// Container lifecycle operations used by [`ContainerSubstrate`].
///
/// This abstraction keeps the launch sequence testable without a live daemon.
pub trait ContainerEngine: Send + Sync {
    /// Create a container and return its identifier.
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        body: ContainerCreateBody,
    ) -> EngineFuture<'_, String>;

    /// Extract a tar archive at the container's filesystem root.
    fn upload_to_container(&self, container_id: &str, archive: Vec<u8>) -> EngineFuture<'_, ()>;

    /// Attach to stdout and stderr, including anything already written.
    fn attach_container(&self, container_id: &str) -> EngineFuture<'_, LogStream>;

    /// Start a created container.
    fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()>;

    /// Wait for the container to stop and return its exit code.
    fn wait_container(&self, container_id: &str) -> EngineFuture<'_, i64>;

    /// Send `SIGKILL` to the container.
    fn kill_container(&self, container_id: &str) -> EngineFuture<'_, ()>;

    /// Remove the container, stopping it first if needed.
    fn remove_container(&self, container_id: &str) -> EngineFuture<'_, ()>;
}

impl ContainerEngine for Docker {
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        body: ContainerCreateBody,
    ) -> EngineFuture<'_, String> {
        Box::pin(async move {
            Self::create_container(self, options, body)
                .await
                .map(|response| response.id)
        })
    }

    fn upload_to_container(&self, container_id: &str, archive: Vec<u8>) -> EngineFuture<'_, ()> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            let options = UploadToContainerOptionsBuilder::new()
                .path(UPLOAD_ROOT)
                .build();
            Self::upload_to_container(
                self,
                &container_id_owned,
                Some(options),
                body_full(archive.into()),
            )
            .await
        })
    }

    fn attach_container(&self, container_id: &str) -> EngineFuture<'_, LogStream> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            let options = AttachContainerOptionsBuilder::new()
                .stdout(true)
                .stderr(true)
                .stream(true)
                .logs(true)
                .build();
            Self::attach_container(self, &container_id_owned, Some(options))
                .await
                .map(|results| results.output)
        })
    }

    fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            Self::start_container(self, &container_id_owned, None::<StartContainerOptions>).await
        })
    }

    fn wait_container(&self, container_id: &str) -> EngineFuture<'_, i64> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            let mut responses = std::pin::pin!(Self::wait_container(
                self,
                &container_id_owned,
                None::<WaitContainerOptions>
            ));
            match responses.next().await {
                Some(Ok(response)) => Ok(response.status_code),
                // Non-zero exits arrive as errors carrying the code.
                Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
                Some(Err(error)) => Err(error),
                None => Err(BollardError::from(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "wait stream ended without an exit status",
                ))),
            }
        })
    }

    fn kill_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            let options = KillContainerOptionsBuilder::new().signal(KILL_SIGNAL).build();
            Self::kill_container(self, &container_id_owned, Some(options)).await
        })
    }

    fn remove_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            let options = RemoveContainerOptionsBuilder::new().force(true).build();
            Self::remove_container(self, &container_id_owned, Some(options)).await
        })
    }
}

/// Resource limits applied to each sandbox container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerLimits {
    /// Memory limit in bytes. Swap is capped at the same value.
    pub memory_bytes: i64,
    /// Maximum number of processes and threads.
    pub pids_limit: i64,
    /// CPU quota in units of 1e-9 CPUs.
    pub nano_cpus: i64,
}

impl Default for ContainerLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 100 * 1024 * 1024,
            pids_limit: 256,
            nano_cpus: 1_000_000_000,
        }
    }
}

impl ContainerLimits {
    /// Build limits from the `[sandbox]` section.
    #[must_use]
    pub const fn from_sandbox_config(sandbox: &SandboxConfig) -> Self {
        Self {
            memory_bytes: sandbox.memory_bytes,
            pids_limit: sandbox.pids_limit,
            nano_cpus: sandbox.nano_cpus,
        }
    }
}

/// [`Substrate`] that runs each program in a fresh locked-down container.
#[derive(Debug)]
pub struct ContainerSubstrate<E: ContainerEngine + 'static> {
    engine: Arc<E>,
    image: String,
    limits: ContainerLimits,
    fs_image: Arc<FsImage>,
}

impl<E: ContainerEngine + 'static> ContainerSubstrate<E> {
    /// Create a substrate that starts containers from `image`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when `image` is empty or
    /// whitespace-only.
    pub fn new(
        engine: Arc<E>,
        image: impl Into<String>,
        limits: ContainerLimits,
        fs_image: FsImage,
    ) -> Result<Self, PlayError> {
        let image_value = image.into();
        let trimmed = image_value.trim();
        if trimmed.is_empty() {
            return Err(PlayError::from(ConfigError::MissingRequired {
                field: String::from("image"),
            }));
        }

        Ok(Self {
            engine,
            image: String::from(trimmed),
            limits,
            fs_image: Arc::new(fs_image),
        })
    }

    /// Return the image containers are created from.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    fn create_body(&self, artifact: &Artifact) -> ContainerCreateBody {
        let host_config = HostConfig {
            network_mode: Some(String::from(NETWORK_NONE)),
            cap_drop: Some(vec![String::from(DROP_ALL_CAPABILITIES)]),
            security_opt: Some(vec![String::from(NO_NEW_PRIVILEGES)]),
            memory: Some(self.limits.memory_bytes),
            memory_swap: Some(self.limits.memory_bytes),
            pids_limit: Some(self.limits.pids_limit),
            nano_cpus: Some(self.limits.nano_cpus),
            ..HostConfig::default()
        };

        ContainerCreateBody {
            image: Some(self.image.clone()),
            entrypoint: Some(vec![String::from(EXECUTABLE_PATH)]),
            cmd: Some(artifact.args().iter().map(|arg| String::from(*arg)).collect()),
            env: Some(vec![]),
            user: Some(String::from(SANDBOX_USER)),
            network_disabled: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            host_config: Some(host_config),
            ..ContainerCreateBody::default()
        }
    }

    async fn launch_async(&self, artifact: &Artifact) -> Result<RunningProgram, PlayError> {
        let archive = self.fs_image.archive(artifact.binary()).map_err(|error| {
            PlayError::from(SubstrateError::LaunchFailed {
                message: format!("failed to pack sandbox filesystem: {error}"),
            })
        })?;

        let container_id = self
            .engine
            .create_container(None, self.create_body(artifact))
            .await
            .map_err(|error| {
                PlayError::from(ContainerError::CreateFailed {
                    message: error.to_string(),
                })
            })?;
        debug!(
            target: SANDBOX_TARGET,
            container_id = %container_id,
            image = %self.image,
            "sandbox container created"
        );

        match self.prepare_and_start(&container_id, archive).await {
            Ok(logs) => Ok(RunningProgram {
                output: container_output(logs),
                control: Box::new(ContainerControl {
                    engine: Arc::clone(&self.engine),
                    container_id,
                    removed: false,
                }),
            }),
            Err(error) => {
                if let Err(remove_error) = self.engine.remove_container(&container_id).await {
                    warn!(
                        target: SANDBOX_TARGET,
                        container_id = %container_id,
                        error = %remove_error,
                        "failed to remove container after launch failure"
                    );
                }
                Err(error)
            }
        }
    }

    async fn prepare_and_start(
        &self,
        container_id: &str,
        archive: Vec<u8>,
    ) -> Result<LogStream, PlayError> {
        self.engine
            .upload_to_container(container_id, archive)
            .await
            .map_err(|error| {
                PlayError::from(ContainerError::UploadFailed {
                    container_id: String::from(container_id),
                    message: error.to_string(),
                })
            })?;

        let start_failed = |error: BollardError| {
            PlayError::from(ContainerError::StartFailed {
                container_id: String::from(container_id),
                message: error.to_string(),
            })
        };
        let logs = self
            .engine
            .attach_container(container_id)
            .await
            .map_err(start_failed)?;
        self.engine
            .start_container(container_id)
            .await
            .map_err(start_failed)?;
        Ok(logs)
    }
}

impl<E: ContainerEngine + 'static> Substrate for ContainerSubstrate<E> {
    fn launch<'a>(&'a self, artifact: &'a Artifact, _limits: &'a RunLimits) -> LaunchFuture<'a> {
        Box::pin(self.launch_async(artifact))
    }
}

fn container_output(logs: LogStream) -> OutputStream {
    logs.filter_map(|item| async move {
        match item {
            Ok(LogOutput::StdOut { message } | LogOutput::Console { message }) => {
                Some(Ok(OutputChunk::new(EventKind::Stdout, message.to_vec())))
            }
            Ok(LogOutput::StdErr { message }) => {
                Some(Ok(OutputChunk::new(EventKind::Stderr, message.to_vec())))
            }
            Ok(LogOutput::StdIn { .. }) => None,
            Err(error) => Some(Err(PlayError::from(SubstrateError::StreamFailed {
                message: error.to_string(),
            }))),
        }
    })
    .boxed()
}

struct ContainerControl<E: ContainerEngine> {
    engine: Arc<E>,
    container_id: String,
    removed: bool,
}

impl<E: ContainerEngine + 'static> ProgramControl for ContainerControl<E> {
    fn kill(&mut self) -> ControlFuture<'_, ()> {
        Box::pin(async move {
            self.engine
                .kill_container(&self.container_id)
                .await
                .map_err(|error| {
                    PlayError::from(SubstrateError::KillFailed {
                        message: format!("container '{}': {error}", self.container_id),
                    })
                })
        })
    }

    fn wait(&mut self) -> ControlFuture<'_, i64> {
        Box::pin(async move {
            self.engine
                .wait_container(&self.container_id)
                .await
                .map_err(|error| {
                    PlayError::from(ContainerError::WaitFailed {
                        container_id: self.container_id.clone(),
                        message: error.to_string(),
                    })
                })
        })
    }

    fn release(&mut self) -> ControlFuture<'_, ()> {
        Box::pin(async move {
            if self.removed {
                return Ok(());
            }
            self.engine
                .remove_container(&self.container_id)
                .await
                .map_err(|error| {
                    PlayError::from(ContainerError::RemoveFailed {
                        container_id: self.container_id.clone(),
                        message: error.to_string(),
                    })
                })?;
            self.removed = true;
            debug!(
                target: SANDBOX_TARGET,
                container_id = %self.container_id,
                "sandbox container removed"
            );
            Ok(())
        })
    }
}
