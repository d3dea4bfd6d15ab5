//! Local child-process substrate.
//!
//! Writes the executable into a private temporary directory and runs it with
//! an empty environment. This substrate applies no containment of its own:
//! programs see the host filesystem rather than the synthetic image in
//! [`super::fsimage`]. It is meant for development and tests.

use std::process::Stdio;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs::{Permissions, PermissionsExt};
use cap_std::fs_utf8::Dir;
use futures_util::{Stream, StreamExt, stream};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::debug;

use super::{
    ControlFuture, LaunchFuture, OutputChunk, ProgramControl, RunLimits, RunningProgram,
    SANDBOX_TARGET, Substrate,
};
use crate::build::Artifact;
use crate::error::{FilesystemError, PlayError, SubstrateError};
use crate::events::EventKind;

const RUN_DIR_PREFIX: &str = "goplay-run-";
const EXECUTABLE_NAME: &str = "prog";
const EXECUTABLE_MODE: u32 = 0o755;
const READ_BUFFER_BYTES: usize = 32 * 1024;

/// [`Substrate`] that runs the program as a local child process.
#[derive(Debug, Clone, Default)]
pub struct ProcessSubstrate {
    scratch_dir: Option<Utf8PathBuf>,
}

impl ProcessSubstrate {
    /// Create a substrate that places run directories under `scratch_dir`,
    /// or the system temporary directory when `None`.
    #[must_use]
    pub const fn new(scratch_dir: Option<Utf8PathBuf>) -> Self {
        Self { scratch_dir }
    }

    async fn launch_async(&self, artifact: &Artifact) -> Result<RunningProgram, PlayError> {
        let (run_dir, executable) = stage_executable(self.scratch_dir.as_deref(), artifact)?;

        let mut child = Command::new(executable.as_std_path())
            .args(artifact.args())
            .current_dir(run_dir.path())
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| launch_failed(format!("failed to spawn {executable}: {error}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_failed(String::from("stdout pipe unavailable")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| launch_failed(String::from("stderr pipe unavailable")))?;
        debug!(
            target: SANDBOX_TARGET,
            pid = ?child.id(),
            executable = %executable,
            "child process started"
        );

        let output = stream::select(
            read_chunks(stdout, EventKind::Stdout),
            read_chunks(stderr, EventKind::Stderr),
        )
        .boxed();

        Ok(RunningProgram {
            output,
            control: Box::new(ProcessControl {
                child,
                run_dir: Some(run_dir),
            }),
        })
    }
}

impl Substrate for ProcessSubstrate {
    fn launch<'a>(&'a self, artifact: &'a Artifact, _limits: &'a RunLimits) -> LaunchFuture<'a> {
        Box::pin(self.launch_async(artifact))
    }
}

fn stage_executable(
    parent: Option<&Utf8Path>,
    artifact: &Artifact,
) -> Result<(TempDir, Utf8PathBuf), PlayError> {
    let run_dir = match parent {
        Some(dir) => tempfile::Builder::new()
            .prefix(RUN_DIR_PREFIX)
            .tempdir_in(dir),
        None => tempfile::Builder::new().prefix(RUN_DIR_PREFIX).tempdir(),
    }
    .map_err(|error| {
        FilesystemError::from_io(
            parent.map_or_else(std::env::temp_dir, |dir| dir.as_std_path().to_path_buf()),
            &error,
        )
    })?;

    let root = Utf8PathBuf::try_from(run_dir.path().to_path_buf()).map_err(|error| {
        FilesystemError::IoError {
            path: run_dir.path().to_path_buf(),
            message: error.to_string(),
        }
    })?;
    let dir = Dir::open_ambient_dir(&root, ambient_authority())
        .map_err(|error| FilesystemError::from_io(root.as_std_path(), &error))?;
    let executable = root.join(EXECUTABLE_NAME);
    dir.write(EXECUTABLE_NAME, artifact.binary())
        .map_err(|error| FilesystemError::from_io(executable.as_std_path(), &error))?;
    dir.set_permissions(EXECUTABLE_NAME, Permissions::from_mode(EXECUTABLE_MODE))
        .map_err(|error| FilesystemError::from_io(executable.as_std_path(), &error))?;

    Ok((run_dir, executable))
}

fn read_chunks<R>(reader: R, kind: EventKind) -> impl Stream<Item = Result<OutputChunk, PlayError>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(Some(reader), move |state| async move {
        let mut pipe = state?;
        let mut buffer = vec![0_u8; READ_BUFFER_BYTES];
        match pipe.read(&mut buffer).await {
            Ok(0) => None,
            Ok(read) => {
                buffer.truncate(read);
                Some((Ok(OutputChunk::new(kind, buffer)), Some(pipe)))
            }
            Err(error) => Some((
                Err(PlayError::from(SubstrateError::StreamFailed {
                    message: format!("reading {}: {error}", kind.as_str()),
                })),
                None,
            )),
        }
    })
}

fn launch_failed(message: String) -> PlayError {
    PlayError::from(SubstrateError::LaunchFailed { message })
}

struct ProcessControl {
    child: Child,
    run_dir: Option<TempDir>,
}

impl ProgramControl for ProcessControl {
    fn kill(&mut self) -> ControlFuture<'_, ()> {
        Box::pin(async move {
            self.child.kill().await.map_err(|error| {
                PlayError::from(SubstrateError::KillFailed {
                    message: error.to_string(),
                })
            })
        })
    }

    fn wait(&mut self) -> ControlFuture<'_, i64> {
        Box::pin(async move {
            let status = self.child.wait().await.map_err(|error| {
                PlayError::from(SubstrateError::KillFailed {
                    message: format!("failed to reap child: {error}"),
                })
            })?;
            Ok(status.code().map_or(-1, i64::from))
        })
    }

    fn release(&mut self) -> ControlFuture<'_, ()> {
        Box::pin(async move {
            let Some(run_dir) = self.run_dir.take() else {
                return Ok(());
            };
            let path = run_dir.path().to_path_buf();
            run_dir
                .close()
                .map_err(|error| PlayError::from(FilesystemError::from_io(path, &error)))
        })
    }
}
