//! Execution harness.
//!
//! Drives one sandboxed run: drains output into an [`EventAssembler`] while
//! watching the wall-clock deadline, the output limit and an optional
//! cancellation signal, then releases the substrate's resources on every
//! path.

use std::future::Future;

use futures_util::StreamExt;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{
    OutputChunk, OutputStream, ProgramControl, RunLimits, RunningProgram, SANDBOX_TARGET, Substrate,
};
use crate::build::Artifact;
use crate::clock::VirtualClock;
use crate::error::PlayError;
use crate::events::{Event, EventAssembler, EventKind};

/// Why a run was stopped before it finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillReason {
    /// Combined output passed the configured limit.
    OutputLimit {
        /// The limit in bytes.
        limit: u64,
    },
    /// The caller cancelled the run.
    Cancelled {
        /// Caller-supplied reason.
        reason: String,
    },
}

/// Terminal state of a sandboxed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Output was drained and the program exited.
    Completed {
        /// Exit code reported by the substrate.
        exit_code: i64,
    },
    /// The wall-clock deadline passed and the program was killed.
    TimedOut,
    /// The program was killed for another reason.
    Killed {
        /// Why it was killed.
        reason: KillReason,
    },
}

/// Terminal state plus the events assembled up to that point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// How the run ended.
    pub state: RunState,
    /// Assembled output events.
    pub events: Vec<Event>,
}

enum Drain {
    Finished,
    DeadlinePassed,
    OutputLimit,
    Cancelled(String),
}

/// Runs artifacts on a substrate under fixed limits.
#[derive(Debug, Clone, Copy)]
pub struct Harness {
    limits: RunLimits,
    clock: VirtualClock,
}

impl Harness {
    /// Create a harness applying `limits`, timing events against `clock`.
    #[must_use]
    pub const fn new(limits: RunLimits, clock: VirtualClock) -> Self {
        Self { limits, clock }
    }

    /// Return the limits applied to each run.
    #[must_use]
    pub const fn limits(&self) -> &RunLimits {
        &self.limits
    }

    /// Run `artifact` on `substrate` to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`PlayError`] when the substrate cannot launch the program,
    /// its output cannot be read, or its exit status cannot be collected.
    pub async fn execute<S>(&self, substrate: &S, artifact: &Artifact) -> Result<RunReport, PlayError>
    where
        S: Substrate + ?Sized,
    {
        self.execute_until(substrate, artifact, std::future::pending::<String>())
            .await
    }

    /// Run `artifact` on `substrate`, killing it early if `cancel` resolves.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub async fn execute_until<S, C>(
        &self,
        substrate: &S,
        artifact: &Artifact,
        cancel: C,
    ) -> Result<RunReport, PlayError>
    where
        S: Substrate + ?Sized,
        C: Future<Output = String> + Send,
    {
        let deadline = Instant::now() + self.limits.wall_time;
        let RunningProgram {
            mut output,
            mut control,
        } = substrate.launch(artifact, &self.limits).await?;
        debug!(target: SANDBOX_TARGET, mode = ?artifact.mode(), "program launched");

        let mut assembler = EventAssembler::new(self.clock);
        let mut events = vec![];
        let result = self
            .drain(&mut output, &mut assembler, &mut events, deadline, cancel)
            .await;
        drop(output);

        let outcome = match result {
            Ok(drain) => self.settle(control.as_mut(), drain, deadline).await,
            Err(stream_error) => Err(stream_error),
        };
        if !matches!(outcome, Ok(RunState::Completed { .. })) {
            Self::kill_quietly(control.as_mut()).await;
        }
        if let Err(release_error) = control.release().await {
            error!(
                target: SANDBOX_TARGET,
                error = %release_error,
                "failed to release sandbox resources"
            );
        }

        let state = outcome?;
        let trailer = match &state {
            RunState::Completed { exit_code } if *exit_code != 0 => {
                Some(format!("\nexit status {exit_code}\n"))
            }
            _ => None,
        };
        events.extend(assembler.finish(trailer.as_deref().map(|text| (EventKind::Stderr, text))));
        info!(
            target: SANDBOX_TARGET,
            state = ?state,
            events = events.len(),
            "run finished"
        );
        Ok(RunReport { state, events })
    }

    #[expect(
        clippy::integer_division_remainder_used,
        reason = "false positive triggered inside tokio::select! expansion"
    )]
    async fn drain<C>(
        &self,
        output: &mut OutputStream,
        assembler: &mut EventAssembler,
        events: &mut Vec<Event>,
        deadline: Instant,
        cancel: C,
    ) -> Result<Drain, PlayError>
    where
        C: Future<Output = String> + Send,
    {
        let limit = self.limits.max_output_bytes;
        let mut written: u64 = 0;
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);
        tokio::pin!(cancel);

        loop {
            tokio::select! {
                () = &mut sleep => return Ok(Drain::DeadlinePassed),
                reason = &mut cancel => return Ok(Drain::Cancelled(reason)),
                next = output.next() => {
                    let Some(chunk) = next.transpose()? else {
                        return Ok(Drain::Finished);
                    };
                    let OutputChunk { kind, mut bytes } = chunk;
                    let room = limit.saturating_sub(written);
                    let len = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
                    if len > room {
                        bytes.truncate(usize::try_from(room).unwrap_or(usize::MAX));
                        events.extend(assembler.push(kind, &bytes));
                        return Ok(Drain::OutputLimit);
                    }
                    written = written.saturating_add(len);
                    events.extend(assembler.push(kind, &bytes));
                }
            }
        }
    }

    async fn settle(
        &self,
        control: &mut dyn ProgramControl,
        drain: Drain,
        deadline: Instant,
    ) -> Result<RunState, PlayError> {
        match drain {
            Drain::Finished => match tokio::time::timeout_at(deadline, control.wait()).await {
                Ok(exit) => exit.map(|exit_code| RunState::Completed { exit_code }),
                Err(_) => Ok(RunState::TimedOut),
            },
            Drain::DeadlinePassed => Ok(RunState::TimedOut),
            Drain::OutputLimit => Ok(RunState::Killed {
                reason: KillReason::OutputLimit {
                    limit: self.limits.max_output_bytes,
                },
            }),
            Drain::Cancelled(reason) => Ok(RunState::Killed {
                reason: KillReason::Cancelled { reason },
            }),
        }
    }

    async fn kill_quietly(control: &mut dyn ProgramControl) {
        if let Err(kill_error) = control.kill().await {
            warn!(
                target: SANDBOX_TARGET,
                error = %kill_error,
                "failed to kill sandboxed program"
            );
        }
    }
}
