//! Mapping of a finished run onto the client-facing outcome.

use tracing::info;

use super::{API_TARGET, Response};
use crate::error::{ExecutionError, PlayError};
use crate::sandbox::{KillReason, RunLimits, RunReport, RunState};
use crate::vet::VetResult;

/// Classify a run that got as far as executing.
///
/// A program that exited, with any status, yields a [`Response`] with its
/// events and, when vet ran, the vet findings. Every other terminal state
/// becomes an [`ExecutionError`] and the events are discarded.
///
/// # Errors
///
/// Returns [`ExecutionError::TimedOut`], [`ExecutionError::OutputLimitExceeded`]
/// or [`ExecutionError::Killed`] for runs that did not complete.
pub fn classify_run(
    report: RunReport,
    vet: Option<VetResult>,
    limits: &RunLimits,
) -> Result<Response, PlayError> {
    match report.state {
        RunState::Completed { exit_code } => {
            info!(
                target: API_TARGET,
                exit_code,
                events = report.events.len(),
                "program completed"
            );
            Ok(Response::completed(report.events, vet))
        }
        RunState::TimedOut => Err(ExecutionError::TimedOut {
            limit_ms: saturating_millis(limits),
        }
        .into()),
        RunState::Killed {
            reason: KillReason::OutputLimit { limit },
        } => Err(ExecutionError::OutputLimitExceeded { limit }.into()),
        RunState::Killed {
            reason: KillReason::Cancelled { reason },
        } => Err(ExecutionError::Killed { reason }.into()),
    }
}

fn saturating_millis(limits: &RunLimits) -> u64 {
    u64::try_from(limits.wall_time.as_millis()).unwrap_or(u64::MAX)
}
