//! Static analysis driver.
//!
//! Runs `go vet` over a prepared bundle in a build root of its own, so it can
//! proceed alongside compilation. Vet is advisory: when it cannot run at all
//! the result degrades to a clean report and a warning is logged.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::build::{
    BuildRoot, BuildSettings, GoTool, PreparedBuild, ToolInvocation, Toolchain,
    normalize_diagnostics,
};
use crate::error::PlayError;

const VET_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::vet");

/// Findings reported by `go vet`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VetResult {
    diagnostics: String,
}

impl VetResult {
    /// Create a result from normalized vet output.
    #[must_use]
    pub fn new(diagnostics: impl Into<String>) -> Self {
        Self {
            diagnostics: diagnostics.into(),
        }
    }

    /// Create a clean result.
    #[must_use]
    pub const fn clean() -> Self {
        Self {
            diagnostics: String::new(),
        }
    }

    /// Return the diagnostic text.
    #[must_use]
    pub fn diagnostics(&self) -> &str {
        &self.diagnostics
    }

    /// Return whether vet found nothing to report.
    #[must_use]
    pub const fn ok(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Drives `go vet` for one request at a time.
#[derive(Debug)]
pub struct VetDriver<T: Toolchain> {
    toolchain: Arc<T>,
    settings: BuildSettings,
}

impl<T: Toolchain> VetDriver<T> {
    /// Create a driver over `toolchain`.
    #[must_use]
    pub const fn new(toolchain: Arc<T>, settings: BuildSettings) -> Self {
        Self {
            toolchain,
            settings,
        }
    }

    /// Vet `prepared`, degrading to a clean result when vet cannot run.
    pub async fn vet(&self, prepared: &PreparedBuild) -> VetResult {
        match self.try_vet(prepared).await {
            Ok(result) => result,
            Err(error) => {
                warn!(target: VET_TARGET, error = %error, "vet unavailable; reporting clean");
                VetResult::clean()
            }
        }
    }

    async fn try_vet(&self, prepared: &PreparedBuild) -> Result<VetResult, PlayError> {
        let root = BuildRoot::materialize(self.settings.scratch_dir.as_deref(), prepared.bundle())?;
        let invocation = ToolInvocation::new(GoTool::Vet, root.path(), self.settings.timeout)
            .with_args(["."])
            .with_env(self.settings.environment(prepared.module_mode()));

        let output = self.toolchain.run(invocation).await?;
        if output.success() {
            debug!(target: VET_TARGET, "vet passed");
            return Ok(VetResult::clean());
        }
        let diagnostics = normalize_diagnostics(output.output(), root.path());
        debug!(
            target: VET_TARGET,
            diagnostic_bytes = diagnostics.len(),
            "vet reported findings"
        );
        Ok(VetResult::new(diagnostics))
    }
}

#[cfg(test)]
mod tests;
