//! Compile and link driver.
//!
//! Turns a [`SourceBundle`] into an executable [`Artifact`] by materializing
//! it into a private build root and running `go build` with the `faketime`
//! build tag. Problems with the submitted program come back as
//! [`CompileResult::Failure`]; only a toolchain or filesystem that cannot be
//! used is reported as an error.

pub mod scan;
pub mod testmain;
pub mod toolchain;
mod workspace;

use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use crate::bundle::{MODULE_FILE, PROGRAM_FILE, SourceBundle};
use crate::config::AppConfig;
use crate::error::{PlayError, ToolchainError};

pub use toolchain::{GoTool, GoToolchain, ToolFuture, ToolInvocation, ToolOutput, Toolchain};
pub use workspace::BuildRoot;

const BUILD_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::build");

/// Diagnostic returned when the entry file is not in package `main`.
pub const PACKAGE_MUST_BE_MAIN: &str = "package name must be main";

/// Name of the executable inside the build root.
pub const OUTPUT_BINARY: &str = "a.out";

const FAKETIME_TAG: &str = "-tags=faketime";
const DEFAULT_MODULE_FILE: &str = "module play\n";
const LEGACY_TOUR_IMPORT: &str = "\"code.google.com/p/go-tour/";
const PROXY_OFF: &str = "off";

/// How the compiled binary must be started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// An ordinary program with `func main`.
    #[default]
    Run,
    /// A synthesized test binary with at least one test.
    Test,
    /// A synthesized test binary with examples only.
    Example,
}

impl RunMode {
    /// Return the arguments the binary is started with.
    #[must_use]
    pub const fn binary_args(self) -> &'static [&'static str] {
        match self {
            Self::Run => &[],
            Self::Test | Self::Example => &["-test.v"],
        }
    }
}

/// A compiled executable ready to run.
#[derive(Clone, PartialEq, Eq)]
pub struct Artifact {
    binary: Vec<u8>,
    mode: RunMode,
}

impl Artifact {
    /// Wrap executable bytes with the mode they must be run in.
    #[must_use]
    pub const fn new(binary: Vec<u8>, mode: RunMode) -> Self {
        Self { binary, mode }
    }

    /// Return the executable bytes.
    #[must_use]
    pub fn binary(&self) -> &[u8] {
        &self.binary
    }

    /// Return the run mode.
    #[must_use]
    pub const fn mode(&self) -> RunMode {
        self.mode
    }

    /// Return the command-line arguments for the executable.
    #[must_use]
    pub const fn args(&self) -> &'static [&'static str] {
        self.mode.binary_args()
    }
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("binary_len", &self.binary.len())
            .field("mode", &self.mode)
            .finish()
    }
}

/// Outcome of compiling a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileResult {
    /// The build produced an executable.
    Success(Artifact),
    /// The program was rejected; the text is shown to the submitter.
    Failure(String),
}

/// Module resolution policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePolicy {
    /// Whether third-party modules may be downloaded.
    pub allow_downloads: bool,
    /// Module proxy used when downloads are allowed.
    pub proxy: String,
}

impl Default for ModulePolicy {
    fn default() -> Self {
        Self {
            allow_downloads: true,
            proxy: String::from("https://proxy.golang.org"),
        }
    }
}

/// Settings shared by the build and vet drivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    /// Target operating system.
    pub goos: String,
    /// Target architecture.
    pub goarch: String,
    /// `GOROOT` to pin, if any.
    pub goroot: Option<Utf8PathBuf>,
    /// `GOPATH` for module and legacy package caches.
    pub gopath: Utf8PathBuf,
    /// `GOCACHE` for build outputs.
    pub cache_dir: Utf8PathBuf,
    /// Module resolution policy.
    pub modules: ModulePolicy,
    /// Limit for one toolchain invocation.
    pub timeout: Duration,
    /// Parent directory for build roots; the system default when `None`.
    pub scratch_dir: Option<Utf8PathBuf>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        let base = Utf8PathBuf::try_from(std::env::temp_dir())
            .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
            .join("goplay");
        Self {
            goos: String::from("linux"),
            goarch: String::from("amd64"),
            goroot: None,
            gopath: base.join("gopath"),
            cache_dir: base.join("cache"),
            modules: ModulePolicy::default(),
            timeout: Duration::from_secs(60),
            scratch_dir: None,
        }
    }
}

impl BuildSettings {
    /// Build settings from the `[toolchain]` and `[modules]` sections.
    ///
    /// Unset `GOPATH` and `GOCACHE` fall back to the defaults under the
    /// system temporary directory.
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        let defaults = Self::default();
        let toolchain = &config.toolchain;
        Self {
            goos: toolchain.goos.clone(),
            goarch: toolchain.goarch.clone(),
            goroot: toolchain.goroot.clone(),
            gopath: toolchain.gopath.clone().unwrap_or(defaults.gopath),
            cache_dir: toolchain.cache_dir.clone().unwrap_or(defaults.cache_dir),
            modules: ModulePolicy {
                allow_downloads: config.modules.allow_downloads,
                proxy: config.modules.proxy.clone(),
            },
            timeout: Duration::from_secs(toolchain.build_timeout_secs),
            scratch_dir: toolchain.scratch_dir.clone(),
        }
    }

    /// Return the toolchain environment for a build in the given module mode.
    #[must_use]
    pub fn environment(&self, module_mode: bool) -> Vec<(String, String)> {
        let proxy = if module_mode && self.modules.allow_downloads {
            self.modules.proxy.as_str()
        } else {
            PROXY_OFF
        };
        let mut env = vec![
            (String::from("GOOS"), self.goos.clone()),
            (String::from("GOARCH"), self.goarch.clone()),
            (String::from("CGO_ENABLED"), String::from("0")),
            (String::from("GOCACHE"), String::from(self.cache_dir.as_str())),
            (String::from("GOPATH"), String::from(self.gopath.as_str())),
            (
                String::from("GO111MODULE"),
                String::from(if module_mode { "on" } else { "off" }),
            ),
            (String::from("GOPROXY"), String::from(proxy)),
        ];
        if module_mode {
            env.push((String::from("GOFLAGS"), String::from("-mod=mod")));
        }
        if let Some(goroot) = &self.goroot {
            env.push((String::from("GOROOT"), String::from(goroot.as_str())));
        }
        env
    }
}

/// A bundle that passed the pre-build checks, rewritten for the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedBuild {
    bundle: SourceBundle,
    mode: RunMode,
    module_mode: bool,
}

impl PreparedBuild {
    /// Return the files to materialize.
    #[must_use]
    pub const fn bundle(&self) -> &SourceBundle {
        &self.bundle
    }

    /// Return how the binary must be run.
    #[must_use]
    pub const fn mode(&self) -> RunMode {
        self.mode
    }

    /// Return whether the build runs in module-aware mode.
    #[must_use]
    pub const fn module_mode(&self) -> bool {
        self.module_mode
    }
}

/// Result of the checks that run before any filesystem or process work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preparation {
    /// The program was rejected with the given diagnostic.
    Rejected(String),
    /// The program may be built.
    Ready(PreparedBuild),
}

/// Check and rewrite `bundle` for building.
///
/// Rejects an entry file whose package is not `main` and bundles that fail
/// validation, selects the run mode, and settles the module mode, adding a
/// default `go.mod` when module mode is on and none was supplied.
#[must_use]
pub fn prepare(bundle: &SourceBundle, modules: &ModulePolicy) -> Preparation {
    let entry = bundle.entry();
    if entry
        .and_then(scan::package_clause)
        .is_some_and(|clause| clause.name() != "main")
    {
        return Preparation::Rejected(String::from(PACKAGE_MUST_BE_MAIN));
    }
    if let Err(violation) = bundle.validate() {
        return Preparation::Rejected(violation.to_string());
    }

    let mut prepared = bundle.clone();
    let mut mode = RunMode::Run;
    if bundle.is_single_program()
        && let Some(src) = entry
        && let Ok(file) = scan::scan(src)
        && let Some(program) = testmain::synthesize(src, &file)
    {
        mode = program.mode();
        prepared.upsert(PROGRAM_FILE, program.source());
    }

    let legacy_tour =
        bundle.len() == 1 && entry.is_some_and(|src| src.contains(LEGACY_TOUR_IMPORT));
    let module_mode = !legacy_tour && (bundle.has_module_file() || modules.allow_downloads);
    if module_mode && !bundle.has_module_file() {
        prepared.upsert(MODULE_FILE, DEFAULT_MODULE_FILE);
    }

    Preparation::Ready(PreparedBuild {
        bundle: prepared,
        mode,
        module_mode,
    })
}

/// Strip build-root paths and the leading `# package` banner from toolchain
/// output.
#[must_use]
pub fn normalize_diagnostics(output: &str, root: &Utf8Path) -> String {
    let root_prefix = format!("{root}/");
    let relative = output.replace(&root_prefix, "").replace(root.as_str(), ".");
    if relative.starts_with('#') {
        return relative
            .split_once('\n')
            .map_or_else(String::new, |(_, rest)| String::from(rest));
    }
    relative
}

/// Drives `go build` for one request at a time.
#[derive(Debug)]
pub struct BuildDriver<T: Toolchain> {
    toolchain: Arc<T>,
    settings: BuildSettings,
}

impl<T: Toolchain> BuildDriver<T> {
    /// Create a driver over `toolchain`.
    #[must_use]
    pub const fn new(toolchain: Arc<T>, settings: BuildSettings) -> Self {
        Self {
            toolchain,
            settings,
        }
    }

    /// Return the driver settings.
    #[must_use]
    pub const fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// Prepare and compile `bundle`.
    ///
    /// # Errors
    ///
    /// Returns [`PlayError`] when the build root cannot be written, the
    /// toolchain cannot be run or times out, or a successful build leaves no
    /// executable behind.
    pub async fn compile(&self, bundle: &SourceBundle) -> Result<CompileResult, PlayError> {
        match prepare(bundle, &self.settings.modules) {
            Preparation::Rejected(message) => {
                debug!(target: BUILD_TARGET, %message, "bundle rejected before build");
                Ok(CompileResult::Failure(message))
            }
            Preparation::Ready(prepared) => self.build(&prepared).await,
        }
    }

    /// Compile an already prepared bundle.
    ///
    /// # Errors
    ///
    /// See [`Self::compile`].
    pub async fn build(&self, prepared: &PreparedBuild) -> Result<CompileResult, PlayError> {
        let root = BuildRoot::materialize(self.settings.scratch_dir.as_deref(), prepared.bundle())?;
        let invocation = ToolInvocation::new(GoTool::Build, root.path(), self.settings.timeout)
            .with_args(["-o", OUTPUT_BINARY, FAKETIME_TAG, "."])
            .with_env(self.settings.environment(prepared.module_mode()));

        let output = self.toolchain.run(invocation).await?;
        if !output.success() {
            let diagnostics = normalize_diagnostics(output.output(), root.path());
            info!(
                target: BUILD_TARGET,
                diagnostic_bytes = diagnostics.len(),
                "build failed"
            );
            return Ok(CompileResult::Failure(diagnostics));
        }

        let binary = root.read(OUTPUT_BINARY).map_err(|error| {
            PlayError::from(ToolchainError::ArtifactMissing {
                message: error.to_string(),
            })
        })?;
        debug!(
            target: BUILD_TARGET,
            binary_bytes = binary.len(),
            mode = ?prepared.mode(),
            "build succeeded"
        );
        Ok(CompileResult::Success(Artifact::new(binary, prepared.mode())))
    }
}
