//! Source bundles: one submitted text blob split into named files.
//!
//! A line of the exact form `-- <path> --` starts a new file whose content
//! runs to the next such line or the end of input. Text before the first
//! marker belongs to [`PROGRAM_FILE`]. Parsing never fails; anything that is
//! not a well-formed marker is ordinary file content.
//!
//! ```text
//! package main
//! const foo = "bar"
//!
//! -- two.go --
//! package main
//! func main() { println(foo) }
//! ```

use thiserror::Error;

/// Name given to the unnamed leading section of a bundle.
pub const PROGRAM_FILE: &str = "prog.go";

/// Name of the module-declaration file.
pub const MODULE_FILE: &str = "go.mod";

/// Maximum number of files a bundle may carry.
pub const MAX_FILES: usize = 20;

const MARKER_START: &str = "-- ";
const MARKER_END: &str = " --";

/// One named file inside a [`SourceBundle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    path: String,
    contents: String,
}

impl SourceFile {
    /// Create a file from its relative path and contents.
    #[must_use]
    pub fn new(path: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    /// Return the relative path of the file.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Return the file contents.
    #[must_use]
    pub fn contents(&self) -> &str {
        &self.contents
    }
}

/// Reasons a parsed bundle is rejected before it reaches the toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleViolation {
    /// The bundle carries more files than allowed.
    #[error("too many files in txtar archive ({count} exceeds limit of {MAX_FILES})")]
    TooManyFiles {
        /// Number of files found.
        count: usize,
    },

    /// A file path could escape or confuse the build root.
    #[error("invalid file name {path:?}: {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Why the path was rejected.
        reason: &'static str,
    },

    /// Two sections name the same file.
    #[error("duplicate file name {path:?}")]
    DuplicatePath {
        /// The repeated path.
        path: String,
    },
}

/// Ordered set of named source files derived from one request.
///
/// Insertion order is the order of appearance in the submitted text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBundle {
    files: Vec<SourceFile>,
}

impl SourceBundle {
    /// Split `text` into files.
    ///
    /// When the leading section is whitespace-only and named files follow, the
    /// empty [`PROGRAM_FILE`] is dropped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut files = vec![];
        let mut current_path = String::from(PROGRAM_FILE);
        let mut current = String::new();

        for line in text.split_inclusive('\n') {
            if let Some(path) = marker_path(line) {
                files.push(SourceFile::new(
                    std::mem::replace(&mut current_path, path),
                    std::mem::take(&mut current),
                ));
            } else {
                current.push_str(line);
            }
        }
        files.push(SourceFile::new(current_path, current));

        let leading_is_blank = files
            .first()
            .is_some_and(|file| file.path == PROGRAM_FILE && file.contents.trim().is_empty());
        if files.len() > 1 && leading_is_blank {
            files.remove(0);
        }

        Self { files }
    }

    /// Create a bundle holding a single program file.
    #[must_use]
    pub fn single(contents: impl Into<String>) -> Self {
        Self {
            files: vec![SourceFile::new(PROGRAM_FILE, contents)],
        }
    }

    /// Return the files in order of appearance.
    #[must_use]
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Return the number of files.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.files.len()
    }

    /// Return whether the bundle holds no files.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Return the contents of the file at `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|file| file.path == path)
            .map(SourceFile::contents)
    }

    /// Return the contents of the entry file, [`PROGRAM_FILE`].
    #[must_use]
    pub fn entry(&self) -> Option<&str> {
        self.get(PROGRAM_FILE)
    }

    /// Return whether the bundle is exactly one non-empty program file.
    #[must_use]
    pub fn is_single_program(&self) -> bool {
        self.files.len() == 1 && self.entry().is_some_and(|contents| !contents.is_empty())
    }

    /// Return whether the bundle declares a module.
    ///
    /// The presence of [`MODULE_FILE`] switches the build to module-aware mode.
    #[must_use]
    pub fn has_module_file(&self) -> bool {
        self.get(MODULE_FILE).is_some()
    }

    /// Replace the contents of `path`, appending the file if it is absent.
    pub fn upsert(&mut self, path: &str, contents: impl Into<String>) {
        let new_contents = contents.into();
        if let Some(file) = self.files.iter_mut().find(|file| file.path == path) {
            file.contents = new_contents;
        } else {
            self.files.push(SourceFile::new(path, new_contents));
        }
    }

    /// Check that the bundle can be materialized safely.
    ///
    /// # Errors
    ///
    /// Returns a [`BundleViolation`] for too many files, paths that are
    /// absolute or contain `.`/`..`/empty segments or backslashes, and
    /// duplicate paths.
    pub fn validate(&self) -> Result<(), BundleViolation> {
        if self.files.len() > MAX_FILES {
            return Err(BundleViolation::TooManyFiles {
                count: self.files.len(),
            });
        }

        let mut seen: Vec<&str> = Vec::with_capacity(self.files.len());
        for file in &self.files {
            validate_path(&file.path)?;
            if seen.contains(&file.path.as_str()) {
                return Err(BundleViolation::DuplicatePath {
                    path: file.path.clone(),
                });
            }
            seen.push(&file.path);
        }
        Ok(())
    }
}

fn marker_path(line: &str) -> Option<String> {
    let without_newline = line.strip_suffix('\n').unwrap_or(line);
    let inner = without_newline
        .strip_prefix(MARKER_START)?
        .strip_suffix(MARKER_END)?;
    let path = inner.trim();
    (!path.is_empty()).then(|| String::from(path))
}

fn validate_path(path: &str) -> Result<(), BundleViolation> {
    let reject = |reason| {
        Err(BundleViolation::InvalidPath {
            path: String::from(path),
            reason,
        })
    };

    if path.starts_with('/') {
        return reject("must be relative");
    }
    if path.contains('\\') {
        return reject("must use forward slashes");
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return reject("must not contain empty, '.' or '..' segments");
    }
    Ok(())
}
