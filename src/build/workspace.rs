//! Private build roots.
//!
//! Every compile and vet gets a fresh temporary directory. Bundle files are
//! written through a capability handle on that directory, so a path can never
//! land outside it, and the directory is removed when the root is dropped.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use tempfile::TempDir;

use crate::bundle::SourceBundle;
use crate::error::{FilesystemError, PlayError};

const BUILD_ROOT_PREFIX: &str = "goplay-build-";

/// A temporary directory holding one materialized bundle.
#[derive(Debug)]
pub struct BuildRoot {
    _temp: TempDir,
    path: Utf8PathBuf,
    dir: Dir,
}

impl BuildRoot {
    /// Create an empty build root under `parent`, or the system temporary
    /// directory when `parent` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`FilesystemError`] when the directory cannot be created or
    /// opened, or its path is not valid UTF-8.
    pub fn create(parent: Option<&Utf8Path>) -> Result<Self, PlayError> {
        let builder_result = match parent {
            Some(parent_dir) => tempfile::Builder::new()
                .prefix(BUILD_ROOT_PREFIX)
                .tempdir_in(parent_dir),
            None => tempfile::Builder::new().prefix(BUILD_ROOT_PREFIX).tempdir(),
        };
        let temp = builder_result.map_err(|error| {
            FilesystemError::from_io(
                parent.map_or_else(std::env::temp_dir, |dir| dir.as_std_path().to_path_buf()),
                &error,
            )
        })?;

        let path = Utf8PathBuf::try_from(temp.path().to_path_buf()).map_err(|error| {
            FilesystemError::IoError {
                path: temp.path().to_path_buf(),
                message: error.to_string(),
            }
        })?;
        let dir = Dir::open_ambient_dir(&path, ambient_authority())
            .map_err(|error| FilesystemError::from_io(path.as_std_path(), &error))?;

        Ok(Self {
            _temp: temp,
            path,
            dir,
        })
    }

    /// Create a build root and write every bundle file into it.
    ///
    /// # Errors
    ///
    /// Returns [`FilesystemError`] when the root cannot be created or a file
    /// cannot be written.
    pub fn materialize(parent: Option<&Utf8Path>, bundle: &SourceBundle) -> Result<Self, PlayError> {
        let root = Self::create(parent)?;
        for file in bundle.files() {
            root.write(file.path(), file.contents().as_bytes())?;
        }
        Ok(root)
    }

    /// Return the absolute path of the root.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Write `contents` to the relative `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`FilesystemError`] when the write fails or `path` would
    /// escape the root.
    pub fn write(&self, path: &str, contents: &[u8]) -> Result<(), PlayError> {
        let relative = Utf8Path::new(path);
        if let Some(parent) = relative.parent().filter(|parent| !parent.as_str().is_empty()) {
            self.dir
                .create_dir_all(parent)
                .map_err(|error| self.filesystem_error(parent, &error))?;
        }
        self.dir
            .write(relative, contents)
            .map_err(|error| self.filesystem_error(relative, &error))
    }

    /// Read the relative `path` back out of the root.
    ///
    /// # Errors
    ///
    /// Returns [`FilesystemError`] when the file is missing or unreadable.
    pub fn read(&self, path: &str) -> Result<Vec<u8>, PlayError> {
        self.dir
            .read(path)
            .map_err(|error| self.filesystem_error(Utf8Path::new(path), &error))
    }

    fn filesystem_error(&self, relative: &Utf8Path, error: &io::Error) -> PlayError {
        PlayError::from(FilesystemError::from_io(
            self.path.join(relative).into_std_path_buf(),
            error,
        ))
    }
}
