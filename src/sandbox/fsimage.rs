//! Synthetic root filesystem for container sandboxes.
//!
//! The image is small and fixed: device nodes, a handful of `/etc` files, a
//! world-writable `/tmp`, the time-zone database copied from the toolchain's
//! `GOROOT`, and the program executable itself. [`ENTRIES`] lists every path
//! the archive holds, so [`paths`] is exactly what a walk of the uploaded tree
//! observes. [`FsImage::archive`] packs it into a tar stream that is uploaded
//! to `/` before the container starts.
//!
//! Only the container substrate uploads the image. The container engine still
//! mounts its own pseudo-filesystems (`/proc`, `/sys`, extra `/dev` nodes) and
//! its `/etc/hostname`, `/etc/hosts` and `/etc/resolv.conf` over the image, and
//! the base image should be empty (`FROM scratch`) to add nothing further.

use std::io;

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use tar::{Builder, EntryType, Header};

use crate::error::{FilesystemError, PlayError};

/// Path of the program executable inside the sandbox.
pub const EXECUTABLE_PATH: &str = "/usr/local/go/prog";

const ZONEINFO_IN_GOROOT: &str = "lib/time/zoneinfo.zip";
const DIRECTORY_MODE: u32 = 0o755;
const STICKY_DIRECTORY_MODE: u32 = 0o1777;
const FILE_MODE: u32 = 0o644;
const EXECUTABLE_MODE: u32 = 0o755;
const DEVICE_MODE: u32 = 0o666;

/// Kind of one entry in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A directory.
    Directory {
        /// Permission bits.
        mode: u32,
    },
    /// A character device node.
    CharDevice {
        /// Device major number.
        major: u32,
        /// Device minor number.
        minor: u32,
    },
    /// A regular file with fixed contents.
    File(&'static str),
    /// The time-zone database copied from `GOROOT`.
    ZoneInfo,
    /// The program executable.
    Executable,
}

/// One entry of the image, in walk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageEntry {
    /// Absolute path inside the sandbox.
    pub path: &'static str,
    /// What lives at the path.
    pub kind: EntryKind,
}

const fn dir(path: &'static str) -> ImageEntry {
    ImageEntry {
        path,
        kind: EntryKind::Directory {
            mode: DIRECTORY_MODE,
        },
    }
}

const fn device(path: &'static str, major: u32, minor: u32) -> ImageEntry {
    ImageEntry {
        path,
        kind: EntryKind::CharDevice { major, minor },
    }
}

const fn file(path: &'static str, contents: &'static str) -> ImageEntry {
    ImageEntry {
        path,
        kind: EntryKind::File(contents),
    }
}

/// Every entry of the image, in lexical walk order.
pub const ENTRIES: [ImageEntry; 19] = [
    dir("/"),
    dir("/dev"),
    device("/dev/null", 1, 3),
    device("/dev/random", 1, 8),
    device("/dev/urandom", 1, 9),
    device("/dev/zero", 1, 5),
    dir("/etc"),
    file("/etc/group", "root:x:0:\nnobody:x:65534:\n"),
    file("/etc/hosts", "127.0.0.1\tlocalhost\n::1\tlocalhost ip6-localhost ip6-loopback\n"),
    file(
        "/etc/passwd",
        "root:x:0:0:root:/root:/sbin/nologin\nnobody:x:65534:65534:nobody:/:/sbin/nologin\n",
    ),
    file("/etc/resolv.conf", "nameserver 127.0.0.1\n"),
    ImageEntry {
        path: "/tmp",
        kind: EntryKind::Directory {
            mode: STICKY_DIRECTORY_MODE,
        },
    },
    dir("/usr"),
    dir("/usr/local"),
    dir("/usr/local/go"),
    dir("/usr/local/go/lib"),
    dir("/usr/local/go/lib/time"),
    ImageEntry {
        path: "/usr/local/go/lib/time/zoneinfo.zip",
        kind: EntryKind::ZoneInfo,
    },
    ImageEntry {
        path: EXECUTABLE_PATH,
        kind: EntryKind::Executable,
    },
];

/// Return the image paths in walk order.
#[must_use]
pub fn paths() -> impl Iterator<Item = &'static str> {
    ENTRIES.iter().map(|entry| entry.path)
}

/// The synthetic filesystem with its time-zone database loaded.
#[derive(Clone, PartialEq, Eq)]
pub struct FsImage {
    zoneinfo: Vec<u8>,
}

impl std::fmt::Debug for FsImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsImage")
            .field("zoneinfo_bytes", &self.zoneinfo.len())
            .finish()
    }
}

impl FsImage {
    /// Create an image around an already loaded time-zone database.
    #[must_use]
    pub const fn new(zoneinfo: Vec<u8>) -> Self {
        Self { zoneinfo }
    }

    /// Load the time-zone database from `goroot`.
    ///
    /// # Errors
    ///
    /// Returns [`FilesystemError`] when `goroot` or its `zoneinfo.zip` cannot
    /// be read.
    pub fn from_goroot(goroot: &Utf8Path) -> Result<Self, PlayError> {
        let root = Dir::open_ambient_dir(goroot, ambient_authority())
            .map_err(|error| FilesystemError::from_io(goroot.as_std_path(), &error))?;
        let zoneinfo = root.read(ZONEINFO_IN_GOROOT).map_err(|error| {
            FilesystemError::from_io(goroot.join(ZONEINFO_IN_GOROOT).into_std_path_buf(), &error)
        })?;
        Ok(Self::new(zoneinfo))
    }

    /// Pack the image, with `executable` at [`EXECUTABLE_PATH`], into a tar
    /// stream rooted at `/`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a tar header cannot be encoded.
    pub fn archive(&self, executable: &[u8]) -> io::Result<Vec<u8>> {
        let mut builder = Builder::new(vec![]);
        for entry in &ENTRIES {
            let relative = entry.path.trim_start_matches('/');
            if relative.is_empty() {
                continue;
            }
            match entry.kind {
                EntryKind::Directory { mode } => append_directory(&mut builder, relative, mode)?,
                EntryKind::CharDevice { major, minor } => {
                    append_device(&mut builder, relative, major, minor)?;
                }
                EntryKind::File(contents) => {
                    append_file(&mut builder, relative, contents.as_bytes(), FILE_MODE)?;
                }
                EntryKind::ZoneInfo => {
                    append_file(&mut builder, relative, &self.zoneinfo, FILE_MODE)?;
                }
                EntryKind::Executable => {
                    append_file(&mut builder, relative, executable, EXECUTABLE_MODE)?;
                }
            }
        }
        builder.finish()?;
        builder.into_inner()
    }
}

/// Start a header with every numeric field populated; readers reject the
/// NUL-filled device fields `Header::new_gnu` leaves behind.
fn base_header(entry_type: EntryType, mode: u32) -> io::Result<Header> {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_device_major(0)?;
    header.set_device_minor(0)?;
    Ok(header)
}

fn append_directory(builder: &mut Builder<Vec<u8>>, path: &str, mode: u32) -> io::Result<()> {
    let mut header = base_header(EntryType::Directory, mode)?;
    header.set_size(0);
    header.set_cksum();
    builder.append_data(&mut header, format!("{path}/"), io::empty())
}

fn append_device(
    builder: &mut Builder<Vec<u8>>,
    path: &str,
    major: u32,
    minor: u32,
) -> io::Result<()> {
    let mut header = base_header(EntryType::Char, DEVICE_MODE)?;
    header.set_size(0);
    header.set_device_major(major)?;
    header.set_device_minor(minor)?;
    header.set_cksum();
    builder.append_data(&mut header, path, io::empty())
}

fn append_file(
    builder: &mut Builder<Vec<u8>>,
    path: &str,
    contents: &[u8],
    mode: u32,
) -> io::Result<()> {
    let mut header = base_header(EntryType::Regular, mode)?;
    header.set_size(u64::try_from(contents.len()).unwrap_or(u64::MAX));
    header.set_cksum();
    builder.append_data(&mut header, path, contents)
}
