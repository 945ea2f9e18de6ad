//! A guest-to-host file system boundary for process emulators.
//!
//! [`SandboxFs`] intercepts the path based file operations issued by
//! emulated code and resolves them against a host directory (the sandbox
//! root). Open flags are decoded through an [`OpenFlagsAbi`] matching the
//! guest operating system, and the actual handle objects are produced by a
//! [`HandleFactory`]. The standard streams are virtualized: `stdin` is always
//! available, while `stdout` and `stderr` are backed by plain files under the
//! sandbox root.
//!
//! ```rust,ignore
//! use sandbox_fs::{LinuxFlags, SandboxFs};
//!
//! let fs = SandboxFs::builder().root("/tmp/guest-root").abi(LinuxFlags).build()?;
//! let handle = fs.open("/data/app.db", 0o100)?;
//! ```

use std::io;
use std::path::PathBuf;
use thiserror::Error;

mod config;
mod diagnostics;
mod filesystem;
mod flags;
mod handle;
mod path;

pub use config::SandboxConfig;
pub use diagnostics::{
    Diagnostics, FsEvent, RecordedEvent, RecordingDiagnostics, TracingDiagnostics,
};
pub use filesystem::{SandboxFs, SandboxFsBuilder};
pub use flags::{DarwinFlags, FlagPredicates, LinuxFlags, OpenFlags, OpenFlagsAbi};
pub use handle::{EntryKind, Handle, HandleFactory, HostHandleFactory};

/// Guest path naming the standard input stream.
pub const STDIN: &str = "stdin";
/// Guest path naming the standard output stream.
pub const STDOUT: &str = "stdout";
/// Guest path naming the standard error stream.
pub const STDERR: &str = "stderr";

/// Result type returned by every fallible [`SandboxFs`] operation.
pub type Result<T> = std::result::Result<T, FsError>;

/// Why a guest request was refused.
///
/// These are expected outcomes of the open policy; the emulation layer is
/// supposed to turn them into the guest's own error code, see
/// [`Rejection::errno`].
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// There is no sandbox root, so there is no file system to resolve against
    #[error("no sandbox root configured")]
    NoSandbox,
    /// The entry does not exist and creating it was not requested
    #[error("entry not found")]
    NotFound,
    /// Creation was requested but the parent directory does not exist
    #[error("parent directory does not exist")]
    ParentMissing,
    /// The entry is a directory but a regular file was expected
    #[error("entry is a directory")]
    IsADirectory,
    /// The entry is a regular file but a directory was expected
    #[error("entry is not a directory")]
    NotADirectory,
    /// The guest path resolves outside of the sandbox root
    #[error("path escapes the sandbox root")]
    EscapesSandbox,
    /// The host refused a name from the guest path as too long
    #[error("file name too long")]
    NameTooLong,
    /// The guest path contains something the host cannot name, such as a NUL byte
    #[error("invalid file name")]
    InvalidName,
}

impl Rejection {
    /// The native errno a guest should observe for this rejection.
    pub const fn errno(self) -> i32 {
        match self {
            Rejection::NoSandbox | Rejection::NotFound | Rejection::ParentMissing => libc::ENOENT,
            Rejection::IsADirectory => libc::EISDIR,
            Rejection::NotADirectory => libc::ENOTDIR,
            Rejection::EscapesSandbox => libc::EACCES,
            Rejection::NameTooLong => libc::ENAMETOOLONG,
            Rejection::InvalidName => libc::EINVAL,
        }
    }

    /// Host errors caused by the shape of the guest path rather than by the host.
    pub(crate) fn from_host_error(error: &io::Error) -> Option<Self> {
        match error.kind() {
            io::ErrorKind::InvalidFilename => Some(Rejection::NameTooLong),
            io::ErrorKind::InvalidInput => Some(Rejection::InvalidName),
            _ => None,
        }
    }
}

/// Error type for external users
#[derive(Error, Debug)]
pub enum FsError {
    /// The request was refused by the open policy. The guest can recover from this.
    #[error(transparent)]
    Rejected(#[from] Rejection),
    /// The sandbox layout could not be created while constructing the file system
    #[error("failed to initialize the sandbox at {}", .path.display())]
    Initialize {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A host entry could not be created even though the policy allowed it.
    /// This points at an inconsistent or exhausted host file system.
    #[error("failed to create {}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Whether the error is an unrecoverable host failure rather than a policy rejection.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FsError::Rejected(_))
    }

    /// The rejection reason, if this is a soft failure.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            FsError::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}
