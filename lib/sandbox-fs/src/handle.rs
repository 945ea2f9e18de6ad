use std::fmt;
use std::path::{Path, PathBuf};

use crate::OpenFlags;

/// The kind of resource an open handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
    Stdin,
    Stdout,
    Stderr,
}

/// Produces the open-file objects handed back to the emulation layer.
///
/// The file system only decides *what* gets opened; the factory owns
/// everything the handle needs beyond that (emulator state, read/write
/// behaviour, append handling for the standard streams).
pub trait HandleFactory: fmt::Debug + Send + Sync {
    type Handle;

    fn for_file(&self, host_path: &Path, flags: OpenFlags, guest_path: &str) -> Self::Handle;

    fn for_directory(&self, host_path: &Path, flags: OpenFlags, guest_path: &str)
    -> Self::Handle;

    fn for_stdin(&self, flags: OpenFlags) -> Self::Handle;

    /// `is_error` distinguishes `stderr` from `stdout`.
    fn for_std_stream(
        &self,
        host_path: &Path,
        flags: OpenFlags,
        guest_path: &str,
        is_error: bool,
    ) -> Self::Handle;
}

/// A description of an opened resource, as produced by [`HostHandleFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handle {
    File {
        host_path: PathBuf,
        guest_path: String,
        flags: OpenFlags,
    },
    Directory {
        host_path: PathBuf,
        guest_path: String,
        flags: OpenFlags,
    },
    Stdin {
        flags: OpenFlags,
    },
    StdStream {
        host_path: PathBuf,
        guest_path: String,
        flags: OpenFlags,
        is_error: bool,
    },
}

impl Handle {
    pub fn kind(&self) -> EntryKind {
        match self {
            Handle::File { .. } => EntryKind::File,
            Handle::Directory { .. } => EntryKind::Directory,
            Handle::Stdin { .. } => EntryKind::Stdin,
            Handle::StdStream { is_error: false, .. } => EntryKind::Stdout,
            Handle::StdStream { is_error: true, .. } => EntryKind::Stderr,
        }
    }

    /// The backing host path, `None` for `stdin`.
    pub fn host_path(&self) -> Option<&Path> {
        match self {
            Handle::File { host_path, .. }
            | Handle::Directory { host_path, .. }
            | Handle::StdStream { host_path, .. } => Some(host_path),
            Handle::Stdin { .. } => None,
        }
    }

    pub fn flags(&self) -> OpenFlags {
        match self {
            Handle::File { flags, .. }
            | Handle::Directory { flags, .. }
            | Handle::Stdin { flags }
            | Handle::StdStream { flags, .. } => *flags,
        }
    }
}

/// The default factory. It records what was opened and performs no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostHandleFactory;

impl HandleFactory for HostHandleFactory {
    type Handle = Handle;

    fn for_file(&self, host_path: &Path, flags: OpenFlags, guest_path: &str) -> Handle {
        Handle::File {
            host_path: host_path.to_owned(),
            guest_path: guest_path.to_owned(),
            flags,
        }
    }

    fn for_directory(&self, host_path: &Path, flags: OpenFlags, guest_path: &str) -> Handle {
        Handle::Directory {
            host_path: host_path.to_owned(),
            guest_path: guest_path.to_owned(),
            flags,
        }
    }

    fn for_stdin(&self, flags: OpenFlags) -> Handle {
        Handle::Stdin { flags }
    }

    fn for_std_stream(
        &self,
        host_path: &Path,
        flags: OpenFlags,
        guest_path: &str,
        is_error: bool,
    ) -> Handle {
        Handle::StdStream {
            host_path: host_path.to_owned(),
            guest_path: guest_path.to_owned(),
            flags,
            is_error,
        }
    }
}
