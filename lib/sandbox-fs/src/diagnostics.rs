//! Side channel for what the file system did and why.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::{EntryKind, Rejection};

/// Something worth knowing about that does not change the result of a call.
#[derive(Debug)]
pub enum FsEvent<'a> {
    Opened {
        guest_path: &'a str,
        host_path: Option<&'a Path>,
        kind: EntryKind,
    },
    Created {
        host_path: &'a Path,
        kind: EntryKind,
    },
    Rejected {
        guest_path: &'a str,
        reason: Rejection,
    },
    /// An unlink was requested. `host_path` is `None` without a sandbox root.
    Unlinked {
        guest_path: &'a str,
        host_path: Option<&'a Path>,
    },
    UnlinkFailed {
        host_path: &'a Path,
        error: &'a io::Error,
    },
    /// The unlink was not attempted at all.
    UnlinkSkipped {
        guest_path: &'a str,
        reason: Rejection,
    },
}

/// Receives [`FsEvent`]s from a [`SandboxFs`](crate::SandboxFs).
pub trait Diagnostics: fmt::Debug + Send + Sync {
    fn record(&self, event: &FsEvent<'_>);
}

/// Forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn record(&self, event: &FsEvent<'_>) {
        match event {
            FsEvent::Opened {
                guest_path,
                host_path,
                kind,
            } => tracing::trace!(%guest_path, ?host_path, ?kind, "opened"),
            FsEvent::Created { host_path, kind } => {
                tracing::trace!(?host_path, ?kind, "created host entry")
            }
            FsEvent::Rejected { guest_path, reason } => {
                tracing::debug!(%guest_path, %reason, "open rejected")
            }
            FsEvent::Unlinked {
                guest_path,
                host_path: None,
            } => tracing::info!(%guest_path, "unlink without a sandbox root"),
            FsEvent::Unlinked {
                guest_path,
                host_path: Some(host_path),
            } => tracing::debug!(%guest_path, ?host_path, "unlink"),
            FsEvent::UnlinkFailed { host_path, error } => {
                tracing::debug!(?host_path, %error, "unlink failed, ignoring")
            }
            FsEvent::UnlinkSkipped { guest_path, reason } => {
                tracing::debug!(%guest_path, %reason, "unlink skipped")
            }
        }
    }
}

/// An owned copy of an [`FsEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    Opened {
        guest_path: String,
        host_path: Option<PathBuf>,
        kind: EntryKind,
    },
    Created {
        host_path: PathBuf,
        kind: EntryKind,
    },
    Rejected {
        guest_path: String,
        reason: Rejection,
    },
    Unlinked {
        guest_path: String,
        host_path: Option<PathBuf>,
    },
    UnlinkFailed {
        host_path: PathBuf,
        error: io::ErrorKind,
    },
    UnlinkSkipped {
        guest_path: String,
        reason: Rejection,
    },
}

impl From<&FsEvent<'_>> for RecordedEvent {
    fn from(event: &FsEvent<'_>) -> Self {
        match *event {
            FsEvent::Opened {
                guest_path,
                host_path,
                kind,
            } => RecordedEvent::Opened {
                guest_path: guest_path.to_owned(),
                host_path: host_path.map(Path::to_owned),
                kind,
            },
            FsEvent::Created { host_path, kind } => RecordedEvent::Created {
                host_path: host_path.to_owned(),
                kind,
            },
            FsEvent::Rejected { guest_path, reason } => RecordedEvent::Rejected {
                guest_path: guest_path.to_owned(),
                reason,
            },
            FsEvent::Unlinked {
                guest_path,
                host_path,
            } => RecordedEvent::Unlinked {
                guest_path: guest_path.to_owned(),
                host_path: host_path.map(Path::to_owned),
            },
            FsEvent::UnlinkFailed { host_path, error } => RecordedEvent::UnlinkFailed {
                host_path: host_path.to_owned(),
                error: error.kind(),
            },
            FsEvent::UnlinkSkipped { guest_path, reason } => RecordedEvent::UnlinkSkipped {
                guest_path: guest_path.to_owned(),
                reason,
            },
        }
    }
}

/// Keeps every event in memory, mostly useful for tests and tooling.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<RecordedEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn record(&self, event: &FsEvent<'_>) {
        self.events.lock().push(event.into());
    }
}

impl<D: Diagnostics + ?Sized> Diagnostics for std::sync::Arc<D> {
    fn record(&self, event: &FsEvent<'_>) {
        (**self).record(event)
    }
}
