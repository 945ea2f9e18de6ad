use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::path::{SandboxRoot, normalize_guest_path};
use crate::{
    Diagnostics, EntryKind, FsError, FsEvent, Handle, HandleFactory, HostHandleFactory,
    LinuxFlags, OpenFlags, OpenFlagsAbi, Rejection, Result, STDERR, STDIN, STDOUT, SandboxConfig,
    TracingDiagnostics,
};

/// The guest file system, backed by a directory on the host.
///
/// Every call goes straight to the host file system; nothing about the
/// directory tree is cached.
#[derive(Debug)]
pub struct SandboxFs<H = Handle> {
    config: SandboxConfig,
    root: Option<SandboxRoot>,
    /// `config.work_dir`, validated and relative to the root.
    work_dir: PathBuf,
    abi: Box<dyn OpenFlagsAbi>,
    handles: Box<dyn HandleFactory<Handle = H>>,
    diagnostics: Arc<dyn Diagnostics>,
    /// Held from the existence check until the entry has been created.
    create_lock: Mutex<()>,
}

impl SandboxFs<Handle> {
    pub fn builder() -> SandboxFsBuilder<Handle> {
        SandboxFsBuilder::default()
    }
}

impl<H> SandboxFs<H> {
    /// Sets up the sandbox described by `config`.
    ///
    /// With a root, `<root>/<tmp_dir>` is created together with any missing
    /// parent; failing to do so fails the whole construction. So does a
    /// `tmp_dir` or `work_dir` that does not name a directory below the root.
    pub fn new(
        config: SandboxConfig,
        abi: impl OpenFlagsAbi + 'static,
        handles: impl HandleFactory<Handle = H> + 'static,
        diagnostics: impl Diagnostics + 'static,
    ) -> Result<Self> {
        Self::from_parts(
            config,
            Box::new(abi),
            Box::new(handles),
            Arc::new(diagnostics),
        )
    }

    fn from_parts(
        config: SandboxConfig,
        abi: Box<dyn OpenFlagsAbi>,
        handles: Box<dyn HandleFactory<Handle = H>>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Result<Self> {
        let (root, work_dir) = match config.root() {
            Some(root) => {
                let work_dir = layout_dir(root, &config.work_dir)?;
                (Some(initialize(root, &config)?), work_dir)
            }
            None => (None, PathBuf::new()),
        };

        Ok(Self {
            config,
            root,
            work_dir,
            abi,
            handles,
            diagnostics,
            create_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// The sandbox root, `None` when running without one.
    pub fn root_dir(&self) -> Option<&Path> {
        self.root.as_ref().map(SandboxRoot::path)
    }

    /// Opens `path` on behalf of the guest.
    ///
    /// `stdin` is always available. Every other path needs a sandbox root:
    /// `stdout` and `stderr` are backed by files in the root, anything else
    /// is resolved below it. A missing entry is only created when the flags
    /// ask for it and its parent directory exists, and an existing entry is
    /// only opened when its type matches what the guest expects.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn open(&self, path: &str, flags: u32) -> Result<H> {
        let flags = self.abi.decode(flags);

        if path == STDIN {
            self.opened(path, None, EntryKind::Stdin);
            return Ok(self.handles.for_stdin(flags));
        }

        let Some(root) = &self.root else {
            return Err(self.reject(path, Rejection::NoSandbox));
        };

        if path == STDOUT || path == STDERR {
            return self.open_std_stream(root, path, flags);
        }

        let host_path = root
            .resolve(path)
            .map_err(|reason| self.reject(path, reason))?;
        self.open_entry(&host_path, path, flags)
    }

    fn open_std_stream(&self, root: &SandboxRoot, path: &str, flags: OpenFlags) -> Result<H> {
        let is_error = path == STDERR;
        let kind = if is_error {
            EntryKind::Stderr
        } else {
            EntryKind::Stdout
        };
        let host_path = root.path().join(self.config.stdio_file_name(path));

        let created = {
            let _guard = self.create_lock.lock();
            let missing = !host_path.exists();
            if missing {
                create_entry(&host_path, kind).map_err(|source| FsError::Create {
                    path: host_path.clone(),
                    source,
                })?;
            }
            missing
        };

        if created {
            self.created(&host_path, kind);
        }
        self.opened(path, Some(&host_path), kind);
        Ok(self.handles.for_std_stream(&host_path, flags, path, is_error))
    }

    fn open_entry(&self, host_path: &Path, path: &str, flags: OpenFlags) -> Result<H> {
        let prepared = {
            let _guard = self.create_lock.lock();
            prepare_entry(host_path, flags)
        };

        let (kind, created) = prepared.map_err(|err| match err.rejection() {
            Some(reason) => self.reject(path, reason),
            None => err,
        })?;

        if created {
            self.created(host_path, kind);
        }
        self.opened(path, Some(host_path), kind);
        Ok(match kind {
            EntryKind::Directory => self.handles.for_directory(host_path, flags, path),
            _ => self.handles.for_file(host_path, flags, path),
        })
    }

    /// Removes `path` from the sandbox, recursively for directories.
    ///
    /// This never fails: a missing entry, a permission problem or a partial
    /// recursive delete are only reported to the diagnostics sink. Paths that
    /// resolve outside of the sandbox, and the root itself, are left alone.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn unlink(&self, path: &str) {
        let Some(root) = &self.root else {
            self.diagnostics.record(&FsEvent::Unlinked {
                guest_path: path,
                host_path: None,
            });
            return;
        };

        let host_path = match root.resolve_entry(path) {
            Ok(host_path) => host_path,
            Err(reason) => {
                self.diagnostics.record(&FsEvent::UnlinkSkipped {
                    guest_path: path,
                    reason,
                });
                return;
            }
        };

        self.diagnostics.record(&FsEvent::Unlinked {
            guest_path: path,
            host_path: Some(&host_path),
        });

        let removed = match fs::symlink_metadata(&host_path) {
            Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(&host_path),
            Ok(_) => fs::remove_file(&host_path),
            // Nothing to delete.
            Err(_) => return,
        };
        if let Err(error) = removed {
            self.diagnostics.record(&FsEvent::UnlinkFailed {
                host_path: &host_path,
                error: &error,
            });
        }
    }

    /// Returns the scratch directory under the root, creating it if needed.
    ///
    /// `Ok(None)` without a sandbox root. Calling this repeatedly is fine.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn create_work_dir(&self) -> Result<Option<PathBuf>> {
        let Some(root) = &self.root else {
            return Ok(None);
        };

        let work_dir = root.path().join(&self.work_dir);
        let created = {
            let _guard = self.create_lock.lock();
            let missing = !work_dir.is_dir();
            if missing {
                fs::create_dir_all(&work_dir).map_err(|source| FsError::Create {
                    path: work_dir.clone(),
                    source,
                })?;
            }
            missing
        };

        if created {
            self.created(&work_dir, EntryKind::Directory);
        }
        Ok(Some(work_dir))
    }

    fn opened(&self, guest_path: &str, host_path: Option<&Path>, kind: EntryKind) {
        self.diagnostics.record(&FsEvent::Opened {
            guest_path,
            host_path,
            kind,
        });
    }

    fn created(&self, host_path: &Path, kind: EntryKind) {
        self.diagnostics.record(&FsEvent::Created { host_path, kind });
    }

    fn reject(&self, guest_path: &str, reason: Rejection) -> FsError {
        self.diagnostics.record(&FsEvent::Rejected { guest_path, reason });
        reason.into()
    }
}

/// Checks an entry against the open flags and creates it when it is missing.
///
/// Returns the entry kind and whether it was created. Must run under the
/// create lock; rejections are returned unrecorded.
fn prepare_entry(host_path: &Path, flags: OpenFlags) -> Result<(EntryKind, bool)> {
    match fs::metadata(host_path) {
        Ok(metadata) if metadata.is_dir() => {
            if !flags.directory() {
                return Err(Rejection::IsADirectory.into());
            }
            Ok((EntryKind::Directory, false))
        }
        Ok(_) => {
            if flags.directory() {
                return Err(Rejection::NotADirectory.into());
            }
            Ok((EntryKind::File, false))
        }
        Err(_) => {
            if !flags.create() {
                return Err(Rejection::NotFound.into());
            }
            match host_path.parent().map(fs::metadata) {
                Some(Ok(parent)) if parent.is_dir() => {}
                Some(Ok(_)) => return Err(Rejection::NotADirectory.into()),
                _ => return Err(Rejection::ParentMissing.into()),
            }

            let kind = if flags.directory() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            if let Err(source) = create_entry(host_path, kind) {
                return Err(match Rejection::from_host_error(&source) {
                    Some(reason) => reason.into(),
                    None => FsError::Create {
                        path: host_path.to_owned(),
                        source,
                    },
                });
            }
            Ok((kind, true))
        }
    }
}

/// Creates an empty directory or regular file. The entry must not exist yet.
fn create_entry(host_path: &Path, kind: EntryKind) -> io::Result<()> {
    match kind {
        EntryKind::Directory => fs::create_dir(host_path),
        _ => fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(host_path)
            .map(drop),
    }
}

/// Validates a layout directory from the configuration.
///
/// It has to name a directory strictly below the root, so absolute paths and
/// `..` segments climbing out of the root are refused.
fn layout_dir(root: &Path, dir: &Path) -> Result<PathBuf> {
    let invalid = |message: &'static str| FsError::Initialize {
        path: root.join(dir),
        source: io::Error::new(io::ErrorKind::InvalidInput, message),
    };

    if dir.has_root() {
        return Err(invalid("layout directory must be relative to the sandbox root"));
    }
    match normalize_guest_path(dir) {
        Ok(relative) if !relative.as_os_str().is_empty() => Ok(relative),
        Ok(_) => Err(invalid("layout directory must not be the sandbox root")),
        Err(_) => Err(invalid("layout directory escapes the sandbox root")),
    }
}

fn initialize(root: &Path, config: &SandboxConfig) -> Result<SandboxRoot> {
    let tmp_dir = root.join(layout_dir(root, &config.tmp_dir)?);
    fs::create_dir_all(&tmp_dir).map_err(|source| FsError::Initialize {
        path: tmp_dir,
        source,
    })?;

    SandboxRoot::new(root.to_owned()).map_err(|source| FsError::Initialize {
        path: root.to_owned(),
        source,
    })
}

/// Assembles a [`SandboxFs`].
///
/// Defaults to no root, [`LinuxFlags`], [`HostHandleFactory`] and
/// [`TracingDiagnostics`].
#[derive(Debug)]
pub struct SandboxFsBuilder<H = Handle> {
    config: SandboxConfig,
    abi: Box<dyn OpenFlagsAbi>,
    handles: Box<dyn HandleFactory<Handle = H>>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl Default for SandboxFsBuilder<Handle> {
    fn default() -> Self {
        Self {
            config: SandboxConfig::default(),
            abi: Box::new(LinuxFlags),
            handles: Box::new(HostHandleFactory),
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }
}

impl<H> SandboxFsBuilder<H> {
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.root = Some(root.into());
        self
    }

    /// Replaces the whole configuration, including the root.
    pub fn config(mut self, config: SandboxConfig) -> Self {
        self.config = config;
        self
    }

    pub fn abi(mut self, abi: impl OpenFlagsAbi + 'static) -> Self {
        self.abi = Box::new(abi);
        self
    }

    pub fn diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Switches to another handle factory, and with it the handle type.
    pub fn handles<F>(self, handles: F) -> SandboxFsBuilder<F::Handle>
    where
        F: HandleFactory + 'static,
    {
        SandboxFsBuilder {
            config: self.config,
            abi: self.abi,
            handles: Box::new(handles),
            diagnostics: self.diagnostics,
        }
    }

    pub fn build(self) -> Result<SandboxFs<H>> {
        SandboxFs::from_parts(self.config, self.abi, self.handles, self.diagnostics)
    }
}
