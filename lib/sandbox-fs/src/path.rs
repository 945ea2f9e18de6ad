//! Guest path resolution.
//!
//! Guest paths are untrusted. They are normalized lexically and then checked
//! against the canonical sandbox root, so neither `..` segments nor symlinks
//! can make an operation reach outside of the sandbox.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::Rejection;

#[derive(Debug, Clone)]
pub(crate) struct SandboxRoot {
    root: PathBuf,
    canonical: PathBuf,
}

impl SandboxRoot {
    /// The root must already exist on the host.
    pub(crate) fn new(root: PathBuf) -> io::Result<Self> {
        let canonical = dunce::canonicalize(&root)?;
        Ok(Self { root, canonical })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.root
    }

    /// Maps a guest path to the host path it names under the root.
    pub(crate) fn resolve(&self, guest_path: &str) -> Result<PathBuf, Rejection> {
        let relative = normalize_guest_path(Path::new(guest_path))?;
        let host_path = self.root.join(relative);

        debug_assert!(host_path.starts_with(&self.root));
        self.check_containment(&host_path)?;
        Ok(host_path)
    }

    /// Like [`SandboxRoot::resolve`], but the last component is not followed,
    /// so a symlink names the link itself. The root is not an entry.
    pub(crate) fn resolve_entry(&self, guest_path: &str) -> Result<PathBuf, Rejection> {
        let relative = normalize_guest_path(Path::new(guest_path))?;
        if relative.as_os_str().is_empty() {
            return Err(Rejection::EscapesSandbox);
        }
        let host_path = self.root.join(relative);

        if let Some(parent) = host_path.parent() {
            self.check_containment(parent)?;
        }
        Ok(host_path)
    }

    fn check_containment(&self, host_path: &Path) -> Result<(), Rejection> {
        let mut probe = host_path;
        // `symlink_metadata` so that a dangling link still counts as present.
        while fs::symlink_metadata(probe).is_err() {
            probe = match probe.parent() {
                Some(parent) if parent.starts_with(&self.root) => parent,
                _ => return Err(Rejection::NotFound),
            };
        }

        match dunce::canonicalize(probe) {
            Ok(canonical) if canonical.starts_with(&self.canonical) => Ok(()),
            Ok(_) => Err(Rejection::EscapesSandbox),
            Err(_) => Err(Rejection::NotFound),
        }
    }
}

/// Turns a guest path into a relative host path, resolving `.` and `..`.
///
/// Climbing above the guest root is rejected instead of being clamped.
pub(crate) fn normalize_guest_path(path: &Path) -> Result<PathBuf, Rejection> {
    let mut ret = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(..) => return Err(Rejection::EscapesSandbox),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if !ret.pop() {
                    return Err(Rejection::EscapesSandbox);
                }
            }
            Component::Normal(c) => ret.push(c),
        }
    }
    Ok(ret)
}
