use std::path::{Path, PathBuf};

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// Layout of a sandbox on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "enable-serde", serde(default))]
pub struct SandboxConfig {
    /// Host directory the guest sees as `/`. `None` runs without a file system.
    pub root: Option<PathBuf>,
    /// Scratch directory created under the root when the sandbox is set up.
    pub tmp_dir: PathBuf,
    /// Directory handed out by [`SandboxFs::create_work_dir`](crate::SandboxFs::create_work_dir).
    pub work_dir: PathBuf,
    /// Extension of the host files backing `stdout` and `stderr`.
    pub stdio_extension: String,
}

impl SandboxConfig {
    pub const DEFAULT_TMP_DIR: &'static str = "tmp";
    pub const DEFAULT_WORK_DIR: &'static str = "sandbox_work";
    pub const DEFAULT_STDIO_EXTENSION: &'static str = "txt";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }

    /// A configuration without a sandbox root.
    pub fn rootless() -> Self {
        Self::default()
    }

    pub fn with_tmp_dir(mut self, tmp_dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = tmp_dir.into();
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_stdio_extension(mut self, extension: impl Into<String>) -> Self {
        self.stdio_extension = extension.into();
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Host file name backing a standard stream, e.g. `stdout.txt`.
    pub(crate) fn stdio_file_name(&self, stream: &str) -> String {
        if self.stdio_extension.is_empty() {
            stream.to_owned()
        } else {
            format!("{stream}.{}", self.stdio_extension)
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: None,
            tmp_dir: PathBuf::from(Self::DEFAULT_TMP_DIR),
            work_dir: PathBuf::from(Self::DEFAULT_WORK_DIR),
            stdio_extension: Self::DEFAULT_STDIO_EXTENSION.to_owned(),
        }
    }
}
