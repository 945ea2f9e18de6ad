use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use pretty_assertions::assert_eq;
use sandbox_fs::{
    DarwinFlags, EntryKind, FlagPredicates, HandleFactory, LinuxFlags, OpenFlags,
    RecordedEvent, RecordingDiagnostics, Rejection, STDERR, STDIN, STDOUT, SandboxConfig,
    SandboxFs,
};
use tempfile::TempDir;

/// Hands out file descriptors the way an emulator's fd table would.
#[derive(Debug, Default)]
struct FdFactory {
    next_fd: AtomicU32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GuestFd {
    fd: u32,
    kind: EntryKind,
    host_path: Option<PathBuf>,
    append: bool,
}

impl FdFactory {
    fn fd(&self, kind: EntryKind, host_path: Option<&Path>, flags: OpenFlags) -> GuestFd {
        GuestFd {
            fd: self.next_fd.fetch_add(1, Ordering::SeqCst) + 3,
            kind,
            host_path: host_path.map(Path::to_owned),
            append: flags.append(),
        }
    }
}

impl HandleFactory for FdFactory {
    type Handle = GuestFd;

    fn for_file(&self, host_path: &Path, flags: OpenFlags, _guest_path: &str) -> GuestFd {
        self.fd(EntryKind::File, Some(host_path), flags)
    }

    fn for_directory(&self, host_path: &Path, flags: OpenFlags, _guest_path: &str) -> GuestFd {
        self.fd(EntryKind::Directory, Some(host_path), flags)
    }

    fn for_stdin(&self, flags: OpenFlags) -> GuestFd {
        self.fd(EntryKind::Stdin, None, flags)
    }

    fn for_std_stream(
        &self,
        host_path: &Path,
        flags: OpenFlags,
        _guest_path: &str,
        is_error: bool,
    ) -> GuestFd {
        let kind = if is_error {
            EntryKind::Stderr
        } else {
            EntryKind::Stdout
        };
        self.fd(kind, Some(host_path), flags)
    }
}

fn darwin_sandbox(root: &Path) -> SandboxFs<GuestFd> {
    SandboxFs::builder()
        .root(root)
        .abi(DarwinFlags)
        .handles(FdFactory::default())
        .build()
        .expect("create sandbox")
}

#[test]
fn missing_entry_without_create_is_not_found() {
    let temp = TempDir::new().unwrap();
    let fs = darwin_sandbox(temp.path());

    for path in ["/nope", "nope", "/tmp/nope", "/a/b/c", "./x/../y"] {
        let err = fs.open(path, DarwinFlags::O_APPEND).unwrap_err();
        assert_eq!(err.rejection(), Some(Rejection::NotFound), "{path}");
    }
}

#[test]
fn type_mismatch_is_rejected_both_ways() {
    let temp = TempDir::new().unwrap();
    let fs = darwin_sandbox(temp.path());
    std::fs::create_dir(temp.path().join("dir")).unwrap();
    std::fs::write(temp.path().join("file"), b"contents").unwrap();

    let is_dir = fs.open("/dir", DarwinFlags::O_CREAT).unwrap_err();
    let not_dir = fs
        .open("/file", DarwinFlags::O_DIRECTORY | DarwinFlags::O_CREAT)
        .unwrap_err();

    assert!(!is_dir.is_fatal());
    assert_eq!(is_dir.rejection(), Some(Rejection::IsADirectory));
    assert_eq!(not_dir.rejection(), Some(Rejection::NotADirectory));
    assert_eq!(
        std::fs::read(temp.path().join("file")).unwrap(),
        b"contents",
        "a rejected open leaves the entry alone"
    );
}

#[test]
fn create_directory_with_existing_parent() {
    let temp = TempDir::new().unwrap();
    let fs = darwin_sandbox(temp.path());

    let handle = fs
        .open("/tmp/cache", DarwinFlags::O_CREAT | DarwinFlags::O_DIRECTORY)
        .unwrap();

    assert_eq!(handle.kind, EntryKind::Directory);
    assert!(temp.path().join("tmp/cache").is_dir());

    let again = fs.open("/tmp/cache", DarwinFlags::O_DIRECTORY).unwrap();
    assert_eq!(again.kind, EntryKind::Directory);
    assert_ne!(again.fd, handle.fd);
}

#[test]
fn unlink_missing_path_changes_nothing() {
    let temp = TempDir::new().unwrap();
    let fs = darwin_sandbox(temp.path());
    std::fs::write(temp.path().join("keep"), b"").unwrap();

    let before = list(temp.path());
    fs.unlink("/does/not/exist");
    fs.unlink("/keep/child");

    assert_eq!(list(temp.path()), before);
}

#[test]
fn work_dir_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let config = SandboxConfig::new(temp.path()).with_work_dir("scratch/work");
    let fs = SandboxFs::builder().config(config).build().unwrap();

    let first = fs.create_work_dir().unwrap().unwrap();
    std::fs::write(first.join("leftover"), b"").unwrap();
    let second = fs.create_work_dir().unwrap().unwrap();

    assert_eq!(first, temp.path().join("scratch/work"));
    assert_eq!(first, second);
    assert!(second.join("leftover").exists(), "existing content is kept");
}

#[test]
fn rootless_mode_only_serves_stdin() {
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let fs = SandboxFs::builder()
        .diagnostics(diagnostics.clone())
        .handles(FdFactory::default())
        .build()
        .unwrap();

    let stdin = fs.open(STDIN, 0).unwrap();
    assert_eq!(stdin.kind, EntryKind::Stdin);
    assert_eq!(stdin.host_path, None);

    for path in [STDOUT, STDERR, "/", "/etc/hosts", "tmp"] {
        assert_eq!(
            fs.open(path, LinuxFlags::O_CREAT).unwrap_err().rejection(),
            Some(Rejection::NoSandbox),
            "{path}"
        );
    }
    assert_eq!(fs.create_work_dir().unwrap(), None);

    diagnostics.take();
    fs.unlink("/etc/hosts");
    assert_eq!(
        diagnostics.take(),
        vec![RecordedEvent::Unlinked {
            guest_path: "/etc/hosts".to_owned(),
            host_path: None,
        }]
    );
}

#[test]
fn sbx_scenario() {
    let temp = TempDir::new().unwrap();
    let sbx = temp.path().join("sbx");
    let fs = SandboxFs::builder()
        .root(&sbx)
        .handles(FdFactory::default())
        .build()
        .unwrap();

    let err = fs.open("/etc/hosts", LinuxFlags::O_CREAT).unwrap_err();
    assert_eq!(err.rejection(), Some(Rejection::ParentMissing));
    assert!(!sbx.join("etc").exists());

    let handle = fs.open("/hosts", LinuxFlags::O_CREAT).unwrap();
    assert_eq!(handle.kind, EntryKind::File);
    assert_eq!(handle.host_path, Some(sbx.join("hosts")));
    assert_eq!(std::fs::metadata(sbx.join("hosts")).unwrap().len(), 0);
}

#[test]
fn std_streams_carry_append_flag() {
    let temp = TempDir::new().unwrap();
    let fs = SandboxFs::builder()
        .root(temp.path())
        .abi(FlagPredicates {
            create: |_| false,
            directory: |_| false,
            append: |flags| flags == 0xA,
        })
        .handles(FdFactory::default())
        .build()
        .unwrap();

    let stdout = fs.open(STDOUT, 0xA).unwrap();
    let stderr = fs.open(STDERR, 0).unwrap();

    assert_eq!(stdout.kind, EntryKind::Stdout);
    assert!(stdout.append);
    assert_eq!(stderr.kind, EntryKind::Stderr);
    assert!(!stderr.append);
    assert!(temp.path().join("stdout.txt").is_file());
    assert!(temp.path().join("stderr.txt").is_file());
}

#[test]
fn concurrent_creates_never_fail() {
    let temp = TempDir::new().unwrap();
    let fs = Arc::new(darwin_sandbox(temp.path()));

    let threads = (0..8)
        .map(|_| {
            let fs = fs.clone();
            std::thread::spawn(move || {
                fs.open("/shared", DarwinFlags::O_CREAT | DarwinFlags::O_DIRECTORY)
                    .map(|handle| handle.kind)
                    .map_err(|err| err.is_fatal())
            })
        })
        .collect::<Vec<_>>();

    for thread in threads {
        assert_eq!(thread.join().unwrap(), Ok(EntryKind::Directory));
    }
}

fn list(dir: &Path) -> Vec<PathBuf> {
    let mut entries = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect::<Vec<_>>();
    entries.sort();
    entries
}
