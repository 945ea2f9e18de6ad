//! Guest open-flag decoding.
//!
//! The bit layout of `open(2)` flags differs between guest operating systems,
//! so the file system never looks at the bits itself. It asks an
//! [`OpenFlagsAbi`] the three questions it cares about.

use std::fmt;

/// Answers the open-flag questions the sandbox policy depends on.
pub trait OpenFlagsAbi: fmt::Debug + Send + Sync {
    /// Whether the entry should be created when it does not exist.
    fn wants_create(&self, flags: u32) -> bool;

    /// Whether the guest expects the entry to be a directory.
    fn wants_directory(&self, flags: u32) -> bool;

    /// Whether writes should go to the end of the entry.
    fn wants_append(&self, flags: u32) -> bool;

    /// Decodes `flags` into an [`OpenFlags`] snapshot.
    fn decode(&self, flags: u32) -> OpenFlags {
        OpenFlags {
            raw: flags,
            create: self.wants_create(flags),
            directory: self.wants_directory(flags),
            append: self.wants_append(flags),
        }
    }
}

/// Guest open flags together with the answers of the guest ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenFlags {
    raw: u32,
    create: bool,
    directory: bool,
    append: bool,
}

impl OpenFlags {
    /// The flags exactly as the guest passed them.
    pub const fn raw(&self) -> u32 {
        self.raw
    }

    pub const fn create(&self) -> bool {
        self.create
    }

    pub const fn directory(&self) -> bool {
        self.directory
    }

    pub const fn append(&self) -> bool {
        self.append
    }
}

/// Open flags of Linux and Android guests running on ARM.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxFlags;

impl LinuxFlags {
    pub const O_CREAT: u32 = 0o100;
    pub const O_APPEND: u32 = 0o2000;
    pub const O_DIRECTORY: u32 = 0o40000;
}

impl OpenFlagsAbi for LinuxFlags {
    fn wants_create(&self, flags: u32) -> bool {
        flags & Self::O_CREAT != 0
    }

    fn wants_directory(&self, flags: u32) -> bool {
        flags & Self::O_DIRECTORY != 0
    }

    fn wants_append(&self, flags: u32) -> bool {
        flags & Self::O_APPEND != 0
    }
}

/// Open flags of Darwin guests (iOS and macOS).
#[derive(Debug, Clone, Copy, Default)]
pub struct DarwinFlags;

impl DarwinFlags {
    pub const O_APPEND: u32 = 0x0008;
    pub const O_CREAT: u32 = 0x0200;
    pub const O_DIRECTORY: u32 = 0x0010_0000;
}

impl OpenFlagsAbi for DarwinFlags {
    fn wants_create(&self, flags: u32) -> bool {
        flags & Self::O_CREAT != 0
    }

    fn wants_directory(&self, flags: u32) -> bool {
        flags & Self::O_DIRECTORY != 0
    }

    fn wants_append(&self, flags: u32) -> bool {
        flags & Self::O_APPEND != 0
    }
}

/// An ABI assembled from three plain predicate functions, for guests that
/// have no dedicated type.
#[derive(Debug, Clone, Copy)]
pub struct FlagPredicates {
    pub create: fn(u32) -> bool,
    pub directory: fn(u32) -> bool,
    pub append: fn(u32) -> bool,
}

impl OpenFlagsAbi for FlagPredicates {
    fn wants_create(&self, flags: u32) -> bool {
        (self.create)(flags)
    }

    fn wants_directory(&self, flags: u32) -> bool {
        (self.directory)(flags)
    }

    fn wants_append(&self, flags: u32) -> bool {
        (self.append)(flags)
    }
}
