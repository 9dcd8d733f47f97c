//! Request and record types shared by the router, handles and backends.

use bitflags::bitflags;
use std::time::SystemTime;

bitflags! {
    /// Rights requested by an open call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessMask: u32 {
        const READ_DATA        = 1 << 0;
        const WRITE_DATA       = 1 << 1;
        const APPEND_DATA      = 1 << 2;
        const READ_ATTRIBUTES  = 1 << 3;
        const WRITE_ATTRIBUTES = 1 << 4;
        const READ_SECURITY    = 1 << 5;
        const DELETE           = 1 << 6;
        const EXECUTE          = 1 << 7;
        const SYNCHRONIZE      = 1 << 8;
        const GENERIC_READ     = 1 << 9;
        const GENERIC_WRITE    = 1 << 10;
        const GENERIC_EXECUTE  = 1 << 11;

        /// Any right that touches file data.
        const DATA = Self::READ_DATA.bits()
            | Self::WRITE_DATA.bits()
            | Self::APPEND_DATA.bits()
            | Self::EXECUTE.bits()
            | Self::GENERIC_READ.bits()
            | Self::GENERIC_WRITE.bits()
            | Self::GENERIC_EXECUTE.bits();

        /// Any right that can mutate file data.
        const DATA_WRITE = Self::WRITE_DATA.bits()
            | Self::APPEND_DATA.bits()
            | Self::DELETE.bits()
            | Self::GENERIC_WRITE.bits();
    }
}

impl AccessMask {
    /// The caller only wants attributes or security info, no data access.
    pub fn attributes_only(self) -> bool {
        (self & Self::DATA).is_empty()
    }

    /// No data-mutating rights were requested.
    pub fn read_only_intent(self) -> bool {
        (self & Self::DATA_WRITE).is_empty()
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShareMode: u32 {
        const READ   = 1 << 0;
        const WRITE  = 1 << 1;
        const DELETE = 1 << 2;
    }
}

bitflags! {
    /// Attributes carried on a file record. `NORMAL` is mutually exclusive
    /// with every other bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileAttributes: u32 {
        const READ_ONLY = 1 << 0;
        const HIDDEN    = 1 << 1;
        const SYSTEM    = 1 << 2;
        const DIRECTORY = 1 << 4;
        const ARCHIVE   = 1 << 5;
        const NORMAL    = 1 << 7;
        const TEMPORARY = 1 << 8;
    }
}

bitflags! {
    /// Per-open flags carried alongside the creation disposition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenOptions: u32 {
        const DELETE_ON_CLOSE = 1 << 0;
        const SEQUENTIAL_SCAN = 1 << 1;
        const RANDOM_ACCESS   = 1 << 2;
        const WRITE_THROUGH   = 1 << 3;
    }
}

/// The caller's declared intent for how an open request should treat
/// existing and missing paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateDisposition {
    /// Open only if the path exists.
    OpenExisting,
    /// Create only if the path does not exist.
    CreateNew,
    /// Open if present, otherwise create.
    OpenOrCreate,
    /// Open an existing path and discard its content.
    TruncateExisting,
    /// Create, replacing any existing content.
    CreateOrTruncate,
    /// Open or create, positioning writes at end of file.
    Append,
}

/// Access level a data context was opened with. Downgraded to `Read` when
/// the open request carried no data-mutating rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Read,
    ReadWrite,
}

/// One logical file or directory as the backend knows it. Handles keep a
/// copy that may locally mutate `len`; mutated copies are pushed back to the
/// backend (see `FileContext::flush`).
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Stable identifier, unique within one backend.
    pub id: String,
    pub path: String,
    pub len: u64,
    pub attrs: FileAttributes,
    pub created: SystemTime,
    pub accessed: SystemTime,
    pub modified: SystemTime,
}

impl FileRecord {
    pub fn is_directory(&self) -> bool {
        self.attrs.contains(FileAttributes::DIRECTORY)
    }
}

/// Free-space triple reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpace {
    /// Bytes available to the caller.
    pub available: u64,
    /// Total size of the volume.
    pub total: u64,
    /// Total free bytes on the volume.
    pub free: u64,
}
