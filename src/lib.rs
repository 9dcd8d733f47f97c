//! Block-caching translation layer between a VFS request protocol and
//! pluggable storage backends.
//!
//! The [`vfs::Vfs`] router classifies open/create requests, owns the soft
//! and hard status taxonomy, and drives per-handle [`vfs::FileContext`]
//! engines that read and write in fixed-size blocks through a shared
//! size-bounded cache.

pub mod backend;
pub mod block;
pub mod config;
pub mod error;
pub mod types;
pub mod vfs;

pub use backend::{Backend, BackendError, BackendResult};
pub use block::cache::{BlockCache, BlockKey};
pub use block::layout::{BlockLayout, DEFAULT_BLOCK_SIZE};
pub use config::{VfsOptions, VolumeFeatures, VolumeOptions};
pub use error::{VfsError, VfsResult};
pub use types::{
    AccessLevel, AccessMask, CreateDisposition, DiskSpace, FileAttributes, FileRecord,
    OpenOptions, ShareMode,
};
pub use vfs::{FileContext, Handle, OpenReply, OpenRequest, OpenStatus, Vfs};
