//! Abstract storage backend contract.
//!
//! The core consumes this interface and never implements storage itself.
//! Calls are awaited to completion; the core defines no retry or
//! cancellation. Failures are reported as [`BackendError`] values and are
//! translated into the protocol taxonomy at the router boundary.
//!
//! Submodules:
//! - `memory`: in-memory implementation for tests and local development

pub mod memory;

use crate::types::{
    AccessLevel, CreateDisposition, DiskSpace, FileAttributes, FileRecord, OpenOptions, ShareMode,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::SystemTime;
use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("entry not found")]
    NotFound,
    #[error("parent directory not found")]
    ParentNotFound,
    #[error("entry already exists")]
    Exists,
    #[error("directory not empty")]
    NotEmpty,
    #[error("no space left")]
    NoSpace,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("{0}")]
    Other(String),
}

/// Storage backend consumed by the router and the block I/O engine.
///
/// Blocks exist on the backend only implicitly as byte ranges; `read_block`
/// returns `None` for a block that was never written (a hole), and a stored
/// tail block may be shorter than the block size.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Stable identifier of this backend, part of every cache key.
    fn id(&self) -> &str;

    // Path existence and type queries.
    async fn file_exists(&self, path: &str) -> bool;
    async fn directory_exists(&self, path: &str) -> bool;
    /// False if the path does not exist at all.
    async fn is_directory(&self, path: &str) -> bool;
    async fn is_directory_empty(&self, path: &str) -> bool;

    // Namespace mutation.
    async fn create_directory(&self, path: &str) -> BackendResult<()>;
    async fn delete_directory(&self, path: &str) -> BackendResult<()>;
    async fn delete_file(&self, path: &str) -> BackendResult<()>;
    async fn move_file(&self, old: &str, new: &str) -> BackendResult<()>;
    async fn move_directory(&self, old: &str, new: &str) -> BackendResult<()>;

    /// Create an empty file with the given attributes, or reset an existing
    /// one to empty. Returns the resulting record.
    async fn touch(&self, path: &str, attrs: FileAttributes) -> BackendResult<FileRecord>;

    // Metadata.
    async fn record(&self, path: &str) -> Option<FileRecord>;
    /// Push a locally mutated record (length, attributes, times) back.
    async fn update_record(&self, record: &FileRecord) -> BackendResult<()>;
    async fn find(&self, dir: &str, pattern: &str) -> BackendResult<Vec<FileRecord>>;
    async fn set_attributes(&self, path: &str, attrs: FileAttributes) -> BackendResult<()>;
    async fn set_times(
        &self,
        path: &str,
        created: Option<SystemTime>,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> BackendResult<()>;

    /// Data-context factory: authorize an open of `path` and resolve its
    /// record, truncating per the disposition. `Unauthorized` and
    /// `ParentNotFound` are the distinguished failures the router maps.
    async fn open(
        &self,
        path: &str,
        disposition: CreateDisposition,
        access: AccessLevel,
        share: ShareMode,
        options: OpenOptions,
    ) -> BackendResult<FileRecord>;

    // Raw block content, addressed by file id.
    async fn read_block(&self, file_id: &str, index: u64) -> BackendResult<Option<Bytes>>;
    async fn write_block(&self, file_id: &str, index: u64, data: Bytes) -> BackendResult<()>;

    // Opaque range-lock pass-through.
    async fn lock_range(&self, file_id: &str, offset: u64, len: u64) -> BackendResult<()>;
    async fn unlock_range(&self, file_id: &str, offset: u64, len: u64) -> BackendResult<()>;

    async fn disk_space(&self) -> DiskSpace;
}
