//! Request router: the open/create state machine and the protocol surface.
//!
//! Every incoming open is classified against backend existence/type queries
//! before any data context is built; backend failures are translated into
//! the status taxonomy here and never cross the boundary raw. Failed calls
//! are traced at debug level; successes stay quiet.

use crate::backend::{Backend, BackendError};
use crate::block::cache::BlockCache;
use crate::block::layout::BlockLayout;
use crate::config::{VfsOptions, VolumeOptions};
use crate::error::{VfsError, VfsResult};
use crate::types::{
    AccessLevel, AccessMask, CreateDisposition, DiskSpace, FileAttributes, FileRecord,
    OpenOptions, ShareMode,
};
use crate::vfs::context::FileContext;
use crate::vfs::handle::Handle;
use bytes::Bytes;
use log::{debug, warn};
use std::sync::Arc;
use std::time::SystemTime;

/// One structured open request.
#[derive(Debug, Clone)]
pub struct OpenRequest<'a> {
    pub path: &'a str,
    pub access: AccessMask,
    pub share: ShareMode,
    pub disposition: CreateDisposition,
    pub attrs: FileAttributes,
    pub options: OpenOptions,
    /// The caller declared the target a directory.
    pub directory: bool,
}

impl<'a> OpenRequest<'a> {
    pub fn new(path: &'a str, disposition: CreateDisposition) -> Self {
        Self {
            path,
            access: AccessMask::empty(),
            share: ShareMode::empty(),
            disposition,
            attrs: FileAttributes::empty(),
            options: OpenOptions::empty(),
            directory: false,
        }
    }

    pub fn access(mut self, access: AccessMask) -> Self {
        self.access = access;
        self
    }

    pub fn attrs(mut self, attrs: FileAttributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn options(mut self, options: OpenOptions) -> Self {
        self.options = options;
        self
    }

    pub fn directory(mut self) -> Self {
        self.directory = true;
        self
    }
}

/// How the open resolved. `AlreadyExisted` is the soft status for
/// open-or-create/create-or-truncate hitting an existing path — a success
/// the caller must be able to tell apart from a plain open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStatus {
    Opened,
    Created,
    AlreadyExisted,
}

pub struct OpenReply<B: Backend> {
    pub handle: Arc<Handle<B>>,
    pub status: OpenStatus,
    /// Resolved classification, which may differ from the request's
    /// `directory` flag for file-branch opens of directory-typed paths.
    pub directory: bool,
}

impl<B: Backend> std::fmt::Debug for OpenReply<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenReply")
            .field("path", &self.handle.path())
            .field("status", &self.status)
            .field("directory", &self.directory)
            .finish()
    }
}

fn open_error(e: BackendError) -> VfsError {
    match e {
        BackendError::Unauthorized => VfsError::AccessDenied,
        BackendError::ParentNotFound => VfsError::PathNotFound,
        BackendError::NotFound => VfsError::NotFound,
        e => VfsError::Internal(e.to_string()),
    }
}

fn meta_error(e: BackendError) -> VfsError {
    match e {
        BackendError::Unauthorized => VfsError::AccessDenied,
        BackendError::NotFound => VfsError::NotFound,
        BackendError::ParentNotFound => VfsError::PathNotFound,
        BackendError::Exists => VfsError::AlreadyExists,
        BackendError::NotEmpty => VfsError::NotEmpty,
        BackendError::NoSpace => VfsError::DiskFull,
        BackendError::Storage(m) => VfsError::IoFailure(m),
        BackendError::Other(m) => VfsError::Internal(m),
    }
}

pub struct Vfs<B: Backend> {
    backend: Arc<B>,
    cache: Arc<BlockCache>,
    layout: BlockLayout,
    volume: VolumeOptions,
}

impl<B: Backend> Vfs<B> {
    pub fn new(backend: Arc<B>, options: VfsOptions) -> Self {
        let cache = Arc::new(BlockCache::new(options.cache_capacity));
        Self::with_cache(backend, options, cache)
    }

    /// Construct with an externally owned cache, shared across routers or
    /// isolated per test.
    pub fn with_cache(backend: Arc<B>, options: VfsOptions, cache: Arc<BlockCache>) -> Self {
        Self {
            backend,
            cache,
            layout: options.layout,
            volume: options.volume,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn cache(&self) -> &Arc<BlockCache> {
        &self.cache
    }

    fn trace<T>(method: &str, path: &str, result: VfsResult<T>) -> VfsResult<T> {
        if let Err(e) = &result {
            debug!("{method}('{path}') -> {e}");
        }
        result
    }

    // --- open/create ---

    pub async fn open(&self, req: OpenRequest<'_>) -> VfsResult<OpenReply<B>> {
        let path = req.path;
        let result = if req.directory {
            self.open_directory(req).await
        } else {
            self.open_file(req).await
        };
        Self::trace("open", path, result)
    }

    async fn open_directory(&self, req: OpenRequest<'_>) -> VfsResult<OpenReply<B>> {
        let path = req.path;
        let mut status = OpenStatus::Opened;
        match req.disposition {
            CreateDisposition::OpenExisting => {
                if !self.backend.directory_exists(path).await {
                    if self.backend.file_exists(path).await {
                        return Err(VfsError::WrongType);
                    }
                    return Err(VfsError::NotFound);
                }
            }
            CreateDisposition::CreateNew => {
                if self.backend.directory_exists(path).await {
                    return Err(VfsError::AlreadyExists);
                }
                self.backend
                    .create_directory(path)
                    .await
                    .map_err(meta_error)?;
                status = OpenStatus::Created;
            }
            _ => {}
        }
        let handle = Arc::new(Handle::new(
            path.to_string(),
            true,
            None,
            req.options.contains(OpenOptions::DELETE_ON_CLOSE),
        ));
        Ok(OpenReply {
            handle,
            status,
            directory: true,
        })
    }

    async fn open_file(&self, req: OpenRequest<'_>) -> VfsResult<OpenReply<B>> {
        let path = req.path;
        let path_exists = self.backend.directory_exists(path).await
            || self.backend.file_exists(path).await;
        let path_is_directory = if path_exists {
            self.backend.is_directory(path).await
        } else {
            false
        };
        let attributes_only = req.access.attributes_only();
        let read_only = req.access.read_only_intent();

        match req.disposition {
            CreateDisposition::OpenExisting => {
                if !path_exists {
                    return Err(VfsError::NotFound);
                }
                // attribute/security-only opens and directory-typed paths
                // succeed without a data context
                if attributes_only || path_is_directory {
                    if path_is_directory
                        && req.access.contains(AccessMask::DELETE)
                        && !req.access.contains(AccessMask::SYNCHRONIZE)
                    {
                        // a DeleteFile request aimed at a directory
                        return Err(VfsError::AccessDenied);
                    }
                    let handle = Arc::new(Handle::new(
                        path.to_string(),
                        path_is_directory,
                        None,
                        req.options.contains(OpenOptions::DELETE_ON_CLOSE),
                    ));
                    return Ok(OpenReply {
                        handle,
                        status: OpenStatus::Opened,
                        directory: path_is_directory,
                    });
                }
            }
            CreateDisposition::CreateNew => {
                if path_exists {
                    return Err(VfsError::AlreadyExists);
                }
            }
            CreateDisposition::TruncateExisting => {
                if !path_exists {
                    return Err(VfsError::NotFound);
                }
            }
            _ => {}
        }

        let created = matches!(
            req.disposition,
            CreateDisposition::CreateNew | CreateDisposition::CreateOrTruncate
        ) || (!path_exists
            && matches!(
                req.disposition,
                CreateDisposition::OpenOrCreate | CreateDisposition::Append
            ));
        if created {
            // files are always created as Archive; Normal is overridden by
            // any other attribute
            let mut attrs = req.attrs | FileAttributes::ARCHIVE;
            attrs.remove(FileAttributes::NORMAL);
            self.backend.touch(path, attrs).await.map_err(open_error)?;
        }

        let level = if read_only {
            AccessLevel::Read
        } else {
            AccessLevel::ReadWrite
        };
        // the context is only built after the backend authorizes the open,
        // so a failure here leaves nothing to tear down
        let record = self
            .backend
            .open(path, req.disposition, level, req.share, req.options)
            .await
            .map_err(open_error)?;
        let ctx = FileContext::new(
            self.backend.clone(),
            self.cache.clone(),
            self.layout,
            record,
            level,
        );

        let status = if path_exists
            && matches!(
                req.disposition,
                CreateDisposition::OpenOrCreate | CreateDisposition::CreateOrTruncate
            ) {
            OpenStatus::AlreadyExisted
        } else if created {
            OpenStatus::Created
        } else {
            OpenStatus::Opened
        };
        let handle = Arc::new(Handle::new(
            path.to_string(),
            false,
            Some(ctx),
            req.options.contains(OpenOptions::DELETE_ON_CLOSE),
        ));
        Ok(OpenReply {
            handle,
            status,
            directory: false,
        })
    }

    async fn detached_context(
        &self,
        path: &str,
        disposition: CreateDisposition,
        access: AccessLevel,
    ) -> VfsResult<FileContext<B>> {
        let record = self
            .backend
            .open(
                path,
                disposition,
                access,
                ShareMode::empty(),
                OpenOptions::empty(),
            )
            .await
            .map_err(open_error)?;
        Ok(FileContext::new(
            self.backend.clone(),
            self.cache.clone(),
            self.layout,
            record,
            access,
        ))
    }

    // --- data plane ---

    /// Read `len` bytes at `offset`. Without a handle (or through a
    /// metadata-only handle) a short-lived context serves the single
    /// operation, memory-mapped style.
    pub async fn read(
        &self,
        path: &str,
        handle: Option<&Handle<B>>,
        offset: u64,
        len: usize,
    ) -> VfsResult<Bytes> {
        let result = self.read_inner(path, handle, offset, len).await;
        Self::trace("read", path, result)
    }

    async fn read_inner(
        &self,
        path: &str,
        handle: Option<&Handle<B>>,
        offset: u64,
        len: usize,
    ) -> VfsResult<Bytes> {
        if let Some(h) = handle {
            let mut st = h.lock().await;
            if let Some(ctx) = st.context.as_mut() {
                return ctx.read(offset, len).await;
            }
        }
        let mut ctx = self
            .detached_context(path, CreateDisposition::OpenExisting, AccessLevel::Read)
            .await?;
        ctx.read(offset, len).await
    }

    /// Write `buf` at `offset`; `None` is the append sentinel. Handleless
    /// writes bypass dirty tracking and are flushed to the backend before
    /// returning.
    pub async fn write(
        &self,
        path: &str,
        handle: Option<&Handle<B>>,
        buf: &[u8],
        offset: Option<u64>,
    ) -> VfsResult<usize> {
        let result = self.write_inner(path, handle, buf, offset).await;
        Self::trace("write", path, result)
    }

    async fn write_inner(
        &self,
        path: &str,
        handle: Option<&Handle<B>>,
        buf: &[u8],
        offset: Option<u64>,
    ) -> VfsResult<usize> {
        if let Some(h) = handle {
            let mut st = h.lock().await;
            if let Some(ctx) = st.context.as_mut() {
                return match offset {
                    Some(at) => ctx.write(at, buf).await,
                    None => ctx.append(buf).await,
                };
            }
        }
        let mut ctx = self
            .detached_context(path, CreateDisposition::OpenExisting, AccessLevel::ReadWrite)
            .await?;
        let written = match offset {
            Some(at) => ctx.write(at, buf).await?,
            None => ctx.append(buf).await?,
        };
        ctx.flush().await?;
        Ok(written)
    }

    pub async fn flush(&self, handle: &Handle<B>) -> VfsResult<()> {
        let result = {
            let mut st = handle.lock().await;
            match st.context.as_mut() {
                Some(ctx) => ctx.flush().await,
                None => Ok(()),
            }
        };
        Self::trace("flush", handle.path(), result)
    }

    pub async fn set_len(&self, handle: &Handle<B>, len: u64) -> VfsResult<()> {
        let result = {
            let mut st = handle.lock().await;
            match st.context.as_mut() {
                Some(ctx) => ctx.set_len(len).await,
                None => Err(VfsError::InvalidParameter("handle has no data context")),
            }
        };
        Self::trace("set_len", handle.path(), result)
    }

    pub async fn lock_range(&self, handle: &Handle<B>, offset: u64, len: u64) -> VfsResult<()> {
        let result = {
            let st = handle.lock().await;
            match st.context.as_ref() {
                Some(ctx) => ctx.lock(offset, len).await,
                None => Err(VfsError::InvalidParameter("handle has no data context")),
            }
        };
        Self::trace("lock", handle.path(), result)
    }

    pub async fn unlock_range(&self, handle: &Handle<B>, offset: u64, len: u64) -> VfsResult<()> {
        let result = {
            let st = handle.lock().await;
            match st.context.as_ref() {
                Some(ctx) => ctx.unlock(offset, len).await,
                None => Err(VfsError::InvalidParameter("handle has no data context")),
            }
        };
        Self::trace("unlock", handle.path(), result)
    }

    // --- lifecycle ---

    /// Pre-close phase: release the data context and honor delete-on-close.
    /// A backend refusal to delete is reported but never aborts teardown.
    pub async fn cleanup(&self, handle: &Handle<B>) {
        if let Err(e) = handle.release_context().await {
            warn!("cleanup('{}'): flush on release failed: {e}", handle.path());
        }
        if handle.delete_on_close().await {
            let result = if handle.is_directory() {
                self.backend.delete_directory(handle.path()).await
            } else {
                self.backend.delete_file(handle.path()).await
            };
            if let Err(e) = result {
                warn!("cleanup('{}'): delete on close failed: {e}", handle.path());
            }
        }
    }

    /// Final phase: release the data context. Tolerates cleanup having
    /// already released it.
    pub async fn close(&self, handle: &Handle<B>) {
        if let Err(e) = handle.release_context().await {
            warn!("close('{}'): flush on release failed: {e}", handle.path());
        }
    }

    // --- namespace ---

    /// Check phase of the two-phase file delete; the commit happens at
    /// cleanup. Performs no mutation.
    pub async fn delete_file_check(&self, handle: &Handle<B>) -> VfsResult<()> {
        let path = handle.path();
        let result = self.delete_file_check_inner(handle).await;
        Self::trace("delete_file_check", path, result)
    }

    async fn delete_file_check_inner(&self, handle: &Handle<B>) -> VfsResult<()> {
        let path = handle.path();
        if self.backend.directory_exists(path).await {
            // DeleteFile aimed at a directory is always illegal
            return Err(VfsError::AccessDenied);
        }
        if !self.backend.file_exists(path).await {
            return Err(VfsError::NotFound);
        }
        handle.set_delete_on_close(true).await;
        Ok(())
    }

    /// Check phase of the two-phase directory delete.
    pub async fn delete_directory_check(&self, handle: &Handle<B>) -> VfsResult<()> {
        let path = handle.path();
        let result = async {
            if !self.backend.is_directory_empty(path).await {
                return Err(VfsError::NotEmpty);
            }
            handle.set_delete_on_close(true).await;
            Ok(())
        }
        .await;
        Self::trace("delete_directory_check", path, result)
    }

    /// Move the entry behind `handle` to `new_path`. The in-flight data
    /// context is disposed before the backend move is attempted.
    pub async fn move_entry(
        &self,
        handle: &Handle<B>,
        new_path: &str,
        replace: bool,
    ) -> VfsResult<()> {
        let result = self.move_entry_inner(handle, new_path, replace).await;
        Self::trace("move", handle.path(), result)
    }

    async fn move_entry_inner(
        &self,
        handle: &Handle<B>,
        new_path: &str,
        replace: bool,
    ) -> VfsResult<()> {
        handle.release_context().await?;
        let old_path = handle.path();
        let is_dir = handle.is_directory();
        let exists = if is_dir {
            self.backend.directory_exists(new_path).await
        } else {
            self.backend.file_exists(new_path).await
        };
        if !exists {
            let result = if is_dir {
                self.backend.move_directory(old_path, new_path).await
            } else {
                self.backend.move_file(old_path, new_path).await
            };
            return result.map_err(meta_error);
        }
        if !replace {
            return Err(VfsError::AlreadyExists);
        }
        if is_dir {
            // a directory destination can never be replaced
            return Err(VfsError::AccessDenied);
        }
        self.backend.delete_file(new_path).await.map_err(meta_error)?;
        self.backend
            .move_file(old_path, new_path)
            .await
            .map_err(meta_error)
    }

    // --- metadata ---

    /// `directory_hint` selects the not-found flavor, mirroring the caller's
    /// classification of the path.
    pub async fn get_info(&self, path: &str, directory_hint: bool) -> VfsResult<FileRecord> {
        let result = match self.backend.record(path).await {
            Some(rec) => Ok(rec),
            None if directory_hint => Err(VfsError::PathNotFound),
            None => Err(VfsError::NotFound),
        };
        Self::trace("get_info", path, result)
    }

    pub async fn find(&self, path: &str, pattern: &str) -> VfsResult<Vec<FileRecord>> {
        let result = self.backend.find(path, pattern).await.map_err(meta_error);
        Self::trace("find", path, result)
    }

    pub async fn set_attributes(&self, path: &str, attrs: FileAttributes) -> VfsResult<()> {
        // an empty attribute set means "leave unchanged"
        if attrs.is_empty() {
            return Ok(());
        }
        let result = self
            .backend
            .set_attributes(path, attrs)
            .await
            .map_err(meta_error);
        Self::trace("set_attributes", path, result)
    }

    pub async fn set_times(
        &self,
        path: &str,
        created: Option<SystemTime>,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> VfsResult<()> {
        let result = self
            .backend
            .set_times(path, created, accessed, modified)
            .await
            .map_err(meta_error);
        Self::trace("set_times", path, result)
    }

    // --- volume ---

    pub async fn free_space(&self) -> DiskSpace {
        self.backend.disk_space().await
    }

    pub fn volume_info(&self) -> &VolumeOptions {
        &self.volume
    }

    // --- deliberately unsupported surface ---

    pub fn get_security(&self, _path: &str) -> VfsResult<Bytes> {
        Err(VfsError::Unsupported)
    }

    pub fn set_security(&self, _path: &str, _descriptor: &[u8]) -> VfsResult<()> {
        Err(VfsError::Unsupported)
    }

    pub fn find_streams(&self, _path: &str) -> VfsResult<Vec<FileRecord>> {
        Err(VfsError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryBackend;
    use rand::{Rng, SeedableRng};

    const DATA_RW: AccessMask = AccessMask::READ_DATA
        .union(AccessMask::WRITE_DATA)
        .union(AccessMask::SYNCHRONIZE);

    fn small_options() -> VfsOptions {
        VfsOptions {
            layout: BlockLayout {
                block_size: 1024,
                max_io_blocks: 4,
            },
            ..VfsOptions::default()
        }
    }

    fn vfs() -> Vfs<InMemoryBackend> {
        let _ = env_logger::builder().is_test(true).try_init();
        Vfs::new(Arc::new(InMemoryBackend::new("mem")), small_options())
    }

    async fn create(vfs: &Vfs<InMemoryBackend>, path: &str) -> Arc<Handle<InMemoryBackend>> {
        let reply = vfs
            .open(OpenRequest::new(path, CreateDisposition::CreateNew).access(DATA_RW))
            .await
            .unwrap();
        assert_eq!(reply.status, OpenStatus::Created);
        reply.handle
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn open_existing_missing_is_not_found() {
        let vfs = vfs();
        let err = vfs
            .open(OpenRequest::new("/missing", CreateDisposition::OpenExisting).access(DATA_RW))
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::NotFound));
    }

    #[tokio::test]
    async fn create_new_on_existing_is_already_exists() {
        let vfs = vfs();
        create(&vfs, "/f").await;
        let err = vfs
            .open(OpenRequest::new("/f", CreateDisposition::CreateNew).access(DATA_RW))
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::AlreadyExists));
    }

    #[tokio::test]
    async fn open_or_create_reports_soft_status() {
        let vfs = vfs();

        let first = vfs
            .open(OpenRequest::new("/f", CreateDisposition::OpenOrCreate).access(DATA_RW))
            .await
            .unwrap();
        assert_eq!(first.status, OpenStatus::Created);

        let second = vfs
            .open(OpenRequest::new("/f", CreateDisposition::OpenOrCreate).access(DATA_RW))
            .await
            .unwrap();
        assert_eq!(second.status, OpenStatus::AlreadyExisted);
    }

    #[tokio::test]
    async fn truncate_existing_missing_is_not_found() {
        let vfs = vfs();
        let err = vfs
            .open(OpenRequest::new("/f", CreateDisposition::TruncateExisting).access(DATA_RW))
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::NotFound));
    }

    #[tokio::test]
    async fn create_or_truncate_resets_existing_content() {
        let vfs = vfs();
        let h = create(&vfs, "/f").await;
        vfs.write("/f", Some(&h), &pattern(2048), Some(0)).await.unwrap();
        vfs.flush(&h).await.unwrap();
        vfs.close(&h).await;

        let reply = vfs
            .open(OpenRequest::new("/f", CreateDisposition::CreateOrTruncate).access(DATA_RW))
            .await
            .unwrap();
        assert_eq!(reply.status, OpenStatus::AlreadyExisted);
        assert_eq!(vfs.get_info("/f", false).await.unwrap().len, 0);
    }

    #[tokio::test]
    async fn directory_branch_classifies_paths() {
        let vfs = vfs();

        let err = vfs
            .open(OpenRequest::new("/d", CreateDisposition::OpenExisting).directory())
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::NotFound));

        let reply = vfs
            .open(OpenRequest::new("/d", CreateDisposition::CreateNew).directory())
            .await
            .unwrap();
        assert_eq!(reply.status, OpenStatus::Created);
        assert!(reply.directory);

        let err = vfs
            .open(OpenRequest::new("/d", CreateDisposition::CreateNew).directory())
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::AlreadyExists));

        // a file where a directory was expected
        create(&vfs, "/f").await;
        let err = vfs
            .open(OpenRequest::new("/f", CreateDisposition::OpenExisting).directory())
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::WrongType));
    }

    #[tokio::test]
    async fn unauthorized_directory_create_is_denied() {
        let vfs = vfs();
        vfs.backend().deny("/locked");
        let err = vfs
            .open(OpenRequest::new("/locked", CreateDisposition::CreateNew).directory())
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::AccessDenied));
    }

    #[tokio::test]
    async fn attributes_only_open_carries_no_context() {
        let vfs = vfs();
        create(&vfs, "/f").await;

        let reply = vfs
            .open(
                OpenRequest::new("/f", CreateDisposition::OpenExisting)
                    .access(AccessMask::READ_ATTRIBUTES),
            )
            .await
            .unwrap();
        assert!(!reply.handle.has_context().await);

        // reads through a metadata-only handle fall back to a short-lived context
        vfs.write("/f", None, b"hello", Some(0)).await.unwrap();
        let out = vfs.read("/f", Some(&reply.handle), 0, 5).await.unwrap();
        assert_eq!(&out[..], b"hello");
    }

    #[tokio::test]
    async fn delete_intent_on_directory_without_sync_is_denied() {
        let vfs = vfs();
        vfs.open(OpenRequest::new("/d", CreateDisposition::CreateNew).directory())
            .await
            .unwrap();

        let err = vfs
            .open(
                OpenRequest::new("/d", CreateDisposition::OpenExisting)
                    .access(AccessMask::DELETE),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::AccessDenied));

        // with SYNCHRONIZE the same open succeeds
        let reply = vfs
            .open(
                OpenRequest::new("/d", CreateDisposition::OpenExisting)
                    .access(AccessMask::DELETE | AccessMask::SYNCHRONIZE),
            )
            .await
            .unwrap();
        assert!(reply.directory);
    }

    #[tokio::test]
    async fn created_files_are_stamped_archive() {
        let vfs = vfs();
        let reply = vfs
            .open(
                OpenRequest::new("/f", CreateDisposition::CreateNew)
                    .access(DATA_RW)
                    .attrs(FileAttributes::NORMAL),
            )
            .await
            .unwrap();
        assert_eq!(reply.status, OpenStatus::Created);

        let rec = vfs.get_info("/f", false).await.unwrap();
        assert!(rec.attrs.contains(FileAttributes::ARCHIVE));
        assert!(!rec.attrs.contains(FileAttributes::NORMAL));
    }

    #[tokio::test]
    async fn unauthorized_open_maps_to_access_denied() {
        let vfs = vfs();
        create(&vfs, "/f").await;
        vfs.backend().deny("/f");
        let err = vfs
            .open(OpenRequest::new("/f", CreateDisposition::OpenExisting).access(DATA_RW))
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::AccessDenied));
    }

    #[tokio::test]
    async fn missing_parent_maps_to_path_not_found() {
        let vfs = vfs();
        let err = vfs
            .open(OpenRequest::new("/no/dir/f", CreateDisposition::CreateNew).access(DATA_RW))
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::PathNotFound));
    }

    #[tokio::test]
    async fn two_phase_delete_of_file() {
        let vfs = vfs();
        let h = create(&vfs, "/f").await;
        vfs.delete_file_check(&h).await.unwrap();
        assert!(h.delete_on_close().await);

        // check performed no mutation
        assert!(vfs.get_info("/f", false).await.is_ok());

        vfs.cleanup(&h).await;
        vfs.close(&h).await;
        assert!(matches!(
            vfs.get_info("/f", false).await,
            Err(VfsError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_file_check_on_directory_is_denied() {
        let vfs = vfs();
        let reply = vfs
            .open(OpenRequest::new("/d", CreateDisposition::CreateNew).directory())
            .await
            .unwrap();
        let err = vfs.delete_file_check(&reply.handle).await.unwrap_err();
        assert!(matches!(err, VfsError::AccessDenied));
    }

    #[tokio::test]
    async fn delete_directory_check_requires_empty() {
        let vfs = vfs();
        let dir = vfs
            .open(OpenRequest::new("/d", CreateDisposition::CreateNew).directory())
            .await
            .unwrap();
        create(&vfs, "/d/f").await;

        let err = vfs.delete_directory_check(&dir.handle).await.unwrap_err();
        assert!(matches!(err, VfsError::NotEmpty));

        let f = vfs
            .open(OpenRequest::new("/d/f", CreateDisposition::OpenExisting).access(DATA_RW))
            .await
            .unwrap();
        vfs.delete_file_check(&f.handle).await.unwrap();
        vfs.cleanup(&f.handle).await;
        vfs.close(&f.handle).await;

        vfs.delete_directory_check(&dir.handle).await.unwrap();
        vfs.cleanup(&dir.handle).await;
        assert!(matches!(
            vfs.get_info("/d", true).await,
            Err(VfsError::PathNotFound)
        ));
    }

    #[tokio::test]
    async fn denied_delete_on_close_does_not_abort_teardown() {
        let vfs = vfs();
        let h = create(&vfs, "/f").await;
        vfs.delete_file_check(&h).await.unwrap();
        vfs.backend().deny("/f");
        vfs.cleanup(&h).await;
        vfs.close(&h).await;
        vfs.backend().allow("/f");
        // delete was refused, the file survives
        assert!(vfs.get_info("/f", false).await.is_ok());
    }

    #[tokio::test]
    async fn move_disposes_context_and_validates_destination() {
        let vfs = vfs();
        let h = create(&vfs, "/src").await;
        vfs.write("/src", Some(&h), b"payload", Some(0)).await.unwrap();

        create(&vfs, "/dst").await;

        // destination exists, no replace intent
        let err = vfs.move_entry(&h, "/dst", false).await.unwrap_err();
        assert!(matches!(err, VfsError::AlreadyExists));
        // the in-flight context was disposed before the attempt
        assert!(!h.has_context().await);

        vfs.move_entry(&h, "/dst", true).await.unwrap();
        assert!(matches!(
            vfs.get_info("/src", false).await,
            Err(VfsError::NotFound)
        ));
        let out = vfs.read("/dst", None, 0, 7).await.unwrap();
        assert_eq!(&out[..], b"payload");
    }

    #[tokio::test]
    async fn replacing_a_directory_destination_is_denied() {
        let vfs = vfs();
        let dir = vfs
            .open(OpenRequest::new("/a", CreateDisposition::CreateNew).directory())
            .await
            .unwrap();
        vfs.open(OpenRequest::new("/b", CreateDisposition::CreateNew).directory())
            .await
            .unwrap();

        let err = vfs.move_entry(&dir.handle, "/b", true).await.unwrap_err();
        assert!(matches!(err, VfsError::AccessDenied));
    }

    #[tokio::test]
    async fn extension_visible_via_get_info_before_flush() {
        let vfs = vfs();
        let h = create(&vfs, "/f").await;
        vfs.write("/f", Some(&h), &pattern(3000), Some(0)).await.unwrap();
        // not flushed yet, but the new length is already observable
        assert_eq!(vfs.get_info("/f", false).await.unwrap().len, 3000);
    }

    #[tokio::test]
    async fn handleless_write_persists_immediately() {
        let vfs = vfs();
        let h = create(&vfs, "/f").await;
        vfs.close(&h).await;

        vfs.write("/f", None, &pattern(1500), Some(0)).await.unwrap();
        assert_eq!(vfs.backend().block_writes(), 2);
        let out = vfs.read("/f", None, 0, 1500).await.unwrap();
        assert_eq!(&out[..], &pattern(1500)[..]);
    }

    #[tokio::test]
    async fn append_sentinel_writes_at_end() {
        let vfs = vfs();
        let h = create(&vfs, "/f").await;
        vfs.write("/f", Some(&h), b"one,", Some(0)).await.unwrap();
        vfs.write("/f", Some(&h), b"two", None).await.unwrap();
        let out = vfs.read("/f", Some(&h), 0, 16).await.unwrap();
        assert_eq!(&out[..], b"one,two");
    }

    #[tokio::test]
    async fn flush_through_handle_writes_each_dirty_block_once() {
        let vfs = vfs();
        let h = create(&vfs, "/f").await;
        vfs.write("/f", Some(&h), &pattern(4096), Some(0)).await.unwrap();

        vfs.flush(&h).await.unwrap();
        assert_eq!(vfs.backend().block_writes(), 4);
        vfs.flush(&h).await.unwrap();
        assert_eq!(vfs.backend().block_writes(), 4);
    }

    #[tokio::test]
    async fn enumerate_matches_patterns() {
        let vfs = vfs();
        vfs.open(OpenRequest::new("/d", CreateDisposition::CreateNew).directory())
            .await
            .unwrap();
        for name in ["a.txt", "b.txt", "c.log"] {
            create(&vfs, &format!("/d/{name}")).await;
        }

        let all = vfs.find("/d", "*").await.unwrap();
        assert_eq!(all.len(), 3);
        let txt = vfs.find("/d", "*.txt").await.unwrap();
        assert_eq!(txt.len(), 2);
    }

    #[tokio::test]
    async fn set_attributes_empty_is_a_no_op() {
        let vfs = vfs();
        vfs.set_attributes("/missing", FileAttributes::empty())
            .await
            .unwrap();
        assert!(matches!(
            vfs.set_attributes("/missing", FileAttributes::HIDDEN).await,
            Err(VfsError::NotFound)
        ));
    }

    #[tokio::test]
    async fn volume_surface() {
        let vfs = vfs();
        let space = vfs.free_space().await;
        assert!(space.total >= space.free);
        assert_eq!(vfs.volume_info().max_component_length, 256);
        assert!(matches!(
            vfs.get_security("/f"),
            Err(VfsError::Unsupported)
        ));
        assert!(matches!(
            vfs.find_streams("/f"),
            Err(VfsError::Unsupported)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_disjoint_writers_reconcile() {
        let vfs = Arc::new(vfs());
        let bs = 1024usize;
        let blocks = 16usize;
        let total = bs * blocks;

        // pre-size the file so concurrent writers never race on length
        let h = create(&vfs, "/f").await;
        vfs.set_len(&h, total as u64).await.unwrap();
        vfs.flush(&h).await.unwrap();
        vfs.close(&h).await;

        let mut expected = vec![0u8; total];
        let mut regions = Vec::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        for writer in 0..4usize {
            let mut data = vec![0u8; bs * 4];
            rng.fill(&mut data[..]);
            let offset = writer * bs * 4;
            expected[offset..offset + data.len()].copy_from_slice(&data);
            regions.push((offset as u64, data));
        }

        let mut tasks = Vec::new();
        for (offset, data) in regions {
            let vfs = vfs.clone();
            tasks.push(tokio::spawn(async move {
                let reply = vfs
                    .open(
                        OpenRequest::new("/f", CreateDisposition::OpenExisting).access(DATA_RW),
                    )
                    .await
                    .unwrap();
                vfs.write("/f", Some(&reply.handle), &data, Some(offset))
                    .await
                    .unwrap();
                vfs.flush(&reply.handle).await.unwrap();
                vfs.close(&reply.handle).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // full-file reconciliation, reading in max-sized chunks
        let mut out = Vec::with_capacity(total);
        let mut at = 0u64;
        while (at as usize) < total {
            let chunk = vfs.read("/f", None, at, bs * 4).await.unwrap();
            assert!(!chunk.is_empty());
            at += chunk.len() as u64;
            out.extend_from_slice(&chunk);
        }
        assert_eq!(out, expected);
    }
}
