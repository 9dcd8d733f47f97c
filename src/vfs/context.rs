//! Block-cached data context: serves arbitrary-offset reads and writes by
//! translating them into fixed-size block operations against the backend.
//!
//! Dirty block content is owned here, in the context's dirty map, until a
//! flush persists it. The shared cache is purely a read accelerator: an
//! eviction can never lose dirty data, and flush performs exactly one
//! backend write per dirty block.

use crate::backend::{Backend, BackendError};
use crate::block::cache::{BlockCache, BlockKey};
use crate::block::layout::BlockLayout;
use crate::error::{VfsError, VfsResult};
use crate::types::{AccessLevel, FileRecord};
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;

fn storage_error(e: BackendError) -> VfsError {
    match e {
        BackendError::NoSpace => VfsError::DiskFull,
        BackendError::Unauthorized => VfsError::AccessDenied,
        e => VfsError::IoFailure(e.to_string()),
    }
}

pub struct FileContext<B: Backend> {
    backend: Arc<B>,
    cache: Arc<BlockCache>,
    layout: BlockLayout,
    access: AccessLevel,
    /// Local copy of the backend record; `len` may run ahead of the backend
    /// between writes and flushes.
    record: FileRecord,
    /// Authoritative content of unflushed blocks, keyed by block index.
    dirty: BTreeMap<u64, Bytes>,
    /// Blocks this context has fetched before; a re-fetch admits the block
    /// to the shared cache, a first touch does not.
    touched: HashSet<u64>,
    len_dirty: bool,
}

impl<B: Backend> FileContext<B> {
    pub fn new(
        backend: Arc<B>,
        cache: Arc<BlockCache>,
        layout: BlockLayout,
        record: FileRecord,
        access: AccessLevel,
    ) -> Self {
        Self {
            backend,
            cache,
            layout,
            access,
            record,
            dirty: BTreeMap::new(),
            touched: HashSet::new(),
            len_dirty: false,
        }
    }

    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    pub fn len(&self) -> u64 {
        self.record.len
    }

    pub fn is_empty(&self) -> bool {
        self.record.len == 0
    }

    /// Number of blocks whose newest content has not reached the backend.
    pub fn dirty_blocks(&self) -> usize {
        self.dirty.len()
    }

    fn key(&self, index: u64) -> BlockKey {
        BlockKey {
            backend: self.backend.id().to_string(),
            file: self.record.id.clone(),
            index,
        }
    }

    /// Resolve one block: dirty map first (always newest), then the shared
    /// cache, then the backend. `None` is a hole. Backend fetches are
    /// admitted to the cache only on reuse.
    async fn fetch_block(&mut self, index: u64) -> VfsResult<Option<Bytes>> {
        if let Some(data) = self.dirty.get(&index) {
            return Ok(Some(data.clone()));
        }
        let key = self.key(index);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(Some(hit));
        }
        let fetched = self
            .backend
            .read_block(&self.record.id, index)
            .await
            .map_err(storage_error)?;
        let reused = !self.touched.insert(index);
        if reused {
            if let Some(data) = &fetched {
                self.cache.insert(key, data.clone()).await;
            }
        }
        Ok(fetched)
    }

    /// Concatenate blocks `start..=end` into a scratch buffer, zero-padding
    /// holes and short tail blocks so block positions stay aligned.
    async fn assemble(&mut self, start: u64, end: u64) -> VfsResult<BytesMut> {
        let bs = self.layout.block_size as usize;
        let mut scratch = BytesMut::with_capacity((end - start + 1) as usize * bs);
        for index in start..=end {
            if let Some(data) = self.fetch_block(index).await? {
                scratch.extend_from_slice(&data);
            }
            let aligned = (index - start + 1) as usize * bs;
            if scratch.len() < aligned {
                scratch.resize(aligned, 0);
            }
        }
        Ok(scratch)
    }

    async fn push_record(&self) -> VfsResult<()> {
        self.backend
            .update_record(&self.record)
            .await
            .map_err(storage_error)
    }

    /// Read up to `len` bytes at `offset`. Reading at or past end of file
    /// yields an empty buffer, not an error.
    pub async fn read(&mut self, offset: u64, len: usize) -> VfsResult<Bytes> {
        if offset >= self.record.len || len == 0 {
            return Ok(Bytes::new());
        }
        if len > self.layout.max_io() {
            return Err(VfsError::InvalidParameter(
                "read buffer exceeds the maximum i/o size",
            ));
        }
        let (start, end) = self.layout.block_range(offset, len, self.record.len);
        let mut scratch = self.assemble(start, end).await?;
        let skip = (offset - self.layout.block_offset(start)) as usize;
        let n = len.min((self.record.len - offset) as usize);
        if scratch.len() < skip + n {
            scratch.resize(skip + n, 0);
        }
        Ok(scratch.freeze().slice(skip..skip + n))
    }

    /// Write `buf` at `offset`, extending the file if the range runs past
    /// end of file. Content lands in the dirty map; nothing reaches the
    /// backend until flush.
    pub async fn write(&mut self, offset: u64, buf: &[u8]) -> VfsResult<usize> {
        if self.access != AccessLevel::ReadWrite {
            return Err(VfsError::AccessDenied);
        }
        if buf.len() > self.layout.max_io() {
            return Err(VfsError::InvalidParameter(
                "write buffer exceeds the maximum i/o size",
            ));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let end_offset = offset + buf.len() as u64;
        if end_offset > self.record.len {
            self.record.len = end_offset;
            self.record.modified = SystemTime::now();
            self.len_dirty = true;
            // the new length must be observable via get-info before flush
            self.push_record().await?;
        }

        let (start, end) = self.layout.block_range(offset, buf.len(), self.record.len);
        let mut scratch = self.assemble(start, end).await?;
        let start_pos = self.layout.block_offset(start);
        let pos = (offset - start_pos) as usize;
        if scratch.len() < pos + buf.len() {
            scratch.resize(pos + buf.len(), 0);
        }
        scratch[pos..pos + buf.len()].copy_from_slice(buf);
        if start_pos + scratch.len() as u64 > self.record.len {
            scratch.truncate((self.record.len - start_pos) as usize);
        }

        // split back into block-sized pieces; every piece is dirty and stays
        // pinned here until flush, with cached copies refreshed in place
        let bs = self.layout.block_size as usize;
        let frozen = scratch.freeze();
        let mut piece_start = 0;
        let mut index = start;
        while piece_start < frozen.len() {
            let piece_end = (piece_start + bs).min(frozen.len());
            let piece = frozen.slice(piece_start..piece_end);
            self.cache.refresh(&self.key(index), piece.clone()).await;
            self.dirty.insert(index, piece);
            index += 1;
            piece_start = piece_end;
        }
        Ok(buf.len())
    }

    /// Write at end of file (append sentinel).
    pub async fn append(&mut self, buf: &[u8]) -> VfsResult<usize> {
        let at = self.record.len;
        self.write(at, buf).await
    }

    /// Persist every dirty block, then the record if the length changed.
    /// A failed block write leaves that block and the rest dirty and
    /// retryable.
    pub async fn flush(&mut self) -> VfsResult<()> {
        let pending = std::mem::take(&mut self.dirty);
        let mut iter = pending.into_iter();
        while let Some((index, data)) = iter.next() {
            if let Err(e) = self
                .backend
                .write_block(&self.record.id, index, data.clone())
                .await
            {
                self.dirty.insert(index, data);
                self.dirty.extend(iter);
                return Err(storage_error(e));
            }
        }
        if self.len_dirty {
            self.push_record().await?;
            self.len_dirty = false;
        }
        Ok(())
    }

    /// Set the file length. Shrinking discards dirty and cached content past
    /// the new end.
    pub async fn set_len(&mut self, len: u64) -> VfsResult<()> {
        if self.access != AccessLevel::ReadWrite {
            return Err(VfsError::AccessDenied);
        }
        let old = self.record.len;
        if len == old {
            return Ok(());
        }
        if len < old {
            let boundary = self.layout.last_block(len);
            let drop_from = if len == 0 { 0 } else { boundary + 1 };
            let stale: Vec<u64> = self.dirty.range(drop_from..).map(|(&i, _)| i).collect();
            for index in stale {
                self.dirty.remove(&index);
                self.cache.invalidate(&self.key(index)).await;
            }
            if len > 0 {
                let within = (len - self.layout.block_offset(boundary)) as usize;
                if let Some(data) = self.dirty.get_mut(&boundary) {
                    if data.len() > within {
                        *data = data.slice(..within);
                    }
                }
                // cached boundary content may still carry the trimmed tail
                self.cache.invalidate(&self.key(boundary)).await;
            }
            for index in drop_from..=self.layout.last_block(old) {
                self.cache.invalidate(&self.key(index)).await;
            }
        }
        self.record.len = len;
        self.record.modified = SystemTime::now();
        self.len_dirty = true;
        self.push_record().await
    }

    /// Opaque range-lock pass-through; backend refusal surfaces as denial.
    pub async fn lock(&self, offset: u64, len: u64) -> VfsResult<()> {
        if self.access != AccessLevel::ReadWrite {
            return Err(VfsError::AccessDenied);
        }
        self.backend
            .lock_range(&self.record.id, offset, len)
            .await
            .map_err(|_| VfsError::AccessDenied)
    }

    pub async fn unlock(&self, offset: u64, len: u64) -> VfsResult<()> {
        if self.access != AccessLevel::ReadWrite {
            return Err(VfsError::AccessDenied);
        }
        self.backend
            .unlock_range(&self.record.id, offset, len)
            .await
            .map_err(|_| VfsError::AccessDenied)
    }
}
