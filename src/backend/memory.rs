//! In-memory backend for tests and local development.
//!
//! Keeps the namespace as a path-keyed record map and block content keyed by
//! (file id, block index), so moves never touch data. Includes small fault
//! hooks (deny a path, fail block writes) and a block-write counter used by
//! the flush tests.

use super::{Backend, BackendError, BackendResult};
use crate::types::{
    AccessLevel, CreateDisposition, DiskSpace, FileAttributes, FileRecord, OpenOptions, ShareMode,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::SystemTime;

#[derive(Default)]
struct State {
    entries: HashMap<String, FileRecord>,
    blocks: HashMap<(String, u64), Bytes>,
    next_id: u64,
    denied: HashSet<String>,
    fail_block_writes: bool,
    block_writes: u64,
}

pub struct InMemoryBackend {
    id: String,
    state: Mutex<State>,
}

fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(n) => Some(&path[..n]),
        None => None,
    }
}

fn name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// `*` matches any run, `?` matches one character. Case-sensitive; a real
/// backend supplies its own matching rules.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    fn step(p: &[u8], n: &[u8]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some(b'*'), _) => step(&p[1..], n) || (!n.is_empty() && step(p, &n[1..])),
            (Some(b'?'), Some(_)) => step(&p[1..], &n[1..]),
            (Some(a), Some(b)) => a == b && step(&p[1..], &n[1..]),
            _ => false,
        }
    }
    step(pattern.as_bytes(), name.as_bytes())
}

impl InMemoryBackend {
    pub fn new(id: &str) -> Self {
        let mut entries = HashMap::new();
        let now = SystemTime::now();
        entries.insert(
            "/".to_string(),
            FileRecord {
                id: "root".to_string(),
                path: "/".to_string(),
                len: 0,
                attrs: FileAttributes::DIRECTORY,
                created: now,
                accessed: now,
                modified: now,
            },
        );
        Self {
            id: id.to_string(),
            state: Mutex::new(State {
                entries,
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark `path` unauthorized: any mutation or open of it fails.
    pub fn deny(&self, path: &str) {
        self.lock().denied.insert(path.to_string());
    }

    pub fn allow(&self, path: &str) {
        self.lock().denied.remove(path);
    }

    /// Make subsequent `write_block` calls fail with a storage error.
    pub fn set_fail_block_writes(&self, fail: bool) {
        self.lock().fail_block_writes = fail;
    }

    /// Number of successful backend block writes so far.
    pub fn block_writes(&self) -> u64 {
        self.lock().block_writes
    }

    fn check_parent(st: &State, path: &str) -> BackendResult<()> {
        match parent(path) {
            Some(p) => match st.entries.get(p) {
                Some(rec) if rec.is_directory() => Ok(()),
                _ => Err(BackendError::ParentNotFound),
            },
            None => Err(BackendError::Other("root has no parent".to_string())),
        }
    }

    fn drop_blocks(st: &mut State, file_id: &str) {
        st.blocks.retain(|(id, _), _| id != file_id);
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn file_exists(&self, path: &str) -> bool {
        self.lock()
            .entries
            .get(path)
            .is_some_and(|r| !r.is_directory())
    }

    async fn directory_exists(&self, path: &str) -> bool {
        self.lock()
            .entries
            .get(path)
            .is_some_and(|r| r.is_directory())
    }

    async fn is_directory(&self, path: &str) -> bool {
        self.directory_exists(path).await
    }

    async fn is_directory_empty(&self, path: &str) -> bool {
        let st = self.lock();
        !st.entries.keys().any(|p| parent(p) == Some(path))
    }

    async fn create_directory(&self, path: &str) -> BackendResult<()> {
        let mut st = self.lock();
        if st.denied.contains(path) {
            return Err(BackendError::Unauthorized);
        }
        Self::check_parent(&st, path)?;
        if st.entries.contains_key(path) {
            return Err(BackendError::Exists);
        }
        let now = SystemTime::now();
        let id = format!("d{}", st.next_id);
        st.next_id += 1;
        st.entries.insert(
            path.to_string(),
            FileRecord {
                id,
                path: path.to_string(),
                len: 0,
                attrs: FileAttributes::DIRECTORY,
                created: now,
                accessed: now,
                modified: now,
            },
        );
        Ok(())
    }

    async fn delete_directory(&self, path: &str) -> BackendResult<()> {
        let mut st = self.lock();
        if st.denied.contains(path) {
            return Err(BackendError::Unauthorized);
        }
        match st.entries.get(path) {
            Some(rec) if rec.is_directory() => {}
            _ => return Err(BackendError::NotFound),
        }
        if st.entries.keys().any(|p| parent(p) == Some(path)) {
            return Err(BackendError::NotEmpty);
        }
        st.entries.remove(path);
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> BackendResult<()> {
        let mut st = self.lock();
        if st.denied.contains(path) {
            return Err(BackendError::Unauthorized);
        }
        let id = match st.entries.get(path) {
            Some(rec) if !rec.is_directory() => rec.id.clone(),
            _ => return Err(BackendError::NotFound),
        };
        st.entries.remove(path);
        Self::drop_blocks(&mut st, &id);
        Ok(())
    }

    async fn move_file(&self, old: &str, new: &str) -> BackendResult<()> {
        let mut st = self.lock();
        if st.denied.contains(old) || st.denied.contains(new) {
            return Err(BackendError::Unauthorized);
        }
        Self::check_parent(&st, new)?;
        if st.entries.contains_key(new) {
            return Err(BackendError::Exists);
        }
        let mut rec = match st.entries.remove(old) {
            Some(rec) if !rec.is_directory() => rec,
            Some(rec) => {
                st.entries.insert(old.to_string(), rec);
                return Err(BackendError::NotFound);
            }
            None => return Err(BackendError::NotFound),
        };
        rec.path = new.to_string();
        st.entries.insert(new.to_string(), rec);
        Ok(())
    }

    async fn move_directory(&self, old: &str, new: &str) -> BackendResult<()> {
        let mut st = self.lock();
        if st.denied.contains(old) || st.denied.contains(new) {
            return Err(BackendError::Unauthorized);
        }
        Self::check_parent(&st, new)?;
        if st.entries.contains_key(new) {
            return Err(BackendError::Exists);
        }
        match st.entries.get(old) {
            Some(rec) if rec.is_directory() => {}
            _ => return Err(BackendError::NotFound),
        }
        let prefix = format!("{old}/");
        let moved: Vec<String> = st
            .entries
            .keys()
            .filter(|p| *p == old || p.starts_with(&prefix))
            .cloned()
            .collect();
        for path in moved {
            if let Some(mut rec) = st.entries.remove(&path) {
                let rebased = format!("{new}{}", &path[old.len()..]);
                rec.path = rebased.clone();
                st.entries.insert(rebased, rec);
            }
        }
        Ok(())
    }

    async fn touch(&self, path: &str, attrs: FileAttributes) -> BackendResult<FileRecord> {
        let mut st = self.lock();
        if st.denied.contains(path) {
            return Err(BackendError::Unauthorized);
        }
        Self::check_parent(&st, path)?;
        let now = SystemTime::now();
        if let Some(existing) = st.entries.get(path) {
            if existing.is_directory() {
                return Err(BackendError::Exists);
            }
            let id = existing.id.clone();
            Self::drop_blocks(&mut st, &id);
            let rec = st.entries.get_mut(path).ok_or(BackendError::NotFound)?;
            rec.len = 0;
            rec.attrs = attrs;
            rec.accessed = now;
            rec.modified = now;
            return Ok(rec.clone());
        }
        let id = format!("f{}", st.next_id);
        st.next_id += 1;
        let rec = FileRecord {
            id,
            path: path.to_string(),
            len: 0,
            attrs,
            created: now,
            accessed: now,
            modified: now,
        };
        st.entries.insert(path.to_string(), rec.clone());
        Ok(rec)
    }

    async fn record(&self, path: &str) -> Option<FileRecord> {
        self.lock().entries.get(path).cloned()
    }

    async fn update_record(&self, record: &FileRecord) -> BackendResult<()> {
        let mut st = self.lock();
        if st.denied.contains(record.path.as_str()) {
            return Err(BackendError::Unauthorized);
        }
        let rec = st
            .entries
            .get_mut(&record.path)
            .ok_or(BackendError::NotFound)?;
        if rec.id != record.id {
            return Err(BackendError::Other("record id mismatch".to_string()));
        }
        rec.len = record.len;
        rec.attrs = record.attrs;
        rec.accessed = record.accessed;
        rec.modified = record.modified;
        Ok(())
    }

    async fn find(&self, dir: &str, pattern: &str) -> BackendResult<Vec<FileRecord>> {
        let st = self.lock();
        match st.entries.get(dir) {
            Some(rec) if rec.is_directory() => {}
            _ => return Err(BackendError::NotFound),
        }
        let mut out: Vec<FileRecord> = st
            .entries
            .iter()
            .filter(|(p, _)| parent(p) == Some(dir) && wildcard_match(pattern, name(p)))
            .map(|(_, rec)| rec.clone())
            .collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    async fn set_attributes(&self, path: &str, attrs: FileAttributes) -> BackendResult<()> {
        let mut st = self.lock();
        if st.denied.contains(path) {
            return Err(BackendError::Unauthorized);
        }
        let rec = st.entries.get_mut(path).ok_or(BackendError::NotFound)?;
        // the directory bit is structural, not caller-settable
        let dir_bit = rec.attrs & FileAttributes::DIRECTORY;
        rec.attrs = attrs | dir_bit;
        Ok(())
    }

    async fn set_times(
        &self,
        path: &str,
        created: Option<SystemTime>,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> BackendResult<()> {
        let mut st = self.lock();
        if st.denied.contains(path) {
            return Err(BackendError::Unauthorized);
        }
        let rec = st.entries.get_mut(path).ok_or(BackendError::NotFound)?;
        if let Some(t) = created {
            rec.created = t;
        }
        if let Some(t) = accessed {
            rec.accessed = t;
        }
        if let Some(t) = modified {
            rec.modified = t;
        }
        Ok(())
    }

    async fn open(
        &self,
        path: &str,
        disposition: CreateDisposition,
        _access: AccessLevel,
        _share: ShareMode,
        _options: OpenOptions,
    ) -> BackendResult<FileRecord> {
        let mut st = self.lock();
        if st.denied.contains(path) {
            return Err(BackendError::Unauthorized);
        }
        Self::check_parent(&st, path)?;
        let truncate = matches!(
            disposition,
            CreateDisposition::TruncateExisting | CreateDisposition::CreateOrTruncate
        );
        let id = match st.entries.get(path) {
            Some(rec) => rec.id.clone(),
            None => return Err(BackendError::NotFound),
        };
        if truncate {
            Self::drop_blocks(&mut st, &id);
            let rec = st.entries.get_mut(path).ok_or(BackendError::NotFound)?;
            rec.len = 0;
            rec.modified = SystemTime::now();
        }
        st.entries.get(path).cloned().ok_or(BackendError::NotFound)
    }

    async fn read_block(&self, file_id: &str, index: u64) -> BackendResult<Option<Bytes>> {
        let st = self.lock();
        Ok(st.blocks.get(&(file_id.to_string(), index)).cloned())
    }

    async fn write_block(&self, file_id: &str, index: u64, data: Bytes) -> BackendResult<()> {
        let mut st = self.lock();
        if st.fail_block_writes {
            return Err(BackendError::Storage(
                "injected block write failure".to_string(),
            ));
        }
        st.blocks.insert((file_id.to_string(), index), data);
        st.block_writes += 1;
        Ok(())
    }

    async fn lock_range(&self, _file_id: &str, _offset: u64, _len: u64) -> BackendResult<()> {
        Ok(())
    }

    async fn unlock_range(&self, _file_id: &str, _offset: u64, _len: u64) -> BackendResult<()> {
        Ok(())
    }

    async fn disk_space(&self) -> DiskSpace {
        DiskSpace {
            available: 512 << 30,
            total: 1 << 40,
            free: 512 << 30,
        }
    }
}
