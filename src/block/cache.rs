//! Process-wide shared block cache.
//!
//! One cache instance is shared by every handle of every file on every
//! backend; entries are keyed by (backend id, file id, block index) and the
//! total byte size of the cached buffers is bounded, with approximate-LRU
//! eviction under pressure. The cache never persists anything: dirty block
//! content is owned by the writing context until flushed, so an eviction can
//! never lose data.

use bytes::Bytes;

/// Cache key for one block of one file on one backend.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct BlockKey {
    pub backend: String,
    pub file: String,
    pub index: u64,
}

pub struct BlockCache {
    inner: moka::future::Cache<BlockKey, Bytes>,
}

impl BlockCache {
    /// Build a cache bounded by `capacity` total buffer bytes.
    pub fn new(capacity: u64) -> Self {
        let inner = moka::future::Cache::builder()
            .max_capacity(capacity)
            .weigher(|_key, value: &Bytes| value.len().try_into().unwrap_or(u32::MAX))
            .build();
        Self { inner }
    }

    pub async fn get(&self, key: &BlockKey) -> Option<Bytes> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: BlockKey, data: Bytes) {
        self.inner.insert(key, data).await;
    }

    /// Update an entry in place only if the block is currently cached.
    /// Uncached blocks are not admitted here; admission happens on reuse in
    /// the read path.
    pub async fn refresh(&self, key: &BlockKey, data: Bytes) {
        if self.inner.contains_key(key) {
            self.inner.insert(key.clone(), data).await;
        }
    }

    pub fn contains(&self, key: &BlockKey) -> bool {
        self.inner.contains_key(key)
    }

    pub async fn invalidate(&self, key: &BlockKey) {
        self.inner.invalidate(key).await;
    }

    /// Drain pending maintenance so size/eviction observations are accurate.
    /// Test support.
    pub async fn sync(&self) {
        self.inner.run_pending_tasks().await;
    }

    pub fn weighted_size(&self) -> u64 {
        self.inner.weighted_size()
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}
