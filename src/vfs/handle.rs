//! Per-open handle state.
//!
//! A handle owns at most one data context for its whole life and carries the
//! per-handle exclusion guard: every read, write, flush and release path
//! goes through the one `tokio::sync::Mutex` below, which is what
//! serializes overlapped I/O on a single open.

use crate::backend::Backend;
use crate::error::VfsResult;
use crate::vfs::context::FileContext;
use tokio::sync::{Mutex, MutexGuard};

pub(crate) struct HandleState<B: Backend> {
    pub(crate) context: Option<FileContext<B>>,
    pub(crate) delete_on_close: bool,
}

pub struct Handle<B: Backend> {
    path: String,
    is_directory: bool,
    state: Mutex<HandleState<B>>,
}

impl<B: Backend> Handle<B> {
    pub(crate) fn new(
        path: String,
        is_directory: bool,
        context: Option<FileContext<B>>,
        delete_on_close: bool,
    ) -> Self {
        Self {
            path,
            is_directory,
            state: Mutex::new(HandleState {
                context,
                delete_on_close,
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// How the open classified this path; decides delete and move shape.
    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub async fn delete_on_close(&self) -> bool {
        self.state.lock().await.delete_on_close
    }

    pub(crate) async fn set_delete_on_close(&self, value: bool) {
        self.state.lock().await.delete_on_close = value;
    }

    /// Acquire the per-handle exclusion guard.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, HandleState<B>> {
        self.state.lock().await
    }

    /// Whether a data context is currently attached.
    pub async fn has_context(&self) -> bool {
        self.state.lock().await.context.is_some()
    }

    /// Flush and drop the data context. Safe to call more than once; after
    /// the first call there is nothing left to release.
    pub(crate) async fn release_context(&self) -> VfsResult<()> {
        let mut st = self.state.lock().await;
        if let Some(mut ctx) = st.context.take() {
            ctx.flush().await?;
        }
        Ok(())
    }
}
