//! Block addressing and the shared block cache.
//!
//! Submodules:
//! - `layout`: block size constants and offset-to-block-range math
//! - `cache`: the process-wide, size-bounded cache of block buffers

pub mod cache;
pub mod layout;
