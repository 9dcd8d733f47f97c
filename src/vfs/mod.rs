//! Protocol-facing core: request router, per-open handles and the block
//! I/O engine behind them.

pub mod context;
pub mod handle;
pub mod router;

pub use context::FileContext;
pub use handle::Handle;
pub use router::{OpenReply, OpenRequest, OpenStatus, Vfs};
