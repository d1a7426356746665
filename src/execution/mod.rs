//! Execution pools.
//!
//! Two pools with different jobs:
//!
//! | Pool | Bound | Used for |
//! |------|-------|----------|
//! | [`ContextExecutor`] | none | Redispatching orchestration off the caller |
//! | [`BoundedTaskRunner`] | `max_concurrent` | Heavy import/export work |
//!
//! Both capture the submitter's request context and tracing span at
//! submission and restore them on the worker.

mod bounded;
mod context_executor;
mod handle;

pub use bounded::BoundedTaskRunner;
pub use context_executor::ContextExecutor;
pub use handle::TaskHandle;
