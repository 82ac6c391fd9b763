//! Async runtime infrastructure for the bridge
//!
//! - `Completion`: the awaitable caller half of a pending call
//! - Tokio runtime construction for synchronous entry points (the CLI)
//!
//! Foreign completion callbacks never run caller continuations themselves;
//! they only push an outcome into a oneshot channel that the awaiting task
//! picks up on its own runtime.

pub mod future;

pub use future::{Completion, CompletionState, Outcome};

use crate::error::BridgeResult;
use tokio::runtime::{Builder, Runtime};

/// Build a current-thread tokio runtime with time and I/O drivers enabled
pub fn build_runtime() -> BridgeResult<Runtime> {
    Ok(Builder::new_current_thread().enable_all().build()?)
}

/// Block on a future until it completes
///
/// This bridges the sync/async boundary for callers that are not already
/// inside a runtime. Foreign callbacks arrive on their own threads, so a
/// single-threaded runtime is enough to wait on any number of calls.
pub fn block_on<F>(future: F) -> BridgeResult<F::Output>
where
    F: std::future::Future,
{
    let runtime = build_runtime()?;
    Ok(runtime.block_on(future))
}
