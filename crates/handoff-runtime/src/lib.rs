//! Handoff Runtime - async completion bridge across the C ABI
//!
//! Turns foreign operations that report completion through a single-fire
//! callback, on any thread, into awaitable results:
//! - Context table of pending calls keyed by opaque tokens
//! - Payload codec for scalar, string-list and blob results
//! - Call invoker and `extern "C"` completion dispatcher
//! - `Bridge`, the async facade over all of it

/// Handoff runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod async_runtime;
pub mod bridge;
pub mod error;
pub mod ffi;
pub mod message;

pub use async_runtime::{block_on, Completion, CompletionState, Outcome};
pub use bridge::Bridge;
pub use error::{BridgeError, BridgeResult, ErrorKind, LoadError};
pub use ffi::{
    CallInvoker, ContextTable, ForeignLibrary, ForeignOps, Operation, RequestPayload,
    ResultPayload, Shape, SymbolNames, Token,
};
pub use message::{ProcessRequest, ProcessResponse};
