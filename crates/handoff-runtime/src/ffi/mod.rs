//! Foreign function boundary of the bridge
//!
//! - `table`: pending-call registry and opaque tokens
//! - `codec`: request encoding and result decoding per payload shape
//! - `invoker`: issues foreign calls with a token and a fixed callback
//! - `dispatch`: the `extern "C"` completion callbacks
//! - `loader`: loads foreign operations from a shared library
//!
//! # Safety
//!
//! All `unsafe` code of the bridge lives in this module. Foreign memory is
//! only read inside a callback invocation and copied out before it returns.

pub mod codec;
pub mod dispatch;
pub mod invoker;
pub mod loader;
pub mod table;
pub mod types;

pub use codec::{EncodedRequest, EntryFault, StringListDecode};
pub use dispatch::{on_blob_complete, on_scalar_complete, on_string_list_complete, RawResult};
pub use invoker::{CallInvoker, ForeignOps};
pub use loader::{ForeignLibrary, SymbolNames};
pub use table::{ContextTable, PendingCall, ResultSlot, Token};
pub use types::{
    BlobCallback, BlobOpFn, Operation, RequestPayload, ResultPayload, ScalarCallback, ScalarOpFn,
    Shape, StringListCallback, StringListOpFn,
};
