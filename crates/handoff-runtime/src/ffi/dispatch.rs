//! Completion dispatcher - the callbacks foreign code invokes
//!
//! Each shape has one fixed `extern "C"` entry point. Foreign code calls it
//! on any thread with the token it was given and a raw result. The
//! dispatcher:
//! 1. Retires the token (an unknown token is logged and dropped)
//! 2. Copies and decodes the raw result for the call's declared shape
//! 3. Resolves the call's result slot exactly once
//!
//! Nothing escapes a callback: decode failures become the call's outcome,
//! and panics are caught before they can unwind into foreign frames.

use crate::error::{BridgeError, BridgeResult};
use crate::ffi::codec::{copy_blob, decode_message, decode_string_list};
use crate::ffi::table::{ContextTable, Token};
use crate::ffi::types::{ResultPayload, Shape};
use crate::message::ProcessResponse;
use crate::async_runtime::Outcome;
use std::os::raw::{c_char, c_double, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};

/// Result exactly as the foreign side delivered it
#[derive(Debug, Clone, Copy)]
pub enum RawResult {
    Scalar(c_double),
    StringList {
        array: *const *const c_char,
        count: c_int,
    },
    Blob {
        data: *const c_void,
        length: c_int,
    },
}

impl RawResult {
    pub fn shape(&self) -> Shape {
        match self {
            RawResult::Scalar(_) => Shape::Scalar,
            RawResult::StringList { .. } => Shape::StringList,
            RawResult::Blob { .. } => Shape::Blob,
        }
    }
}

/// Resolve the pending call for `token` with a raw foreign result
///
/// Returns `UnknownToken` if the token is not pending in `table`; the raw
/// result is then ignored. Any other error means the call was resolved but
/// resolution itself hit an internal fault.
///
/// # Safety
///
/// Pointers inside `raw` must satisfy the contracts of
/// [`decode_string_list`] and [`copy_blob`] for the duration of this call.
pub unsafe fn complete(table: &ContextTable, token: Token, raw: RawResult) -> BridgeResult<()> {
    let mut call = match table.retire(token) {
        Ok(call) => call,
        Err(err) => {
            tracing::warn!(
                token = %token,
                shape = %raw.shape(),
                "completion for a token that is not pending (double fire, late or cancelled call)"
            );
            return Err(err);
        }
    };

    let outcome = if raw.shape() == call.shape() {
        decode(token, raw)
    } else {
        Err(BridgeError::ShapeMismatch {
            expected: call.shape(),
            got: raw.shape(),
        })
    };

    if let Err(err) = &outcome {
        tracing::warn!(token = %token, error = %err, "call failed");
    }

    call.resolve(outcome).map_err(|fault| {
        report_internal_fault(&fault);
        fault
    })
}

unsafe fn decode(token: Token, raw: RawResult) -> Outcome {
    match raw {
        RawResult::Scalar(value) => Ok(ResultPayload::Scalar(value)),

        RawResult::StringList { array, count } => {
            let decoded =
                decode_string_list(array, count).map_err(BridgeError::into_call_outcome)?;
            for fault in &decoded.faults {
                tracing::warn!(
                    token = %token,
                    index = fault.index,
                    error = %fault.error,
                    "faulty string-list entry"
                );
            }
            Ok(ResultPayload::StringList(decoded.strings))
        }

        RawResult::Blob { data, length } => {
            let bytes = copy_blob(data, length).map_err(BridgeError::into_call_outcome)?;
            decode_message::<ProcessResponse>(&bytes).map(ResultPayload::Message)
        }
    }
}

/// Report a broken exactly-once invariant
///
/// Panics in debug builds; logged and contained in release builds.
pub fn report_internal_fault(fault: &BridgeError) {
    tracing::error!(error = %fault, "internal fault in completion dispatch");
    debug_assert!(false, "internal fault: {}", fault);
}

fn dispatch_raw(handle: *mut c_void, raw: RawResult) {
    let Some(token) = Token::from_raw(handle) else {
        tracing::warn!(shape = %raw.shape(), "completion callback with a null handle");
        return;
    };
    let Some(table) = ContextTable::route(token) else {
        tracing::warn!(token = %token, "completion for a token whose table is gone");
        return;
    };
    // UnknownToken is already logged inside complete()
    let _ = unsafe { complete(&table, token, raw) };
}

fn guarded(callback: &'static str, body: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(body)).is_err() {
        tracing::error!(callback, "panic in completion callback (caught at FFI boundary)");
        if cfg!(debug_assertions) {
            std::process::abort();
        }
    }
}

/// Completion callback of the scalar operation
///
/// # Safety
///
/// Safe for any arguments; `handle` is only interpreted as a token.
pub unsafe extern "C" fn on_scalar_complete(handle: *mut c_void, result: c_double) {
    guarded("scalar", || dispatch_raw(handle, RawResult::Scalar(result)));
}

/// Completion callback of the string-list operation
///
/// # Safety
///
/// `strings` must point to `count` entries that are null or nul-terminated
/// strings, valid until this function returns. The foreign side keeps
/// ownership and frees them afterwards.
pub unsafe extern "C" fn on_string_list_complete(
    handle: *mut c_void,
    strings: *mut *mut c_char,
    count: c_int,
) {
    guarded("string-list", || {
        dispatch_raw(
            handle,
            RawResult::StringList {
                array: strings as *const *const c_char,
                count,
            },
        )
    });
}

/// Completion callback of the blob operation
///
/// # Safety
///
/// `data` must point to `length` readable bytes, valid until this function
/// returns. The foreign side keeps ownership and frees them afterwards.
pub unsafe extern "C" fn on_blob_complete(handle: *mut c_void, data: *mut c_void, length: c_int) {
    guarded("blob", || {
        dispatch_raw(
            handle,
            RawResult::Blob {
                data: data as *const c_void,
                length,
            },
        )
    });
}
