//! Handoff Native - reference foreign operations with a C ABI
//!
//! Each export returns immediately and completes on a worker thread by
//! calling the supplied callback exactly once with the caller's handle:
//! - `run_task_async`: square root of a double
//! - `process_string_async`: the input string twice
//! - `process_protobuf_async`: a `ProcessResponse` for a `ProcessRequest`
//!
//! Inputs are copied before the export returns. Result memory belongs to
//! this library and is freed after the callback returns, so callers must
//! copy anything they keep.

use handoff_runtime::ffi::{BlobCallback, ForeignOps, ScalarCallback, StringListCallback};
use handoff_runtime::{ProcessRequest, ProcessResponse};
use prost::Message;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_int, c_void};
use std::thread;

/// Handle passed through a worker thread untouched
#[derive(Clone, Copy)]
struct Handle(usize);

impl Handle {
    fn new(raw: *mut c_void) -> Self {
        Handle(raw as usize)
    }

    fn as_raw(self) -> *mut c_void {
        self.0 as *mut c_void
    }
}

fn spawn_worker(op: &'static str, work: impl FnOnce() + Send + 'static) {
    let spawned = thread::Builder::new()
        .name(format!("handoff-native-{}", op))
        .spawn(work);
    if let Err(err) = spawned {
        tracing::error!(op, error = %err, "failed to start worker thread; call will not complete");
    }
}

/// `void run_task_async(double input, ScalarCallback cb, void* handle)`
///
/// # Safety
///
/// `callback`, if set, must be safe to call from any thread with `handle`.
#[no_mangle]
pub unsafe extern "C" fn run_task_async(
    input: c_double,
    callback: Option<ScalarCallback>,
    handle: *mut c_void,
) {
    let Some(callback) = callback else {
        tracing::debug!("run_task_async called without a callback");
        return;
    };
    let handle = Handle::new(handle);

    spawn_worker("scalar", move || {
        let result = input.sqrt();
        tracing::debug!(input, result, "scalar task finished");
        unsafe { callback(handle.as_raw(), result) };
    });
}

/// `void process_string_async(const char* input, StringListCallback cb, void* handle)`
///
/// A null `input` is treated as the empty string.
///
/// # Safety
///
/// `input` must be null or a nul-terminated string valid for the duration
/// of this call. `callback`, if set, must be safe to call from any thread.
#[no_mangle]
pub unsafe extern "C" fn process_string_async(
    input: *const c_char,
    callback: Option<StringListCallback>,
    handle: *mut c_void,
) {
    let Some(callback) = callback else {
        tracing::debug!("process_string_async called without a callback");
        return;
    };
    let text = if input.is_null() {
        CString::default()
    } else {
        CStr::from_ptr(input).to_owned()
    };
    let handle = Handle::new(handle);

    spawn_worker("string-list", move || {
        let owned = [text.clone(), text];
        let mut array: Vec<*mut c_char> = owned.into_iter().map(CString::into_raw).collect();
        let count = array.len() as c_int;

        unsafe { callback(handle.as_raw(), array.as_mut_ptr(), count) };

        for ptr in array {
            drop(unsafe { CString::from_raw(ptr) });
        }
        tracing::debug!(count, "string-list task finished");
    });
}

/// `void process_protobuf_async(const void* data, int length, BlobCallback cb, void* handle)`
///
/// # Safety
///
/// `data` must point to `length` readable bytes for the duration of this
/// call; a null `data` or non-positive `length` reads nothing. `callback`,
/// if set, must be safe to call from any thread.
#[no_mangle]
pub unsafe extern "C" fn process_protobuf_async(
    data: *const c_void,
    length: c_int,
    callback: Option<BlobCallback>,
    handle: *mut c_void,
) {
    let Some(callback) = callback else {
        tracing::debug!("process_protobuf_async called without a callback");
        return;
    };
    let request = match usize::try_from(length) {
        Ok(len) if len > 0 && !data.is_null() => {
            std::slice::from_raw_parts(data as *const u8, len).to_vec()
        }
        _ => Vec::new(),
    };
    let handle = Handle::new(handle);

    spawn_worker("blob", move || {
        let response = respond(&request);
        let mut bytes = response.encode_to_vec();
        let length = bytes.len() as c_int;

        unsafe { callback(handle.as_raw(), bytes.as_mut_ptr() as *mut c_void, length) };

        drop(bytes);
        tracing::debug!(success = response.success, length, "blob task finished");
    });
}

/// Build the response for a serialized `ProcessRequest`
pub fn respond(request: &[u8]) -> ProcessResponse {
    let timestamp = chrono::Utc::now().timestamp();
    match ProcessRequest::decode(request) {
        Ok(request) => ProcessResponse {
            result_strings: vec![
                format!("{}_processed", request.input_text),
                "generated_string".to_string(),
                format!("{}_final", request.input_text),
            ],
            calculated_value: request.number_value.sqrt(),
            success: true,
            error_message: String::new(),
            timestamp,
        },
        Err(err) => ProcessResponse {
            success: false,
            error_message: format!("failed to decode ProcessRequest: {}", err),
            timestamp,
            ..Default::default()
        },
    }
}

/// The three exports bound as in-process foreign operations
pub fn builtin_ops() -> ForeignOps {
    ForeignOps::new()
        .with_scalar(run_task_async)
        .with_string_list(process_string_async)
        .with_blob(process_protobuf_async)
}
