//! Payload codec - caller values ↔ boundary representations
//!
//! Request side:
//! - `EncodedRequest::encode()` turns a `RequestPayload` into buffers that
//!   stay pinned for the synchronous part of the foreign call
//!
//! Result side:
//! - `decode_string_list()` copies a foreign `char**` array, skipping bad entries
//! - `copy_blob()` copies exactly `length` bytes of a foreign buffer
//! - `decode_message()` decodes copied bytes into a protobuf message
//!
//! # Memory Safety
//!
//! - Request buffers are owned by `EncodedRequest` and freed on drop, after
//!   the foreign call has returned control
//! - Foreign result memory is only borrowed while it is copied out
//! - Null pointers are checked before every dereference

use crate::error::{BridgeError, BridgeResult};
use crate::ffi::types::RequestPayload;
use prost::Message;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_int, c_void};

/// Request payload converted for the boundary
///
/// Owns every buffer a foreign call reads from. Keep it alive until the
/// foreign call returns.
#[derive(Debug)]
pub enum EncodedRequest {
    Scalar(c_double),
    Text(CString),
    Binary(Vec<u8>),
}

impl EncodedRequest {
    pub fn encode(payload: RequestPayload) -> BridgeResult<Self> {
        match payload {
            RequestPayload::Scalar(value) => Ok(EncodedRequest::Scalar(value)),
            RequestPayload::Text(text) => CString::new(text).map(EncodedRequest::Text).map_err(|e| {
                BridgeError::EncodeFailure(format!(
                    "text contains a nul byte at position {}",
                    e.nul_position()
                ))
            }),
            RequestPayload::Binary(bytes) => {
                c_int::try_from(bytes.len()).map_err(|_| {
                    BridgeError::EncodeFailure(format!(
                        "binary payload of {} bytes exceeds the c_int length limit",
                        bytes.len()
                    ))
                })?;
                Ok(EncodedRequest::Binary(bytes))
            }
        }
    }

    /// Byte size of the buffer handed to foreign code
    pub fn len(&self) -> usize {
        match self {
            EncodedRequest::Scalar(_) => std::mem::size_of::<c_double>(),
            EncodedRequest::Text(text) => text.as_bytes_with_nul().len(),
            EncodedRequest::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of decoding a foreign string array
#[derive(Debug, Default)]
pub struct StringListDecode {
    /// Copied entries, in their original order
    pub strings: Vec<String>,
    /// Entries that were skipped or repaired, with the reason
    pub faults: Vec<EntryFault>,
}

/// A string-list entry that could not be decoded
#[derive(Debug)]
pub struct EntryFault {
    pub index: usize,
    pub error: BridgeError,
}

/// Copy a foreign `char**` array into owned strings
///
/// A null entry is skipped and recorded in `faults`. An entry with invalid
/// UTF-8 is kept with replacement characters and also recorded, so only null
/// entries shorten the list. A null array with a non-zero count, or a
/// negative count, fails the whole list.
///
/// # Safety
///
/// If `array` is non-null it must point to `count` readable pointers, and
/// every non-null entry must point to a nul-terminated string. All of it
/// must stay valid until this function returns.
pub unsafe fn decode_string_list(
    array: *const *const c_char,
    count: c_int,
) -> BridgeResult<StringListDecode> {
    let count = usize::try_from(count)
        .map_err(|_| BridgeError::MalformedPayload(format!("negative string count {}", count)))?;
    if count == 0 {
        return Ok(StringListDecode::default());
    }
    if array.is_null() {
        return Err(BridgeError::PointerFault { index: None });
    }

    let pointers = std::slice::from_raw_parts(array, count);
    let mut decoded = StringListDecode {
        strings: Vec::with_capacity(count),
        faults: Vec::new(),
    };

    for (index, &ptr) in pointers.iter().enumerate() {
        if ptr.is_null() {
            decoded.faults.push(EntryFault {
                index,
                error: BridgeError::PointerFault { index: Some(index) },
            });
            continue;
        }
        let (text, error) = copy_c_string(CStr::from_ptr(ptr));
        decoded.strings.push(text);
        if let Some(error) = error {
            decoded.faults.push(EntryFault { index, error });
        }
    }

    Ok(decoded)
}

/// Copy one foreign string, replacing invalid UTF-8
fn copy_c_string(text: &CStr) -> (String, Option<BridgeError>) {
    match text.to_str() {
        Ok(s) => (s.to_owned(), None),
        Err(e) => (
            text.to_string_lossy().into_owned(),
            Some(BridgeError::MalformedPayload(format!("invalid UTF-8: {}", e))),
        ),
    }
}

/// Copy exactly `length` bytes of a foreign buffer
///
/// Never looks for a terminator. A zero length yields an empty buffer even
/// when `data` is null.
///
/// # Safety
///
/// If `length > 0`, `data` must point to at least `length` readable bytes
/// that stay valid until this function returns.
pub unsafe fn copy_blob(data: *const c_void, length: c_int) -> BridgeResult<Vec<u8>> {
    let length = usize::try_from(length)
        .map_err(|_| BridgeError::MalformedPayload(format!("negative blob length {}", length)))?;
    if length == 0 {
        return Ok(Vec::new());
    }
    if data.is_null() {
        return Err(BridgeError::PointerFault { index: None });
    }
    Ok(std::slice::from_raw_parts(data as *const u8, length).to_vec())
}

/// Decode copied bytes as a protobuf message
pub fn decode_message<M: Message + Default>(bytes: &[u8]) -> BridgeResult<M> {
    M::decode(bytes).map_err(|e| {
        BridgeError::MalformedPayload(format!(
            "{} ({} bytes): {}",
            std::any::type_name::<M>().rsplit("::").next().unwrap_or("message"),
            bytes.len(),
            e
        ))
    })
}
