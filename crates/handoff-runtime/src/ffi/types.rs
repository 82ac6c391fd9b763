//! Boundary types - payload shapes and C callback signatures
//!
//! Defines:
//! - `Shape`: the payload kind governing marshaling rules
//! - `Operation`: the three foreign entry points
//! - `RequestPayload` / `ResultPayload`: caller-side values for each shape
//! - C function pointer types for foreign operations and completion callbacks
//!
//! Shape mapping:
//! - Operation::RunTask → RequestPayload::Scalar → ResultPayload::Scalar
//! - Operation::ProcessString → RequestPayload::Text → ResultPayload::StringList
//! - Operation::ProcessMessage → RequestPayload::Binary → ResultPayload::Message

use crate::message::ProcessResponse;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::os::raw::{c_char, c_double, c_int, c_void};

/// Payload kind of a pending call's result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    /// A single `double`, passed by value
    Scalar,
    /// An array of C strings plus a count
    StringList,
    /// A (pointer, length) buffer carrying a serialized message
    Blob,
}

impl Shape {
    pub fn display_name(&self) -> &'static str {
        match self {
            Shape::Scalar => "scalar",
            Shape::StringList => "string-list",
            Shape::Blob => "blob",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Foreign entry points the bridge can address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    RunTask,
    ProcessString,
    ProcessMessage,
}

impl Operation {
    /// Shape of the result this operation delivers to its callback
    pub fn shape(&self) -> Shape {
        match self {
            Operation::RunTask => Shape::Scalar,
            Operation::ProcessString => Shape::StringList,
            Operation::ProcessMessage => Shape::Blob,
        }
    }
}

/// Request handed to the call invoker
#[derive(Debug, Clone, PartialEq)]
pub enum RequestPayload {
    Scalar(f64),
    Text(String),
    /// Already-serialized message bytes
    Binary(Vec<u8>),
}

impl RequestPayload {
    /// Shape of the result a request of this kind expects
    pub fn result_shape(&self) -> Shape {
        match self {
            RequestPayload::Scalar(_) => Shape::Scalar,
            RequestPayload::Text(_) => Shape::StringList,
            RequestPayload::Binary(_) => Shape::Blob,
        }
    }
}

/// Decoded result delivered to the caller
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPayload {
    Scalar(f64),
    StringList(Vec<String>),
    Message(ProcessResponse),
}

impl ResultPayload {
    pub fn shape(&self) -> Shape {
        match self {
            ResultPayload::Scalar(_) => Shape::Scalar,
            ResultPayload::StringList(_) => Shape::StringList,
            ResultPayload::Message(_) => Shape::Blob,
        }
    }
}

/// `void (*)(void* handle, double result)`
pub type ScalarCallback = unsafe extern "C" fn(handle: *mut c_void, result: c_double);

/// `void (*)(void* handle, char** strings, int count)`
pub type StringListCallback =
    unsafe extern "C" fn(handle: *mut c_void, strings: *mut *mut c_char, count: c_int);

/// `void (*)(void* handle, void* data, int length)`
pub type BlobCallback = unsafe extern "C" fn(handle: *mut c_void, data: *mut c_void, length: c_int);

/// `void run_task_async(double input, ScalarCallback cb, void* handle)`
pub type ScalarOpFn =
    unsafe extern "C" fn(input: c_double, callback: Option<ScalarCallback>, handle: *mut c_void);

/// `void process_string_async(const char* input, StringListCallback cb, void* handle)`
pub type StringListOpFn = unsafe extern "C" fn(
    input: *const c_char,
    callback: Option<StringListCallback>,
    handle: *mut c_void,
);

/// `void process_protobuf_async(void* data, int length, BlobCallback cb, void* handle)`
pub type BlobOpFn = unsafe extern "C" fn(
    data: *const c_void,
    length: c_int,
    callback: Option<BlobCallback>,
    handle: *mut c_void,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_shapes() {
        assert_eq!(Operation::RunTask.shape(), Shape::Scalar);
        assert_eq!(Operation::ProcessString.shape(), Shape::StringList);
        assert_eq!(Operation::ProcessMessage.shape(), Shape::Blob);
    }

    #[test]
    fn test_request_result_shapes_agree() {
        let requests = [
            (RequestPayload::Scalar(1.0), Operation::RunTask),
            (RequestPayload::Text("x".into()), Operation::ProcessString),
            (RequestPayload::Binary(vec![1, 2]), Operation::ProcessMessage),
        ];
        for (request, op) in requests {
            assert_eq!(request.result_shape(), op.shape());
        }
    }

    #[test]
    fn test_shape_display_names() {
        assert_eq!(Shape::Scalar.to_string(), "scalar");
        assert_eq!(Shape::StringList.to_string(), "string-list");
        assert_eq!(Shape::Blob.to_string(), "blob");
    }
}
