//! Call invoker - issues foreign calls through direct function pointers
//!
//! Foreign operation signatures are fixed per shape, so each call is a plain
//! typed function-pointer call; no dynamic call interface is needed.
//!
//! Order of events for one call:
//! 1. Register a pending call in the context table
//! 2. Encode the request into buffers owned by the invoker
//! 3. Call the foreign operation with the fixed completion callback and the token
//! 4. Free the request buffers once the foreign call returns control
//!
//! If step 2 fails, or the operation is not bound, the foreign call is never
//! issued and the invoker retires its own pending call as failed.

use crate::async_runtime::Completion;
use crate::error::{BridgeError, BridgeResult};
use crate::ffi::codec::EncodedRequest;
use crate::ffi::dispatch::{
    on_blob_complete, on_scalar_complete, on_string_list_complete, report_internal_fault,
};
use crate::ffi::loader::ForeignLibrary;
use crate::ffi::table::{ContextTable, Token};
use crate::ffi::types::{BlobOpFn, Operation, RequestPayload, ScalarOpFn, StringListOpFn};
use std::fmt;
use std::os::raw::{c_int, c_void};
use std::sync::Arc;

/// Foreign entry points, one per operation
///
/// Unbound operations fail with `EncodeFailure` without issuing a call.
#[derive(Clone, Copy, Default)]
pub struct ForeignOps {
    pub scalar: Option<ScalarOpFn>,
    pub string_list: Option<StringListOpFn>,
    pub blob: Option<BlobOpFn>,
}

impl ForeignOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scalar(mut self, op: ScalarOpFn) -> Self {
        self.scalar = Some(op);
        self
    }

    pub fn with_string_list(mut self, op: StringListOpFn) -> Self {
        self.string_list = Some(op);
        self
    }

    pub fn with_blob(mut self, op: BlobOpFn) -> Self {
        self.blob = Some(op);
        self
    }

    pub fn is_bound(&self, op: Operation) -> bool {
        match op {
            Operation::RunTask => self.scalar.is_some(),
            Operation::ProcessString => self.string_list.is_some(),
            Operation::ProcessMessage => self.blob.is_some(),
        }
    }
}

impl fmt::Debug for ForeignOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignOps")
            .field("scalar", &self.scalar.is_some())
            .field("string_list", &self.string_list.is_some())
            .field("blob", &self.blob.is_some())
            .finish()
    }
}

/// Issues foreign calls on behalf of one context table
pub struct CallInvoker {
    table: Arc<ContextTable>,
    ops: ForeignOps,
    /// Keeps a loaded library mapped while its function pointers are in use
    library: Option<Arc<ForeignLibrary>>,
}

impl CallInvoker {
    pub fn new(table: Arc<ContextTable>, ops: ForeignOps) -> Self {
        Self {
            table,
            ops,
            library: None,
        }
    }

    /// Invoker bound to the operations of a loaded library
    pub fn with_library(table: Arc<ContextTable>, library: Arc<ForeignLibrary>) -> Self {
        Self {
            table,
            ops: library.ops(),
            library: Some(library),
        }
    }

    pub fn table(&self) -> &Arc<ContextTable> {
        &self.table
    }

    pub fn ops(&self) -> ForeignOps {
        self.ops
    }

    pub fn library(&self) -> Option<&Arc<ForeignLibrary>> {
        self.library.as_ref()
    }

    /// Issue `op` with `payload` and return the completion of the new call
    ///
    /// Returns as soon as the foreign call returns control. Fails directly
    /// only if the call could not be registered; every later failure is
    /// delivered through the returned completion.
    pub fn invoke(&self, op: Operation, payload: RequestPayload) -> BridgeResult<Completion> {
        let (token, completion) = self.table.register(op.shape())?;

        if let Err(err) = self.issue(op, token, payload) {
            tracing::debug!(token = %token, error = %err, "call abandoned before issue");
            self.abandon(token, err);
        }

        Ok(completion)
    }

    fn issue(&self, op: Operation, token: Token, payload: RequestPayload) -> BridgeResult<()> {
        if payload.result_shape() != op.shape() {
            return Err(BridgeError::ShapeMismatch {
                expected: op.shape(),
                got: payload.result_shape(),
            });
        }

        let encoded = EncodedRequest::encode(payload)?;
        let len = encoded.len();
        let handle = token.into_raw();

        match (op, &encoded) {
            (Operation::RunTask, EncodedRequest::Scalar(input)) => {
                let call = self.ops.scalar.ok_or_else(|| unbound(op))?;
                tracing::debug!(token = %token, shape = ?op.shape(), "issuing foreign call");
                unsafe { call(*input, Some(on_scalar_complete), handle) };
            }
            (Operation::ProcessString, EncodedRequest::Text(text)) => {
                let call = self.ops.string_list.ok_or_else(|| unbound(op))?;
                tracing::debug!(token = %token, shape = ?op.shape(), len, "issuing foreign call");
                unsafe { call(text.as_ptr(), Some(on_string_list_complete), handle) };
            }
            (Operation::ProcessMessage, EncodedRequest::Binary(bytes)) => {
                let call = self.ops.blob.ok_or_else(|| unbound(op))?;
                let length = c_int::try_from(bytes.len()).map_err(|_| {
                    BridgeError::EncodeFailure(format!("{} byte request is too large", bytes.len()))
                })?;
                tracing::debug!(token = %token, shape = ?op.shape(), len, "issuing foreign call");
                unsafe {
                    call(
                        bytes.as_ptr() as *const c_void,
                        length,
                        Some(on_blob_complete),
                        handle,
                    )
                };
            }
            (op, encoded) => {
                return Err(BridgeError::InternalFault(format!(
                    "{:?} request encoded as {:?}",
                    op, encoded
                )))
            }
        }

        // The foreign side has copied what it needs
        drop(encoded);
        Ok(())
    }

    fn abandon(&self, token: Token, err: BridgeError) {
        match self.table.retire(token) {
            Ok(mut call) => {
                if let Err(fault) = call.resolve(Err(err)) {
                    report_internal_fault(&fault);
                }
            }
            // Already cancelled or drained by another thread
            Err(_) => tracing::debug!(token = %token, "abandoned call was already retired"),
        }
    }
}

impl fmt::Debug for CallInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallInvoker")
            .field("table", &self.table)
            .field("ops", &self.ops)
            .field("library", &self.library.as_ref().map(|l| l.path().to_path_buf()))
            .finish()
    }
}

fn unbound(op: Operation) -> BridgeError {
    BridgeError::EncodeFailure(format!("no foreign function bound for {:?}", op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::types::{BlobCallback, ResultPayload, ScalarCallback, StringListCallback};
    use crate::error::ErrorKind;
    use std::ffi::CStr;
    use std::os::raw::{c_char, c_double};

    // Completes synchronously on the calling thread
    unsafe extern "C" fn doubling_op(
        input: c_double,
        callback: Option<ScalarCallback>,
        handle: *mut c_void,
    ) {
        if let Some(cb) = callback {
            cb(handle, input * 2.0);
        }
    }

    unsafe extern "C" fn upper_op(
        input: *const c_char,
        callback: Option<StringListCallback>,
        handle: *mut c_void,
    ) {
        let text = CStr::from_ptr(input).to_string_lossy().to_uppercase();
        let owned = std::ffi::CString::new(text).unwrap();
        let mut entries = [owned.as_ptr() as *mut c_char];
        if let Some(cb) = callback {
            cb(handle, entries.as_mut_ptr(), 1);
        }
    }

    // Never completes
    unsafe extern "C" fn silent_blob_op(
        _data: *const c_void,
        _length: c_int,
        _callback: Option<BlobCallback>,
        _handle: *mut c_void,
    ) {
    }

    fn invoker(ops: ForeignOps) -> CallInvoker {
        CallInvoker::new(ContextTable::new().unwrap(), ops)
    }

    #[test]
    fn test_invoke_scalar() {
        let invoker = invoker(ForeignOps::new().with_scalar(doubling_op));
        let completion = invoker
            .invoke(Operation::RunTask, RequestPayload::Scalar(21.0))
            .unwrap();
        assert_eq!(completion.wait_blocking().unwrap(), ResultPayload::Scalar(42.0));
        assert_eq!(invoker.table().pending(), 0);
    }

    #[test]
    fn test_invoke_string_list() {
        let invoker = invoker(ForeignOps::new().with_string_list(upper_op));
        let completion = invoker
            .invoke(Operation::ProcessString, RequestPayload::Text("hi".into()))
            .unwrap();
        assert_eq!(
            completion.wait_blocking().unwrap(),
            ResultPayload::StringList(vec!["HI".into()])
        );
    }

    #[test]
    fn test_encode_failure_retires_call() {
        let invoker = invoker(ForeignOps::new().with_string_list(upper_op));
        let completion = invoker
            .invoke(Operation::ProcessString, RequestPayload::Text("a\0b".into()))
            .unwrap();

        assert_eq!(invoker.table().pending(), 0);
        assert_eq!(
            completion.wait_blocking().unwrap_err().kind(),
            ErrorKind::EncodeFailure
        );
    }

    #[test]
    fn test_unbound_operation_fails_without_issue() {
        let invoker = invoker(ForeignOps::new());
        let completion = invoker
            .invoke(Operation::RunTask, RequestPayload::Scalar(1.0))
            .unwrap();

        assert!(matches!(
            completion.wait_blocking(),
            Err(BridgeError::EncodeFailure(_))
        ));
        assert_eq!(invoker.table().pending(), 0);
    }

    #[test]
    fn test_payload_shape_must_match_operation() {
        let invoker = invoker(ForeignOps::new().with_scalar(doubling_op));
        let completion = invoker
            .invoke(Operation::RunTask, RequestPayload::Text("x".into()))
            .unwrap();

        assert!(matches!(
            completion.wait_blocking(),
            Err(BridgeError::ShapeMismatch {
                expected: crate::ffi::Shape::Scalar,
                got: crate::ffi::Shape::StringList
            })
        ));
    }

    #[test]
    fn test_uncompleted_call_stays_pending() {
        let invoker = invoker(ForeignOps::new().with_blob(silent_blob_op));
        let mut completion = invoker
            .invoke(Operation::ProcessMessage, RequestPayload::Binary(vec![1, 2, 3]))
            .unwrap();

        assert!(completion.try_take().is_none());
        assert_eq!(invoker.table().pending(), 1);

        invoker.table().cancel(completion.token()).unwrap();
        assert!(matches!(
            completion.try_take(),
            Some(Err(BridgeError::Cancelled(_)))
        ));
    }

    #[test]
    fn test_full_table_fails_directly() {
        let invoker = CallInvoker::new(
            ContextTable::with_capacity(1).unwrap(),
            ForeignOps::new().with_blob(silent_blob_op),
        );
        let _first = invoker
            .invoke(Operation::ProcessMessage, RequestPayload::Binary(vec![]))
            .unwrap();
        let second = invoker.invoke(Operation::ProcessMessage, RequestPayload::Binary(vec![]));
        assert!(matches!(second, Err(BridgeError::EncodeFailure(_))));
    }
}
