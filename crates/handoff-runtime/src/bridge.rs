//! Async facade over the foreign operations
//!
//! Wraps invoke + completion into one await point per operation. The facade
//! does no decoding or token bookkeeping of its own beyond timeouts.

use crate::async_runtime::{Completion, Outcome};
use crate::error::{BridgeError, BridgeResult};
use crate::ffi::{
    CallInvoker, ContextTable, ForeignLibrary, ForeignOps, Operation, RequestPayload,
    ResultPayload, Shape, SymbolNames,
};
use crate::message::{ProcessRequest, ProcessResponse};
use handoff_config::BridgeConfig;
use prost::Message;
use std::sync::Arc;
use std::time::Duration;

/// Awaitable interface to the three foreign operations
///
/// # Examples
///
/// ```no_run
/// use handoff_runtime::{Bridge, ForeignOps};
///
/// # async fn demo(ops: ForeignOps) -> handoff_runtime::BridgeResult<()> {
/// let bridge = Bridge::new(ops)?;
/// let root = bridge.run_task(256.0).await?;
/// assert_eq!(root, 16.0);
/// # Ok(())
/// # }
/// ```
///
/// Dropping a bridge releases its loaded library. Foreign work still in
/// flight at that point must not call back into unloaded code, so shut the
/// bridge down only once the foreign side is idle.
#[derive(Debug)]
pub struct Bridge {
    table: Arc<ContextTable>,
    invoker: CallInvoker,
    timeout: Option<Duration>,
}

impl Bridge {
    /// Bridge over `ops` with a fresh context table of default capacity
    pub fn new(ops: ForeignOps) -> BridgeResult<Self> {
        Ok(Self::with_table(ContextTable::new()?, ops))
    }

    pub fn with_table(table: Arc<ContextTable>, ops: ForeignOps) -> Self {
        Self {
            invoker: CallInvoker::new(table.clone(), ops),
            table,
            timeout: None,
        }
    }

    /// Bridge over the operations of a loaded library
    pub fn with_library(table: Arc<ContextTable>, library: Arc<ForeignLibrary>) -> Self {
        Self {
            invoker: CallInvoker::with_library(table.clone(), library),
            table,
            timeout: None,
        }
    }

    /// Build a bridge as described by `config`
    ///
    /// Loads the configured library when `library.path` is set, otherwise
    /// binds `fallback`. Capacity and timeout come from the `bridge` section.
    pub fn from_config(config: &BridgeConfig, fallback: ForeignOps) -> BridgeResult<Self> {
        config.validate()?;
        let table = ContextTable::with_capacity(config.max_pending())?;

        let invoker = match config.library_path() {
            Some(path) => {
                let library = ForeignLibrary::open(
                    &path.to_string_lossy(),
                    &SymbolNames::from_config(config),
                )?;
                CallInvoker::with_library(table.clone(), library)
            }
            None => CallInvoker::new(table.clone(), fallback),
        };

        Ok(Self {
            table,
            invoker,
            timeout: config.timeout(),
        })
    }

    /// Cancel calls that take longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn table(&self) -> &Arc<ContextTable> {
        &self.table
    }

    pub fn invoker(&self) -> &CallInvoker {
        &self.invoker
    }

    /// Issue `op` and wait for its outcome
    pub async fn call(&self, op: Operation, payload: RequestPayload) -> BridgeResult<ResultPayload> {
        let completion = self.invoker.invoke(op, payload)?;
        self.settle(completion).await
    }

    /// `sqrt`-style scalar operation
    pub async fn run_task(&self, input: f64) -> BridgeResult<f64> {
        match self.call(Operation::RunTask, RequestPayload::Scalar(input)).await? {
            ResultPayload::Scalar(value) => Ok(value),
            other => Err(unexpected(Shape::Scalar, &other)),
        }
    }

    pub async fn process_string(&self, input: &str) -> BridgeResult<Vec<String>> {
        let payload = RequestPayload::Text(input.to_string());
        match self.call(Operation::ProcessString, payload).await? {
            ResultPayload::StringList(strings) => Ok(strings),
            other => Err(unexpected(Shape::StringList, &other)),
        }
    }

    /// Send a serialized `ProcessRequest` and decode the `ProcessResponse`
    pub async fn process_message(&self, request: &ProcessRequest) -> BridgeResult<ProcessResponse> {
        let payload = RequestPayload::Binary(request.encode_to_vec());
        match self.call(Operation::ProcessMessage, payload).await? {
            ResultPayload::Message(response) => Ok(response),
            other => Err(unexpected(Shape::Blob, &other)),
        }
    }

    /// Resolve every outstanding call with `Shutdown`
    pub fn shutdown(&self) -> usize {
        let drained = self.table.drain();
        tracing::debug!(drained, "bridge shut down");
        drained
    }

    async fn settle(&self, mut completion: Completion) -> Outcome {
        let Some(limit) = self.timeout else {
            return completion.await;
        };

        match tokio::time::timeout(limit, &mut completion).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let token = completion.token();
                match self.table.cancel(token) {
                    Ok(()) => {
                        tracing::warn!(token = %token, after = ?limit, "call timed out");
                        Err(BridgeError::TimedOut { token, after: limit })
                    }
                    // The callback retired it first; its outcome is on the way
                    Err(_) => completion.await,
                }
            }
        }
    }
}

fn unexpected(expected: Shape, got: &ResultPayload) -> BridgeError {
    BridgeError::ShapeMismatch {
        expected,
        got: got.shape(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::ScalarCallback;
    use std::os::raw::{c_double, c_void};

    unsafe extern "C" fn sqrt_inline(
        input: c_double,
        callback: Option<ScalarCallback>,
        handle: *mut c_void,
    ) {
        if let Some(cb) = callback {
            cb(handle, input.sqrt());
        }
    }

    unsafe extern "C" fn never_completes(
        _input: c_double,
        _callback: Option<ScalarCallback>,
        _handle: *mut c_void,
    ) {
    }

    #[tokio::test]
    async fn test_run_task() {
        let bridge = Bridge::new(ForeignOps::new().with_scalar(sqrt_inline)).unwrap();
        assert_eq!(bridge.run_task(256.0).await.unwrap(), 16.0);
        assert_eq!(bridge.table().pending(), 0);
    }

    #[tokio::test]
    async fn test_timeout_cancels_call() {
        let bridge = Bridge::new(ForeignOps::new().with_scalar(never_completes))
            .unwrap()
            .with_timeout(Duration::from_millis(10));

        let err = bridge.run_task(1.0).await.unwrap_err();
        assert!(matches!(err, BridgeError::TimedOut { .. }));
        assert_eq!(bridge.table().pending(), 0);
    }

    #[test]
    fn test_from_config_without_library_uses_fallback() {
        let config = BridgeConfig::from_toml_str("[bridge]\nmax_pending = 8\n").unwrap();
        let bridge =
            Bridge::from_config(&config, ForeignOps::new().with_scalar(sqrt_inline)).unwrap();

        assert_eq!(bridge.table().max_pending(), 8);
        assert!(bridge.invoker().ops().is_bound(Operation::RunTask));
        assert!(bridge.invoker().library().is_none());
    }

    #[test]
    fn test_from_config_missing_library() {
        let config =
            BridgeConfig::from_toml_str("[library]\npath = \"/nonexistent/libnothing.so\"\n")
                .unwrap();
        let err = Bridge::from_config(&config, ForeignOps::new()).unwrap_err();
        assert!(matches!(err, BridgeError::Load(_)));
    }

    #[test]
    fn test_shutdown_drains_pending_calls() {
        let bridge = Bridge::new(ForeignOps::new().with_scalar(never_completes)).unwrap();
        let completion = bridge
            .invoker()
            .invoke(Operation::RunTask, RequestPayload::Scalar(4.0))
            .unwrap();

        assert_eq!(bridge.shutdown(), 1);
        assert!(matches!(
            completion.wait_blocking(),
            Err(BridgeError::Shutdown)
        ));
    }
}
