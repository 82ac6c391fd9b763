//! Completion future for a pending foreign call
//!
//! A `Completion` is the caller's half of a pending call's result slot.
//! It can be awaited, polled without blocking, or waited on from a thread
//! outside any async runtime.
//!
//! # State Machine
//! - Pending → Resolved(success)
//! - Pending → Resolved(failure)
//! - Once resolved, the outcome is taken exactly once

use crate::error::{BridgeError, BridgeResult};
use crate::ffi::table::Token;
use crate::ffi::types::ResultPayload;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Outcome delivered through a call's result slot
pub type Outcome = BridgeResult<ResultPayload>;

/// Observed state of a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Pending,
    /// The outcome is ready to be taken
    Ready,
    /// The outcome was already taken
    Taken,
}

/// Awaitable result of one foreign call
pub struct Completion {
    token: Token,
    rx: Option<oneshot::Receiver<Outcome>>,
}

impl Completion {
    pub(crate) fn new(token: Token, rx: oneshot::Receiver<Outcome>) -> Self {
        Self { token, rx: Some(rx) }
    }

    /// Token of the call this completion belongs to
    pub fn token(&self) -> Token {
        self.token
    }

    /// Take the outcome if the call has been resolved
    pub fn try_take(&mut self) -> Option<Outcome> {
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Ok(outcome) => {
                self.rx = None;
                Some(outcome)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.rx = None;
                Some(Err(self.abandoned()))
            }
        }
    }

    pub fn state(&self) -> CompletionState {
        match &self.rx {
            None => CompletionState::Taken,
            Some(rx) if rx.is_terminated() => CompletionState::Taken,
            Some(rx) if rx.is_empty() => CompletionState::Pending,
            Some(_) => CompletionState::Ready,
        }
    }

    /// Block the current thread until the call resolves
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait_blocking(mut self) -> Outcome {
        match self.rx.take() {
            Some(rx) => rx.blocking_recv().unwrap_or_else(|_| Err(self.abandoned())),
            None => Err(self.already_taken()),
        }
    }

    fn abandoned(&self) -> BridgeError {
        BridgeError::InternalFault(format!(
            "call {} was dropped without being resolved",
            self.token
        ))
    }

    fn already_taken(&self) -> BridgeError {
        BridgeError::InternalFault(format!("outcome of call {} already taken", self.token))
    }
}

impl Future for Completion {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(Err(self.already_taken()));
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(received) => {
                self.rx = None;
                Poll::Ready(received.unwrap_or_else(|_| Err(self.abandoned())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("token", &self.token)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::table::ContextTable;
    use crate::ffi::types::Shape;

    #[test]
    fn test_try_take_pending_then_ready() {
        let table = ContextTable::new().unwrap();
        let (token, mut completion) = table.register(Shape::Scalar).unwrap();

        assert_eq!(completion.state(), CompletionState::Pending);
        assert!(completion.try_take().is_none());

        let mut call = table.retire(token).unwrap();
        call.resolve(Ok(ResultPayload::Scalar(16.0))).unwrap();

        assert_eq!(completion.state(), CompletionState::Ready);
        match completion.try_take() {
            Some(Ok(ResultPayload::Scalar(v))) => assert_eq!(v, 16.0),
            other => panic!("expected scalar outcome, got {:?}", other),
        }
        assert_eq!(completion.state(), CompletionState::Taken);
    }

    #[test]
    fn test_dropped_call_reports_abandoned() {
        let table = ContextTable::new().unwrap();
        let (token, completion) = table.register(Shape::Blob).unwrap();
        drop(table.retire(token).unwrap());

        assert!(matches!(
            completion.wait_blocking(),
            Err(BridgeError::InternalFault(_))
        ));
    }

    #[tokio::test]
    async fn test_await_resolution_from_other_thread() {
        let table = ContextTable::new().unwrap();
        let (token, completion) = table.register(Shape::StringList).unwrap();

        let worker_table = table.clone();
        std::thread::spawn(move || {
            let mut call = worker_table.retire(token).unwrap();
            call.resolve(Ok(ResultPayload::StringList(vec!["a".into()])))
                .unwrap();
        });

        let outcome = completion.await.unwrap();
        assert_eq!(outcome, ResultPayload::StringList(vec!["a".into()]));
    }
}
