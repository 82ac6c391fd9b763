//! Bridge error types

use crate::ffi::table::Token;
use crate::ffi::types::Shape;
use handoff_config::ConfigError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Retirement referenced a token that is not currently pending
    #[error("Unknown or already retired token: {0}")]
    UnknownToken(Token),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Request-side encoding failed before the foreign call was issued
    #[error("Failed to encode request: {0}")]
    EncodeFailure(String),

    /// A boundary-supplied pointer was null; `index` names the string-list entry
    #[error("Null pointer from foreign side{}", .index.map(|i| format!(" at entry {}", i)).unwrap_or_default())]
    PointerFault { index: Option<usize> },

    #[error("Operation expects a {expected} payload, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    #[error("Call {0} was cancelled")]
    Cancelled(Token),

    #[error("Call {token} timed out after {after:?}")]
    TimedOut { token: Token, after: Duration },

    #[error("Bridge shut down before the call completed")]
    Shutdown,

    #[error("Internal fault: {0}")]
    InternalFault(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Async runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Coarse classification of a [`BridgeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    UnknownToken,
    MalformedPayload,
    EncodeFailure,
    PointerFault,
    Cancelled,
    Shutdown,
    Internal,
    Load,
    Config,
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::UnknownToken(_) => ErrorKind::UnknownToken,
            BridgeError::MalformedPayload(_) => ErrorKind::MalformedPayload,
            BridgeError::EncodeFailure(_) | BridgeError::ShapeMismatch { .. } => {
                ErrorKind::EncodeFailure
            }
            BridgeError::PointerFault { .. } => ErrorKind::PointerFault,
            BridgeError::Cancelled(_) | BridgeError::TimedOut { .. } => ErrorKind::Cancelled,
            BridgeError::Shutdown => ErrorKind::Shutdown,
            BridgeError::InternalFault(_) | BridgeError::Runtime(_) => ErrorKind::Internal,
            BridgeError::Load(_) => ErrorKind::Load,
            BridgeError::Config(_) => ErrorKind::Config,
        }
    }

    /// Collapse a pointer fault into the malformed-payload outcome of a call
    pub(crate) fn into_call_outcome(self) -> BridgeError {
        match self {
            BridgeError::PointerFault { .. } => BridgeError::MalformedPayload(self.to_string()),
            other => other,
        }
    }
}

/// Library loading errors
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Library not found: {0}")]
    LibraryNotFound(String),

    #[error("Symbol '{symbol}' not found in library '{library}'")]
    SymbolNotFound { library: String, symbol: String },

    #[error("Failed to load library: {0}")]
    LoadFailed(String),
}
