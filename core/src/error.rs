//! Error types for request operations.
//!
//! # Design
//! Construction problems (`InvalidArgument`) are returned synchronously.
//! Everything that happens after `submit()` reaches the caller as an
//! `OperationError` through the failure callback. Transport errors are kept
//! apart from decode and status errors so callers can retry the former and
//! not the latter.

use std::fmt;

use crate::operation::OperationState;

/// A request or operation that cannot be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidArgument {
    /// The method token is empty.
    EmptyMethod,

    /// The method token contains characters outside the HTTP token set.
    InvalidMethod(String),

    /// The URL does not parse, or is not an absolute http(s) URL.
    InvalidUrl { url: String, reason: String },
}

impl fmt::Display for InvalidArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidArgument::EmptyMethod => write!(f, "invalid argument: empty HTTP method"),
            InvalidArgument::InvalidMethod(method) => {
                write!(f, "invalid argument: bad HTTP method {method:?}")
            }
            InvalidArgument::InvalidUrl { url, reason } => {
                write!(f, "invalid argument: bad URL {url:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for InvalidArgument {}

/// `submit()` was called on an operation that is no longer `Created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    NotCreated(OperationState),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::NotCreated(state) => {
                write!(f, "operation cannot be submitted in state {state:?}")
            }
        }
    }
}

impl std::error::Error for SubmitError {}

/// Category of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    ConnectionRefused,
    ConnectionReset,
    Timeout,
    Dns,
    Tls,
    /// The operation was cancelled before a terminal callback fired.
    Cancelled,
    Other,
}

impl TransportErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            TransportErrorKind::ConnectionRefused => "connection refused",
            TransportErrorKind::ConnectionReset => "connection reset",
            TransportErrorKind::Timeout => "timed out",
            TransportErrorKind::Dns => "DNS resolution failed",
            TransportErrorKind::Tls => "TLS error",
            TransportErrorKind::Cancelled => "cancelled",
            TransportErrorKind::Other => "transport error",
        }
    }
}

/// A failure reported by the executor, or a cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(TransportErrorKind::Cancelled, "operation cancelled")
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == TransportErrorKind::Cancelled
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.kind.as_str())
        } else {
            write!(f, "{}: {}", self.kind.as_str(), self.message)
        }
    }
}

impl std::error::Error for TransportError {}

/// The body could not be parsed as a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// Byte offset into the body where decoding failed, when known.
    pub offset: Option<usize>,
    pub reason: String,
}

impl DecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            offset: None,
            reason: reason.into(),
        }
    }

    pub fn at(offset: usize, reason: impl Into<String>) -> Self {
        Self {
            offset: Some(offset),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "decode failed at byte {offset}: {}", self.reason),
            None => write!(f, "decode failed: {}", self.reason),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors delivered to the failure callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// No response: the executor failed, or the operation was cancelled.
    Transport(TransportError),

    /// A success-range response whose body is not a valid document.
    Decode(DecodeError),

    /// The server answered with a status of 400 or above.
    UnexpectedStatus(u16),

    /// Content-type enforcement is on and the response declared a media type
    /// the decoder does not accept.
    UnacceptableContentType(Option<String>),
}

impl OperationError {
    /// Transport failures may succeed on retry; cancellation and anything
    /// the server actually answered will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            OperationError::Transport(err) => !err.is_cancelled(),
            OperationError::Decode(_)
            | OperationError::UnexpectedStatus(_)
            | OperationError::UnacceptableContentType(_) => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, OperationError::Transport(err) if err.is_cancelled())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            OperationError::UnexpectedStatus(status) => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationError::Transport(err) => write!(f, "transport failed: {err}"),
            OperationError::Decode(err) => err.fmt(f),
            OperationError::UnexpectedStatus(status) => {
                write!(f, "unexpected HTTP status {status}")
            }
            OperationError::UnacceptableContentType(Some(content_type)) => {
                write!(f, "unacceptable content type {content_type:?}")
            }
            OperationError::UnacceptableContentType(None) => {
                write!(f, "unacceptable content type")
            }
        }
    }
}

impl std::error::Error for OperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OperationError::Transport(err) => Some(err),
            OperationError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for OperationError {
    fn from(err: TransportError) -> Self {
        OperationError::Transport(err)
    }
}

impl From<DecodeError> for OperationError {
    fn from(err: DecodeError) -> Self {
        OperationError::Decode(err)
    }
}
