//! # Error Translation
//!
//! One error type for every failure a façade can observe.
//!
//! ## Invariants
//!
//! - Remote failures keep their code, message and remote kind verbatim.
//! - Transport failures surface as `InvalidState`; the core never retries.
//! - Errors are `Clone` so a stored future outcome can be re-raised as-is.

use std::fmt;

use crate::transport;
use crate::transport::Failure;

/// Generic failure with no more specific code.
pub const CODE_GENERIC: i32 = 1;
/// Allocation failure while growing a buffer.
pub const CODE_MEMORY: i32 = 1001;
/// Malformed input, unregistered type, or protocol violation.
pub const CODE_BINARY: i32 = 1002;
/// Target unknown or disposed, connection lost, or completion abandoned.
pub const CODE_INVALID_STATE: i32 = 1003;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Local encode/decode failure.
    Encoding,
    /// A buffer could not grow.
    OutOfMemory,
    /// The call could not reach a live target.
    InvalidState,
    /// The far side ran the operation and reported a failure.
    Remote,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding => write!(f, "encoding"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::InvalidState => write!(f, "invalid state"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    code: i32,
    message: String,
    remote_kind: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: i32, message: impl Into<String>) -> Self {
        Self { kind, code, message: message.into(), remote_kind: None }
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Encoding, CODE_BINARY, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, CODE_INVALID_STATE, message)
    }

    /// Builds an error from a failure record read off the wire.
    pub fn from_failure(kind: ErrorKind, failure: Failure) -> Self {
        Self {
            kind,
            code: failure.code,
            message: failure.message,
            remote_kind: failure.remote_kind,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Name of the error class on the far side, if it sent one.
    pub fn remote_kind(&self) -> Option<&str> {
        self.remote_kind.as_deref()
    }

    pub fn is_remote(&self) -> bool {
        self.kind == ErrorKind::Remote
    }

    pub fn is_invalid_state(&self) -> bool {
        self.kind == ErrorKind::InvalidState
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error {}: {}", self.kind, self.code, self.message)?;
        if let Some(kind) = &self.remote_kind {
            write!(f, " ({})", kind)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<interpack::Error> for Error {
    fn from(e: interpack::Error) -> Self {
        match e {
            interpack::Error::OutOfMemory { .. } => {
                Self::new(ErrorKind::OutOfMemory, CODE_MEMORY, e.to_string())
            }
            other => Self::encoding(other.to_string()),
        }
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::invalid_state(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
