//! # Engine Boundary
//!
//! The opaque capability every call crosses.
//!
//! ## Philosophy
//!
//! - **Buffer-Oriented**: The engine moves `Memory` buffers and status bytes.
//!   It knows nothing about commands, registries or futures.
//! - **Status, Then Payload**: Each reply is a status byte. On success the
//!   output buffer holds the payload; otherwise it holds a `Failure` record.
//! - **Transport Errors Are Separate**: `transport::Error` means the call never
//!   reached a live engine. A remote failure is a status, not an `Err`.

use std::fmt;

use interpack::Memory;
use interpack::Reader;
use interpack::TypeRegistry;
use interpack::Writer;

use crate::completion::CompletionSink;
use crate::completion::CorrelationId;
use crate::error::CODE_BINARY;
use crate::handle::RawHandle;

/// Errors that prevent a call from reaching the engine at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The engine is gone or the link to it was dropped.
    ConnectionLost(String),
    /// The engine refused to accept the call.
    Rejected(String),
    /// The engine could not start its own machinery.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Rejected(msg) => write!(f, "Call rejected: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Reply status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    /// The operation ran and failed; a `Failure` record follows.
    Failed = 1,
    /// The target is unknown or already disposed; a `Failure` record follows.
    InvalidTarget = 2,
}

impl Status {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Ok),
            1 => Some(Self::Failed),
            2 => Some(Self::InvalidTarget),
            _ => None,
        }
    }
}

impl From<Status> for u8 {
    fn from(s: Status) -> u8 {
        s as u8
    }
}

/// The record an engine writes in place of a payload when a call fails.
///
/// Layout: `i32 code`, `string message`, `string remote_kind` (nullable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub code: i32,
    pub message: String,
    pub remote_kind: Option<String>,
}

impl Failure {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), remote_kind: None }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.remote_kind = Some(kind.into());
        self
    }

    pub fn write(&self, writer: &mut Writer<'_>) -> interpack::Result<()> {
        writer.write_i32(self.code)?;
        writer.write_string(Some(&self.message))?;
        writer.write_string(self.remote_kind.as_deref())
    }

    pub fn read(reader: &mut Reader<'_>) -> interpack::Result<Self> {
        let code = reader.read_i32()?;
        let message = reader.read_string()?.unwrap_or_default();
        let remote_kind = reader.read_string()?;
        Ok(Self { code, message, remote_kind })
    }

    /// Replaces whatever `output` holds with this record and commits it.
    pub fn encode_into(&self, output: &mut Memory, registry: &TypeRegistry) -> interpack::Result<()> {
        output.reset();
        let mut writer = Writer::new(output, registry);
        self.write(&mut writer)?;
        writer.synchronize()
    }
}

impl From<interpack::Error> for Failure {
    fn from(e: interpack::Error) -> Self {
        Failure::new(CODE_BINARY, e.to_string()).with_kind("BinaryObjectError")
    }
}

/// The far side of the boundary.
///
/// Object-safe; shared as `Arc<dyn Engine>` by every target of an environment.
///
/// # Invariants
/// - `call`, `call_scalar` and `create` return only after the far side is done
///   with `input` and has committed `output`.
/// - `call_async` completes `correlation` through `sink` exactly once, on a
///   thread the engine owns, unless it returns `Err`, in which case it must
///   never complete it.
/// - `dispose` is fire-and-forget and must not call back into the environment.
pub trait Engine: Send + Sync + 'static {
    /// Runs `op` on `target` and blocks until the reply status is known.
    fn call(&self, target: RawHandle, op: i32, input: &Memory, output: &mut Memory) -> Result<u8>;

    /// Runs `op` with a single 64-bit argument and result.
    ///
    /// `output` is only written when the status is not `Status::Ok`.
    fn call_scalar(&self, target: RawHandle, op: i32, value: i64, output: &mut Memory) -> Result<(u8, i64)>;

    /// Submits `op` and returns once the engine owns `input`.
    fn call_async(
        &self,
        target: RawHandle,
        op: i32,
        correlation: CorrelationId,
        input: Memory,
        sink: CompletionSink,
    ) -> Result<()>;

    /// Creates a far-side object. On success `output` holds its raw handle as `i64`.
    fn create(&self, type_name: &str, input: &Memory, output: &mut Memory) -> Result<u8>;

    /// Releases a far-side object.
    fn dispose(&self, target: RawHandle);
}
