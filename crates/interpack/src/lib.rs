//! # Interpack
//!
//! The byte layout shared by both sides of the interop boundary.
//!
//! ## Philosophy
//!
//! - **Explicit State**: A `Memory` buffer tracks capacity and committed length
//!   separately. Nothing is visible to the far side until `synchronize`.
//! - **Cursor Views**: `Writer` and `Reader` are short-lived, single-pass views
//!   over one buffer. Every read is bounds-checked.
//! - **Registered Types**: Composite values are framed by a stable type id looked
//!   up in an immutable `TypeRegistry`. Missing registrations fail before any
//!   byte is produced.
//!
//! ## Format
//!
//! - **Primitives**: fixed width, Little-Endian.
//! - **Strings**: `[Len: i32][UTF-8: Len]`, `Len = -1` is null.
//! - **Sequences**: `[Count: i32][Elements...]`, `Count = -1` is null.
//! - **Guid**: `[Most: i64][Least: i64]`.
//! - **Objects**: `[Tag: 1b][TypeId: i32 if registered][Payload]`.

pub mod memory;
pub mod reader;
pub mod registry;
pub mod types;
pub mod writer;


pub use memory::Memory;
pub use reader::Reader;
pub use registry::Descriptor;
pub use registry::RegistryBuilder;
pub use registry::TypeRegistry;
pub use types::BinaryType;
pub use types::Guid;
pub use types::type_id;
pub use writer::Writer;

/// Interpack encoding and decoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The buffer could not grow to the requested capacity.
    OutOfMemory { requested: usize },
    /// Attempted to commit a length beyond the allocated capacity.
    LengthExceedsCapacity { len: usize, capacity: usize },
    /// Buffer exhausted while reading.
    UnexpectedEnd,
    /// Byte does not correspond to the expected object tag.
    InvalidTag(u8),
    /// String data is not valid UTF-8.
    InvalidUtf8,
    /// A length or count prefix was negative and not the null marker.
    InvalidLength(i32),
    /// A string or sequence is longer than an `i32` prefix can describe.
    TooLarge(usize),
    /// A null marker was found where a value was required.
    UnexpectedNull(&'static str),
    /// The composite type has no descriptor in the registry.
    Unregistered(String),
    /// The wire carried a type id the registry does not know.
    UnknownTypeId(i32),
    /// The wire carried a registered type other than the one requested.
    TypeMismatch { expected: String, found: String },
    /// A type, name or type id was registered twice.
    DuplicateType(String),
    /// Primitives are framed by their own tag and cannot be registered.
    Primitive(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::OutOfMemory { requested } => write!(f, "out of memory: cannot grow buffer to {} bytes", requested),
            Error::LengthExceedsCapacity { len, capacity } => {
                write!(f, "length {} exceeds buffer capacity {}", len, capacity)
            }
            Error::InvalidTag(b) => write!(f, "invalid object tag: {:#04x}", b),
            Error::InvalidLength(n) => write!(f, "invalid length prefix: {}", n),
            Error::TooLarge(n) => write!(f, "{} elements do not fit an i32 length prefix", n),
            Error::UnexpectedNull(name) => write!(f, "unexpected null where {} was required", name),
            Error::Unregistered(name) => write!(f, "type '{}' is not registered", name),
            Error::UnknownTypeId(id) => write!(f, "unknown type id: {}", id),
            Error::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {}, found {}", expected, found)
            }
            Error::DuplicateType(name) => write!(f, "type '{}' is already registered", name),
            Error::Primitive(name) => write!(f, "primitive '{}' cannot be registered", name),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for Interpack operations.
pub type Result<T> = std::result::Result<T, Error>;
