//! # Types
//!
//! Object category tags, the `BinaryType` trait and its primitive implementations.

use crate::Reader;
use crate::Result;
use crate::Writer;

/// Single-byte category tags preceding every `write_object` payload.
pub mod tag {
    pub const I8: u8 = 1;
    pub const I16: u8 = 2;
    pub const I32: u8 = 3;
    pub const I64: u8 = 4;
    pub const F32: u8 = 5;
    pub const F64: u8 = 6;
    pub const U16: u8 = 7;
    pub const BOOL: u8 = 8;
    pub const STRING: u8 = 9;
    pub const GUID: u8 = 10;
    /// Null object; no payload follows.
    pub const NULL: u8 = 101;
    /// Registered composite; an `i32` type id and the payload follow.
    pub const REGISTERED: u8 = 103;
}

/// Derives the stable wire id of a type from its name.
///
/// 31-multiplier hash over the ASCII-lowercased bytes of the name, wrapping
/// on overflow. Both sides compute it independently.
pub fn type_id(name: &str) -> i32 {
    name.bytes()
        .fold(0i32, |h, b| h.wrapping_mul(31).wrapping_add(b.to_ascii_lowercase() as i32))
}

/// A value with a fixed encoding on the wire.
///
/// Primitives set `PRIMITIVE` to their category tag and are framed directly.
/// Composites leave it `None`; they must be registered in a `TypeRegistry`
/// before `write_object`/`read_object` will accept them.
pub trait BinaryType: Sized + Send + 'static {
    /// Stable name; the type id is derived from it.
    const TYPE_NAME: &'static str;
    /// Category tag for primitives.
    const PRIMITIVE: Option<u8> = None;

    /// Writes the payload (without tag or type id).
    fn write(&self, writer: &mut Writer<'_>) -> Result<()>;

    /// Reads the payload (without tag or type id).
    fn read(reader: &mut Reader<'_>) -> Result<Self>;
}

/// A 128-bit identifier stored as two 64-bit words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid {
    most: i64,
    least: i64,
}

impl Guid {
    pub const fn new(most: i64, least: i64) -> Self {
        Self { most, least }
    }

    /// Most-significant word.
    pub fn most(&self) -> i64 {
        self.most
    }

    /// Least-significant word.
    pub fn least(&self) -> i64 {
        self.least
    }
}

impl std::fmt::Display for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = self.most as u64;
        let l = self.least as u64;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            m >> 32,
            (m >> 16) & 0xffff,
            m & 0xffff,
            l >> 48,
            l & 0xffff_ffff_ffff
        )
    }
}

macro_rules! primitive {
    ($ty:ty, $name:literal, $tag:expr, $write:ident, $read:ident) => {
        impl BinaryType for $ty {
            const TYPE_NAME: &'static str = $name;
            const PRIMITIVE: Option<u8> = Some($tag);

            fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
                writer.$write(*self)
            }

            fn read(reader: &mut Reader<'_>) -> Result<Self> {
                reader.$read()
            }
        }
    };
}

primitive!(i8, "i8", tag::I8, write_i8, read_i8);
primitive!(i16, "i16", tag::I16, write_i16, read_i16);
primitive!(i32, "i32", tag::I32, write_i32, read_i32);
primitive!(i64, "i64", tag::I64, write_i64, read_i64);
primitive!(f32, "f32", tag::F32, write_f32, read_f32);
primitive!(f64, "f64", tag::F64, write_f64, read_f64);
primitive!(u16, "u16", tag::U16, write_u16, read_u16);
primitive!(bool, "bool", tag::BOOL, write_bool, read_bool);
primitive!(Guid, "guid", tag::GUID, write_guid, read_guid);

impl BinaryType for String {
    const TYPE_NAME: &'static str = "string";
    const PRIMITIVE: Option<u8> = Some(tag::STRING);

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_string(Some(self))
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self> {
        reader.read_string()?.ok_or(crate::Error::UnexpectedNull("string"))
    }
}
