//! # Binary Writer
//!
//! A single-pass cursor that encodes values into a `Memory` buffer.

use std::any::Any;

use crate::BinaryType;
use crate::Error;
use crate::Guid;
use crate::Memory;
use crate::Result;
use crate::TypeRegistry;
use crate::types::tag;

/// Encodes values into a `Memory` buffer.
///
/// Writing starts at offset zero and only moves forward. Bytes become visible
/// to a `Reader` (or the far side) once `synchronize` commits them.
pub struct Writer<'a> {
    mem: &'a mut Memory,
    registry: &'a TypeRegistry,
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(mem: &'a mut Memory, registry: &'a TypeRegistry) -> Self {
        Self { mem, registry, pos: 0 }
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    /// Commits everything written so far as the buffer's transferable length.
    pub fn synchronize(&mut self) -> Result<()> {
        self.mem.synchronize(self.pos)
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.mem.window_mut(self.pos, bytes.len())?.copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    fn write_len(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len).map_err(|_| Error::TooLarge(len))?;
        self.write_i32(len)
    }

    pub fn write_i8(&mut self, v: i8) -> Result<()> { self.put(&v.to_le_bytes()) }
    pub fn write_u8(&mut self, v: u8) -> Result<()> { self.put(&[v]) }
    pub fn write_bool(&mut self, v: bool) -> Result<()> { self.put(&[v as u8]) }
    pub fn write_i16(&mut self, v: i16) -> Result<()> { self.put(&v.to_le_bytes()) }
    pub fn write_u16(&mut self, v: u16) -> Result<()> { self.put(&v.to_le_bytes()) }
    pub fn write_i32(&mut self, v: i32) -> Result<()> { self.put(&v.to_le_bytes()) }
    pub fn write_i64(&mut self, v: i64) -> Result<()> { self.put(&v.to_le_bytes()) }
    pub fn write_f32(&mut self, v: f32) -> Result<()> { self.put(&v.to_le_bytes()) }
    pub fn write_f64(&mut self, v: f64) -> Result<()> { self.put(&v.to_le_bytes()) }

    /// Writes a length-prefixed UTF-8 string; `None` is written as length `-1`.
    pub fn write_string(&mut self, v: Option<&str>) -> Result<()> {
        match v {
            Some(s) => {
                self.write_len(s.len())?;
                self.put(s.as_bytes())
            }
            None => self.write_i32(-1),
        }
    }

    /// Writes the most-significant word, then the least-significant word.
    pub fn write_guid(&mut self, v: Guid) -> Result<()> {
        self.write_i64(v.most())?;
        self.write_i64(v.least())
    }

    /// Writes a count-prefixed sequence, encoding each element with `f`.
    pub fn write_seq<T, F>(&mut self, items: &[T], mut f: F) -> Result<()>
    where
        F: FnMut(&mut Self, &T) -> Result<()>,
    {
        self.write_len(items.len())?;
        for item in items {
            f(self, item)?;
        }
        Ok(())
    }

    /// Like `write_seq`, with `None` written as count `-1`.
    pub fn write_nullable_seq<T, F>(&mut self, items: Option<&[T]>, f: F) -> Result<()>
    where
        F: FnMut(&mut Self, &T) -> Result<()>,
    {
        match items {
            Some(items) => self.write_seq(items, f),
            None => self.write_i32(-1),
        }
    }

    /// Writes a tagged object.
    ///
    /// Primitives are written as `[tag][payload]`. Registered composites are
    /// written as `[REGISTERED][type id][payload]`.
    ///
    /// # Errors
    /// Returns `Error::Unregistered` for an unregistered composite; nothing is
    /// written in that case.
    pub fn write_object<T: BinaryType>(&mut self, v: &T) -> Result<()> {
        match T::PRIMITIVE {
            Some(t) => self.write_u8(t)?,
            None => {
                let id = self.registry.require::<T>()?;
                self.write_u8(tag::REGISTERED)?;
                self.write_i32(id)?;
            }
        }
        v.write(self)
    }

    /// Writes a tagged object, or the null tag for `None`.
    pub fn write_nullable<T: BinaryType>(&mut self, v: Option<&T>) -> Result<()> {
        match v {
            Some(v) => self.write_object(v),
            None => {
                if T::PRIMITIVE.is_none() {
                    self.registry.require::<T>()?;
                }
                self.write_u8(tag::NULL)
            }
        }
    }

    /// Writes a value whose concrete type is only known at runtime.
    ///
    /// Accepts the primitive types and any registered composite.
    pub fn write_any(&mut self, v: &dyn Any) -> Result<()> {
        macro_rules! try_primitive {
            ($($ty:ty),*) => {
                $(
                    if let Some(v) = v.downcast_ref::<$ty>() {
                        return self.write_object(v);
                    }
                )*
            };
        }
        try_primitive!(i8, i16, i32, i64, f32, f64, u16, bool, String, Guid);

        let registry = self.registry;
        let desc = registry
            .by_rust_type(v.type_id())
            .ok_or_else(|| Error::Unregistered(format!("{:?}", v.type_id())))?;
        self.write_u8(tag::REGISTERED)?;
        self.write_i32(desc.id())?;
        (desc.encode_fn())(v, self)
    }
}
