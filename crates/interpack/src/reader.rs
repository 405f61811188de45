//! # Binary Reader
//!
//! A bounds-checked cursor over the committed bytes of a `Memory` buffer.

use std::any::Any;

use crate::BinaryType;
use crate::Error;
use crate::Guid;
use crate::Memory;
use crate::Result;
use crate::TypeRegistry;
use crate::types::tag;

/// Decodes values from the committed bytes of a buffer.
///
/// # Errors
/// All read operations return `Error::UnexpectedEnd` if the buffer is exhausted.
#[derive(Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    registry: &'a TypeRegistry,
}

impl<'a> Reader<'a> {
    pub fn new(mem: &'a Memory, registry: &'a TypeRegistry) -> Self {
        Self::from_slice(mem.as_slice(), registry)
    }

    pub fn from_slice(buf: &'a [u8], registry: &'a TypeRegistry) -> Self {
        Self { buf, pos: 0, registry }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::UnexpectedEnd);
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn peek_u8(&self) -> Result<u8> {
        self.buf.get(self.pos).copied().ok_or(Error::UnexpectedEnd)
    }

    /// Reads a length prefix. Returns `None` for the null marker `-1`.
    fn read_len(&mut self) -> Result<Option<usize>> {
        match self.read_i32()? {
            -1 => Ok(None),
            n if n < 0 => Err(Error::InvalidLength(n)),
            n => Ok(Some(n as usize)),
        }
    }

    pub fn read_i8(&mut self) -> Result<i8> { Ok(i8::from_le_bytes(self.take_array()?)) }
    pub fn read_u8(&mut self) -> Result<u8> { Ok(self.take_array::<1>()?[0]) }
    pub fn read_bool(&mut self) -> Result<bool> { Ok(self.read_u8()? != 0) }
    pub fn read_i16(&mut self) -> Result<i16> { Ok(i16::from_le_bytes(self.take_array()?)) }
    pub fn read_u16(&mut self) -> Result<u16> { Ok(u16::from_le_bytes(self.take_array()?)) }
    pub fn read_i32(&mut self) -> Result<i32> { Ok(i32::from_le_bytes(self.take_array()?)) }
    pub fn read_i64(&mut self) -> Result<i64> { Ok(i64::from_le_bytes(self.take_array()?)) }
    pub fn read_f32(&mut self) -> Result<f32> { Ok(f32::from_le_bytes(self.take_array()?)) }
    pub fn read_f64(&mut self) -> Result<f64> { Ok(f64::from_le_bytes(self.take_array()?)) }

    /// Reads a length-prefixed UTF-8 string; length `-1` yields `None`.
    pub fn read_string(&mut self) -> Result<Option<String>> {
        let Some(len) = self.read_len()? else { return Ok(None) };
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)?;
        Ok(Some(s.to_owned()))
    }

    pub fn read_guid(&mut self) -> Result<Guid> {
        let most = self.read_i64()?;
        let least = self.read_i64()?;
        Ok(Guid::new(most, least))
    }

    /// Reads a count-prefixed sequence, decoding each element with `f`.
    ///
    /// # Errors
    /// Returns `Error::UnexpectedNull` on the null count `-1`.
    pub fn read_seq<T, F>(&mut self, f: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        self.read_nullable_seq(f)?.ok_or(Error::UnexpectedNull("sequence"))
    }

    /// Reads a count-prefixed sequence; count `-1` yields `None`.
    pub fn read_nullable_seq<T, F>(&mut self, mut f: F) -> Result<Option<Vec<T>>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let Some(count) = self.read_len()? else { return Ok(None) };
        // The count is untrusted: cap the preallocation at the bytes left. A count
        // of empty elements is honored as written.
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            items.push(f(self)?);
        }
        Ok(Some(items))
    }

    /// Reads a tagged object written by `Writer::write_object`.
    ///
    /// # Errors
    /// - `Error::Unregistered` if `T` is a composite with no descriptor (checked first).
    /// - `Error::UnexpectedNull` on the null tag.
    /// - `Error::InvalidTag` if the tag does not frame a `T`.
    /// - `Error::TypeMismatch` if the wire type id belongs to another type.
    pub fn read_object<T: BinaryType>(&mut self) -> Result<T> {
        let expected_id = match T::PRIMITIVE {
            Some(_) => None,
            None => Some(self.registry.require::<T>()?),
        };

        let t = self.read_u8()?;
        if t == tag::NULL {
            return Err(Error::UnexpectedNull(T::TYPE_NAME));
        }

        match (T::PRIMITIVE, expected_id) {
            (Some(p), _) if p == t => {}
            (None, Some(expected)) if t == tag::REGISTERED => {
                let id = self.read_i32()?;
                if id != expected {
                    let found = self
                        .registry
                        .by_id(id)
                        .map(|d| d.name().to_string())
                        .unwrap_or_else(|| format!("type id {}", id));
                    return Err(Error::TypeMismatch { expected: T::TYPE_NAME.into(), found });
                }
            }
            _ => return Err(Error::InvalidTag(t)),
        }
        T::read(self)
    }

    /// Reads a tagged object; the null tag yields `None`.
    pub fn read_nullable<T: BinaryType>(&mut self) -> Result<Option<T>> {
        if T::PRIMITIVE.is_none() {
            self.registry.require::<T>()?;
        }
        if self.peek_u8()? == tag::NULL {
            self.pos += 1;
            return Ok(None);
        }
        self.read_object().map(Some)
    }

    /// Reads an object whose type is only known from the wire.
    ///
    /// The null tag yields `None`.
    pub fn read_any(&mut self) -> Result<Option<Box<dyn Any + Send>>> {
        let t = self.read_u8()?;
        let value: Box<dyn Any + Send> = match t {
            tag::NULL => return Ok(None),
            tag::I8 => Box::new(self.read_i8()?),
            tag::I16 => Box::new(self.read_i16()?),
            tag::I32 => Box::new(self.read_i32()?),
            tag::I64 => Box::new(self.read_i64()?),
            tag::F32 => Box::new(self.read_f32()?),
            tag::F64 => Box::new(self.read_f64()?),
            tag::U16 => Box::new(self.read_u16()?),
            tag::BOOL => Box::new(self.read_bool()?),
            tag::STRING => Box::new(self.read_string()?.ok_or(Error::UnexpectedNull("string"))?),
            tag::GUID => Box::new(self.read_guid()?),
            tag::REGISTERED => {
                let registry = self.registry;
                let id = self.read_i32()?;
                let desc = registry.by_id(id).ok_or(Error::UnknownTypeId(id))?;
                (desc.decode_fn())(self)?
            }
            other => return Err(Error::InvalidTag(other)),
        };
        Ok(Some(value))
    }
}
