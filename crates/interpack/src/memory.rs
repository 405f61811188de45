//! # Interop Memory
//!
//! A growable byte buffer handed across the boundary.
//!
//! The buffer distinguishes its allocated capacity from its committed length.
//! Writers fill bytes anywhere below capacity; only `synchronize` makes them
//! part of the transferable length that the other side reads.

use crate::Error;
use crate::Result;

/// Capacity used when a caller has no better size hint.
pub const DEFAULT_CAPACITY: usize = 1024;

/// An owned, boundary-shared byte buffer.
///
/// # Invariants
/// - `len <= capacity` at all times.
/// - `capacity <= limit` when a limit is set.
#[derive(Debug, Clone)]
pub struct Memory {
    /// Allocated bytes; `buf.len()` is the capacity.
    buf: Vec<u8>,
    /// Committed length.
    len: usize,
    limit: Option<usize>,
}

impl Memory {
    /// Allocates a buffer with at least `size_hint` bytes of capacity.
    ///
    /// # Errors
    /// Returns `Error::OutOfMemory` if the allocator refuses.
    pub fn acquire(size_hint: usize) -> Result<Self> {
        let mut mem = Self { buf: Vec::new(), len: 0, limit: None };
        mem.grow_exact(size_hint)?;
        Ok(mem)
    }

    /// Allocates a buffer that may never grow past `limit` bytes.
    pub fn with_limit(size_hint: usize, limit: usize) -> Result<Self> {
        if size_hint > limit {
            return Err(Error::OutOfMemory { requested: size_hint });
        }
        let mut mem = Self { buf: Vec::new(), len: 0, limit: Some(limit) };
        mem.grow_exact(size_hint)?;
        Ok(mem)
    }

    /// Wraps bytes that are already complete; the whole slice is committed.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self { buf: bytes.to_vec(), len: bytes.len(), limit: None }
    }

    /// Returns the allocated capacity.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Returns the committed, transferable length.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Grows capacity to at least `n` bytes. Existing content is preserved.
    ///
    /// Capacity at least doubles on growth, clamped to the limit.
    ///
    /// # Errors
    /// Returns `Error::OutOfMemory` if `n` exceeds the limit or the allocator refuses.
    /// The failure is final; the buffer is left unchanged.
    pub fn reserve(&mut self, n: usize) -> Result<()> {
        if n <= self.buf.len() {
            return Ok(());
        }
        if let Some(limit) = self.limit {
            if n > limit {
                return Err(Error::OutOfMemory { requested: n });
            }
        }
        let doubled = self.buf.len().saturating_mul(2);
        let target = match self.limit {
            Some(limit) => doubled.max(n).min(limit),
            None => doubled.max(n),
        };
        self.grow_exact(target)
    }

    fn grow_exact(&mut self, target: usize) -> Result<()> {
        let extra = target.saturating_sub(self.buf.len());
        if extra == 0 {
            return Ok(());
        }
        self.buf
            .try_reserve_exact(extra)
            .map_err(|_| Error::OutOfMemory { requested: target })?;
        self.buf.resize(target, 0);
        Ok(())
    }

    /// Commits `len` bytes as the transferable length.
    pub fn synchronize(&mut self, len: usize) -> Result<()> {
        if len > self.buf.len() {
            return Err(Error::LengthExceedsCapacity { len, capacity: self.buf.len() });
        }
        self.len = len;
        Ok(())
    }

    /// Forgets the committed length so the buffer can be written again.
    pub fn reset(&mut self) {
        self.len = 0;
    }

    /// Returns the committed bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Returns a writable window `[pos, pos + n)`, growing as needed.
    pub(crate) fn window_mut(&mut self, pos: usize, n: usize) -> Result<&mut [u8]> {
        let end = pos.checked_add(n).ok_or(Error::OutOfMemory { requested: usize::MAX })?;
        self.reserve(end)?;
        Ok(&mut self.buf[pos..end])
    }
}
