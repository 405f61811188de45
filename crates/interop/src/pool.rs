//! # Buffer Pool
//!
//! Reuses call buffers across dispatches. Every lease is exclusive to one
//! call; a buffer is only handed out again after its lease is dropped.

use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;
use std::sync::Weak;

use interpack::Memory;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::Result;

pub struct MemoryPool {
    free: Mutex<Vec<Memory>>,
    initial_capacity: usize,
    buffer_limit: Option<usize>,
    pool_size: usize,
    retain_capacity: usize,
}

impl MemoryPool {
    pub fn new(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::with_capacity(config.pool_size)),
            initial_capacity: config.initial_capacity,
            buffer_limit: config.buffer_limit,
            pool_size: config.pool_size,
            retain_capacity: config.retain_capacity,
        })
    }

    /// Leases an empty buffer, reusing an idle one when possible.
    pub fn acquire(self: &Arc<Self>) -> Result<Lease> {
        let reused = self.free.lock().pop();
        let mem = match reused {
            Some(mem) => mem,
            None => match self.buffer_limit {
                Some(limit) => Memory::with_limit(self.initial_capacity.min(limit), limit)?,
                None => Memory::acquire(self.initial_capacity)?,
            },
        };
        Ok(Lease { mem, pool: Arc::downgrade(self) })
    }

    /// Number of idle buffers.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    fn recycle(&self, mut mem: Memory) {
        if mem.capacity() > self.retain_capacity {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < self.pool_size {
            mem.reset();
            free.push(mem);
        }
    }
}

/// Exclusive use of one pooled buffer. Returned to the pool on drop.
pub struct Lease {
    mem: Memory,
    pool: Weak<MemoryPool>,
}

impl Lease {
    /// Takes the buffer out of the pool for good, e.g. to hand it to an engine.
    pub fn into_inner(self) -> Memory {
        let mut this = ManuallyDrop::new(self);
        drop(std::mem::take(&mut this.pool));
        std::mem::replace(&mut this.mem, Memory::from_bytes(&[]))
    }
}

impl Deref for Lease {
    type Target = Memory;

    fn deref(&self) -> &Memory {
        &self.mem
    }
}

impl DerefMut for Lease {
    fn deref_mut(&mut self) -> &mut Memory {
        &mut self.mem
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.recycle(std::mem::replace(&mut self.mem, Memory::from_bytes(&[])));
        }
    }
}
