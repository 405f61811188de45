use interpack::memory::DEFAULT_CAPACITY;

/// Tuning for an `Environment`'s buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Capacity of a freshly allocated call buffer.
    pub initial_capacity: usize,
    /// Hard ceiling on any one call buffer; `None` means unbounded.
    pub buffer_limit: Option<usize>,
    /// Idle buffers kept for reuse.
    pub pool_size: usize,
    /// Buffers that grew past this are freed instead of pooled.
    pub retain_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_CAPACITY,
            buffer_limit: None,
            pool_size: 16,
            retain_capacity: 64 * 1024,
        }
    }
}

impl Config {
    pub fn with_initial_capacity(mut self, bytes: usize) -> Self {
        self.initial_capacity = bytes;
        self
    }

    pub fn with_buffer_limit(mut self, bytes: usize) -> Self {
        self.buffer_limit = Some(bytes);
        self
    }

    pub fn with_pool_size(mut self, buffers: usize) -> Self {
        self.pool_size = buffers;
        self
    }

    pub fn with_retain_capacity(mut self, bytes: usize) -> Self {
        self.retain_capacity = bytes;
        self
    }
}
