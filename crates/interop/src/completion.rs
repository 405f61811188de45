//! # Completion Routing
//!
//! Correlates asynchronous replies with the calls that are waiting for them.
//!
//! Each async dispatch registers a type-erased completion under a fresh
//! correlation id. The engine later hands the reply to a `CompletionSink`
//! from a thread of its own; the sink removes the entry and runs it. Removal
//! is the exactly-once gate: a duplicate or unknown id finds nothing.

use std::fmt;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use interpack::Memory;
use parking_lot::Mutex;

use crate::error::Error;
use crate::error::Result;

/// Identifies one in-flight asynchronous call.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// A status byte and the output buffer it refers to.
pub type Reply = (u8, Memory);

type Completion = Box<dyn FnOnce(Result<Reply>) + Send>;

// The mutex only makes the entry `Sync`; it is never contended.
type Slot = Mutex<Completion>;

/// The pending table of one environment.
pub struct Completions {
    pending: DashMap<CorrelationId, Slot>,
    next_id: AtomicU64,
}

impl Completions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { pending: DashMap::new(), next_id: AtomicU64::new(1) })
    }

    /// Registers `completion` and returns the id the engine must echo back.
    pub fn register(&self, completion: impl FnOnce(Result<Reply>) + Send + 'static) -> CorrelationId {
        let id = CorrelationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pending.insert(id, Mutex::new(Box::new(completion)));
        id
    }

    /// Delivers a reply. Returns `false` if `id` is not pending.
    pub fn complete(&self, id: CorrelationId, status: u8, output: Memory) -> bool {
        self.take(id).map(|completion| completion(Ok((status, output)))).is_some()
    }

    /// Fails a pending call without a reply, e.g. when submission failed.
    pub fn fail(&self, id: CorrelationId, error: Error) -> bool {
        self.take(id).map(|completion| completion(Err(error))).is_some()
    }

    /// Number of calls still waiting for a reply.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn take(&self, id: CorrelationId) -> Option<Completion> {
        match self.pending.remove(&id) {
            Some((_, slot)) => {
                tracing::trace!(correlation = %id, "completing");
                Some(slot.into_inner())
            }
            None => {
                tracing::warn!(correlation = %id, "reply for unknown or already completed call");
                None
            }
        }
    }
}

/// The endpoint an engine reports asynchronous replies to.
///
/// Holds only a weak reference: replies that arrive after the environment
/// is gone are dropped with a warning.
#[derive(Clone)]
pub struct CompletionSink {
    table: Weak<Completions>,
}

impl CompletionSink {
    pub(crate) fn new(table: &Arc<Completions>) -> Self {
        Self { table: Arc::downgrade(table) }
    }

    /// Hands the reply for `id` back to the waiting future.
    ///
    /// May be called from any thread. Returns `false` if nobody was waiting.
    pub fn complete(&self, id: CorrelationId, status: u8, output: Memory) -> bool {
        match self.table.upgrade() {
            Some(table) => table.complete(id, status, output),
            None => {
                tracing::warn!(correlation = %id, "reply after environment shutdown");
                false
            }
        }
    }
}

impl fmt::Debug for CompletionSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSink").field("live", &(self.table.strong_count() > 0)).finish()
    }
}
