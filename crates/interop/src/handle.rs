//! # Remote Handles
//!
//! Shared ownership of far-side objects.
//!
//! ## Invariants
//!
//! - Clones of a `RemoteHandle` share one reference count.
//! - Dropping the last clone calls `Engine::dispose` exactly once.
//! - At most one live `RemoteHandle` family exists per raw handle; adopting a
//!   raw handle that is still alive joins the existing family.
//! - A family adopted over a dying one takes its object over; the dying one
//!   does not dispose it.
//! - `Engine::dispose` runs under the table's shard lock. An `adopt` of the
//!   same raw handle waits for it and then starts a new family. Engines must
//!   not re-enter the handle table from `dispose`.

use std::fmt;
use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::transport::Engine;

/// The far side's name for an object.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct RawHandle(pub u64);

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj-{}", self.0)
    }
}

struct Inner {
    raw: RawHandle,
    engine: Arc<dyn Engine>,
    table: Arc<HandleTable>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.table.release(self);
    }
}

/// A counted reference to a far-side object.
#[derive(Clone)]
pub struct RemoteHandle {
    inner: Arc<Inner>,
}

impl RemoteHandle {
    pub fn raw(&self) -> RawHandle {
        self.inner.raw
    }

    /// Number of live clones, this one included.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("raw", &self.inner.raw)
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// Live handles of one environment, keyed by raw handle.
#[derive(Default)]
pub struct HandleTable {
    handles: DashMap<RawHandle, Weak<Inner>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live handle for `raw`, creating one if none is alive.
    pub fn adopt(self: &Arc<Self>, raw: RawHandle, engine: &Arc<dyn Engine>) -> RemoteHandle {
        let fresh = |table: &Arc<Self>| {
            Arc::new(Inner { raw, engine: engine.clone(), table: table.clone() })
        };
        match self.handles.entry(raw) {
            Entry::Occupied(mut e) => {
                if let Some(inner) = e.get().upgrade() {
                    return RemoteHandle { inner };
                }
                let inner = fresh(self);
                e.insert(Arc::downgrade(&inner));
                RemoteHandle { inner }
            }
            Entry::Vacant(e) => {
                let inner = fresh(self);
                e.insert(Arc::downgrade(&inner));
                RemoteHandle { inner }
            }
        }
    }

    /// Returns the live handle for `raw`, if any.
    pub fn get(&self, raw: RawHandle) -> Option<RemoteHandle> {
        let inner = self.handles.get(&raw)?.upgrade()?;
        Some(RemoteHandle { inner })
    }

    pub fn len(&self) -> usize {
        self.handles.iter().filter(|e| e.value().strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disposes the object of a family whose last clone dropped, unless a
    /// newer family already replaced its entry.
    fn release(&self, inner: &Inner) {
        match self.handles.entry(inner.raw) {
            Entry::Occupied(e) if std::ptr::eq(e.get().as_ptr(), inner) => {
                tracing::debug!(target = %inner.raw, "disposing remote object");
                inner.engine.dispose(inner.raw);
                e.remove();
            }
            _ => tracing::debug!(target = %inner.raw, "remote object taken over by a newer handle"),
        }
    }
}
