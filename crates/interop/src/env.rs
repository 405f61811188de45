//! # Environment
//!
//! Everything the façades of one connection share: the engine, the type
//! registry, the buffer pool, the live handle table and the pending
//! completion table.
//!
//! ## Invariants
//!
//! - One `Environment` per engine connection, shared as `Arc<Environment>`.
//! - Dropping it drops every pending completion, which fails the matching
//!   futures with `InvalidState`.

use std::sync::Arc;

use interpack::Reader;
use interpack::TypeRegistry;
use interpack::Writer;

use crate::completion::CompletionSink;
use crate::completion::Completions;
use crate::config::Config;
use crate::dispatch;
use crate::dispatch::Target;
use crate::error::Result;
use crate::handle::HandleTable;
use crate::handle::RawHandle;
use crate::handle::RemoteHandle;
use crate::pool::Lease;
use crate::pool::MemoryPool;
use crate::transport::Engine;

pub struct Environment {
    engine: Arc<dyn Engine>,
    registry: Arc<TypeRegistry>,
    pool: Arc<MemoryPool>,
    handles: Arc<HandleTable>,
    completions: Arc<Completions>,
    config: Config,
}

impl Environment {
    pub fn builder(engine: Arc<dyn Engine>) -> EnvironmentBuilder {
        EnvironmentBuilder { engine, registry: None, config: Config::default() }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Leases an empty call buffer.
    pub fn allocate(&self) -> Result<Lease> {
        self.pool.acquire()
    }

    pub fn pool(&self) -> &Arc<MemoryPool> {
        &self.pool
    }

    pub(crate) fn completions(&self) -> &Arc<Completions> {
        &self.completions
    }

    /// The endpoint engines report asynchronous replies to.
    pub fn completion_sink(&self) -> CompletionSink {
        CompletionSink::new(&self.completions)
    }

    /// Number of asynchronous calls still waiting for a reply.
    pub fn pending(&self) -> usize {
        self.completions.pending()
    }

    /// Creates a far-side object of `type_name` and returns a target that owns it.
    ///
    /// `encode` writes the constructor arguments, if any.
    pub fn create(
        self: &Arc<Self>,
        type_name: &str,
        encode: impl FnOnce(&mut Writer<'_>) -> interpack::Result<()>,
    ) -> Result<Target> {
        let mut input = self.allocate()?;
        let mut output = self.allocate()?;
        {
            let mut writer = Writer::new(&mut input, &self.registry);
            encode(&mut writer)?;
            writer.synchronize()?;
        }
        let status = self.engine.create(type_name, &input, &mut output)?;
        dispatch::check_status(status, &output, &self.registry)?;
        let raw = RawHandle(Reader::new(&output, &self.registry).read_i64()? as u64);
        tracing::debug!(type_name, target = %raw, "created remote object");
        Ok(self.attach(raw))
    }

    /// Wraps a raw handle received from the far side.
    ///
    /// Joins the live family for `raw` if there is one; otherwise the returned
    /// target becomes the owner and disposes `raw` when its last clone drops.
    pub fn attach(self: &Arc<Self>, raw: RawHandle) -> Target {
        let handle = self.handles.adopt(raw, &self.engine);
        Target::new(self.clone(), handle)
    }

    /// Looks up a live handle without adopting one.
    pub fn handle(&self, raw: RawHandle) -> Option<RemoteHandle> {
        self.handles.get(raw)
    }

    /// Number of raw handles with at least one live reference.
    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    /// Reads a raw handle written by the far side and attaches it.
    pub fn read_target(self: &Arc<Self>, reader: &mut Reader<'_>) -> Result<Target> {
        let raw = RawHandle(reader.read_i64()? as u64);
        Ok(self.attach(raw))
    }
}

pub struct EnvironmentBuilder {
    engine: Arc<dyn Engine>,
    registry: Option<Arc<TypeRegistry>>,
    config: Config,
}

impl EnvironmentBuilder {
    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Arc<Environment> {
        let registry = self.registry.unwrap_or_else(TypeRegistry::empty);
        tracing::debug!(types = registry.len(), "environment ready");
        Arc::new(Environment {
            engine: self.engine,
            registry,
            pool: MemoryPool::new(&self.config),
            handles: Arc::new(HandleTable::new()),
            completions: Completions::new(),
            config: self.config,
        })
    }
}
