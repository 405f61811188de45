//! # Loopback Engine
//!
//! An in-process `Engine`: the "far side" is a table of Rust closures.
//!
//! Object types are registered up front with per-opcode handlers. `create`
//! instantiates one, `dispose` removes it and records the raw handle in a
//! dispose log. Synchronous calls run on the caller's thread; asynchronous
//! calls run on the engine's own tokio runtime and report back through the
//! `CompletionSink`, so completions arrive on threads the caller does not own.

use std::any::Any;
use std::collections::HashMap;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use interpack::Memory;
use interpack::Reader;
use interpack::TypeRegistry;
use interpack::Writer;
use interpack::memory::DEFAULT_CAPACITY;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::runtime::Runtime;

use crate::completion::CompletionSink;
use crate::completion::CorrelationId;
use crate::error::CODE_GENERIC;
use crate::error::CODE_INVALID_STATE;
use crate::error::CODE_MEMORY;
use crate::handle::RawHandle;
use crate::transport;
use crate::transport::Engine;
use crate::transport::Failure;
use crate::transport::Status;

pub type Handler = Arc<dyn Fn(&mut Reader<'_>, &mut Writer<'_>) -> Result<(), Failure> + Send + Sync>;
pub type ScalarHandler = Arc<dyn Fn(i64) -> Result<i64, Failure> + Send + Sync>;

/// The operations one kind of loopback object answers.
#[derive(Clone, Default)]
pub struct ObjectType {
    name: String,
    ops: HashMap<i32, Handler>,
    scalar_ops: HashMap<i32, ScalarHandler>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Answers `op` by reading arguments and writing the reply payload.
    pub fn op<F>(mut self, op: i32, handler: F) -> Self
    where
        F: Fn(&mut Reader<'_>, &mut Writer<'_>) -> Result<(), Failure> + Send + Sync + 'static,
    {
        self.ops.insert(op, Arc::new(handler));
        self
    }

    /// Answers the scalar form of `op`.
    pub fn scalar<F>(mut self, op: i32, handler: F) -> Self
    where
        F: Fn(i64) -> Result<i64, Failure> + Send + Sync + 'static,
    {
        self.scalar_ops.insert(op, Arc::new(handler));
        self
    }
}

pub struct LoopbackEngine {
    registry: Arc<TypeRegistry>,
    types: DashMap<String, Arc<ObjectType>>,
    objects: DashMap<RawHandle, Arc<ObjectType>>,
    next_handle: AtomicU64,
    disposed: Mutex<Vec<RawHandle>>,
    calls: AtomicU64,
    connected: AtomicBool,
    handle: Handle,
    runtime: Option<Runtime>,
}

impl LoopbackEngine {
    /// Starts an engine with `workers` threads for asynchronous calls.
    pub fn new(registry: Arc<TypeRegistry>, workers: usize) -> transport::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers.max(1))
            .thread_name("loopback-engine")
            .enable_time()
            .build()
            .map_err(|e| transport::Error::Io(e.to_string()))?;
        Ok(Self {
            registry,
            types: DashMap::new(),
            objects: DashMap::new(),
            next_handle: AtomicU64::new(1),
            disposed: Mutex::new(Vec::new()),
            calls: AtomicU64::new(0),
            connected: AtomicBool::new(true),
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    pub fn register(&self, object_type: ObjectType) {
        self.types.insert(object_type.name.clone(), Arc::new(object_type));
    }

    /// Instantiates a registered type directly, bypassing `Engine::create`.
    pub fn spawn_object(&self, type_name: &str) -> Option<RawHandle> {
        let object_type = self.types.get(type_name)?.value().clone();
        let raw = RawHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.objects.insert(raw, object_type);
        Some(raw)
    }

    /// Drops a far-side object without a dispose, as if its owner went away.
    pub fn evict(&self, raw: RawHandle) -> bool {
        self.objects.remove(&raw).is_some()
    }

    /// Makes every later call fail with `ConnectionLost`.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Raw handles disposed so far, in order.
    pub fn disposed(&self) -> Vec<RawHandle> {
        self.disposed.lock().clone()
    }

    pub fn dispose_count(&self, raw: RawHandle) -> usize {
        self.disposed.lock().iter().filter(|r| **r == raw).count()
    }

    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    /// Calls that reached the engine, of any kind except `dispose`.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn enter(&self) -> transport::Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(transport::Error::ConnectionLost("loopback engine disconnected".into()));
        }
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn lookup(&self, target: RawHandle) -> Result<Arc<ObjectType>, Failure> {
        self.objects
            .get(&target)
            .map(|e| e.value().clone())
            .ok_or_else(|| Failure::new(CODE_INVALID_STATE, format!("no live object {}", target)))
    }

    fn reply_failure(&self, failure: &Failure, output: &mut Memory) {
        if let Err(e) = failure.encode_into(output, &self.registry) {
            tracing::warn!(error = %e, "cannot write failure record");
        }
    }

    /// Runs `op` on `target` into `output` and returns the status.
    fn run(&self, target: RawHandle, op: i32, input: &Memory, output: &mut Memory) -> Status {
        tracing::trace!(op, target = %target, "loopback call");
        serve(self.lookup(target), op, input, output, &self.registry)
    }
}

impl Engine for LoopbackEngine {
    fn call(&self, target: RawHandle, op: i32, input: &Memory, output: &mut Memory) -> transport::Result<u8> {
        self.enter()?;
        Ok(self.run(target, op, input, output).into())
    }

    fn call_scalar(&self, target: RawHandle, op: i32, value: i64, output: &mut Memory) -> transport::Result<(u8, i64)> {
        self.enter()?;
        let result = self.lookup(target).map_err(|f| (Status::InvalidTarget, f)).and_then(|object| {
            let handler = object.scalar_ops.get(&op).ok_or_else(|| {
                let failure = Failure::new(CODE_GENERIC, format!("{} has no scalar op {}", object.name, op))
                    .with_kind("UnsupportedOperation");
                (Status::Failed, failure)
            })?;
            panic::catch_unwind(AssertUnwindSafe(|| handler(value)))
                .unwrap_or_else(|payload| Err(panicked(payload)))
                .map_err(|f| (Status::Failed, f))
        });
        match result {
            Ok(v) => Ok((Status::Ok.into(), v)),
            Err((status, failure)) => {
                self.reply_failure(&failure, output);
                Ok((status.into(), 0))
            }
        }
    }

    fn call_async(
        &self,
        target: RawHandle,
        op: i32,
        correlation: CorrelationId,
        input: Memory,
        sink: CompletionSink,
    ) -> transport::Result<()> {
        self.enter()?;
        let object = self.lookup(target);
        let registry = self.registry.clone();
        self.handle.spawn_blocking(move || {
            let (status, output) = match Memory::acquire(DEFAULT_CAPACITY) {
                Ok(mut output) => (serve(object, op, &input, &mut output, &registry), output),
                Err(e) => {
                    tracing::warn!(correlation = %correlation, error = %e, "cannot allocate reply");
                    let failure = Failure::new(CODE_MEMORY, e.to_string()).with_kind("OutOfMemory");
                    let mut output = Memory::from_bytes(&[]);
                    if let Err(e) = failure.encode_into(&mut output, &registry) {
                        tracing::warn!(error = %e, "cannot write failure record");
                    }
                    (Status::Failed, output)
                }
            };
            sink.complete(correlation, status.into(), output);
        });
        Ok(())
    }

    fn create(&self, type_name: &str, _input: &Memory, output: &mut Memory) -> transport::Result<u8> {
        self.enter()?;
        let Some(raw) = self.spawn_object(type_name) else {
            let failure = Failure::new(CODE_GENERIC, format!("unknown object type {}", type_name))
                .with_kind("UnknownType");
            self.reply_failure(&failure, output);
            return Ok(Status::Failed.into());
        };
        output.reset();
        let mut writer = Writer::new(output, &self.registry);
        let written = writer.write_i64(raw.0 as i64).and_then(|()| writer.synchronize());
        if let Err(e) = written {
            self.objects.remove(&raw);
            self.reply_failure(&Failure::from(e), output);
            return Ok(Status::Failed.into());
        }
        Ok(Status::Ok.into())
    }

    fn dispose(&self, target: RawHandle) {
        if self.objects.remove(&target).is_none() {
            tracing::warn!(target = %target, "dispose of unknown object");
        }
        self.disposed.lock().push(target);
    }
}

/// Answers one call against an already resolved object.
fn serve(
    object: Result<Arc<ObjectType>, Failure>,
    op: i32,
    input: &Memory,
    output: &mut Memory,
    registry: &TypeRegistry,
) -> Status {
    let write_failure = |failure: Failure, output: &mut Memory| {
        if let Err(e) = failure.encode_into(output, registry) {
            tracing::warn!(error = %e, "cannot write failure record");
        }
    };
    let object = match object {
        Ok(object) => object,
        Err(failure) => {
            write_failure(failure, output);
            return Status::InvalidTarget;
        }
    };
    let Some(handler) = object.ops.get(&op) else {
        let failure = Failure::new(CODE_GENERIC, format!("{} does not support op {}", object.name, op))
            .with_kind("UnsupportedOperation");
        write_failure(failure, output);
        return Status::Failed;
    };
    output.reset();
    let mut reader = Reader::new(input, registry);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut writer = Writer::new(output, registry);
        handler(&mut reader, &mut writer).and_then(|()| writer.synchronize().map_err(Failure::from))
    }))
    .unwrap_or_else(|payload| Err(panicked(payload)));
    match outcome {
        Ok(()) => Status::Ok,
        Err(failure) => {
            write_failure(failure, output);
            Status::Failed
        }
    }
}

/// Turns a handler panic into a failure record.
fn panicked(payload: Box<dyn Any + Send>) -> Failure {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".into());
    tracing::error!(%message, "loopback handler panicked");
    Failure::new(CODE_GENERIC, message).with_kind("HandlerPanic")
}

impl Drop for LoopbackEngine {
    fn drop(&mut self) {
        // Must not block: the last reference may drop inside an async task.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
