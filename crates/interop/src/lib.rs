//! # Interop Dispatch Core
//!
//! Drives typed commands across an opaque engine boundary and translates
//! whatever comes back.
//!
//! ## Philosophy
//!
//! - **Opaque Engine**: The far side is reached only through the `Engine`
//!   trait. It moves buffers and status bytes; it never sees Rust types.
//! - **One Dispatch Path**: Every façade operation is one of the patterns on
//!   `Target`. Sync and async share the same encode step and the same
//!   status translation.
//! - **No Silent Failures**: A failed status never reaches a decode closure.
//!   A dropped promise fails its future instead of leaving it pending.
//! - **Lifetimes Follow Ownership**: A `RemoteHandle` disposes its far-side
//!   object exactly once, when the last clone is dropped.
//!
//! ## Layout
//!
//! - `env`: the shared `Environment` (engine, registry, pools, tables).
//! - `dispatch`: the call patterns on `Target`.
//! - `completion`: the pending table async replies are routed through.
//! - `future`: `Future`/`Promise`.
//! - `handle`: ref-counted remote handles.
//! - `loopback`: an in-process engine.

pub mod command;
pub mod completion;
pub mod config;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod future;
pub mod group;
pub mod handle;
pub mod loopback;
pub mod pool;
pub mod transport;


pub use command::Command;
pub use completion::CompletionSink;
pub use completion::CorrelationId;
pub use config::Config;
pub use dispatch::Target;
pub use env::Environment;
pub use env::EnvironmentBuilder;
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;
pub use future::Future;
pub use future::Promise;
pub use group::TargetGroup;
pub use handle::RawHandle;
pub use handle::RemoteHandle;
pub use loopback::LoopbackEngine;
pub use loopback::ObjectType;
pub use pool::Lease;
pub use pool::MemoryPool;
pub use transport::Engine;
pub use transport::Failure;
pub use transport::Status;
