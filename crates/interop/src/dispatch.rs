//! # Command Dispatch
//!
//! The call patterns every façade operation is built from.
//!
//! A `Target` pairs a remote handle with the environment it lives in. Each
//! pattern leases its own buffers, encodes the arguments, crosses the engine
//! boundary and translates the reply status before anything is decoded.
//!
//! ## Patterns
//!
//! | Pattern                | Input        | Output       |
//! |------------------------|--------------|--------------|
//! | `out_op`               | encoded      | status only  |
//! | `in_op`                | none         | decoded      |
//! | `out_in_op`            | encoded      | decoded      |
//! | `out_in_op_scalar`     | one `i64`    | one `i64`    |
//! | `in_stream_out_stream` | caller's     | caller's     |
//!
//! Async variants share the encode step and return a `Future` as soon as the
//! engine has accepted the call.

use std::sync::Arc;

use interpack::BinaryType;
use interpack::Memory;
use interpack::Reader;
use interpack::TypeRegistry;
use interpack::Writer;

use crate::command::Command;
use crate::completion::Reply;
use crate::env::Environment;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::error::Result;
use crate::future;
use crate::future::Future;
use crate::handle::RawHandle;
use crate::handle::RemoteHandle;
use crate::transport::Failure;
use crate::transport::Status;

/// Translates a reply status. On failure, decodes the record in `output`.
pub(crate) fn check_status(status: u8, output: &Memory, registry: &TypeRegistry) -> Result<()> {
    let kind = match Status::from_u8(status) {
        Some(Status::Ok) => return Ok(()),
        Some(Status::Failed) => ErrorKind::Remote,
        Some(Status::InvalidTarget) => ErrorKind::InvalidState,
        None => return Err(Error::encoding(format!("unknown reply status {:#04x}", status))),
    };
    match Failure::read(&mut Reader::new(output, registry)) {
        Ok(failure) => Err(Error::from_failure(kind, failure)),
        Err(e) => Err(Error::encoding(format!("malformed failure record: {}", e))),
    }
}

fn decode_reply<R>(
    reply: Result<Reply>,
    registry: &TypeRegistry,
    decode: impl FnOnce(&mut Reader<'_>) -> interpack::Result<R>,
) -> Result<R> {
    let (status, output) = reply?;
    check_status(status, &output, registry)?;
    Ok(decode(&mut Reader::new(&output, registry))?)
}

/// A remote object reachable through an environment's engine.
#[derive(Clone)]
pub struct Target {
    env: Arc<Environment>,
    handle: RemoteHandle,
}

impl Target {
    pub fn new(env: Arc<Environment>, handle: RemoteHandle) -> Self {
        Self { env, handle }
    }

    pub fn raw(&self) -> RawHandle {
        self.handle.raw()
    }

    pub fn handle(&self) -> &RemoteHandle {
        &self.handle
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    fn encode_into(
        &self,
        mem: &mut Memory,
        encode: impl FnOnce(&mut Writer<'_>) -> interpack::Result<()>,
    ) -> Result<()> {
        let mut writer = Writer::new(mem, self.env.registry());
        encode(&mut writer)?;
        writer.synchronize()?;
        Ok(())
    }

    /// Hands prepared buffers across and blocks for the reply.
    ///
    /// `input` must already be committed. On success `output` holds the
    /// reply payload, left for the caller to decode.
    pub fn in_stream_out_stream(&self, op: i32, input: &Memory, output: &mut Memory) -> Result<()> {
        tracing::debug!(op, target = %self.raw(), len = input.len(), "dispatch");
        let status = self.env.engine().call(self.raw(), op, input, output)?;
        check_status(status, output, self.env.registry())
    }

    /// Encodes the arguments, calls `op` and decodes its result.
    ///
    /// `decode` is never invoked when the call fails.
    pub fn out_in_op<R>(
        &self,
        op: i32,
        encode: impl FnOnce(&mut Writer<'_>) -> interpack::Result<()>,
        decode: impl FnOnce(&mut Reader<'_>) -> interpack::Result<R>,
    ) -> Result<R> {
        let mut input = self.env.allocate()?;
        let mut output = self.env.allocate()?;
        self.encode_into(&mut input, encode)?;
        self.in_stream_out_stream(op, &input, &mut output)?;
        Ok(decode(&mut Reader::new(&output, self.env.registry()))?)
    }

    /// Calls `op` for its effect; any result payload is ignored.
    pub fn out_op(&self, op: i32, encode: impl FnOnce(&mut Writer<'_>) -> interpack::Result<()>) -> Result<()> {
        self.out_in_op(op, encode, |_| Ok(()))
    }

    /// Calls `op` with no arguments and decodes its result.
    pub fn in_op<R>(&self, op: i32, decode: impl FnOnce(&mut Reader<'_>) -> interpack::Result<R>) -> Result<R> {
        self.out_in_op(op, |_| Ok(()), decode)
    }

    /// Calls `op` with a single `i64` and returns its `i64` result.
    ///
    /// No payload buffers cross the boundary; one buffer is leased only to
    /// receive a failure record.
    pub fn out_in_op_scalar(&self, op: i32, value: i64) -> Result<i64> {
        let mut output = self.env.allocate()?;
        tracing::debug!(op, target = %self.raw(), "dispatch scalar");
        let (status, result) = self.env.engine().call_scalar(self.raw(), op, value, &mut output)?;
        check_status(status, &output, self.env.registry())?;
        Ok(result)
    }

    /// Sends `arg` as a tagged object and reads a tagged `R` back.
    ///
    /// Both types are checked against the registry before anything is sent.
    pub fn out_in_object<A: BinaryType, R: BinaryType>(&self, op: i32, arg: &A) -> Result<R> {
        self.ensure_registered::<A>()?;
        self.ensure_registered::<R>()?;
        self.out_in_op(op, |w| w.write_object(arg), |r| r.read_object())
    }

    /// Runs a typed command.
    pub fn execute<C: Command>(&self, input: &C::Input) -> Result<C::Output> {
        self.out_in_op(C::OPCODE, |w| C::encode(input, w), C::decode)
    }

    fn ensure_registered<T: BinaryType>(&self) -> Result<()> {
        if T::PRIMITIVE.is_none() {
            self.env.registry().require::<T>()?;
        }
        Ok(())
    }

    /// Encodes the arguments, submits `op` and returns without waiting.
    ///
    /// Encoding and submission failures are reported through the returned
    /// future, which is then already terminal.
    pub fn out_in_op_async<R: Send + 'static>(
        &self,
        op: i32,
        encode: impl FnOnce(&mut Writer<'_>) -> interpack::Result<()>,
        decode: impl FnOnce(&mut Reader<'_>) -> interpack::Result<R> + Send + 'static,
    ) -> Future<R> {
        let mut input = match self.env.allocate() {
            Ok(input) => input,
            Err(e) => return Future::failed(e),
        };
        if let Err(e) = self.encode_into(&mut input, encode) {
            return Future::failed(e);
        }

        let (promise, future) = future::pair();
        let registry = self.env.registry().clone();
        let completions = self.env.completions();
        let id = completions.register(move |reply| {
            promise.complete(decode_reply(reply, &registry, decode));
        });

        tracing::debug!(op, target = %self.raw(), correlation = %id, len = input.len(), "dispatch async");
        let submitted = self.env.engine().call_async(
            self.raw(),
            op,
            id,
            input.into_inner(),
            self.env.completion_sink(),
        );
        if let Err(e) = submitted {
            tracing::debug!(correlation = %id, error = %e, "submission failed");
            completions.fail(id, e.into());
        }
        future
    }

    pub fn out_op_async(&self, op: i32, encode: impl FnOnce(&mut Writer<'_>) -> interpack::Result<()>) -> Future<()> {
        self.out_in_op_async(op, encode, |_| Ok(()))
    }

    pub fn in_op_async<R: Send + 'static>(
        &self,
        op: i32,
        decode: impl FnOnce(&mut Reader<'_>) -> interpack::Result<R> + Send + 'static,
    ) -> Future<R> {
        self.out_in_op_async(op, |_| Ok(()), decode)
    }

    pub fn out_in_object_async<A: BinaryType, R: BinaryType>(&self, op: i32, arg: &A) -> Future<R> {
        if let Err(e) = self.ensure_registered::<A>().and_then(|()| self.ensure_registered::<R>()) {
            return Future::failed(e);
        }
        self.out_in_op_async(op, |w| w.write_object(arg), |r| r.read_object())
    }

    pub fn execute_async<C: Command>(&self, input: &C::Input) -> Future<C::Output>
    where
        C::Output: Send + 'static,
    {
        self.out_in_op_async(C::OPCODE, |w| C::encode(input, w), C::decode)
    }
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target").field("handle", &self.handle).finish()
    }
}
