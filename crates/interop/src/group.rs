//! # Target Groups
//!
//! One opcode sent to a fixed set of targets.

use interpack::Reader;
use interpack::Writer;

use crate::command::Command;
use crate::dispatch::Target;
use crate::error::Result;
use crate::future::Future;

/// A fixed, ordered set of targets.
///
/// Results always come back in member order, one per member.
#[derive(Clone, Debug)]
pub struct TargetGroup {
    members: Vec<Target>,
}

impl TargetGroup {
    pub fn new(members: Vec<Target>) -> Self {
        Self { members }
    }

    pub fn members(&self) -> &[Target] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Calls `op` on every member in turn. The first failure fails the whole call.
    pub fn broadcast<R>(
        &self,
        op: i32,
        encode: impl Fn(&mut Writer<'_>) -> interpack::Result<()>,
        decode: impl Fn(&mut Reader<'_>) -> interpack::Result<R>,
    ) -> Result<Vec<R>> {
        tracing::debug!(op, members = self.members.len(), "broadcast");
        self.members
            .iter()
            .map(|t| t.out_in_op(op, &encode, &decode))
            .collect()
    }

    /// Submits `op` to every member at once.
    pub fn broadcast_async<R: Clone + Send + 'static>(
        &self,
        op: i32,
        encode: impl Fn(&mut Writer<'_>) -> interpack::Result<()>,
        decode: impl Fn(&mut Reader<'_>) -> interpack::Result<R> + Clone + Send + 'static,
    ) -> Future<Vec<R>> {
        tracing::debug!(op, members = self.members.len(), "broadcast async");
        let futures = self
            .members
            .iter()
            .map(|t| t.out_in_op_async(op, &encode, decode.clone()))
            .collect();
        Future::join_all(futures)
    }

    pub fn execute<C: Command>(&self, input: &C::Input) -> Result<Vec<C::Output>> {
        self.members.iter().map(|t| t.execute::<C>(input)).collect()
    }

    pub fn execute_async<C: Command>(&self, input: &C::Input) -> Future<Vec<C::Output>>
    where
        C::Output: Clone + Send + 'static,
    {
        let futures = self.members.iter().map(|t| t.execute_async::<C>(input)).collect();
        Future::join_all(futures)
    }
}
