//! # Future / Promise
//!
//! The one-shot result slot of an asynchronous call.
//!
//! ## Invariants
//!
//! - A slot moves from pending to terminal exactly once. `Promise::complete`
//!   consumes the promise, so a second write cannot be expressed.
//! - A promise dropped without completing fails its future with
//!   `InvalidState`.
//! - The terminal write happens under the slot's mutex; every waiter that
//!   observes it also observes the value.
//! - Waiting never cancels. A timed-out `wait_for` leaves the call pending.

use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::task::Waker;
use std::time::Duration;

use parking_lot::Condvar;
use parking_lot::Mutex;

use crate::error::Error;
use crate::error::Result;

type Callback<T> = Box<dyn FnOnce(&Result<T>) + Send>;

struct State<T> {
    outcome: Option<Result<T>>,
    wakers: Vec<Waker>,
    callbacks: Vec<Callback<T>>,
}

struct Slot<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

impl<T> Slot<T> {
    fn new(outcome: Option<Result<T>>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State { outcome, wakers: Vec::new(), callbacks: Vec::new() }),
            ready: Condvar::new(),
        })
    }

    fn resolve(&self, result: Result<T>) {
        let wakers = {
            let mut state = self.state.lock();
            debug_assert!(state.outcome.is_none(), "future resolved twice");
            for callback in std::mem::take(&mut state.callbacks) {
                callback(&result);
            }
            state.outcome = Some(result);
            std::mem::take(&mut state.wakers)
        };
        self.ready.notify_all();
        for waker in wakers {
            waker.wake();
        }
    }
}

/// Creates a connected promise/future pair.
pub fn pair<T>() -> (Promise<T>, Future<T>) {
    let slot = Slot::new(None);
    (Promise { slot: Some(slot.clone()) }, Future { slot })
}

/// The write side. Completed at most once, by whoever owns it.
pub struct Promise<T> {
    slot: Option<Arc<Slot<T>>>,
}

impl<T> Promise<T> {
    pub fn complete(mut self, result: Result<T>) {
        if let Some(slot) = self.slot.take() {
            slot.resolve(result);
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.resolve(Err(Error::invalid_state("completion abandoned before the call finished")));
        }
    }
}

/// The read side of an asynchronous call.
///
/// Clones observe the same slot.
pub struct Future<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self { slot: self.slot.clone() }
    }
}

impl<T> Future<T> {
    /// A future that is already terminal.
    pub fn ready(result: Result<T>) -> Self {
        Self { slot: Slot::new(Some(result)) }
    }

    /// A future that has already failed.
    pub fn failed(error: Error) -> Self {
        Self::ready(Err(error))
    }

    /// Non-blocking: has the call finished, successfully or not?
    pub fn is_ready(&self) -> bool {
        self.slot.state.lock().outcome.is_some()
    }

    /// Blocks until the call finishes or `timeout` passes.
    ///
    /// Returns `true` if the future is terminal.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut state = self.slot.state.lock();
        self.slot.ready.wait_while_for(&mut state, |s| s.outcome.is_none(), timeout);
        state.outcome.is_some()
    }

    /// Runs `f` with the outcome once it is known.
    ///
    /// Runs immediately if the future is already terminal. `f` runs under the
    /// slot's lock and must not touch this future.
    pub(crate) fn on_complete(&self, f: impl FnOnce(&Result<T>) + Send + 'static) {
        let mut state = self.slot.state.lock();
        match &state.outcome {
            Some(outcome) => f(outcome),
            None => state.callbacks.push(Box::new(f)),
        }
    }
}

impl<T: Clone> Future<T> {
    /// Blocks until the call finishes and returns its outcome.
    ///
    /// Idempotent: every call returns the same value or the same error.
    pub fn get_value(&self) -> Result<T> {
        let mut state = self.slot.state.lock();
        self.slot.ready.wait_while(&mut state, |s| s.outcome.is_none());
        match &state.outcome {
            Some(outcome) => outcome.clone(),
            None => Err(Error::invalid_state("future woke without an outcome")),
        }
    }

    /// Async view of this future; resolves to the same outcome as `get_value`.
    pub fn wait(&self) -> Wait<T> {
        Wait { slot: self.slot.clone() }
    }
}

impl<T: Clone + Send + 'static> Future<T> {
    /// Resolves once every input has; fails with the first error observed.
    ///
    /// Values keep the order of `futures`.
    pub fn join_all(futures: Vec<Future<T>>) -> Future<Vec<T>> {
        if futures.is_empty() {
            return Future::ready(Ok(Vec::new()));
        }

        struct Join<T> {
            values: Vec<Option<T>>,
            remaining: usize,
            promise: Option<Promise<Vec<T>>>,
        }

        let (promise, joined) = pair();
        let join = Arc::new(Mutex::new(Join {
            values: vec![None; futures.len()],
            remaining: futures.len(),
            promise: Some(promise),
        }));

        for (i, future) in futures.iter().enumerate() {
            let join = join.clone();
            future.on_complete(move |outcome| {
                let mut join = join.lock();
                match outcome {
                    Ok(value) => {
                        join.values[i] = Some(value.clone());
                        join.remaining -= 1;
                        if join.remaining == 0 {
                            let values = join.values.iter_mut().filter_map(Option::take).collect();
                            if let Some(promise) = join.promise.take() {
                                promise.complete(Ok(values));
                            }
                        }
                    }
                    Err(e) => {
                        if let Some(promise) = join.promise.take() {
                            promise.complete(Err(e.clone()));
                        }
                    }
                }
            });
        }
        joined
    }
}

impl<T: Clone> std::future::IntoFuture for Future<T> {
    type Output = Result<T>;
    type IntoFuture = Wait<T>;

    fn into_future(self) -> Wait<T> {
        Wait { slot: self.slot }
    }
}

/// Awaits a `Future` without blocking the executor.
pub struct Wait<T> {
    slot: Arc<Slot<T>>,
}

impl<T: Clone> std::future::Future for Wait<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<T>> {
        let mut state = self.slot.state.lock();
        if let Some(outcome) = &state.outcome {
            return Poll::Ready(outcome.clone());
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
