// Copyright (c) The ticksync Authors.
// Licensed under the MIT License.

//! Settle-once promises for cooperatively scheduled operations.
//!
//! A [`Promise`] is the consuming half of a pending computation and a
//! [`Deferred`] is the producing half. The pair is created with
//! [`Promise::pending`]; the deferred side is consumed by the first (and only)
//! settlement, so a promise can never be settled twice.
//!
//! Promises are `!Send`: they belong to the thread that runs the scheduler.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Observable state of a [`Promise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
    /// The outcome has already been taken out of the promise.
    Consumed,
}

enum Slot<T> {
    Pending(Option<Waker>),
    Settled(io::Result<T>),
    Consumed,
}

/// A handle to a value that is not available yet.
pub struct Promise<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

/// The resolving half of a [`Promise`].
///
/// Dropping a `Deferred` without settling it rejects the promise with
/// [`io::ErrorKind::BrokenPipe`].
pub struct Deferred<T> {
    slot: Option<Rc<RefCell<Slot<T>>>>,
}

impl<T> Promise<T> {
    /// Create an unsettled promise together with its resolver.
    pub fn pending() -> (Promise<T>, Deferred<T>) {
        let slot = Rc::new(RefCell::new(Slot::Pending(None)));
        (
            Promise { slot: slot.clone() },
            Deferred { slot: Some(slot) },
        )
    }

    /// A promise that is already fulfilled with `value`.
    pub fn fulfilled(value: T) -> Self {
        Self::settled(Ok(value))
    }

    /// A promise that is already rejected with `error`.
    pub fn rejected(error: io::Error) -> Self {
        Self::settled(Err(error))
    }

    fn settled(result: io::Result<T>) -> Self {
        Promise {
            slot: Rc::new(RefCell::new(Slot::Settled(result))),
        }
    }

    pub fn state(&self) -> PromiseState {
        match &*self.slot.borrow() {
            Slot::Pending(_) => PromiseState::Pending,
            Slot::Settled(Ok(_)) => PromiseState::Fulfilled,
            Slot::Settled(Err(_)) => PromiseState::Rejected,
            Slot::Consumed => PromiseState::Consumed,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    /// Take the outcome if the promise has settled.
    ///
    /// Returns `None` while pending and after the outcome was taken once.
    pub fn try_take(&mut self) -> Option<io::Result<T>> {
        let mut slot = self.slot.borrow_mut();
        match &*slot {
            Slot::Settled(_) => match std::mem::replace(&mut *slot, Slot::Consumed) {
                Slot::Settled(result) => Some(result),
                _ => unreachable!(),
            },
            _ => None,
        }
    }
}

impl<T> Future for Promise<T> {
    type Output = io::Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(result) = self.try_take() {
            return Poll::Ready(result);
        }
        let mut slot = self.slot.borrow_mut();
        match &mut *slot {
            Slot::Pending(waker) => {
                match waker {
                    Some(w) if w.will_wake(cx.waker()) => {}
                    _ => *waker = Some(cx.waker().clone()),
                }
                Poll::Pending
            }
            Slot::Consumed => Poll::Ready(Err(io::Error::other("promise polled after completion"))),
            Slot::Settled(_) => unreachable!(),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state())
            .finish()
    }
}

impl<T> Deferred<T> {
    pub fn resolve(self, value: T) {
        self.settle(Ok(value))
    }

    pub fn reject(self, error: io::Error) {
        self.settle(Err(error))
    }

    /// Settle the promise with `result`, waking whoever awaits it.
    pub fn settle(mut self, result: io::Result<T>) {
        if let Some(slot) = self.slot.take() {
            Self::store(&slot, result);
        }
    }

    /// Returns `true` once the consuming [`Promise`] has been dropped.
    pub fn is_abandoned(&self) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|slot| Rc::strong_count(slot) == 1)
    }

    fn store(slot: &RefCell<Slot<T>>, result: io::Result<T>) {
        let previous = std::mem::replace(&mut *slot.borrow_mut(), Slot::Settled(result));
        if let Slot::Pending(Some(waker)) = previous {
            waker.wake();
        }
    }
}

impl<T> Drop for Deferred<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            Self::store(
                &slot,
                Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "promise abandoned before settling",
                )),
            );
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}
