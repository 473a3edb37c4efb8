// Copyright (c) The ticksync Authors.
// Licensed under the MIT License.

//! Single-threaded cooperative scheduler.
//!
//! [`LocalScheduler`] keeps a queue of woken tasks and a set of timers. It
//! never runs anything on its own: work only happens when somebody calls
//! [`Scheduler::tick`], and each tick runs at most one task. Callers that need
//! to wait for a value (a blocking adapter, [`LocalScheduler::block_on`])
//! pump it one tick at a time and use [`Scheduler::has_pending_work`] to
//! detect that no further progress is possible.
//!
//! Ticking is re-entrant: a task may call into code that ticks the same
//! scheduler again. A task that is being polled is never polled a second time
//! further down the stack; wakeups it receives in the meantime are delivered
//! once its outer poll returns.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::{Pin, pin};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use futures_util::future::LocalBoxFuture;
use futures_util::task::{ArcWake, waker_ref};
use futures_util::FutureExt;
use parking_lot::Mutex;
use pin_project_lite::pin_project;

use crate::error::{Elapsed, Stalled};
use crate::promise::Promise;

/// The interface a blocking caller uses to drive cooperative work forward.
pub trait Scheduler {
    /// Run at most one unit of queued work.
    ///
    /// With `blocking` set, an idle scheduler that still has timers armed may
    /// put the thread to sleep until the nearest one expires.
    fn tick(&self, blocking: bool);

    /// Returns `false` when ticking can no longer make progress.
    fn has_pending_work(&self) -> bool;
}

impl<S: Scheduler + ?Sized> Scheduler for &S {
    fn tick(&self, blocking: bool) {
        (**self).tick(blocking)
    }

    fn has_pending_work(&self) -> bool {
        (**self).has_pending_work()
    }
}

impl<S: Scheduler + ?Sized> Scheduler for Rc<S> {
    fn tick(&self, blocking: bool) {
        (**self).tick(blocking)
    }

    fn has_pending_work(&self) -> bool {
        (**self).has_pending_work()
    }
}

/// Identifier of a spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Default)]
struct ReadyQueue {
    queue: Mutex<VecDeque<TaskId>>,
}

impl ReadyQueue {
    fn push(&self, id: TaskId) {
        self.queue.lock().push_back(id);
    }

    fn pop(&self) -> Option<TaskId> {
        self.queue.lock().pop_front()
    }

    fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

struct TaskWaker {
    id: TaskId,
    ready: Arc<ReadyQueue>,
    scheduled: AtomicBool,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        if !arc_self.scheduled.swap(true, Ordering::AcqRel) {
            arc_self.ready.push(arc_self.id);
        }
    }
}

struct Task {
    future: LocalBoxFuture<'static, ()>,
    waker: Arc<TaskWaker>,
}

type TimerKey = (Instant, u64);

#[derive(Default)]
struct Shared {
    tasks: RefCell<HashMap<TaskId, Task>>,
    // Tasks currently being polled somewhere up the stack.
    running: RefCell<HashSet<TaskId>>,
    // Wakeups for running tasks that a nested tick dequeued.
    orphaned: RefCell<Vec<TaskId>>,
    ready: Arc<ReadyQueue>,
    timers: RefCell<BTreeMap<TimerKey, Waker>>,
    next_task: Cell<u64>,
    next_timer: Cell<u64>,
}

thread_local! {
    static CURRENT: RefCell<Option<LocalScheduler>> = const { RefCell::new(None) };
}

/// A cooperative scheduler that only makes progress when ticked.
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone, Default)]
pub struct LocalScheduler {
    shared: Rc<Shared>,
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The scheduler driving the innermost [`block_on`](Self::block_on) on
    /// this thread, if any.
    pub fn current() -> Option<Self> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Queue `future` as a new task. It first runs on a later tick.
    pub fn spawn<F>(&self, future: F) -> TaskId
    where
        F: Future<Output = ()> + 'static,
    {
        let id = TaskId(self.shared.next_task.get());
        self.shared.next_task.set(id.0 + 1);

        let waker = Arc::new(TaskWaker {
            id,
            ready: self.shared.ready.clone(),
            scheduled: AtomicBool::new(false),
        });
        self.shared.tasks.borrow_mut().insert(
            id,
            Task {
                future: future.boxed_local(),
                waker: waker.clone(),
            },
        );
        ArcWake::wake_by_ref(&waker);
        tracing::trace!(%id, "spawned task");
        id
    }

    /// Run `future` as a task and expose its outcome as a [`Promise`].
    pub fn spawn_promise<T, F>(&self, future: F) -> Promise<T>
    where
        T: 'static,
        F: Future<Output = io::Result<T>> + 'static,
    {
        let (promise, deferred) = Promise::pending();
        self.spawn(async move {
            let result = future.await;
            deferred.settle(result);
        });
        promise
    }

    /// A future that completes once `duration` has elapsed.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        self.sleep_until(Instant::now() + duration)
    }

    pub fn sleep_until(&self, deadline: Instant) -> Sleep {
        Sleep {
            shared: self.shared.clone(),
            deadline,
            key: None,
        }
    }

    /// Run `future`, giving up once `duration` has elapsed.
    pub fn timeout<F: Future>(&self, duration: Duration, future: F) -> Timeout<F> {
        Timeout {
            future,
            sleep: self.sleep(duration),
        }
    }

    /// Number of tasks spawned and not yet finished.
    pub fn pending_tasks(&self) -> usize {
        self.shared.tasks.borrow().len() + self.shared.running.borrow().len()
    }

    /// Drive the scheduler until `future` completes.
    ///
    /// While this runs, [`LocalScheduler::current`] returns this scheduler.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, Stalled> {
        let _enter = EnterGuard::enter(self.clone());
        let mut future = pin!(future);

        let main = Arc::new(MainWaker {
            woken: AtomicBool::new(true),
        });
        let waker = waker_ref(&main);
        let mut cx = Context::from_waker(&waker);

        let mut ticks = 0;
        loop {
            if main.woken.swap(false, Ordering::AcqRel) {
                if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                    tracing::trace!(ticks, "block_on finished");
                    return Ok(output);
                }
                continue;
            }
            if !self.has_pending_work() {
                tracing::debug!(ticks, "block_on stalled");
                return Err(Stalled { ticks });
            }
            self.tick(true);
            ticks += 1;
        }
    }

    fn fire_timers(&self, now: Instant) {
        loop {
            let expired = {
                let mut timers = self.shared.timers.borrow_mut();
                match timers.first_key_value() {
                    Some((key, _)) if key.0 <= now => timers.pop_first(),
                    _ => None,
                }
            };
            match expired {
                Some((_, waker)) => {
                    tracing::trace!("timer fired");
                    waker.wake();
                }
                None => break,
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.shared
            .timers
            .borrow()
            .first_key_value()
            .map(|(key, _)| key.0)
    }

    fn run_task(&self, id: TaskId) {
        let task = self.shared.tasks.borrow_mut().remove(&id);
        let Some(mut task) = task else {
            if self.shared.running.borrow().contains(&id) {
                self.shared.orphaned.borrow_mut().push(id);
            }
            return;
        };

        self.shared.running.borrow_mut().insert(id);
        task.waker.scheduled.store(false, Ordering::Release);
        let poll = {
            let waker = waker_ref(&task.waker);
            let mut cx = Context::from_waker(&waker);
            task.future.as_mut().poll(&mut cx)
        };
        self.shared.running.borrow_mut().remove(&id);

        if poll.is_ready() {
            tracing::trace!(%id, "task finished");
            return;
        }
        self.shared.tasks.borrow_mut().insert(id, task);

        let mut orphaned = self.shared.orphaned.borrow_mut();
        if let Some(pos) = orphaned.iter().position(|orphan| *orphan == id) {
            orphaned.swap_remove(pos);
            self.shared.ready.push(id);
        }
    }
}

impl Scheduler for LocalScheduler {
    fn tick(&self, blocking: bool) {
        self.fire_timers(Instant::now());

        let next = match self.shared.ready.pop() {
            Some(id) => Some(id),
            None if blocking => match self.next_deadline() {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline > now {
                        std::thread::sleep(deadline - now);
                    }
                    self.fire_timers(Instant::now());
                    self.shared.ready.pop()
                }
                None => None,
            },
            None => None,
        };

        if let Some(id) = next {
            tracing::trace!(%id, "tick");
            self.run_task(id);
        }
    }

    fn has_pending_work(&self) -> bool {
        !self.shared.ready.is_empty() || !self.shared.timers.borrow().is_empty()
    }
}

impl fmt::Debug for LocalScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalScheduler")
            .field("tasks", &self.pending_tasks())
            .field("timers", &self.shared.timers.borrow().len())
            .finish()
    }
}

struct MainWaker {
    woken: AtomicBool,
}

impl ArcWake for MainWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.woken.store(true, Ordering::Release);
    }
}

struct EnterGuard {
    previous: Option<LocalScheduler>,
}

impl EnterGuard {
    fn enter(scheduler: LocalScheduler) -> Self {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(scheduler));
        Self { previous }
    }
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Future returned by [`LocalScheduler::sleep`].
///
/// The timer is disarmed when the future is dropped.
pub struct Sleep {
    shared: Rc<Shared>,
    deadline: Instant,
    key: Option<TimerKey>,
}

impl Sleep {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    fn disarm(&mut self) {
        if let Some(key) = self.key.take() {
            self.shared.timers.borrow_mut().remove(&key);
        }
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if Instant::now() >= self.deadline {
            self.disarm();
            return Poll::Ready(());
        }

        let mut timers = self.shared.timers.borrow_mut();
        let armed = self
            .key
            .and_then(|key| timers.get_mut(&key))
            .map(|waker| {
                if !waker.will_wake(cx.waker()) {
                    *waker = cx.waker().clone();
                }
            })
            .is_some();
        if !armed {
            let seq = self.shared.next_timer.get();
            self.shared.next_timer.set(seq + 1);
            let key = (self.deadline, seq);
            timers.insert(key, cx.waker().clone());
            drop(timers);
            self.key = Some(key);
        }
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        self.disarm();
    }
}

impl fmt::Debug for Sleep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sleep")
            .field("deadline", &self.deadline)
            .finish()
    }
}

pin_project! {
    /// Future returned by [`LocalScheduler::timeout`].
    #[derive(Debug)]
    pub struct Timeout<F> {
        #[pin]
        future: F,
        sleep: Sleep,
    }
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output, Elapsed>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if let Poll::Ready(output) = this.future.poll(cx) {
            return Poll::Ready(Ok(output));
        }
        match Pin::new(this.sleep).poll(cx) {
            Poll::Ready(()) => Poll::Ready(Err(Elapsed(()))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Yield once back to the scheduler, letting other tasks run.
pub async fn yield_now() {
    let mut yielded = false;
    std::future::poll_fn(|cx| {
        if yielded {
            return Poll::Ready(());
        }
        yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    })
    .await
}
