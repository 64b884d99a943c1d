//! Workers: run one task, publish its partial result, then meet the others at the barrier.

use std::{
    fmt, io,
    iter::Sum,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

#[cfg(feature = "profiler")]
use std::time::Instant;

use tracing::{debug, info};

#[cfg(feature = "profiler")]
use crate::timer::Timer;
use crate::{
    barrier::{BarrierAction, CancelToken, CyclicBarrier},
    error::{WorkerError, panic_message},
    store::ResultStore,
};

/// A unit of work run by a worker before it reaches the barrier.
///
/// Any `FnOnce() -> T + Send` closure is a task.
pub trait Task: Send {
    type Output;

    fn run(self) -> Self::Output;
}

impl<F, T> Task for F
where
    F: FnOnce() -> T + Send,
{
    type Output = T;

    #[inline]
    fn run(self) -> T {
        self()
    }
}

/// Sums one row of numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSum<T> {
    row: Vec<T>,
}

impl<T> RowSum<T> {
    pub fn new(row: Vec<T>) -> Self {
        Self { row }
    }
}

impl<T> Task for RowSum<T>
where
    T: Copy + Sum<T> + Send,
{
    type Output = T;

    fn run(self) -> T {
        self.row.into_iter().sum()
    }
}

/// What a worker reports once it made it through the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOutcome<T> {
    /// Index of the worker, which is also its task and store slot.
    pub worker: usize,
    pub partial: T,
    /// Arrival index within the generation it joined; `parties - 1` for the trigger.
    pub arrival: usize,
}

/// One worker bound to a store slot and a barrier.
///
/// The worker holds no other state and does not know how many other workers exist.
pub struct Worker<T, A> {
    index: usize,
    store: Arc<ResultStore<T>>,
    barrier: Arc<CyclicBarrier<A>>,
    wait_timeout: Option<Duration>,
    cancel_token: Option<CancelToken>,
    #[cfg(feature = "profiler")]
    timer: Option<Arc<Timer>>,
}

impl<T, A> Worker<T, A>
where
    T: Default + Copy + fmt::Display,
    A: BarrierAction,
{
    pub fn new(index: usize, store: Arc<ResultStore<T>>, barrier: Arc<CyclicBarrier<A>>) -> Self {
        Self {
            index,
            store,
            barrier,
            wait_timeout: None,
            cancel_token: None,
            #[cfg(feature = "profiler")]
            timer: None,
        }
    }

    /// Gives up waiting at the barrier after `timeout`, breaking it for everyone else.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    /// Waits through `token`, so the worker can be interrupted while blocked.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    #[cfg(feature = "profiler")]
    pub fn with_timer(mut self, timer: Arc<Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Runs `task` to completion, writes its result into this worker's slot and waits at the
    /// barrier.
    ///
    /// # Errors
    ///
    /// - [`WorkerError::Store`] if the slot was already written
    /// - [`WorkerError::Barrier`] if the barrier broke, the wait was cancelled, or this worker
    ///   triggered the action and the action failed
    ///
    /// # Panics
    ///
    /// Panics if the worker index is outside the store.
    pub fn run<K>(self, task: K) -> Result<WorkerOutcome<T>, WorkerError>
    where
        K: Task<Output = T>,
    {
        #[cfg(feature = "profiler")]
        let started = Instant::now();

        let partial = task.run();

        #[cfg(feature = "profiler")]
        if let Some(timer) = &self.timer {
            timer.record_computation(self.index, started.elapsed());
        }

        self.store.build_slot_writer(self.index).write(partial)?;
        info!(worker = self.index, "row {} sums to {}", self.index, partial);

        #[cfg(feature = "profiler")]
        let arrived = Instant::now();

        let arrival = self
            .barrier
            .wait_with(self.wait_timeout, self.cancel_token.as_ref());

        #[cfg(feature = "profiler")]
        if let Some(timer) = &self.timer {
            timer.record_wait(self.index, arrived.elapsed());
        }

        let arrival = arrival?;
        debug!(worker = self.index, arrival, "released from barrier");

        Ok(WorkerOutcome {
            worker: self.index,
            partial,
            arrival,
        })
    }
}

impl<T, A> Worker<T, A>
where
    T: Default + Copy + fmt::Display + Send + Sync + 'static,
    A: BarrierAction + 'static,
{
    /// Runs the worker on a new OS thread named `name`.
    ///
    /// The returned handle can interrupt the worker while it is blocked at the barrier. If the
    /// worker was not given a cancel token, one is minted from its barrier.
    pub fn spawn<K>(self, name: String, task: K) -> io::Result<WorkerHandle<T>>
    where
        K: Task<Output = T> + 'static,
    {
        let worker = self.index;
        let cancel_token = match &self.cancel_token {
            Some(token) => token.clone(),
            None => self.barrier.cancel_token(),
        };
        let this = self.with_cancel_token(cancel_token.clone());

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || this.run(task))?;

        Ok(WorkerHandle {
            worker,
            cancel_token,
            handle,
        })
    }
}

impl<T, A> fmt::Debug for Worker<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("index", &self.index)
            .field("wait_timeout", &self.wait_timeout)
            .field("cancellable", &self.cancel_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Handle to a worker running on its own thread.
#[derive(Debug)]
pub struct WorkerHandle<T> {
    worker: usize,
    cancel_token: CancelToken,
    handle: JoinHandle<Result<WorkerOutcome<T>, WorkerError>>,
}

impl<T> WorkerHandle<T> {
    #[inline]
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Interrupts the worker if it is blocked at the barrier. This breaks the barrier for all
    /// of its co-waiters.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the worker thread to end.
    ///
    /// A worker still blocked at a barrier that never trips will block this call too; reset the
    /// barrier or [`cancel`](Self::cancel) the worker first.
    pub fn join(self) -> Result<WorkerOutcome<T>, WorkerError> {
        let worker = self.worker;
        self.handle.join().unwrap_or_else(|payload| {
            Err(WorkerError::Panicked {
                worker,
                message: panic_message(payload.as_ref()),
            })
        })
    }
}
