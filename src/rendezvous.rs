use std::{fmt, sync::Arc};

use tracing::{debug, info, warn};

#[cfg(feature = "profiler")]
use crate::timer::{Timer, TimingStats};
use crate::{
    aggregate::{AggregateAction, Aggregator, TripReport},
    barrier::CyclicBarrier,
    config::RendezvousConfig,
    error::RendezvousError,
    store::ResultStore,
    worker::{Task, Worker, WorkerHandle},
};

/// Wires one [`ResultStore`], one [`CyclicBarrier`] with an [`AggregateAction`], and one worker
/// thread per task.
///
/// ## Usage Pattern
///
/// ```rust,no_run
/// use cyclic_rendezvous::{RendezvousConfig, Rendezvous, RowSum, Sum};
///
/// let rows = vec![vec![1u64], vec![1, 1], vec![1, 2, 1]];
/// let config = RendezvousConfig { parties: 3, ..Default::default() };
///
/// let rendezvous = Rendezvous::new(config, rows.len(), Sum)?;
/// let handles = rendezvous.spawn(rows.into_iter().map(RowSum::new))?;
///
/// for handle in handles {
///     handle.join()?;
/// }
///
/// assert_eq!(rendezvous.reports()[0].aggregate, 7);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// When the number of tasks is not a multiple of `parties`, the last partial group never trips.
/// Those workers stay blocked until [`CyclicBarrier::reset`] is called on
/// [`barrier()`](Self::barrier), after which they return
/// [`BarrierError::Broken`](crate::BarrierError::Broken).
pub struct Rendezvous<T, G>
where
    G: Aggregator<T>,
{
    config: RendezvousConfig,
    store: Arc<ResultStore<T>>,
    barrier: Arc<CyclicBarrier<AggregateAction<T, G>>>,
    #[cfg(feature = "profiler")]
    timer: Arc<Timer>,
}

impl<T, G> Rendezvous<T, G>
where
    T: Default + Copy + fmt::Display + Send + Sync + 'static,
    G: Aggregator<T> + 'static,
    G::Aggregate: Clone + fmt::Display + Send + 'static,
{
    /// Creates the store for `task_count` tasks and the barrier that aggregates it with
    /// `aggregator` on every trip.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::Config`] if `config` does not pass
    /// [`validate`](RendezvousConfig::validate).
    pub fn new(
        config: RendezvousConfig,
        task_count: usize,
        aggregator: G,
    ) -> Result<Self, RendezvousError> {
        config.validate()?;

        let store = Arc::new(ResultStore::new(task_count));
        let action = AggregateAction::new(Arc::clone(&store), aggregator);
        let barrier = Arc::new(CyclicBarrier::with_action(config.parties, action)?);

        info!(
            parties = config.parties,
            tasks = task_count,
            full_trips = task_count / config.parties,
            stragglers = task_count % config.parties,
            "rendezvous ready"
        );

        Ok(Self {
            #[cfg(feature = "profiler")]
            timer: Arc::new(Timer::new(task_count)),
            config,
            store,
            barrier,
        })
    }

    /// Builds the worker for slot `index`, configured from this rendezvous.
    pub fn worker(&self, index: usize) -> Worker<T, AggregateAction<T, G>> {
        let worker = Worker::new(index, Arc::clone(&self.store), Arc::clone(&self.barrier));

        #[cfg(feature = "profiler")]
        let worker = worker.with_timer(Arc::clone(&self.timer));

        match self.config.wait_timeout() {
            Some(timeout) => worker.with_wait_timeout(timeout),
            None => worker,
        }
    }

    /// Spawns one named thread per task; task `i` writes slot `i`.
    ///
    /// # Errors
    ///
    /// - [`RendezvousError::TooManyTasks`] if there are more tasks than store slots. Nothing is
    ///   spawned in that case.
    /// - [`RendezvousError::Spawn`] if a thread cannot be created. Workers spawned before the
    ///   failure are cancelled and joined, and the barrier is reset.
    pub fn spawn<I, K>(&self, tasks: I) -> Result<Vec<WorkerHandle<T>>, RendezvousError>
    where
        I: IntoIterator<Item = K>,
        K: Task<Output = T> + 'static,
    {
        let tasks: Vec<K> = tasks.into_iter().collect();
        if tasks.len() > self.store.len() {
            return Err(RendezvousError::TooManyTasks {
                tasks: tasks.len(),
                slots: self.store.len(),
            });
        }

        let mut handles = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.into_iter().enumerate() {
            match self.worker(index).spawn(self.config.thread_name(index), task) {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    warn!(worker = index, %error, "failed to spawn worker, aborting the rest");
                    self.abort(handles);
                    return Err(error.into());
                }
            }
        }

        Ok(handles)
    }

    /// Cancels and joins `handles`, then resets the barrier so none of them is left blocked.
    fn abort(&self, handles: Vec<WorkerHandle<T>>) {
        for handle in &handles {
            handle.cancel();
        }

        for handle in handles {
            let worker = handle.worker();
            if let Err(error) = handle.join() {
                debug!(worker, %error, "aborted worker");
            }
        }

        self.barrier.reset();
    }

    #[inline]
    pub fn barrier(&self) -> &Arc<CyclicBarrier<AggregateAction<T, G>>> {
        &self.barrier
    }

    #[inline]
    pub fn store(&self) -> &Arc<ResultStore<T>> {
        &self.store
    }

    #[inline]
    pub fn config(&self) -> &RendezvousConfig {
        &self.config
    }

    /// Trip reports recorded by the barrier action so far.
    pub fn reports(&self) -> Vec<TripReport<G::Aggregate>> {
        self.barrier
            .action()
            .map(AggregateAction::reports)
            .unwrap_or_default()
    }

    /// Records the completion timestamp. Call after every worker has been joined.
    #[cfg(feature = "profiler")]
    pub fn finalize(&self) {
        self.timer.finalize();
    }

    #[cfg(feature = "profiler")]
    pub fn get_timing_stats(&self) -> TimingStats {
        self.timer.get_timing_stats()
    }
}

impl<T, G> fmt::Debug for Rendezvous<T, G>
where
    G: Aggregator<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rendezvous")
            .field("config", &self.config)
            .field("barrier", &self.barrier)
            .finish_non_exhaustive()
    }
}
