//! Barrier actions that fold the [`ResultStore`] into an aggregate on every trip.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::info;

use crate::{barrier::BarrierAction, error::ActionError, store::ResultStore};

/// Folds a snapshot of the store into one value.
pub trait Aggregator<T>: Send + Sync {
    type Aggregate;

    fn aggregate(&self, slots: &[T]) -> Self::Aggregate;
}

/// Sums every slot. Unwritten slots contribute zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl<T> Aggregator<T> for Sum
where
    T: Copy + std::iter::Sum<T>,
{
    type Aggregate = T;

    #[inline]
    fn aggregate(&self, slots: &[T]) -> T {
        slots.iter().copied().sum()
    }
}

/// What one trip of the barrier observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripReport<G> {
    /// 1-based ordinal of the trip.
    pub trip: usize,
    pub aggregate: G,
    /// Slots that had been written when the action ran.
    pub completed_slots: usize,
    pub total_slots: usize,
}

impl<G> TripReport<G> {
    /// True if some tasks had not published yet, i.e. the aggregate is zero-filled.
    #[inline]
    pub fn is_partial(&self) -> bool {
        self.completed_slots < self.total_slots
    }
}

/// The barrier action used by [`Rendezvous`](crate::Rendezvous): aggregates the store, logs the
/// result and keeps a [`TripReport`] per trip.
pub struct AggregateAction<T, G>
where
    G: Aggregator<T>,
{
    store: Arc<ResultStore<T>>,
    aggregator: G,
    reports: Mutex<Vec<TripReport<G::Aggregate>>>,
}

impl<T, G> AggregateAction<T, G>
where
    T: Default + Copy,
    G: Aggregator<T>,
    G::Aggregate: Clone + fmt::Display,
{
    pub fn new(store: Arc<ResultStore<T>>, aggregator: G) -> Self {
        Self {
            store,
            aggregator,
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Aggregates the current store contents and records the trip.
    pub fn invoke(&self) -> G::Aggregate {
        let (slots, completed_slots) = self.store.snapshot_counted();
        let aggregate = self.aggregator.aggregate(&slots);

        let mut reports = self.reports.lock();
        let report = TripReport {
            trip: reports.len() + 1,
            aggregate: aggregate.clone(),
            completed_slots,
            total_slots: slots.len(),
        };

        info!(
            trip = report.trip,
            completed = report.completed_slots,
            total = report.total_slots,
            "barrier completed, accumulated total {}",
            report.aggregate
        );

        reports.push(report);
        aggregate
    }

    /// Every trip recorded so far, oldest first.
    pub fn reports(&self) -> Vec<TripReport<G::Aggregate>> {
        self.reports.lock().clone()
    }

    pub fn trips(&self) -> usize {
        self.reports.lock().len()
    }

    #[inline]
    pub fn store(&self) -> &Arc<ResultStore<T>> {
        &self.store
    }
}

impl<T, G> BarrierAction for AggregateAction<T, G>
where
    T: Default + Copy + Send + Sync,
    G: Aggregator<T>,
    G::Aggregate: Clone + fmt::Display + Send,
{
    fn run(&self) -> Result<(), ActionError> {
        self.invoke();
        Ok(())
    }
}

impl<T, G> fmt::Debug for AggregateAction<T, G>
where
    G: Aggregator<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateAction")
            .field("slots", &self.store.len())
            .field("trips", &self.reports.lock().len())
            .finish()
    }
}
