//! # CyclicRendezvous - Reusable Barrier with a Trip Action
//!
//! A cyclic barrier for a fixed number of parties, plus the pieces needed to drive it with
//! independent workers: each worker computes one partial result, publishes it into its own slot
//! of a shared store, then waits at the barrier. The last worker to arrive runs an action that
//! aggregates the store, and the barrier resets itself for the next group of arrivals.
//!
//! ## Key Features
//!
//! - **Cyclic**: The barrier trips once every `parties` arrivals and is reused automatically
//! - **Trip Action**: Exactly one thread per generation runs the action, before anyone is released
//! - **All-or-None Breakage**: A cancelled waiter or a failed action breaks the whole generation
//! - **Segmented Results**: Each worker owns one write-once slot, unwritten slots read as zero
//!
//! ## Usage Pattern
//!
//! ```rust,no_run
//! use cyclic_rendezvous::{RendezvousConfig, Rendezvous};
//!
//! // 10 tasks, barrier of 5 parties: the action runs twice
//! let config = RendezvousConfig { parties: 5, ..Default::default() };
//! let rendezvous = Rendezvous::new(config, 10, cyclic_rendezvous::Sum)?;
//!
//! let handles = rendezvous.spawn((0..10).map(|_| || 1u32))?;
//! for handle in handles {
//!     handle.join()?;
//! }
//!
//! let reports = rendezvous.reports();
//! assert_eq!(reports.len(), 2);
//! assert_eq!(reports[1].aggregate, 10);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Thread Safety
//!
//! - Each worker only writes its own slot (no contention)
//! - Barrier counters live behind a single mutex, and the action runs while it is held
//! - Writes made before `wait` are visible to the action of the same generation

#[cfg(test)]
mod tests;

pub mod aggregate;
pub mod barrier;
pub mod config;
pub mod error;
pub mod rendezvous;
pub mod store;
#[cfg(feature = "profiler")]
pub mod timer;
pub mod worker;

pub use aggregate::{AggregateAction, Aggregator, Sum, TripReport};
pub use barrier::{BarrierAction, BarrierState, CancelToken, CyclicBarrier, NoAction};
pub use config::RendezvousConfig;
pub use error::{
    ActionError, ActionPanicked, BarrierError, CancelReason, ConfigError, RendezvousError, StoreError,
    WorkerError,
};
pub use rendezvous::Rendezvous;
pub use store::{ResultStore, SlotWriter};
#[cfg(feature = "profiler")]
pub use timer::{Timer, TimingStats, WorkerTiming};
pub use worker::{RowSum, Task, Worker, WorkerHandle, WorkerOutcome};
