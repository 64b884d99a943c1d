//! The cyclic rendezvous barrier.
//!
//! A [`CyclicBarrier`] lets a fixed number of parties meet at a common point over and over. The
//! last party to arrive (the *trigger*) runs the optional [`BarrierAction`] while still holding
//! the barrier lock, then opens a new generation and releases everyone who was waiting.
//!
//! ## Breakage
//!
//! The barrier follows an all-or-none model. If a waiter is cancelled, times out, or the action
//! fails, the whole generation is broken:
//!
//! - the thread that caused it gets [`BarrierError::Cancelled`] or [`BarrierError::ActionFailure`]
//! - every other waiter of that generation gets [`BarrierError::Broken`]
//! - later arrivals get [`BarrierError::Broken`] until [`CyclicBarrier::reset`] is called
//!
//! A break advances the generation just like a trip does, but the new generation is born broken.
//!
//! ## Memory ordering
//!
//! Everything a thread does before calling `wait` happens-before the action of that generation,
//! which in turn happens-before every successful return from `wait` in that generation.

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{ActionError, ActionPanicked, BarrierError, CancelReason};

/// Callback run by the trigger once per trip, before any waiter is released.
///
/// The action runs with the barrier lock held, so it must not call back into the same barrier.
/// Returning an error, or panicking, breaks the barrier.
pub trait BarrierAction: Send + Sync {
    fn run(&self) -> Result<(), ActionError>;
}

impl<F> BarrierAction for F
where
    F: Fn() -> Result<(), ActionError> + Send + Sync,
{
    #[inline]
    fn run(&self) -> Result<(), ActionError> {
        self()
    }
}

/// Action type of a barrier built without an action.
pub type NoAction = fn() -> Result<(), ActionError>;

/// Observable state of a barrier.
///
/// The transient tripping state only exists while the trigger holds the lock and is therefore
/// never reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierState {
    Filling,
    Broken,
}

/// One barrier cycle. Waiters keep their own handle so they can still tell whether *their*
/// generation broke after the barrier has moved on.
#[derive(Debug)]
struct Generation {
    id: u64,
    broken: AtomicBool,
}

impl Generation {
    fn new(id: u64) -> Self {
        Self {
            id,
            broken: AtomicBool::new(false),
        }
    }

    /// A generation that starts out broken, installed when the previous one breaks.
    fn broken(id: u64) -> Self {
        Self {
            id,
            broken: AtomicBool::new(true),
        }
    }

    // Only mutated with the cycle lock held.
    #[inline]
    fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct Cycle {
    generation: Arc<Generation>,
    /// Arrivals registered in the current generation, in `0..parties`.
    waiting: usize,
}

#[derive(Debug)]
struct Shared {
    cycle: Mutex<Cycle>,
    trip: Condvar,
}

/// A reusable barrier for a fixed number of parties.
///
/// ## Usage
///
/// ```rust,no_run
/// use cyclic_rendezvous::{ActionError, CyclicBarrier};
/// use std::sync::Arc;
/// use std::thread;
///
/// let barrier = Arc::new(CyclicBarrier::with_action(3, || -> Result<(), ActionError> {
///     println!("all three arrived");
///     Ok(())
/// })?);
///
/// let handles: Vec<_> = (0..3)
///     .map(|_| {
///         let barrier = Arc::clone(&barrier);
///         thread::spawn(move || barrier.wait())
///     })
///     .collect();
///
/// for handle in handles {
///     let arrival = handle.join().unwrap()?;
///     assert!(arrival < 3);
/// }
/// # Ok::<(), cyclic_rendezvous::BarrierError>(())
/// ```
pub struct CyclicBarrier<A = NoAction> {
    shared: Arc<Shared>,
    parties: usize,
    action: Option<A>,
}

impl CyclicBarrier<NoAction> {
    /// Creates a barrier without an action.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::InvalidConfiguration`] if `parties` is 0.
    #[inline]
    pub fn new(parties: usize) -> Result<Self, BarrierError> {
        Self::build(parties, None)
    }
}

impl<A> CyclicBarrier<A>
where
    A: BarrierAction,
{
    /// Creates a barrier whose `action` is run by the trigger of every trip.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::InvalidConfiguration`] if `parties` is 0.
    #[inline]
    pub fn with_action(parties: usize, action: A) -> Result<Self, BarrierError> {
        Self::build(parties, Some(action))
    }

    fn build(parties: usize, action: Option<A>) -> Result<Self, BarrierError> {
        if parties == 0 {
            return Err(BarrierError::InvalidConfiguration { parties });
        }

        Ok(Self {
            shared: Arc::new(Shared {
                cycle: Mutex::new(Cycle {
                    generation: Arc::new(Generation::new(0)),
                    waiting: 0,
                }),
                trip: Condvar::new(),
            }),
            parties,
            action,
        })
    }

    /// Number of arrivals needed to trip the barrier.
    #[inline]
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Number of parties currently blocked in the active generation.
    #[inline]
    pub fn number_waiting(&self) -> usize {
        self.shared.cycle.lock().waiting
    }

    /// Identifier of the active generation. Advances on every trip, every break and every reset.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.shared.cycle.lock().generation.id
    }

    #[inline]
    pub fn is_broken(&self) -> bool {
        self.shared.cycle.lock().generation.is_broken()
    }

    pub fn state(&self) -> BarrierState {
        if self.is_broken() {
            BarrierState::Broken
        } else {
            BarrierState::Filling
        }
    }

    /// The action injected at construction, if any.
    #[inline]
    pub fn action(&self) -> Option<&A> {
        self.action.as_ref()
    }

    /// Mints a token that can interrupt a [`wait_cancellable`](Self::wait_cancellable) call on
    /// this barrier from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            shared: Arc::clone(&self.shared),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Waits until all parties have arrived.
    ///
    /// Returns the caller's arrival index within its generation: `0` for the first arrival,
    /// `parties() - 1` for the trigger.
    ///
    /// # Errors
    ///
    /// - [`BarrierError::Broken`] if the barrier is broken on entry, or breaks while waiting
    /// - [`BarrierError::ActionFailure`] if the caller is the trigger and the action failed
    #[inline]
    pub fn wait(&self) -> Result<usize, BarrierError> {
        self.do_wait(None, None)
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`.
    ///
    /// A waiter whose timeout elapses breaks the barrier and gets
    /// `BarrierError::Cancelled(CancelReason::TimedOut)`; its co-waiters get `Broken`.
    #[inline]
    pub fn wait_timeout(&self, timeout: Duration) -> Result<usize, BarrierError> {
        self.do_wait(Instant::now().checked_add(timeout), None)
    }

    /// Like [`wait`](Self::wait), but can be interrupted through `token`.
    ///
    /// An interrupted waiter breaks the barrier and gets
    /// `BarrierError::Cancelled(CancelReason::Interrupted)`. A token that is already cancelled
    /// breaks the barrier on entry.
    ///
    /// # Panics
    ///
    /// Panics if `token` was minted by a different barrier.
    #[inline]
    pub fn wait_cancellable(&self, token: &CancelToken) -> Result<usize, BarrierError> {
        self.wait_with(None, Some(token))
    }

    /// Combined form of the `wait*` methods, used by workers that carry both a timeout and a
    /// cancel token.
    pub(crate) fn wait_with(
        &self,
        timeout: Option<Duration>,
        token: Option<&CancelToken>,
    ) -> Result<usize, BarrierError> {
        if let Some(token) = token {
            assert!(
                Arc::ptr_eq(&self.shared, &token.shared),
                "cancel token belongs to a different barrier"
            );
        }

        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        self.do_wait(deadline, token)
    }

    /// Forces the barrier back into a fresh generation.
    ///
    /// Parties blocked in the abandoned generation return [`BarrierError::Broken`].
    pub fn reset(&self) {
        let mut cycle = self.shared.cycle.lock();

        if cycle.waiting > 0 {
            warn!(
                generation = cycle.generation.id,
                waiting = cycle.waiting,
                "resetting barrier, abandoning waiters"
            );
        }

        cycle.generation.broken.store(true, Ordering::Relaxed);
        self.next_generation(&mut cycle);
    }

    fn do_wait(
        &self,
        deadline: Option<Instant>,
        token: Option<&CancelToken>,
    ) -> Result<usize, BarrierError> {
        let mut cycle = self.shared.cycle.lock();
        let generation = Arc::clone(&cycle.generation);

        if generation.is_broken() {
            return Err(BarrierError::Broken);
        }

        if token.is_some_and(CancelToken::is_cancelled) {
            self.break_barrier(&mut cycle, CancelReason::Interrupted);
            return Err(BarrierError::Cancelled(CancelReason::Interrupted));
        }

        let index = cycle.waiting;
        cycle.waiting += 1;
        debug!(
            generation = generation.id,
            index,
            parties = self.parties,
            "arrived at barrier"
        );

        if cycle.waiting == self.parties {
            if let Some(action) = &self.action {
                if let Err(source) = run_action(action) {
                    warn!(generation = generation.id, error = %source, "barrier action failed");
                    self.break_generation(&mut cycle);
                    return Err(BarrierError::ActionFailure(source));
                }
            }

            self.next_generation(&mut cycle);
            return Ok(index);
        }

        loop {
            let timed_out = match deadline {
                Some(deadline) => self.shared.trip.wait_until(&mut cycle, deadline).timed_out(),
                None => {
                    self.shared.trip.wait(&mut cycle);
                    false
                }
            };

            if generation.is_broken() {
                return Err(BarrierError::Broken);
            }

            if generation.id != cycle.generation.id {
                return Ok(index);
            }

            if token.is_some_and(CancelToken::is_cancelled) {
                self.break_barrier(&mut cycle, CancelReason::Interrupted);
                return Err(BarrierError::Cancelled(CancelReason::Interrupted));
            }

            if timed_out {
                self.break_barrier(&mut cycle, CancelReason::TimedOut);
                return Err(BarrierError::Cancelled(CancelReason::TimedOut));
            }
        }
    }

    fn break_barrier(&self, cycle: &mut Cycle, reason: CancelReason) {
        warn!(
            generation = cycle.generation.id,
            waiting = cycle.waiting,
            %reason,
            "barrier broken by cancelled waiter"
        );

        self.break_generation(cycle);
    }

    /// Marks the active generation broken, wakes everyone parked in it and moves on to a
    /// generation that stays broken until [`reset`](Self::reset).
    fn break_generation(&self, cycle: &mut Cycle) {
        cycle.generation.broken.store(true, Ordering::Relaxed);
        let id = cycle.generation.id.wrapping_add(1);
        cycle.generation = Arc::new(Generation::broken(id));
        cycle.waiting = 0;
        self.shared.trip.notify_all();
    }

    fn next_generation(&self, cycle: &mut Cycle) {
        let id = cycle.generation.id.wrapping_add(1);
        cycle.generation = Arc::new(Generation::new(id));
        cycle.waiting = 0;
        self.shared.trip.notify_all();
    }
}

impl<A> fmt::Debug for CyclicBarrier<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CyclicBarrier")
            .field("parties", &self.parties)
            .field("has_action", &self.action.is_some())
            .finish_non_exhaustive()
    }
}

fn run_action<A: BarrierAction>(action: &A) -> Result<(), ActionError> {
    match panic::catch_unwind(AssertUnwindSafe(|| action.run())) {
        Ok(result) => result,
        Err(payload) => Err(Box::new(ActionPanicked::from_payload(payload.as_ref()))),
    }
}

/// Interrupts a party blocked in [`CyclicBarrier::wait_cancellable`].
///
/// Tokens are one-shot: once cancelled, every later `wait_cancellable` with the same token
/// fails on entry.
#[derive(Debug, Clone)]
pub struct CancelToken {
    shared: Arc<Shared>,
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);

        // Notify under the lock so a waiter between its check and its park cannot miss it.
        let _cycle = self.shared.cycle.lock();
        self.shared.trip.notify_all();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
