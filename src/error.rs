use std::{any::Any, fmt};

use thiserror::Error;

/// Failure raised by a barrier action.
///
/// Boxed so actions can surface whatever error type their own work produces.
pub type ActionError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a waiter gave up on the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The waiter's [`CancelToken`](crate::CancelToken) was cancelled.
    Interrupted,
    /// The waiter's timeout elapsed before the barrier tripped.
    TimedOut,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => write!(f, "interrupted"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Errors surfaced by [`CyclicBarrier`](crate::CyclicBarrier).
///
/// `Cancelled` and `ActionFailure` are only ever returned to the thread that caused the
/// breakage. Every other waiter of the same generation observes `Broken`.
#[derive(Debug, Error)]
pub enum BarrierError {
    #[error("a barrier needs at least one party, got {parties}")]
    InvalidConfiguration { parties: usize },

    #[error("barrier is broken")]
    Broken,

    #[error("barrier wait {0}")]
    Cancelled(CancelReason),

    #[error("barrier action failed: {0}")]
    ActionFailure(#[source] ActionError),
}

impl BarrierError {
    /// True for the error every co-waiter sees once a generation has broken.
    #[inline]
    pub fn is_broken(&self) -> bool {
        matches!(self, Self::Broken)
    }
}

/// A barrier action panicked instead of returning an error.
#[derive(Debug, Error)]
#[error("barrier action panicked: {message}")]
pub struct ActionPanicked {
    pub message: String,
}

impl ActionPanicked {
    pub(crate) fn from_payload(payload: &(dyn Any + Send)) -> Self {
        Self {
            message: panic_message(payload),
        }
    }
}

/// Errors raised by [`ResultStore`](crate::ResultStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("slot {index} has already been written")]
    SlotAlreadyWritten { index: usize },
}

/// Everything that can end a worker thread abnormally.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Barrier(#[from] BarrierError),

    #[error("worker {worker} panicked: {message}")]
    Panicked { worker: usize, message: String },
}

impl WorkerError {
    /// The barrier failure behind this error, if that is what ended the worker.
    #[inline]
    pub fn barrier_error(&self) -> Option<&BarrierError> {
        match self {
            Self::Barrier(error) => Some(error),
            _ => None,
        }
    }
}

/// Errors raised while loading or validating a [`RendezvousConfig`](crate::RendezvousConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parties must be at least 1")]
    InvalidParties,

    #[error("thread name prefix must not be empty")]
    EmptyThreadPrefix,

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors raised while setting up a [`Rendezvous`](crate::Rendezvous) or launching its workers.
#[derive(Debug, Error)]
pub enum RendezvousError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Barrier(#[from] BarrierError),

    #[error("{tasks} tasks submitted but the store only holds {slots} slots")]
    TooManyTasks { tasks: usize, slots: usize },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
