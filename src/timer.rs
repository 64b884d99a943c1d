use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Durations recorded for one worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerTiming {
    /// Time spent running the task.
    pub computation: Option<Duration>,
    /// Time spent blocked at the barrier, including the action when this worker triggered it.
    pub wait: Option<Duration>,
}

/// Collects per-worker timings for one rendezvous run.
#[derive(Debug)]
pub struct Timer {
    /// Rendezvous initialization timestamp.
    init_timestamp: Instant,

    /// Set by [`finalize`](Self::finalize).
    completion_timestamp: Mutex<Option<Instant>>,

    /// One entry per worker. Each worker only ever touches its own entry.
    workers: Mutex<Vec<WorkerTiming>>,
}

impl Timer {
    /// Create a new Timer with the current time as the initialization timestamp.
    #[inline]
    pub fn new(num_workers: usize) -> Self {
        Self {
            init_timestamp: Instant::now(),
            completion_timestamp: Mutex::new(None),
            workers: Mutex::new(vec![WorkerTiming::default(); num_workers]),
        }
    }

    #[inline]
    pub fn record_computation(&self, worker: usize, duration: Duration) {
        let mut workers = self.workers.lock();
        assert!(worker < workers.len(), "Worker ID out of bounds");
        workers[worker].computation = Some(duration);
    }

    #[inline]
    pub fn record_wait(&self, worker: usize, duration: Duration) {
        let mut workers = self.workers.lock();
        assert!(worker < workers.len(), "Worker ID out of bounds");
        workers[worker].wait = Some(duration);
    }

    /// Records the completion timestamp. Call after every worker has been joined.
    #[inline]
    pub fn finalize(&self) {
        *self.completion_timestamp.lock() = Some(Instant::now());
    }

    /// Get timing statistics for analysis and plotting.
    pub fn get_timing_stats(&self) -> TimingStats {
        let completion_timestamp = *self.completion_timestamp.lock();

        TimingStats {
            init_timestamp: self.init_timestamp,
            completion_timestamp: completion_timestamp.unwrap_or_else(Instant::now),
            per_worker: self.workers.lock().clone(),
        }
    }
}

/// Snapshot of a [`Timer`].
#[derive(Debug, Clone)]
pub struct TimingStats {
    pub init_timestamp: Instant,
    pub completion_timestamp: Instant,
    /// Indexed by worker ID.
    pub per_worker: Vec<WorkerTiming>,
}

impl TimingStats {
    #[inline]
    pub fn total_runtime(&self) -> Duration {
        self.completion_timestamp
            .duration_since(self.init_timestamp)
    }

    #[inline]
    pub fn worker_computation_time(&self, worker: usize) -> Option<Duration> {
        self.per_worker.get(worker)?.computation
    }

    #[inline]
    pub fn worker_wait_time(&self, worker: usize) -> Option<Duration> {
        self.per_worker.get(worker)?.wait
    }

    /// Number of workers that finished waiting at the barrier, successfully or not.
    pub fn completed_workers(&self) -> usize {
        self.per_worker
            .iter()
            .filter(|timing| timing.wait.is_some())
            .count()
    }

    /// Prints a table with one row per worker.
    ///
    /// Columns are computation time, barrier wait time (both in milliseconds with microsecond
    /// precision) and computation time as a percentage of the total runtime. Workers that never
    /// got past the barrier show `—` in the wait column.
    pub fn plot(&self) {
        if self.per_worker.is_empty() {
            println!("No timing data available to plot.");
            return;
        }

        let total_runtime = self.total_runtime();

        println!("\n📊 WORKER TIME TABLE");
        println!("Time format: milliseconds (ms) with microsecond precision");
        println!("Total Runtime: {:.3} ms", duration_to_ms(total_runtime));
        println!("{}", "=".repeat(52));

        println!(
            "{:<12} {:<12} {:<12} {:<12}",
            "Worker", "Comp", "Wait", "Comp Ratio%"
        );
        println!("{}", "-".repeat(52));

        for (worker, timing) in self.per_worker.iter().enumerate() {
            print!("{:<12}", worker);
            print_ms(timing.computation);
            print_ms(timing.wait);

            match timing.computation {
                Some(comp) if total_runtime.as_nanos() > 0 => {
                    let ratio = comp.as_nanos() as f64 / total_runtime.as_nanos() as f64;
                    print!(" {:<12.1}", ratio * 100.0);
                }
                Some(_) => print!(" {:<12}", "0.0"),
                None => print!(" {:<12}", "—"),
            }
            println!();
        }

        println!("{}", "=".repeat(52));
        println!("\nLegend:");
        println!("  • Comp: time spent running the task (ms)");
        println!("  • Wait: time blocked at the barrier (ms)");
        println!("  • —: worker never recorded this phase");
    }
}

fn print_ms(duration: Option<Duration>) {
    match duration {
        Some(duration) => print!(" {:<12.3}", duration_to_ms(duration)),
        None => print!(" {:<12}", "—"),
    }
}

/// Convert Duration to milliseconds as f64
#[inline]
fn duration_to_ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}
