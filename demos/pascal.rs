//! Sums the first ten rows of Pascal's triangle, one worker per row, through a 5-party barrier.
//!
//! The barrier trips after every five finished rows. On the first trip only some rows have been
//! summed, so the reported total is partial (unfinished rows count as zero). On the second trip
//! every row is in and the total is 1023.
//!
//! `RENDEZVOUS_PARTIES` changes the party count. If it does not divide the number of rows, the
//! last group never trips and the demo resets the barrier to release it.

use std::{error::Error, thread, time::Duration};

use cyclic_rendezvous::{Rendezvous, RendezvousConfig, RowSum, Sum, WorkerError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn pascal_rows(count: u64) -> Vec<Vec<u64>> {
    (0..count)
        .map(|n| {
            let mut row = vec![1u64];
            for k in 0..n {
                row.push(row[k as usize] * (n - k) / (k + 1));
            }
            row
        })
        .collect()
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_names(true)
        .init();

    let config = RendezvousConfig::from_env()?;
    let rows = pascal_rows(10);
    let tasks = rows.len();
    let parties = config.parties;

    for (index, row) in rows.iter().enumerate() {
        info!("row {}: {:?}", index, row);
    }

    let rendezvous = Rendezvous::new(config, tasks, Sum)?;
    let handles = rendezvous.spawn(rows.into_iter().map(RowSum::new))?;

    let stragglers = tasks % parties;
    if stragglers > 0 {
        let barrier = rendezvous.barrier();

        // A configured wait timeout can break the barrier before the stragglers line up.
        while !barrier.is_broken()
            && (rendezvous.reports().len() < tasks / parties
                || barrier.number_waiting() < stragglers)
        {
            thread::sleep(Duration::from_millis(5));
        }

        if barrier.is_broken() {
            warn!(stragglers, "barrier broke before the last group lined up");
        } else {
            warn!(stragglers, "last group can never trip, resetting barrier");
            barrier.reset();
        }
    }

    for handle in handles {
        let worker = handle.worker();
        match handle.join() {
            Ok(outcome) => info!(worker, arrival = outcome.arrival, "worker done"),
            Err(WorkerError::Barrier(error)) => warn!(worker, %error, "worker left the barrier"),
            Err(error) => return Err(error.into()),
        }
    }

    for report in rendezvous.reports() {
        println!(
            "trip {}: accumulated total {} ({} of {} rows{})",
            report.trip,
            report.aggregate,
            report.completed_slots,
            report.total_slots,
            if report.is_partial() { ", partial" } else { "" }
        );
    }

    #[cfg(feature = "profiler")]
    {
        rendezvous.finalize();
        rendezvous.get_timing_stats().plot();
    }

    Ok(())
}
