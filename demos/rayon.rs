use rayon::prelude::*;
use std::sync::Arc;
use cyclic_rendezvous::{AggregateAction, CyclicBarrier, ResultStore, Sum, Worker};

// Simple iterative Fibonacci calculation
fn fibonacci(n: u64) -> u64 {
    if n <= 1 {
        return n;
    }

    let mut a = 0;
    let mut b = 1;

    for _ in 2..=n {
        let temp = a + b;
        a = b;
        b = temp;
    }

    b
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    println!("🚀 Fibonacci with Rayon + CyclicBarrier Integration");
    println!("===================================================\n");

    // Configuration
    const NUM_WORKERS: usize = 8;
    const PARTIES: usize = 4;
    const FIBONACCI_INPUTS: [u64; NUM_WORKERS] = [35, 36, 37, 38, 39, 40, 41, 42];

    // Every worker blocks at the barrier, so the pool needs one thread per worker.
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(NUM_WORKERS)
        .thread_name(|index| format!("rayon-worker-{}", index))
        .build()?;

    let store = Arc::new(ResultStore::<u64>::new(NUM_WORKERS));
    let action = AggregateAction::new(Arc::clone(&store), Sum);
    let barrier = Arc::new(CyclicBarrier::with_action(PARTIES, action)?);

    println!("📊 Configuration:");
    println!("  Workers: {}", NUM_WORKERS);
    println!("  Parties: {}", PARTIES);
    println!("  Fibonacci inputs: {:?}\n", FIBONACCI_INPUTS);

    let start_time = std::time::Instant::now();

    // Use Rayon's parallel iterator interface
    let outcomes = pool.install(|| {
        (0..NUM_WORKERS)
            .into_par_iter()
            .with_max_len(1)
            .map(|worker| {
                let input = FIBONACCI_INPUTS[worker];
                Worker::new(worker, Arc::clone(&store), Arc::clone(&barrier))
                    .run(move || fibonacci(input))
            })
            .collect::<Result<Vec<_>, _>>()
    })?;

    let total_duration = start_time.elapsed();

    println!("\n📈 Results Summary:");
    println!("==================");

    for outcome in &outcomes {
        println!(
            "Worker {}: fib({}) = {} (arrival {})",
            outcome.worker, FIBONACCI_INPUTS[outcome.worker], outcome.partial, outcome.arrival
        );
    }

    if let Some(action) = barrier.action() {
        for report in action.reports() {
            println!(
                "Trip {}: total {} from {} of {} workers",
                report.trip, report.aggregate, report.completed_slots, report.total_slots
            );
        }
    }

    println!("⏱️  Total execution time: {:?}", total_duration);
    println!("\n✅ Rayon + CyclicBarrier integration completed successfully!");

    Ok(())
}
