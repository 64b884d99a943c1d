use super::*;
use parking_lot::Mutex;
use rand::{Rng, thread_rng};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Polls `condition` until it holds, failing the test after a few seconds.
fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

fn spawn_waiters<A>(
    barrier: &Arc<CyclicBarrier<A>>,
    count: usize,
) -> Vec<thread::JoinHandle<Result<usize, BarrierError>>>
where
    A: BarrierAction + 'static,
{
    (0..count)
        .map(|_| {
            let barrier = Arc::clone(barrier);
            thread::spawn(move || barrier.wait())
        })
        .collect()
}

fn join_all<T>(handles: Vec<thread::JoinHandle<T>>) -> Vec<T> {
    handles
        .into_iter()
        .enumerate()
        .map(|(i, handle)| match handle.join() {
            Ok(result) => result,
            Err(e) => panic!("Thread {} panicked: {:?}", i, e),
        })
        .collect()
}

#[test]
fn test_zero_parties_rejected() {
    let err = CyclicBarrier::new(0).unwrap_err();
    assert!(matches!(
        err,
        BarrierError::InvalidConfiguration { parties: 0 }
    ));

    let config = RendezvousConfig {
        parties: 0,
        ..Default::default()
    };
    assert!(Rendezvous::<u32, Sum>::new(config, 4, Sum).is_err());
}

#[test]
fn test_basic_barrier_creation() {
    let barrier = CyclicBarrier::new(3).unwrap();
    assert_eq!(barrier.parties(), 3);
    assert_eq!(barrier.number_waiting(), 0);
    assert_eq!(barrier.generation(), 0);
    assert_eq!(barrier.state(), BarrierState::Filling);
    assert!(barrier.action().is_none());
}

#[test]
fn test_single_party_trips_on_every_wait() {
    let trips = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&trips);
    let barrier = CyclicBarrier::with_action(1, move || -> Result<(), ActionError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    for round in 0..3 {
        assert_eq!(barrier.wait().unwrap(), 0);
        assert_eq!(barrier.generation(), round + 1);
    }
    assert_eq!(trips.load(Ordering::SeqCst), 3);
}

#[test]
fn test_arrival_indices_and_trigger_runs_action() {
    const PARTIES: usize = 4;

    let trigger = Arc::new(Mutex::new(None));
    let recorded = Arc::clone(&trigger);
    let barrier = Arc::new(
        CyclicBarrier::with_action(PARTIES, move || -> Result<(), ActionError> {
            *recorded.lock() = Some(thread::current().id());
            Ok(())
        })
        .unwrap(),
    );

    let handles: Vec<_> = (0..PARTIES)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || (barrier.wait().unwrap(), thread::current().id()))
        })
        .collect();
    let results = join_all(handles);

    let mut indices: Vec<_> = results.iter().map(|(index, _)| *index).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..PARTIES).collect::<Vec<_>>());

    let (_, trigger_thread) = results
        .iter()
        .find(|(index, _)| *index == PARTIES - 1)
        .unwrap();
    assert_eq!(*trigger.lock(), Some(*trigger_thread));
}

#[test]
fn test_action_completes_before_release() {
    let done = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&done);
    let barrier = Arc::new(
        CyclicBarrier::with_action(3, move || -> Result<(), ActionError> {
            thread::sleep(Duration::from_millis(20));
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap(),
    );

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                barrier.wait().unwrap();
                done.load(Ordering::SeqCst)
            })
        })
        .collect();

    assert!(join_all(handles).into_iter().all(|seen| seen));
}

#[test]
fn test_multiple_rounds_run_action_once_per_generation() {
    const PARTIES: usize = 3;
    const NUM_ROUNDS: usize = 5;

    let trips = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&trips);
    let barrier = Arc::new(
        CyclicBarrier::with_action(PARTIES, move || -> Result<(), ActionError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap(),
    );

    let handles: Vec<_> = (0..PARTIES)
        .map(|thread_id| {
            let barrier = Arc::clone(&barrier);
            let trips = Arc::clone(&trips);
            thread::spawn(move || {
                for round in 0..NUM_ROUNDS {
                    barrier.wait().unwrap();
                    // The action of this round has already run for everyone we rendezvoused with.
                    assert!(
                        trips.load(Ordering::SeqCst) > round,
                        "Thread {} released before round {} tripped",
                        thread_id,
                        round
                    );
                    thread::sleep(Duration::from_millis(thread_id as u64));
                }
            })
        })
        .collect();
    join_all(handles);

    assert_eq!(trips.load(Ordering::SeqCst), NUM_ROUNDS);
    assert_eq!(barrier.generation(), NUM_ROUNDS as u64);
    assert_eq!(barrier.number_waiting(), 0);
}

#[test]
fn test_late_arrival_starts_fresh_generation() {
    let barrier = Arc::new(CyclicBarrier::new(2).unwrap());

    let results = join_all(spawn_waiters(&barrier, 2));
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(barrier.generation(), 1);

    // A lone arrival after the trip is not folded into the finished cycle.
    let late = spawn_waiters(&barrier, 1);
    wait_until(|| barrier.number_waiting() == 1);
    assert_eq!(barrier.generation(), 1);
    assert!(!late[0].is_finished());

    assert_eq!(barrier.wait().unwrap(), 1);
    assert_eq!(join_all(late)[0].as_ref().unwrap(), &0);
    assert_eq!(barrier.generation(), 2);
}

#[test]
fn test_action_failure_breaks_barrier() {
    let fail = Arc::new(AtomicBool::new(true));
    let should_fail = Arc::clone(&fail);
    let barrier = Arc::new(
        CyclicBarrier::with_action(3, move || -> Result<(), ActionError> {
            if should_fail.load(Ordering::SeqCst) {
                Err("aggregation failed".into())
            } else {
                Ok(())
            }
        })
        .unwrap(),
    );

    let results = join_all(spawn_waiters(&barrier, 3));
    let failures = results
        .iter()
        .filter(|r| matches!(r, Err(BarrierError::ActionFailure(_))))
        .count();
    let broken = results
        .iter()
        .filter(|r| matches!(r, Err(BarrierError::Broken)))
        .count();
    assert_eq!(failures, 1);
    assert_eq!(broken, 2);

    // Stays broken until reset.
    assert_eq!(barrier.state(), BarrierState::Broken);
    assert!(matches!(barrier.wait(), Err(BarrierError::Broken)));
    assert_eq!(barrier.number_waiting(), 0);

    fail.store(false, Ordering::SeqCst);
    barrier.reset();
    assert_eq!(barrier.state(), BarrierState::Filling);

    let results = join_all(spawn_waiters(&barrier, 3));
    assert!(results.iter().all(Result::is_ok));
}

#[test]
fn test_panicking_action_is_reported_as_failure() {
    let barrier = Arc::new(
        CyclicBarrier::with_action(2, || -> Result<(), ActionError> {
            panic!("store corrupted");
        })
        .unwrap(),
    );

    let results = join_all(spawn_waiters(&barrier, 2));
    let failure = results
        .iter()
        .find_map(|r| match r {
            Err(BarrierError::ActionFailure(source)) => Some(source),
            _ => None,
        })
        .expect("trigger should observe the action failure");

    let panicked = failure.downcast_ref::<ActionPanicked>().unwrap();
    assert_eq!(panicked.message, "store corrupted");
    assert!(results.iter().any(|r| matches!(r, Err(BarrierError::Broken))));
    assert!(barrier.is_broken());
}

#[test]
fn test_cancelled_waiter_breaks_generation() {
    let barrier = Arc::new(CyclicBarrier::new(3).unwrap());
    let token = barrier.cancel_token();

    let cancellable = {
        let barrier = Arc::clone(&barrier);
        let token = token.clone();
        thread::spawn(move || barrier.wait_cancellable(&token))
    };
    let plain = spawn_waiters(&barrier, 1);

    wait_until(|| barrier.number_waiting() == 2);
    token.cancel();

    assert!(matches!(
        cancellable.join().unwrap(),
        Err(BarrierError::Cancelled(CancelReason::Interrupted))
    ));
    assert!(matches!(join_all(plain)[0], Err(BarrierError::Broken)));
    assert_eq!(barrier.state(), BarrierState::Broken);

    barrier.reset();
    assert_eq!(barrier.state(), BarrierState::Filling);
    assert_eq!(barrier.number_waiting(), 0);
}

#[test]
fn test_cancelled_token_fails_on_entry() {
    let barrier = CyclicBarrier::new(2).unwrap();
    let token = barrier.cancel_token();
    token.cancel();
    assert!(token.is_cancelled());

    assert!(matches!(
        barrier.wait_cancellable(&token),
        Err(BarrierError::Cancelled(CancelReason::Interrupted))
    ));
    assert!(barrier.is_broken());
}

#[test]
#[should_panic(expected = "cancel token belongs to a different barrier")]
fn test_foreign_cancel_token_rejected() {
    let barrier = CyclicBarrier::new(1).unwrap();
    let other = CyclicBarrier::new(1).unwrap();
    let _ = barrier.wait_cancellable(&other.cancel_token());
}

#[test]
fn test_wait_timeout_breaks_barrier() {
    let barrier = Arc::new(CyclicBarrier::new(3).unwrap());
    let plain = spawn_waiters(&barrier, 1);
    wait_until(|| barrier.number_waiting() == 1);

    let started = Instant::now();
    let result = barrier.wait_timeout(Duration::from_millis(50));
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(matches!(
        result,
        Err(BarrierError::Cancelled(CancelReason::TimedOut))
    ));
    assert!(matches!(join_all(plain)[0], Err(BarrierError::Broken)));
    assert!(barrier.is_broken());
}

#[test]
fn test_wait_timeout_succeeds_when_barrier_trips() {
    let barrier = Arc::new(CyclicBarrier::new(2).unwrap());
    let plain = spawn_waiters(&barrier, 1);
    wait_until(|| barrier.number_waiting() == 1);

    assert_eq!(barrier.wait_timeout(Duration::from_secs(5)).unwrap(), 1);
    assert_eq!(join_all(plain)[0].as_ref().unwrap(), &0);
    assert!(!barrier.is_broken());
}

#[test]
fn test_reset_releases_waiters_as_broken() {
    let barrier = Arc::new(CyclicBarrier::new(3).unwrap());
    let waiters = spawn_waiters(&barrier, 2);
    wait_until(|| barrier.number_waiting() == 2);

    barrier.reset();

    let results = join_all(waiters);
    assert!(results.iter().all(|r| matches!(r, Err(BarrierError::Broken))));
    assert_eq!(barrier.generation(), 1);
    assert_eq!(barrier.number_waiting(), 0);
    assert_eq!(barrier.state(), BarrierState::Filling);

    // Usable again straight away.
    let results = join_all(spawn_waiters(&barrier, 3));
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(barrier.generation(), 2);
}

#[test]
fn test_break_advances_generation() {
    // Cancelled waiter.
    let barrier = CyclicBarrier::new(2).unwrap();
    let token = barrier.cancel_token();
    token.cancel();
    let before = barrier.generation();

    assert!(barrier.wait_cancellable(&token).is_err());
    assert_eq!(barrier.generation(), before + 1);
    assert_eq!(barrier.state(), BarrierState::Broken);
    assert!(matches!(barrier.wait(), Err(BarrierError::Broken)));
    assert_eq!(barrier.generation(), before + 1);

    barrier.reset();
    assert_eq!(barrier.generation(), before + 2);
    assert_eq!(barrier.state(), BarrierState::Filling);

    // Failing action.
    let barrier = Arc::new(
        CyclicBarrier::with_action(2, || -> Result<(), ActionError> {
            Err("aggregation failed".into())
        })
        .unwrap(),
    );
    let results = join_all(spawn_waiters(&barrier, 2));
    assert!(results.iter().any(|r| matches!(r, Err(BarrierError::ActionFailure(_)))));
    assert!(results.iter().any(|r| matches!(r, Err(BarrierError::Broken))));
    assert_eq!(barrier.generation(), 1);
    assert!(barrier.is_broken());

    barrier.reset();
    assert_eq!(barrier.generation(), 2);
    assert!(!barrier.is_broken());
}

#[test]
fn test_store_zero_fill() {
    let store = ResultStore::<u32>::new(4);
    assert_eq!(store.snapshot(), vec![0, 0, 0, 0]);

    store.build_slot_writer(0).write(5).unwrap();
    store.build_slot_writer(2).write(7).unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot, vec![5, 0, 7, 0]);
    assert_eq!(Sum.aggregate(&snapshot), 12);
    assert_eq!(store.written(), 2);
    assert_eq!(store.get(1), None);
    assert_eq!(store.get(2), Some(7));
    assert_eq!(store.get(9), None);
}

#[test]
fn test_store_slot_written_once() {
    let store = ResultStore::<u32>::new(2);
    store.build_slot_writer(1).write(3).unwrap();

    let err = store.build_slot_writer(1).write(4).unwrap_err();
    assert_eq!(err, StoreError::SlotAlreadyWritten { index: 1 });
    assert_eq!(store.get(1), Some(3));
}

#[test]
#[should_panic(expected = "Slot index 3 out of bounds")]
fn test_build_slot_writer_bounds_checking() {
    let store = ResultStore::<u32>::new(3);

    let _writer_0 = store.build_slot_writer(0);
    let _writer_2 = store.build_slot_writer(2);

    // This should panic
    let _writer_3 = store.build_slot_writer(3);
}

#[test]
fn test_aggregate_action_records_partial_trips() {
    let store = Arc::new(ResultStore::<u64>::new(3));
    let action = AggregateAction::new(Arc::clone(&store), Sum);

    store.build_slot_writer(0).write(4).unwrap();
    assert_eq!(action.invoke(), 4);

    store.build_slot_writer(1).write(6).unwrap();
    store.build_slot_writer(2).write(1).unwrap();
    assert_eq!(action.invoke(), 11);

    let reports = action.reports();
    assert_eq!(action.trips(), 2);
    assert_eq!(
        reports[0],
        TripReport {
            trip: 1,
            aggregate: 4,
            completed_slots: 1,
            total_slots: 3,
        }
    );
    assert!(reports[0].is_partial());
    assert!(!reports[1].is_partial());
}

/// Publishes slot 2 while the aggregate is being computed, the way a worker of the next group
/// can while the trigger is still inside the action.
struct LateWriter {
    store: Arc<ResultStore<u64>>,
}

impl Aggregator<u64> for LateWriter {
    type Aggregate = u64;

    fn aggregate(&self, slots: &[u64]) -> u64 {
        let _ = self.store.build_slot_writer(2).write(5);
        slots.iter().sum()
    }
}

#[test]
fn test_trip_report_counts_match_aggregate() {
    let store = Arc::new(ResultStore::<u64>::new(3));
    store.build_slot_writer(0).write(1).unwrap();
    store.build_slot_writer(1).write(1).unwrap();

    let action = AggregateAction::new(
        Arc::clone(&store),
        LateWriter {
            store: Arc::clone(&store),
        },
    );

    assert_eq!(action.invoke(), 2);
    assert_eq!(action.invoke(), 7);

    let reports = action.reports();
    assert_eq!(reports[0].aggregate, 2);
    assert_eq!(reports[0].completed_slots, 2);
    assert!(reports[0].is_partial());
    assert_eq!(reports[1].completed_slots, 3);
    assert!(!reports[1].is_partial());

    let (values, written) = store.snapshot_counted();
    assert_eq!(values, vec![1, 1, 5]);
    assert_eq!(written, 3);
}

#[test]
fn test_row_sum_task() {
    assert_eq!(RowSum::new(vec![1, 4, 6, 4, 1]).run(), 16);
    assert_eq!(RowSum::<u32>::new(vec![]).run(), 0);
}

#[test]
fn test_worker_rejects_second_write() {
    let store = Arc::new(ResultStore::<u32>::new(1));
    let barrier = Arc::new(CyclicBarrier::new(1).unwrap());

    let outcome = Worker::new(0, Arc::clone(&store), Arc::clone(&barrier))
        .run(|| 9)
        .unwrap();
    assert_eq!(
        outcome,
        WorkerOutcome {
            worker: 0,
            partial: 9,
            arrival: 0,
        }
    );

    let err = Worker::new(0, store, barrier).run(|| 10).unwrap_err();
    assert!(matches!(
        err,
        WorkerError::Store(StoreError::SlotAlreadyWritten { index: 0 })
    ));
}

#[test]
fn test_ten_ones_through_five_parties() {
    let config = RendezvousConfig {
        parties: 5,
        ..Default::default()
    };
    let rendezvous = Rendezvous::new(config, 10, Sum).unwrap();

    // Run the two groups one after the other so each trip sees exactly one group.
    let mut total = 0;
    for group in [0..5, 5..10] {
        let handles: Vec<_> = group
            .map(|i| {
                rendezvous
                    .worker(i)
                    .spawn(format!("ones-{}", i), || 1u32)
                    .unwrap()
            })
            .collect();
        for handle in handles {
            total += handle.join().unwrap().partial;
        }
    }

    let reports = rendezvous.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].aggregate, 5);
    assert_eq!(reports[0].completed_slots, 5);
    assert_eq!(reports[1].aggregate, 10);
    assert_eq!(reports[1].aggregate - reports[0].aggregate, 5);
    assert_eq!(total, 10);
    assert_eq!(rendezvous.barrier().generation(), 2);
}

#[test]
fn test_partial_group_blocks_until_reset() {
    let config = RendezvousConfig {
        parties: 3,
        ..Default::default()
    };
    let rendezvous = Rendezvous::new(config, 5, Sum).unwrap();

    let first: Vec<_> = (0..3)
        .map(|i| rendezvous.worker(i).spawn(format!("twos-{}", i), || 2u32).unwrap())
        .collect();
    for handle in first {
        handle.join().unwrap();
    }
    assert_eq!(
        rendezvous.reports(),
        vec![TripReport {
            trip: 1,
            aggregate: 6,
            completed_slots: 3,
            total_slots: 5,
        }]
    );

    let rest: Vec<_> = (3..5)
        .map(|i| rendezvous.worker(i).spawn(format!("twos-{}", i), || 2u32).unwrap())
        .collect();
    wait_until(|| rendezvous.barrier().number_waiting() == 2);
    thread::sleep(Duration::from_millis(20));
    assert!(rest.iter().all(|handle| !handle.is_finished()));

    rendezvous.barrier().reset();

    for handle in rest {
        let err = handle.join().unwrap_err();
        assert!(matches!(err.barrier_error(), Some(BarrierError::Broken)));
    }
    assert_eq!(rendezvous.reports().len(), 1);
    assert_eq!(rendezvous.store().written(), 5);
}

#[test]
fn test_rendezvous_validates_config() {
    let config = RendezvousConfig {
        parties: 2,
        thread_name_prefix: String::new(),
        ..Default::default()
    };
    assert!(matches!(
        Rendezvous::<u32, Sum>::new(config, 2, Sum),
        Err(RendezvousError::Config(ConfigError::EmptyThreadPrefix))
    ));
}

#[test]
fn test_spawn_rejects_more_tasks_than_slots() {
    let config = RendezvousConfig {
        parties: 2,
        ..Default::default()
    };
    let rendezvous = Rendezvous::new(config, 2, Sum).unwrap();

    let err = rendezvous
        .spawn((1..=3u32).map(|v| move || v))
        .unwrap_err();
    assert!(matches!(
        err,
        RendezvousError::TooManyTasks { tasks: 3, slots: 2 }
    ));

    // Nothing was started.
    assert_eq!(rendezvous.store().written(), 0);
    assert_eq!(rendezvous.barrier().number_waiting(), 0);

    let handles = rendezvous.spawn((1..=2u32).map(|v| move || v)).unwrap();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(rendezvous.reports()[0].aggregate, 3);
}

#[test]
fn test_floor_trips_when_tasks_not_multiple_of_parties() {
    const TASKS: usize = 7;
    const PARTIES: usize = 3;

    let config = RendezvousConfig {
        parties: PARTIES,
        thread_name_prefix: "mismatch".to_string(),
        ..Default::default()
    };
    let rendezvous = Rendezvous::new(config, TASKS, Sum).unwrap();
    let handles = rendezvous.spawn((0..TASKS).map(|i| move || i as u64)).unwrap();

    wait_until(|| {
        rendezvous.reports().len() == TASKS / PARTIES
            && rendezvous.barrier().number_waiting() == TASKS % PARTIES
    });
    rendezvous.barrier().reset();

    let results: Vec<_> = handles.into_iter().map(WorkerHandle::join).collect();
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let broken = results
        .iter()
        .filter(|r| matches!(r, Err(WorkerError::Barrier(BarrierError::Broken))))
        .count();

    assert_eq!(succeeded, (TASKS / PARTIES) * PARTIES);
    assert_eq!(broken, TASKS % PARTIES);
    assert_eq!(rendezvous.reports().len(), TASKS / PARTIES);
}

#[test]
fn test_pascal_rows_final_total() {
    let rows: Vec<Vec<u64>> = (0..10u64)
        .map(|n| {
            let mut row = vec![1u64];
            for k in 0..n {
                row.push(row[k as usize] * (n - k) / (k + 1));
            }
            row
        })
        .collect();
    assert_eq!(rows[4], vec![1, 4, 6, 4, 1]);

    let config = RendezvousConfig::default();
    let rendezvous = Rendezvous::new(config, rows.len(), Sum).unwrap();
    let handles = rendezvous.spawn(rows.into_iter().map(RowSum::new)).unwrap();

    let mut partials = vec![0; 10];
    for handle in handles {
        let outcome = handle.join().unwrap();
        partials[outcome.worker] = outcome.partial;
    }

    assert_eq!(partials, (0..10).map(|n| 1u64 << n).collect::<Vec<_>>());

    let reports = rendezvous.reports();
    assert_eq!(reports.len(), 2);
    assert!(reports[0].completed_slots >= 5);
    assert!(reports[0].aggregate <= 1023);
    assert_eq!(reports[1].aggregate, 1023);
    assert!(!reports[1].is_partial());
}

#[test]
fn test_worker_handle_cancel() {
    let config = RendezvousConfig {
        parties: 3,
        ..Default::default()
    };
    let rendezvous = Rendezvous::new(config, 2, Sum).unwrap();
    let handles = rendezvous.spawn((1..=2u32).map(|v| move || v)).unwrap();

    wait_until(|| rendezvous.barrier().number_waiting() == 2);
    handles[0].cancel();

    let mut handles = handles.into_iter();
    let cancelled = handles.next().unwrap().join().unwrap_err();
    let other = handles.next().unwrap().join().unwrap_err();

    assert!(matches!(
        cancelled.barrier_error(),
        Some(BarrierError::Cancelled(CancelReason::Interrupted))
    ));
    assert!(matches!(other.barrier_error(), Some(BarrierError::Broken)));
    assert_eq!(rendezvous.barrier().state(), BarrierState::Broken);
    assert!(rendezvous.reports().is_empty());
}

#[test]
fn test_configured_wait_timeout() {
    let config = RendezvousConfig {
        parties: 2,
        wait_timeout_ms: Some(30),
        ..Default::default()
    };
    let rendezvous = Rendezvous::new(config, 1, Sum).unwrap();
    let handle = rendezvous.spawn([|| 3u32]).unwrap().pop().unwrap();

    let err = handle.join().unwrap_err();
    assert!(matches!(
        err,
        WorkerError::Barrier(BarrierError::Cancelled(CancelReason::TimedOut))
    ));
    assert!(rendezvous.barrier().is_broken());
}

#[test]
fn test_panicking_task_is_reported() {
    let config = RendezvousConfig {
        parties: 1,
        ..Default::default()
    };
    let rendezvous = Rendezvous::new(config, 1, Sum).unwrap();
    let handle = rendezvous
        .spawn([|| -> u32 { panic!("row unreadable") }])
        .unwrap()
        .pop()
        .unwrap();

    match handle.join() {
        Err(WorkerError::Panicked { worker, message }) => {
            assert_eq!(worker, 0);
            assert_eq!(message, "row unreadable");
        }
        other => panic!("expected a panicked worker, got {:?}", other),
    }
    assert_eq!(rendezvous.store().written(), 0);
}

#[test]
fn test_random_workloads() {
    const TASKS: usize = 12;
    const PARTIES: usize = 4;

    let config = RendezvousConfig {
        parties: PARTIES,
        ..Default::default()
    };
    let rendezvous = Rendezvous::new(config, TASKS, Sum).unwrap();

    let mut rng = thread_rng();
    let tasks: Vec<_> = (0..TASKS)
        .map(|i| {
            let delay = Duration::from_millis(rng.gen_range(0..15));
            move || {
                thread::sleep(delay);
                (i as u64 + 1) * 10
            }
        })
        .collect();

    let start_time = Instant::now();
    let handles = rendezvous.spawn(tasks).unwrap();
    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    println!("Random workloads completed in {:?}", start_time.elapsed());

    let expected: u64 = (1..=TASKS as u64).map(|i| i * 10).sum();
    let reports = rendezvous.reports();
    assert_eq!(reports.len(), TASKS / PARTIES);
    assert_eq!(reports.last().unwrap().aggregate, expected);
    assert!(reports.windows(2).all(|w| w[0].aggregate <= w[1].aggregate));
    assert_eq!(
        outcomes.iter().filter(|o| o.arrival == PARTIES - 1).count(),
        TASKS / PARTIES
    );

    #[cfg(feature = "profiler")]
    {
        rendezvous.finalize();
        let time_stat = rendezvous.get_timing_stats();
        assert_eq!(time_stat.completed_workers(), TASKS);
        assert!((0..TASKS).all(|i| time_stat.worker_computation_time(i).is_some()));
        time_stat.plot();
    }
}
