//! Ordering and single-timer properties over random operation sequences.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use proptest::prelude::*;

use mockfetch_core::prelude::*;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

async fn advance(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn completions(c: &MockFetchController) -> Arc<Mutex<Vec<RequestSnapshot>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    c.events().subscribe(EventKind::RequestCompleted, move |e| {
        sink.lock().push(e.request().clone())
    });
    log
}

fn assert_single_timer(c: &MockFetchController) {
    let earliest = c.requests().iter().filter_map(|r| r.expires_at).min();
    assert_eq!(c.armed_target(), earliest);
}

#[derive(Debug, Clone)]
enum Op {
    Fetch(u64),
    Pause(usize),
    Resume(usize),
    Advance(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..3_000).prop_map(Op::Fetch),
        (0usize..8).prop_map(Op::Pause),
        (0usize..8).prop_map(Op::Resume),
        (1u64..1_500).prop_map(Op::Advance),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn completions_follow_expiration_order(latencies in prop::collection::vec(20u64..4_000, 1..8)) {
        let rt = paused_runtime();
        rt.block_on(async {
            let c = MockFetchController::new(ControllerSettings::default()).unwrap();
            let log = completions(&c);
            let mut handles = Vec::new();
            for &latency in &latencies {
                c.set_latency(Duration::from_millis(latency));
                handles.push(c.fetch("/persons", RequestInit::get()));
            }

            let horizon = latencies.iter().max().copied().unwrap_or(0) + 20;
            let mut elapsed = 0;
            while elapsed < horizon {
                advance(7).await;
                elapsed += 7;
                assert_single_timer(&c);
            }

            let done = log.lock().clone();
            assert_eq!(done.len(), latencies.len());
            let expirations: Vec<u64> = done.iter().filter_map(|r| r.expires_at).collect();
            assert!(expirations.windows(2).all(|w| w[0] <= w[1]), "{expirations:?}");
            for handle in &mut handles {
                assert_eq!(handle.try_complete(), Some(Ok(())));
            }
        });
    }

    #[test]
    fn one_timer_tracks_earliest_running_request(ops in prop::collection::vec(op(), 1..40)) {
        let rt = paused_runtime();
        rt.block_on(async {
            let c = MockFetchController::new(ControllerSettings::default()).unwrap();
            let log = completions(&c);
            let mut ids = Vec::new();

            for op in ops {
                match op {
                    Op::Fetch(latency) => {
                        c.set_latency(Duration::from_millis(latency));
                        ids.push(c.fetch("/persons", RequestInit::get()).id());
                    }
                    Op::Pause(i) => {
                        if let Some(&id) = ids.get(i) {
                            let live = c.request(id).is_some();
                            assert_eq!(c.pause(id).is_ok(), live);
                        }
                    }
                    Op::Resume(i) => {
                        if let Some(&id) = ids.get(i) {
                            match c.request(id) {
                                Some(r) if r.is_paused() => c.resume(id).unwrap(),
                                Some(_) => assert_eq!(
                                    c.resume(id),
                                    Err(ControllerError::InvalidResumeState(id))
                                ),
                                None => assert!(c.resume(id).is_err()),
                            }
                        }
                    }
                    Op::Advance(ms) => advance(ms).await,
                }
                assert_single_timer(&c);
            }

            let done = log.lock();
            let mut seen: Vec<RequestId> = done.iter().map(|r| r.id).collect();
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), done.len(), "a request completed twice");
        });
    }

    #[test]
    fn pausing_never_changes_running_time(
        latency in 100u64..5_000,
        run_before in 1u64..5_000,
        paused_for in 0u64..20_000,
    ) {
        let run_before = run_before.min(latency - 20);
        let rt = paused_runtime();
        rt.block_on(async {
            let c = MockFetchController::new(ControllerSettings::with_latency(
                Duration::from_millis(latency),
            ))
            .unwrap();
            let mut handle = c.fetch("/persons", RequestInit::get());
            let id = handle.id();

            advance(run_before).await;
            c.pause(id).unwrap();
            advance(paused_for).await;
            assert!(handle.try_complete().is_none());

            c.resume(id).unwrap();
            let resumed_at = c.now_ms();
            assert_eq!(
                c.request(id).unwrap().expires_at,
                Some(resumed_at + latency - run_before)
            );

            advance(latency - run_before + 1).await;
            assert_eq!(handle.try_complete(), Some(Ok(())));
        });
    }
}
