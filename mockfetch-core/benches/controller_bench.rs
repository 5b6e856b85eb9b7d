#[macro_use]
extern crate criterion;

use std::time::Duration;

use criterion::{black_box, Criterion};

use mockfetch_core::prelude::*;

fn bench_fetch_and_pause(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let _guard = rt.enter();

    let mut group = c.benchmark_group("controller_rearm");
    for in_flight in [8, 64, 512] {
        group.throughput(criterion::Throughput::Elements(in_flight as u64));
        group.bench_function(format!("in_flight_{}", in_flight), |b| {
            b.iter(|| {
                let controller = MockFetchController::new(ControllerSettings::with_latency(
                    Duration::from_secs(60),
                ))
                .unwrap();
                let handles: Vec<_> = (0..in_flight)
                    .map(|i| {
                        controller.set_latency(Duration::from_millis(60_000 - i as u64));
                        controller.fetch("/persons", RequestInit::get())
                    })
                    .collect();
                for handle in &handles {
                    controller.pause(handle.id()).unwrap();
                }
                black_box(controller.armed_target());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fetch_and_pause);
criterion_main!(benches);
