//! Probe-path latency benchmark.
//!
//! Every operation measured here runs synchronously inside an application
//! probe, so its latency is paid by the traced process. The budget is
//! sub-microsecond per call; anything slower shows up as observer effect
//! in the instrumented application.
//!
//! ```bash
//! cargo bench --bench probe_overhead
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use linaje::config::EngineConfig;
use linaje::context::{CreationToken, TaskId, ThreadId};
use linaje::engine::CorrelationEngine;
use linaje::extract::FieldSet;
use linaje::scheduler::TransitionEvent;

fn setup() -> CorrelationEngine {
    let engine = CorrelationEngine::new(EngineConfig::default()).unwrap();
    engine.observe_transition(&TransitionEvent {
        task: TaskId(1),
        previous_status: 1,
        new_status: 2,
        creation_token: CreationToken::NONE,
        os_thread: ThreadId(100),
    });
    engine
}

fn bench_observe_transition(c: &mut Criterion) {
    let engine = setup();
    let ev = TransitionEvent {
        task: TaskId(2),
        previous_status: 1,
        new_status: 2,
        creation_token: CreationToken::NONE,
        os_thread: ThreadId(101),
    };
    c.bench_function("observe_transition_running", |b| {
        b.iter(|| engine.observe_transition(black_box(&ev)));
    });
}

fn bench_current_task(c: &mut Criterion) {
    let engine = setup();
    c.bench_function("current_task_lookup", |b| {
        b.iter(|| black_box(engine.current_task_on(ThreadId(100))));
    });
}

fn bench_begin_end_span(c: &mut Criterion) {
    let engine = setup();
    let mut key = 0u64;
    c.bench_function("begin_end_span_pair", |b| {
        b.iter(|| {
            key = key.wrapping_add(1).max(1);
            engine.begin_span_on(ThreadId(100), key, FieldSet::empty());
            black_box(engine.end_span(key));
            // Keep the record channel from filling and skewing the numbers.
            while engine.pop_record().is_some() {}
        });
    });
}

fn bench_ancestor_walk(c: &mut Criterion) {
    let engine = setup();
    // Build a 15-deep chain under task 1 so the walk does real hops.
    for i in 0..15u64 {
        let creator_thread = 100 + i;
        let child = 10 + i;
        engine.observe_transition(&TransitionEvent {
            task: TaskId(child),
            previous_status: 0,
            new_status: 1,
            creation_token: CreationToken(1000 + i),
            os_thread: ThreadId(creator_thread),
        });
        engine.observe_transition(&TransitionEvent {
            task: TaskId(child),
            previous_status: 1,
            new_status: 2,
            creation_token: CreationToken(1000 + i),
            os_thread: ThreadId(creator_thread + 1),
        });
    }
    c.bench_function("nearest_ancestor_walk_deep", |b| {
        b.iter(|| black_box(engine.nearest_ancestor_context(TaskId(24))));
    });
}

criterion_group!(
    benches,
    bench_observe_transition,
    bench_current_task,
    bench_begin_end_span,
    bench_ancestor_walk
);
criterion_main!(benches);
