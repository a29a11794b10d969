use common::SagaId;
use criterion::{Criterion, criterion_group, criterion_main};
use event_log::{EventLog, EventLogStore, InMemoryEventLogStore, StepState};
use tokio_util::sync::CancellationToken;

fn make_record(saga_id: SagaId, step: &str, state: StepState) -> EventLog {
    EventLog::new(saga_id, step, state, serde_json::json!({"amount": 10}))
}

fn bench_save_single_record(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_log/save_single_record", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventLogStore::new();
                let cancel = CancellationToken::new();
                let record = make_record(SagaId::new(), "_init", StepState::Done);
                store.save_event_log(&cancel, &record).await.unwrap();
            });
        });
    });
}

fn bench_save_saga_trace(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    // The 6-record trace of a 2-step happy-path saga.
    c.bench_function("event_log/save_happy_path_trace", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventLogStore::new();
                let cancel = CancellationToken::new();
                let saga_id = SagaId::new();

                let trace = [
                    ("_init", StepState::Done),
                    ("debit", StepState::Running),
                    ("debit", StepState::Done),
                    ("credit", StepState::Running),
                    ("credit", StepState::Done),
                    ("_finish", StepState::Done),
                ];
                for (step, state) in trace {
                    let record = make_record(saga_id, step, state);
                    store.save_event_log(&cancel, &record).await.unwrap();
                }
            });
        });
    });
}

fn bench_load_event_logs(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventLogStore::new();
    let cancel = CancellationToken::new();
    let saga_id = SagaId::new();

    // Pre-populate: 100 records for the target saga among 10 other sagas.
    rt.block_on(async {
        for _ in 0..10 {
            let other = SagaId::new();
            for _ in 0..100 {
                let record = make_record(other, "step", StepState::Running);
                store.save_event_log(&cancel, &record).await.unwrap();
            }
        }
        for _ in 0..100 {
            let record = make_record(saga_id, "step", StepState::Running);
            store.save_event_log(&cancel, &record).await.unwrap();
        }
    });

    c.bench_function("event_log/load_100_records", |b| {
        b.iter(|| {
            rt.block_on(async {
                let records = store.load_event_logs(&cancel, saga_id).await.unwrap();
                assert_eq!(records.len(), 100);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_save_single_record,
    bench_save_saga_trace,
    bench_load_event_logs,
);
criterion_main!(benches);
