use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flowkeep_checkpoint::{Checkpoint, CheckpointSaver, InMemoryCheckpointSaver, NextStep};
use serde_json::{json, Map};

fn sample_state() -> Map<String, serde_json::Value> {
    let mut values = Map::new();
    values.insert("topic".to_string(), json!("campus housing"));
    values.insert("evaluator_feedback".to_string(), json!(["tighten intro", "cite source"]));
    values.insert("iteration_count".to_string(), json!(2));
    values
}

fn checkpoint_append_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkpoint append", |b| {
        b.to_async(&runtime).iter(|| async {
            let saver = InMemoryCheckpointSaver::new();
            let checkpoint = Checkpoint::new("bench-thread", 0, sample_state(), NextStep::End);

            saver.append(black_box(&checkpoint)).await.unwrap();
        });
    });
}

fn checkpoint_latest_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let saver = InMemoryCheckpointSaver::new();
    runtime.block_on(async {
        for step in 0..100 {
            let checkpoint =
                Checkpoint::new("bench-thread", step, sample_state(), NextStep::node("draft"));
            saver.append(&checkpoint).await.unwrap();
        }
    });

    c.bench_function("checkpoint latest", |b| {
        b.to_async(&runtime).iter(|| async {
            saver.latest(black_box("bench-thread")).await.unwrap();
        });
    });
}

criterion_group!(benches, checkpoint_append_benchmark, checkpoint_latest_benchmark);
criterion_main!(benches);
