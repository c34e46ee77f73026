//! Benchmarks comparing the eager and prepared-session inference paths.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use conforma::artifact::Artifact;
use conforma::model::{ModelWeights, ScoringModel};
use conforma::session::{InferenceSession, Scratch};
use conforma::vocab::{VocabConfig, Vocabulary};

fn build(seq_len: usize) -> (ScoringModel, InferenceSession, Vec<f32>) {
    let vocab = Vocabulary::fit(
        ["brake hose clamp weld seam anchor bolt torque fitting liner"],
        VocabConfig::default(),
    )
    .unwrap();
    let rows = vocab.rows();

    let mut rng = StdRng::seed_from_u64(42);
    let mut val = move || rng.gen_range(-0.5f32..0.5);
    let embed_dim = 50;
    let hidden_dim = 16;
    let weights = ModelWeights {
        embedding: (0..rows).map(|_| (0..embed_dim).map(|_| val()).collect()).collect(),
        dense1_w: (0..embed_dim)
            .map(|_| (0..hidden_dim).map(|_| val()).collect())
            .collect(),
        dense1_b: (0..hidden_dim).map(|_| val()).collect(),
        dense2_w: (0..hidden_dim).map(|_| val()).collect(),
        dense2_b: val(),
    };

    let mut input_rng = StdRng::seed_from_u64(7);
    let input: Vec<f32> = (0..seq_len)
        .map(|_| input_rng.gen_range(0..rows as u32) as f32)
        .collect();

    let model = ScoringModel::new(weights.clone(), seq_len).unwrap();
    let artifact = Artifact::package("bench-clf", weights, vocab, seq_len).unwrap();
    let session = InferenceSession::from_artifact(&artifact).unwrap();
    (model, session, input)
}

fn bench_eager(c: &mut Criterion) {
    let mut group = c.benchmark_group("eager_forward");
    for seq_len in [20, 100, 400] {
        let (model, _, input) = build(seq_len);
        group.bench_with_input(BenchmarkId::from_parameter(seq_len), &seq_len, |b, _| {
            b.iter(|| model.predict_padded(black_box(&input)))
        });
    }
    group.finish();
}

fn bench_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_forward");
    for seq_len in [20, 100, 400] {
        let (_, session, input) = build(seq_len);
        let mut scratch = Scratch::for_session(&session);
        group.bench_with_input(BenchmarkId::from_parameter(seq_len), &seq_len, |b, _| {
            b.iter(|| session.run_with(black_box(&input), &mut scratch))
        });
    }
    group.finish();
}

fn bench_text_scoring(c: &mut Criterion) {
    let (_, session, _) = build(100);
    c.bench_function("session_score_text", |b| {
        b.iter(|| session.run_text(black_box("brake hose weld seam torque fitting")))
    });
}

criterion_group!(benches, bench_eager, bench_session, bench_text_scoring);
criterion_main!(benches);
