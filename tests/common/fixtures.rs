// Test fixtures and data generators for integration tests

use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use conforma::artifact::Artifact;
use conforma::dataset::Label;
use conforma::model::ModelWeights;
use conforma::vocab::{VocabConfig, Vocabulary};

const COMPONENTS: &[&str] = &[
    "brake hose",
    "seat anchor",
    "fuel line",
    "steering column",
    "wheel bearing",
    "airbag module",
];

const COMPLIANT_PHRASES: &[&str] = &[
    "meets federal standard",
    "passed durability testing",
    "certified supplier batch",
    "within torque specification",
];

const NON_COMPLIANT_PHRASES: &[&str] = &[
    "weld untested",
    "missing certification record",
    "below minimum thickness",
    "failed pressure test",
];

/// Deterministic generator of labeled component descriptions.
pub struct TestDataGenerator {
    rng: StdRng,
}

impl TestDataGenerator {
    /// Creates a new generator with a fixed seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generates one labeled description.
    pub fn record(&mut self) -> (String, Label) {
        let component = COMPONENTS.choose(&mut self.rng).unwrap();
        if self.rng.gen_bool(0.5) {
            let phrase = COMPLIANT_PHRASES.choose(&mut self.rng).unwrap();
            (format!("{} {}", component, phrase), Label::Compliant)
        } else {
            let phrase = NON_COMPLIANT_PHRASES.choose(&mut self.rng).unwrap();
            (format!("{} {}", component, phrase), Label::NonCompliant)
        }
    }

    /// Writes `count` labeled records as a headered CSV file.
    pub fn write_csv(&mut self, path: &Path, count: usize) {
        let mut out = String::from("text,label\n");
        for _ in 0..count {
            let (text, label) = self.record();
            out.push_str(&format!("{},{}\n", text, label.as_u8()));
        }
        std::fs::write(path, out).expect("Failed to write test CSV");
    }

    /// Random weights for the fixed topology.
    pub fn weights(&mut self, vocab_rows: usize, embed_dim: usize, hidden_dim: usize) -> ModelWeights {
        fn val(rng: &mut StdRng) -> f32 {
            rng.gen_range(-0.5f32..0.5)
        }
        ModelWeights {
            embedding: (0..vocab_rows)
                .map(|_| (0..embed_dim).map(|_| val(&mut self.rng)).collect())
                .collect(),
            dense1_w: (0..embed_dim)
                .map(|_| (0..hidden_dim).map(|_| val(&mut self.rng)).collect())
                .collect(),
            dense1_b: (0..hidden_dim).map(|_| val(&mut self.rng)).collect(),
            dense2_w: (0..hidden_dim).map(|_| val(&mut self.rng)).collect(),
            dense2_b: val(&mut self.rng),
        }
    }
}

impl Default for TestDataGenerator {
    fn default() -> Self {
        Self::new(42)
    }
}

/// A vocabulary fitted over the generator's full phrase pool.
pub fn test_vocab() -> Vocabulary {
    let corpus: Vec<String> = COMPONENTS
        .iter()
        .flat_map(|c| {
            COMPLIANT_PHRASES
                .iter()
                .chain(NON_COMPLIANT_PHRASES.iter())
                .map(move |p| format!("{} {}", c, p))
        })
        .collect();
    Vocabulary::fit(corpus.iter(), VocabConfig::default()).expect("Failed to fit test vocabulary")
}

/// A complete packaged artifact backed by seeded random weights.
pub fn test_artifact(name: &str, seq_len: usize, seed: u64) -> Artifact {
    let vocab = test_vocab();
    let mut generator = TestDataGenerator::new(seed);
    let weights = generator.weights(vocab.rows(), 8, 4);
    Artifact::package(name, weights, vocab, seq_len).expect("Failed to package test artifact")
}
