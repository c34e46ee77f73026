//! Classification quality report.
//!
//! Scores a labeled dataset through a prepared session and derives the
//! usual binary-classification metrics, with non-compliant as the positive
//! class.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::{Dataset, Label};
use crate::error::{ConformaError, Result};
use crate::session::{InferenceSession, Scratch};

/// Binary confusion counts. Non-compliant is the positive class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }
}

/// Quality metrics over a labeled dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub model: String,
    pub records: usize,
    pub threshold: f32,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub confusion: ConfusionMatrix,
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Evaluation: {} ({} records, threshold {:.2})",
            self.model, self.records, self.threshold
        )?;
        writeln!(f, "  accuracy:  {:.4}", self.accuracy)?;
        writeln!(f, "  precision: {:.4}", self.precision)?;
        writeln!(f, "  recall:    {:.4}", self.recall)?;
        writeln!(f, "  f1:        {:.4}", self.f1)?;
        write!(
            f,
            "  confusion: tp={} fp={} tn={} fn={}",
            self.confusion.true_positives,
            self.confusion.false_positives,
            self.confusion.true_negatives,
            self.confusion.false_negatives
        )
    }
}

/// Score every record and tally predicted labels against the ground truth.
///
/// Ratios with an empty denominator (no positive predictions, no positive
/// records) report as zero rather than NaN.
pub fn evaluate(session: &InferenceSession, dataset: &Dataset, threshold: f32) -> Result<EvalReport> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ConformaError::InvalidInput(format!(
            "threshold must be within [0, 1], got {}",
            threshold
        )));
    }
    if dataset.is_empty() {
        return Err(ConformaError::EmptyDataset("evaluation dataset".into()));
    }

    let mut scratch = Scratch::for_session(session);
    let mut confusion = ConfusionMatrix::default();
    for record in dataset.records() {
        let ids = session.vocab().encode_padded(&record.text, session.seq_len());
        let probability = session.run_ids_with(&ids, &mut scratch)?;
        let predicted = Label::from_probability(probability, threshold);
        match (record.label, predicted) {
            (Label::NonCompliant, Label::NonCompliant) => confusion.true_positives += 1,
            (Label::Compliant, Label::NonCompliant) => confusion.false_positives += 1,
            (Label::Compliant, Label::Compliant) => confusion.true_negatives += 1,
            (Label::NonCompliant, Label::Compliant) => confusion.false_negatives += 1,
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let accuracy = ratio(
        confusion.true_positives + confusion.true_negatives,
        confusion.total(),
    );
    let precision = ratio(
        confusion.true_positives,
        confusion.true_positives + confusion.false_positives,
    );
    let recall = ratio(
        confusion.true_positives,
        confusion.true_positives + confusion.false_negatives,
    );
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    info!(
        model = session.name(),
        records = dataset.len(),
        accuracy,
        f1,
        "evaluated model"
    );
    Ok(EvalReport {
        model: session.name().to_string(),
        records: dataset.len(),
        threshold,
        accuracy,
        precision,
        recall,
        f1,
        confusion,
    })
}
