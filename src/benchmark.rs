//! Inference latency comparison.
//!
//! Scores the same pre-encoded inputs through the eager model and the
//! prepared session, then reports per-path latency statistics and the
//! speedup of the session over the eager pass. Warmup iterations run both
//! paths but are excluded from the sample.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConformaError, Result};
use crate::model::ScoringModel;
use crate::session::{InferenceSession, Scratch};

/// Benchmark iteration counts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Iterations run before measurement starts.
    pub warmup_iters: usize,
    /// Measured iterations per path.
    pub measure_iters: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            warmup_iters: 100,
            measure_iters: 1_000,
        }
    }
}

/// Latency statistics over one path's measured sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub throughput_ops: f64,
}

impl LatencyStats {
    /// Compute statistics from a raw microsecond sample. Percentiles are
    /// nearest-rank over the sorted sample.
    pub fn from_sample(mut latencies_us: Vec<u64>) -> Result<Self> {
        if latencies_us.is_empty() {
            return Err(ConformaError::InvalidInput(
                "cannot compute statistics over an empty sample".into(),
            ));
        }
        latencies_us.sort_unstable();
        let len = latencies_us.len();
        let total: u64 = latencies_us.iter().sum();
        let mean_us = total as f64 / len as f64;
        Ok(Self {
            min_us: latencies_us[0],
            max_us: latencies_us[len - 1],
            mean_us,
            p50_us: latencies_us[((len - 1) as f64 * 0.50) as usize],
            p95_us: latencies_us[((len - 1) as f64 * 0.95) as usize],
            p99_us: latencies_us[((len - 1) as f64 * 0.99) as usize],
            throughput_ops: if mean_us > 0.0 {
                1_000_000.0 / mean_us
            } else {
                f64::INFINITY
            },
        })
    }
}

/// Side-by-side latency comparison of the two inference paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchReport {
    pub model: String,
    pub inputs: usize,
    pub iterations: usize,
    pub eager: LatencyStats,
    pub session: LatencyStats,
    /// Ratio of eager mean latency to session mean latency.
    pub speedup: f64,
}

impl BenchReport {
    /// Write the report as pretty JSON.
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Inference benchmark: {} ({} inputs, {} iterations/path)",
            self.model, self.inputs, self.iterations
        )?;
        writeln!(
            f,
            "{:<10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>12}",
            "path", "min us", "mean us", "p50 us", "p95 us", "p99 us", "ops/s"
        )?;
        for (name, stats) in [("eager", &self.eager), ("session", &self.session)] {
            writeln!(
                f,
                "{:<10} {:>10} {:>10.1} {:>10} {:>10} {:>10} {:>12.0}",
                name,
                stats.min_us,
                stats.mean_us,
                stats.p50_us,
                stats.p95_us,
                stats.p99_us,
                stats.throughput_ops
            )?;
        }
        write!(f, "session speedup over eager: {:.2}x", self.speedup)
    }
}

/// Run the two paths over identical inputs and compare latencies.
///
/// Inputs are wire-format padded sequences; they cycle when there are
/// fewer inputs than iterations. Each input is validated once before the
/// clock starts so a bad sequence fails fast instead of mid-measurement.
pub fn run_benchmark(
    model: &ScoringModel,
    session: &InferenceSession,
    inputs: &[Vec<f32>],
    config: BenchConfig,
) -> Result<BenchReport> {
    if inputs.is_empty() {
        return Err(ConformaError::InvalidInput(
            "benchmark needs at least one input".into(),
        ));
    }
    if config.measure_iters == 0 {
        return Err(ConformaError::InvalidConfig {
            field: "bench.measure_iters".into(),
            reason: "must measure at least 1 iteration".into(),
        });
    }
    for input in inputs {
        model.predict_padded(input)?;
        session.run(input)?;
    }

    let mut scratch = Scratch::for_session(session);
    for i in 0..config.warmup_iters {
        let input = &inputs[i % inputs.len()];
        let _ = model.predict_padded(input)?;
        let _ = session.run_with(input, &mut scratch)?;
    }

    let mut eager_us = Vec::with_capacity(config.measure_iters);
    for i in 0..config.measure_iters {
        let input = &inputs[i % inputs.len()];
        let start = Instant::now();
        let _ = model.predict_padded(input)?;
        eager_us.push(start.elapsed().as_micros() as u64);
    }

    let mut session_us = Vec::with_capacity(config.measure_iters);
    for i in 0..config.measure_iters {
        let input = &inputs[i % inputs.len()];
        let start = Instant::now();
        let _ = session.run_with(input, &mut scratch)?;
        session_us.push(start.elapsed().as_micros() as u64);
    }

    let eager = LatencyStats::from_sample(eager_us)?;
    let session_stats = LatencyStats::from_sample(session_us)?;
    let speedup = if session_stats.mean_us > 0.0 {
        eager.mean_us / session_stats.mean_us
    } else {
        f64::INFINITY
    };

    info!(
        model = session.name(),
        eager_mean_us = eager.mean_us,
        session_mean_us = session_stats.mean_us,
        speedup,
        "benchmark complete"
    );
    Ok(BenchReport {
        model: session.name().to_string(),
        inputs: inputs.len(),
        iterations: config.measure_iters,
        eager,
        session: session_stats,
        speedup,
    })
}
