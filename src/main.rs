//! Conforma CLI - Main entry point.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

use conforma::artifact::Artifact;
use conforma::benchmark::run_benchmark;
use conforma::cli::{Cli, Commands};
use conforma::client::ScoringClient;
use conforma::config::ConformaConfig;
use conforma::dataset::Dataset;
use conforma::evaluate::evaluate;
use conforma::glove::GloveFile;
use conforma::model::{ModelWeights, ScoringModel};
use conforma::registry::ModelRegistry;
use conforma::serving::run_server;
use conforma::session::InferenceSession;
use conforma::vocab::Vocabulary;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let config = match &cli.config {
        Some(path) => ConformaConfig::from_file(path)?,
        None => ConformaConfig::development(),
    };

    match cli.command {
        Commands::BuildVocab {
            csv,
            output,
            max_words,
        } => {
            let dataset = Dataset::from_csv_path(&csv)?;
            let summary = dataset.summary();
            println!(
                "Loaded {} records ({} compliant, {} non-compliant)",
                summary.total, summary.compliant, summary.non_compliant
            );

            let mut vocab_config = config.vocab.clone();
            if let Some(n) = max_words {
                vocab_config.max_words = n;
            }
            let vocab = Vocabulary::fit(dataset.texts(), vocab_config)?;
            vocab.save(&output)?;
            println!(
                "Wrote vocabulary: {} words ({} embedding rows) -> {}",
                vocab.len(),
                vocab.rows(),
                output.display()
            );
        }

        Commands::Package {
            weights,
            vocab,
            name,
            output,
            glove,
            description,
        } => {
            let mut weights = ModelWeights::from_path(&weights)?;
            let vocab = Vocabulary::load(&vocab)?;

            if let Some(glove_path) = glove {
                let vectors = GloveFile::open(&glove_path)?;
                let (matrix, coverage) = vectors.embedding_matrix(&vocab, weights.embed_dim())?;
                weights.set_embedding(matrix)?;
                println!(
                    "Applied pretrained vectors: {}/{} words covered ({:.1}%)",
                    coverage.hits,
                    coverage.hits + coverage.misses,
                    coverage.coverage() * 100.0
                );
            }

            let mut artifact = Artifact::package(name, weights, vocab, config.model.seq_len)?;
            if let Some(description) = description {
                artifact = artifact.with_description(description);
            }
            artifact.write(&output)?;
            println!(
                "Packaged {} (model id {}) -> {}",
                artifact.manifest.name,
                artifact.manifest.model_id,
                output.display()
            );
        }

        Commands::Register { artifact } => {
            let artifact = Artifact::read(&artifact)?;
            let registry = ModelRegistry::open(config.registry)?;
            let version = registry.register(&artifact).await?;
            println!("Registered {} v{}", artifact.manifest.name, version);
        }

        Commands::Deploy { name, version } => {
            let registry = ModelRegistry::open(config.registry)?;
            let version = match version {
                Some(v) => v,
                None => registry
                    .latest(&name)
                    .await
                    .ok_or_else(|| anyhow::anyhow!("model not found: {}", name))?
                    .version,
            };
            registry.deploy(&name, version).await?;
            println!("Deployed {}:v{}", name, version);
        }

        Commands::Undeploy { name } => {
            let registry = ModelRegistry::open(config.registry)?;
            if registry.undeploy(&name).await? {
                println!("Undeployed {}", name);
            } else {
                println!("Nothing deployed for {}", name);
            }
        }

        Commands::Models { name } => {
            let registry = ModelRegistry::open(config.registry)?;
            let names = match name {
                Some(n) => vec![n],
                None => registry.list_models().await,
            };
            if names.is_empty() {
                println!("No models registered");
            }
            for name in names {
                let versions = registry.list_versions(&name).await;
                if versions.is_empty() {
                    eprintln!("Model not found: {}", name);
                    std::process::exit(1);
                }
                println!("{}", name);
                for v in versions {
                    println!(
                        "  v{:<4} {:<10} {:>10} bytes  {}",
                        v.version,
                        format!("{:?}", v.status).to_lowercase(),
                        v.size_bytes,
                        v.manifest.model_id
                    );
                }
            }
        }

        Commands::Serve { host, port } => {
            let mut serving = config.serving;
            if let Some(host) = host {
                serving.host = host;
            }
            if let Some(port) = port {
                serving.port = port;
            }
            run_server(serving, config.registry, config.inference).await?;
        }

        Commands::Score {
            model,
            text,
            data,
            endpoint,
        } => {
            let timeout = Duration::from_millis(config.inference.timeout_ms.max(1_000));
            let client = ScoringClient::new(&endpoint, timeout)?;
            let reply = match (text, data) {
                (Some(text), _) => client.score_text(&model, &text).await?,
                (None, Some(data)) => {
                    let values = parse_wire_data(&data)?;
                    client.score(&model, &values).await?
                }
                (None, None) => {
                    anyhow::bail!("provide either --text or --data");
                }
            };
            println!(
                "{}:v{} probability={:.4} label={} ({} us)",
                reply.model, reply.version, reply.probability, reply.label, reply.inference_time_us
            );
        }

        Commands::Bench {
            artifact,
            output,
            warmup,
            iterations,
        } => {
            let artifact = Artifact::read(&artifact)?;
            let seq_len = artifact.seq_len();
            let session = InferenceSession::from_artifact(&artifact)?;
            let model = ScoringModel::new(artifact.weights.clone(), seq_len)?;

            let mut bench = config.bench;
            if let Some(w) = warmup {
                bench.warmup_iters = w;
            }
            if let Some(n) = iterations {
                bench.measure_iters = n;
            }

            let inputs = sample_inputs(&artifact, 16);
            let report = run_benchmark(&model, &session, &inputs, bench)?;
            println!("{}", report);
            if let Some(path) = output {
                report.export_json(&path)?;
                println!("Wrote report to {}", path.display());
            }
        }

        Commands::Evaluate {
            artifact,
            csv,
            threshold,
        } => {
            let artifact = Artifact::read(&artifact)?;
            let session = InferenceSession::from_artifact(&artifact)?;
            let dataset = Dataset::from_csv_path(&csv)?;
            let report = evaluate(&session, &dataset, threshold)?;
            println!("{}", report);
        }

        Commands::Version => {
            println!("Conforma v{}", env!("CARGO_PKG_VERSION"));
            println!("Compliance text scoring: packaging, benchmarking, and serving");
        }
    }

    Ok(())
}

/// Parse a comma-separated wire-format sequence.
fn parse_wire_data(raw: &str) -> anyhow::Result<Vec<f32>> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|_| anyhow::anyhow!("not a float: {:?}", part.trim()))
        })
        .collect()
}

/// Deterministic wire-format inputs spanning the artifact's id range.
fn sample_inputs(artifact: &Artifact, count: usize) -> Vec<Vec<f32>> {
    let seq_len = artifact.seq_len();
    let rows = artifact.weights.vocab_rows() as u32;
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| {
            (0..seq_len)
                .map(|_| rng.gen_range(0..rows) as f32)
                .collect()
        })
        .collect()
}
