//! Command-line interface for Conforma.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Conforma - packaging, benchmarking, and serving for the compliance text scorer.
#[derive(Parser)]
#[command(name = "conforma")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CONFORMA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CONFORMA_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Fit a vocabulary over a labeled CSV and write it as JSON
    BuildVocab {
        /// Input CSV with text,label columns
        csv: PathBuf,

        /// Output vocabulary path
        #[arg(short, long, default_value = "vocab.json")]
        output: PathBuf,

        /// Override the configured vocabulary size
        #[arg(long)]
        max_words: Option<usize>,
    },

    /// Bundle weights and a vocabulary into a portable artifact
    Package {
        /// Pretrained weights JSON file
        weights: PathBuf,

        /// Vocabulary JSON file
        vocab: PathBuf,

        /// Model name recorded in the manifest
        #[arg(short, long, default_value = "component-clf")]
        name: String,

        /// Output artifact path
        #[arg(short, long, default_value = "model.cfa")]
        output: PathBuf,

        /// Replace the embedding table from a pretrained vector file
        #[arg(long)]
        glove: Option<PathBuf>,

        /// Manifest description
        #[arg(long)]
        description: Option<String>,
    },

    /// Register an artifact file with the model registry
    Register {
        /// Artifact path
        artifact: PathBuf,
    },

    /// Deploy a registered version (any prior deployment returns to ready)
    Deploy {
        /// Model name
        name: String,

        /// Version to deploy (latest when omitted)
        #[arg(short, long)]
        version: Option<u32>,
    },

    /// Undeploy a model
    Undeploy {
        /// Model name
        name: String,
    },

    /// List registered models and their versions
    Models {
        /// Limit to one model name
        name: Option<String>,
    },

    /// Load deployed models and run the HTTP scoring endpoint
    Serve {
        /// Override the configured bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the configured bind port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Score through a running endpoint
    Score {
        /// Model name
        model: String,

        /// Raw text to score
        #[arg(short, long, conflicts_with = "data")]
        text: Option<String>,

        /// Comma-separated padded token ids (wire format)
        #[arg(short, long)]
        data: Option<String>,

        /// Endpoint base URL
        #[arg(short, long, default_value = "http://127.0.0.1:8080")]
        endpoint: String,
    },

    /// Compare eager and session inference latency for an artifact
    Bench {
        /// Artifact path
        artifact: PathBuf,

        /// Write the report as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override configured warmup iterations
        #[arg(long)]
        warmup: Option<usize>,

        /// Override configured measured iterations
        #[arg(long)]
        iterations: Option<usize>,
    },

    /// Evaluate an artifact against a labeled CSV
    Evaluate {
        /// Artifact path
        artifact: PathBuf,

        /// Labeled CSV with text,label columns
        csv: PathBuf,

        /// Decision threshold for the non-compliant label
        #[arg(short, long, default_value_t = 0.5)]
        threshold: f32,
    },

    /// Show version information
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
