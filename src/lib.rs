//! Conforma - packaging, benchmarking, and serving for a compliance text scorer.
//!
//! Conforma owns the full lifecycle of one fixed binary text classifier
//! (compliant vs non-compliant car-component descriptions): dataset
//! ingestion, vocabulary fitting, pretrained-vector import, portable model
//! packaging, prepared-session inference, a versioned model registry, and
//! an HTTP scoring endpoint.
//!
//! # Features
//!
//! - **Portable Artifacts**: single-file model bundles with digest-verified
//!   payloads, loadable by a prepared session.
//! - **Two Inference Paths**: an eager layer-by-layer forward pass and a
//!   preallocated session path with guaranteed numerical parity.
//! - **Versioned Registry**: persistent on-disk model store with a
//!   deploy/deprecate lifecycle.
//! - **HTTP Scoring**: the original wire contract preserved, a JSON float
//!   array in and a scalar probability out.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Conforma                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Data: CSV dataset | word-index vocabulary | GloVe vectors   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Model: fixed topology + weights | portable artifact         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Runtime: inference engine | prepared sessions | benchmark   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Ops: versioned registry | HTTP scoring endpoint | CLI       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use conforma::config::ConformaConfig;
//! use conforma::serving::run_server;
//!
//! #[tokio::main]
//! async fn main() -> conforma::Result<()> {
//!     // Use development configuration
//!     let config = ConformaConfig::development();
//!
//!     // Serve every deployed registry model
//!     run_server(config.serving, config.registry, config.inference).await
//! }
//! ```

pub mod artifact;
pub mod benchmark;
pub mod cli;
pub mod client;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod glove;
pub mod inference;
pub mod model;
pub mod registry;
pub mod serving;
pub mod session;
pub mod vocab;

pub use error::{ConformaError, Result};
