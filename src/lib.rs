//! # Ensayo: Embedded A/B Experimentation Engine
//!
//! Ensayo accepts streamed outcome measurements tagged by experiment variant,
//! maintains constant-memory running statistics (Welford), periodically
//! evaluates statistical significance across one or more metrics, and produces
//! a deploy / reject / continue recommendation — including automatic early
//! termination on strong signal or on guard-rail violation.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Muda elimination**: online aggregation — no raw sample history in memory
//! - **Poka-Yoke safety**: guard-rail metrics force termination on regression
//! - **Jidoka**: the engine stops itself when the evidence is decisive
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ensayo::{Arm, EngineConfig, ExperimentConfig, ExperimentRegistry};
//! use std::collections::HashMap;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ensayo::Result<()> {
//! let registry = ExperimentRegistry::new(EngineConfig::default());
//!
//! let experiment = registry.create(ExperimentConfig {
//!     name: "ranked-retrieval-v2".to_string(),
//!     hypothesis: "Reranking raises answer acceptance".to_string(),
//!     test_variant: "cross-encoder reranker enabled".to_string(),
//!     primary_metrics: vec!["acceptance".to_string()],
//!     ..ExperimentConfig::default()
//! })?;
//!
//! let mut point = HashMap::new();
//! point.insert("acceptance".to_string(), 1.0);
//! registry.record_measurement(experiment.id(), Arm::Test, &point)?;
//!
//! let analysis = registry.analyze(experiment.id())?;
//! println!("recommendation: {:?}", analysis.recommendation);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod engine;
pub mod error;
pub mod stats;

pub use engine::config::{EngineConfig, ExperimentConfig};
pub use engine::decision::{AnalysisResult, ContinueReason, Recommendation, StopReason};
pub use engine::events::EngineEvent;
pub use engine::experiment::{Arm, CompletionReason, Experiment, ExperimentStatus};
pub use engine::registry::{ExperimentRegistry, FinalReport};
pub use error::{Error, Result};
