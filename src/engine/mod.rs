//! Experimentation Engine Module
//!
//! The lifecycle layer on top of [`crate::stats`]:
//!
//! ```text
//! ExperimentRegistry (1) ──< Experiment (N, active or completed)
//!                                │
//!                                ├── Variant: control ──< OnlineStats (per metric)
//!                                ├── Variant: test    ──< OnlineStats (per metric)
//!                                └── alerts, last analysis, timers
//! ```
//!
//! Data flow: ingestion routes a data point to the owning experiment's
//! variant aggregators; on trigger conditions (sample-count threshold or the
//! periodic timer) the registry snapshots the aggregators, runs the
//! statistical analyzer, feeds the result through the decision engine, and
//! applies the outcome - continue, or stop-and-finalize with a completion
//! reason. Lifecycle notifications fan out over a broadcast channel.

pub mod config;
pub mod counters;
pub mod decision;
pub mod events;
pub mod experiment;
pub mod registry;
pub(crate) mod scheduler;

pub use config::{EngineConfig, ExperimentConfig};
pub use counters::{CounterSnapshot, EngineCounters};
pub use decision::{AnalysisResult, ContinueReason, Recommendation, StopReason};
pub use events::EngineEvent;
pub use experiment::{
    Alert, AlertSeverity, Arm, CompletionReason, Experiment, ExperimentStatus, Variant,
};
pub use registry::{ExperimentRegistry, FinalReport};
