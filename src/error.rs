//! Error types for Ensayo
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! All errors are local and recoverable: a rejected measurement leaves every
//! aggregator untouched, and a failed scheduled analysis pass is retried at
//! the next tick. Guard-rail and early-stopping triggers are not errors —
//! they are normal, logged state transitions.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Ensayo error types
#[derive(Error, Debug)]
pub enum Error {
    /// Experiment configuration rejected before any state mutation
    #[error("invalid experiment configuration: {0}")]
    Validation(String),

    /// Requested traffic share would push total allocation over the ceiling
    #[error(
        "traffic conflict: requested share {requested:.3} with {reserved:.3} already reserved \
         exceeds ceiling {ceiling:.3}"
    )]
    TrafficConflict {
        /// Share requested by the new experiment
        requested: f64,
        /// Sum of shares already reserved by active experiments
        reserved: f64,
        /// System-wide allocation ceiling
        ceiling: f64,
    },

    /// Operation referenced a non-existent or already-archived experiment id
    #[error("unknown experiment: {0}")]
    UnknownTest(String),

    /// Non-finite metric value; the measurement is dropped, aggregators untouched
    #[error("invalid measurement for metric '{metric}': {value} is not finite")]
    InvalidMeasurement {
        /// Metric name carrying the offending value
        metric: String,
        /// The rejected value (NaN or infinite)
        value: f64,
    },
}
