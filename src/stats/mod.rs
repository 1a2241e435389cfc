//! Online Statistics Module
//!
//! Incremental estimation and hypothesis testing over measurement streams:
//!
//! - [`OnlineStats`]: constant-memory Welford aggregation (count/mean/variance),
//!   no raw samples retained
//! - [`analyzer`]: Welch's t-test (continuous metrics), two-proportion z-test
//!   (binary metrics), Bonferroni family-wise correction
//! - [`power`]: required sample size for a target power and minimum
//!   detectable effect
//! - [`dist`]: the distribution functions the above are built on
//!
//! # Example
//!
//! ```rust
//! use ensayo::stats::OnlineStats;
//!
//! let mut stats = OnlineStats::new();
//! for v in [4.0, 7.0, 13.0, 16.0] {
//!     stats.push(v);
//! }
//! assert!((stats.mean() - 10.0).abs() < 1e-12);
//! assert!((stats.variance() - 30.0).abs() < 1e-9);
//! ```

pub mod analyzer;
pub mod dist;
pub mod online;
pub mod power;

pub use analyzer::{bonferroni, MetricAnalysis, MetricKind, MetricRole};
pub use online::OnlineStats;
pub use power::required_sample_size;
