//! Lifecycle event delivery
//!
//! The engine emits exactly four lifecycle notifications - test created,
//! data recorded, test analyzed, test finalized - consumed asynchronously
//! by report/dashboard/audit collaborators. Delivery is a tokio broadcast
//! channel: subscribers come and go freely, and publishing with zero
//! subscribers is a no-op. The core itself persists nothing; a storage
//! collaborator is expected to subscribe and archive final reports.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use super::decision::AnalysisResult;
use super::experiment::Arm;
use super::registry::FinalReport;

/// A lifecycle notification with its payload.
///
/// Heavy payloads ride behind `Arc` so broadcast clones stay cheap.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A new experiment entered `Running`.
    ExperimentCreated {
        /// The created experiment.
        experiment_id: String,
        /// Human-readable name.
        name: String,
        /// Creation time.
        at: DateTime<Utc>,
    },
    /// A data point was folded into a variant's aggregators.
    MeasurementRecorded {
        /// The owning experiment.
        experiment_id: String,
        /// Which variant received the data point.
        arm: Arm,
        /// Total samples collected across both variants afterwards.
        samples_collected: u64,
    },
    /// An analysis pass completed.
    ExperimentAnalyzed {
        /// The analyzed experiment.
        experiment_id: String,
        /// The full result of the pass.
        analysis: Arc<AnalysisResult>,
    },
    /// An experiment completed and its report was archived.
    ExperimentFinalized {
        /// The finalized experiment.
        experiment_id: String,
        /// The archived final report.
        report: Arc<FinalReport>,
    },
}

impl EngineEvent {
    /// Stable wire name of the notification, for audit logs and external
    /// consumers (`test_created`, `data_recorded`, `test_analyzed`,
    /// `test_finalized`).
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ExperimentCreated { .. } => "test_created",
            Self::MeasurementRecorded { .. } => "data_recorded",
            Self::ExperimentAnalyzed { .. } => "test_analyzed",
            Self::ExperimentFinalized { .. } => "test_finalized",
        }
    }

    /// Id of the experiment the event concerns.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        match self {
            Self::ExperimentCreated { experiment_id, .. }
            | Self::MeasurementRecorded { experiment_id, .. }
            | Self::ExperimentAnalyzed { experiment_id, .. }
            | Self::ExperimentFinalized { experiment_id, .. } => experiment_id,
        }
    }
}

/// Broadcast fan-out for [`EngineEvent`].
#[derive(Debug)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish to whoever is listening. No subscribers is not an error.
    pub(crate) fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}
