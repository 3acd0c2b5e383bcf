use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStage {
    Checking,
    UploadingRecords,
    UploadingPlans,
    UploadingKnowledge,
    UploadingSettings,
    Downloading,
    Clearing,
    Verifying,
    Complete,
    Cancelled,
}

impl SyncStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncStage::Complete | SyncStage::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub current: u32,
    pub total: u32,
    pub current_item: String,
    pub stage: SyncStage,
}

/// Per-call progress callback.
pub type ProgressSink<'a> = &'a (dyn Fn(&SyncProgress) + Send + Sync);

/// Emits phase-start events against a fixed phase total.
pub(crate) struct PhaseReporter<'a> {
    sink: Option<ProgressSink<'a>>,
    total: u32,
}

impl<'a> PhaseReporter<'a> {
    pub(crate) fn new(sink: Option<ProgressSink<'a>>, total: u32) -> Self {
        Self { sink, total }
    }

    pub(crate) fn phase(&self, current: u32, stage: SyncStage, item: impl Into<String>) {
        if let Some(sink) = self.sink {
            sink(&SyncProgress {
                current: current.min(self.total),
                total: self.total,
                current_item: item.into(),
                stage,
            });
        }
    }
}
