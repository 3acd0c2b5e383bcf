use serde::{Deserialize, Serialize};

use crate::model::{DataSnapshot, ExerciseRecord, KnowledgeItem, StudyPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncAction {
    Uploaded,
    Updated,
    Skipped,
    Failed,
}

/// Outcome for one processed local entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReportItem<T> {
    pub item: T,
    pub action: SyncAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Identifier of the remote counterpart, when one exists after the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl<T> SyncReportItem<T> {
    pub fn new(item: T, action: SyncAction) -> Self {
        Self {
            item,
            action,
            reason: None,
            remote_id: None,
        }
    }

    pub fn uploaded(item: T, remote_id: impl Into<String>) -> Self {
        Self::new(item, SyncAction::Uploaded).with_remote_id(remote_id)
    }

    pub fn updated(item: T, remote_id: impl Into<String>) -> Self {
        Self::new(item, SyncAction::Updated).with_remote_id(remote_id)
    }

    pub fn skipped(item: T, reason: impl Into<String>) -> Self {
        Self::new(item, SyncAction::Skipped).with_reason(reason)
    }

    pub fn failed(item: T, reason: impl Into<String>) -> Self {
        Self::new(item, SyncAction::Failed).with_reason(reason)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindCounts {
    pub uploaded: usize,
    pub updated: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl KindCounts {
    pub fn from_report<T>(items: &[SyncReportItem<T>]) -> Self {
        let mut counts = Self::default();
        for entry in items {
            match entry.action {
                SyncAction::Uploaded => counts.uploaded += 1,
                SyncAction::Updated => counts.updated += 1,
                SyncAction::Skipped => counts.skipped += 1,
                SyncAction::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn downloaded(count: usize) -> Self {
        Self {
            downloaded: count,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsCounts {
    pub uploaded: bool,
    pub downloaded: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDetails {
    pub records: KindCounts,
    pub plans: KindCounts,
    pub knowledge: KindCounts,
    pub settings: SettingsCounts,
}

impl SyncDetails {
    pub fn failed(&self) -> usize {
        self.records.failed + self.plans.failed + self.knowledge.failed
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub records: Vec<SyncReportItem<ExerciseRecord>>,
    pub plans: Vec<SyncReportItem<StudyPlan>>,
    pub knowledge: Vec<SyncReportItem<KnowledgeItem>>,
}

impl SyncReport {
    /// Per-kind counts derived from the report contents.
    pub fn details(&self) -> SyncDetails {
        SyncDetails {
            records: KindCounts::from_report(&self.records),
            plans: KindCounts::from_report(&self.plans),
            knowledge: KindCounts::from_report(&self.knowledge),
            settings: SettingsCounts::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    /// Set when the run stopped because cancellation was requested.
    #[serde(default)]
    pub cancelled: bool,
    /// Set when the run was refused before any work, e.g. no signed-in user.
    #[serde(default)]
    pub fatal: bool,
    pub message: String,
    pub details: SyncDetails,
    pub report: SyncReport,
    /// Downloaded content, present for download and full sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataSnapshot>,
}

impl SyncResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }

    /// A failure that stops a full sync before its download half.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            fatal: true,
            ..Self::failure(message)
        }
    }

    /// Build an upload outcome whose counts are taken from `report`.
    pub fn from_upload(report: SyncReport, settings_uploaded: bool) -> Self {
        let mut details = report.details();
        details.settings.uploaded = settings_uploaded;
        Self {
            success: details.failed() == 0,
            cancelled: false,
            fatal: false,
            message: upload_message(&details),
            details,
            report,
            data: None,
        }
    }

    pub fn from_download(data: DataSnapshot) -> Self {
        let details = SyncDetails {
            records: KindCounts::downloaded(data.records.len()),
            plans: KindCounts::downloaded(data.plans.len()),
            knowledge: KindCounts::downloaded(data.knowledge.len()),
            settings: SettingsCounts {
                uploaded: false,
                downloaded: data.settings.is_some(),
            },
        };
        Self {
            success: true,
            cancelled: false,
            fatal: false,
            message: download_message(&details),
            details,
            report: SyncReport::default(),
            data: Some(data),
        }
    }

    pub fn cancelled(report: SyncReport, settings_uploaded: bool) -> Self {
        let mut details = report.details();
        details.settings.uploaded = settings_uploaded;
        Self {
            success: false,
            cancelled: true,
            fatal: false,
            message: "upload cancelled".to_string(),
            details,
            report,
            data: None,
        }
    }

    /// Combine an upload and a download into one full-sync outcome.
    pub fn compose(upload: SyncResult, download: SyncResult) -> Self {
        let merge = |up: KindCounts, down: KindCounts| KindCounts {
            downloaded: down.downloaded,
            ..up
        };
        let details = SyncDetails {
            records: merge(upload.details.records, download.details.records),
            plans: merge(upload.details.plans, download.details.plans),
            knowledge: merge(upload.details.knowledge, download.details.knowledge),
            settings: SettingsCounts {
                uploaded: upload.details.settings.uploaded,
                downloaded: download.details.settings.downloaded,
            },
        };
        Self {
            success: upload.success && download.success,
            cancelled: upload.cancelled,
            fatal: upload.fatal || download.fatal,
            message: format!("{}; {}", upload.message, download.message),
            details,
            report: upload.report,
            data: download.data,
        }
    }
}

fn upload_message(d: &SyncDetails) -> String {
    let uploaded = d.records.uploaded + d.plans.uploaded + d.knowledge.uploaded;
    let updated = d.records.updated + d.plans.updated + d.knowledge.updated;
    let skipped = d.records.skipped + d.plans.skipped + d.knowledge.skipped;
    let mut msg = format!(
        "Uploaded {} items ({} records, {} plans, {} knowledge)",
        uploaded, d.records.uploaded, d.plans.uploaded, d.knowledge.uploaded
    );
    if updated > 0 {
        msg.push_str(&format!(", updated {updated}"));
    }
    msg.push_str(&format!(", skipped {skipped}"));
    if d.failed() > 0 {
        msg.push_str(&format!(", {} failed", d.failed()));
    }
    if d.settings.uploaded {
        msg.push_str(", settings saved");
    }
    msg
}

fn download_message(d: &SyncDetails) -> String {
    let mut msg = format!(
        "Downloaded {} records, {} plans, {} knowledge",
        d.records.downloaded, d.plans.downloaded, d.knowledge.downloaded
    );
    if d.settings.downloaded {
        msg.push_str(", settings");
    }
    msg
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearedCount {
    pub records: usize,
    pub plans: usize,
    pub knowledge: usize,
    pub settings: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResult {
    pub success: bool,
    pub message: String,
    pub cleared_count: ClearedCount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindOverview<T> {
    pub count: usize,
    pub recent: Vec<T>,
}

impl<T> Default for KindOverview<T> {
    fn default() -> Self {
        Self {
            count: 0,
            recent: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudOverview {
    pub records: KindOverview<ExerciseRecord>,
    pub plans: KindOverview<StudyPlan>,
    pub knowledge: KindOverview<KnowledgeItem>,
    pub has_settings: bool,
}
