pub mod dedup;
pub mod model;
pub mod plan;
pub mod report;

pub use dedup::{find_duplicate, has_changes, is_duplicate, merge_remote};
pub use model::{
    DataSnapshot, EntityKind, EntityOrigin, ExerciseRecord, FieldValue, KnowledgeItem, Settings,
    StudyPlan, SyncEntity,
};
pub use plan::{plan, PlanOptions, UploadPlan};
pub use report::{
    ClearResult, ClearedCount, CloudOverview, KindCounts, KindOverview, SettingsCounts,
    SyncAction, SyncDetails, SyncReport, SyncReportItem, SyncResult,
};
