use std::sync::{Arc, Mutex};

use studysync_core::plan::{REASON_EXISTS_IN_REMOTE, REASON_SAME_ID_SAME_CONTENT};
use studysync_core::{
    DataSnapshot, ExerciseRecord, KindCounts, PlanOptions, Settings, StudyPlan, SyncAction,
    SyncEntity,
};
use studysync_pipeline::remote::memory::CallCounts;
use studysync_pipeline::{
    InMemoryRemote, ProgressSink, SyncEngine, SyncOptions, SyncProgress, SyncStage,
    NOT_AUTHENTICATED,
};
use uuid::Uuid;

// --- Helpers ---

const USER: &str = "user-1";

fn scenario_record() -> ExerciseRecord {
    ExerciseRecord::new("2024-01-01", "math", 20, 15, "25:00")
}

fn setup() -> (Arc<InMemoryRemote>, SyncEngine) {
    let remote = Arc::new(InMemoryRemote::new(USER));
    let engine = SyncEngine::new(remote.clone());
    (remote, engine)
}

fn snapshot(records: Vec<ExerciseRecord>) -> DataSnapshot {
    DataSnapshot {
        records,
        ..Default::default()
    }
}

// --- Tests ---

#[tokio::test]
async fn single_record_into_empty_remote_is_uploaded() {
    let (remote, engine) = setup();

    let result = engine
        .upload_to_cloud(&snapshot(vec![scenario_record()]), None, None)
        .await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.details.records.uploaded, 1);
    assert_eq!(result.details.records.skipped, 0);
    assert_eq!(remote.records.rows_for(USER).len(), 1);

    let entry = &result.report.records[0];
    assert_eq!(entry.action, SyncAction::Uploaded);
    assert_eq!(entry.remote_id.as_deref(), Some(remote.records.rows_for(USER)[0].id()));
}

#[tokio::test]
async fn semantic_duplicate_with_other_id_is_skipped() {
    let (remote, engine) = setup();
    let mut existing = scenario_record();
    existing.id = Uuid::new_v4().to_string();
    remote.records.seed(USER, [existing.clone()]);

    let result = engine
        .upload_to_cloud(&snapshot(vec![scenario_record()]), None, None)
        .await;

    assert!(result.success);
    assert_eq!(result.details.records.uploaded, 0);
    assert_eq!(result.details.records.skipped, 1);
    let entry = &result.report.records[0];
    assert_eq!(entry.reason.as_deref(), Some(REASON_EXISTS_IN_REMOTE));
    assert_eq!(entry.remote_id.as_deref(), Some(existing.id.as_str()));
    assert_eq!(CallCounts::get(&remote.records.calls.batch_insert), 0);
}

#[tokio::test]
async fn second_upload_of_same_data_uploads_nothing() {
    let (remote, engine) = setup();
    let local = DataSnapshot {
        records: vec![scenario_record(), ExerciseRecord::new("2024-01-02", "verbal", 30, 22, "40:00")],
        plans: vec![StudyPlan::new("Daily drill", "math", "daily", "2024-01-01", "2024-01-31", 20.0)],
        knowledge: vec![studysync_core::KnowledgeItem::new("math", "formula", "a^2+b^2", "2024-01-03")],
        settings: None,
    };

    let first = engine.upload_to_cloud(&local, None, None).await;
    assert_eq!(first.details.records.uploaded, 2);

    let second = engine.upload_to_cloud(&local, None, None).await;
    assert!(second.success);
    for counts in [second.details.records, second.details.plans, second.details.knowledge] {
        assert_eq!(counts.uploaded, 0);
    }
    assert!(second
        .report
        .records
        .iter()
        .all(|e| e.reason.as_deref() == Some(REASON_SAME_ID_SAME_CONTENT)));
    assert_eq!(remote.records.rows_for(USER).len(), 2);
    assert_eq!(remote.plans.rows_for(USER).len(), 1);
    assert_eq!(remote.knowledge.rows_for(USER).len(), 1);
}

#[tokio::test]
async fn details_are_counted_from_the_report() {
    let (remote, engine) = setup();
    let mut existing = ExerciseRecord::new("2024-01-01", "math", 20, 15, "25:00");
    existing.id = Uuid::new_v4().to_string();
    remote.records.seed(USER, [existing]);

    let local = snapshot(vec![
        scenario_record(),
        ExerciseRecord::new("2024-01-02", "math", 20, 18, "20:00"),
        ExerciseRecord::new("2024-01-03", "math", 20, 19, "21:00"),
    ]);
    let result = engine.upload_to_cloud(&local, None, None).await;

    assert_eq!(result.details.records, KindCounts::from_report(&result.report.records));
    let uploaded = result
        .report
        .records
        .iter()
        .filter(|e| e.action == SyncAction::Uploaded)
        .count();
    assert_eq!(result.details.records.uploaded, uploaded);
    assert_eq!(uploaded, 2);
    assert!(result.message.contains("Uploaded 2 items"));
}

#[tokio::test]
async fn unauthenticated_upload_is_fatal_and_writes_nothing() {
    let remote = Arc::new(InMemoryRemote::signed_out());
    let engine = SyncEngine::new(remote.clone());

    let result = engine
        .upload_to_cloud(&snapshot(vec![scenario_record()]), None, None)
        .await;

    assert!(!result.success);
    assert!(!result.cancelled);
    assert!(result.fatal);
    assert_eq!(result.message, NOT_AUTHENTICATED);
    assert_eq!(CallCounts::get(&remote.records.calls.list), 0);
    assert_eq!(CallCounts::get(&remote.records.calls.batch_insert), 0);
}

#[tokio::test]
async fn list_failure_is_treated_as_empty_remote() {
    let (remote, engine) = setup();
    remote.plans.fail_list(true);
    let local = DataSnapshot {
        records: vec![scenario_record()],
        plans: vec![StudyPlan::new("Weekly", "verbal", "weekly", "2024-01-01", "2024-01-07", 5.0)],
        ..Default::default()
    };

    let result = engine.upload_to_cloud(&local, None, None).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.details.records.uploaded, 1);
    assert_eq!(result.details.plans.uploaded, 1);

    let download = engine.download_from_cloud(None).await;
    assert!(download.success);
    assert_eq!(download.details.records.downloaded, 1);
    assert_eq!(download.details.plans.downloaded, 0);
}

#[tokio::test]
async fn settings_are_upserted_and_failures_reported() {
    let (remote, engine) = setup();
    let settings = Settings::new().with("theme", "dark").with("dailyGoal", 50);
    let local = DataSnapshot {
        settings: Some(settings.clone()),
        ..Default::default()
    };

    let ok = engine.upload_to_cloud(&local, None, None).await;
    assert!(ok.success);
    assert!(ok.details.settings.uploaded);
    assert_eq!(remote.settings.get(USER), Some(settings));

    remote.settings.fail_upsert(true);
    let failed = engine.upload_to_cloud(&local, None, None).await;
    assert!(!failed.success);
    assert!(!failed.details.settings.uploaded);
    assert!(failed.message.contains("settings upload failed"));
}

#[tokio::test]
async fn progress_reports_each_phase_in_order() {
    let (_remote, engine) = setup();
    let seen = Mutex::new(Vec::new());
    let record = |p: &SyncProgress| seen.lock().unwrap().push(p.clone());
    let sink: ProgressSink<'_> = &record;

    engine
        .upload_to_cloud(&snapshot(vec![scenario_record()]), Some(sink), None)
        .await;

    let seen = seen.into_inner().unwrap();
    let stages: Vec<SyncStage> = seen.iter().map(|p| p.stage).collect();
    assert_eq!(
        stages,
        vec![
            SyncStage::Checking,
            SyncStage::UploadingRecords,
            SyncStage::UploadingPlans,
            SyncStage::UploadingKnowledge,
            SyncStage::UploadingSettings,
            SyncStage::Complete,
        ]
    );
    assert!(seen.iter().all(|p| p.total == 4));
    assert_eq!(seen.iter().map(|p| p.current).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 4]);
}

#[tokio::test]
async fn changed_linked_plan_is_skipped_unless_updates_enabled() {
    let remote = Arc::new(InMemoryRemote::new(USER));
    let mut stored = StudyPlan::new("Daily", "math", "daily", "2024-01-01", "2024-01-31", 20.0);
    stored.id = Uuid::new_v4().to_string();
    remote.plans.seed(USER, [stored.clone()]);

    let mut local_plan = stored.clone();
    local_plan.mark_synced(stored.id.clone());
    local_plan.progress = 12.0;
    let local = DataSnapshot {
        plans: vec![local_plan],
        ..Default::default()
    };

    let plain = SyncEngine::new(remote.clone());
    let result = plain.upload_to_cloud(&local, None, None).await;
    assert_eq!(result.details.plans.skipped, 1);
    assert_eq!(result.details.plans.updated, 0);
    assert_eq!(CallCounts::get(&remote.plans.calls.update), 0);

    let updating = SyncEngine::with_options(
        remote.clone(),
        SyncOptions {
            plan: PlanOptions {
                update_changed: true,
            },
            ..SyncOptions::default()
        },
    );
    let result = updating.upload_to_cloud(&local, None, None).await;
    assert!(result.success);
    assert_eq!(result.details.plans.updated, 1);
    assert_eq!(result.report.plans[0].remote_id.as_deref(), Some(stored.id.as_str()));

    let rows = remote.plans.rows_for(USER);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].progress, 12.0);
    assert!(rows[0].updated_at.is_some());
}
