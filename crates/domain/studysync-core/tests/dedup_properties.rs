use studysync_core::{
    has_changes, is_duplicate, merge_remote, DataSnapshot, ExerciseRecord, KnowledgeItem, Settings,
    StudyPlan, SyncEntity,
};

fn record(date: &str, module: &str, total: u32, correct: u32, duration: &str) -> ExerciseRecord {
    ExerciseRecord::new(date, module, total, correct, duration)
}

#[test]
fn records_with_same_fields_are_duplicates_despite_ids() {
    let a = record("2024-01-01", "math", 20, 15, "25:00");
    let mut b = record("2024-01-01", "math", 20, 15, "25:00");
    b.created_at = None;

    assert_ne!(a.id, b.id);
    assert!(is_duplicate(&a, &b));
    assert!(is_duplicate(&b, &a));
}

#[test]
fn any_semantic_difference_breaks_duplicate() {
    let base = record("2024-01-01", "math", 20, 15, "25:00");
    let variants = [
        record("2024-01-02", "math", 20, 15, "25:00"),
        record("2024-01-01", "verbal", 20, 15, "25:00"),
        record("2024-01-01", "math", 21, 15, "25:00"),
        record("2024-01-01", "math", 20, 14, "25:00"),
        record("2024-01-01", "math", 20, 15, "25:01"),
    ];
    for v in &variants {
        assert!(!is_duplicate(&base, v), "{v:?}");
        assert_eq!(is_duplicate(&base, v), is_duplicate(v, &base));
    }
}

#[test]
fn knowledge_ignores_presentation_flags() {
    let mut a = KnowledgeItem::new("verbal", "idiom", "a stitch in time", "2024-03-01");
    let mut b = a.clone();
    b.id = "other".into();
    b.pinned = true;
    b.favorite = true;
    b.updated_at = Some(chrono::Utc::now());
    assert!(is_duplicate(&a, &b));

    a.image_path = Some("img/1.png".into());
    assert!(!is_duplicate(&a, &b));
}

#[test]
fn absent_optional_field_equals_empty_string() {
    let a = KnowledgeItem::new("verbal", "idiom", "note", "2024-03-01");
    let mut b = a.clone();
    b.sub_category = Some(String::new());
    b.source = Some(String::new());
    assert!(is_duplicate(&a, &b));
}

#[test]
fn plan_change_is_detected_for_shared_id() {
    let a = StudyPlan::new("Algebra", "math", "weekly", "2024-01-01", "2024-01-31", 100.0);
    let mut b = a.clone();
    assert!(!has_changes(&a, &b));

    b.progress = 40.0;
    assert!(has_changes(&a, &b));
    assert!(has_changes(&b, &a));
}

#[test]
fn merge_keeps_only_unsynced_local_items() {
    let uploaded = record("2024-01-01", "math", 20, 15, "25:00");
    let pending = record("2024-01-02", "math", 20, 12, "30:00");
    let mut stale = record("2024-01-03", "math", 20, 10, "31:00");
    stale.mark_synced("gone-remotely".into());

    let mut remote_copy = uploaded.clone();
    remote_copy.mark_synced("r-1".into());

    let local = DataSnapshot {
        records: vec![uploaded, pending.clone(), stale],
        settings: Some(Settings::new().with("theme", "dark")),
        ..Default::default()
    };
    let remote = DataSnapshot {
        records: vec![remote_copy],
        ..Default::default()
    };

    let merged = merge_remote(&local, remote);
    let ids: Vec<&str> = merged.records.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["r-1", pending.id.as_str()]);
    assert_eq!(merged.settings.unwrap().get("theme").unwrap(), "dark");
}

#[test]
fn merge_keeps_unpushed_edits_to_synced_items() {
    let mut stored = StudyPlan::new("Spring", "math", "weekly", "2024-03-01", "2024-03-31", 100.0);
    stored.mark_synced("p-1".into());
    let mut edited = stored.clone();
    edited.progress = 15.0;

    let local = DataSnapshot {
        plans: vec![edited],
        ..Default::default()
    };
    let remote = DataSnapshot {
        plans: vec![stored],
        ..Default::default()
    };

    let merged = merge_remote(&local, remote);
    assert_eq!(merged.plans.len(), 1);
    assert_eq!(merged.plans[0].id, "p-1");
    assert_eq!(merged.plans[0].progress, 15.0);
}
