use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::{json, Value};
use studysync_core::{DataSnapshot, ExerciseRecord, KnowledgeItem, Settings, SyncAction};
use studysync_infra::{PostgrestClient, PostgrestConfig};
use studysync_pipeline::{
    RemoteCollection, RemoteDataService, RemoteError, RestRemote, SyncEngine, TableNames,
    NOT_AUTHENTICATED,
};

// --- Fake PostgREST server ---

#[derive(Default)]
struct Db {
    tables: HashMap<String, Vec<Value>>,
    next_id: u64,
    requests: Vec<(Method, String, Option<String>)>,
}

type Shared = Arc<Mutex<Db>>;

fn eq_filter(query: &HashMap<String, String>) -> Option<(String, String)> {
    query
        .iter()
        .filter(|(k, _)| k.as_str() != "select" && k.as_str() != "on_conflict")
        .find_map(|(k, v)| v.strip_prefix("eq.").map(|val| (k.clone(), val.to_string())))
}

fn matches(row: &Value, filter: &Option<(String, String)>) -> bool {
    match filter {
        Some((col, val)) => row.get(col).and_then(Value::as_str) == Some(val.as_str()),
        None => true,
    }
}

async fn handle(
    State(db): State<Shared>,
    method: Method,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    let mut db = db.lock().unwrap();
    let prefer = headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    db.requests.push((method.clone(), table.clone(), prefer.clone()));

    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer token-1") {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "JWT expired"})));
    }

    let filter = eq_filter(&query);
    let body: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    match method {
        Method::GET => {
            let rows = db.tables.get(&table).cloned().unwrap_or_default();
            let rows: Vec<Value> = rows.into_iter().filter(|r| matches(r, &filter)).collect();
            (StatusCode::OK, Json(Value::Array(rows)))
        }
        Method::POST => {
            let incoming = body.as_array().cloned().unwrap_or_default();
            if incoming.iter().any(|r| r.get("note") == Some(&json!(""))) {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"message": "note must not be empty"})),
                );
            }
            let upsert = prefer.as_deref().is_some_and(|p| p.contains("merge-duplicates"));
            let mut stored = Vec::new();
            for mut row in incoming {
                if upsert {
                    let user = row["user_id"].clone();
                    db.tables
                        .entry(table.clone())
                        .or_default()
                        .retain(|r| r["user_id"] != user);
                } else if row.get("id").is_none() {
                    db.next_id += 1;
                    row["id"] = json!(format!("00000000-0000-4000-8000-{:012}", db.next_id));
                }
                db.tables.entry(table.clone()).or_default().push(row.clone());
                stored.push(row);
            }
            (StatusCode::CREATED, Json(Value::Array(stored)))
        }
        Method::PATCH => {
            let mut updated = Vec::new();
            for row in db.tables.entry(table).or_default().iter_mut() {
                if matches(row, &filter) {
                    if let (Value::Object(target), Value::Object(patch)) = (&mut *row, &body) {
                        target.extend(patch.clone());
                    }
                    updated.push(row.clone());
                }
            }
            (StatusCode::OK, Json(Value::Array(updated)))
        }
        Method::DELETE => {
            db.tables
                .entry(table)
                .or_default()
                .retain(|r| !matches(r, &filter));
            (StatusCode::NO_CONTENT, Json(Value::Null))
        }
        _ => (StatusCode::METHOD_NOT_ALLOWED, Json(Value::Null)),
    }
}

async fn start_server() -> (String, Shared) {
    let db = Shared::default();
    let app = Router::new()
        .route("/rest/v1/:table", any(handle))
        .with_state(db.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), db)
}

fn remote(endpoint: &str, token: &str) -> RestRemote {
    let client =
        PostgrestClient::new(PostgrestConfig::new(endpoint, "anon").with_token(token)).unwrap();
    RestRemote::new(client, Some("user-1".into()), TableNames::default())
}

fn local() -> DataSnapshot {
    let mut legacy = ExerciseRecord::new("2024-01-01", "math", 20, 15, "25:00");
    legacy.id = "1700000000000".into();
    DataSnapshot {
        records: vec![legacy, ExerciseRecord::new("2024-01-02", "math", 20, 17, "22:00")],
        knowledge: vec![
            KnowledgeItem::new("verbal", "idiom", "a fine idiom", "2024-02-01"),
            KnowledgeItem::new("verbal", "idiom", "", "2024-02-02"),
        ],
        settings: Some(Settings::new().with("theme", "dark")),
        ..Default::default()
    }
}

// --- Tests ---

#[tokio::test]
async fn upload_download_and_clear_over_http() {
    let (endpoint, db) = start_server().await;
    let engine = SyncEngine::new(Arc::new(remote(&endpoint, "token-1")));

    let up = engine.upload_to_cloud(&local(), None, None).await;
    assert_eq!(up.details.records.uploaded, 2);
    assert_eq!(up.details.knowledge.uploaded, 1);
    assert_eq!(up.details.knowledge.failed, 1);
    assert!(up.details.settings.uploaded);

    {
        let db = db.lock().unwrap();
        let records = &db.tables["exercise_records"];
        assert!(records.iter().all(|r| r["user_id"] == "user-1"));
        assert!(records.iter().all(|r| r.get("origin").is_none()));
        assert!(records.iter().all(|r| r["id"] != "1700000000000"));
        assert!(db
            .requests
            .iter()
            .any(|(m, t, p)| *m == Method::POST
                && t == "user_settings"
                && p.as_deref().is_some_and(|p| p.contains("merge-duplicates"))));
    }

    let again = engine.upload_to_cloud(&local(), None, None).await;
    assert_eq!(again.details.records.uploaded, 0);
    assert_eq!(again.details.records.skipped, 2);

    let down = engine.download_from_cloud(None).await;
    let data = down.data.unwrap();
    assert_eq!(data.records.len(), 2);
    assert_eq!(data.knowledge.len(), 1);
    assert_eq!(data.settings.unwrap().get("theme").unwrap(), "dark");

    let cleared = engine.clear_cloud_data(None).await;
    assert!(cleared.success, "{}", cleared.message);
    assert_eq!(cleared.cleared_count.records, 2);
    assert!(cleared.cleared_count.settings);
}

#[tokio::test]
async fn synced_update_is_patched_by_id() {
    let (endpoint, _db) = start_server().await;
    let engine = SyncEngine::new(Arc::new(remote(&endpoint, "token-1")));
    engine
        .upload_to_cloud(
            &DataSnapshot {
                knowledge: vec![KnowledgeItem::new("math", "formula", "area", "2024-01-01")],
                ..Default::default()
            },
            None,
            None,
        )
        .await;

    let down = engine.download_from_cloud(None).await;
    let mut item = down.data.unwrap().knowledge.remove(0);
    item.pinned = true;
    let outcome = engine.update_knowledge(&item).await;

    assert_eq!(outcome.action, SyncAction::Updated, "{:?}", outcome.reason);
    assert_eq!(outcome.remote_id.as_deref(), Some(item.id.as_str()));
}

#[tokio::test]
async fn expired_session_maps_to_not_authenticated() {
    let (endpoint, _db) = start_server().await;
    let rest = remote(&endpoint, "stale");

    let err = rest
        .records()
        .list("user-1")
        .await
        .unwrap_err();
    assert_eq!(err, RemoteError::NotAuthenticated);

    // List failures are tolerated, so upload proceeds and fails per item.
    let engine = SyncEngine::new(Arc::new(rest));
    let result = engine.upload_to_cloud(&local(), None, None).await;
    assert!(!result.success);
    assert_eq!(result.details.records.failed, 2);
}

#[tokio::test]
async fn missing_session_is_signed_out() {
    let client = PostgrestClient::new(PostgrestConfig::new("http://127.0.0.1:9", "anon")).unwrap();
    let engine = SyncEngine::new(Arc::new(RestRemote::new(
        client,
        Some("user-1".into()),
        TableNames::default(),
    )));

    let result = engine.upload_to_cloud(&local(), None, None).await;
    assert_eq!(result.message, NOT_AUTHENTICATED);
}
