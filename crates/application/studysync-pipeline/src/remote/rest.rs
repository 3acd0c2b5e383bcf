//! Remote Data Service over a PostgREST-style HTTP API.
//!
//! Documents are camelCase in memory and snake_case on the wire; every row
//! carries a `user_id` column that scopes list and bulk delete.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use studysync_config::{KNOWLEDGE_TABLE, PLANS_TABLE, RECORDS_TABLE, SETTINGS_TABLE};
use studysync_core::model::is_uuid;
use studysync_core::{
    EntityOrigin, ExerciseRecord, KnowledgeItem, Settings, StudyPlan, SyncEntity,
};
use studysync_infra::keys::{rename_keys, to_camel, to_snake};
use studysync_infra::{Filter, PostgrestClient};
use tracing::debug;

use super::{RemoteCollection, RemoteDataService, SettingsStore, UserId};
use crate::error::RemoteError;

const USER_COLUMN: &str = "user_id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub records: String,
    pub plans: String,
    pub knowledge: String,
    pub settings: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            records: RECORDS_TABLE.to_string(),
            plans: PLANS_TABLE.to_string(),
            knowledge: KNOWLEDGE_TABLE.to_string(),
            settings: SETTINGS_TABLE.to_string(),
        }
    }
}

fn decode_err(e: serde_json::Error) -> RemoteError {
    RemoteError::Decode(e.to_string())
}

/// Local identifiers never reach the server; it assigns its own.
fn to_row<T: SyncEntity>(user: &str, item: &T) -> Result<Value, RemoteError> {
    let Value::Object(mut doc) = serde_json::to_value(item).map_err(decode_err)? else {
        return Err(RemoteError::Decode(format!("{} is not an object", T::KIND)));
    };
    doc.remove("origin");
    if !is_uuid(item.id()) {
        doc.remove("id");
    }
    let mut row = rename_keys(doc, to_snake);
    row.insert(USER_COLUMN.to_string(), Value::from(user));
    Ok(Value::Object(row))
}

fn from_row<T: SyncEntity>(row: Value) -> Result<T, RemoteError> {
    let Value::Object(mut row) = row else {
        return Err(RemoteError::Decode(format!("{} row is not an object", T::KIND)));
    };
    row.remove(USER_COLUMN);
    let mut item: T =
        serde_json::from_value(Value::Object(rename_keys(row, to_camel))).map_err(decode_err)?;
    item.set_origin(EntityOrigin::Synced);
    Ok(item)
}

fn from_rows<T: SyncEntity>(rows: Vec<Value>) -> Result<Vec<T>, RemoteError> {
    rows.into_iter().map(from_row).collect()
}

pub struct RestCollection<T> {
    http: Arc<PostgrestClient>,
    table: String,
    _kind: PhantomData<fn() -> T>,
}

impl<T> RestCollection<T> {
    fn new(http: Arc<PostgrestClient>, table: String) -> Self {
        Self {
            http,
            table,
            _kind: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<T: SyncEntity> RemoteCollection<T> for RestCollection<T> {
    async fn list(&self, user: &str) -> Result<Vec<T>, RemoteError> {
        let rows = self
            .http
            .select(&self.table, &[Filter::eq(USER_COLUMN, user)])
            .await?;
        debug!(table = %self.table, rows = rows.len(), "listed");
        from_rows(rows)
    }

    async fn batch_insert(&self, user: &str, items: &[T]) -> Result<Vec<T>, RemoteError> {
        let rows = items
            .iter()
            .map(|item| to_row(user, item))
            .collect::<Result<Vec<_>, _>>()?;
        from_rows(self.http.insert(&self.table, &rows).await?)
    }

    async fn insert_one(&self, user: &str, item: &T) -> Result<T, RemoteError> {
        let row = to_row(user, item)?;
        self.http
            .insert(&self.table, &[row])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Decode(format!("insert into {} returned no row", self.table)))
            .and_then(from_row)
    }

    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<T, RemoteError> {
        let mut body = rename_keys(fields, to_snake);
        body.insert("updated_at".into(), Value::from(Utc::now().to_rfc3339()));
        self.http
            .patch(&self.table, &[Filter::eq("id", id)], &Value::Object(body))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
            .and_then(from_row)
    }

    async fn delete_all(&self, user: &str) -> Result<(), RemoteError> {
        Ok(self
            .http
            .delete(&self.table, &[Filter::eq(USER_COLUMN, user)])
            .await?)
    }

    async fn delete_one(&self, id: &str) -> Result<(), RemoteError> {
        Ok(self.http.delete(&self.table, &[Filter::eq("id", id)]).await?)
    }
}

/// Settings live in a `settings` JSON column, one row per user.
pub struct RestSettings {
    http: Arc<PostgrestClient>,
    table: String,
}

#[async_trait::async_trait]
impl SettingsStore for RestSettings {
    async fn fetch(&self, user: &str) -> Result<Option<Settings>, RemoteError> {
        let rows = self
            .http
            .select(&self.table, &[Filter::eq(USER_COLUMN, user)])
            .await?;
        match rows.into_iter().next() {
            Some(mut row) => {
                let doc = row.get_mut("settings").map(Value::take).unwrap_or_default();
                if doc.is_null() {
                    return Ok(None);
                }
                serde_json::from_value(doc).map(Some).map_err(decode_err)
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, user: &str, settings: &Settings) -> Result<Settings, RemoteError> {
        let row = serde_json::json!({
            USER_COLUMN: user,
            "settings": settings,
            "updated_at": Utc::now().to_rfc3339(),
        });
        let stored = self.http.upsert(&self.table, &[row], USER_COLUMN).await?;
        match stored.into_iter().next().and_then(|mut r| r.get_mut("settings").map(Value::take)) {
            Some(doc) if !doc.is_null() => serde_json::from_value(doc).map_err(decode_err),
            _ => Ok(settings.clone()),
        }
    }

    async fn delete(&self, user: &str) -> Result<(), RemoteError> {
        Ok(self
            .http
            .delete(&self.table, &[Filter::eq(USER_COLUMN, user)])
            .await?)
    }
}

pub struct RestRemote {
    user: Option<UserId>,
    records: RestCollection<ExerciseRecord>,
    plans: RestCollection<StudyPlan>,
    knowledge: RestCollection<KnowledgeItem>,
    settings: RestSettings,
}

impl RestRemote {
    /// The user counts as signed in only when the client carries a session
    /// token.
    pub fn new(client: PostgrestClient, user: Option<UserId>, tables: TableNames) -> Self {
        let user = user.filter(|_| client.has_session());
        let http = Arc::new(client);
        Self {
            user,
            records: RestCollection::new(http.clone(), tables.records),
            plans: RestCollection::new(http.clone(), tables.plans),
            knowledge: RestCollection::new(http.clone(), tables.knowledge),
            settings: RestSettings {
                http,
                table: tables.settings,
            },
        }
    }
}

#[async_trait::async_trait]
impl RemoteDataService for RestRemote {
    async fn current_user(&self) -> Option<UserId> {
        self.user.clone()
    }

    fn records(&self) -> &dyn RemoteCollection<ExerciseRecord> {
        &self.records
    }

    fn plans(&self) -> &dyn RemoteCollection<StudyPlan> {
        &self.plans
    }

    fn knowledge(&self) -> &dyn RemoteCollection<KnowledgeItem> {
        &self.knowledge
    }

    fn settings(&self) -> &dyn SettingsStore {
        &self.settings
    }
}
