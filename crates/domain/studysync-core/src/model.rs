use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    ExerciseRecord,
    StudyPlan,
    KnowledgeItem,
    Settings,
}

impl EntityKind {
    /// Short plural label used in logs, progress and summaries.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::ExerciseRecord => "records",
            EntityKind::StudyPlan => "plans",
            EntityKind::KnowledgeItem => "knowledge",
            EntityKind::Settings => "settings",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where an entity's identifier came from.
///
/// `Local` ids were minted on this device and have never been issued by the
/// remote store, so they must not be targeted by remote updates or deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityOrigin {
    Local,
    Synced,
}

impl EntityOrigin {
    /// Best-effort guess for snapshots written before origins were tracked.
    /// Only UUID-shaped ids can have come from the remote store.
    pub fn infer(id: &str) -> Self {
        if is_uuid(id) {
            EntityOrigin::Synced
        } else {
            EntityOrigin::Local
        }
    }
}

pub fn is_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

/// A single semantic field value, borrowed from the entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Int(i64),
    Num(f64),
}

impl FieldValue<'_> {
    pub fn to_json(self) -> serde_json::Value {
        match self {
            FieldValue::Text(s) => serde_json::Value::from(s),
            FieldValue::Int(i) => serde_json::Value::from(i),
            FieldValue::Num(n) => serde_json::Value::from(n),
        }
    }
}

/// Common surface of the three deduplicated entity kinds.
pub trait SyncEntity:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: EntityKind;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    fn origin(&self) -> EntityOrigin;

    fn set_origin(&mut self, origin: EntityOrigin);

    fn created_at(&self) -> Option<DateTime<Utc>>;

    /// The `YYYY-MM-DD` date most relevant for ordering, if the kind has one.
    fn date(&self) -> &str;

    /// Meaning-bearing fields in a fixed order. Absent optional fields are
    /// reported as empty text so they compare equal to an explicit `""`.
    fn semantic_fields(&self) -> Vec<(&'static str, FieldValue<'_>)>;

    /// Re-stamp the entity with the identifier its remote counterpart holds.
    fn mark_synced(&mut self, remote_id: String) {
        self.set_id(remote_id);
        self.set_origin(EntityOrigin::Synced);
    }

    /// Semantic fields as a JSON object, used as the body of partial updates.
    fn patch_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        self.semantic_fields()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect()
    }
}

fn text(opt: &Option<String>) -> FieldValue<'_> {
    FieldValue::Text(opt.as_deref().unwrap_or(""))
}

fn new_local_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub correct: u32,
    #[serde(default)]
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<EntityOrigin>,
}

impl ExerciseRecord {
    pub fn new(
        date: impl Into<String>,
        module: impl Into<String>,
        total: u32,
        correct: u32,
        duration: impl Into<String>,
    ) -> Self {
        Self {
            id: new_local_id(),
            date: date.into(),
            module: module.into(),
            total,
            correct,
            duration: duration.into(),
            created_at: Some(Utc::now()),
            updated_at: None,
            origin: Some(EntityOrigin::Local),
        }
    }
}

impl SyncEntity for ExerciseRecord {
    const KIND: EntityKind = EntityKind::ExerciseRecord;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn origin(&self) -> EntityOrigin {
        self.origin.unwrap_or_else(|| EntityOrigin::infer(&self.id))
    }

    fn set_origin(&mut self, origin: EntityOrigin) {
        self.origin = Some(origin);
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn date(&self) -> &str {
        &self.date
    }

    fn semantic_fields(&self) -> Vec<(&'static str, FieldValue<'_>)> {
        vec![
            ("date", FieldValue::Text(&self.date)),
            ("module", FieldValue::Text(&self.module)),
            ("total", FieldValue::Int(self.total.into())),
            ("correct", FieldValue::Int(self.correct.into())),
            ("duration", FieldValue::Text(&self.duration)),
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlan {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub module: String,
    #[serde(default, rename = "type")]
    pub plan_type: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub target: f64,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<EntityOrigin>,
}

impl StudyPlan {
    pub fn new(
        name: impl Into<String>,
        module: impl Into<String>,
        plan_type: impl Into<String>,
        start_date: impl Into<String>,
        end_date: impl Into<String>,
        target: f64,
    ) -> Self {
        Self {
            id: new_local_id(),
            name: name.into(),
            module: module.into(),
            plan_type: plan_type.into(),
            start_date: start_date.into(),
            end_date: end_date.into(),
            target,
            progress: 0.0,
            status: "active".to_string(),
            description: None,
            created_at: Some(Utc::now()),
            updated_at: None,
            origin: Some(EntityOrigin::Local),
        }
    }
}

impl SyncEntity for StudyPlan {
    const KIND: EntityKind = EntityKind::StudyPlan;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn origin(&self) -> EntityOrigin {
        self.origin.unwrap_or_else(|| EntityOrigin::infer(&self.id))
    }

    fn set_origin(&mut self, origin: EntityOrigin) {
        self.origin = Some(origin);
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn date(&self) -> &str {
        &self.start_date
    }

    fn semantic_fields(&self) -> Vec<(&'static str, FieldValue<'_>)> {
        vec![
            ("name", FieldValue::Text(&self.name)),
            ("module", FieldValue::Text(&self.module)),
            ("type", FieldValue::Text(&self.plan_type)),
            ("startDate", FieldValue::Text(&self.start_date)),
            ("endDate", FieldValue::Text(&self.end_date)),
            ("target", FieldValue::Num(self.target)),
            ("progress", FieldValue::Num(self.progress)),
            ("status", FieldValue::Text(&self.status)),
            ("description", text(&self.description)),
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub module: String,
    #[serde(default, rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<EntityOrigin>,
}

impl KnowledgeItem {
    pub fn new(
        module: impl Into<String>,
        item_type: impl Into<String>,
        note: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            id: new_local_id(),
            module: module.into(),
            item_type: item_type.into(),
            note: note.into(),
            sub_category: None,
            date: date.into(),
            source: None,
            image_path: None,
            pinned: false,
            favorite: false,
            created_at: Some(Utc::now()),
            updated_at: None,
            origin: Some(EntityOrigin::Local),
        }
    }
}

impl SyncEntity for KnowledgeItem {
    const KIND: EntityKind = EntityKind::KnowledgeItem;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn origin(&self) -> EntityOrigin {
        self.origin.unwrap_or_else(|| EntityOrigin::infer(&self.id))
    }

    fn set_origin(&mut self, origin: EntityOrigin) {
        self.origin = Some(origin);
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn date(&self) -> &str {
        &self.date
    }

    fn semantic_fields(&self) -> Vec<(&'static str, FieldValue<'_>)> {
        vec![
            ("module", FieldValue::Text(&self.module)),
            ("type", FieldValue::Text(&self.item_type)),
            ("note", FieldValue::Text(&self.note)),
            ("subCategory", text(&self.sub_category)),
            ("date", FieldValue::Text(&self.date)),
            ("source", text(&self.source)),
            ("imagePath", text(&self.image_path)),
        ]
    }
}

/// User settings: one flat document per user, always replaced as a whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Settings(pub BTreeMap<String, serde_json::Value>);

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Full content of one side (local or remote) at a point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataSnapshot {
    #[serde(default)]
    pub records: Vec<ExerciseRecord>,
    #[serde(default)]
    pub plans: Vec<StudyPlan>,
    #[serde(default)]
    pub knowledge: Vec<KnowledgeItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
}

impl DataSnapshot {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
            && self.plans.is_empty()
            && self.knowledge.is_empty()
            && self.settings.is_none()
    }
}
