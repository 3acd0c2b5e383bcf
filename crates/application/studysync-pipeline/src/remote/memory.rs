//! In-process Remote Data Service used by tests and offline runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::{Map, Value};
use studysync_core::model::is_uuid;
use studysync_core::{
    EntityOrigin, ExerciseRecord, KnowledgeItem, Settings, StudyPlan, SyncEntity,
};
use uuid::Uuid;

use super::{RemoteCollection, RemoteDataService, SettingsStore, UserId};
use crate::error::RemoteError;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type RejectFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

struct Faults<T> {
    fail_list: bool,
    /// Successful `list` calls left before every later one fails.
    list_budget: Option<usize>,
    fail_batch: bool,
    fail_delete: bool,
    /// Leave the oldest row behind on `delete_all`, like a row hidden from
    /// the delete policy.
    partial_delete: bool,
    reject: Option<RejectFn<T>>,
}

impl<T> Default for Faults<T> {
    fn default() -> Self {
        Self {
            fail_list: false,
            list_budget: None,
            fail_batch: false,
            fail_delete: false,
            partial_delete: false,
            reject: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct CallCounts {
    pub list: AtomicUsize,
    pub batch_insert: AtomicUsize,
    pub insert_one: AtomicUsize,
    pub update: AtomicUsize,
    pub delete_all: AtomicUsize,
    pub delete_one: AtomicUsize,
}

impl CallCounts {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// One table: rows tagged with their owner.
pub struct MemoryCollection<T> {
    rows: Mutex<Vec<(UserId, T)>>,
    faults: Mutex<Faults<T>>,
    pub calls: CallCounts,
}

impl<T> Default for MemoryCollection<T> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
            calls: CallCounts::default(),
        }
    }
}

impl<T: SyncEntity> MemoryCollection<T> {
    /// Place rows directly, bypassing fault injection. Ids are kept as given.
    pub fn seed(&self, user: &str, items: impl IntoIterator<Item = T>) {
        let mut rows = lock(&self.rows);
        for mut item in items {
            item.set_origin(EntityOrigin::Synced);
            rows.push((user.to_string(), item));
        }
    }

    pub fn rows_for(&self, user: &str) -> Vec<T> {
        lock(&self.rows)
            .iter()
            .filter(|(owner, _)| owner == user)
            .map(|(_, item)| item.clone())
            .collect()
    }

    pub fn fail_list(&self, on: bool) {
        lock(&self.faults).fail_list = on;
    }

    pub fn fail_list_after(&self, ok_calls: usize) {
        lock(&self.faults).list_budget = Some(ok_calls);
    }

    pub fn fail_batch_insert(&self, on: bool) {
        lock(&self.faults).fail_batch = on;
    }

    pub fn fail_delete(&self, on: bool) {
        lock(&self.faults).fail_delete = on;
    }

    pub fn partial_delete(&self, on: bool) {
        lock(&self.faults).partial_delete = on;
    }

    /// Reject any insert of an item matching `pred`, as a constraint would.
    pub fn reject_when(&self, pred: impl Fn(&T) -> bool + Send + Sync + 'static) {
        lock(&self.faults).reject = Some(Arc::new(pred));
    }

    fn check_rejected(&self, item: &T) -> Result<(), RemoteError> {
        let reject = lock(&self.faults).reject.clone();
        match reject {
            Some(pred) if pred(item) => Err(RemoteError::Rejected(format!(
                "{} {} violates a table constraint",
                T::KIND,
                item.id()
            ))),
            _ => Ok(()),
        }
    }

    fn persist(rows: &mut Vec<(UserId, T)>, user: &str, item: &T) -> T {
        let mut stored = item.clone();
        let id_taken = rows.iter().any(|(_, r)| r.id() == item.id());
        if !is_uuid(item.id()) || id_taken {
            stored.set_id(Uuid::new_v4().to_string());
        }
        stored.set_origin(EntityOrigin::Synced);
        rows.push((user.to_string(), stored.clone()));
        stored
    }
}

#[async_trait::async_trait]
impl<T: SyncEntity> RemoteCollection<T> for MemoryCollection<T> {
    async fn list(&self, user: &str) -> Result<Vec<T>, RemoteError> {
        CallCounts::bump(&self.calls.list);
        let failing = {
            let mut faults = lock(&self.faults);
            match faults.list_budget.as_mut() {
                Some(0) => true,
                Some(left) => {
                    *left -= 1;
                    faults.fail_list
                }
                None => faults.fail_list,
            }
        };
        if failing {
            return Err(RemoteError::Transport(format!("list {} failed", T::KIND)));
        }
        Ok(self.rows_for(user))
    }

    async fn batch_insert(&self, user: &str, items: &[T]) -> Result<Vec<T>, RemoteError> {
        CallCounts::bump(&self.calls.batch_insert);
        if lock(&self.faults).fail_batch {
            return Err(RemoteError::Transport(format!(
                "batch insert of {} {} failed",
                items.len(),
                T::KIND
            )));
        }
        // The whole batch is rejected when any row is.
        for item in items {
            self.check_rejected(item)?;
        }
        let mut rows = lock(&self.rows);
        Ok(items
            .iter()
            .map(|item| Self::persist(&mut rows, user, item))
            .collect())
    }

    async fn insert_one(&self, user: &str, item: &T) -> Result<T, RemoteError> {
        CallCounts::bump(&self.calls.insert_one);
        self.check_rejected(item)?;
        let mut rows = lock(&self.rows);
        Ok(Self::persist(&mut rows, user, item))
    }

    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<T, RemoteError> {
        CallCounts::bump(&self.calls.update);
        let mut rows = lock(&self.rows);
        let slot = rows
            .iter_mut()
            .find(|(_, r)| r.id() == id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;

        let mut doc = serde_json::to_value(&slot.1)
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        if let Value::Object(obj) = &mut doc {
            obj.extend(fields);
            obj.insert("updatedAt".into(), Value::from(Utc::now().to_rfc3339()));
        }
        let updated: T =
            serde_json::from_value(doc).map_err(|e| RemoteError::Decode(e.to_string()))?;
        slot.1 = updated.clone();
        Ok(updated)
    }

    async fn delete_all(&self, user: &str) -> Result<(), RemoteError> {
        CallCounts::bump(&self.calls.delete_all);
        let faults = lock(&self.faults);
        if faults.fail_delete {
            return Err(RemoteError::Rejected(format!(
                "permission denied for {}",
                T::KIND
            )));
        }
        let partial = faults.partial_delete;
        drop(faults);

        let mut rows = lock(&self.rows);
        let keep = if partial {
            rows.iter().position(|(owner, _)| owner == user)
        } else {
            None
        };
        let mut idx = 0;
        rows.retain(|(owner, _)| {
            let retain = owner != user || Some(idx) == keep;
            idx += 1;
            retain
        });
        Ok(())
    }

    async fn delete_one(&self, id: &str) -> Result<(), RemoteError> {
        CallCounts::bump(&self.calls.delete_one);
        if lock(&self.faults).fail_delete {
            return Err(RemoteError::Rejected(format!("cannot delete {id}")));
        }
        let mut rows = lock(&self.rows);
        let before = rows.len();
        rows.retain(|(_, r)| r.id() != id);
        if rows.len() == before {
            return Err(RemoteError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySettings {
    docs: Mutex<HashMap<UserId, Settings>>,
    fail_upsert: Mutex<bool>,
    fail_delete: Mutex<bool>,
}

impl MemorySettings {
    pub fn seed(&self, user: &str, settings: Settings) {
        lock(&self.docs).insert(user.to_string(), settings);
    }

    pub fn get(&self, user: &str) -> Option<Settings> {
        lock(&self.docs).get(user).cloned()
    }

    pub fn fail_upsert(&self, on: bool) {
        *lock(&self.fail_upsert) = on;
    }

    pub fn fail_delete(&self, on: bool) {
        *lock(&self.fail_delete) = on;
    }
}

#[async_trait::async_trait]
impl SettingsStore for MemorySettings {
    async fn fetch(&self, user: &str) -> Result<Option<Settings>, RemoteError> {
        Ok(self.get(user))
    }

    async fn upsert(&self, user: &str, settings: &Settings) -> Result<Settings, RemoteError> {
        if *lock(&self.fail_upsert) {
            return Err(RemoteError::Transport("settings upsert failed".into()));
        }
        lock(&self.docs).insert(user.to_string(), settings.clone());
        Ok(settings.clone())
    }

    async fn delete(&self, user: &str) -> Result<(), RemoteError> {
        if *lock(&self.fail_delete) {
            return Err(RemoteError::Rejected("permission denied for settings".into()));
        }
        lock(&self.docs).remove(user);
        Ok(())
    }
}

/// Thread-safe in-memory backend with per-table fault injection.
#[derive(Default)]
pub struct InMemoryRemote {
    user: Mutex<Option<UserId>>,
    pub records: MemoryCollection<ExerciseRecord>,
    pub plans: MemoryCollection<StudyPlan>,
    pub knowledge: MemoryCollection<KnowledgeItem>,
    pub settings: MemorySettings,
}

impl InMemoryRemote {
    pub fn new(user: impl Into<UserId>) -> Self {
        let remote = Self::default();
        remote.sign_in(user);
        remote
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user: impl Into<UserId>) {
        *lock(&self.user) = Some(user.into());
    }

    pub fn sign_out(&self) {
        *lock(&self.user) = None;
    }
}

#[async_trait::async_trait]
impl RemoteDataService for InMemoryRemote {
    async fn current_user(&self) -> Option<UserId> {
        lock(&self.user).clone()
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
