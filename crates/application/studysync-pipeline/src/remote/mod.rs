use serde_json::{Map, Value};
use studysync_core::{ExerciseRecord, KnowledgeItem, Settings, StudyPlan, SyncEntity};

use crate::error::RemoteError;

pub mod memory;
pub mod rest;

pub type UserId = String;

/// CRUD surface of one remote table, scoped to the signed-in user.
#[async_trait::async_trait]
pub trait RemoteCollection<T: SyncEntity>: Send + Sync {
    async fn list(&self, user: &str) -> Result<Vec<T>, RemoteError>;

    /// Insert all items in one request. Returns the persisted rows in input
    /// order, possibly carrying server-assigned identifiers.
    async fn batch_insert(&self, user: &str, items: &[T]) -> Result<Vec<T>, RemoteError>;

    async fn insert_one(&self, user: &str, item: &T) -> Result<T, RemoteError>;

    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<T, RemoteError>;

    async fn delete_all(&self, user: &str) -> Result<(), RemoteError>;

    async fn delete_one(&self, id: &str) -> Result<(), RemoteError>;
}

/// The single settings document per user.
#[async_trait::async_trait]
pub trait SettingsStore: Send + Sync {
    async fn fetch(&self, user: &str) -> Result<Option<Settings>, RemoteError>;

    async fn upsert(&self, user: &str, settings: &Settings) -> Result<Settings, RemoteError>;

    async fn delete(&self, user: &str) -> Result<(), RemoteError>;
}

#[async_trait::async_trait]
pub trait RemoteDataService: Send + Sync {
    /// The authenticated user, if any.
    async fn current_user(&self) -> Option<UserId>;

    fn records(&self) -> &dyn RemoteCollection<ExerciseRecord>;

    fn plans(&self) -> &dyn RemoteCollection<StudyPlan>;

    fn knowledge(&self) -> &dyn RemoteCollection<KnowledgeItem>;

    fn settings(&self) -> &dyn SettingsStore;
}

/// Resolves the collection that stores a given entity kind.
pub trait RemoteKind: SyncEntity {
    fn collection(service: &dyn RemoteDataService) -> &dyn RemoteCollection<Self>;
}

impl RemoteKind for ExerciseRecord {
    fn collection(service: &dyn RemoteDataService) -> &dyn RemoteCollection<Self> {
        service.records()
    }
}

impl RemoteKind for StudyPlan {
    fn collection(service: &dyn RemoteDataService) -> &dyn RemoteCollection<Self> {
        service.plans()
    }
}

impl RemoteKind for KnowledgeItem {
    fn collection(service: &dyn RemoteDataService) -> &dyn RemoteCollection<Self> {
        service.knowledge()
    }
}
