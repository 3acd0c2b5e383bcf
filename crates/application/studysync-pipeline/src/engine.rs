use std::sync::Arc;

use studysync_config::{
    CLEAR_PHASES, DOWNLOAD_PHASES, OVERVIEW_RECENT_LIMIT, UPLOAD_PHASES,
};
use studysync_core::plan::REASON_LOCAL_ID_NO_UPDATE;
use studysync_core::{
    plan, ClearResult, ClearedCount, CloudOverview, DataSnapshot, EntityOrigin, KindOverview,
    PlanOptions, SyncEntity, SyncReport, SyncReportItem, SyncResult,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RemoteError;
use crate::inserter::{BatchInserter, Inserter, SequentialInserter, WithFallback};
use crate::progress::{PhaseReporter, ProgressSink, SyncStage};
use crate::remote::{RemoteCollection, RemoteDataService, RemoteKind};

pub const NOT_AUTHENTICATED: &str = "user not authenticated";

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub plan: PlanOptions,
    /// Retry a refused knowledge batch one item at a time.
    pub knowledge_fallback: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            plan: PlanOptions::default(),
            knowledge_fallback: true,
        }
    }
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(|t| t.is_cancelled())
}

/// Drives upload, download, full sync and clear against a Remote Data Service.
///
/// Kinds are processed one after another so progress stays ordered. Every
/// public operation returns a structured outcome; collaborator errors end up
/// in its message or report.
pub struct SyncEngine {
    remote: Arc<dyn RemoteDataService>,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn RemoteDataService>) -> Self {
        Self::with_options(remote, SyncOptions::default())
    }

    pub fn with_options(remote: Arc<dyn RemoteDataService>, options: SyncOptions) -> Self {
        Self { remote, options }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn remote(&self) -> &Arc<dyn RemoteDataService> {
        &self.remote
    }

    async fn list_or_empty<T: SyncEntity>(
        &self,
        collection: &dyn RemoteCollection<T>,
        user: &str,
    ) -> Vec<T> {
        match collection.list(user).await {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    kind = %T::KIND,
                    transient = e.is_transient(),
                    "fetching remote {} failed, treating as empty: {e}",
                    T::KIND
                );
                Vec::new()
            }
        }
    }

    async fn count<T: SyncEntity>(
        &self,
        collection: &dyn RemoteCollection<T>,
        user: &str,
    ) -> Result<usize, RemoteError> {
        collection.list(user).await.map(|items| items.len())
    }

    pub async fn upload_to_cloud(
        &self,
        local: &DataSnapshot,
        on_progress: Option<ProgressSink<'_>>,
        cancel: Option<&CancellationToken>,
    ) -> SyncResult {
        let progress = PhaseReporter::new(on_progress, UPLOAD_PHASES);
        let Some(user) = self.remote.current_user().await else {
            warn!("upload refused: {NOT_AUTHENTICATED}");
            return SyncResult::fatal(NOT_AUTHENTICATED);
        };
        info!(
            records = local.records.len(),
            plans = local.plans.len(),
            knowledge = local.knowledge.len(),
            "starting upload"
        );

        let mut report = SyncReport::default();
        let cancelled = |report: SyncReport, settings: bool| {
            info!("upload cancelled");
            progress.phase(UPLOAD_PHASES, SyncStage::Cancelled, "cancelled");
            SyncResult::cancelled(report, settings)
        };

        progress.phase(0, SyncStage::Checking, "remote data");
        if is_cancelled(cancel) {
            return cancelled(report, false);
        }
        let remote_records = self.list_or_empty(self.remote.records(), &user).await;
        let remote_plans = self.list_or_empty(self.remote.plans(), &user).await;
        let remote_knowledge = self.list_or_empty(self.remote.knowledge(), &user).await;

        if is_cancelled(cancel) {
            return cancelled(report, false);
        }
        progress.phase(1, SyncStage::UploadingRecords, "exercise records");
        report.records = self
            .upload_kind(self.remote.records(), &user, &local.records, &remote_records, false)
            .await;

        if is_cancelled(cancel) {
            return cancelled(report, false);
        }
        progress.phase(2, SyncStage::UploadingPlans, "study plans");
        report.plans = self
            .upload_kind(self.remote.plans(), &user, &local.plans, &remote_plans, false)
            .await;

        if is_cancelled(cancel) {
            return cancelled(report, false);
        }
        progress.phase(3, SyncStage::UploadingKnowledge, "knowledge items");
        report.knowledge = self
            .upload_kind(
                self.remote.knowledge(),
                &user,
                &local.knowledge,
                &remote_knowledge,
                self.options.knowledge_fallback,
            )
            .await;

        if is_cancelled(cancel) {
            return cancelled(report, false);
        }
        progress.phase(4, SyncStage::UploadingSettings, "settings");
        let mut settings_error = None;
        let settings_uploaded = match &local.settings {
            Some(settings) => match self.remote.settings().upsert(&user, settings).await {
                Ok(_) => true,
                Err(e) => {
                    warn!("settings upload failed: {e}");
                    settings_error = Some(e);
                    false
                }
            },
            None => false,
        };

        progress.phase(UPLOAD_PHASES, SyncStage::Complete, "done");
        let mut result = SyncResult::from_upload(report, settings_uploaded);
        if let Some(e) = settings_error {
            result.success = false;
            result.message.push_str(&format!("; settings upload failed: {e}"));
        }
        info!(success = result.success, "{}", result.message);
        result
    }

    async fn upload_kind<T: SyncEntity>(
        &self,
        collection: &dyn RemoteCollection<T>,
        user: &str,
        local: &[T],
        remote: &[T],
        fallback: bool,
    ) -> Vec<SyncReportItem<T>> {
        let planned = plan(local, remote, &self.options.plan);
        let mut report = planned.report;

        if !planned.to_upload.is_empty() {
            let inserter: Box<dyn Inserter<T> + '_> = if fallback {
                Box::new(WithFallback::new(
                    BatchInserter::new(collection),
                    SequentialInserter::new(collection),
                ))
            } else {
                Box::new(BatchInserter::new(collection))
            };
            match inserter.insert(user, planned.to_upload).await {
                Ok(items) => report.extend(items),
                Err(failure) => {
                    warn!(
                        kind = %T::KIND,
                        count = failure.items.len(),
                        "batch insert failed: {}",
                        failure.error
                    );
                    report.extend(failure.into_report());
                }
            }
        }

        for item in planned.to_update {
            report.push(apply_update(collection, item).await);
        }

        debug!(kind = %T::KIND, settled = report.len(), "kind uploaded");
        report
    }

    pub async fn download_from_cloud(&self, on_progress: Option<ProgressSink<'_>>) -> SyncResult {
        let progress = PhaseReporter::new(on_progress, DOWNLOAD_PHASES);
        let Some(user) = self.remote.current_user().await else {
            warn!("download refused: {NOT_AUTHENTICATED}");
            return SyncResult::fatal(NOT_AUTHENTICATED);
        };
        info!("starting download");

        progress.phase(1, SyncStage::Downloading, "exercise records");
        let records = self.list_or_empty(self.remote.records(), &user).await;
        progress.phase(2, SyncStage::Downloading, "study plans");
        let plans = self.list_or_empty(self.remote.plans(), &user).await;
        progress.phase(3, SyncStage::Downloading, "knowledge items");
        let knowledge = self.list_or_empty(self.remote.knowledge(), &user).await;
        progress.phase(4, SyncStage::Downloading, "settings");
        let settings = match self.remote.settings().fetch(&user).await {
            Ok(s) => s,
            Err(e) => {
                warn!("fetching remote settings failed, treating as absent: {e}");
                None
            }
        };
        progress.phase(DOWNLOAD_PHASES, SyncStage::Complete, "done");

        let result = SyncResult::from_download(DataSnapshot {
            records,
            plans,
            knowledge,
            settings,
        });
        info!("{}", result.message);
        result
    }

    /// Upload, then download. Succeeds only when both halves do.
    pub async fn sync_data(
        &self,
        local: &DataSnapshot,
        on_progress: Option<ProgressSink<'_>>,
        cancel: Option<&CancellationToken>,
    ) -> SyncResult {
        let upload = self.upload_to_cloud(local, on_progress, cancel).await;
        if upload.cancelled || upload.fatal {
            return upload;
        }
        let download = self.download_from_cloud(on_progress).await;
        SyncResult::compose(upload, download)
    }

    pub async fn cloud_overview(&self) -> CloudOverview {
        let Some(user) = self.remote.current_user().await else {
            return CloudOverview::default();
        };
        let (records, plans, knowledge, settings) = futures::join!(
            self.remote.records().list(&user),
            self.remote.plans().list(&user),
            self.remote.knowledge().list(&user),
            self.remote.settings().fetch(&user),
        );
        CloudOverview {
            records: overview_of(records),
            plans: overview_of(plans),
            knowledge: overview_of(knowledge),
            has_settings: matches!(settings, Ok(Some(_))),
        }
    }

    /// Delete every row the user owns, kind by kind, then re-read to verify.
    /// Kinds already deleted stay deleted when a later kind fails.
    pub async fn clear_cloud_data(&self, on_progress: Option<ProgressSink<'_>>) -> ClearResult {
        let progress = PhaseReporter::new(on_progress, CLEAR_PHASES);
        let Some(user) = self.remote.current_user().await else {
            return ClearResult {
                success: false,
                message: NOT_AUTHENTICATED.to_string(),
                cleared_count: ClearedCount::default(),
            };
        };
        info!("clearing remote data");

        let mut before = ClearedCount::default();
        let mut cleared = ClearedCount::default();
        let abort = |message: String, cleared: ClearedCount| {
            warn!("{message}");
            ClearResult {
                success: false,
                message,
                cleared_count: cleared,
            }
        };

        progress.phase(1, SyncStage::Clearing, "exercise records");
        before.records = match self.count(self.remote.records(), &user).await {
            Ok(n) => n,
            Err(e) => {
                return abort(format!("could not count records before clearing: {e}"), cleared)
            }
        };
        if let Err(e) = self.remote.records().delete_all(&user).await {
            return abort(format!("failed to clear records: {e}"), cleared);
        }
        cleared.records = before.records;

        progress.phase(2, SyncStage::Clearing, "study plans");
        before.plans = match self.count(self.remote.plans(), &user).await {
            Ok(n) => n,
            Err(e) => {
                return abort(format!("could not count plans before clearing: {e}"), cleared)
            }
        };
        if let Err(e) = self.remote.plans().delete_all(&user).await {
            return abort(format!("failed to clear plans: {e}"), cleared);
        }
        cleared.plans = before.plans;

        progress.phase(3, SyncStage::Clearing, "knowledge items");
        before.knowledge = match self.count(self.remote.knowledge(), &user).await {
            Ok(n) => n,
            Err(e) => {
                return abort(format!("could not count knowledge before clearing: {e}"), cleared)
            }
        };
        if let Err(e) = self.remote.knowledge().delete_all(&user).await {
            return abort(format!("failed to clear knowledge: {e}"), cleared);
        }
        cleared.knowledge = before.knowledge;

        progress.phase(4, SyncStage::Clearing, "settings");
        before.settings = match self.remote.settings().fetch(&user).await {
            Ok(s) => s.is_some(),
            Err(e) => {
                return abort(format!("could not read settings before clearing: {e}"), cleared)
            }
        };
        if let Err(e) = self.remote.settings().delete(&user).await {
            return abort(format!("failed to clear settings: {e}"), cleared);
        }
        cleared.settings = before.settings;

        // An unreadable kind counts as unverified.
        progress.phase(5, SyncStage::Verifying, "remaining rows");
        let verified = async {
            let records = self
                .count(self.remote.records(), &user)
                .await
                .map_err(|e| ("records", e))?;
            let plans = self.count(self.remote.plans(), &user).await.map_err(|e| ("plans", e))?;
            let knowledge = self
                .count(self.remote.knowledge(), &user)
                .await
                .map_err(|e| ("knowledge", e))?;
            let settings = self
                .remote
                .settings()
                .fetch(&user)
                .await
                .map_err(|e| ("settings", e))?
                .is_some();
            Ok::<_, (&str, RemoteError)>((records, plans, knowledge, settings))
        };
        let (remaining_records, remaining_plans, remaining_knowledge, settings_remain) =
            match verified.await {
                Ok(counts) => counts,
                Err((kind, e)) => {
                    return abort(format!("could not verify {kind} deletion: {e}"), cleared)
                }
            };

        let cleared_count = ClearedCount {
            records: before.records.saturating_sub(remaining_records),
            plans: before.plans.saturating_sub(remaining_plans),
            knowledge: before.knowledge.saturating_sub(remaining_knowledge),
            settings: before.settings && !settings_remain,
        };
        let remaining = remaining_records + remaining_plans + remaining_knowledge;
        progress.phase(CLEAR_PHASES, SyncStage::Complete, "done");

        let total = cleared_count.records + cleared_count.plans + cleared_count.knowledge;
        if remaining > 0 || settings_remain {
            warn!(remaining, settings_remain, "rows survived remote delete");
            ClearResult {
                success: false,
                message: format!(
                    "Cleared {total} items, but {remaining} items remain in the cloud"
                ),
                cleared_count,
            }
        } else {
            info!(total, "remote data cleared");
            ClearResult {
                success: true,
                message: format!("Cleared {total} items from the cloud"),
                cleared_count,
            }
        }
    }

    /// Push a changed entity's semantic fields to its remote row.
    ///
    /// Entities whose identifier was never issued by the remote store are
    /// skipped without any remote call.
    pub async fn update_entity<T: RemoteKind>(&self, item: &T) -> SyncReportItem<T> {
        if self.remote.current_user().await.is_none() {
            return SyncReportItem::failed(item.clone(), NOT_AUTHENTICATED);
        }
        apply_update(T::collection(self.remote.as_ref()), item.clone()).await
    }

    pub async fn update_record(
        &self,
        item: &studysync_core::ExerciseRecord,
    ) -> SyncReportItem<studysync_core::ExerciseRecord> {
        self.update_entity(item).await
    }

    pub async fn update_plan(
        &self,
        item: &studysync_core::StudyPlan,
    ) -> SyncReportItem<studysync_core::StudyPlan> {
        self.update_entity(item).await
    }

    pub async fn update_knowledge(
        &self,
        item: &studysync_core::KnowledgeItem,
    ) -> SyncReportItem<studysync_core::KnowledgeItem> {
        self.update_entity(item).await
    }

    /// Delete one remote row. Returns `Ok(false)` for local-only entities.
    pub async fn delete_remote<T: RemoteKind>(&self, item: &T) -> Result<bool, RemoteError> {
        if item.origin() == EntityOrigin::Local {
            debug!(kind = %T::KIND, id = item.id(), "not deleting local-only entity remotely");
            return Ok(false);
        }
        if self.remote.current_user().await.is_none() {
            return Err(RemoteError::NotAuthenticated);
        }
        T::collection(self.remote.as_ref())
            .delete_one(item.id())
            .await
            .map(|()| true)
    }
}

async fn apply_update<T: SyncEntity>(
    collection: &dyn RemoteCollection<T>,
    item: T,
) -> SyncReportItem<T> {
    if item.origin() == EntityOrigin::Local {
        debug!(kind = %T::KIND, id = item.id(), "skipping update of local-only entity");
        return SyncReportItem::skipped(item, REASON_LOCAL_ID_NO_UPDATE);
    }
    match collection.update(item.id(), item.patch_fields()).await {
        Ok(row) => {
            let id = row.id().to_string();
            SyncReportItem::updated(item, id)
        }
        Err(e) => {
            warn!(kind = %T::KIND, id = item.id(), "update failed: {e}");
            SyncReportItem::failed(item, e.to_string())
        }
    }
}

fn overview_of<T: SyncEntity>(listed: Result<Vec<T>, RemoteError>) -> KindOverview<T> {
    let mut items = match listed {
        Ok(items) => items,
        Err(e) => {
            warn!(kind = %T::KIND, "overview fetch failed: {e}");
            return KindOverview::default();
        }
    };
    items.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.date().cmp(a.date()))
    });
    let count = items.len();
    items.truncate(OVERVIEW_RECENT_LIMIT);
    KindOverview {
        count,
        recent: items,
    }
}
