//! Debounced background upload driven by local changes.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use studysync_config::{clamp_debounce, DEFAULT_AUTO_SYNC_DEBOUNCE};
use studysync_core::{SyncReport, SyncResult};
use studysync_pipeline::{ProgressSink, SyncEngine, SyncProgress};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::EventEmitter;
use crate::notifier::{NoopNotifier, NotificationId, NotifyLevel, Notifier};
use crate::ports::LocalDataSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSyncConfig {
    pub enabled: bool,
    pub debounce: Duration,
}

impl Default for AutoSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce: DEFAULT_AUTO_SYNC_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone)]
pub enum AutoSyncEvent {
    Started,
    Progress(SyncProgress),
    Finished(SyncResult),
    Failed { message: String },
    Cancelled,
}

pub type SyncEvents = EventEmitter<AutoSyncEvent>;

struct Inner {
    engine: SyncEngine,
    source: Arc<dyn LocalDataSource>,
    notifier: Arc<dyn Notifier>,
    events: Arc<SyncEvents>,
    config: AutoSyncConfig,
    current: Mutex<Option<CancellationToken>>,
    running: tokio::sync::Mutex<()>,
}

/// Uploads local content after it settles.
///
/// Only one run is live at a time: scheduling or starting a run cancels the
/// token of the previous one first.
#[derive(Clone)]
pub struct AutoSync {
    inner: Arc<Inner>,
}

impl AutoSync {
    pub fn new(engine: SyncEngine, source: Arc<dyn LocalDataSource>, config: AutoSyncConfig) -> Self {
        Self::with_parts(
            engine,
            source,
            config,
            Arc::new(NoopNotifier),
            Arc::new(SyncEvents::new()),
        )
    }

    pub fn with_parts(
        engine: SyncEngine,
        source: Arc<dyn LocalDataSource>,
        config: AutoSyncConfig,
        notifier: Arc<dyn Notifier>,
        events: Arc<SyncEvents>,
    ) -> Self {
        let config = AutoSyncConfig {
            debounce: clamp_debounce(config.debounce),
            ..config
        };
        Self {
            inner: Arc::new(Inner {
                engine,
                source,
                notifier,
                events,
                config,
                current: Mutex::new(None),
                running: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn events(&self) -> &Arc<SyncEvents> {
        &self.inner.events
    }

    pub fn config(&self) -> AutoSyncConfig {
        self.inner.config
    }

    /// Schedule an upload after the debounce window. Calls inside the window
    /// restart it, so a burst of changes produces one run.
    pub fn mark_dirty(&self) -> Option<JoinHandle<()>> {
        if !self.inner.config.enabled {
            debug!("auto sync disabled, ignoring change");
            return None;
        }
        let token = self.inner.replace_token();
        let inner = self.inner.clone();
        let debounce = inner.config.debounce;
        Some(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("pending auto sync superseded");
                }
                _ = tokio::time::sleep(debounce) => {
                    inner.run(token).await;
                }
            }
        }))
    }

    /// Run an upload immediately, cancelling anything pending.
    pub async fn sync_now(&self) -> SyncResult {
        let token = self.inner.replace_token();
        self.inner.run(token).await
    }

    pub fn cancel(&self) {
        if let Some(token) = self.inner.slot().take() {
            info!("cancelling auto sync");
            token.cancel();
        }
    }
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn replace_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.slot().replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    async fn run(&self, token: CancellationToken) -> SyncResult {
        let _running = self.running.lock().await;
        if token.is_cancelled() {
            self.events.emit(&AutoSyncEvent::Cancelled);
            return SyncResult::cancelled(SyncReport::default(), false);
        }

        self.events.emit(&AutoSyncEvent::Started);
        let loading = self.notifier.notify_loading("Syncing study data");

        let local = match self.source.load().await {
            Ok(local) => local,
            Err(e) => {
                let message = format!("failed to read local data: {e:#}");
                warn!("{message}");
                self.finish_notification(loading, false, &message);
                self.events.emit(&AutoSyncEvent::Failed { message: message.clone() });
                return SyncResult::failure(message);
            }
        };

        let events = self.events.clone();
        let forward = move |p: &SyncProgress| events.emit(&AutoSyncEvent::Progress(p.clone()));
        let sink: ProgressSink<'_> = &forward;
        let result = self
            .engine
            .upload_to_cloud(&local, Some(sink), Some(&token))
            .await;

        if result.cancelled {
            info!("auto sync cancelled");
            self.finish_notification(loading, false, &result.message);
            self.events.emit(&AutoSyncEvent::Cancelled);
        } else if result.success {
            info!("auto sync finished: {}", result.message);
            self.finish_notification(loading, true, &result.message);
            self.events.emit(&AutoSyncEvent::Finished(result.clone()));
        } else {
            warn!("auto sync failed: {}", result.message);
            self.finish_notification(loading, false, &result.message);
            self.events.emit(&AutoSyncEvent::Failed {
                message: result.message.clone(),
            });
        }
        result
    }

    fn finish_notification(&self, loading: Option<NotificationId>, ok: bool, message: &str) {
        match (loading, ok) {
            (Some(id), true) => self.notifier.update_to_success(id, message),
            (Some(id), false) => self.notifier.update_to_error(id, message),
            (None, true) => self.notifier.notify(NotifyLevel::Success, message),
            (None, false) => self.notifier.notify(NotifyLevel::Error, message),
        }
    }
}
