use std::time::{Duration, SystemTime};

use anyhow::{bail, Result};
use camino::Utf8Path;
use indicatif::{ProgressBar, ProgressStyle};
use studysync_app_core::{AutoSync, AutoSyncEvent, ClientConfig, ConfigStore, FileLocalStore};
use studysync_config::{CLEAR_PHASES, DOWNLOAD_PHASES, UPLOAD_PHASES};
use studysync_core::plan::REASON_NEEDS_UPDATE;
use studysync_core::{
    merge_remote, ClearResult, CloudOverview, KindOverview, SyncAction, SyncEntity, SyncReportItem,
    SyncResult,
};
use studysync_pipeline::{ProgressSink, SyncEngine, SyncProgress, SyncStage};
use tokio_util::sync::CancellationToken;
use tracing::debug;

fn progress_bar(total: u32) -> ProgressBar {
    let pb = ProgressBar::new(u64::from(total));
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:24.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn stage_label(stage: SyncStage) -> &'static str {
    match stage {
        SyncStage::Checking => "Checking",
        SyncStage::UploadingRecords
        | SyncStage::UploadingPlans
        | SyncStage::UploadingKnowledge
        | SyncStage::UploadingSettings => "Uploading",
        SyncStage::Downloading => "Downloading",
        SyncStage::Clearing => "Clearing",
        SyncStage::Verifying => "Verifying",
        SyncStage::Complete => "Done",
        SyncStage::Cancelled => "Cancelled",
    }
}

fn follow(pb: &ProgressBar) -> impl Fn(&SyncProgress) + Send + Sync {
    let pb = pb.clone();
    move |p: &SyncProgress| {
        pb.set_length(u64::from(p.total));
        pb.set_position(u64::from(p.current));
        if p.stage.is_terminal() {
            pb.set_message(stage_label(p.stage));
        } else {
            pb.set_message(format!("{} {}", stage_label(p.stage), p.current_item));
        }
    }
}

fn print_failures<T: SyncEntity>(entries: &[SyncReportItem<T>]) {
    for entry in entries.iter().filter(|e| e.action == SyncAction::Failed) {
        println!(
            "   ! {} {} ({}): {}",
            T::KIND,
            entry.item.id(),
            entry.item.date(),
            entry.reason.as_deref().unwrap_or("unknown error")
        );
    }
}

fn needs_update<T>(entries: &[SyncReportItem<T>]) -> usize {
    entries
        .iter()
        .filter(|e| {
            e.action == SyncAction::Skipped && e.reason.as_deref() == Some(REASON_NEEDS_UPDATE)
        })
        .count()
}

/// Local edits to items already in the cloud that this run did not push.
pub fn unpushed_edits(result: &SyncResult) -> usize {
    needs_update(&result.report.records)
        + needs_update(&result.report.plans)
        + needs_update(&result.report.knowledge)
}

fn print_result(result: &SyncResult) {
    let mark = if result.success { "::" } else { "!!" };
    println!("{mark} {}", result.message);
    print_failures(&result.report.records);
    print_failures(&result.report.plans);
    print_failures(&result.report.knowledge);
    let unpushed = unpushed_edits(result);
    if unpushed > 0 {
        println!("!! {unpushed} edited items were not pushed; rerun with --update-changed");
    }
}

pub async fn cmd_upload(
    engine: &SyncEngine,
    store: &FileLocalStore,
    cancel: Option<&CancellationToken>,
) -> Result<SyncResult> {
    let local = store.read()?;
    println!(
        ":: Uploading {} records, {} plans, {} knowledge items from {}",
        local.records.len(),
        local.plans.len(),
        local.knowledge.len(),
        store.path()
    );

    let pb = progress_bar(UPLOAD_PHASES);
    let on_progress = follow(&pb);
    let sink: ProgressSink<'_> = &on_progress;
    let result = engine.upload_to_cloud(&local, Some(sink), cancel).await;
    pb.finish_and_clear();

    print_result(&result);
    Ok(result)
}

/// Download remote content. Without `output` it is merged into the local
/// file, keeping local items that were never uploaded.
pub async fn cmd_download(
    engine: &SyncEngine,
    store: &FileLocalStore,
    output: Option<&Utf8Path>,
) -> Result<SyncResult> {
    let pb = progress_bar(DOWNLOAD_PHASES);
    let on_progress = follow(&pb);
    let sink: ProgressSink<'_> = &on_progress;
    let result = engine.download_from_cloud(Some(sink)).await;
    pb.finish_and_clear();

    if let Some(data) = &result.data {
        match output {
            Some(path) => {
                FileLocalStore::new(path).write(data)?;
                println!(":: Saved cloud snapshot to {path}");
            }
            None => {
                let local = store.read()?;
                store.write(&merge_remote(&local, data.clone()))?;
                println!(":: Updated {}", store.path());
            }
        }
    }
    print_result(&result);
    Ok(result)
}

pub async fn cmd_sync(
    engine: &SyncEngine,
    store: &FileLocalStore,
    cancel: Option<&CancellationToken>,
) -> Result<SyncResult> {
    let local = store.read()?;
    let pb = progress_bar(UPLOAD_PHASES);
    let on_progress = follow(&pb);
    let sink: ProgressSink<'_> = &on_progress;
    let result = engine.sync_data(&local, Some(sink), cancel).await;
    pb.finish_and_clear();

    if let Some(data) = &result.data {
        store.write(&merge_remote(&local, data.clone()))?;
        println!(":: Updated {}", store.path());
    }
    print_result(&result);
    Ok(result)
}

fn print_kind<T: SyncEntity>(label: &str, overview: &KindOverview<T>) {
    println!("{label:<10} {:>5}", overview.count);
    for item in &overview.recent {
        let created = item
            .created_at()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        println!("    {}  {}  created {}", item.date(), item.id(), created);
    }
}

pub async fn cmd_overview(engine: &SyncEngine) -> Result<CloudOverview> {
    let overview = engine.cloud_overview().await;
    println!(":: Cloud contents");
    print_kind("records", &overview.records);
    print_kind("plans", &overview.plans);
    print_kind("knowledge", &overview.knowledge);
    println!(
        "settings   {:>5}",
        if overview.has_settings { "yes" } else { "no" }
    );
    Ok(overview)
}

pub async fn cmd_clear(engine: &SyncEngine, confirmed: bool) -> Result<ClearResult> {
    if !confirmed {
        bail!("refusing to delete all cloud data without --yes");
    }
    let pb = progress_bar(CLEAR_PHASES);
    let on_progress = follow(&pb);
    let sink: ProgressSink<'_> = &on_progress;
    let result = engine.clear_cloud_data(Some(sink)).await;
    pb.finish_and_clear();

    let c = result.cleared_count;
    let mark = if result.success { "::" } else { "!!" };
    println!("{mark} {}", result.message);
    println!(
        "   records {}, plans {}, knowledge {}, settings {}",
        c.records,
        c.plans,
        c.knowledge,
        if c.settings { "yes" } else { "no" }
    );
    Ok(result)
}

fn modified(path: &Utf8Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Poll the local file and schedule an upload whenever it changes. Runs until
/// `stop` is cancelled.
pub async fn cmd_watch(
    auto: &AutoSync,
    path: &Utf8Path,
    interval: Duration,
    stop: &CancellationToken,
) -> Result<()> {
    let listener = auto.events().subscribe(|event: &AutoSyncEvent| match event {
        AutoSyncEvent::Started => println!(":: Change detected, syncing..."),
        AutoSyncEvent::Progress(p) => debug!(stage = ?p.stage, "{}/{} {}", p.current, p.total, p.current_item),
        AutoSyncEvent::Finished(result) => println!(":: {}", result.message),
        AutoSyncEvent::Failed { message } => println!("!! {message}"),
        AutoSyncEvent::Cancelled => println!(":: Sync superseded by newer changes"),
    });

    println!(
        ":: Watching {path} (debounce {:?}), press Ctrl-C to stop",
        auto.config().debounce
    );
    let mut last = modified(path);
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let now = modified(path);
                if now != last {
                    last = now;
                    auto.mark_dirty();
                }
            }
        }
    }

    auto.cancel();
    auto.events().unsubscribe(listener);
    Ok(())
}

fn masked(secret: &Option<String>) -> Option<String> {
    secret.as_ref().map(|s| {
        let tail: String = s.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
        format!("****{tail}")
    })
}

pub fn cmd_config_show(store: &ConfigStore) -> Result<ClientConfig> {
    let config = store.load()?;
    let shown = ClientConfig {
        api_key: masked(&config.api_key),
        ..config.clone()
    };
    println!(":: {}", store.path().display());
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(config)
}

pub fn cmd_config_set(store: &ConfigStore, key: &str, value: &str) -> Result<ClientConfig> {
    let mut config = store.load()?;
    config.set(key, value)?;
    store.save(&config)?;
    println!(":: Set {key}");
    Ok(config)
}
