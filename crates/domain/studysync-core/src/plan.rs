use std::collections::HashSet;

use tracing::debug;

use crate::dedup::{find_duplicate, has_changes};
use crate::model::{EntityOrigin, SyncEntity};
use crate::report::SyncReportItem;

pub const REASON_EXISTS_IN_REMOTE: &str = "already exists in remote";
pub const REASON_SAME_ID_SAME_CONTENT: &str = "same identifier, identical content";
pub const REASON_NEEDS_UPDATE: &str = "needs update, not supported in batch path";
pub const REASON_LOCAL_ID_NO_UPDATE: &str = "local-only identifier, update not permitted";
pub const REASON_DUPLICATE_IN_BATCH: &str = "duplicate of an earlier local item";
pub const REASON_ID_CLAIMED_IN_BATCH: &str = "identifier already claimed by an earlier local item";

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    /// Send changed linked items as explicit updates instead of skipping them.
    pub update_changed: bool,
}

#[derive(Debug, Clone)]
pub struct UploadPlan<T> {
    pub to_upload: Vec<T>,
    pub to_update: Vec<T>,
    /// Items settled during planning (all `skipped`).
    pub report: Vec<SyncReportItem<T>>,
}

impl<T> Default for UploadPlan<T> {
    fn default() -> Self {
        Self {
            to_upload: Vec::new(),
            to_update: Vec::new(),
            report: Vec::new(),
        }
    }
}

impl<T> UploadPlan<T> {
    pub fn is_noop(&self) -> bool {
        self.to_upload.is_empty() && self.to_update.is_empty()
    }
}

/// Partition `local` against an already-fetched `remote` snapshot.
///
/// Local order is preserved in `to_upload`, so the first of several local
/// items competing for the same identifier wins.
pub fn plan<T: SyncEntity>(local: &[T], remote: &[T], options: &PlanOptions) -> UploadPlan<T> {
    let mut out = UploadPlan::default();
    let mut claimed_ids: HashSet<&str> = HashSet::new();

    for item in local {
        if let Some(existing) = find_duplicate(item, remote) {
            let reason = if existing.id() == item.id() {
                REASON_SAME_ID_SAME_CONTENT
            } else {
                REASON_EXISTS_IN_REMOTE
            };
            out.report.push(
                SyncReportItem::skipped(item.clone(), reason).with_remote_id(existing.id()),
            );
            continue;
        }

        if let Some(same_id) = remote.iter().find(|r| r.id() == item.id()) {
            if has_changes(item, same_id) {
                if !options.update_changed {
                    out.report
                        .push(SyncReportItem::skipped(item.clone(), REASON_NEEDS_UPDATE));
                } else if item.origin() == EntityOrigin::Local {
                    out.report
                        .push(SyncReportItem::skipped(item.clone(), REASON_LOCAL_ID_NO_UPDATE));
                } else {
                    out.to_update.push(item.clone());
                }
                continue;
            }
        }

        if find_duplicate(item, &out.to_upload).is_some() {
            out.report
                .push(SyncReportItem::skipped(item.clone(), REASON_DUPLICATE_IN_BATCH));
            continue;
        }

        if !item.id().is_empty() && !claimed_ids.insert(item.id()) {
            out.report
                .push(SyncReportItem::skipped(item.clone(), REASON_ID_CLAIMED_IN_BATCH));
            continue;
        }

        out.to_upload.push(item.clone());
    }

    debug!(
        kind = %T::KIND,
        upload = out.to_upload.len(),
        update = out.to_update.len(),
        skipped = out.report.len(),
        "planned batch"
    );

    out
}
