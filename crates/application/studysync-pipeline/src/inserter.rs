//! Insertion strategies for planned uploads.
//!
//! `BatchInserter` writes everything in one request. `SequentialInserter`
//! writes item by item and isolates failures. `WithFallback` composes the two
//! so a rejected batch is retried one item at a time.

use studysync_core::{find_duplicate, SyncEntity, SyncReportItem};
use tracing::warn;

use crate::error::RemoteError;
use crate::remote::RemoteCollection;

/// A whole batch was refused. The items come back untouched so another
/// strategy can take them.
#[derive(Debug)]
pub struct BatchFailure<T> {
    pub items: Vec<T>,
    pub error: RemoteError,
}

impl<T> BatchFailure<T> {
    /// Settle every item as failed with the batch error as reason.
    pub fn into_report(self) -> Vec<SyncReportItem<T>> {
        let reason = self.error.to_string();
        self.items
            .into_iter()
            .map(|item| SyncReportItem::failed(item, reason.clone()))
            .collect()
    }
}

#[async_trait::async_trait]
pub trait Inserter<T: SyncEntity>: Send + Sync {
    async fn insert(
        &self,
        user: &str,
        items: Vec<T>,
    ) -> Result<Vec<SyncReportItem<T>>, BatchFailure<T>>;
}

pub struct BatchInserter<'a, T: SyncEntity> {
    collection: &'a dyn RemoteCollection<T>,
}

impl<'a, T: SyncEntity> BatchInserter<'a, T> {
    pub fn new(collection: &'a dyn RemoteCollection<T>) -> Self {
        Self { collection }
    }
}

#[async_trait::async_trait]
impl<'a, T: SyncEntity> Inserter<T> for BatchInserter<'a, T> {
    async fn insert(
        &self,
        user: &str,
        items: Vec<T>,
    ) -> Result<Vec<SyncReportItem<T>>, BatchFailure<T>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        match self.collection.batch_insert(user, &items).await {
            Ok(persisted) => Ok(pair_persisted(items, &persisted)),
            Err(error) => Err(BatchFailure { items, error }),
        }
    }
}

/// Link each input to its persisted row. Rows come back in input order; if
/// the remote returned a different number of rows, match by content instead.
/// An input with no matching row was never confirmed and counts as failed.
fn pair_persisted<T: SyncEntity>(items: Vec<T>, persisted: &[T]) -> Vec<SyncReportItem<T>> {
    if persisted.len() == items.len() {
        return items
            .into_iter()
            .zip(persisted)
            .map(|(item, row)| SyncReportItem::uploaded(item, row.id()))
            .collect();
    }
    items
        .into_iter()
        .map(|item| match find_duplicate(&item, persisted) {
            Some(row) => {
                let id = row.id().to_string();
                SyncReportItem::uploaded(item, id)
            }
            None => SyncReportItem::failed(item, "not returned by remote"),
        })
        .collect()
}

pub struct SequentialInserter<'a, T: SyncEntity> {
    collection: &'a dyn RemoteCollection<T>,
}

impl<'a, T: SyncEntity> SequentialInserter<'a, T> {
    pub fn new(collection: &'a dyn RemoteCollection<T>) -> Self {
        Self { collection }
    }
}

#[async_trait::async_trait]
impl<'a, T: SyncEntity> Inserter<T> for SequentialInserter<'a, T> {
    async fn insert(
        &self,
        user: &str,
        items: Vec<T>,
    ) -> Result<Vec<SyncReportItem<T>>, BatchFailure<T>> {
        let mut report = Vec::with_capacity(items.len());
        for item in items {
            match self.collection.insert_one(user, &item).await {
                Ok(row) => {
                    let id = row.id().to_string();
                    report.push(SyncReportItem::uploaded(item, id));
                }
                Err(e) => {
                    warn!(kind = %T::KIND, id = item.id(), "insert failed: {e}");
                    report.push(SyncReportItem::failed(item, e.to_string()));
                }
            }
        }
        Ok(report)
    }
}

/// Runs `primary`; if it refuses the batch, hands the items to `fallback`.
pub struct WithFallback<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> WithFallback<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait::async_trait]
impl<T, P, F> Inserter<T> for WithFallback<P, F>
where
    T: SyncEntity,
    P: Inserter<T>,
    F: Inserter<T>,
{
    async fn insert(
        &self,
        user: &str,
        items: Vec<T>,
    ) -> Result<Vec<SyncReportItem<T>>, BatchFailure<T>> {
        match self.primary.insert(user, items).await {
            Ok(report) => Ok(report),
            Err(failure) => {
                warn!(
                    kind = %T::KIND,
                    count = failure.items.len(),
                    "batch insert failed ({}), retrying one by one",
                    failure.error
                );
                self.fallback.insert(user, failure.items).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use studysync_core::{ExerciseRecord, SyncAction};

    use super::*;

    #[test]
    fn short_response_marks_unmatched_items_failed() {
        let kept = ExerciseRecord::new("2024-03-01", "math", 20, 16, "24:10");
        let lost = ExerciseRecord::new("2024-03-02", "verbal", 30, 21, "31:00");
        let mut row = kept.clone();
        row.id = "row-1".into();

        let report = pair_persisted(vec![kept, lost], &[row]);

        assert_eq!(report[0].action, SyncAction::Uploaded);
        assert_eq!(report[0].remote_id.as_deref(), Some("row-1"));
        assert_eq!(report[1].action, SyncAction::Failed);
        assert_eq!(report[1].reason.as_deref(), Some("not returned by remote"));
        assert!(report[1].remote_id.is_none());
    }
}
