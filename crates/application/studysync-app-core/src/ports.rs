use studysync_core::DataSnapshot;

/// Where the current local content comes from when a sync is triggered.
#[async_trait::async_trait]
pub trait LocalDataSource: Send + Sync + 'static {
    async fn load(&self) -> anyhow::Result<DataSnapshot>;
}
