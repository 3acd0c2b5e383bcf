pub mod engine;
pub mod error;
pub mod inserter;
pub mod progress;
pub mod remote;

pub use engine::{SyncEngine, SyncOptions, NOT_AUTHENTICATED};
pub use error::RemoteError;
pub use inserter::{BatchFailure, BatchInserter, Inserter, SequentialInserter, WithFallback};
pub use progress::{ProgressSink, SyncProgress, SyncStage};
pub use remote::memory::InMemoryRemote;
pub use remote::rest::{RestRemote, TableNames};
pub use remote::{RemoteCollection, RemoteDataService, RemoteKind, SettingsStore, UserId};
