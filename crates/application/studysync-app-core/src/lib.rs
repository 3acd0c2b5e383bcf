pub mod auto_sync;
pub mod events;
pub mod notifier;
pub mod persistence;
pub mod ports;

pub use auto_sync::{AutoSync, AutoSyncConfig, AutoSyncEvent, SyncEvents};
pub use events::{EventEmitter, ListenerId};
pub use notifier::{NoopNotifier, NotificationId, NotifyLevel, Notifier, TracingNotifier};
pub use persistence::{ClientConfig, ConfigStore, FileLocalStore};
pub use ports::LocalDataSource;
