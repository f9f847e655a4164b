pub mod cache;
pub use cache::ClusterTable;
pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};
pub mod config;
pub use config::{CleanupConfig, EngineConfig, SyncConfig};
pub mod convert;
pub mod engine;
pub use engine::TaskEngine;
pub mod error;
pub use error::CoreError;
pub mod runtime;
pub use runtime::{PodObservation, RuntimeError, TaskRuntime};
pub mod secret;
pub mod store;
pub use store::{MemoryStore, Storage, StoreError};
pub mod worker;
pub use worker::{CleanupReport, CleanupWorker, StatusSyncWorker};
