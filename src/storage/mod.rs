//! Storage backends for targets, incidents and health samples
//!
//! The monitor consumes three trait objects: the target registry, the incident log and the
//! health-sample time series. A single backend type implements all of them.
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, persisted across restarts
//! - **In-Memory**: No persistence, for tests and `"storage": { "backend": "none" }`
//!
//! ## Usage
//!
//! ```no_run
//! use watchdog::storage::{TargetRegistry, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./watchdog.db").await?;
//!     let targets = backend.fetch_all(Default::default(), 10, 0).await?;
//!     println!("{} targets registered", targets.len());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

pub use backend::{HealthSampleStore, IncidentStore, TargetRegistry};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;

use crate::config::StorageConfig;

/// The three stores the pipeline needs, usually backed by the same object
#[derive(Clone)]
pub struct Stores {
    pub registry: Arc<dyn TargetRegistry>,
    pub incidents: Arc<dyn IncidentStore>,
    pub samples: Arc<dyn HealthSampleStore>,
}

impl Stores {
    /// Share one backend between all three roles
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: TargetRegistry + IncidentStore + HealthSampleStore + 'static,
    {
        Self {
            registry: backend.clone(),
            incidents: backend.clone(),
            samples: backend,
        }
    }
}

/// Open the configured backend
///
/// Connection and migration failures are returned to the caller; the monitor must not start
/// without its registry.
pub async fn connect(config: &StorageConfig) -> StorageResult<Stores> {
    match config {
        StorageConfig::None => {
            tracing::info!("using in-memory storage, data will not survive a restart");
            Ok(Stores::from_backend(Arc::new(MemoryBackend::new())))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let backend = sqlite::SqliteBackend::new(path).await?;
            Ok(Stores::from_backend(Arc::new(backend)))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::ConnectionFailed(
            "built without the storage-sqlite feature".to_string(),
        )),
    }
}
