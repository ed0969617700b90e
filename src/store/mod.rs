//! Task record store
//!
//! The store is the only state shared between concurrent pipeline runs. It
//! owns per-record write serialization: every status change is a single
//! conditional read-modify-write keyed by task id, so two writers racing on
//! the same record can never regress its status.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryTaskStore;
pub use sqlite::SqliteTaskStore;

use crate::config::{StoreBackend, StoreSection};
use crate::task::{StatusChange, TaskRecord};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Outcome of a conditional status change
#[derive(Debug, Clone, PartialEq)]
pub enum StoreTransition {
    /// The change advanced the record; carries the updated record
    Applied(TaskRecord),
    /// The record was already at or past the requested status; carries it unchanged
    Ignored(TaskRecord),
}

impl StoreTransition {
    pub fn record(&self) -> &TaskRecord {
        match self {
            StoreTransition::Applied(record) | StoreTransition::Ignored(record) => record,
        }
    }

    pub fn into_record(self) -> TaskRecord {
        match self {
            StoreTransition::Applied(record) | StoreTransition::Ignored(record) => record,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, StoreTransition::Applied(_))
    }
}

/// Durable storage for task records
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Short backend identifier for logs and health reports
    fn backend_name(&self) -> &str;

    /// Persist a new record; fails if the id already exists
    async fn insert(&self, record: &TaskRecord) -> Result<(), StoreError>;

    /// Look up a record by id
    async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>, StoreError>;

    /// Atomically apply `change` if it advances the record's status
    async fn advance(&self, id: Uuid, change: StatusChange)
        -> Result<StoreTransition, StoreError>;

    /// Cheap reachability probe
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Task not found: {0}")]
    NotFound(Uuid),
    #[error("Task already exists: {0}")]
    Duplicate(Uuid),
    #[error("Corrupt task record: {0}")]
    Corrupt(String),
}

/// Open the store selected by configuration
///
/// ```
/// # tokio_test::block_on(async {
/// use crewline::config::{StoreBackend, StoreSection};
/// use crewline::store::open_store;
///
/// let section = StoreSection {
///     backend: StoreBackend::Memory,
///     ..Default::default()
/// };
/// let store = open_store(&section).await.unwrap();
/// assert_eq!(store.backend_name(), "memory");
/// # });
/// ```
pub async fn open_store(config: &StoreSection) -> Result<Arc<dyn TaskStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryTaskStore::new())),
        StoreBackend::Sqlite => {
            let store = SqliteTaskStore::connect(&config.url, config.max_connections).await?;
            Ok(Arc::new(store))
        }
    }
}
