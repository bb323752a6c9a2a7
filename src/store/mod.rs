//! The run record store seam.
//!
//! A store is a document collection of [`Run`]s keyed by id. Besides point
//! operations it offers a live subscription that redelivers an owner's full
//! run set every time that set changes.

use async_trait::async_trait;
use thiserror::Error;

use crate::db::{Run, RunStop};

mod memory;
mod sqlite;
mod subscription;

pub use memory::MemoryRunStore;
pub use sqlite::SqliteRunStore;
pub use subscription::{ChangeFeed, RunSubscription};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("run {0} not found")]
    NotFound(String),
    /// The stop patch targeted a run that is no longer active.
    #[error("run {0} has already been stopped")]
    AlreadyStopped(String),
    /// Transport, permission or storage failure; the message is passed through.
    #[error("{0}")]
    Backend(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Backend(format!("{err:#}"))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persists a new run and returns the id the store assigned to it.
    async fn create(&self, run: Run) -> StoreResult<String>;

    /// Applies the stop patch. A run is stopped at most once; a second
    /// stop fails with [`StoreError::AlreadyStopped`] and leaves the record
    /// untouched.
    async fn update(&self, run_id: &str, stop: RunStop) -> StoreResult<()>;

    async fn get(&self, run_id: &str) -> StoreResult<Option<Run>>;

    async fn delete(&self, run_id: &str) -> StoreResult<()>;

    /// The owner's active run, if any.
    async fn find_active(&self, owner_id: &str) -> StoreResult<Option<Run>>;

    /// The owner's complete run set, unordered.
    async fn list_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Run>>;

    /// Opens a live view of the owner's runs. The first delivery is the
    /// current set; later deliveries follow every change. Dropping the
    /// subscription releases it.
    fn subscribe(&self, owner_id: &str) -> RunSubscription;
}
