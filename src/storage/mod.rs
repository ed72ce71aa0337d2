//! Observation stores.
//!
//! A store is the only owner of observation identity. Every implementation
//! assigns strictly increasing identifiers, never reuses one after a delete,
//! and reports a missing identifier as [`StoreError::NotFound`] so callers can
//! classify the failure without looking at its message.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::Observation;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no record with id={0}")]
    NotFound(i64),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("storage operation cancelled")]
    Cancelled,

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn not_found_id(&self) -> Option<i64> {
        match self {
            Self::NotFound(id) => Some(*id),
            _ => None,
        }
    }
}

/// CRUD contract shared by the in-memory and relational stores.
///
/// Dropping a returned future is the cancellation signal. Implementations
/// backed by I/O must stop that I/O and must not leave a partial mutation.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Stores `ob` under a fresh identifier and returns it. The caller's `id`
    /// is ignored.
    async fn add(&self, ob: Observation) -> StoreResult<i64>;

    async fn get(&self, id: i64) -> StoreResult<Observation>;

    /// Replaces every field of the record selected by `ob.id`.
    async fn update(&self, ob: Observation) -> StoreResult<()>;

    /// Removes the record and returns the value it held.
    async fn delete(&self, id: i64) -> StoreResult<Observation>;

    /// All live records, ascending by identifier.
    async fn list(&self) -> StoreResult<Vec<Observation>>;
}
