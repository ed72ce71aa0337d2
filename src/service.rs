//! Use-case layer between the HTTP adapter and a store.
//!
//! Every call is forwarded unchanged. Failures are tagged with the operation
//! that produced them while the underlying [`StoreError`] stays reachable
//! through [`ServiceError::kind`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::model::Observation;
use crate::storage::{ObservationStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Get,
    Update,
    Delete,
    List,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Op::Add => "add weather",
            Op::Get => "get weather",
            Op::Update => "update weather",
            Op::Delete => "delete weather",
            Op::List => "list weathers",
        })
    }
}

#[derive(Debug, Error)]
#[error("failed to {op}: {source}")]
pub struct ServiceError {
    op: Op,
    #[source]
    source: StoreError,
}

impl ServiceError {
    fn wrap(op: Op) -> impl FnOnce(StoreError) -> Self {
        move |source| Self { op, source }
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn kind(&self) -> &StoreError {
        &self.source
    }

    pub fn is_not_found(&self) -> bool {
        self.source.is_not_found()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Clone)]
pub struct ObservationService {
    store: Arc<dyn ObservationStore>,
}

impl ObservationService {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self { store }
    }

    pub async fn add(&self, ob: Observation) -> ServiceResult<i64> {
        self.store.add(ob).await.map_err(ServiceError::wrap(Op::Add))
    }

    pub async fn get(&self, id: i64) -> ServiceResult<Observation> {
        self.store.get(id).await.map_err(ServiceError::wrap(Op::Get))
    }

    pub async fn update(&self, ob: Observation) -> ServiceResult<()> {
        self.store.update(ob).await.map_err(ServiceError::wrap(Op::Update))
    }

    pub async fn delete(&self, id: i64) -> ServiceResult<Observation> {
        self.store.delete(id).await.map_err(ServiceError::wrap(Op::Delete))
    }

    pub async fn list(&self) -> ServiceResult<Vec<Observation>> {
        self.store.list().await.map_err(ServiceError::wrap(Op::List))
    }
}
