//! Persistence contract for requests, people and assignments.
//!
//! The engine only ever mutates through [`SwapStore::commit`], which applies a
//! [`Transaction`] all-or-nothing. Status updates carry the status the caller
//! observed, so a concurrent change surfaces as [`StoreError::Conflict`]
//! instead of a lost update.

pub mod memory;

pub use memory::{FaultPlan, InMemoryStore};

use crate::domain::{Assignment, ChainId, Person, PersonId, RequestId, SwapRequest, SwapSnapshot, SwapStatus};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Conflict on request {id}: expected {expected}, found {found}")]
    Conflict {
        id: RequestId,
        expected: SwapStatus,
        found: SwapStatus,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate request id: {0}")]
    Duplicate(RequestId),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Filtered request query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestFilter {
    pub status: Option<SwapStatus>,
    /// Matches either the source or the target person
    pub person: Option<PersonId>,
    /// Inclusive lower bound on the source week
    pub from_week: Option<NaiveDate>,
    /// Inclusive upper bound on the source week
    pub to_week: Option<NaiveDate>,
    /// Requests executed as part of this chain
    #[serde(default)]
    pub chain: Option<ChainId>,
}

impl RequestFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn pending() -> Self {
        Self {
            status: Some(SwapStatus::Pending),
            ..Self::default()
        }
    }

    pub fn for_person(mut self, person: PersonId) -> Self {
        self.person = Some(person);
        self
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from_week = Some(from);
        self.to_week = Some(to);
        self
    }

    pub fn in_chain(mut self, chain: ChainId) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn matches(&self, request: &SwapRequest) -> bool {
        if self.chain.is_some() && request.chain_id != self.chain {
            return false;
        }
        if let Some(status) = self.status {
            if request.status != status {
                return false;
            }
        }
        if let Some(person) = &self.person {
            if &request.source_person != person && request.target_person.as_ref() != Some(person) {
                return false;
            }
        }
        if let Some(from) = self.from_week {
            if request.source_week < from {
                return false;
            }
        }
        if let Some(to) = self.to_week {
            if request.source_week > to {
                return false;
            }
        }
        true
    }
}

/// One write inside a [`Transaction`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteOp {
    /// Replace a request, provided its stored status is still `expected_status`
    UpdateRequest {
        expected_status: SwapStatus,
        request: SwapRequest,
    },
    /// Hand every assignment `from` holds in `week` over to `to`
    MoveAssignment {
        week: NaiveDate,
        from: PersonId,
        to: PersonId,
    },
}

/// Ordered writes applied atomically by [`SwapStore::commit`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    ops: Vec<WriteOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_request(&mut self, expected_status: SwapStatus, request: SwapRequest) -> &mut Self {
        self.ops.push(WriteOp::UpdateRequest {
            expected_status,
            request,
        });
        self
    }

    pub fn move_assignment(&mut self, week: NaiveDate, from: PersonId, to: PersonId) -> &mut Self {
        self.ops.push(WriteOp::MoveAssignment { week, from, to });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Requests touched by this transaction, in op order
    pub fn request_ids(&self) -> Vec<RequestId> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                WriteOp::UpdateRequest { request, .. } => Some(request.id),
                WriteOp::MoveAssignment { .. } => None,
            })
            .collect()
    }
}

/// Storage backend consumed by the swap engine
#[async_trait]
pub trait SwapStore: Send + Sync {
    async fn get_request(&self, id: RequestId) -> Result<Option<SwapRequest>, StoreError>;

    async fn insert_request(&self, request: SwapRequest) -> Result<(), StoreError>;

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<SwapRequest>, StoreError>;

    async fn get_person(&self, id: &PersonId) -> Result<Option<Person>, StoreError>;

    async fn list_people(&self) -> Result<Vec<Person>, StoreError>;

    /// All assignments, or only those held by `person`
    async fn list_assignments(&self, person: Option<&PersonId>) -> Result<Vec<Assignment>, StoreError>;

    /// Applies every op or none of them
    async fn commit(&self, transaction: Transaction) -> Result<(), StoreError>;

    /// Reads a snapshot for matching and discovery.
    ///
    /// Backends that can read under one lock or one read transaction should
    /// override this.
    async fn snapshot(&self) -> Result<SwapSnapshot, StoreError> {
        let requests = self.list_requests(&RequestFilter::all()).await?;
        let people = self.list_people().await?;
        let assignments = self.list_assignments(None).await?;
        Ok(SwapSnapshot::new(requests, people, assignments))
    }
}
