use crate::domain::{Assignment, Person, PersonId, RequestId, SwapRequest, SwapSnapshot};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::{RequestFilter, StoreError, SwapStore, Transaction, WriteOp};

/// One-shot failure injected into the next commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPlan {
    /// Fail when applying the n-th request update (1-based)
    RequestUpdate(usize),
    /// Fail when applying the n-th assignment move (1-based)
    AssignmentMove(usize),
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    requests: Vec<SwapRequest>,
    people: Vec<Person>,
    assignments: Vec<Assignment>,
}

impl StoreState {
    fn request_mut(&mut self, id: RequestId) -> Option<&mut SwapRequest> {
        self.requests.iter_mut().find(|r| r.id == id)
    }

    fn apply(&mut self, transaction: Transaction, fault: Option<FaultPlan>) -> Result<(), StoreError> {
        let (mut updates, mut moves) = (0usize, 0usize);

        for op in transaction.into_ops() {
            match op {
                WriteOp::UpdateRequest {
                    expected_status,
                    request,
                } => {
                    updates += 1;
                    if fault == Some(FaultPlan::RequestUpdate(updates)) {
                        return Err(StoreError::Unavailable(format!(
                            "injected failure on request update #{}",
                            updates
                        )));
                    }
                    let current = self
                        .request_mut(request.id)
                        .ok_or_else(|| StoreError::NotFound(format!("request {}", request.id)))?;
                    if current.status != expected_status {
                        return Err(StoreError::Conflict {
                            id: request.id,
                            expected: expected_status,
                            found: current.status,
                        });
                    }
                    *current = request;
                }
                WriteOp::MoveAssignment { week, from, to } => {
                    moves += 1;
                    if fault == Some(FaultPlan::AssignmentMove(moves)) {
                        return Err(StoreError::Unavailable(format!(
                            "injected failure on assignment move #{}",
                            moves
                        )));
                    }
                    let mut moved = 0;
                    for assignment in self
                        .assignments
                        .iter_mut()
                        .filter(|a| a.person == from && a.week == week)
                    {
                        assignment.person = to.clone();
                        moved += 1;
                    }
                    if moved == 0 {
                        return Err(StoreError::NotFound(format!(
                            "no assignment for {} in week {}",
                            from, week
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// In-process [`SwapStore`] backed by a staged copy-on-commit state
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    fault: Mutex<Option<FaultPlan>>,
    commits: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a store from a snapshot (e.g. a JSON roster file)
    pub fn from_snapshot(snapshot: SwapSnapshot) -> Self {
        Self {
            state: RwLock::new(StoreState {
                requests: snapshot.requests,
                people: snapshot.people,
                assignments: snapshot.assignments,
            }),
            ..Self::default()
        }
    }

    pub fn add_person(&self, person: Person) {
        let mut state = self.state.write();
        state.people.retain(|p| p.id != person.id);
        state.people.push(person);
    }

    pub fn add_assignment(&self, assignment: Assignment) {
        self.state.write().assignments.push(assignment);
    }

    /// Makes the next commit fail at the given point
    pub fn inject_fault(&self, plan: FaultPlan) {
        *self.fault.lock() = Some(plan);
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Current state, read under one lock
    pub fn current(&self) -> SwapSnapshot {
        let state = self.state.read();
        SwapSnapshot::new(state.requests.clone(), state.people.clone(), state.assignments.clone())
    }

    /// Whether `person` holds any assignment in `week`
    pub fn holds(&self, person: &PersonId, week: chrono::NaiveDate) -> bool {
        self.state
            .read()
            .assignments
            .iter()
            .any(|a| &a.person == person && a.week == week)
    }
}

#[async_trait]
impl SwapStore for InMemoryStore {
    async fn get_request(&self, id: RequestId) -> Result<Option<SwapRequest>, StoreError> {
        Ok(self.state.read().requests.iter().find(|r| r.id == id).cloned())
    }

    async fn insert_request(&self, request: SwapRequest) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.requests.iter().any(|r| r.id == request.id) {
            return Err(StoreError::Duplicate(request.id));
        }
        state.requests.push(request);
        Ok(())
    }

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<SwapRequest>, StoreError> {
        Ok(self
            .state
            .read()
            .requests
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn get_person(&self, id: &PersonId) -> Result<Option<Person>, StoreError> {
        Ok(self.state.read().people.iter().find(|p| &p.id == id).cloned())
    }

    async fn list_people(&self) -> Result<Vec<Person>, StoreError> {
        Ok(self.state.read().people.clone())
    }

    async fn list_assignments(&self, person: Option<&PersonId>) -> Result<Vec<Assignment>, StoreError> {
        Ok(self
            .state
            .read()
            .assignments
            .iter()
            .filter(|a| person.map_or(true, |p| &a.person == p))
            .cloned()
            .collect())
    }

    async fn commit(&self, transaction: Transaction) -> Result<(), StoreError> {
        let fault = self.fault.lock().take();
        let op_count = transaction.len();

        let mut state = self.state.write();
        let mut staged = state.clone();
        if let Err(e) = staged.apply(transaction, fault) {
            warn!("Commit of {} ops rolled back: {}", op_count, e);
            return Err(e);
        }
        *state = staged;
        drop(state);

        self.commits.fetch_add(1, Ordering::Relaxed);
        debug!("Committed {} ops", op_count);
        Ok(())
    }

    async fn snapshot(&self) -> Result<SwapSnapshot, StoreError> {
        Ok(self.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SwapStatus;
    use chrono::{NaiveDate, Utc};

    fn week(d: &str) -> NaiveDate {
        NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()
    }

    fn seeded() -> (InMemoryStore, SwapRequest) {
        let store = InMemoryStore::new();
        store.add_person(Person::new("dr-x", "Dr. X"));
        store.add_person(Person::new("dr-y", "Dr. Y"));
        store.add_assignment(Assignment::new("dr-x", week("2025-01-06"), "inpatient"));
        store.add_assignment(Assignment::new("dr-y", week("2025-01-13"), "inpatient"));
        let request = SwapRequest::reciprocal("dr-x", week("2025-01-06"), "dr-y", week("2025-01-13"), Utc::now());
        (store, request)
    }

    fn executed(request: &SwapRequest) -> SwapRequest {
        let mut updated = request.clone();
        updated.status = SwapStatus::Executed;
        updated.executed_at = Some(Utc::now());
        updated
    }

    #[tokio::test]
    async fn test_insert_and_query() {
        let (store, request) = seeded();
        store.insert_request(request.clone()).await.unwrap();

        assert_eq!(store.get_request(request.id).await.unwrap(), Some(request.clone()));
        assert_eq!(
            store.insert_request(request.clone()).await,
            Err(StoreError::Duplicate(request.id))
        );
        assert_eq!(store.list_requests(&RequestFilter::pending()).await.unwrap().len(), 1);
        assert_eq!(store.list_assignments(Some(&"dr-x".into())).await.unwrap().len(), 1);
        assert!(store.get_person(&"dr-z".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_applies_all_ops() {
        let (store, request) = seeded();
        store.insert_request(request.clone()).await.unwrap();

        let mut tx = Transaction::new();
        tx.update_request(SwapStatus::Pending, executed(&request))
            .move_assignment(week("2025-01-06"), "dr-x".into(), "dr-y".into())
            .move_assignment(week("2025-01-13"), "dr-y".into(), "dr-x".into());
        store.commit(tx).await.unwrap();

        let stored = store.get_request(request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SwapStatus::Executed);
        assert!(store.holds(&"dr-y".into(), week("2025-01-06")));
        assert!(store.holds(&"dr-x".into(), week("2025-01-13")));
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_status_conflict_leaves_state_untouched() {
        let (store, request) = seeded();
        store.insert_request(request.clone()).await.unwrap();

        let mut tx = Transaction::new();
        tx.move_assignment(week("2025-01-06"), "dr-x".into(), "dr-y".into())
            .update_request(SwapStatus::Executed, executed(&request));
        let err = store.commit(tx).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict { found: SwapStatus::Pending, .. }));
        assert!(store.holds(&"dr-x".into(), week("2025-01-06")));
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_fault_is_one_shot() {
        let (store, request) = seeded();
        store.insert_request(request.clone()).await.unwrap();
        store.inject_fault(FaultPlan::AssignmentMove(2));

        let build = || {
            let mut tx = Transaction::new();
            tx.update_request(SwapStatus::Pending, executed(&request))
                .move_assignment(week("2025-01-06"), "dr-x".into(), "dr-y".into())
                .move_assignment(week("2025-01-13"), "dr-y".into(), "dr-x".into());
            tx
        };

        let err = store.commit(build()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.get_request(request.id).await.unwrap().unwrap().status, SwapStatus::Pending);
        assert!(store.holds(&"dr-x".into(), week("2025-01-06")));

        store.commit(build()).await.unwrap();
        assert!(store.holds(&"dr-y".into(), week("2025-01-06")));
    }

    #[tokio::test]
    async fn test_missing_assignment_fails_commit() {
        let (store, _) = seeded();
        let mut tx = Transaction::new();
        tx.move_assignment(week("2025-03-03"), "dr-x".into(), "dr-y".into());
        assert!(matches!(store.commit(tx).await, Err(StoreError::NotFound(_))));
    }
}
