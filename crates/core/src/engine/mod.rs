//! Swap lifecycle orchestration.
//!
//! `pending -> executed -> rolled_back` and `pending -> rejected`. Every
//! mutation claims the requests it touches for its whole duration, then
//! commits one store transaction whose status updates are conditional on
//! the status read before. Either check failing surfaces as `INVALID_STATUS`.

pub mod clock;
pub mod notify;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use notify::{
    ChannelNotifier, LogNotifier, NotificationDispatcher, NotificationReceipt, Notifier, NotifyError, SwapEvent,
    SwapEventKind,
};
pub use validation::{
    run_validators, AssignmentValidator, RequestShapeValidator, ValidationOutcome, ValidationReport, Validator,
    ValidatorResult,
};

use crate::config::EngineConfig;
use crate::domain::{ChainId, PersonId, RequestId, SwapRequest, SwapSnapshot, SwapStatus, SwapType};
use crate::matching::chains::ChainExecution;
use crate::matching::{
    ChainCoordinator, DiscoveryReport, ExactMatch, ExactMatcher, GraphMatcher, MatchCandidate, Matcher,
    MatchingResult, PairScores, PlannedChain, PreferenceLists, SwapChain,
};
use crate::plan::{inverse_moves, request_moves, AssignmentMove, ExecutionPlan};
use crate::scoring::{CompatibilityScore, CompatibilityScorer, CredentialCheck};
use crate::store::{RequestFilter, StoreError, SwapStore, Transaction};
use crate::{Error, Result};
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Input for [`SwapEngine::create_swap_request`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSwapRequest {
    pub source_person: PersonId,
    pub source_week: NaiveDate,
    pub target_person: Option<PersonId>,
    pub target_week: Option<NaiveDate>,
    pub swap_type: SwapType,
    pub reason: Option<String>,
    /// Defaults to the source person
    pub requester: Option<PersonId>,
    /// Look for counterparts when no target is named
    #[serde(default)]
    pub auto_match: bool,
}

impl NewSwapRequest {
    pub fn reciprocal(
        source: impl Into<PersonId>,
        gives: NaiveDate,
        target: impl Into<PersonId>,
        wants: NaiveDate,
    ) -> Self {
        Self {
            source_person: source.into(),
            source_week: gives,
            target_person: Some(target.into()),
            target_week: Some(wants),
            swap_type: SwapType::Reciprocal,
            reason: None,
            requester: None,
            auto_match: false,
        }
    }

    pub fn absorb(source: impl Into<PersonId>, gives: NaiveDate, target: Option<PersonId>) -> Self {
        Self {
            source_person: source.into(),
            source_week: gives,
            target_person: target,
            target_week: None,
            swap_type: SwapType::Absorb,
            reason: None,
            requester: None,
            auto_match: false,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_auto_match(mut self) -> Self {
        self.auto_match = true;
        self
    }
}

/// Auto-match metadata recorded at creation; nothing is executed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchSummary {
    /// Candidate count per matcher name
    pub counts: BTreeMap<String, usize>,
    pub best_match: Option<MatchCandidate>,
}

impl MatchSummary {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOutcome {
    pub request: SwapRequest,
    pub auto_match: Option<MatchSummary>,
    pub notifications: NotificationReceipt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteOutcome {
    pub request: SwapRequest,
    pub dry_run: bool,
    pub executed: bool,
    /// Whether a real run would go ahead; equals `executed` outside dry runs
    pub would_execute: bool,
    pub validation: ValidationReport,
    pub moves: Vec<AssignmentMove>,
    pub notifications: Option<NotificationReceipt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub request: SwapRequest,
    /// Other legs of the same chain, rolled back in the same transaction
    pub chain_members: Vec<SwapRequest>,
    pub moves: Vec<AssignmentMove>,
    pub notifications: NotificationReceipt,
    pub chain_notifications: Vec<NotificationReceipt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectOutcome {
    pub request: SwapRequest,
    pub notifications: NotificationReceipt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainOutcome {
    pub execution: ChainExecution,
    pub notifications: Vec<NotificationReceipt>,
}

/// Requests currently being mutated
#[derive(Debug, Default)]
struct InFlight {
    claimed: Mutex<HashSet<RequestId>>,
}

/// Releases its claims on drop
struct Claim<'a> {
    registry: &'a InFlight,
    ids: Vec<RequestId>,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let mut claimed = self.registry.claimed.lock();
        for id in &self.ids {
            claimed.remove(id);
        }
    }
}

impl InFlight {
    fn claim(&self, ids: &[RequestId]) -> Result<Claim<'_>> {
        let mut claimed = self.claimed.lock();
        if let Some(&busy) = ids.iter().find(|id| claimed.contains(id)) {
            return Err(Error::InvalidStatus {
                id: busy,
                reason: "another mutation of this request is in flight".to_string(),
            });
        }

        let mut taken = Vec::with_capacity(ids.len());
        for &id in ids {
            if claimed.insert(id) {
                taken.push(id);
            }
        }
        Ok(Claim {
            registry: self,
            ids: taken,
        })
    }
}

pub struct SwapEngineBuilder {
    store: Arc<dyn SwapStore>,
    config: EngineConfig,
    validators: Vec<Arc<dyn Validator>>,
    notifiers: Vec<Arc<dyn Notifier>>,
    matchers: Vec<Arc<dyn Matcher>>,
    clock: Arc<dyn Clock>,
    credentials: Option<Arc<dyn CredentialCheck>>,
}

impl SwapEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Adds the shape and assignment-holding validators
    pub fn default_validators(self) -> Self {
        let store = self.store.clone();
        self.validator(Arc::new(RequestShapeValidator))
            .validator(Arc::new(AssignmentValidator::new(store)))
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Replaces the default exact + graph auto-matchers once called
    pub fn matcher(mut self, matcher: Arc<dyn Matcher>) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialCheck>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn build(self) -> Result<SwapEngine> {
        self.config.validate()?;

        let mut scorer = CompatibilityScorer::new(self.config.compatibility_threshold);
        if let Some(credentials) = self.credentials {
            scorer = scorer.with_credentials(credentials);
        }
        let graph = GraphMatcher::new(scorer.clone(), self.config.edge_threshold);

        let matchers = if self.matchers.is_empty() {
            vec![
                Arc::new(ExactMatcher::new()) as Arc<dyn Matcher>,
                Arc::new(graph.clone()) as Arc<dyn Matcher>,
            ]
        } else {
            self.matchers
        };

        Ok(SwapEngine {
            chains: ChainCoordinator::from_config(&self.config),
            notifications: NotificationDispatcher::new(self.notifiers, self.config.notification_timeout()),
            config: self.config,
            store: self.store,
            validators: self.validators,
            matchers,
            clock: self.clock,
            scorer,
            exact: ExactMatcher::new(),
            graph,
            in_flight: InFlight::default(),
        })
    }
}

/// Swap request state machine over a [`SwapStore`]
pub struct SwapEngine {
    config: EngineConfig,
    store: Arc<dyn SwapStore>,
    validators: Vec<Arc<dyn Validator>>,
    notifications: NotificationDispatcher,
    matchers: Vec<Arc<dyn Matcher>>,
    clock: Arc<dyn Clock>,
    scorer: CompatibilityScorer,
    exact: ExactMatcher,
    graph: GraphMatcher,
    chains: ChainCoordinator,
    in_flight: InFlight,
}

impl SwapEngine {
    pub fn builder(store: Arc<dyn SwapStore>) -> SwapEngineBuilder {
        SwapEngineBuilder {
            store,
            config: EngineConfig::default(),
            validators: Vec::new(),
            notifiers: Vec::new(),
            matchers: Vec::new(),
            clock: Arc::new(SystemClock),
            credentials: None,
        }
    }

    /// Engine with default validators and a log notifier
    pub fn new(store: Arc<dyn SwapStore>, config: EngineConfig) -> Result<Self> {
        Self::builder(store)
            .config(config)
            .default_validators()
            .notifier(Arc::new(LogNotifier))
            .build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SwapStore> {
        &self.store
    }

    async fn load(&self, id: RequestId) -> Result<SwapRequest> {
        self.store.get_request(id).await?.ok_or(Error::RequestNotFound(id))
    }

    async fn require_person(&self, id: &PersonId) -> Result<()> {
        match self.store.get_person(id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(Error::FacultyNotFound(id.clone())),
            Err(e) => Err(Error::CreationFailed(format!("looking up {}: {}", id, e))),
        }
    }

    async fn snapshot(&self) -> Result<SwapSnapshot> {
        Ok(self.store.snapshot().await?)
    }

    /// Persists a new pending request, optionally collecting match candidates
    pub async fn create_swap_request(&self, new: NewSwapRequest) -> Result<CreateOutcome> {
        self.require_person(&new.source_person).await?;
        if let Some(target) = &new.target_person {
            self.require_person(target).await?;
        }

        let now = self.clock.now();
        let mut request = match new.swap_type {
            SwapType::Reciprocal => {
                let (Some(target), Some(wants)) = (new.target_person.clone(), new.target_week) else {
                    return Err(Error::CreationFailed(
                        "reciprocal swaps must name a target person and week".to_string(),
                    ));
                };
                SwapRequest::reciprocal(new.source_person.clone(), new.source_week, target, wants, now)
            }
            SwapType::Absorb => {
                let mut request =
                    SwapRequest::absorb(new.source_person.clone(), new.source_week, new.target_person.clone(), now);
                request.target_week = new.target_week;
                request
            }
        };
        request.reason = new.reason.clone();
        if let Some(requester) = &new.requester {
            request.requester = requester.clone();
        }

        request.check_shape().map_err(Error::CreationFailed)?;
        self.store
            .insert_request(request.clone())
            .await
            .map_err(|e| Error::CreationFailed(e.to_string()))?;
        info!(
            "Created {:?} swap request {} for {} week {}",
            request.swap_type, request.id, request.source_person, request.source_week
        );

        let auto_match = if new.auto_match && new.target_person.is_none() {
            self.collect_matches(&request).await
        } else {
            None
        };

        let notifications = self.notifications.notify_created(&request).await;

        Ok(CreateOutcome {
            request,
            auto_match,
            notifications,
        })
    }

    /// Runs every matcher against a fresh snapshot. Lookup failures only cost
    /// the metadata, the request is already persisted.
    async fn collect_matches(&self, request: &SwapRequest) -> Option<MatchSummary> {
        let snapshot = match self.store.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Auto-match skipped for {}: {}", request.id, e);
                return None;
            }
        };

        let mut summary = MatchSummary::default();
        for matcher in &self.matchers {
            let candidates = matcher.candidates_for(request, &snapshot);
            summary.counts.insert(matcher.name().to_string(), candidates.len());
            for candidate in candidates {
                let better = summary
                    .best_match
                    .as_ref()
                    .map_or(true, |best| candidate.score > best.score);
                if better {
                    summary.best_match = Some(candidate);
                }
            }
        }

        info!("Auto-match for {}: {} candidates", request.id, summary.total());
        if let Some(best) = &summary.best_match {
            let detail = format!("best counterpart {} via {} ({:.3})", best.counterpart, best.matcher, best.score);
            self.notifications.notify_match_found(request, detail).await;
        }
        Some(summary)
    }

    /// Runs the validator chain; `comprehensive` runs every validator
    pub async fn validate_swap(&self, id: RequestId, comprehensive: bool) -> Result<ValidationReport> {
        let request = self.load(id).await?;
        let report = run_validators(&request, &self.validators, comprehensive).await;
        info!("Validation of {}: valid={}", id, report.valid);
        Ok(report)
    }

    pub async fn execute_swap(&self, id: RequestId, dry_run: bool) -> Result<ExecuteOutcome> {
        self.execute_swap_as(id, None, dry_run).await
    }

    /// Validates and executes a pending request, recording who executed it
    pub async fn execute_swap_as(
        &self,
        id: RequestId,
        executed_by: Option<PersonId>,
        dry_run: bool,
    ) -> Result<ExecuteOutcome> {
        let claim = if dry_run { None } else { Some(self.in_flight.claim(&[id])?) };

        let request = self.load(id).await?;
        if request.status != SwapStatus::Pending {
            return Err(Error::InvalidStatus {
                id,
                reason: format!("cannot execute a {} request", request.status),
            });
        }

        let mut validation = run_validators(&request, &self.validators, true).await;
        let moves = match request_moves(&request) {
            Ok(moves) => moves,
            Err(e) => {
                validation.valid = false;
                validation.results.push(ValidatorResult {
                    validator: "execution_plan".to_string(),
                    outcome: ValidationOutcome::fail(e),
                });
                Vec::new()
            }
        };

        if dry_run {
            debug!("Dry run of {}: would_execute={}", id, validation.valid);
            return Ok(ExecuteOutcome {
                request,
                dry_run,
                executed: false,
                would_execute: validation.valid,
                validation,
                moves,
                notifications: None,
            });
        }

        if !validation.valid {
            warn!("Execution of {} blocked: {}", id, validation.errors().join("; "));
            return Err(Error::ValidationFailed(Box::new(validation)));
        }

        let mut updated = request.clone();
        updated.status = SwapStatus::Executed;
        updated.executed_at = Some(self.clock.now());
        updated.executed_by = executed_by;
        updated.applied_moves = moves.clone();

        let mut tx = Transaction::new();
        tx.update_request(SwapStatus::Pending, updated.clone());
        for mv in &moves {
            tx.move_assignment(mv.week, mv.from.clone(), mv.to.clone());
        }

        self.store.commit(tx).await.map_err(|e| match e {
            StoreError::Conflict { found, .. } => Error::InvalidStatus {
                id,
                reason: format!("changed concurrently to {}", found),
            },
            other => Error::ExecutionFailed(format!("{}: {}", id, other)),
        })?;
        drop(claim);
        info!("Executed swap {} ({} moves)", id, moves.len());

        let notifications = self.notifications.notify_executed(&updated).await;
        Ok(ExecuteOutcome {
            request: updated,
            dry_run,
            executed: true,
            would_execute: true,
            validation,
            moves,
            notifications: Some(notifications),
        })
    }

    /// Reverses an executed swap inside the rollback window.
    ///
    /// A request executed as a chain leg is reversed together with every
    /// other leg of that chain.
    pub async fn rollback_swap(&self, id: RequestId, reason: impl Into<String>) -> Result<RollbackOutcome> {
        let claim = self.in_flight.claim(&[id])?;

        let request = self.load(id).await?;
        if request.status != SwapStatus::Executed {
            return Err(Error::InvalidStatus {
                id,
                reason: format!("cannot roll back a {} request", request.status),
            });
        }
        let executed_at = request.executed_at.ok_or_else(|| Error::InvalidStatus {
            id,
            reason: "executed request has no execution timestamp".to_string(),
        })?;

        let now = self.clock.now();
        let elapsed = now - executed_at;
        if elapsed > self.config.rollback_window() {
            return Err(Error::RollbackWindowExpired {
                id,
                elapsed_minutes: elapsed.num_minutes(),
                window_hours: self.config.rollback_window_hours,
            });
        }

        let chain_id = request.chain_id;
        let members = match chain_id {
            Some(chain) => self.chain_members(chain, &request).await?,
            None => vec![request],
        };
        let others: Vec<RequestId> = members.iter().map(|r| r.id).filter(|m| *m != id).collect();
        let chain_claim = self.in_flight.claim(&others)?;

        let mut applied = Vec::new();
        for member in &members {
            if member.applied_moves.is_empty() {
                applied.extend(request_moves(member).map_err(Error::RollbackFailed)?);
            } else {
                applied.extend(member.applied_moves.iter().cloned());
            }
        }
        let moves = inverse_moves(&applied);

        let note = reason.into();
        let mut tx = Transaction::new();
        let mut rolled_back = Vec::with_capacity(members.len());
        for mut member in members {
            member.status = SwapStatus::RolledBack;
            member.rolled_back_at = Some(now);
            member.resolution_note = Some(note.clone());
            tx.update_request(SwapStatus::Executed, member.clone());
            rolled_back.push(member);
        }
        for mv in &moves {
            tx.move_assignment(mv.week, mv.from.clone(), mv.to.clone());
        }

        self.store.commit(tx).await.map_err(|e| match e {
            StoreError::Conflict { id, found, .. } => Error::InvalidStatus {
                id,
                reason: format!("changed concurrently to {}", found),
            },
            other => Error::RollbackFailed(format!("{}: {}", id, other)),
        })?;
        drop(chain_claim);
        drop(claim);
        info!(
            "Rolled back swap {} after {} minutes ({} requests, {} moves)",
            id,
            elapsed.num_minutes(),
            rolled_back.len(),
            moves.len()
        );

        let position = rolled_back.iter().position(|r| r.id == id).unwrap_or(0);
        let updated = rolled_back.remove(position);
        let notifications = self.notifications.notify_rolled_back(&updated).await;
        let mut chain_notifications = Vec::with_capacity(rolled_back.len());
        for member in &rolled_back {
            chain_notifications.push(self.notifications.notify_rolled_back(member).await);
        }

        Ok(RollbackOutcome {
            request: updated,
            chain_members: rolled_back,
            moves,
            notifications,
            chain_notifications,
        })
    }

    /// Every request executed with `request` as one chain. All of them must
    /// still be executed.
    async fn chain_members(&self, chain: ChainId, request: &SwapRequest) -> Result<Vec<SwapRequest>> {
        let mut members = self.store.list_requests(&RequestFilter::all().in_chain(chain)).await?;
        if !members.iter().any(|r| r.id == request.id) {
            members.push(request.clone());
        }
        if let Some(stale) = members.iter().find(|r| r.status != SwapStatus::Executed) {
            return Err(Error::InvalidStatus {
                id: stale.id,
                reason: format!("chain {} has a {} leg and cannot be rolled back as a unit", chain, stale.status),
            });
        }
        Ok(members)
    }

    pub async fn reject_swap(&self, id: RequestId, reason: impl Into<String>) -> Result<RejectOutcome> {
        let claim = self.in_flight.claim(&[id])?;

        let request = self.load(id).await?;
        if request.status != SwapStatus::Pending {
            return Err(Error::InvalidStatus {
                id,
                reason: format!("cannot reject a {} request", request.status),
            });
        }

        let mut updated = request;
        updated.status = SwapStatus::Rejected;
        updated.resolution_note = Some(reason.into());

        let mut tx = Transaction::new();
        tx.update_request(SwapStatus::Pending, updated.clone());
        self.store.commit(tx).await.map_err(|e| match e {
            StoreError::Conflict { found, .. } => Error::InvalidStatus {
                id,
                reason: format!("changed concurrently to {}", found),
            },
            other => Error::Store(other),
        })?;
        drop(claim);
        info!("Rejected swap {}", id);

        let notifications = self.notifications.notify_rejected(&updated).await;
        Ok(RejectOutcome {
            request: updated,
            notifications,
        })
    }

    pub async fn create_execution_plan(&self, id: RequestId) -> Result<ExecutionPlan> {
        let request = self.load(id).await?;
        Ok(ExecutionPlan::for_request(&request))
    }

    pub fn create_chain_execution_plan(&self, chain: &SwapChain) -> ExecutionPlan {
        ExecutionPlan::for_chain(chain)
    }

    /// Enumerates chains over the current pending requests
    pub async fn discover_chains(&self, max_length: Option<usize>) -> Result<DiscoveryReport> {
        let snapshot = self.snapshot().await?;
        let roster = snapshot.roster();
        let chains = self.chains.clone();
        let requests = snapshot.requests;

        // Enumeration is CPU-bound
        tokio::task::spawn_blocking(move || chains.discover_chains(&requests, &roster, max_length))
            .await
            .map_err(|e| Error::ExecutionFailed(format!("chain discovery task failed: {}", e)))
    }

    /// Discovery followed by priority ranking of the valid chains
    pub async fn plan_chains(&self, max_length: Option<usize>) -> Result<Vec<PlannedChain>> {
        let report = self.discover_chains(max_length).await?;
        Ok(self.chains.plan_execution(&report.chains))
    }

    /// Executes every leg of `chain` atomically
    pub async fn execute_chain(&self, chain: &SwapChain, executed_by: &PersonId) -> Result<ChainOutcome> {
        let claim = self.in_flight.claim(&chain.request_ids())?;

        let roster = self.snapshot().await?.roster();
        let (is_valid, errors) = self.chains.validate_chain(chain, &roster);
        if !is_valid {
            return Err(Error::ExecutionFailed(format!(
                "chain {} is invalid: {}",
                chain.id,
                errors.join("; ")
            )));
        }

        // The roster may have moved since discovery
        for id in chain.request_ids() {
            let request = self.load(id).await?;
            let report = run_validators(&request, &self.validators, true).await;
            if !report.valid {
                warn!("Chain {} blocked by {}: {}", chain.id, id, report.errors().join("; "));
                return Err(Error::ValidationFailed(Box::new(report)));
            }
        }

        let execution = self
            .chains
            .execute_chain(chain, self.store.as_ref(), executed_by, self.clock.now())
            .await?;
        drop(claim);
        info!(
            "Executed chain {} with {} participants",
            chain.id,
            chain.participant_count()
        );

        let mut notifications = Vec::with_capacity(execution.request_ids.len());
        for id in &execution.request_ids {
            match self.store.get_request(*id).await {
                Ok(Some(request)) => notifications.push(self.notifications.notify_executed(&request).await),
                Ok(None) => warn!("Executed request {} vanished before notification", id),
                Err(e) => warn!("Could not load {} for notification: {}", id, e),
            }
        }

        Ok(ChainOutcome {
            execution,
            notifications,
        })
    }

    pub async fn find_exact_matches(&self) -> Result<Vec<ExactMatch>> {
        let snapshot = self.snapshot().await?;
        Ok(self.exact.find_matches_indexed(&snapshot.matchable()))
    }

    pub async fn find_optimal_matching(&self, scores: Option<&PairScores>) -> Result<MatchingResult> {
        let snapshot = self.snapshot().await?;
        let schedule = snapshot.schedule_index();
        Ok(self.graph.find_optimal_matching(&snapshot.matchable(), &schedule, scores))
    }

    pub async fn find_stable_matching(&self, preferences: Option<&PreferenceLists>) -> Result<MatchingResult> {
        let snapshot = self.snapshot().await?;
        let schedule = snapshot.schedule_index();
        Ok(self.graph.find_stable_matching(&snapshot.matchable(), &schedule, preferences))
    }

    /// Scores one request against every other pending request, best first
    pub async fn score_candidates(&self, id: RequestId) -> Result<Vec<CompatibilityScore>> {
        let snapshot = self.snapshot().await?;
        let request = snapshot.request(id).cloned().ok_or(Error::RequestNotFound(id))?;
        let schedule = snapshot.schedule_index();
        Ok(self.scorer.score_many(&request, &snapshot.matchable(), &schedule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Assignment, Person};
    use crate::store::{FaultPlan, InMemoryStore};
    use crate::ErrorCode;
    use chrono::{Duration, Utc};

    fn week(d: &str) -> NaiveDate {
        NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        engine: SwapEngine,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        for id in ["dr-x", "dr-y", "dr-z"] {
            store.add_person(Person::new(id, id.to_uppercase()));
        }
        store.add_assignment(Assignment::new("dr-x", week("2025-01-06"), "inpatient"));
        store.add_assignment(Assignment::new("dr-y", week("2025-01-13"), "inpatient"));
        store.add_assignment(Assignment::new("dr-z", week("2025-01-20"), "clinic"));

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = SwapEngine::builder(store.clone())
            .default_validators()
            .clock(clock.clone())
            .build()
            .unwrap();
        Fixture { store, clock, engine }
    }

    async fn create_reciprocal(f: &Fixture) -> SwapRequest {
        f.engine
            .create_swap_request(NewSwapRequest::reciprocal(
                "dr-x",
                week("2025-01-06"),
                "dr-y",
                week("2025-01-13"),
            ))
            .await
            .unwrap()
            .request
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_person() {
        let f = fixture();
        let err = f
            .engine
            .create_swap_request(NewSwapRequest::reciprocal("dr-q", week("2025-01-06"), "dr-y", week("2025-01-13")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::FacultyNotFound);

        let err = f
            .engine
            .create_swap_request(NewSwapRequest::absorb("dr-x", week("2025-01-06"), Some("dr-q".into())))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::FacultyNotFound);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_shape() {
        let f = fixture();
        let mut new = NewSwapRequest::absorb("dr-x", week("2025-01-06"), Some("dr-y".into()));
        new.target_week = Some(week("2025-01-13"));
        let err = f.engine.create_swap_request(new).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::CreationFailed);
    }

    #[tokio::test]
    async fn test_execute_moves_assignments() {
        let f = fixture();
        let request = create_reciprocal(&f).await;

        let outcome = f.engine.execute_swap(request.id, false).await.unwrap();
        assert!(outcome.executed);
        assert_eq!(outcome.request.status, SwapStatus::Executed);
        assert_eq!(outcome.request.executed_at, Some(f.clock.now()));
        assert_eq!(outcome.request.applied_moves, outcome.moves);
        assert!(outcome.request.chain_id.is_none());
        assert!(f.store.holds(&"dr-y".into(), week("2025-01-06")));
        assert!(f.store.holds(&"dr-x".into(), week("2025-01-13")));

        let err = f.engine.execute_swap(request.id, false).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStatus);
    }

    #[tokio::test]
    async fn test_dry_run_does_not_mutate() {
        let f = fixture();
        let request = create_reciprocal(&f).await;

        let outcome = f.engine.execute_swap(request.id, true).await.unwrap();
        assert!(outcome.would_execute);
        assert!(!outcome.executed);
        assert_eq!(outcome.moves.len(), 2);
        assert_eq!(f.store.commit_count(), 0);
        assert_eq!(f.engine.load(request.id).await.unwrap().status, SwapStatus::Pending);
    }

    #[tokio::test]
    async fn test_validation_failure_blocks_execution() {
        let f = fixture();
        let request = f
            .engine
            .create_swap_request(NewSwapRequest::reciprocal(
                "dr-x",
                week("2025-01-06"),
                "dr-y",
                week("2025-02-03"),
            ))
            .await
            .unwrap()
            .request;

        let err = f.engine.execute_swap(request.id, false).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
        match err {
            Error::ValidationFailed(report) => {
                assert!(report.comprehensive);
                assert!(report.errors().iter().any(|e| e.starts_with("assignments:")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_absorb_without_target_cannot_execute() {
        let f = fixture();
        let request = f
            .engine
            .create_swap_request(NewSwapRequest::absorb("dr-x", week("2025-01-06"), None))
            .await
            .unwrap()
            .request;

        let dry = f.engine.execute_swap(request.id, true).await.unwrap();
        assert!(!dry.would_execute);

        let err = f.engine.execute_swap(request.id, false).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn test_store_failure_reports_execution_failed() {
        let f = fixture();
        let request = create_reciprocal(&f).await;
        f.store.inject_fault(FaultPlan::AssignmentMove(2));

        let err = f.engine.execute_swap(request.id, false).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ExecutionFailed);
        assert_eq!(f.engine.load(request.id).await.unwrap().status, SwapStatus::Pending);
        assert!(f.store.holds(&"dr-x".into(), week("2025-01-06")));
    }

    #[tokio::test]
    async fn test_rollback_restores_assignments() {
        let f = fixture();
        let request = create_reciprocal(&f).await;
        f.engine.execute_swap(request.id, false).await.unwrap();

        f.clock.advance(Duration::hours(2));
        let outcome = f.engine.rollback_swap(request.id, "entered in error").await.unwrap();
        assert_eq!(outcome.request.status, SwapStatus::RolledBack);
        assert_eq!(outcome.request.resolution_note.as_deref(), Some("entered in error"));
        assert!(outcome.request.check_shape().is_ok());
        assert!(f.store.holds(&"dr-x".into(), week("2025-01-06")));
        assert!(f.store.holds(&"dr-y".into(), week("2025-01-13")));
    }

    #[tokio::test]
    async fn test_rollback_requires_executed() {
        let f = fixture();
        let request = create_reciprocal(&f).await;
        let err = f.engine.rollback_swap(request.id, "nope").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStatus);
    }

    #[tokio::test]
    async fn test_reject_only_from_pending() {
        let f = fixture();
        let request = create_reciprocal(&f).await;

        let outcome = f.engine.reject_swap(request.id, "coverage gap").await.unwrap();
        assert_eq!(outcome.request.status, SwapStatus::Rejected);

        let err = f.engine.reject_swap(request.id, "again").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStatus);
        let err = f.engine.execute_swap(request.id, false).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStatus);
    }

    #[tokio::test]
    async fn test_unknown_request() {
        let f = fixture();
        let err = f.engine.execute_swap(RequestId::new(), false).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RequestNotFound);
    }

    #[tokio::test]
    async fn test_in_flight_claim_blocks_second_mutation() {
        let f = fixture();
        let request = create_reciprocal(&f).await;

        let claim = f.engine.in_flight.claim(&[request.id]).unwrap();
        let err = f.engine.execute_swap(request.id, false).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStatus);

        drop(claim);
        assert!(f.engine.execute_swap(request.id, false).await.is_ok());
    }

    #[tokio::test]
    async fn test_auto_match_records_candidates() {
        let f = fixture();
        f.engine
            .create_swap_request(NewSwapRequest::absorb("dr-y", week("2025-01-13"), None))
            .await
            .unwrap();

        let outcome = f
            .engine
            .create_swap_request(NewSwapRequest::absorb("dr-z", week("2025-01-20"), None).with_auto_match())
            .await
            .unwrap();
        let summary = outcome.auto_match.unwrap();
        assert_eq!(summary.counts.get("exact"), Some(&0));
        assert!(summary.counts.contains_key("graph"));
        assert_eq!(outcome.request.status, SwapStatus::Pending);
    }

    #[tokio::test]
    async fn test_score_candidates_sorted() {
        let f = fixture();
        let request = create_reciprocal(&f).await;
        f.engine
            .create_swap_request(NewSwapRequest::absorb("dr-z", week("2025-01-20"), None))
            .await
            .unwrap();
        f.engine
            .create_swap_request(NewSwapRequest::reciprocal(
                "dr-y",
                week("2025-01-13"),
                "dr-x",
                week("2025-01-06"),
            ))
            .await
            .unwrap();

        let scores = f.engine.score_candidates(request.id).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[0].overall_score >= scores[1].overall_score);
    }
}
