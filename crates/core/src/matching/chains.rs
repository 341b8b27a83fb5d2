//! Multi-party swap discovery.
//!
//! Pending requests that name both a target person and a target week become
//! edges `source -> target` of a directed preference graph over persons. A
//! simple cycle in that graph is a closed ring of trades, a simple path is an
//! open chain. Enumeration is bounded by [`SearchBudget`], so discovery on a
//! dense request pool returns partial results with a note instead of hanging.

pub use crate::domain::ChainId;

use crate::domain::{AssignmentMove, Person, PersonId, RequestId, SwapRequest, SwapStatus};
use crate::math::{bounded_simple_cycles, bounded_simple_paths, SearchBudget};
use crate::store::{StoreError, SwapStore, Transaction};
use crate::{EngineConfig, Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One participant's leg of a chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainNode {
    /// Participant
    pub person: PersonId,

    /// Week this participant hands over
    pub gives_week: NaiveDate,

    /// Week this participant takes from the next participant
    pub receives_week: NaiveDate,

    /// Request this leg was derived from
    pub originating_request_id: RequestId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChainType {
    /// Closed ring; the last participant receives the first one's week
    Cycle,
    /// Open sequence
    Linear,
}

/// A discovered multi-party trade
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwapChain {
    pub id: ChainId,
    pub chain_type: ChainType,
    pub nodes: Vec<ChainNode>,
    pub is_valid: bool,
    pub validation_errors: Vec<String>,
}

impl SwapChain {
    pub fn new(chain_type: ChainType, nodes: Vec<ChainNode>) -> Self {
        Self {
            id: ChainId::new(),
            chain_type,
            nodes,
            is_valid: false,
            validation_errors: Vec::new(),
        }
    }

    pub fn participant_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn request_ids(&self) -> Vec<RequestId> {
        self.nodes.iter().map(|n| n.originating_request_id).collect()
    }

    pub fn participants(&self) -> impl Iterator<Item = &PersonId> {
        self.nodes.iter().map(|n| &n.person)
    }

    /// The participant handing node `i` its received week. An open chain's
    /// last node has none inside the chain.
    pub fn supplier(&self, i: usize) -> Option<&ChainNode> {
        match self.chain_type {
            ChainType::Cycle if !self.nodes.is_empty() => self.nodes.get((i + 1) % self.nodes.len()),
            ChainType::Cycle => None,
            ChainType::Linear => self.nodes.get(i + 1),
        }
    }

    /// The move that completes node `i`'s leg, if a participant supplies it
    pub fn leg_move(&self, i: usize) -> Option<AssignmentMove> {
        let node = self.nodes.get(i)?;
        let supplier = self.supplier(i)?;
        Some(AssignmentMove::new(
            node.receives_week,
            supplier.person.clone(),
            node.person.clone(),
        ))
    }
}

/// Edge payload: the request behind a `source -> target` preference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceEdge {
    pub request_id: RequestId,
    pub source_week: NaiveDate,
    pub target_week: NaiveDate,
}

/// Directed "wants a week from" graph over persons
#[derive(Debug, Clone, Default)]
pub struct PreferenceGraph {
    pub graph: DiGraph<PersonId, PreferenceEdge>,
    nodes: HashMap<PersonId, NodeIndex>,
}

impl PreferenceGraph {
    fn node(&mut self, person: &PersonId) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(person) {
            return idx;
        }
        let idx = self.graph.add_node(person.clone());
        self.nodes.insert(person.clone(), idx);
        idx
    }

    pub fn person_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Outcome of one discovery run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Every materialized chain, cycles first; invalid ones carry their errors
    pub chains: Vec<SwapChain>,

    pub cycles_found: usize,

    pub linear_found: usize,

    /// Candidates dropped because a participant could not be resolved
    pub discarded: usize,

    /// Set when the search budget ran out before enumeration finished
    pub truncated: bool,

    pub note: Option<String>,
}

impl DiscoveryReport {
    pub fn valid_chains(&self) -> impl Iterator<Item = &SwapChain> {
        self.chains.iter().filter(|c| c.is_valid)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChainPriority {
    High,
    Normal,
}

/// A valid chain with its place in the execution order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedChain {
    /// 1-based position in execution order
    pub rank: usize,
    pub priority: ChainPriority,
    pub chain: SwapChain,
}

/// Result of committing a chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainExecution {
    pub chain_id: ChainId,
    pub request_ids: Vec<RequestId>,
    pub executed_at: DateTime<Utc>,
    pub executed_by: PersonId,
}

/// Discovers, validates, ranks and commits multi-party chains
#[derive(Debug, Clone)]
pub struct ChainCoordinator {
    /// Longest chain, in participants
    max_length: usize,

    /// Candidate cap across cycles and paths
    max_results: usize,

    /// Wall-clock cap for one discovery run
    time_budget: Duration,

    include_linear: bool,

    /// Participant count at which a chain becomes high priority
    high_priority_participants: usize,
}

impl ChainCoordinator {
    pub fn new(max_length: usize, max_results: usize, time_budget: Duration) -> Self {
        Self {
            max_length,
            max_results,
            time_budget,
            include_linear: true,
            high_priority_participants: 4,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_length: config.max_chain_length,
            max_results: config.max_chain_results,
            time_budget: config.discovery_budget(),
            include_linear: config.include_linear_chains,
            high_priority_participants: config.high_priority_participants,
        }
    }

    pub fn with_linear_chains(mut self, include: bool) -> Self {
        self.include_linear = include;
        self
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Builds the preference graph from fully specified pending requests
    pub fn build_graph(&self, requests: &[SwapRequest]) -> PreferenceGraph {
        let mut graph = PreferenceGraph::default();

        for request in requests.iter().filter(|r| r.is_pending()) {
            let Some((target, target_week)) = request.desired_slot() else {
                continue;
            };
            let from = graph.node(&request.source_person);
            let to = graph.node(target);
            graph.graph.add_edge(
                from,
                to,
                PreferenceEdge {
                    request_id: request.id,
                    source_week: request.source_week,
                    target_week,
                },
            );
        }

        debug!(
            "Preference graph: {} persons, {} edges",
            graph.person_count(),
            graph.edge_count()
        );
        graph
    }

    /// Enumerates and validates cycles (and optionally linear chains).
    ///
    /// `max_length` overrides the configured bound for this run.
    pub fn discover_chains(
        &self,
        requests: &[SwapRequest],
        roster: &HashMap<PersonId, Person>,
        max_length: Option<usize>,
    ) -> DiscoveryReport {
        let max_length = max_length.unwrap_or(self.max_length);
        let graph = self.build_graph(requests);
        let mut budget = SearchBudget::new(self.max_results, self.time_budget);
        let mut report = DiscoveryReport::default();

        for edges in bounded_simple_cycles(&graph.graph, max_length, &mut budget) {
            match self.materialize(&graph, &edges, ChainType::Cycle, roster) {
                Some(chain) => {
                    report.cycles_found += 1;
                    report.chains.push(chain);
                }
                None => report.discarded += 1,
            }
        }

        if self.include_linear && !budget.is_exhausted() {
            for edges in bounded_simple_paths(&graph.graph, 2, max_length, &mut budget) {
                match self.materialize(&graph, &edges, ChainType::Linear, roster) {
                    Some(chain) => {
                        report.linear_found += 1;
                        report.chains.push(chain);
                    }
                    None => report.discarded += 1,
                }
            }
        }

        if budget.is_exhausted() {
            report.truncated = true;
            let note = format!(
                "search budget exhausted after {} candidates; results are partial",
                budget.found()
            );
            warn!("Chain discovery truncated: {}", note);
            report.note = Some(note);
        }

        info!(
            "Discovered {} cycles and {} linear chains ({} valid, {} discarded)",
            report.cycles_found,
            report.linear_found,
            report.valid_chains().count(),
            report.discarded
        );
        report
    }

    /// Turns an edge sequence into a validated chain, or `None` if any
    /// participant is missing from the roster
    fn materialize(
        &self,
        graph: &PreferenceGraph,
        edges: &[EdgeIndex],
        chain_type: ChainType,
        roster: &HashMap<PersonId, Person>,
    ) -> Option<SwapChain> {
        let mut nodes = Vec::with_capacity(edges.len());

        for &edge in edges {
            let (from, to) = graph.graph.edge_endpoints(edge)?;
            let person = &graph.graph[from];
            if !roster.contains_key(person) || !roster.contains_key(&graph.graph[to]) {
                debug!("Discarding candidate: unresolved participant around {}", person);
                return None;
            }
            let payload = &graph.graph[edge];
            nodes.push(ChainNode {
                person: person.clone(),
                gives_week: payload.source_week,
                receives_week: payload.target_week,
                originating_request_id: payload.request_id,
            });
        }

        if nodes.len() < 2 {
            return None;
        }

        let mut chain = SwapChain::new(chain_type, nodes);
        let (is_valid, errors) = self.validate_chain(&chain, roster);
        chain.is_valid = is_valid;
        chain.validation_errors = errors;
        Some(chain)
    }

    /// Checks chain structure. Business-rule failures are returned as data.
    pub fn validate_chain(&self, chain: &SwapChain, roster: &HashMap<PersonId, Person>) -> (bool, Vec<String>) {
        let mut errors = Vec::new();

        if chain.nodes.len() < 2 {
            errors.push(format!("chain needs at least 2 participants, has {}", chain.nodes.len()));
            return (false, errors);
        }

        if chain.chain_type == ChainType::Cycle {
            let first = &chain.nodes[0];
            let last = &chain.nodes[chain.nodes.len() - 1];
            if last.receives_week != first.gives_week {
                errors.push(format!(
                    "cycle does not close: last receives {} but first gives {}",
                    last.receives_week, first.gives_week
                ));
            }
        }

        if chain.chain_type == ChainType::Linear {
            let last = &chain.nodes[chain.nodes.len() - 1];
            errors.push(format!(
                "open chain: {} would receive week {} from someone outside the chain",
                last.person, last.receives_week
            ));
        }

        for (i, pair) in chain.nodes.windows(2).enumerate() {
            if pair[0].receives_week != pair[1].gives_week {
                errors.push(format!(
                    "broken link at position {}: {} receives {} but {} gives {}",
                    i, pair[0].person, pair[0].receives_week, pair[1].person, pair[1].gives_week
                ));
            }
        }

        let mut given = HashSet::new();
        for node in &chain.nodes {
            if !given.insert(node.gives_week) {
                errors.push(format!("week {} is given more than once", node.gives_week));
            }
        }

        for person in chain.participants() {
            match roster.get(person) {
                None => errors.push(format!("participant {} not found", person)),
                Some(p) if !p.active => errors.push(format!("participant {} is inactive", person)),
                Some(_) => {}
            }
        }

        (errors.is_empty(), errors)
    }

    /// Orders valid chains for execution, largest first
    pub fn plan_execution(&self, chains: &[SwapChain]) -> Vec<PlannedChain> {
        let mut valid: Vec<&SwapChain> = chains.iter().filter(|c| c.is_valid).collect();
        valid.sort_by(|a, b| b.participant_count().cmp(&a.participant_count()));

        valid
            .into_iter()
            .enumerate()
            .map(|(i, chain)| PlannedChain {
                rank: i + 1,
                priority: if chain.participant_count() >= self.high_priority_participants {
                    ChainPriority::High
                } else {
                    ChainPriority::Normal
                },
                chain: chain.clone(),
            })
            .collect()
    }

    /// Builds the single transaction that executes every leg of `chain`.
    ///
    /// Each leg marks its request executed and moves the received week from
    /// the supplying participant. No week held outside the chain moves.
    pub fn build_transaction(
        &self,
        chain: &SwapChain,
        requests: &HashMap<RequestId, SwapRequest>,
        executed_by: &PersonId,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        let mut tx = Transaction::new();

        for (i, node) in chain.nodes.iter().enumerate() {
            let id = node.originating_request_id;
            let request = requests.get(&id).ok_or(Error::RequestNotFound(id))?;

            if request.status != SwapStatus::Pending {
                return Err(Error::InvalidStatus {
                    id,
                    reason: format!("chain {} needs pending requests, found {}", chain.id, request.status),
                });
            }

            let (Some(supplier), Some(mv)) = (chain.supplier(i), chain.leg_move(i)) else {
                return Err(Error::ExecutionFailed(format!(
                    "chain {}: no participant supplies week {} to {}",
                    chain.id, node.receives_week, node.person
                )));
            };

            let matches_leg = request.desired_slot().is_some_and(|(target, week)| {
                request.source_person == node.person
                    && request.source_week == node.gives_week
                    && *target == supplier.person
                    && week == node.receives_week
            });
            if !matches_leg {
                return Err(Error::ExecutionFailed(format!(
                    "chain {}: request {} no longer matches its leg",
                    chain.id, id
                )));
            }

            let mut updated = request.clone();
            updated.status = SwapStatus::Executed;
            updated.executed_at = Some(now);
            updated.executed_by = Some(executed_by.clone());
            updated.chain_id = Some(chain.id);
            updated.applied_moves = vec![mv.clone()];

            tx.update_request(SwapStatus::Pending, updated)
                .move_assignment(mv.week, mv.from, mv.to);
        }

        Ok(tx)
    }

    /// Commits every leg of `chain` in one store transaction, or none of them
    pub async fn execute_chain(
        &self,
        chain: &SwapChain,
        store: &dyn SwapStore,
        executed_by: &PersonId,
        now: DateTime<Utc>,
    ) -> Result<ChainExecution> {
        let mut requests = HashMap::with_capacity(chain.nodes.len());
        for id in chain.request_ids() {
            let request = store
                .get_request(id)
                .await
                .map_err(|e| Error::ExecutionFailed(format!("chain {}: {}", chain.id, e)))?
                .ok_or(Error::RequestNotFound(id))?;
            requests.insert(id, request);
        }

        let tx = self.build_transaction(chain, &requests, executed_by, now)?;
        info!("Executing chain {} ({} legs, {} ops)", chain.id, chain.nodes.len(), tx.len());

        store.commit(tx).await.map_err(|e| match e {
            StoreError::Conflict { id, found, .. } => Error::InvalidStatus {
                id,
                reason: format!("changed concurrently to {} during chain {}", found, chain.id),
            },
            other => Error::ExecutionFailed(format!("chain {}: {}", chain.id, other)),
        })?;

        Ok(ChainExecution {
            chain_id: chain.id,
            request_ids: chain.request_ids(),
            executed_at: now,
            executed_by: executed_by.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Assignment, SwapSnapshot};
    use crate::store::{FaultPlan, InMemoryStore};

    fn week(d: &str) -> NaiveDate {
        NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()
    }

    fn roster(ids: &[&str]) -> HashMap<PersonId, Person> {
        ids.iter()
            .map(|id| (PersonId::from(*id), Person::new(*id, id.to_uppercase())))
            .collect()
    }

    fn coordinator() -> ChainCoordinator {
        ChainCoordinator::new(5, 1_000, Duration::from_secs(5)).with_linear_chains(false)
    }

    /// A gives w1 wants B's w2; B gives w2 wants C's w3; C gives w3 wants A's w1
    fn three_cycle() -> Vec<SwapRequest> {
        let now = Utc::now();
        vec![
            SwapRequest::reciprocal("a", week("2025-01-06"), "b", week("2025-01-13"), now),
            SwapRequest::reciprocal("b", week("2025-01-13"), "c", week("2025-01-20"), now),
            SwapRequest::reciprocal("c", week("2025-01-20"), "a", week("2025-01-06"), now),
        ]
    }

    fn node(person: &str, gives: &str, receives: &str) -> ChainNode {
        ChainNode {
            person: person.into(),
            gives_week: week(gives),
            receives_week: week(receives),
            originating_request_id: RequestId::new(),
        }
    }

    #[test]
    fn test_discovers_three_cycle() {
        let report = coordinator().discover_chains(&three_cycle(), &roster(&["a", "b", "c"]), None);

        assert_eq!(report.cycles_found, 1);
        assert!(!report.truncated);
        let chain = &report.chains[0];
        assert_eq!(chain.chain_type, ChainType::Cycle);
        assert_eq!(chain.participant_count(), 3);
        assert!(chain.is_valid, "{:?}", chain.validation_errors);
    }

    #[test]
    fn test_length_bound_excludes_long_cycles() {
        let report = coordinator().discover_chains(&three_cycle(), &roster(&["a", "b", "c"]), Some(2));
        assert!(report.chains.is_empty());
    }

    #[test]
    fn test_unresolved_participant_discards_candidate() {
        let report = coordinator().discover_chains(&three_cycle(), &roster(&["a", "b"]), None);
        assert!(report.chains.is_empty());
        assert_eq!(report.discarded, 1);
    }

    #[test]
    fn test_non_pending_requests_are_not_edges() {
        let mut requests = three_cycle();
        requests[1].status = SwapStatus::Rejected;
        let graph = coordinator().build_graph(&requests);
        assert_eq!(graph.edge_count(), 2);

        let report = coordinator().discover_chains(&requests, &roster(&["a", "b", "c"]), None);
        assert_eq!(report.cycles_found, 0);
    }

    #[test]
    fn test_linear_chains_included() {
        let requests = three_cycle();
        let coordinator = coordinator().with_linear_chains(true);
        let report = coordinator.discover_chains(&requests[..2], &roster(&["a", "b", "c"]), None);

        assert_eq!(report.cycles_found, 0);
        assert_eq!(report.linear_found, 1);
        let chain = &report.chains[0];
        assert_eq!(chain.chain_type, ChainType::Linear);
        assert!(!chain.is_valid);
        assert!(chain.validation_errors.iter().any(|e| e.starts_with("open chain")));
        assert!(chain.leg_move(0).is_some());
        assert!(chain.leg_move(1).is_none());
    }

    #[test]
    fn test_cycle_of_requests_yields_open_chains_that_never_plan() {
        let coordinator = coordinator().with_linear_chains(true);
        let report = coordinator.discover_chains(&three_cycle(), &roster(&["a", "b", "c"]), None);

        assert_eq!(report.cycles_found, 1);
        assert_eq!(report.linear_found, 3);
        assert_eq!(report.valid_chains().count(), 1);

        let plan = coordinator.plan_execution(&report.chains);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].chain.chain_type, ChainType::Cycle);
    }

    #[test]
    fn test_validate_rejects_inactive_participant() {
        let mut people = roster(&["a", "b"]);
        if let Some(b) = people.get_mut(&PersonId::from("b")) {
            b.active = false;
        }
        let chain = SwapChain::new(
            ChainType::Cycle,
            vec![node("a", "2025-01-06", "2025-01-13"), node("b", "2025-01-13", "2025-01-06")],
        );
        let (valid, errors) = coordinator().validate_chain(&chain, &people);
        assert!(!valid);
        assert_eq!(errors, vec!["participant b is inactive".to_string()]);
    }

    #[test]
    fn test_result_cap_truncates_with_note() {
        let coordinator = ChainCoordinator::new(5, 1, Duration::from_secs(5));
        let now = Utc::now();
        let mut requests = three_cycle();
        requests.push(SwapRequest::reciprocal("d", week("2025-02-03"), "e", week("2025-02-10"), now));
        requests.push(SwapRequest::reciprocal("e", week("2025-02-10"), "d", week("2025-02-03"), now));

        let report = coordinator.discover_chains(&requests, &roster(&["a", "b", "c", "d", "e"]), None);
        assert!(report.truncated);
        assert!(report.note.is_some());
        assert_eq!(report.chains.len(), 1);
    }

    #[test]
    fn test_validate_rejects_single_node() {
        let chain = SwapChain::new(ChainType::Linear, vec![node("a", "2025-01-06", "2025-01-13")]);
        let (valid, errors) = coordinator().validate_chain(&chain, &roster(&["a"]));
        assert!(!valid);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_validate_rejects_open_cycle() {
        let chain = SwapChain::new(
            ChainType::Cycle,
            vec![
                node("a", "2025-01-06", "2025-01-13"),
                node("b", "2025-01-13", "2025-01-20"),
            ],
        );
        let (valid, errors) = coordinator().validate_chain(&chain, &roster(&["a", "b"]));
        assert!(!valid);
        assert!(errors.iter().any(|e| e.contains("cycle does not close")));
    }

    #[test]
    fn test_validate_rejects_repeated_gives_week() {
        let chain = SwapChain::new(
            ChainType::Cycle,
            vec![
                node("a", "2025-01-06", "2025-01-06"),
                node("b", "2025-01-06", "2025-01-06"),
            ],
        );
        let (valid, errors) = coordinator().validate_chain(&chain, &roster(&["a", "b"]));
        assert!(!valid);
        assert!(errors.iter().any(|e| e.contains("given more than once")));
    }

    #[test]
    fn test_validate_rejects_unknown_participant() {
        let chain = SwapChain::new(
            ChainType::Cycle,
            vec![
                node("a", "2025-01-06", "2025-01-13"),
                node("ghost", "2025-01-13", "2025-01-06"),
            ],
        );
        let (valid, errors) = coordinator().validate_chain(&chain, &roster(&["a"]));
        assert!(!valid);
        assert!(errors.iter().any(|e| e.contains("ghost")));
    }

    #[test]
    fn test_plan_ranks_by_size() {
        let coordinator = coordinator();
        let people = roster(&["a", "b", "c", "d"]);
        let mut small = SwapChain::new(
            ChainType::Cycle,
            vec![node("a", "2025-01-06", "2025-01-13"), node("b", "2025-01-13", "2025-01-06")],
        );
        let mut large = SwapChain::new(
            ChainType::Cycle,
            vec![
                node("a", "2025-01-06", "2025-01-13"),
                node("b", "2025-01-13", "2025-01-20"),
                node("c", "2025-01-20", "2025-01-27"),
                node("d", "2025-01-27", "2025-01-06"),
            ],
        );
        for chain in [&mut small, &mut large] {
            let (valid, errors) = coordinator.validate_chain(chain, &people);
            chain.is_valid = valid;
            chain.validation_errors = errors;
        }
        let invalid = SwapChain::new(ChainType::Linear, vec![node("a", "2025-01-06", "2025-01-13")]);

        let plan = coordinator.plan_execution(&[small.clone(), invalid, large.clone()]);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].chain.id, large.id);
        assert_eq!(plan[0].priority, ChainPriority::High);
        assert_eq!(plan[1].rank, 2);
        assert_eq!(plan[1].priority, ChainPriority::Normal);
    }

    fn seeded_store(requests: Vec<SwapRequest>) -> InMemoryStore {
        let people = vec![Person::new("a", "A"), Person::new("b", "B"), Person::new("c", "C")];
        let assignments = vec![
            Assignment::new("a", week("2025-01-06"), "clinic"),
            Assignment::new("b", week("2025-01-13"), "clinic"),
            Assignment::new("c", week("2025-01-20"), "clinic"),
        ];
        InMemoryStore::from_snapshot(SwapSnapshot::new(requests, people, assignments))
    }

    #[tokio::test]
    async fn test_execute_chain_moves_every_week() {
        let requests = three_cycle();
        let store = seeded_store(requests.clone());
        let coordinator = coordinator();
        let report = coordinator.discover_chains(&requests, &store.current().roster(), None);
        let now = Utc::now();

        let execution = coordinator
            .execute_chain(&report.chains[0], &store, &"coordinator".into(), now)
            .await
            .unwrap();
        assert_eq!(execution.request_ids.len(), 3);

        let state = store.current();
        assert!(state.requests.iter().all(|r| r.status == SwapStatus::Executed));
        assert!(state.requests.iter().all(|r| r.executed_at == Some(now)));
        assert!(store.holds(&"a".into(), week("2025-01-13")));
        assert!(store.holds(&"b".into(), week("2025-01-20")));
        assert!(store.holds(&"c".into(), week("2025-01-06")));

        let chain_id = report.chains[0].id;
        for request in &state.requests {
            assert_eq!(request.chain_id, Some(chain_id));
            assert_eq!(request.applied_moves.len(), 1);
            assert_eq!(request.applied_moves[0].to, request.source_person);
        }
    }

    #[tokio::test]
    async fn test_open_chain_transaction_is_refused() {
        let requests = three_cycle();
        let store = seeded_store(requests.clone());
        let coordinator = coordinator().with_linear_chains(true);
        let report = coordinator.discover_chains(&requests[..2], &store.current().roster(), None);
        let chain = &report.chains[0];
        assert_eq!(chain.chain_type, ChainType::Linear);

        let err = coordinator
            .execute_chain(chain, &store, &"coordinator".into(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::ExecutionFailed);
        assert_eq!(store.commit_count(), 0);
        assert!(store.holds(&"c".into(), week("2025-01-20")));
    }

    #[tokio::test]
    async fn test_execute_chain_failure_reverts_everything() {
        let requests = three_cycle();
        let store = seeded_store(requests.clone());
        store.inject_fault(FaultPlan::RequestUpdate(2));
        let coordinator = coordinator();
        let report = coordinator.discover_chains(&requests, &store.current().roster(), None);

        let err = coordinator
            .execute_chain(&report.chains[0], &store, &"coordinator".into(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::ExecutionFailed);
        assert!(store.current().requests.iter().all(|r| r.status == SwapStatus::Pending));
        assert!(store.holds(&"a".into(), week("2025-01-06")));
    }
}
