use crate::domain::{RequestId, ScheduleIndex, SwapRequest, SwapSnapshot};
use crate::math::{max_weight_matching, scale_weight};
use crate::scoring::CompatibilityScorer;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use super::{MatchCandidate, Matcher};

/// Externally supplied pair weights, keyed without regard to order
#[derive(Debug, Clone, Default)]
pub struct PairScores {
    scores: HashMap<(RequestId, RequestId), f64>,
}

impl PairScores {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: RequestId, b: RequestId) -> (RequestId, RequestId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn insert(&mut self, a: RequestId, b: RequestId, score: f64) {
        self.scores.insert(Self::key(a, b), score);
    }

    pub fn get(&self, a: RequestId, b: RequestId) -> Option<f64> {
        self.scores.get(&Self::key(a, b)).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Per-request ordered candidate lists, most preferred first
pub type PreferenceLists = HashMap<RequestId, Vec<RequestId>>;

/// One pair selected by a matching algorithm
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchedPair {
    pub request_a: RequestId,
    pub request_b: RequestId,
    pub weight: f64,
}

/// Which algorithm produced a [`MatchingResult`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchingAlgorithm {
    MaximumWeight,
    GreedyStable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub matched_pairs: usize,
    pub average_matched_weight: f64,
}

/// Outcome of a graph matching run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingResult {
    pub algorithm: MatchingAlgorithm,
    pub pairs: Vec<MatchedPair>,
    pub total_weight: f64,
    pub unmatched: Vec<RequestId>,
    pub stats: GraphStats,
}

impl MatchingResult {
    fn assemble(
        algorithm: MatchingAlgorithm,
        requests: &[&SwapRequest],
        pairs: Vec<MatchedPair>,
        edge_count: usize,
    ) -> Self {
        let matched: HashSet<RequestId> = pairs
            .iter()
            .flat_map(|p| [p.request_a, p.request_b])
            .collect();
        let unmatched = requests
            .iter()
            .map(|r| r.id)
            .filter(|id| !matched.contains(id))
            .collect();
        let total_weight: f64 = pairs.iter().map(|p| p.weight).sum();
        let average_matched_weight = if pairs.is_empty() {
            0.0
        } else {
            total_weight / pairs.len() as f64
        };

        Self {
            algorithm,
            stats: GraphStats {
                node_count: requests.len(),
                edge_count,
                matched_pairs: pairs.len(),
                average_matched_weight,
            },
            pairs,
            total_weight,
            unmatched,
        }
    }
}

/// Undirected compatibility graph over pending request ids
#[derive(Debug, Clone)]
pub struct CompatibilityGraph {
    pub graph: UnGraph<RequestId, f64>,
    pub nodes: HashMap<RequestId, NodeIndex>,
}

impl CompatibilityGraph {
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn weight(&self, a: RequestId, b: RequestId) -> Option<f64> {
        let (na, nb) = (*self.nodes.get(&a)?, *self.nodes.get(&b)?);
        self.graph.find_edge(na, nb).map(|e| self.graph[e])
    }
}

/// Graph-based optimal pairing of pending requests
#[derive(Clone)]
pub struct GraphMatcher {
    scorer: CompatibilityScorer,

    /// Edges at or below this weight are left out of the graph
    edge_threshold: f64,
}

impl GraphMatcher {
    pub fn new(scorer: CompatibilityScorer, edge_threshold: f64) -> Self {
        Self {
            scorer,
            edge_threshold,
        }
    }

    pub fn edge_threshold(&self) -> f64 {
        self.edge_threshold
    }

    /// Builds the weighted compatibility graph.
    ///
    /// With `scores` supplied only those pairs become edges; otherwise every
    /// pair is scored. Either way an edge needs weight above the threshold.
    pub fn build_graph(
        &self,
        requests: &[SwapRequest],
        schedule: &ScheduleIndex,
        scores: Option<&PairScores>,
    ) -> CompatibilityGraph {
        let pending: Vec<&SwapRequest> = requests.iter().filter(|r| r.is_pending()).collect();
        self.build_pending_graph(&pending, schedule, scores)
    }

    fn build_pending_graph(
        &self,
        pending: &[&SwapRequest],
        schedule: &ScheduleIndex,
        scores: Option<&PairScores>,
    ) -> CompatibilityGraph {
        let mut graph = UnGraph::new_undirected();
        let mut nodes = HashMap::new();
        for request in pending {
            nodes.insert(request.id, graph.add_node(request.id));
        }

        let pairs: Vec<(usize, usize)> = (0..pending.len())
            .flat_map(|i| ((i + 1)..pending.len()).map(move |j| (i, j)))
            .collect();

        let weighted: Vec<(usize, usize, f64)> = pairs
            .par_iter()
            .filter_map(|&(i, j)| {
                let (a, b) = (pending[i], pending[j]);
                let weight = match scores {
                    Some(supplied) => supplied.get(a.id, b.id)?,
                    None => self.scorer.score(a, b, schedule).overall_score,
                };
                (weight > self.edge_threshold).then_some((i, j, weight))
            })
            .collect();

        for (i, j, weight) in weighted {
            graph.add_edge(nodes[&pending[i].id], nodes[&pending[j].id], weight);
        }

        debug!(
            "Compatibility graph: {} nodes, {} edges (threshold {})",
            graph.node_count(),
            graph.edge_count(),
            self.edge_threshold
        );
        CompatibilityGraph { graph, nodes }
    }

    /// Computes a maximum-weight matching over the compatibility graph
    pub fn find_optimal_matching(
        &self,
        requests: &[SwapRequest],
        schedule: &ScheduleIndex,
        scores: Option<&PairScores>,
    ) -> MatchingResult {
        let pending: Vec<&SwapRequest> = requests.iter().filter(|r| r.is_pending()).collect();
        let compat = self.build_pending_graph(&pending, schedule, scores);

        let edges: Vec<(usize, usize, i64)> = compat
            .graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), scale_weight(*e.weight())))
            .collect();
        let mate = max_weight_matching(compat.node_count(), &edges);

        let mut pairs = Vec::new();
        for (v, partner) in mate.iter().enumerate() {
            let Some(u) = *partner else { continue };
            if u <= v {
                continue;
            }
            let (nv, nu) = (NodeIndex::new(v), NodeIndex::new(u));
            if let Some(edge) = compat.graph.find_edge(nv, nu) {
                pairs.push(MatchedPair {
                    request_a: compat.graph[nv],
                    request_b: compat.graph[nu],
                    weight: compat.graph[edge],
                });
            }
        }

        let result = MatchingResult::assemble(MatchingAlgorithm::MaximumWeight, &pending, pairs, compat.edge_count());
        info!(
            "Maximum-weight matching: {} pairs, total weight {:.4}, {} unmatched",
            result.pairs.len(),
            result.total_weight,
            result.unmatched.len()
        );
        result
    }

    /// Greedy deterministic pairing from per-request preference lists.
    ///
    /// Requests are visited in input order; each takes its most preferred
    /// candidate that is still unmatched.
    pub fn find_stable_matching(
        &self,
        requests: &[SwapRequest],
        schedule: &ScheduleIndex,
        preferences: Option<&PreferenceLists>,
    ) -> MatchingResult {
        let pending: Vec<&SwapRequest> = requests.iter().filter(|r| r.is_pending()).collect();
        let by_id: HashMap<RequestId, &SwapRequest> = pending.iter().map(|r| (r.id, *r)).collect();

        let (lists, edge_count, known) = match preferences {
            Some(supplied) => {
                // Supplied orderings still only pair requests above the edge threshold
                let mut lists = PreferenceLists::new();
                let mut edges = HashSet::new();
                for (id, candidates) in supplied {
                    let Some(request) = by_id.get(id) else {
                        continue;
                    };
                    let kept: Vec<RequestId> = candidates
                        .iter()
                        .filter(|c| *c != id)
                        .filter(|c| {
                            by_id.get(*c).is_some_and(|other| {
                                self.scorer.score(request, other, schedule).overall_score > self.edge_threshold
                            })
                        })
                        .copied()
                        .collect();
                    edges.extend(kept.iter().map(|c| PairScores::key(*id, *c)));
                    lists.insert(*id, kept);
                }
                (lists, edges.len(), None)
            }
            None => {
                let compat = self.build_pending_graph(&pending, schedule, None);
                let lists = preference_lists(&pending, &compat);
                let edge_count = compat.edge_count();
                (lists, edge_count, Some(compat))
            }
        };

        let mut matched: HashSet<RequestId> = HashSet::new();
        let mut pairs = Vec::new();
        for request in &pending {
            if matched.contains(&request.id) {
                continue;
            }
            let Some(candidates) = lists.get(&request.id) else {
                continue;
            };
            let choice = candidates
                .iter()
                .find(|c| **c != request.id && by_id.contains_key(*c) && !matched.contains(*c));
            if let Some(&partner) = choice {
                let weight = known
                    .as_ref()
                    .and_then(|g| g.weight(request.id, partner))
                    .unwrap_or_else(|| self.scorer.score(request, by_id[&partner], schedule).overall_score);
                matched.insert(request.id);
                matched.insert(partner);
                pairs.push(MatchedPair {
                    request_a: request.id,
                    request_b: partner,
                    weight,
                });
            }
        }

        let result = MatchingResult::assemble(MatchingAlgorithm::GreedyStable, &pending, pairs, edge_count);
        info!(
            "Greedy stable matching: {} pairs, total weight {:.4}",
            result.pairs.len(),
            result.total_weight
        );
        result
    }
}

/// Candidates per request sorted by descending edge weight, ties in input order
fn preference_lists(pending: &[&SwapRequest], compat: &CompatibilityGraph) -> PreferenceLists {
    let order: HashMap<RequestId, usize> = pending.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
    let mut lists = PreferenceLists::new();

    for request in pending {
        let node = compat.nodes[&request.id];
        let mut ranked: Vec<(RequestId, f64)> = compat
            .graph
            .edges(node)
            .map(|e| {
                let other = if e.source() == node { e.target() } else { e.source() };
                (compat.graph[other], *e.weight())
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| order[&a.0].cmp(&order[&b.0]))
        });
        lists.insert(request.id, ranked.into_iter().map(|(id, _)| id).collect());
    }
    lists
}

impl Matcher for GraphMatcher {
    fn name(&self) -> &str {
        "graph"
    }

    fn candidates_for(&self, request: &SwapRequest, snapshot: &SwapSnapshot) -> Vec<MatchCandidate> {
        let schedule = snapshot.schedule_index();
        self.scorer
            .score_many(request, &snapshot.matchable(), &schedule)
            .into_iter()
            .filter(|s| s.compatible && s.overall_score > self.edge_threshold)
            .map(|s| MatchCandidate {
                request_id: request.id,
                counterpart: s.request_b,
                score: s.overall_score,
                matcher: self.name().to_string(),
            })
            .collect()
    }
}
