pub mod chains;
pub mod exact;
pub mod graph;

pub use chains::{ChainCoordinator, ChainId, ChainNode, ChainPriority, ChainType, DiscoveryReport, PlannedChain, SwapChain};
pub use exact::{ExactMatch, ExactMatcher};
pub use graph::{GraphMatcher, GraphStats, MatchedPair, MatchingAlgorithm, MatchingResult, PairScores, PreferenceLists};

use crate::domain::{RequestId, SwapRequest, SwapSnapshot};
use serde::{Deserialize, Serialize};

/// A counterpart proposed for one request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchCandidate {
    pub request_id: RequestId,
    pub counterpart: RequestId,
    pub score: f64,
    /// Name of the matcher that proposed it
    pub matcher: String,
}

/// Candidate discovery strategy used when a new request asks for auto-matching
pub trait Matcher: Send + Sync {
    /// Returns matcher name
    fn name(&self) -> &str;

    /// Proposes counterparts for `request` among the snapshot's pending requests, best first
    fn candidates_for(&self, request: &SwapRequest, snapshot: &SwapSnapshot) -> Vec<MatchCandidate>;
}
