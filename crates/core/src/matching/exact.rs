use crate::domain::{PersonId, RequestId, SwapRequest, SwapSnapshot, SwapType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use super::{MatchCandidate, Matcher};

/// Score reported for every exact reciprocal match
pub const EXACT_MATCH_SCORE: f64 = 1.0;

/// Two requests that want exactly what the other offers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExactMatch {
    pub request_a: RequestId,
    pub request_b: RequestId,
    pub person_a: PersonId,
    pub person_b: PersonId,
    /// Week `person_a` gives (and `person_b` receives)
    pub week_a: NaiveDate,
    /// Week `person_b` gives (and `person_a` receives)
    pub week_b: NaiveDate,
    pub score: f64,
}

impl ExactMatch {
    fn new(a: &SwapRequest, b: &SwapRequest) -> Self {
        Self {
            request_a: a.id,
            request_b: b.id,
            person_a: a.source_person.clone(),
            person_b: b.source_person.clone(),
            week_a: a.source_week,
            week_b: b.source_week,
            score: EXACT_MATCH_SCORE,
        }
    }

    pub fn involves(&self, id: RequestId) -> bool {
        self.request_a == id || self.request_b == id
    }
}

/// Detects mutual reciprocal matches among pending requests.
///
/// [`ExactMatcher::find_matches`] is a pairwise O(n^2) scan, which is the
/// scalability ceiling for large request pools; [`ExactMatcher::find_matches_indexed`]
/// keys requests by offered (person, week) and returns the same matches in
/// the same order in roughly linear time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatcher;

impl ExactMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Checks the symmetric predicate: each wants exactly what the other offers
    pub fn is_mutual(a: &SwapRequest, b: &SwapRequest) -> bool {
        if a.id == b.id {
            return false;
        }
        a.desired_slot() == Some(b.offered_slot()) && b.desired_slot() == Some(a.offered_slot())
    }

    fn eligible(request: &SwapRequest) -> bool {
        request.is_pending() && request.swap_type == SwapType::Reciprocal
    }

    /// Finds all exact matches with a pairwise scan
    pub fn find_matches(&self, requests: &[SwapRequest]) -> Vec<ExactMatch> {
        let eligible: Vec<&SwapRequest> = requests.iter().filter(|r| Self::eligible(r)).collect();
        let mut matches = Vec::new();

        for (i, a) in eligible.iter().enumerate() {
            for b in eligible.iter().skip(i + 1) {
                if Self::is_mutual(a, b) {
                    debug!("Exact match: {} <-> {}", a.id, b.id);
                    matches.push(ExactMatch::new(a, b));
                }
            }
        }

        info!("Found {} exact matches among {} requests", matches.len(), eligible.len());
        matches
    }

    /// Finds all exact matches through a (person, week) index
    pub fn find_matches_indexed(&self, requests: &[SwapRequest]) -> Vec<ExactMatch> {
        let eligible: Vec<&SwapRequest> = requests.iter().filter(|r| Self::eligible(r)).collect();

        let mut by_offer: HashMap<(&PersonId, NaiveDate), Vec<usize>> = HashMap::new();
        for (idx, request) in eligible.iter().enumerate() {
            by_offer.entry(request.offered_slot()).or_default().push(idx);
        }

        let mut matches = Vec::new();
        for (i, a) in eligible.iter().enumerate() {
            let Some(wanted) = a.desired_slot() else {
                continue;
            };
            let Some(offers) = by_offer.get(&wanted) else {
                continue;
            };
            for &j in offers.iter().filter(|&&j| j > i) {
                if Self::is_mutual(a, eligible[j]) {
                    matches.push(ExactMatch::new(a, eligible[j]));
                }
            }
        }

        info!("Found {} exact matches (indexed) among {} requests", matches.len(), eligible.len());
        matches
    }

    /// Looks up the counterpart of one request in a pool
    pub fn find_counterpart<'a>(&self, request: &SwapRequest, pool: &'a [SwapRequest]) -> Option<&'a SwapRequest> {
        if !Self::eligible(request) {
            return None;
        }
        pool.iter()
            .find(|candidate| Self::eligible(candidate) && Self::is_mutual(request, candidate))
    }
}

impl Matcher for ExactMatcher {
    fn name(&self) -> &str {
        "exact"
    }

    fn candidates_for(&self, request: &SwapRequest, snapshot: &SwapSnapshot) -> Vec<MatchCandidate> {
        self.find_counterpart(request, &snapshot.matchable())
            .map(|counterpart| MatchCandidate {
                request_id: request.id,
                counterpart: counterpart.id,
                score: EXACT_MATCH_SCORE,
                matcher: self.name().to_string(),
            })
            .into_iter()
            .collect()
    }
}
