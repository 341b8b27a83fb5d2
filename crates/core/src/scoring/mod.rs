//! Pairwise compatibility scoring between swap requests.
//!
//! The overall score is a fixed-weight sum of five sub-scores, each in `[0, 1]`:
//!
//! | factor                  | weight |
//! |-------------------------|--------|
//! | schedule compatibility  | 0.25   |
//! | preference alignment    | 0.25   |
//! | workload balance        | 0.15   |
//! | credential compatibility| 0.20   |
//! | temporal proximity      | 0.15   |
//!
//! Scoring is pure: it reads a [`ScheduleIndex`] and never touches the store,
//! so it is safe to fan out across threads.

use crate::domain::{PersonId, RequestId, ScheduleIndex, SwapRequest, SwapType};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

pub const SCHEDULE_WEIGHT: f64 = 0.25;
pub const PREFERENCE_WEIGHT: f64 = 0.25;
pub const WORKLOAD_WEIGHT: f64 = 0.15;
pub const CREDENTIAL_WEIGHT: f64 = 0.20;
pub const TEMPORAL_WEIGHT: f64 = 0.15;

/// Placeholder returned until a real credential source is wired in
pub const CREDENTIAL_PLACEHOLDER: f64 = 0.9;

/// Result of scoring one pair of requests. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompatibilityScore {
    pub request_a: RequestId,
    pub request_b: RequestId,
    pub overall_score: f64,
    pub schedule_compatibility: f64,
    pub preference_alignment: f64,
    pub workload_balance: f64,
    pub credential_compatibility: f64,
    pub temporal_proximity: f64,
    pub compatible: bool,
    pub blocking_issues: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl CompatibilityScore {
    fn blocked(a: &SwapRequest, b: &SwapRequest, blocking_issues: Vec<String>) -> Self {
        Self {
            request_a: a.id,
            request_b: b.id,
            overall_score: 0.0,
            schedule_compatibility: 0.0,
            preference_alignment: 0.0,
            workload_balance: 0.0,
            credential_compatibility: 0.0,
            temporal_proximity: 0.0,
            compatible: false,
            blocking_issues,
            warnings: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

/// Credential compatibility between the two people in a trade.
///
/// Implementations return a value in `[0, 1]`.
pub trait CredentialCheck: Send + Sync {
    fn compatibility(&self, a: &PersonId, b: &PersonId) -> f64;
}

/// Returns [`CREDENTIAL_PLACEHOLDER`] for every pair
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderCredentials;

impl CredentialCheck for PlaceholderCredentials {
    fn compatibility(&self, _a: &PersonId, _b: &PersonId) -> f64 {
        CREDENTIAL_PLACEHOLDER
    }
}

/// Compatibility scorer
#[derive(Clone)]
pub struct CompatibilityScorer {
    /// Minimum overall score to report `compatible`
    threshold: f64,

    credentials: Arc<dyn CredentialCheck>,
}

impl CompatibilityScorer {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            credentials: Arc::new(PlaceholderCredentials),
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialCheck>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Scores one pair of requests
    pub fn score(&self, a: &SwapRequest, b: &SwapRequest, schedule: &ScheduleIndex) -> CompatibilityScore {
        let blocking = blocking_issues(a, b, schedule);
        if !blocking.is_empty() {
            debug!("Pair {} / {} blocked: {:?}", a.id, b.id, blocking);
            return CompatibilityScore::blocked(a, b, blocking);
        }

        let schedule_compatibility = schedule_compatibility(a, b, schedule);
        let preference_alignment = preference_alignment(a, b);
        let workload_diff = schedule
            .workload(&a.source_person)
            .abs_diff(schedule.workload(&b.source_person));
        let workload_balance = workload_balance(workload_diff);
        let credential_compatibility = self
            .credentials
            .compatibility(&a.source_person, &b.source_person)
            .clamp(0.0, 1.0);
        let days_apart = (a.source_week - b.source_week).num_days().abs();
        let temporal_proximity = temporal_proximity(days_apart);

        let overall_score = (schedule_compatibility * SCHEDULE_WEIGHT
            + preference_alignment * PREFERENCE_WEIGHT
            + workload_balance * WORKLOAD_WEIGHT
            + credential_compatibility * CREDENTIAL_WEIGHT
            + temporal_proximity * TEMPORAL_WEIGHT)
            .clamp(0.0, 1.0);

        let mut warnings = Vec::new();
        if workload_diff > 5 {
            warnings.push(format!(
                "Workload differs by {} assignments between {} and {}",
                workload_diff, a.source_person, b.source_person
            ));
        }
        if days_apart > 60 {
            warnings.push(format!("Weeks are {} days apart", days_apart));
        }
        if schedule_compatibility < 0.8 {
            warnings.push("No overlapping rotations between the traded weeks".to_string());
        }

        let compatible = overall_score >= self.threshold;
        let mut recommendations = Vec::new();
        if compatible {
            if is_mutual(a, b) {
                recommendations.push("Exact reciprocal match; execute directly".to_string());
            } else {
                recommendations.push("Propose this pairing to both requesters".to_string());
            }
        } else if temporal_proximity < 0.5 {
            recommendations.push("Look for a candidate with a closer week".to_string());
        } else {
            recommendations.push("Consider a multi-party chain instead".to_string());
        }

        CompatibilityScore {
            request_a: a.id,
            request_b: b.id,
            overall_score,
            schedule_compatibility,
            preference_alignment,
            workload_balance,
            credential_compatibility,
            temporal_proximity,
            compatible,
            blocking_issues: Vec::new(),
            warnings,
            recommendations,
        }
    }

    /// Scores `request` against every candidate, best first
    pub fn score_many(
        &self,
        request: &SwapRequest,
        candidates: &[SwapRequest],
        schedule: &ScheduleIndex,
    ) -> Vec<CompatibilityScore> {
        let mut scores: Vec<CompatibilityScore> = candidates
            .par_iter()
            .filter(|c| c.id != request.id)
            .map(|c| self.score(request, c, schedule))
            .collect();

        scores.sort_by(|a, b| {
            b.overall_score
                .partial_cmp(&a.overall_score)
                .unwrap_or(Ordering::Equal)
        });
        scores
    }
}

impl Default for CompatibilityScorer {
    fn default() -> Self {
        Self::new(0.6)
    }
}

fn blocking_issues(a: &SwapRequest, b: &SwapRequest, schedule: &ScheduleIndex) -> Vec<String> {
    let mut issues = Vec::new();
    for person in [&a.source_person, &b.source_person] {
        if schedule.is_inactive(person) {
            issues.push(format!("{} is inactive", person));
        }
    }
    if a.id == b.id {
        issues.push("Cannot pair a request with itself".to_string());
    }
    if a.requester == b.requester {
        issues.push(format!("Both requests were filed by {}", a.requester));
    }
    if !a.is_pending() {
        issues.push(format!("Request {} is {}", a.id, a.status));
    }
    if !b.is_pending() {
        issues.push(format!("Request {} is {}", b.id, b.status));
    }
    issues
}

fn is_mutual(a: &SwapRequest, b: &SwapRequest) -> bool {
    a.desired_slot() == Some(b.offered_slot()) && b.desired_slot() == Some(a.offered_slot())
}

/// Rotation-set overlap between the two weeks being traded
fn schedule_compatibility(a: &SwapRequest, b: &SwapRequest, schedule: &ScheduleIndex) -> f64 {
    let empty = Default::default();
    let rotations_a = schedule.rotations(&a.source_person, a.source_week).unwrap_or(&empty);
    let rotations_b = schedule.rotations(&b.source_person, b.source_week).unwrap_or(&empty);

    if rotations_a == rotations_b {
        1.0
    } else if rotations_a.intersection(rotations_b).next().is_some() {
        0.8
    } else {
        0.6
    }
}

fn preference_alignment(a: &SwapRequest, b: &SwapRequest) -> f64 {
    match (a.swap_type, b.swap_type) {
        (SwapType::Reciprocal, SwapType::Reciprocal) => 0.9,
        (SwapType::Absorb, _) | (_, SwapType::Absorb) => 0.7,
    }
}

pub(crate) fn workload_balance(diff: usize) -> f64 {
    match diff {
        0 => 1.0,
        1..=2 => 0.9,
        3..=5 => 0.7,
        6..=10 => 0.5,
        _ => 0.3,
    }
}

pub(crate) fn temporal_proximity(days_apart: i64) -> f64 {
    match days_apart {
        d if d <= 7 => 1.0,
        d if d <= 14 => 0.9,
        d if d <= 30 => 0.7,
        d if d <= 60 => 0.5,
        d if d <= 90 => 0.3,
        _ => 0.1,
    }
}
