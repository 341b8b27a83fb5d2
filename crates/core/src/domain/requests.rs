use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::people::{AssignmentMove, PersonId};

/// Represents a request to trade an assigned week
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwapRequest {
    /// Unique request identifier
    pub id: RequestId,

    /// Person giving up the week
    pub source_person: PersonId,

    /// Week being given up (Monday of the week)
    pub source_week: NaiveDate,

    /// Person the source wants to trade with
    pub target_person: Option<PersonId>,

    /// Week the source wants in return (reciprocal only)
    pub target_week: Option<NaiveDate>,

    /// Swap type
    pub swap_type: SwapType,

    /// Request lifecycle status
    pub status: SwapStatus,

    pub requested_at: DateTime<Utc>,

    pub executed_at: Option<DateTime<Utc>>,

    pub rolled_back_at: Option<DateTime<Utc>>,

    /// Free-text reason given by the requester
    pub reason: Option<String>,

    /// Reason recorded when the swap was rolled back or rejected
    pub resolution_note: Option<String>,

    /// Who filed the request (usually the source person)
    pub requester: PersonId,

    /// Who executed the swap
    pub executed_by: Option<PersonId>,

    /// Moves applied when the request executed; rollback inverts these
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied_moves: Vec<AssignmentMove>,

    /// Chain the request executed as part of
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<ChainId>,
}

/// Swap request unique identifier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chain identifier, generated independently of execution time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ChainId(pub Uuid);

impl ChainId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChainId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Kind of trade being requested
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SwapType {
    /// Give a week and receive one back
    Reciprocal,
    /// Give a week away with nothing in return
    Absorb,
}

/// Swap request lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    /// Open and eligible for matching
    Pending,
    /// Assignments have been exchanged
    Executed,
    /// Declined before execution
    Rejected,
    /// Executed and later reversed
    RolledBack,
}

impl SwapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStatus::Pending => "pending",
            SwapStatus::Executed => "executed",
            SwapStatus::Rejected => "rejected",
            SwapStatus::RolledBack => "rolled_back",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: SwapStatus) -> bool {
        matches!(
            (self, next),
            (SwapStatus::Pending, SwapStatus::Executed)
                | (SwapStatus::Pending, SwapStatus::Rejected)
                | (SwapStatus::Executed, SwapStatus::RolledBack)
        )
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SwapRequest {
    /// Creates a pending reciprocal request: `source` gives `gives`, wants `target`'s `wants`
    pub fn reciprocal(
        source: impl Into<PersonId>,
        gives: NaiveDate,
        target: impl Into<PersonId>,
        wants: NaiveDate,
        requested_at: DateTime<Utc>,
    ) -> Self {
        let source = source.into();
        Self {
            id: RequestId::new(),
            requester: source.clone(),
            source_person: source,
            source_week: gives,
            target_person: Some(target.into()),
            target_week: Some(wants),
            swap_type: SwapType::Reciprocal,
            status: SwapStatus::Pending,
            requested_at,
            executed_at: None,
            rolled_back_at: None,
            reason: None,
            resolution_note: None,
            executed_by: None,
            applied_moves: Vec::new(),
            chain_id: None,
        }
    }

    /// Creates a pending absorb request, optionally naming who should take the week
    pub fn absorb(
        source: impl Into<PersonId>,
        gives: NaiveDate,
        target: Option<PersonId>,
        requested_at: DateTime<Utc>,
    ) -> Self {
        let source = source.into();
        Self {
            id: RequestId::new(),
            requester: source.clone(),
            source_person: source,
            source_week: gives,
            target_person: target,
            target_week: None,
            swap_type: SwapType::Absorb,
            status: SwapStatus::Pending,
            requested_at,
            executed_at: None,
            rolled_back_at: None,
            reason: None,
            resolution_note: None,
            executed_by: None,
            applied_moves: Vec::new(),
            chain_id: None,
        }
    }

    /// Validates the data-model invariants of a request
    pub fn check_shape(&self) -> Result<(), String> {
        match self.swap_type {
            SwapType::Reciprocal => {
                if self.target_person.is_none() {
                    return Err("Reciprocal swaps must name a target person".to_string());
                }
                if self.target_week.is_none() {
                    return Err("Reciprocal swaps must name a target week".to_string());
                }
            }
            SwapType::Absorb => {
                if self.target_week.is_some() {
                    return Err("Absorb swaps cannot name a target week".to_string());
                }
            }
        }

        if self.target_person.as_ref() == Some(&self.source_person) {
            return Err("Source and target person must be different".to_string());
        }

        let executed_like = matches!(self.status, SwapStatus::Executed | SwapStatus::RolledBack);
        if executed_like != self.executed_at.is_some() {
            return Err(format!(
                "Executed timestamp must be set iff status is executed or rolled_back (status={})",
                self.status
            ));
        }

        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.status == SwapStatus::Pending
    }

    /// The (person, week) this request wants to receive, if fully specified
    pub fn desired_slot(&self) -> Option<(&PersonId, NaiveDate)> {
        match (&self.target_person, self.target_week) {
            (Some(person), Some(week)) => Some((person, week)),
            _ => None,
        }
    }

    /// The (person, week) this request offers
    pub fn offered_slot(&self) -> (&PersonId, NaiveDate) {
        (&self.source_person, self.source_week)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn week(d: &str) -> NaiveDate {
        NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()
    }

    fn create_test_request() -> SwapRequest {
        SwapRequest::reciprocal(
            "dr-x",
            week("2025-01-06"),
            "dr-y",
            week("2025-01-13"),
            Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_shape_validation_success() {
        let request = create_test_request();
        assert!(request.check_shape().is_ok());
        assert!(request.is_pending());
    }

    #[test]
    fn test_absorb_rejects_target_week() {
        let mut request = SwapRequest::absorb("dr-x", week("2025-01-06"), None, Utc::now());
        assert!(request.check_shape().is_ok());

        request.target_week = Some(week("2025-01-13"));
        let msg = request.check_shape().unwrap_err();
        assert!(msg.contains("target week"));
    }

    #[test]
    fn test_reciprocal_requires_target() {
        let mut request = create_test_request();
        request.target_week = None;
        assert!(request.check_shape().is_err());
    }

    #[test]
    fn test_self_target_rejected() {
        let mut request = create_test_request();
        request.target_person = Some(PersonId::from("dr-x"));
        assert!(request.check_shape().is_err());
    }

    #[test]
    fn test_executed_timestamp_invariant() {
        let mut request = create_test_request();
        request.executed_at = Some(Utc::now());
        assert!(request.check_shape().is_err());

        request.status = SwapStatus::Executed;
        assert!(request.check_shape().is_ok());

        request.status = SwapStatus::RolledBack;
        assert!(request.check_shape().is_ok());

        request.executed_at = None;
        assert!(request.check_shape().is_err());
    }

    #[test]
    fn test_status_transitions() {
        assert!(SwapStatus::Pending.can_transition_to(SwapStatus::Executed));
        assert!(SwapStatus::Pending.can_transition_to(SwapStatus::Rejected));
        assert!(SwapStatus::Executed.can_transition_to(SwapStatus::RolledBack));
        assert!(!SwapStatus::Rejected.can_transition_to(SwapStatus::Executed));
        assert!(!SwapStatus::RolledBack.can_transition_to(SwapStatus::Executed));
        assert!(!SwapStatus::Pending.can_transition_to(SwapStatus::RolledBack));
    }

    #[test]
    fn test_slots() {
        let request = create_test_request();
        let (person, week_given) = request.offered_slot();
        assert_eq!(person.as_str(), "dr-x");
        assert_eq!(week_given, week("2025-01-06"));

        let (target, wanted) = request.desired_slot().unwrap();
        assert_eq!(target.as_str(), "dr-y");
        assert_eq!(wanted, week("2025-01-13"));
    }

    #[test]
    fn request_serde_roundtrip() {
        let request = create_test_request();
        let s = serde_json::to_string(&request).expect("serialize");
        assert!(s.contains("\"swap_type\":\"reciprocal\""));
        assert!(s.contains("\"status\":\"pending\""));
        let back: SwapRequest = serde_json::from_str(&s).expect("deserialize");
        assert_eq!(back, request);
    }
}
