//! Pre-execution validation.
//!
//! Validators are pluggable collaborators (compliance, coverage, credentials
//! live outside this crate). The engine runs them either fail-fast, stopping
//! at the first rejection, or comprehensively, collecting every verdict.

use crate::domain::{RequestId, SwapRequest, SwapType};
use crate::store::SwapStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Verdict of one validator on one request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    pub fn pass() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![error.into()],
            warnings: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, request: &SwapRequest) -> ValidationOutcome;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidatorResult {
    pub validator: String,
    pub outcome: ValidationOutcome,
}

/// Aggregated verdicts for one request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub request_id: RequestId,
    pub comprehensive: bool,
    pub valid: bool,
    /// One entry per validator that ran, in run order
    pub results: Vec<ValidatorResult>,
}

impl ValidationReport {
    /// All errors, prefixed with the validator that raised them
    pub fn errors(&self) -> Vec<String> {
        self.results
            .iter()
            .flat_map(|r| r.outcome.errors.iter().map(move |e| format!("{}: {}", r.validator, e)))
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.results
            .iter()
            .flat_map(|r| r.outcome.warnings.iter().map(move |w| format!("{}: {}", r.validator, w)))
            .collect()
    }
}

/// Runs `validators` in order against `request`
pub async fn run_validators(
    request: &SwapRequest,
    validators: &[Arc<dyn Validator>],
    comprehensive: bool,
) -> ValidationReport {
    let mut results = Vec::with_capacity(validators.len());
    let mut valid = true;

    for validator in validators {
        let outcome = validator.validate(request).await;
        debug!(
            "Validator {} on {}: valid={} ({} errors)",
            validator.name(),
            request.id,
            outcome.valid,
            outcome.errors.len()
        );
        let failed = !outcome.valid;
        results.push(ValidatorResult {
            validator: validator.name().to_string(),
            outcome,
        });
        if failed {
            valid = false;
            if !comprehensive {
                break;
            }
        }
    }

    ValidationReport {
        request_id: request.id,
        comprehensive,
        valid,
        results,
    }
}

/// Enforces the request data-model invariants
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestShapeValidator;

#[async_trait]
impl Validator for RequestShapeValidator {
    fn name(&self) -> &str {
        "request_shape"
    }

    async fn validate(&self, request: &SwapRequest) -> ValidationOutcome {
        let outcome = match request.check_shape() {
            Ok(()) => ValidationOutcome::pass(),
            Err(e) => ValidationOutcome::fail(e),
        };
        if request.reason.is_none() {
            return outcome.with_warning("no reason given");
        }
        outcome
    }
}

/// Checks that each giving party still holds the week being traded
pub struct AssignmentValidator {
    store: Arc<dyn SwapStore>,
}

impl AssignmentValidator {
    pub fn new(store: Arc<dyn SwapStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Validator for AssignmentValidator {
    fn name(&self) -> &str {
        "assignments"
    }

    async fn validate(&self, request: &SwapRequest) -> ValidationOutcome {
        let mut errors = Vec::new();

        let mut holdings = vec![(request.source_person.clone(), request.source_week)];
        if request.swap_type == SwapType::Reciprocal {
            if let Some((target, week)) = request.desired_slot() {
                holdings.push((target.clone(), week));
            }
        }

        for (person, week) in holdings {
            match self.store.list_assignments(Some(&person)).await {
                Ok(assignments) => {
                    if !assignments.iter().any(|a| a.week == week) {
                        errors.push(format!("{} holds no assignment in week {}", person, week));
                    }
                }
                Err(e) => errors.push(format!("assignment lookup for {} failed: {}", person, e)),
            }
        }

        ValidationOutcome::from_errors(errors)
    }
}
