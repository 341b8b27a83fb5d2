use serde::{Deserialize, Serialize};
use crate::domain::{ChainId, RequestId, SwapRequest, SwapType};
use crate::matching::{ChainType, SwapChain};

pub use crate::domain::AssignmentMove;

fn describe(mv: &AssignmentMove) -> String {
    format!("Move week {} from {} to {}", mv.week, mv.from, mv.to)
}

/// Assignment moves that executing `request` applies, in order
pub fn request_moves(request: &SwapRequest) -> Result<Vec<AssignmentMove>, String> {
    let target = request
        .target_person
        .clone()
        .ok_or_else(|| format!("request {} names no target person to take the week", request.id))?;

    let mut moves = vec![AssignmentMove::new(
        request.source_week,
        request.source_person.clone(),
        target.clone(),
    )];

    if request.swap_type == SwapType::Reciprocal {
        let week = request
            .target_week
            .ok_or_else(|| format!("reciprocal request {} names no target week", request.id))?;
        moves.push(AssignmentMove::new(week, target, request.source_person.clone()));
    }

    Ok(moves)
}

/// Moves that undo `moves`, in reverse order
pub fn inverse_moves(moves: &[AssignmentMove]) -> Vec<AssignmentMove> {
    moves.iter().rev().map(AssignmentMove::inverse).collect()
}

/// What a plan was generated for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PlanSubject {
    Request(RequestId),
    Chain(ChainId),
}

/// Ordered human-readable steps for executing a request or chain, with the
/// steps that would undo it. Descriptive only; execution does not read it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionPlan {
    pub subject: PlanSubject,

    /// Forward steps
    pub steps: Vec<String>,

    /// Steps undoing the forward ones, in the order they would run
    pub rollback_steps: Vec<String>,

    /// Moves the plan expects to apply
    pub moves: Vec<AssignmentMove>,

    /// Planning problems that would stop execution
    pub warnings: Vec<String>,
}

impl ExecutionPlan {
    fn new(subject: PlanSubject) -> Self {
        Self {
            subject,
            steps: Vec::new(),
            rollback_steps: Vec::new(),
            moves: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_step(&mut self, step: impl Into<String>) {
        self.steps.push(step.into());
    }

    pub fn add_rollback_step(&mut self, step: impl Into<String>) {
        self.rollback_steps.push(step.into());
    }

    /// Builds the plan for a single request
    pub fn for_request(request: &SwapRequest) -> Self {
        let mut plan = Self::new(PlanSubject::Request(request.id));

        plan.add_step(format!("Verify request {} is still {}", request.id, request.status));
        plan.add_step("Run comprehensive validation");

        match request_moves(request) {
            Ok(moves) => {
                for mv in &moves {
                    plan.add_step(describe(mv));
                }
                for mv in inverse_moves(&moves) {
                    plan.add_rollback_step(describe(&mv));
                }
                plan.moves = moves;
            }
            Err(e) => plan.warnings.push(e),
        }

        plan.add_step(format!("Mark request {} executed", request.id));
        plan.add_step("Notify participants");

        plan.add_rollback_step(format!("Mark request {} rolled back", request.id));
        plan.add_rollback_step("Notify participants of the rollback");
        plan
    }

    /// Builds the plan for a multi-party chain
    pub fn for_chain(chain: &SwapChain) -> Self {
        let mut plan = Self::new(PlanSubject::Chain(chain.id));

        if !chain.is_valid {
            plan.warnings.extend(chain.validation_errors.iter().cloned());
        }

        let shape = match chain.chain_type {
            ChainType::Cycle => "cycle",
            ChainType::Linear => "linear chain",
        };
        plan.add_step(format!(
            "Lock {} requests of {} {}",
            chain.nodes.len(),
            shape,
            chain.id
        ));
        plan.add_step("Verify every request is still pending and matches its leg");

        let mut moves = Vec::with_capacity(chain.nodes.len());
        for (i, node) in chain.nodes.iter().enumerate() {
            match chain.leg_move(i) {
                Some(mv) => {
                    plan.add_step(format!(
                        "{} gives week {} and receives week {} from {} (request {})",
                        node.person, node.gives_week, mv.week, mv.from, node.originating_request_id
                    ));
                    moves.push(mv);
                }
                None => plan.warnings.push(format!(
                    "no participant supplies week {} to {}",
                    node.receives_week, node.person
                )),
            }
        }
        plan.add_step(format!("Commit all {} legs in one transaction", chain.nodes.len()));
        plan.add_step("Notify participants");

        for mv in inverse_moves(&moves) {
            plan.add_rollback_step(describe(&mv));
        }
        plan.add_rollback_step(format!("Mark every request of chain {} rolled back", chain.id));
        plan.moves = moves;
        plan
    }

    pub fn is_executable(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::ChainNode;
    use chrono::{NaiveDate, Utc};

    fn week(d: &str) -> NaiveDate {
        NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_reciprocal_plan() {
        let request = SwapRequest::reciprocal("dr-x", week("2025-01-06"), "dr-y", week("2025-01-13"), Utc::now());
        let plan = ExecutionPlan::for_request(&request);

        assert!(plan.is_executable());
        assert_eq!(plan.moves.len(), 2);
        assert_eq!(plan.moves[0], AssignmentMove::new(week("2025-01-06"), "dr-x".into(), "dr-y".into()));
        assert_eq!(
            plan.rollback_steps[0],
            "Move week 2025-01-13 from dr-x to dr-y".to_string()
        );
        assert_eq!(plan.steps.len(), 6);
    }

    #[test]
    fn test_absorb_without_target_warns() {
        let request = SwapRequest::absorb("dr-x", week("2025-01-06"), None, Utc::now());
        let plan = ExecutionPlan::for_request(&request);

        assert!(!plan.is_executable());
        assert!(plan.moves.is_empty());
    }

    #[test]
    fn test_inverse_moves_reverse_order() {
        let moves = vec![
            AssignmentMove::new(week("2025-01-06"), "a".into(), "b".into()),
            AssignmentMove::new(week("2025-01-13"), "b".into(), "a".into()),
        ];
        let inverse = inverse_moves(&moves);
        assert_eq!(inverse[0], AssignmentMove::new(week("2025-01-13"), "a".into(), "b".into()));
        assert_eq!(inverse[1], AssignmentMove::new(week("2025-01-06"), "b".into(), "a".into()));
    }

    #[test]
    fn test_chain_plan() {
        let nodes = vec![
            ChainNode {
                person: "a".into(),
                gives_week: week("2025-01-06"),
                receives_week: week("2025-01-13"),
                originating_request_id: RequestId::new(),
            },
            ChainNode {
                person: "b".into(),
                gives_week: week("2025-01-13"),
                receives_week: week("2025-01-06"),
                originating_request_id: RequestId::new(),
            },
        ];
        let mut chain = SwapChain::new(ChainType::Cycle, nodes);
        chain.is_valid = true;

        let plan = ExecutionPlan::for_chain(&chain);
        assert!(plan.is_executable());
        assert_eq!(plan.subject, PlanSubject::Chain(chain.id));
        assert_eq!(plan.steps.len(), 6);
        assert_eq!(plan.moves.len(), 2);
        assert_eq!(plan.moves[0], AssignmentMove::new(week("2025-01-13"), "b".into(), "a".into()));
        assert_eq!(plan.rollback_steps.len(), 3);
        assert_eq!(plan.rollback_steps[0], "Move week 2025-01-06 from b to a".to_string());
    }

    #[test]
    fn test_open_chain_plan_warns() {
        let nodes = vec![
            ChainNode {
                person: "a".into(),
                gives_week: week("2025-01-06"),
                receives_week: week("2025-01-13"),
                originating_request_id: RequestId::new(),
            },
            ChainNode {
                person: "b".into(),
                gives_week: week("2025-01-13"),
                receives_week: week("2025-01-20"),
                originating_request_id: RequestId::new(),
            },
        ];
        let plan = ExecutionPlan::for_chain(&SwapChain::new(ChainType::Linear, nodes));
        assert!(!plan.is_executable());
        assert_eq!(plan.moves.len(), 1);
    }
}
