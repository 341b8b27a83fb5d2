use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use super::people::{Assignment, Person, PersonId};
use super::requests::{RequestId, SwapRequest};

/// Consistent read-only view of requests, people and assignments.
///
/// Scoring, matching and discovery all run over one snapshot so they never
/// observe a half-applied transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwapSnapshot {
    #[serde(default)]
    pub requests: Vec<SwapRequest>,
    #[serde(default)]
    pub people: Vec<Person>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

impl SwapSnapshot {
    pub fn new(requests: Vec<SwapRequest>, people: Vec<Person>, assignments: Vec<Assignment>) -> Self {
        Self {
            requests,
            people,
            assignments,
        }
    }

    /// Pending requests in snapshot order
    pub fn pending(&self) -> Vec<SwapRequest> {
        self.requests.iter().filter(|r| r.is_pending()).cloned().collect()
    }

    /// Pending requests whose source and target are both active
    pub fn matchable(&self) -> Vec<SwapRequest> {
        let inactive = self.inactive();
        self.requests
            .iter()
            .filter(|r| r.is_pending())
            .filter(|r| !inactive.contains(&r.source_person))
            .filter(|r| r.target_person.as_ref().map_or(true, |t| !inactive.contains(t)))
            .cloned()
            .collect()
    }

    fn inactive(&self) -> HashSet<PersonId> {
        self.people.iter().filter(|p| !p.active).map(|p| p.id.clone()).collect()
    }

    pub fn request(&self, id: RequestId) -> Option<&SwapRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    /// People keyed by id
    pub fn roster(&self) -> HashMap<PersonId, Person> {
        self.people.iter().map(|p| (p.id.clone(), p.clone())).collect()
    }

    /// Builds the lookup tables used by the compatibility scorer
    pub fn schedule_index(&self) -> ScheduleIndex {
        ScheduleIndex::build(&self.assignments).with_inactive(self.inactive())
    }
}

/// Per-person workload and per-(person, week) rotation lookups
#[derive(Debug, Clone, Default)]
pub struct ScheduleIndex {
    workload: HashMap<PersonId, usize>,
    rotations: HashMap<(PersonId, NaiveDate), BTreeSet<String>>,
    inactive: HashSet<PersonId>,
}

impl ScheduleIndex {
    pub fn build(assignments: &[Assignment]) -> Self {
        let mut index = Self::default();
        for assignment in assignments {
            *index.workload.entry(assignment.person.clone()).or_insert(0) += 1;
            index
                .rotations
                .entry((assignment.person.clone(), assignment.week))
                .or_default()
                .insert(assignment.rotation.clone());
        }
        index
    }

    pub fn with_inactive(mut self, inactive: HashSet<PersonId>) -> Self {
        self.inactive = inactive;
        self
    }

    /// Whether the person is marked inactive on the roster
    pub fn is_inactive(&self, person: &PersonId) -> bool {
        self.inactive.contains(person)
    }

    /// Number of assignments held by a person
    pub fn workload(&self, person: &PersonId) -> usize {
        self.workload.get(person).copied().unwrap_or(0)
    }

    /// Rotations a person covers in a given week
    pub fn rotations(&self, person: &PersonId, week: NaiveDate) -> Option<&BTreeSet<String>> {
        self.rotations.get(&(person.clone(), week))
    }

    /// Whether the person holds any assignment in the week
    pub fn holds(&self, person: &PersonId, week: NaiveDate) -> bool {
        self.rotations
            .get(&(person.clone(), week))
            .map(|set| !set.is_empty())
            .unwrap_or(false)
    }
}
