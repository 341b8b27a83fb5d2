use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Faculty member identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PersonId(pub String);

impl PersonId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PersonId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PersonId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A scheduled faculty member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Person {
    pub fn new(id: impl Into<PersonId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            active: true,
        }
    }
}

/// One assignment hand-over
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignmentMove {
    /// Week changing hands
    pub week: NaiveDate,

    /// Current holder
    pub from: PersonId,

    /// New holder
    pub to: PersonId,
}

impl AssignmentMove {
    pub fn new(week: NaiveDate, from: PersonId, to: PersonId) -> Self {
        Self { week, from, to }
    }

    /// The move that undoes this one
    pub fn inverse(&self) -> Self {
        Self {
            week: self.week,
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }
}

/// One person covering one rotation for one week
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Assignment {
    pub person: PersonId,

    /// Monday of the assigned week
    pub week: NaiveDate,

    /// Rotation or service being covered (e.g. "inpatient", "clinic")
    pub rotation: String,
}

impl Assignment {
    pub fn new(person: impl Into<PersonId>, week: NaiveDate, rotation: impl Into<String>) -> Self {
        Self {
            person: person.into(),
            week,
            rotation: rotation.into(),
        }
    }
}
