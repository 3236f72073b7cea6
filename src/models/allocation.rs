use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite calendar-month key. Month arithmetic wraps at December and
/// carries into the year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Self {
        debug_assert!((1..=12).contains(&month), "month out of range: {month}");
        Self { year, month }
    }

    /// The month containing the current UTC instant.
    pub fn current() -> Self {
        let now = Utc::now();
        Self::new(now.year(), now.month())
    }

    pub fn advance(self, offset: u32) -> Self {
        let zero_based = (self.month - 1) + offset;
        Self {
            year: self.year + (zero_based / 12) as i32,
            month: zero_based % 12 + 1,
        }
    }

    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// One raw booking row from the snapshot store: hours booked on a single
/// assignment for a single calendar month. Immutable once read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRecord {
    pub assignment_id: String,
    pub user_id: String,
    pub project_id: String,
    pub project_name: String,
    pub year: i32,
    pub month: u32,
    pub allocated_hours: i64,
}

impl AllocationRecord {
    pub fn month_key(&self) -> MonthKey {
        MonthKey::new(self.year, self.month)
    }
}

/// Maps an assignment back to its current project membership. Used for the
/// balancer's "projects to adjust" hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentProjectLink {
    pub assignment_id: String,
    pub project_id: String,
    pub project_name: String,
}

/// Derived: total booked hours for one user in one month, across all of
/// their assignments. Recomputed from the snapshot on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyUserTotal {
    pub user_id: String,
    pub year: i32,
    pub month: u32,
    pub total_hours: i64,
}

impl MonthlyUserTotal {
    pub fn month_key(&self) -> MonthKey {
        MonthKey::new(self.year, self.month)
    }
}

/// Derived: booked hours for one user on one project in one month. The
/// rows for a fixed (user, month) sum to that user's `MonthlyUserTotal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyUserProjectTotal {
    pub user_id: String,
    pub project_id: String,
    pub project_name: String,
    pub year: i32,
    pub month: u32,
    pub hours: i64,
}

impl MonthlyUserProjectTotal {
    pub fn month_key(&self) -> MonthKey {
        MonthKey::new(self.year, self.month)
    }
}
