use serde::{Deserialize, Serialize};

/// One project's share of an over-allocated user-month, largest
/// contributor first in the parent finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContribution {
    pub project_id: String,
    pub project_name: String,
    pub hours: i64,
}

/// A user-month whose committed hours exceed standard capacity. `fte` is
/// total hours over the month's standard capacity, rounded to 3 decimals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictFinding {
    pub user_id: String,
    pub employee_name: String,
    pub month_label: String,
    pub total_hours: i64,
    pub fte: f64,
    pub projects: Vec<ProjectContribution>,
}

/// Conflict findings sorted most-overloaded first, paired with the
/// deterministic summary line. `narrative` carries the elaboration from
/// the narrative service, or the fixed fallback guidance when that call
/// failed; it is `None` when there was nothing to elaborate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub findings: Vec<ConflictFinding>,
    pub summary: String,
    pub narrative: Option<String>,
}
