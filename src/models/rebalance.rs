use serde::{Deserialize, Serialize};

/// Thresholds governing the greedy rebalancing pass. The half-capacity cap
/// on a single transfer is a long-standing business rule; it is exposed
/// here as an overridable fraction rather than hard-coded in the loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalancePolicy {
    /// FTE above which an employee is considered over-allocated.
    pub overload_fte_threshold: f64,
    /// FTE below which an employee is considered on the bench.
    pub bench_fte_threshold: f64,
    /// Fraction of standard capacity a single suggestion may move.
    pub max_transfer_fraction: f64,
}

impl Default for RebalancePolicy {
    fn default() -> Self {
        Self {
            overload_fte_threshold: 1.0,
            bench_fte_threshold: 0.5,
            max_transfer_fraction: 0.5,
        }
    }
}

impl RebalancePolicy {
    /// Largest hour amount a single suggestion may move for the given
    /// standard capacity.
    pub fn transfer_cap(&self, standard_hours: i64) -> i64 {
        (standard_hours as f64 * self.max_transfer_fraction).floor() as i64
    }
}

/// Advisory proposal to move hours from an over-allocated employee to an
/// under-allocated one. FTE fields are rounded to 2 decimals and reflect
/// the running state of the greedy pass at the time the suggestion was
/// emitted, so a later suggestion for the same employee starts where the
/// previous one left off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceSuggestion {
    pub from_employee: String,
    pub from_employee_id: String,
    pub from_fte_before: f64,
    pub from_fte_after: f64,
    pub from_hours: i64,
    pub to_employee: String,
    pub to_employee_id: String,
    pub to_fte_before: f64,
    pub to_fte_after: f64,
    pub to_hours: i64,
    pub recommended_hours: i64,
    pub from_projects: Vec<String>,
    pub to_projects: Vec<String>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceReport {
    pub suggestions: Vec<RebalanceSuggestion>,
    pub summary: String,
    pub narrative: Option<String>,
}
