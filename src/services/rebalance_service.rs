use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{info, warn};

use crate::db::repositories::allocation_repository::AllocationRepository;
use crate::db::repositories::assignment_repository::AssignmentRepository;
use crate::db::repositories::employee_repository::EmployeeRepository;
use crate::db::repositories::project_repository::ProjectRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::allocation::MonthKey;
use crate::models::employee::EmployeeRecord;
use crate::models::rebalance::{RebalancePolicy, RebalanceReport, RebalanceSuggestion};
use crate::services::aggregation::{
    aggregate_user_project_totals, aggregate_user_totals, scope_records,
};
use crate::services::narrative_service::{NarrativeOperation, NarrativeService};
use crate::services::prompt_templates::build_rebalance_payload;
use crate::utils::capacity::{effective_standard, standard_month_hours};

pub const NO_IMBALANCE_MESSAGE: &str =
    "No obvious workload imbalances detected for the selected scope.";
pub const REBALANCE_FALLBACK_GUIDANCE: &str = "Apply the highest-impact transfers above and \
     re-run the analysis once the assignments are updated.";

const NARRATED_SUGGESTIONS_LIMIT: usize = 5;

/// Per-employee load snapshot for the greedy pass.
#[derive(Debug, Clone)]
struct CandidateLoad {
    user_id: String,
    name: String,
    hours: i64,
    fte: f64,
}

/// Pairs over-committed employees with under-committed ones and proposes
/// hour transfers. Suggestions are advisory; nothing is written back.
pub struct RebalanceService {
    db: DbPool,
    narrative: Arc<NarrativeService>,
    policy: RebalancePolicy,
}

impl RebalanceService {
    pub fn new(db: DbPool, narrative: Arc<NarrativeService>) -> Self {
        Self::with_policy(db, narrative, RebalancePolicy::default())
    }

    pub fn with_policy(
        db: DbPool,
        narrative: Arc<NarrativeService>,
        policy: RebalancePolicy,
    ) -> Self {
        Self {
            db,
            narrative,
            policy,
        }
    }

    pub async fn suggest_rebalance(
        &self,
        manager_id: Option<&str>,
        project_id: Option<&str>,
        reference: MonthKey,
    ) -> AppResult<RebalanceReport> {
        let (pool, records, assignment_projects) = self.db.with_connection(|conn| {
            let employees = EmployeeRepository::list_active(conn, manager_id)?;
            let records = AllocationRepository::list_records(conn)?;

            let pool: Vec<EmployeeRecord> = match project_id {
                Some(project_id) => {
                    // An unknown project id is a caller error, not an
                    // empty result.
                    ProjectRepository::get(conn, project_id)?.ok_or_else(AppError::not_found)?;
                    let assignees: HashSet<String> =
                        AssignmentRepository::assignee_ids_for_project(conn, project_id)?
                            .into_iter()
                            .collect();
                    employees
                        .iter()
                        .filter(|employee| assignees.contains(&employee.user_id))
                        .cloned()
                        .collect()
                }
                None => employees.clone(),
            };

            let mut assignment_projects: HashMap<String, Vec<String>> = HashMap::new();
            for employee in &pool {
                let links = AssignmentRepository::links_for_user(conn, &employee.user_id)?;
                let mut names: Vec<String> = Vec::new();
                for link in links {
                    if !names.contains(&link.project_name) {
                        names.push(link.project_name);
                    }
                }
                assignment_projects.insert(employee.user_id.clone(), names);
            }

            let records = scope_records(records, manager_id, &employees);
            Ok((pool, records, assignment_projects))
        })?;

        let standard = effective_standard(standard_month_hours(reference.year, reference.month));
        let totals = aggregate_user_totals(&records);
        let breakdown = aggregate_user_project_totals(&records);

        let hours_by_user: HashMap<&str, i64> = totals
            .iter()
            .filter(|total| total.month_key() == reference)
            .map(|total| (total.user_id.as_str(), total.total_hours))
            .collect();

        // Current-month projects with positive hours, per donor.
        let mut booked_projects: HashMap<&str, Vec<String>> = HashMap::new();
        for row in &breakdown {
            if row.month_key() == reference && row.hours > 0 {
                let names = booked_projects.entry(row.user_id.as_str()).or_default();
                if !names.contains(&row.project_name) {
                    names.push(row.project_name.clone());
                }
            }
        }

        let loads: Vec<CandidateLoad> = pool
            .iter()
            .map(|employee| {
                let hours = hours_by_user
                    .get(employee.user_id.as_str())
                    .copied()
                    .unwrap_or(0);
                CandidateLoad {
                    user_id: employee.user_id.clone(),
                    name: employee.full_name.clone(),
                    hours,
                    fte: hours as f64 / standard as f64,
                }
            })
            .collect();

        let suggestions = build_rebalance_suggestions(
            &loads,
            standard,
            &self.policy,
            &booked_projects,
            &assignment_projects,
        );

        info!(
            target: "app::rebalance",
            scoped = manager_id.is_some(),
            project = project_id.unwrap_or("all"),
            reference = %reference,
            pool = pool.len(),
            suggestions = suggestions.len(),
            "rebalancing pass complete"
        );

        if suggestions.is_empty() {
            return Ok(RebalanceReport {
                suggestions,
                summary: NO_IMBALANCE_MESSAGE.to_string(),
                narrative: None,
            });
        }

        let summary = rebalance_summary(&suggestions);
        let narrative = self.narrate_suggestions(&suggestions).await;

        Ok(RebalanceReport {
            suggestions,
            summary,
            narrative: Some(narrative),
        })
    }

    async fn narrate_suggestions(&self, suggestions: &[RebalanceSuggestion]) -> String {
        let top: Vec<&RebalanceSuggestion> =
            suggestions.iter().take(NARRATED_SUGGESTIONS_LIMIT).collect();
        let facts = match serde_json::to_value(&top) {
            Ok(value) => value,
            Err(err) => {
                warn!(target: "app::rebalance", error = %err, "failed to serialize suggestions for narration");
                return REBALANCE_FALLBACK_GUIDANCE.to_string();
            }
        };

        match self
            .narrative
            .narrate(
                NarrativeOperation::RebalancePlan,
                &build_rebalance_payload(&facts),
            )
            .await
        {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    target: "app::rebalance",
                    error = %err,
                    "narrative elaboration unavailable, using fallback guidance"
                );
                REBALANCE_FALLBACK_GUIDANCE.to_string()
            }
        }
    }
}

/// Single greedy pass. The running counters are the whole algorithm: a
/// donor's remaining overload and each recipient's accumulated hours carry
/// across pairings, so later suggestions see earlier ones applied.
fn build_rebalance_suggestions(
    loads: &[CandidateLoad],
    standard: i64,
    policy: &RebalancePolicy,
    booked_projects: &HashMap<&str, Vec<String>>,
    assignment_projects: &HashMap<String, Vec<String>>,
) -> Vec<RebalanceSuggestion> {
    let mut overloaded: Vec<CandidateLoad> = loads
        .iter()
        .filter(|load| load.fte > policy.overload_fte_threshold)
        .cloned()
        .collect();
    let mut idle: Vec<CandidateLoad> = loads
        .iter()
        .filter(|load| load.fte < policy.bench_fte_threshold)
        .cloned()
        .collect();

    // Equal FTEs fall back to user id so reruns emit identical pairings.
    overloaded.sort_by(|a, b| {
        b.fte
            .total_cmp(&a.fte)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    idle.sort_by(|a, b| {
        a.fte
            .total_cmp(&b.fte)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    let transfer_cap = policy.transfer_cap(standard);
    let mut idle_running: Vec<i64> = idle.iter().map(|load| load.hours).collect();
    let mut suggestions = Vec::new();

    for donor in &overloaded {
        let mut overload = donor.hours - standard;
        if overload <= 0 {
            continue;
        }
        let mut donor_hours = donor.hours;

        for (slot, recipient) in idle.iter().enumerate() {
            let available = standard - idle_running[slot];
            if available <= 0 {
                continue;
            }

            let shift = overload.min(available).min(transfer_cap);
            if shift <= 0 {
                continue;
            }

            let from_fte_before = round2(donor_hours as f64 / standard as f64);
            let from_fte_after = round2((donor_hours - shift) as f64 / standard as f64);
            let to_fte_before = round2(idle_running[slot] as f64 / standard as f64);
            let to_fte_after = round2((idle_running[slot] + shift) as f64 / standard as f64);

            suggestions.push(RebalanceSuggestion {
                from_employee: donor.name.clone(),
                from_employee_id: donor.user_id.clone(),
                from_fte_before,
                from_fte_after,
                from_hours: donor_hours,
                to_employee: recipient.name.clone(),
                to_employee_id: recipient.user_id.clone(),
                to_fte_before,
                to_fte_after,
                to_hours: idle_running[slot],
                recommended_hours: shift,
                from_projects: booked_projects
                    .get(donor.user_id.as_str())
                    .cloned()
                    .unwrap_or_default(),
                to_projects: assignment_projects
                    .get(&recipient.user_id)
                    .cloned()
                    .unwrap_or_default(),
                reasoning: format!(
                    "{} is booked at {:.0}% of standard capacity while {} sits at {:.0}%; \
                     moving {}h narrows the gap without saturating the recipient.",
                    donor.name,
                    from_fte_before * 100.0,
                    recipient.name,
                    to_fte_before * 100.0,
                    shift
                ),
            });

            overload -= shift;
            donor_hours -= shift;
            idle_running[slot] += shift;

            if overload <= 0 {
                break;
            }
        }
    }

    suggestions
}

fn rebalance_summary(suggestions: &[RebalanceSuggestion]) -> String {
    let total_hours: i64 = suggestions
        .iter()
        .map(|suggestion| suggestion.recommended_hours)
        .sum();
    let donors: HashSet<&str> = suggestions
        .iter()
        .map(|suggestion| suggestion.from_employee_id.as_str())
        .collect();
    let recipients: HashSet<&str> = suggestions
        .iter()
        .map(|suggestion| suggestion.to_employee_id.as_str())
        .collect();
    let plural = if suggestions.len() == 1 { "" } else { "s" };

    format!(
        "Proposed {} workload transfer{plural} totaling {}h, from {} overloaded to {} \
         under-allocated employee(s).",
        suggestions.len(),
        total_hours,
        donors.len(),
        recipients.len()
    )
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
