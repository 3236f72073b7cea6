use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::db::repositories::allocation_repository::AllocationRepository;
use crate::db::repositories::employee_repository::EmployeeRepository;
use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::allocation::{MonthKey, MonthlyUserProjectTotal, MonthlyUserTotal};
use crate::models::conflict::{ConflictFinding, ConflictReport, ProjectContribution};
use crate::models::employee::EmployeeRecord;
use crate::services::aggregation::{
    aggregate_user_project_totals, aggregate_user_totals, scope_records,
};
use crate::services::narrative_service::{NarrativeOperation, NarrativeService};
use crate::services::prompt_templates::build_conflict_payload;
use crate::utils::capacity::{effective_standard, standard_month_hours};

pub const NO_CONFLICTS_MESSAGE: &str = "No over-allocations detected across active projects.";
pub const CONFLICT_FALLBACK_GUIDANCE: &str = "Review the highest-FTE assignments above and \
     consider shifting hours toward under-allocated staff before the month closes.";

const NARRATED_FINDINGS_LIMIT: usize = 5;

/// Flags user-months whose committed hours exceed standard capacity and
/// ranks them most-overloaded first.
pub struct ConflictService {
    db: DbPool,
    narrative: Arc<NarrativeService>,
}

impl ConflictService {
    pub fn new(db: DbPool, narrative: Arc<NarrativeService>) -> Self {
        Self { db, narrative }
    }

    pub async fn detect_conflicts(&self, manager_id: Option<&str>) -> AppResult<ConflictReport> {
        let (employees, records) = self.db.with_connection(|conn| {
            let employees = EmployeeRepository::list_active(conn, manager_id)?;
            let records = AllocationRepository::list_records(conn)?;
            Ok((employees, records))
        })?;

        let records = scope_records(records, manager_id, &employees);
        let totals = aggregate_user_totals(&records);
        let breakdown = aggregate_user_project_totals(&records);
        let directory: HashMap<&str, &EmployeeRecord> = employees
            .iter()
            .map(|employee| (employee.user_id.as_str(), employee))
            .collect();

        let findings =
            build_conflict_findings(&totals, &breakdown, &directory, standard_month_hours);

        info!(
            target: "app::conflict",
            scoped = manager_id.is_some(),
            user_months = totals.len(),
            conflicts = findings.len(),
            "conflict detection complete"
        );

        if findings.is_empty() {
            return Ok(ConflictReport {
                findings,
                summary: NO_CONFLICTS_MESSAGE.to_string(),
                narrative: None,
            });
        }

        let summary = conflict_summary(&findings);
        let narrative = self.narrate_findings(&findings).await;

        Ok(ConflictReport {
            findings,
            summary,
            narrative: Some(narrative),
        })
    }

    async fn narrate_findings(&self, findings: &[ConflictFinding]) -> String {
        let top: Vec<&ConflictFinding> =
            findings.iter().take(NARRATED_FINDINGS_LIMIT).collect();
        let facts = match serde_json::to_value(&top) {
            Ok(value) => value,
            Err(err) => {
                warn!(target: "app::conflict", error = %err, "failed to serialize findings for narration");
                return CONFLICT_FALLBACK_GUIDANCE.to_string();
            }
        };

        match self
            .narrative
            .narrate(
                NarrativeOperation::ConflictBriefing,
                &build_conflict_payload(&facts),
            )
            .await
        {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    target: "app::conflict",
                    error = %err,
                    "narrative elaboration unavailable, using fallback guidance"
                );
                CONFLICT_FALLBACK_GUIDANCE.to_string()
            }
        }
    }
}

fn build_conflict_findings<F>(
    totals: &[MonthlyUserTotal],
    breakdown: &[MonthlyUserProjectTotal],
    directory: &HashMap<&str, &EmployeeRecord>,
    standard_for: F,
) -> Vec<ConflictFinding>
where
    F: Fn(i32, u32) -> i64,
{
    let mut standards: HashMap<MonthKey, i64> = HashMap::new();
    let mut findings = Vec::new();

    for total in totals {
        let key = total.month_key();
        let standard = *standards
            .entry(key)
            .or_insert_with(|| effective_standard(standard_for(key.year, key.month)));

        if total.total_hours <= standard {
            continue;
        }

        // The user may have been deactivated or filtered out of the
        // directory; an orphaned booking row is not worth failing over.
        let Some(employee) = directory.get(total.user_id.as_str()) else {
            continue;
        };

        let mut projects: Vec<ProjectContribution> = breakdown
            .iter()
            .filter(|row| {
                row.user_id == total.user_id && row.year == total.year && row.month == total.month
            })
            .map(|row| ProjectContribution {
                project_id: row.project_id.clone(),
                project_name: row.project_name.clone(),
                hours: row.hours,
            })
            .collect();
        projects.sort_by(|a, b| b.hours.cmp(&a.hours));

        findings.push(ConflictFinding {
            user_id: total.user_id.clone(),
            employee_name: employee.full_name.clone(),
            month_label: key.label(),
            total_hours: total.total_hours,
            fte: round3(total.total_hours as f64 / standard as f64),
            projects,
        });
    }

    findings.sort_by(|a, b| b.fte.total_cmp(&a.fte));
    findings
}

fn conflict_summary(findings: &[ConflictFinding]) -> String {
    let peak_pct = findings.first().map(|f| f.fte * 100.0).unwrap_or(0.0);
    let plural = if findings.len() == 1 { "" } else { "s" };
    format!(
        "Detected {} over-allocation conflict{plural}; peak load is {:.1}% of standard capacity.",
        findings.len(),
        peak_pct
    )
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
