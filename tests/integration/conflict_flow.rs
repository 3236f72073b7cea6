use std::sync::Arc;

use allocsight::db::repositories::allocation_repository::AllocationRepository;
use allocsight::db::repositories::assignment_repository::AssignmentRepository;
use allocsight::db::repositories::employee_repository::EmployeeRepository;
use allocsight::db::repositories::project_repository::ProjectRepository;
use allocsight::db::DbPool;
use allocsight::error::{AppResult, NarrativeErrorCode};
use allocsight::models::allocation::MonthKey;
use allocsight::models::employee::EmployeeRecord;
use allocsight::models::project::ProjectRecord;
use allocsight::services::conflict_service::{
    ConflictService, CONFLICT_FALLBACK_GUIDANCE, NO_CONFLICTS_MESSAGE,
};
use allocsight::services::narrative_service::{
    NarrativeOperation, NarrativeProvider, NarrativeService,
};
use allocsight::utils::capacity::{effective_standard, standard_month_hours};
use serde_json::Value as JsonValue;
use tempfile::NamedTempFile;

const REF: MonthKey = MonthKey {
    year: 2026,
    month: 3,
};

struct StubNarrator;

#[async_trait::async_trait]
impl NarrativeProvider for StubNarrator {
    async fn narrate(
        &self,
        operation: NarrativeOperation,
        _facts: &JsonValue,
    ) -> AppResult<String> {
        Ok(format!("stub narration for {}", operation.as_str()))
    }
}

struct FailingNarrator;

#[async_trait::async_trait]
impl NarrativeProvider for FailingNarrator {
    async fn narrate(
        &self,
        _operation: NarrativeOperation,
        _facts: &JsonValue,
    ) -> AppResult<String> {
        Err(allocsight::error::AppError::narrative(
            NarrativeErrorCode::HttpTimeout,
            "stub timeout",
        ))
    }
}

fn standard() -> i64 {
    effective_standard(standard_month_hours(REF.year, REF.month))
}

fn setup() -> (DbPool, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = DbPool::new(temp_file.path()).unwrap();
    (pool, temp_file)
}

fn seed_employee(pool: &DbPool, user_id: &str, name: &str, manager_id: Option<&str>, active: bool) {
    pool.with_connection(|conn| {
        EmployeeRepository::upsert(
            conn,
            &EmployeeRecord {
                user_id: user_id.to_string(),
                full_name: name.to_string(),
                is_active: active,
                manager_id: manager_id.map(str::to_string),
            },
        )
    })
    .unwrap();
}

fn seed_booking(
    pool: &DbPool,
    assignment_id: &str,
    user_id: &str,
    project_id: &str,
    project_name: &str,
    hours: i64,
) {
    pool.with_connection(|conn| {
        ProjectRepository::upsert(
            conn,
            &ProjectRecord {
                project_id: project_id.to_string(),
                name: project_name.to_string(),
            },
        )?;
        AssignmentRepository::insert(conn, assignment_id, user_id, project_id)?;
        AllocationRepository::upsert_hours(conn, assignment_id, REF.year, REF.month, hours)
    })
    .unwrap();
}

fn service_with(pool: &DbPool, narrative: NarrativeService) -> ConflictService {
    ConflictService::new(pool.clone(), Arc::new(narrative))
}

#[tokio::test]
async fn clean_month_returns_the_fixed_message() {
    let (pool, _db) = setup();
    seed_employee(&pool, "u-1", "Avery Chen", None, true);
    // Exactly at standard capacity is not a conflict.
    seed_booking(&pool, "as-1", "u-1", "p-core", "Core Platform", standard());

    let service = service_with(&pool, NarrativeService::with_provider(Arc::new(StubNarrator)));
    let report = service.detect_conflicts(None).await.unwrap();

    assert!(report.findings.is_empty());
    assert_eq!(report.summary, NO_CONFLICTS_MESSAGE);
    assert!(report.narrative.is_none());
}

#[tokio::test]
async fn overbooked_employee_is_reported_with_project_breakdown() {
    let (pool, _db) = setup();
    let standard = standard();
    seed_employee(&pool, "u-1", "Avery Chen", None, true);
    seed_booking(&pool, "as-1", "u-1", "p-core", "Core Platform", standard);
    seed_booking(&pool, "as-2", "u-1", "p-extra", "Data Migration", 40);

    let service = service_with(&pool, NarrativeService::with_provider(Arc::new(StubNarrator)));
    let report = service.detect_conflicts(None).await.unwrap();

    assert_eq!(report.findings.len(), 1);
    let finding = &report.findings[0];
    assert_eq!(finding.user_id, "u-1");
    assert_eq!(finding.employee_name, "Avery Chen");
    assert_eq!(finding.month_label, REF.label());
    assert_eq!(finding.total_hours, standard + 40);

    let expected_fte =
        ((standard + 40) as f64 / standard as f64 * 1000.0).round() / 1000.0;
    assert_eq!(finding.fte, expected_fte);

    // Largest contributor first.
    assert_eq!(finding.projects.len(), 2);
    assert_eq!(finding.projects[0].project_name, "Core Platform");
    assert_eq!(finding.projects[0].hours, standard);
    assert_eq!(finding.projects[1].project_name, "Data Migration");
    assert_eq!(finding.projects[1].hours, 40);

    // Aggregation invariant: the breakdown sums to the total.
    let breakdown_sum: i64 = finding.projects.iter().map(|p| p.hours).sum();
    assert_eq!(breakdown_sum, finding.total_hours);

    assert!(report.summary.starts_with("Detected 1 over-allocation conflict;"));
    assert_eq!(
        report.narrative.as_deref(),
        Some("stub narration for conflictBriefing")
    );
}

#[tokio::test]
async fn findings_are_ranked_most_overloaded_first() {
    let (pool, _db) = setup();
    let standard = standard();
    seed_employee(&pool, "u-a", "Avery Chen", None, true);
    seed_employee(&pool, "u-b", "Sam Ortiz", None, true);
    seed_booking(&pool, "as-b", "u-b", "p-1", "Core Platform", standard + 40);
    seed_booking(&pool, "as-a", "u-a", "p-1", "Core Platform", standard + 80);

    let service = service_with(&pool, NarrativeService::with_provider(Arc::new(StubNarrator)));
    let report = service.detect_conflicts(None).await.unwrap();

    assert_eq!(report.findings.len(), 2);
    assert_eq!(report.findings[0].user_id, "u-a");
    assert_eq!(report.findings[1].user_id, "u-b");
    assert!(report.findings[0].fte > report.findings[1].fte);
}

#[tokio::test]
async fn manager_scope_limits_findings_to_the_team() {
    let (pool, _db) = setup();
    let standard = standard();
    seed_employee(&pool, "u-mine", "Avery Chen", Some("mgr-1"), true);
    seed_employee(&pool, "u-other", "Sam Ortiz", Some("mgr-2"), true);
    seed_booking(&pool, "as-1", "u-mine", "p-1", "Core Platform", standard + 40);
    seed_booking(&pool, "as-2", "u-other", "p-1", "Core Platform", standard + 80);

    let service = service_with(&pool, NarrativeService::with_provider(Arc::new(StubNarrator)));
    let report = service.detect_conflicts(Some("mgr-1")).await.unwrap();

    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].user_id, "u-mine");
}

#[tokio::test]
async fn bookings_of_inactive_employees_are_skipped() {
    let (pool, _db) = setup();
    seed_employee(&pool, "u-gone", "Former Employee", None, false);
    seed_booking(&pool, "as-1", "u-gone", "p-1", "Core Platform", standard() * 3);

    let service = service_with(&pool, NarrativeService::with_provider(Arc::new(StubNarrator)));
    let report = service.detect_conflicts(None).await.unwrap();

    assert!(report.findings.is_empty());
    assert_eq!(report.summary, NO_CONFLICTS_MESSAGE);
}

#[tokio::test]
async fn missing_narrative_configuration_falls_back() {
    let (pool, _db) = setup();
    seed_employee(&pool, "u-1", "Avery Chen", None, true);
    seed_booking(&pool, "as-1", "u-1", "p-1", "Core Platform", standard() + 40);

    let service = service_with(&pool, NarrativeService::disabled());
    let report = service.detect_conflicts(None).await.unwrap();

    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.narrative.as_deref(), Some(CONFLICT_FALLBACK_GUIDANCE));
}

#[tokio::test]
async fn narrative_invocation_failure_falls_back() {
    let (pool, _db) = setup();
    seed_employee(&pool, "u-1", "Avery Chen", None, true);
    seed_booking(&pool, "as-1", "u-1", "p-1", "Core Platform", standard() + 40);

    let service = service_with(
        &pool,
        NarrativeService::with_provider(Arc::new(FailingNarrator)),
    );
    let report = service.detect_conflicts(None).await.unwrap();

    // The numeric findings survive the failed narration.
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.narrative.as_deref(), Some(CONFLICT_FALLBACK_GUIDANCE));
}

#[tokio::test]
async fn rerun_on_an_unchanged_snapshot_is_identical() {
    let (pool, _db) = setup();
    let standard = standard();
    seed_employee(&pool, "u-a", "Avery Chen", None, true);
    seed_employee(&pool, "u-b", "Sam Ortiz", None, true);
    seed_booking(&pool, "as-a1", "u-a", "p-1", "Core Platform", standard + 30);
    seed_booking(&pool, "as-a2", "u-a", "p-2", "Data Migration", 25);
    seed_booking(&pool, "as-b", "u-b", "p-2", "Data Migration", standard + 55);

    let service = service_with(&pool, NarrativeService::disabled());
    let first = service.detect_conflicts(None).await.unwrap();
    let second = service.detect_conflicts(None).await.unwrap();

    assert_eq!(
        serde_json::to_value(&first.findings).unwrap(),
        serde_json::to_value(&second.findings).unwrap()
    );
    assert_eq!(first.summary, second.summary);
}
