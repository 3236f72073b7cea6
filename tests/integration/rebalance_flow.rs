use std::sync::Arc;

use allocsight::db::repositories::allocation_repository::AllocationRepository;
use allocsight::db::repositories::assignment_repository::AssignmentRepository;
use allocsight::db::repositories::employee_repository::EmployeeRepository;
use allocsight::db::repositories::project_repository::ProjectRepository;
use allocsight::db::DbPool;
use allocsight::error::{AppError, AppResult};
use allocsight::models::allocation::MonthKey;
use allocsight::models::employee::EmployeeRecord;
use allocsight::models::project::ProjectRecord;
use allocsight::services::narrative_service::{
    NarrativeOperation, NarrativeProvider, NarrativeService,
};
use allocsight::services::rebalance_service::{
    RebalanceService, NO_IMBALANCE_MESSAGE, REBALANCE_FALLBACK_GUIDANCE,
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

fn standard() -> i64 {
    effective_standard(standard_month_hours(REF.year, REF.month))
}

fn setup() -> (DbPool, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = DbPool::new(temp_file.path()).unwrap();
    (pool, temp_file)
}

fn seed_employee(pool: &DbPool, user_id: &str, name: &str, manager_id: Option<&str>) {
    pool.with_connection(|conn| {
        EmployeeRepository::upsert(
            conn,
            &EmployeeRecord {
                user_id: user_id.to_string(),
                full_name: name.to_string(),
                is_active: true,
                manager_id: manager_id.map(str::to_string),
            },
        )
    })
    .unwrap();
}

fn seed_project(pool: &DbPool, project_id: &str, name: &str) {
    pool.with_connection(|conn| {
        ProjectRepository::upsert(
            conn,
            &ProjectRecord {
                project_id: project_id.to_string(),
                name: name.to_string(),
            },
        )
    })
    .unwrap();
}

fn seed_assignment(pool: &DbPool, assignment_id: &str, user_id: &str, project_id: &str) {
    pool.with_connection(|conn| AssignmentRepository::insert(conn, assignment_id, user_id, project_id))
        .unwrap();
}

fn seed_hours(pool: &DbPool, assignment_id: &str, hours: i64) {
    pool.with_connection(|conn| {
        AllocationRepository::upsert_hours(conn, assignment_id, REF.year, REF.month, hours)
    })
    .unwrap();
}

fn service_with(pool: &DbPool, narrative: NarrativeService) -> RebalanceService {
    RebalanceService::new(pool.clone(), Arc::new(narrative))
}

#[tokio::test]
async fn overload_converges_onto_the_most_idle_colleague() {
    let (pool, _db) = setup();
    let standard = standard();
    seed_project(&pool, "p-1", "Core Platform");
    seed_employee(&pool, "u-over", "Avery Chen", None);
    seed_employee(&pool, "u-idle-a", "Sam Ortiz", None);
    seed_employee(&pool, "u-idle-b", "Dana Wells", None);
    seed_assignment(&pool, "as-over", "u-over", "p-1");
    seed_assignment(&pool, "as-idle-a", "u-idle-a", "p-1");
    seed_assignment(&pool, "as-idle-b", "u-idle-b", "p-1");
    seed_hours(&pool, "as-over", standard + 60);
    seed_hours(&pool, "as-idle-a", 60);
    seed_hours(&pool, "as-idle-b", 40);

    let service = service_with(&pool, NarrativeService::with_provider(Arc::new(StubNarrator)));
    let report = service.suggest_rebalance(None, None, REF).await.unwrap();

    assert!(report.suggestions.len() <= 2);
    let shifted: i64 = report
        .suggestions
        .iter()
        .map(|suggestion| suggestion.recommended_hours)
        .sum();
    assert_eq!(shifted, 60);

    // The 40h employee is the most idle and absorbs the overload first.
    assert_eq!(report.suggestions[0].from_employee_id, "u-over");
    assert_eq!(report.suggestions[0].to_employee_id, "u-idle-b");
    assert_eq!(report.suggestions[0].from_fte_after, 1.0);

    assert!(report.summary.starts_with("Proposed"));
    assert_eq!(
        report.narrative.as_deref(),
        Some("stub narration for rebalancePlan")
    );
}

#[tokio::test]
async fn balanced_team_returns_the_fixed_message() {
    let (pool, _db) = setup();
    let standard = standard();
    seed_project(&pool, "p-1", "Core Platform");
    seed_employee(&pool, "u-full", "Avery Chen", None);
    seed_employee(&pool, "u-half", "Sam Ortiz", None);
    seed_assignment(&pool, "as-full", "u-full", "p-1");
    seed_assignment(&pool, "as-half", "u-half", "p-1");
    // Exactly at standard and exactly at half standard sit outside both
    // partitions.
    seed_hours(&pool, "as-full", standard);
    seed_hours(&pool, "as-half", standard / 2);

    let service = service_with(&pool, NarrativeService::with_provider(Arc::new(StubNarrator)));
    let report = service.suggest_rebalance(None, None, REF).await.unwrap();

    assert!(report.suggestions.is_empty());
    assert_eq!(report.summary, NO_IMBALANCE_MESSAGE);
    assert!(report.narrative.is_none());
}

#[tokio::test]
async fn project_filter_restricts_the_candidate_pool() {
    let (pool, _db) = setup();
    let standard = standard();
    seed_project(&pool, "p-target", "Core Platform");
    seed_project(&pool, "p-else", "Data Migration");
    seed_employee(&pool, "u-over", "Avery Chen", None);
    seed_employee(&pool, "u-idle", "Sam Ortiz", None);
    seed_assignment(&pool, "as-over", "u-over", "p-target");
    seed_assignment(&pool, "as-idle", "u-idle", "p-else");
    seed_hours(&pool, "as-over", standard + 60);

    let service = service_with(&pool, NarrativeService::with_provider(Arc::new(StubNarrator)));

    // Unfiltered, the idle employee is available to absorb hours.
    let report = service.suggest_rebalance(None, None, REF).await.unwrap();
    assert_eq!(report.suggestions.len(), 1);
    assert_eq!(report.suggestions[0].to_employee_id, "u-idle");

    // Filtered to the target project, only its assignees are candidates.
    let report = service
        .suggest_rebalance(None, Some("p-target"), REF)
        .await
        .unwrap();
    assert!(report.suggestions.is_empty());
    assert_eq!(report.summary, NO_IMBALANCE_MESSAGE);
}

#[tokio::test]
async fn unknown_project_is_a_caller_error() {
    let (pool, _db) = setup();

    let service = service_with(&pool, NarrativeService::with_provider(Arc::new(StubNarrator)));
    let error = service
        .suggest_rebalance(None, Some("p-missing"), REF)
        .await
        .unwrap_err();

    assert!(matches!(error, AppError::NotFound));
}

#[tokio::test]
async fn suggestions_carry_project_hints_for_both_sides() {
    let (pool, _db) = setup();
    let standard = standard();
    seed_project(&pool, "p-core", "Core Platform");
    seed_project(&pool, "p-data", "Data Migration");
    seed_project(&pool, "p-bench", "Bench Pool");
    seed_employee(&pool, "u-over", "Avery Chen", None);
    seed_employee(&pool, "u-idle", "Sam Ortiz", None);
    seed_assignment(&pool, "as-over-core", "u-over", "p-core");
    seed_assignment(&pool, "as-over-data", "u-over", "p-data");
    seed_assignment(&pool, "as-idle", "u-idle", "p-bench");
    seed_hours(&pool, "as-over-core", standard);
    seed_hours(&pool, "as-over-data", 60);
    // The recipient has an assignment but no bookings this month.

    let service = service_with(&pool, NarrativeService::with_provider(Arc::new(StubNarrator)));
    let report = service.suggest_rebalance(None, None, REF).await.unwrap();

    assert_eq!(report.suggestions.len(), 1);
    let suggestion = &report.suggestions[0];
    assert_eq!(suggestion.to_hours, 0);
    assert_eq!(
        suggestion.from_projects,
        vec!["Core Platform", "Data Migration"]
    );
    assert_eq!(suggestion.to_projects, vec!["Bench Pool"]);
    assert!(!suggestion.reasoning.is_empty());
}

#[tokio::test]
async fn manager_scope_limits_the_pool() {
    let (pool, _db) = setup();
    let standard = standard();
    seed_project(&pool, "p-1", "Core Platform");
    seed_employee(&pool, "u-over", "Avery Chen", Some("mgr-1"));
    seed_employee(&pool, "u-idle-other-team", "Sam Ortiz", Some("mgr-2"));
    seed_assignment(&pool, "as-over", "u-over", "p-1");
    seed_assignment(&pool, "as-idle", "u-idle-other-team", "p-1");
    seed_hours(&pool, "as-over", standard + 60);

    let service = service_with(&pool, NarrativeService::with_provider(Arc::new(StubNarrator)));
    let report = service
        .suggest_rebalance(Some("mgr-1"), None, REF)
        .await
        .unwrap();

    // The only idle candidate reports to another manager.
    assert!(report.suggestions.is_empty());
    assert_eq!(report.summary, NO_IMBALANCE_MESSAGE);
}

#[tokio::test]
async fn missing_narrative_configuration_falls_back() {
    let (pool, _db) = setup();
    let standard = standard();
    seed_project(&pool, "p-1", "Core Platform");
    seed_employee(&pool, "u-over", "Avery Chen", None);
    seed_employee(&pool, "u-idle", "Sam Ortiz", None);
    seed_assignment(&pool, "as-over", "u-over", "p-1");
    seed_assignment(&pool, "as-idle", "u-idle", "p-1");
    seed_hours(&pool, "as-over", standard + 40);

    let service = service_with(&pool, NarrativeService::disabled());
    let report = service.suggest_rebalance(None, None, REF).await.unwrap();

    assert_eq!(report.suggestions.len(), 1);
    assert_eq!(
        report.narrative.as_deref(),
        Some(REBALANCE_FALLBACK_GUIDANCE)
    );
}

#[tokio::test]
async fn rerun_on_an_unchanged_snapshot_is_identical() {
    let (pool, _db) = setup();
    let standard = standard();
    seed_project(&pool, "p-1", "Core Platform");
    seed_employee(&pool, "u-over-a", "Avery Chen", None);
    seed_employee(&pool, "u-over-b", "Sam Ortiz", None);
    seed_employee(&pool, "u-idle", "Dana Wells", None);
    seed_assignment(&pool, "as-over-a", "u-over-a", "p-1");
    seed_assignment(&pool, "as-over-b", "u-over-b", "p-1");
    seed_assignment(&pool, "as-idle", "u-idle", "p-1");
    seed_hours(&pool, "as-over-a", standard + 50);
    seed_hours(&pool, "as-over-b", standard + 50);
    seed_hours(&pool, "as-idle", 20);

    let service = service_with(&pool, NarrativeService::disabled());
    let first = service.suggest_rebalance(None, None, REF).await.unwrap();
    let second = service.suggest_rebalance(None, None, REF).await.unwrap();

    assert_eq!(
        serde_json::to_value(&first.suggestions).unwrap(),
        serde_json::to_value(&second.suggestions).unwrap()
    );
    assert_eq!(first.summary, second.summary);
}
