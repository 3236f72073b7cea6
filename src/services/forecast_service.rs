use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::db::repositories::allocation_repository::AllocationRepository;
use crate::db::repositories::employee_repository::EmployeeRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::allocation::MonthKey;
use crate::models::forecast::{ForecastPrediction, ForecastReport, ForecastRisk};
use crate::services::aggregation::{aggregate_month_totals, scope_records};
use crate::services::narrative_service::{NarrativeOperation, NarrativeService};
use crate::services::prompt_templates::build_forecast_payload;
use crate::utils::capacity::{effective_standard, standard_month_hours};

pub const DEFAULT_FORECAST_MONTHS: u32 = 3;

/// A month is underutilized when its surplus exceeds this share of
/// capacity.
pub const UNDERUTILIZATION_SURPLUS_RATIO: f64 = 0.25;

pub const FORECAST_FALLBACK_SHORTAGE: &str = "Projected bookings exceed team capacity; \
     consider bringing in additional staff or extending project timelines.";
pub const FORECAST_FALLBACK_UNDERUTILIZED: &str = "The team has spare capacity on the \
     horizon; consider pursuing additional work to fill it.";
pub const FORECAST_FALLBACK_BALANCED: &str = "Capacity and bookings are in balance; \
     continue monitoring as new work lands.";

/// Projects team capacity against already-booked hours over a rolling
/// window of future months and classifies each month's risk.
pub struct ForecastService {
    db: DbPool,
    narrative: Arc<NarrativeService>,
}

impl ForecastService {
    pub fn new(db: DbPool, narrative: Arc<NarrativeService>) -> Self {
        Self { db, narrative }
    }

    pub async fn forecast(
        &self,
        manager_id: Option<&str>,
        months_ahead: Option<u32>,
        reference: MonthKey,
    ) -> AppResult<ForecastReport> {
        let months_ahead = months_ahead.unwrap_or(DEFAULT_FORECAST_MONTHS);
        if months_ahead == 0 {
            return Err(AppError::validation("months_ahead must be positive"));
        }

        let (employees, records) = self.db.with_connection(|conn| {
            let employees = EmployeeRepository::list_active(conn, manager_id)?;
            let records = AllocationRepository::list_records(conn)?;
            Ok((employees, records))
        })?;

        let records = scope_records(records, manager_id, &employees);
        let employee_count = employees.len().max(1);
        let month_totals = aggregate_month_totals(&records);

        let predictions = build_forecast_predictions(
            employee_count,
            &month_totals,
            reference,
            months_ahead,
            standard_month_hours,
        );

        info!(
            target: "app::forecast",
            scoped = manager_id.is_some(),
            employee_count,
            months_ahead,
            reference = %reference,
            "capacity forecast complete"
        );

        let summary = forecast_summary(&predictions);
        let narrative = self.narrate_predictions(&predictions).await;

        Ok(ForecastReport {
            predictions,
            summary,
            narrative: Some(narrative),
        })
    }

    async fn narrate_predictions(&self, predictions: &[ForecastPrediction]) -> String {
        let fallback = fallback_for(dominant_risk(predictions));
        let facts = match serde_json::to_value(predictions) {
            Ok(value) => value,
            Err(err) => {
                warn!(target: "app::forecast", error = %err, "failed to serialize predictions for narration");
                return fallback.to_string();
            }
        };

        match self
            .narrative
            .narrate(
                NarrativeOperation::ForecastOutlook,
                &build_forecast_payload(&facts),
            )
            .await
        {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    target: "app::forecast",
                    error = %err,
                    "narrative elaboration unavailable, using fallback recommendation"
                );
                fallback.to_string()
            }
        }
    }
}

fn build_forecast_predictions<F>(
    employee_count: usize,
    month_totals: &HashMap<MonthKey, i64>,
    reference: MonthKey,
    months_ahead: u32,
    standard_for: F,
) -> Vec<ForecastPrediction>
where
    F: Fn(i32, u32) -> i64,
{
    let mut predictions = Vec::with_capacity(months_ahead as usize);

    for offset in 0..months_ahead {
        let key = reference.advance(offset);
        let standard = effective_standard(standard_for(key.year, key.month));
        let capacity = employee_count as i64 * standard;
        let allocated = month_totals.get(&key).copied().unwrap_or(0);
        let surplus = capacity - allocated;

        predictions.push(ForecastPrediction {
            month_label: key.label(),
            projected_capacity_hours: capacity,
            projected_allocated_hours: allocated,
            surplus_hours: surplus,
            risk: classify_risk(surplus, capacity),
        });
    }

    predictions
}

fn classify_risk(surplus: i64, capacity: i64) -> ForecastRisk {
    if surplus < 0 {
        ForecastRisk::Shortage
    } else if surplus as f64 > capacity as f64 * UNDERUTILIZATION_SURPLUS_RATIO {
        ForecastRisk::Underutilized
    } else {
        ForecastRisk::Balanced
    }
}

fn forecast_summary(predictions: &[ForecastPrediction]) -> String {
    let total = predictions.len();
    let shortage = count_risk(predictions, ForecastRisk::Shortage);
    let underutilized = count_risk(predictions, ForecastRisk::Underutilized);
    let balanced = count_risk(predictions, ForecastRisk::Balanced);
    let plural = if total == 1 { "" } else { "s" };

    if shortage > 0 {
        format!(
            "{shortage} of {total} upcoming month{plural} project a capacity shortage \
             ({underutilized} underutilized, {balanced} balanced)."
        )
    } else if underutilized > 0 {
        format!(
            "No shortage ahead, but the team is underutilized in {underutilized} of {total} \
             upcoming month{plural} ({balanced} balanced)."
        )
    } else {
        format!("All {total} upcoming month{plural} look balanced between capacity and bookings.")
    }
}

/// Worst bucket present, in the same priority order as the headline.
fn dominant_risk(predictions: &[ForecastPrediction]) -> ForecastRisk {
    if count_risk(predictions, ForecastRisk::Shortage) > 0 {
        ForecastRisk::Shortage
    } else if count_risk(predictions, ForecastRisk::Underutilized) > 0 {
        ForecastRisk::Underutilized
    } else {
        ForecastRisk::Balanced
    }
}

fn fallback_for(risk: ForecastRisk) -> &'static str {
    match risk {
        ForecastRisk::Shortage => FORECAST_FALLBACK_SHORTAGE,
        ForecastRisk::Underutilized => FORECAST_FALLBACK_UNDERUTILIZED,
        ForecastRisk::Balanced => FORECAST_FALLBACK_BALANCED,
    }
}

fn count_risk(predictions: &[ForecastPrediction], risk: ForecastRisk) -> usize {
    predictions
        .iter()
        .filter(|prediction| prediction.risk == risk)
        .count()
}
