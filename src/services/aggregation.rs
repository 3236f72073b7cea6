use std::collections::{HashMap, HashSet};

use crate::models::allocation::{
    AllocationRecord, MonthKey, MonthlyUserProjectTotal, MonthlyUserTotal,
};
use crate::models::employee::EmployeeRecord;

/// Grouping key for one user's bookings in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserMonthKey {
    pub user_id: String,
    pub year: i32,
    pub month: u32,
}

/// Grouping key for one user's bookings on one project in one month.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserProjectMonthKey {
    pub user_id: String,
    pub project_id: String,
    pub year: i32,
    pub month: u32,
}

/// Roll raw booking rows up to per-(user, month) totals. Duplicate keys
/// sum; first-seen order is preserved because every downstream tie-break
/// is defined against retrieval order.
pub fn aggregate_user_totals(records: &[AllocationRecord]) -> Vec<MonthlyUserTotal> {
    let mut totals: Vec<MonthlyUserTotal> = Vec::new();
    let mut index: HashMap<UserMonthKey, usize> = HashMap::new();

    for record in records {
        let key = UserMonthKey {
            user_id: record.user_id.clone(),
            year: record.year,
            month: record.month,
        };
        match index.get(&key) {
            Some(&slot) => totals[slot].total_hours += record.allocated_hours,
            None => {
                index.insert(key, totals.len());
                totals.push(MonthlyUserTotal {
                    user_id: record.user_id.clone(),
                    year: record.year,
                    month: record.month,
                    total_hours: record.allocated_hours,
                });
            }
        }
    }

    totals
}

/// Roll raw booking rows up to per-(user, project, month) totals, with the
/// same summing and ordering contract as [`aggregate_user_totals`].
pub fn aggregate_user_project_totals(
    records: &[AllocationRecord],
) -> Vec<MonthlyUserProjectTotal> {
    let mut totals: Vec<MonthlyUserProjectTotal> = Vec::new();
    let mut index: HashMap<UserProjectMonthKey, usize> = HashMap::new();

    for record in records {
        let key = UserProjectMonthKey {
            user_id: record.user_id.clone(),
            project_id: record.project_id.clone(),
            year: record.year,
            month: record.month,
        };
        match index.get(&key) {
            Some(&slot) => totals[slot].hours += record.allocated_hours,
            None => {
                index.insert(key, totals.len());
                totals.push(MonthlyUserProjectTotal {
                    user_id: record.user_id.clone(),
                    project_id: record.project_id.clone(),
                    project_name: record.project_name.clone(),
                    year: record.year,
                    month: record.month,
                    hours: record.allocated_hours,
                });
            }
        }
    }

    totals
}

/// Sum booked hours per calendar month across every user in the slice.
pub fn aggregate_month_totals(records: &[AllocationRecord]) -> HashMap<MonthKey, i64> {
    let mut totals: HashMap<MonthKey, i64> = HashMap::new();
    for record in records {
        *totals.entry(record.month_key()).or_insert(0) += record.allocated_hours;
    }
    totals
}

/// Restrict the booking snapshot to the scoped employee set when a manager
/// filter is active. Without a filter the snapshot passes through
/// untouched; orphaned rows are handled per component.
pub fn scope_records(
    records: Vec<AllocationRecord>,
    manager_id: Option<&str>,
    employees: &[EmployeeRecord],
) -> Vec<AllocationRecord> {
    if manager_id.is_none() {
        return records;
    }
    let scoped_ids: HashSet<&str> = employees
        .iter()
        .map(|employee| employee.user_id.as_str())
        .collect();
    records
        .into_iter()
        .filter(|record| scoped_ids.contains(record.user_id.as_str()))
        .collect()
}
