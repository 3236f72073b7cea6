use rusqlite::{named_params, Connection, Row};

use crate::error::{AppError, AppResult};
use crate::models::allocation::AllocationRecord;

#[derive(Debug, Clone)]
pub struct AllocationRow {
    pub assignment_id: String,
    pub user_id: String,
    pub project_id: String,
    pub project_name: String,
    pub year: i64,
    pub month: i64,
    pub allocated_hours: i64,
}

impl AllocationRow {
    pub fn into_record(self) -> AllocationRecord {
        AllocationRecord {
            assignment_id: self.assignment_id,
            user_id: self.user_id,
            project_id: self.project_id,
            project_name: self.project_name,
            year: self.year as i32,
            month: self.month as u32,
            allocated_hours: self.allocated_hours,
        }
    }
}

impl TryFrom<&Row<'_>> for AllocationRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            assignment_id: row.get("assignment_id")?,
            user_id: row.get("user_id")?,
            project_id: row.get("project_id")?,
            project_name: row.get("project_name")?,
            year: row.get("year")?,
            month: row.get("month")?,
            allocated_hours: row.get("allocated_hours")?,
        })
    }
}

pub struct AllocationRepository;

impl AllocationRepository {
    pub fn upsert_hours(
        conn: &Connection,
        assignment_id: &str,
        year: i32,
        month: u32,
        allocated_hours: i64,
    ) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO allocations (assignment_id, year, month, allocated_hours)
                VALUES (:assignment_id, :year, :month, :allocated_hours)
                ON CONFLICT(assignment_id, year, month) DO UPDATE SET
                    allocated_hours = excluded.allocated_hours
            "#,
            named_params! {
                ":assignment_id": assignment_id,
                ":year": year as i64,
                ":month": month as i64,
                ":allocated_hours": allocated_hours,
            },
        )?;

        Ok(())
    }

    /// Full booking snapshot, joined out to user and project membership.
    /// Row order is the insertion (rowid) order; downstream tie-breaking
    /// stability is defined against it.
    pub fn list_records(conn: &Connection) -> AppResult<Vec<AllocationRecord>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT
                    al.assignment_id,
                    a.user_id,
                    a.project_id,
                    p.name AS project_name,
                    al.year,
                    al.month,
                    al.allocated_hours
                FROM allocations al
                JOIN assignments a ON a.assignment_id = al.assignment_id
                JOIN projects p ON p.project_id = a.project_id
                ORDER BY al.id
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| AllocationRow::try_from(row))?
            .map(|row| row.map(AllocationRow::into_record).map_err(AppError::from))
            .collect::<AppResult<Vec<_>>>()?;

        Ok(rows)
    }
}
