use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::employee::EmployeeRecord;

#[derive(Debug, Clone)]
pub struct EmployeeRow {
    pub user_id: String,
    pub full_name: String,
    pub is_active: i64,
    pub manager_id: Option<String>,
}

impl EmployeeRow {
    pub fn into_record(self) -> EmployeeRecord {
        EmployeeRecord {
            user_id: self.user_id,
            full_name: self.full_name,
            is_active: self.is_active != 0,
            manager_id: self.manager_id,
        }
    }
}

impl TryFrom<&Row<'_>> for EmployeeRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            full_name: row.get("full_name")?,
            is_active: row.get("is_active")?,
            manager_id: row.get("manager_id")?,
        })
    }
}

pub struct EmployeeRepository;

impl EmployeeRepository {
    pub fn upsert(conn: &Connection, record: &EmployeeRecord) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO employees (user_id, full_name, is_active, manager_id)
                VALUES (:user_id, :full_name, :is_active, :manager_id)
                ON CONFLICT(user_id) DO UPDATE SET
                    full_name = excluded.full_name,
                    is_active = excluded.is_active,
                    manager_id = excluded.manager_id
            "#,
            named_params! {
                ":user_id": &record.user_id,
                ":full_name": &record.full_name,
                ":is_active": record.is_active as i64,
                ":manager_id": &record.manager_id,
            },
        )?;

        Ok(())
    }

    pub fn get(conn: &Connection, user_id: &str) -> AppResult<Option<EmployeeRecord>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT user_id, full_name, is_active, manager_id
                FROM employees
                WHERE user_id = :user_id
            "#,
        )?;

        let row = stmt
            .query_row(named_params! {":user_id": user_id}, |row| {
                EmployeeRow::try_from(row)
            })
            .optional()?;

        Ok(row.map(EmployeeRow::into_record))
    }

    /// Active employees, optionally restricted to one manager's directs.
    pub fn list_active(
        conn: &Connection,
        manager_id: Option<&str>,
    ) -> AppResult<Vec<EmployeeRecord>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT user_id, full_name, is_active, manager_id
                FROM employees
                WHERE is_active = 1
                  AND (:manager_id IS NULL OR manager_id = :manager_id)
                ORDER BY user_id
            "#,
        )?;

        let rows = stmt
            .query_map(named_params! {":manager_id": manager_id}, |row| {
                EmployeeRow::try_from(row)
            })?
            .map(|row| row.map(EmployeeRow::into_record).map_err(AppError::from))
            .collect::<AppResult<Vec<_>>>()?;

        Ok(rows)
    }
}
