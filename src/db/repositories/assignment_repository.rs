use rusqlite::{named_params, Connection, Row};

use crate::error::{AppError, AppResult};
use crate::models::allocation::AssignmentProjectLink;

#[derive(Debug, Clone)]
pub struct AssignmentLinkRow {
    pub assignment_id: String,
    pub project_id: String,
    pub project_name: String,
}

impl AssignmentLinkRow {
    pub fn into_link(self) -> AssignmentProjectLink {
        AssignmentProjectLink {
            assignment_id: self.assignment_id,
            project_id: self.project_id,
            project_name: self.project_name,
        }
    }
}

impl TryFrom<&Row<'_>> for AssignmentLinkRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            assignment_id: row.get("assignment_id")?,
            project_id: row.get("project_id")?,
            project_name: row.get("project_name")?,
        })
    }
}

pub struct AssignmentRepository;

impl AssignmentRepository {
    pub fn insert(
        conn: &Connection,
        assignment_id: &str,
        user_id: &str,
        project_id: &str,
    ) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO assignments (assignment_id, user_id, project_id)
                VALUES (:assignment_id, :user_id, :project_id)
            "#,
            named_params! {
                ":assignment_id": assignment_id,
                ":user_id": user_id,
                ":project_id": project_id,
            },
        )?;

        Ok(())
    }

    /// Every assignment the user currently holds, with project membership
    /// resolved to a name.
    pub fn links_for_user(
        conn: &Connection,
        user_id: &str,
    ) -> AppResult<Vec<AssignmentProjectLink>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT a.assignment_id, a.project_id, p.name AS project_name
                FROM assignments a
                JOIN projects p ON p.project_id = a.project_id
                WHERE a.user_id = :user_id
                ORDER BY a.assignment_id
            "#,
        )?;

        let rows = stmt
            .query_map(named_params! {":user_id": user_id}, |row| {
                AssignmentLinkRow::try_from(row)
            })?
            .map(|row| row.map(AssignmentLinkRow::into_link).map_err(AppError::from))
            .collect::<AppResult<Vec<_>>>()?;

        Ok(rows)
    }

    /// Distinct user ids holding an assignment on the project.
    pub fn assignee_ids_for_project(
        conn: &Connection,
        project_id: &str,
    ) -> AppResult<Vec<String>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT DISTINCT user_id
                FROM assignments
                WHERE project_id = :project_id
                ORDER BY user_id
            "#,
        )?;

        let rows = stmt
            .query_map(named_params! {":project_id": project_id}, |row| {
                row.get::<_, String>(0)
            })?
            .map(|row| row.map_err(AppError::from))
            .collect::<AppResult<Vec<_>>>()?;

        Ok(rows)
    }
}
