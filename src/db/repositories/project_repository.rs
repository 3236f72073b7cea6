use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::AppResult;
use crate::models::project::ProjectRecord;

#[derive(Debug, Clone)]
pub struct ProjectRow {
    pub project_id: String,
    pub name: String,
}

impl ProjectRow {
    pub fn into_record(self) -> ProjectRecord {
        ProjectRecord {
            project_id: self.project_id,
            name: self.name,
        }
    }
}

impl TryFrom<&Row<'_>> for ProjectRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            project_id: row.get("project_id")?,
            name: row.get("name")?,
        })
    }
}

pub struct ProjectRepository;

impl ProjectRepository {
    pub fn upsert(conn: &Connection, record: &ProjectRecord) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO projects (project_id, name)
                VALUES (:project_id, :name)
                ON CONFLICT(project_id) DO UPDATE SET
                    name = excluded.name
            "#,
            named_params! {
                ":project_id": &record.project_id,
                ":name": &record.name,
            },
        )?;

        Ok(())
    }

    pub fn get(conn: &Connection, project_id: &str) -> AppResult<Option<ProjectRecord>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT project_id, name
                FROM projects
                WHERE project_id = :project_id
            "#,
        )?;

        let row = stmt
            .query_row(named_params! {":project_id": project_id}, |row| {
                ProjectRow::try_from(row)
            })
            .optional()?;

        Ok(row.map(ProjectRow::into_record))
    }
}
