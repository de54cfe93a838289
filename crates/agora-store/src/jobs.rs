//! Job board posts.

use rusqlite::params;
use rusqlite::types::Value;

use agora_shared::{JobId, JobPatch, JobPost, NewJob, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{fmt_ts, get_author, get_id, get_opt_ts, get_ts, now, patch_row, text_columns};

const JOB_SELECT: &str = "SELECT j.id, j.title, j.company, j.location, j.description, j.requirements,
            j.salary_range, j.application_url, j.user_id, j.created_at, j.expires_at,
            p.id, p.username, p.avatar_url
     FROM job_posts j
     LEFT JOIN profiles p ON p.id = j.user_id";

impl Database {
    /// Insert a job post authored by `owner` and return it with the author
    /// summary attached.
    pub fn create_job(&self, owner: UserId, job: &NewJob) -> Result<JobPost> {
        let id = JobId::new();
        self.conn().execute(
            "INSERT INTO job_posts
                (id, title, company, location, description, requirements,
                 salary_range, application_url, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id.to_string(),
                job.title,
                job.company,
                job.location,
                job.description,
                job.requirements,
                job.salary_range,
                job.application_url,
                owner.to_string(),
                fmt_ts(&now()),
                job.expires_at.as_ref().map(fmt_ts),
            ],
        )?;
        self.get_job(id)
    }

    pub fn get_job(&self, id: JobId) -> Result<JobPost> {
        self.conn()
            .query_row(
                &format!("{JOB_SELECT} WHERE j.id = ?1"),
                params![id.to_string()],
                row_to_job,
            )
            .map_err(|e| StoreError::or_not_found(e, "job post"))
    }

    /// All job posts, newest first.
    pub fn list_jobs(&self) -> Result<Vec<JobPost>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{JOB_SELECT} ORDER BY j.created_at DESC, j.rowid DESC"))?;
        let rows = stmt.query_map([], row_to_job)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Apply the fields present in `patch` and return the stored row.
    pub fn update_job(&self, id: JobId, patch: &JobPatch) -> Result<JobPost> {
        let mut columns = text_columns(&[
            ("title", patch.title.as_ref()),
            ("company", patch.company.as_ref()),
            ("location", patch.location.as_ref()),
            ("description", patch.description.as_ref()),
            ("requirements", patch.requirements.as_ref()),
            ("salary_range", patch.salary_range.as_ref()),
            ("application_url", patch.application_url.as_ref()),
        ]);
        if let Some(expires_at) = &patch.expires_at {
            columns.push(("expires_at", Value::Text(fmt_ts(expires_at))));
        }

        if !columns.is_empty() && patch_row(self.conn(), "job_posts", &id.to_string(), columns)? == 0 {
            return Err(StoreError::NotFound("job post"));
        }
        self.get_job(id)
    }

    /// Returns `false` when no such post existed.
    pub fn delete_job(&self, id: JobId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM job_posts WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobPost> {
    Ok(JobPost {
        id: get_id(row, 0)?,
        title: row.get(1)?,
        company: row.get(2)?,
        location: row.get(3)?,
        description: row.get(4)?,
        requirements: row.get(5)?,
        salary_range: row.get(6)?,
        application_url: row.get(7)?,
        user_id: get_id(row, 8)?,
        created_at: get_ts(row, 9)?,
        expires_at: get_opt_ts(row, 10)?,
        author: get_author(row, 11)?,
    })
}
