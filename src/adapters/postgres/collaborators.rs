//! PostgreSQL implementations of the collaborator ports.
//!
//! These tables belong to the wider LMS; only the columns settlement
//! touches are read or written.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{CourseId, DomainError, UserId};
use crate::ports::{ApplicationStore, EnrollmentRecord, EnrollmentStore, UserDirectory};

fn db_error(context: &str, err: sqlx::Error) -> DomainError {
    DomainError::database(format!("Failed to {}: {}", context, err))
}

pub struct PostgresEnrollmentStore {
    pool: PgPool,
}

impl PostgresEnrollmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnrollmentStore for PostgresEnrollmentStore {
    async fn create_if_absent(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<EnrollmentRecord, DomainError> {
        let created: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO enrollments (id, user_id, course_id, status, enrolled_at)
            VALUES ($1, $2, $3, 'ACTIVE', NOW())
            ON CONFLICT (user_id, course_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id.as_str())
        .bind(course_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("create enrollment", e))?;

        if let Some((id,)) = created {
            return Ok(EnrollmentRecord {
                enrollment_id: id.to_string(),
                created: true,
            });
        }

        let (id,): (Uuid,) =
            sqlx::query_as("SELECT id FROM enrollments WHERE user_id = $1 AND course_id = $2")
                .bind(user_id.as_str())
                .bind(course_id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error("find enrollment", e))?;

        Ok(EnrollmentRecord {
            enrollment_id: id.to_string(),
            created: false,
        })
    }
}

pub struct PostgresApplicationStore {
    pool: PgPool,
}

impl PostgresApplicationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationStore for PostgresApplicationStore {
    async fn mark_paid(&self, user_id: &UserId, course_id: &CourseId) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET payment_status = 'PAID', paid_at = COALESCE(paid_at, NOW()), updated_at = NOW()
            WHERE user_id = $1 AND course_id = $2
            "#,
        )
        .bind(user_id.as_str())
        .bind(course_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("mark application paid", e))?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn find_email(&self, user_id: &UserId) -> Result<Option<String>, DomainError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT email FROM users WHERE id = $1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find user email", e))?;

        Ok(row.map(|(email,)| email))
    }
}
