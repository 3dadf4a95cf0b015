//! PostgreSQL implementation of RefundRepository.
//!
//! The one-open-refund rule is the partial unique index
//! `refunds_one_open_per_payment`; a violation on insert is reported as
//! [`InsertRefundResult::OpenRefundExists`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{Amount, DomainError, ErrorCode, PaymentId, RefundId, Timestamp};
use crate::domain::refund::{Refund, RefundStatus, RefundTransition};
use crate::ports::{InsertRefundResult, RefundRepository, TransitionOutcome};

const REFUND_COLUMNS: &str = r#"
    id, payment_id, amount, currency, reason, status, provider_refund_reference,
    failure_reason, admin_notes, rejection_reason, requested_by, requested_at,
    processed_at, completed_at, updated_at
"#;

const OPEN_STATUSES: &str = "('PENDING', 'PROCESSING', 'MANUAL_REVIEW', 'APPROVED')";

pub struct PostgresRefundRepository {
    pool: PgPool,
}

impl PostgresRefundRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RefundRow {
    id: Uuid,
    payment_id: Uuid,
    amount: i64,
    currency: String,
    reason: String,
    status: String,
    provider_refund_reference: Option<String>,
    failure_reason: Option<String>,
    admin_notes: Option<String>,
    rejection_reason: Option<String>,
    requested_by: Option<String>,
    requested_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RefundRow> for Refund {
    type Error = DomainError;

    fn try_from(row: RefundRow) -> Result<Self, Self::Error> {
        Ok(Refund {
            id: RefundId::from_uuid(row.id),
            payment_id: PaymentId::from_uuid(row.payment_id),
            amount: Amount::new(row.amount).map_err(|e| corrupt("amount", e))?,
            currency: row.currency,
            reason: row.reason,
            status: row
                .status
                .parse::<RefundStatus>()
                .map_err(|e| corrupt("status", e))?,
            provider_refund_reference: row.provider_refund_reference,
            failure_reason: row.failure_reason,
            admin_notes: row.admin_notes,
            rejection_reason: row.rejection_reason,
            requested_by: row.requested_by,
            requested_at: Timestamp::from_datetime(row.requested_at),
            processed_at: row.processed_at.map(Timestamp::from_datetime),
            completed_at: row.completed_at.map(Timestamp::from_datetime),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn corrupt(field: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value in refunds: {}", field, err),
    )
}

fn db_error(context: &str, err: sqlx::Error) -> DomainError {
    DomainError::database(format!("Failed to {}: {}", context, err))
}

fn into_refunds(rows: Vec<RefundRow>) -> Result<Vec<Refund>, DomainError> {
    rows.into_iter().map(Refund::try_from).collect()
}

#[async_trait]
impl RefundRepository for PostgresRefundRepository {
    async fn insert_if_no_open(&self, refund: &Refund) -> Result<InsertRefundResult, DomainError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO refunds (
                id, payment_id, amount, currency, reason, status, provider_refund_reference,
                failure_reason, admin_notes, rejection_reason, requested_by, requested_at,
                processed_at, completed_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(refund.id.as_uuid())
        .bind(refund.payment_id.as_uuid())
        .bind(refund.amount.minor_units())
        .bind(&refund.currency)
        .bind(&refund.reason)
        .bind(refund.status.as_str())
        .bind(&refund.provider_refund_reference)
        .bind(&refund.failure_reason)
        .bind(&refund.admin_notes)
        .bind(&refund.rejection_reason)
        .bind(&refund.requested_by)
        .bind(refund.requested_at.as_datetime())
        .bind(refund.processed_at.map(|t| *t.as_datetime()))
        .bind(refund.completed_at.map(|t| *t.as_datetime()))
        .bind(refund.updated_at.as_datetime())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(InsertRefundResult::Inserted),
            Err(sqlx::Error::Database(db_err))
                if db_err.constraint() == Some("refunds_one_open_per_payment") =>
            {
                let open = self.find_open_for_payment(&refund.payment_id).await?;
                match open {
                    Some(open) => Ok(InsertRefundResult::OpenRefundExists(open.id)),
                    // The blocking refund closed in between; the caller may retry.
                    None => Err(DomainError::new(
                        ErrorCode::DatabaseError,
                        "Open refund conflict could not be resolved",
                    )),
                }
            }
            Err(e) => Err(db_error("insert refund", e)),
        }
    }

    async fn find_by_id(&self, id: &RefundId) -> Result<Option<Refund>, DomainError> {
        let row: Option<RefundRow> =
            sqlx::query_as(&format!("SELECT {} FROM refunds WHERE id = $1", REFUND_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("find refund", e))?;

        row.map(Refund::try_from).transpose()
    }

    async fn find_by_provider_reference(
        &self,
        provider_refund_reference: &str,
    ) -> Result<Option<Refund>, DomainError> {
        let row: Option<RefundRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM refunds
            WHERE provider_refund_reference = $1
            ORDER BY requested_at DESC
            LIMIT 1
            "#,
            REFUND_COLUMNS
        ))
        .bind(provider_refund_reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find refund by provider reference", e))?;

        row.map(Refund::try_from).transpose()
    }

    async fn find_open_for_payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<Refund>, DomainError> {
        let row: Option<RefundRow> = sqlx::query_as(&format!(
            "SELECT {} FROM refunds WHERE payment_id = $1 AND status IN {}",
            REFUND_COLUMNS, OPEN_STATUSES
        ))
        .bind(payment_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find open refund", e))?;

        row.map(Refund::try_from).transpose()
    }

    async fn apply_transition(
        &self,
        id: &RefundId,
        transition: &RefundTransition,
    ) -> Result<TransitionOutcome<Refund>, DomainError> {
        if !transition.is_legal() {
            return Err(DomainError::invalid_transition(
                transition.from.as_str(),
                transition.to.as_str(),
            ));
        }

        let stamps_processed = matches!(
            transition.to,
            RefundStatus::Processing | RefundStatus::Approved | RefundStatus::Rejected
        );
        let stamps_completed = transition.to == RefundStatus::Completed;

        let row: Option<RefundRow> = sqlx::query_as(&format!(
            r#"
            UPDATE refunds SET
                status = $3,
                provider_refund_reference = COALESCE($4, provider_refund_reference),
                failure_reason = COALESCE($5, failure_reason),
                admin_notes = COALESCE($6, admin_notes),
                rejection_reason = COALESCE($7, rejection_reason),
                processed_at = CASE WHEN $8 THEN $10 ELSE processed_at END,
                completed_at = CASE WHEN $9 THEN $10 ELSE completed_at END,
                updated_at = $10
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            REFUND_COLUMNS
        ))
        .bind(id.as_uuid())
        .bind(transition.from.as_str())
        .bind(transition.to.as_str())
        .bind(&transition.provider_refund_reference)
        .bind(&transition.failure_reason)
        .bind(&transition.admin_notes)
        .bind(&transition.rejection_reason)
        .bind(stamps_processed)
        .bind(stamps_completed)
        .bind(transition.occurred_at.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("transition refund", e))?;

        match row {
            Some(row) => Ok(TransitionOutcome::Applied(Refund::try_from(row)?)),
            None => {
                let current = self.find_by_id(id).await?.ok_or_else(|| {
                    DomainError::new(ErrorCode::RefundNotFound, format!("Refund {} not found", id))
                })?;
                Ok(TransitionOutcome::Stale { current })
            }
        }
    }

    async fn list_open(&self) -> Result<Vec<Refund>, DomainError> {
        let rows: Vec<RefundRow> = sqlx::query_as(&format!(
            "SELECT {} FROM refunds WHERE status IN {} ORDER BY requested_at ASC",
            REFUND_COLUMNS, OPEN_STATUSES
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list open refunds", e))?;

        into_refunds(rows)
    }

    async fn list_for_payment(&self, payment_id: &PaymentId) -> Result<Vec<Refund>, DomainError> {
        let rows: Vec<RefundRow> = sqlx::query_as(&format!(
            "SELECT {} FROM refunds WHERE payment_id = $1 ORDER BY requested_at DESC",
            REFUND_COLUMNS
        ))
        .bind(payment_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list refunds", e))?;

        into_refunds(rows)
    }
}
