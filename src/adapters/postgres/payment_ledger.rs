//! PostgreSQL implementation of PaymentLedger.
//!
//! Status writes are single guarded statements
//! (`UPDATE ... WHERE id = $1 AND status = $2 RETURNING ...`), so concurrent
//! settlements of one reference resolve to exactly one winner in the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::domain::foundation::{
    Amount, CourseId, DomainError, ErrorCode, PaymentId, Timestamp, UserId,
};
use crate::domain::payment::{
    InstallmentProgress, Payment, PaymentReference, PaymentStatus, PaymentTransition, PaymentType,
};
use crate::ports::{PaymentLedger, TransitionOutcome};

const PAYMENT_COLUMNS: &str = r#"
    id, reference, payment_type, amount, currency, status, user_id, course_id,
    application_id, enrollment_id, due_date, paid_at, provider_transaction_id,
    authorization_url, access_code, failure_reason, metadata, dispatched_at,
    replaces_payment_id, created_at, updated_at
"#;

const INSERT_PAYMENT: &str = r#"
    INSERT INTO payments (
        id, reference, payment_type, amount, currency, status, user_id, course_id,
        application_id, enrollment_id, due_date, paid_at, provider_transaction_id,
        authorization_url, access_code, failure_reason, metadata, dispatched_at,
        replaces_payment_id, created_at, updated_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
"#;

/// Losing a race on `payments_one_replacement_per_slice` inserts nothing.
const INSERT_REPLACEMENT: &str = r#"
    INSERT INTO payments (
        id, reference, payment_type, amount, currency, status, user_id, course_id,
        application_id, enrollment_id, due_date, paid_at, provider_transaction_id,
        authorization_url, access_code, failure_reason, metadata, dispatched_at,
        replaces_payment_id, created_at, updated_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
    ON CONFLICT (replaces_payment_id) WHERE replaces_payment_id IS NOT NULL DO NOTHING
"#;

/// PostgreSQL implementation of the PaymentLedger port.
pub struct PostgresPaymentLedger {
    pool: PgPool,
}

impl PostgresPaymentLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("find payment", e))?;

        row.map(Payment::try_from).transpose()
    }
}

fn into_payments(rows: Vec<PaymentRow>) -> Result<Vec<Payment>, DomainError> {
    rows.into_iter().map(Payment::try_from).collect()
}

/// Database row representation of a payment.
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    reference: String,
    payment_type: String,
    amount: i64,
    currency: String,
    status: String,
    user_id: String,
    course_id: Option<String>,
    application_id: Option<String>,
    enrollment_id: Option<String>,
    due_date: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    provider_transaction_id: Option<String>,
    authorization_url: Option<String>,
    access_code: Option<String>,
    failure_reason: Option<String>,
    metadata: serde_json::Value,
    dispatched_at: Option<DateTime<Utc>>,
    replaces_payment_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            reference: PaymentReference::new(row.reference)
                .map_err(|e| corrupt("reference", e))?,
            payment_type: row
                .payment_type
                .parse::<PaymentType>()
                .map_err(|e| corrupt("payment_type", e))?,
            amount: Amount::new(row.amount).map_err(|e| corrupt("amount", e))?,
            currency: row.currency,
            status: row
                .status
                .parse::<PaymentStatus>()
                .map_err(|e| corrupt("status", e))?,
            user_id: UserId::new(row.user_id).map_err(|e| corrupt("user_id", e))?,
            course_id: row
                .course_id
                .map(CourseId::new)
                .transpose()
                .map_err(|e| corrupt("course_id", e))?,
            application_id: row.application_id,
            enrollment_id: row.enrollment_id,
            due_date: row.due_date.map(Timestamp::from_datetime),
            paid_at: row.paid_at.map(Timestamp::from_datetime),
            provider_transaction_id: row.provider_transaction_id,
            authorization_url: row.authorization_url,
            access_code: row.access_code,
            failure_reason: row.failure_reason,
            metadata: row.metadata,
            dispatched_at: row.dispatched_at.map(Timestamp::from_datetime),
            replaces_payment_id: row.replaces_payment_id.map(PaymentId::from_uuid),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn corrupt(field: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value in payments: {}", field, err),
    )
}

fn db_error(context: &str, err: sqlx::Error) -> DomainError {
    DomainError::database(format!("Failed to {}: {}", context, err))
}

fn not_found(id: &PaymentId) -> DomainError {
    DomainError::new(ErrorCode::PaymentNotFound, format!("Payment {} not found", id))
}

fn insert_query<'q>(sql: &'q str, payment: &'q Payment) -> Query<'q, Postgres, PgArguments> {
    sqlx::query(sql)
        .bind(payment.id.as_uuid())
        .bind(payment.reference.as_str())
        .bind(payment.payment_type.as_str())
        .bind(payment.amount.minor_units())
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.user_id.as_str())
        .bind(payment.course_id.as_ref().map(|c| c.as_str()))
        .bind(&payment.application_id)
        .bind(&payment.enrollment_id)
        .bind(payment.due_date.map(|t| *t.as_datetime()))
        .bind(payment.paid_at.map(|t| *t.as_datetime()))
        .bind(&payment.provider_transaction_id)
        .bind(&payment.authorization_url)
        .bind(&payment.access_code)
        .bind(&payment.failure_reason)
        .bind(&payment.metadata)
        .bind(payment.dispatched_at.map(|t| *t.as_datetime()))
        .bind(payment.replaces_payment_id.map(|id| *id.as_uuid()))
        .bind(payment.created_at.as_datetime())
        .bind(payment.updated_at.as_datetime())
}

fn map_insert_error(payment: &Payment, err: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint() == Some("payments_reference_key") {
            return DomainError::new(
                ErrorCode::DuplicateReference,
                format!("Payment reference {} already exists", payment.reference),
            )
            .with_detail("reference", payment.reference.as_str());
        }
    }
    db_error("insert payment", err)
}

#[async_trait]
impl PaymentLedger for PostgresPaymentLedger {
    async fn insert(&self, payment: &Payment) -> Result<(), DomainError> {
        insert_query(INSERT_PAYMENT, payment)
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_error(payment, e))?;
        Ok(())
    }

    async fn insert_all(&self, payments: &[Payment]) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;

        for payment in payments {
            insert_query(INSERT_PAYMENT, payment)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_insert_error(payment, e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit payments", e))?;
        Ok(())
    }

    async fn insert_replacement(&self, replacement: &Payment) -> Result<Payment, DomainError> {
        let failed_id = replacement.replaces_payment_id.ok_or_else(|| {
            DomainError::validation("replaces_payment_id", "Replacement must name its slice")
        })?;

        let result = insert_query(INSERT_REPLACEMENT, replacement)
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_error(replacement, e))?;
        if result.rows_affected() == 1 {
            return Ok(replacement.clone());
        }

        self.find_replacement(&failed_id).await?.ok_or_else(|| {
            DomainError::database(format!("Replacement for payment {} vanished", failed_id))
        })
    }

    async fn find_replacement(
        &self,
        failed_id: &PaymentId,
    ) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE replaces_payment_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(failed_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find replacement payment", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        self.fetch_one_by_id(id).await
    }

    async fn find_by_reference(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE reference = $1",
            PAYMENT_COLUMNS
        ))
        .bind(reference.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find payment by reference", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn apply_transition(
        &self,
        id: &PaymentId,
        transition: &PaymentTransition,
    ) -> Result<TransitionOutcome<Payment>, DomainError> {
        if !transition.is_legal() {
            return Err(DomainError::invalid_transition(
                transition.from.as_str(),
                transition.to.as_str(),
            ));
        }

        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            r#"
            UPDATE payments SET
                status = $3,
                paid_at = COALESCE($4, paid_at),
                provider_transaction_id = COALESCE($5, provider_transaction_id),
                failure_reason = COALESCE($6, failure_reason),
                updated_at = $7
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(id.as_uuid())
        .bind(transition.from.as_str())
        .bind(transition.to.as_str())
        .bind(transition.paid_at.map(|t| *t.as_datetime()))
        .bind(&transition.provider_transaction_id)
        .bind(&transition.failure_reason)
        .bind(transition.occurred_at.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("transition payment", e))?;

        match row {
            Some(row) => Ok(TransitionOutcome::Applied(Payment::try_from(row)?)),
            None => {
                let current = self.fetch_one_by_id(id).await?.ok_or_else(|| not_found(id))?;
                Ok(TransitionOutcome::Stale { current })
            }
        }
    }

    async fn record_checkout(
        &self,
        id: &PaymentId,
        authorization_url: &str,
        access_code: &str,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET authorization_url = $2, access_code = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(authorization_url)
        .bind(access_code)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("record checkout", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn mark_dispatched(
        &self,
        id: &PaymentId,
        at: Timestamp,
        enrollment_id: Option<&str>,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                dispatched_at = $2,
                enrollment_id = COALESCE($3, enrollment_id),
                updated_at = $2
            WHERE id = $1 AND dispatched_at IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(at.as_datetime())
        .bind(enrollment_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("mark payment dispatched", e))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        match self.fetch_one_by_id(id).await? {
            Some(_) => Ok(false),
            None => Err(not_found(id)),
        }
    }

    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Payment>, DomainError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE user_id = $1 ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list payments", e))?;

        into_payments(rows)
    }

    async fn list_by_user_with_status(
        &self,
        user_id: &UserId,
        status: PaymentStatus,
    ) -> Result<Vec<Payment>, DomainError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE user_id = $1 AND status = $2 ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        ))
        .bind(user_id.as_str())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list payments", e))?;

        into_payments(rows)
    }

    async fn installment_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<InstallmentProgress, DomainError> {
        let (paid, total): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FILTER (WHERE p.status = 'PAID'), COUNT(*)
            FROM payments p
            WHERE p.user_id = $1
              AND p.course_id = $2
              AND p.payment_type = 'INSTALLMENT'
              AND NOT (
                  p.status = 'FAILED'
                  AND EXISTS (SELECT 1 FROM payments r WHERE r.replaces_payment_id = p.id)
              )
            "#,
        )
        .bind(user_id.as_str())
        .bind(course_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("compute installment progress", e))?;

        let paid = u32::try_from(paid).map_err(|e| corrupt("installment count", e))?;
        let total = u32::try_from(total).map_err(|e| corrupt("installment count", e))?;
        Ok(InstallmentProgress::new(paid, total))
    }

    async fn list_pending_older_than(
        &self,
        cutoff: Timestamp,
        limit: u32,
    ) -> Result<Vec<Payment>, DomainError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM payments
            WHERE status = 'PENDING' AND created_at < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(*cutoff.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list stale pending payments", e))?;

        into_payments(rows)
    }

    async fn list_undispatched_paid(&self, limit: u32) -> Result<Vec<Payment>, DomainError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM payments
            WHERE status = 'PAID' AND dispatched_at IS NULL
            ORDER BY created_at ASC
            LIMIT $1
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list undispatched payments", e))?;

        into_payments(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(status: &str, course_id: Option<&str>) -> PaymentRow {
        let now = Utc::now();
        PaymentRow {
            id: Uuid::new_v4(),
            reference: "KM_1".into(),
            payment_type: "TUITION".into(),
            amount: 50_000,
            currency: "NGN".into(),
            status: status.into(),
            user_id: "user-1".into(),
            course_id: course_id.map(String::from),
            application_id: None,
            enrollment_id: None,
            due_date: None,
            paid_at: Some(now),
            provider_transaction_id: Some("tx_1".into()),
            authorization_url: None,
            access_code: None,
            failure_reason: None,
            metadata: json!({"course_id": "course-1"}),
            dispatched_at: None,
            replaces_payment_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn row_converts_to_payment() {
        let payment = Payment::try_from(row("PAID", Some("course-1"))).unwrap();

        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.payment_type, PaymentType::Tuition);
        assert_eq!(payment.amount.minor_units(), 50_000);
        assert_eq!(payment.course_id.as_ref().unwrap().as_str(), "course-1");
        assert!(payment.awaiting_dispatch());
    }

    #[test]
    fn replacement_link_survives_conversion() {
        let failed_id = Uuid::new_v4();
        let mut replacement = row("PENDING", Some("course-1"));
        replacement.payment_type = "INSTALLMENT".into();
        replacement.replaces_payment_id = Some(failed_id);

        let payment = Payment::try_from(replacement).unwrap();
        assert_eq!(payment.replaces_payment_id, Some(PaymentId::from_uuid(failed_id)));
    }

    #[test]
    fn unknown_status_is_a_database_error() {
        let err = Payment::try_from(row("SETTLED", None)).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn zero_amount_is_a_database_error() {
        let mut bad = row("PAID", None);
        bad.amount = 0;
        let err = Payment::try_from(bad).unwrap_err();
        assert!(err.message().contains("amount"));
    }
}
