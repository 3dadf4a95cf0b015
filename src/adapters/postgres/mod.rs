//! PostgreSQL adapters - Database implementations of the persistence ports.
//!
//! - `PostgresPaymentLedger` - Payments with status-guarded updates
//! - `PostgresRefundRepository` - Refunds with the one-open-refund index
//! - `PostgresEnrollmentStore`, `PostgresApplicationStore`,
//!   `PostgresUserDirectory` - Collaborator tables

mod collaborators;
mod payment_ledger;
mod refund_repository;

pub use collaborators::{PostgresApplicationStore, PostgresEnrollmentStore, PostgresUserDirectory};
pub use payment_ledger::PostgresPaymentLedger;
pub use refund_repository::PostgresRefundRepository;

use sqlx::PgPool;

use crate::config::DatabaseConfig;

/// Connect a pool sized by `config`.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let pool = config.pool_options().connect(&config.url).await?;
    tracing::info!(
        max_connections = config.max_connections,
        "Connected to PostgreSQL"
    );
    Ok(pool)
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
