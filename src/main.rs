//! Settlement service entry point.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tuition_settlement::adapters::http::{settlement_router, SettlementAppState};
use tuition_settlement::adapters::paystack::PaystackGateway;
use tuition_settlement::adapters::postgres::{
    self, PostgresApplicationStore, PostgresEnrollmentStore, PostgresPaymentLedger,
    PostgresRefundRepository, PostgresUserDirectory,
};
use tuition_settlement::application::SideEffectDispatcher;
use tuition_settlement::config::{AppConfig, ServerConfig};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        tracing::error!(error = ?error, "Settlement service exited with error");
        eprintln!("tuition-settlement: {:#}", error);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config.server);
    config.validate().context("validating configuration")?;
    tracing::info!(
        environment = ?config.server.environment,
        gateway_live = config.gateway.is_live_mode(),
        "Configuration loaded"
    );

    let pool = postgres::connect(&config.database)
        .await
        .context("connecting to PostgreSQL")?;
    if config.database.run_migrations {
        postgres::run_migrations(&pool)
            .await
            .context("running migrations")?;
    }

    let ledger = Arc::new(PostgresPaymentLedger::new(pool.clone()));
    let gateway = PaystackGateway::new(config.gateway.paystack())
        .map_err(|e| anyhow::anyhow!("building gateway client: {}", e))?;
    let dispatcher = SideEffectDispatcher::standard(
        ledger.clone(),
        Arc::new(PostgresEnrollmentStore::new(pool.clone())),
        Arc::new(PostgresApplicationStore::new(pool.clone())),
    );
    let state = SettlementAppState {
        ledger,
        refunds: Arc::new(PostgresRefundRepository::new(pool.clone())),
        gateway: Arc::new(gateway),
        users: Arc::new(PostgresUserDirectory::new(pool)),
        dispatcher,
        checkout: config.gateway.checkout_settings(),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api", settlement_router())
        .with_state(state)
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(cors_layer(&config.server))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(%addr, "Settlement service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    tracing::info!("Settlement service stopped");
    Ok(())
}

/// JSON lines in production, human-readable otherwise. `RUST_LOG` wins over
/// the configured level.
fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(server.log_level.as_str()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if server.is_production() {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.pretty().try_init()
    };
    if let Err(e) = installed {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-user-role"),
        ])
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl-C, draining connections"),
        Err(e) => {
            tracing::error!(error = %e, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await
        }
    }
}
