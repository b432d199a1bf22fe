//! Customer report server
//!
//! Serves the categorized report views over HTTP from the customer summary
//! table in PostgreSQL.

use anyhow::Context;
use axum::http::Method;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use customer_reports::api::{create_report_router, ReportState};
use customer_reports::auth::policy_from_emails;
use customer_reports::config::ReportConfig;
use customer_reports::database::{DatabaseConfig, DatabaseManager};
use customer_reports::reports::{ReportService, ViewName};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "customer_reports=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting customer report server");

    let config = ReportConfig::from_env().context("Invalid report configuration")?;

    let db = DatabaseManager::new(DatabaseConfig::default())
        .await
        .context("Database connection failed")?;
    db.test_connection()
        .await
        .context("Database connectivity check failed")?;
    tracing::info!("Database ready ({})", db.connection_stats());

    let store = Arc::new(db.report_store(config.query_timeout));
    let service = Arc::new(ReportService::new(store, config.settings));
    let policy = policy_from_emails(&config.authorized_emails);
    if config.authorized_emails.is_empty() {
        tracing::warn!("REPORT_AUTHORIZED_EMAILS is empty; reports are open to every caller");
    }
    let state = ReportState::new(service, policy, &config).context("Invalid HTTP settings")?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    let app = create_report_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Report server listening on http://{}", addr);
    for view in ViewName::ALL {
        tracing::info!("  GET /api/reports/{}", view);
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app).await.context("Server error")?;

    db.close().await;
    Ok(())
}
