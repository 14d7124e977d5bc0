//! # Tenancy API Server
//!
//! Serves user registration, sign-in, password reset, organisation
//! invitations and membership statistics over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/tenancy JWT_SECRET=... cargo run -p tenancy-api
//! ```
//!
//! Set `LOG_FORMAT=json` for structured log output.

use std::sync::Arc;

use anyhow::Context;
use tenancy_api::{
    app::{build_router, AppState},
    config::Config,
};
use tenancy_shared::{
    db::{
        migrations::run_migrations,
        pool::{close_pool, create_pool, DatabaseConfig},
    },
    notify::{LogNotifier, Notifier, SendGridNotifier},
    store::postgres::PgStore,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tenancy_api=debug,tenancy_shared=info,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Tenancy API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..DatabaseConfig::default()
    })
    .await
    .context("Failed to connect to database")?;

    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let notifier: Arc<dyn Notifier> = match config.email.sendgrid() {
        Some((api_key, from)) => Arc::new(
            SendGridNotifier::new(api_key, from).context("Failed to build mail client")?,
        ),
        None => {
            tracing::warn!("EMAIL_KEY or EMAIL_USER not set; notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let bind_address = config.bind_address();
    let store = Arc::new(PgStore::new(pool.clone()));
    let state = AppState::new(store, notifier, config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    close_pool(pool).await;
    tracing::info!("Server stopped");

    Ok(())
}
