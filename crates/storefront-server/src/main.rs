//! creem-storefront HTTP Server
//!
//! Axum server exposing the storefront API: product catalogue, checkout,
//! customer portal, account history and the Creem webhook endpoint.

mod auth;
mod config;
mod error;
mod handlers;
mod state;


use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use storefront_core::{MemoryPurchaseStore, MemorySessionStore, PgStore, PurchaseStore, SessionStore};
use storefront_payments::{CreemClient, PaymentProvider};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::handlers::{
    account, cancel_subscription, create_checkout, creem_webhook, customer_portal, health_check,
    list_products, pricing_table,
};
use crate::state::{AppState, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().context("invalid configuration")?;

    let state = build_state(&config).await?;
    let app = build_router(state, cors_layer(config.cors_allow_origin.as_deref())?);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("creem-storefront running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                  - Health check");
    tracing::info!("  GET  /api/products            - Product catalogue");
    tracing::info!("  GET  /api/pricing-table       - Hosted pricing table");
    tracing::info!("  GET  /api/checkout            - Create checkout session");
    tracing::info!("  GET  /api/customerPortal      - Customer portal link");
    tracing::info!("  POST /api/subscription/cancel - Cancel subscription");
    tracing::info!("  GET  /api/account             - Purchase history");
    tracing::info!("  POST /api/webhook             - Creem webhook");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Wire storage, sessions and the payment provider from configuration
async fn build_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let (store, sessions): (Arc<dyn PurchaseStore>, Arc<dyn SessionStore>) =
        match &config.database_url {
            Some(url) => {
                let pg = PgStore::connect(url, config.database_max_connections)
                    .await
                    .context("failed to connect to database")?;
                pg.migrate().await.context("failed to run migrations")?;
                tracing::info!("✓ Connected to Postgres");
                (Arc::new(pg.clone()), Arc::new(pg))
            }
            None => {
                tracing::warn!("⚠ DATABASE_URL not set - using in-memory storage");
                tracing::warn!("  Purchases are lost on restart and no sessions resolve");
                (
                    Arc::new(MemoryPurchaseStore::new()),
                    Arc::new(MemorySessionStore::new()),
                )
            }
        };

    let payments = match &config.creem {
        Some(creem) => {
            let client = CreemClient::new(creem).context("failed to build Creem client")?;
            tracing::info!(base_url = %client.base_url(), "✓ Creem configured");
            Some(Arc::new(client) as Arc<dyn PaymentProvider>)
        }
        None => {
            tracing::warn!("⚠ Creem not configured - payments disabled");
            tracing::warn!("  Set CREEM_API_KEY in .env");
            None
        }
    };

    if config.webhook_secret.is_none() {
        tracing::warn!("⚠ CREEM_WEBHOOK_SECRET not set - webhook signatures are not verified");
    }

    Ok(AppState {
        store,
        sessions,
        payments,
        settings: Arc::new(Settings {
            webhook_secret: config.webhook_secret.clone(),
            success_url: config.success_url.clone(),
            pricing_table_id: config.pricing_table_id.clone(),
        }),
    })
}

/// Any origin unless one is configured
fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let allow_origin = match origin {
        Some(origin) => AllowOrigin::exact(
            HeaderValue::from_str(origin).with_context(|| format!("invalid CORS origin: {origin}"))?,
        ),
        None => AllowOrigin::from(Any),
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        // Health
        .route("/health", get(health_check))
        // Catalogue
        .route("/api/products", get(list_products))
        .route("/api/pricing-table", get(pricing_table))
        // Purchases
        .route("/api/checkout", get(create_checkout))
        .route("/api/customerPortal", get(customer_portal))
        .route("/api/subscription/cancel", post(cancel_subscription))
        .route("/api/account", get(account))
        // Creem
        .route("/api/webhook", post(creem_webhook))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
