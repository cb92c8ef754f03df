mod db;
mod engine;
mod handlers;
mod models;
mod rate_limit;
mod store;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use rate_limit::{rate_limit_admin, rate_limit_booking, rate_limit_public, RateLimiter};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub admin_token: String,
    pub started_at: Instant,
}

/// Rate limit cleanup interval (seconds).
const RATE_LIMIT_CLEANUP_SECS: u64 = 300;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // ── Tracing ──
    let env_filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── Env vars ──
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:braidhouse.db?mode=rwc".into());
    let admin_token = std::env::var("ADMIN_TOKEN").expect("ADMIN_TOKEN must be set");
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    let webapp_url = std::env::var("WEBAPP_URL").ok();

    // ── Database ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    db::run_migrations(&pool).await?;

    let state = Arc::new(AppState {
        db: pool,
        admin_token,
        started_at: Instant::now(),
    });

    // ── Rate limiter ──
    let rate_limiter = RateLimiter::new()
        .with_tier("public", 60, Duration::from_secs(60))
        .with_tier("booking", 5, Duration::from_secs(300))
        .with_tier("admin", 120, Duration::from_secs(60));

    // ── Background task: cleanup stale rate limit entries ──
    let cleanup_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    // ── CORS: whitelist WEBAPP_URL when configured, otherwise allow any ──
    let cors = match &webapp_url {
        Some(url) => {
            let origins: Vec<axum::http::HeaderValue> = vec![
                url.parse().expect("WEBAPP_URL must be a valid URL"),
                "http://localhost:5173".parse().unwrap(), // Vite dev server
            ];
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    // ── Router (4 groups with per-group rate limits) ──

    // 1. No-limit: health checks
    let no_limit_routes = Router::new().route("/api/health", get(handlers::health::health));

    // 2. Public: read-only endpoints (no auth, 60 req/min)
    let public_routes = Router::new()
        .route("/api/styles", get(handlers::client::list_styles))
        .route("/api/stylists", get(handlers::client::list_stylists))
        .route("/api/availability", get(handlers::client::availability))
        .route(
            "/api/availability/week",
            get(handlers::client::week_availability),
        )
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_public));

    // 3. Booking creation: strictest limit (5 req/5min)
    let booking_routes = Router::new()
        .route("/api/bookings", post(handlers::client::create_booking))
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_booking));

    // 4. Admin: all admin endpoints (120 req/min)
    let admin_routes = Router::new()
        .route("/api/admin/settings", get(handlers::admin::get_settings))
        .route("/api/admin/settings", put(handlers::admin::update_settings))
        .route("/api/admin/stylists", get(handlers::admin::list_stylists))
        .route("/api/admin/stylists", post(handlers::admin::create_stylist))
        .route(
            "/api/admin/stylists/{id}",
            put(handlers::admin::update_stylist),
        )
        .route(
            "/api/admin/stylists/{id}/leave",
            get(handlers::admin::list_leave),
        )
        .route(
            "/api/admin/stylists/{id}/leave",
            post(handlers::admin::create_leave),
        )
        .route(
            "/api/admin/leave/{id}",
            delete(handlers::admin::delete_leave),
        )
        .route("/api/admin/styles", get(handlers::admin::list_styles))
        .route("/api/admin/styles", post(handlers::admin::create_style))
        .route("/api/admin/styles/{id}", put(handlers::admin::update_style))
        .route(
            "/api/admin/styles/{id}/pricing",
            put(handlers::admin::update_pricing),
        )
        .route(
            "/api/admin/categories",
            get(handlers::admin::list_categories),
        )
        .route(
            "/api/admin/categories",
            post(handlers::admin::create_category),
        )
        .route("/api/admin/bookings", get(handlers::admin::list_bookings))
        .route(
            "/api/admin/bookings/{id}/cancel",
            post(handlers::admin::cancel_booking),
        )
        .route(
            "/api/admin/bookings/{id}/reschedule",
            put(handlers::admin::reschedule_booking),
        )
        .route(
            "/api/admin/bookings/{id}/status",
            put(handlers::admin::update_booking_status),
        )
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_admin));

    let app = Router::new()
        .merge(no_limit_routes)
        .merge(public_routes)
        .merge(booking_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!("Braid House server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
