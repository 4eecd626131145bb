//! # City Sentinel Notifier
//!
//! Sends status and verification notifications for citizen-reported issues.
//!
//! The UI changes an issue first, then calls this service once per
//! transition. The service works out who should hear about it (the reporter
//! plus everyone following the issue), writes one in-app notification each and
//! sends a best-effort email to those who have not opted out.
//!
//!
//!
//! # Endpoints
//!
//! - `POST /notify-status-change`: `{ issue_id, old_status, new_status }`
//! - `POST /notify-verification-change`: `{ issue_id, old_status | null, new_status, verifier_name?, verifier_role? }`
//! - `GET /health`
//!
//! Both notify endpoints need `Authorization: Bearer <user access token>` and
//! answer `200 { success, message, notifications_created, emails_sent }` or
//! `{ error }` with 400, 401, 403, 404 or 500.
//!
//!
//!
//! # Failure Model
//!
//! - Anything wrong with the caller, payload or issue fails the request before a single notification is written
//! - Past that point nothing fails the request, a dead email provider just means `emails_sent` is lower
//! - No retries and no dedup: calling twice notifies twice
//!
//!
//!
//! # Environment
//!
//! | Variable | Default |
//! |---|---|
//! | `RUST_PORT` | `8080` |
//! | `SUPABASE_URL` | required |
//! | `SUPABASE_ANON_KEY` | required, env or `/run/secrets` |
//! | `SUPABASE_SERVICE_ROLE_KEY` | required, env or `/run/secrets` |
//! | `RESEND_API_KEY` | unset disables email |
//! | `EMAIL_FROM` | `City Sentinel <onboarding@resend.dev>` |
//! | `EMAIL_API_URL` | `https://api.resend.com/emails` |
//! | `EMAIL_TIMEOUT_MS` | `10000` |
//!
//! Logging is controlled with `RUST_LOG`, e.g. `RUST_LOG=notifier=debug`.
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        HeaderName, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod channels;
pub mod compose;
pub mod config;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod recipients;
pub mod routes;
pub mod state;
pub mod utils;

use config::Config;
use error::StartupError;
use routes::{health_handler, status_change_handler, verification_change_handler};
use state::AppState;

const MAX_BODY_BYTES: usize = 64 * 1024;

pub async fn start_server() -> Result<(), StartupError> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading configuration...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = AppState::new(&config)?;

    info!("Starting server...");
    let app = build_router(state);

    let address = format!("0.0.0.0:{}", config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/notify-status-change", post(status_change_handler))
        .route(
            "/notify-verification-change",
            post(verification_change_handler),
        )
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
