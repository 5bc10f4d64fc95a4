//! # Grievance server
//!
//! Backend for a citizen grievance portal: users register, log in, file
//! complaints against municipal departments, and track complaint status
//! through an append-only timeline.
//!
//!
//!
//! # Architecture
//!
//! - Credential data lives behind the [`identity::IdentityService`]
//!   boundary; profile and complaint records behind the
//!   [`store::DocumentStore`] boundary. Both are redis in production and
//!   in-memory in tests.
//! - [`auth::AuthGateway`] and [`complaints::ComplaintRepository`] own all
//!   validation and error translation; handlers only wire HTTP to them.
//! - Each signed-in session carries a read-through cache of its owner's
//!   complaints ([`session::SessionRegistry`]), which doubles as the local
//!   overlay for tracking lookups ([`tracking::TrackingResolver`]) so a
//!   just-filed complaint is visible before the owner query reflects it.
//!
//!
//!
//! # Redis layout
//!
//! | key                      | value                                |
//! |--------------------------|--------------------------------------|
//! | `user:<uid>`             | profile record, JSON                 |
//! | `complaint:<id>`         | complaint record, JSON               |
//! | `complaints:owner:<uid>` | zset of ids by submission timestamp  |
//! | `complaints:all`         | zset of ids by submission timestamp  |
//! | `complaint:seq:<year>`   | per-year id counter                  |
//! | `cred:<email>`           | credential record, JSON              |
//! | `cred:uid:<uid>`         | email for uid reverse lookup         |
//! | `cred:attempts:<email>`  | failed-login counter, expiring       |

use std::time::Duration;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{get, post},
    Router,
};

use signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod auth;
pub mod complaints;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod tracking;
pub mod utils;

use routes::{
    all_complaints_handler, dashboard_handler, login_handler, logout_handler, me_handler,
    my_complaints_handler, register_handler, reload_complaints_handler, submit_handler,
    track_handler, update_status_handler,
};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await.expect("Failed to initialize state");

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/me", get(me_handler))
        .route("/complaints", post(submit_handler).get(my_complaints_handler))
        .route("/complaints/reload", post(reload_complaints_handler))
        .route("/complaints/all", get(all_complaints_handler))
        .route("/complaints/{id}/status", post(update_status_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/track/{id}", get(track_handler))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
