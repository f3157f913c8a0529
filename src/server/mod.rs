//! HTTP front-end: router, shared state and the serve loop.
//!
//! ## Routes
//!
//! | Method | Path               | Handler                        |
//! |--------|--------------------|--------------------------------|
//! | GET    | `/`                | upload form                    |
//! | POST   | `/`                | store upload, redirect to it   |
//! | GET    | `/uploads/{name}`  | raw bytes (`ServeDir`)         |
//! | GET    | `/process/{name}`  | convert and download artifact  |
//! | GET    | `/health`          | liveness                       |

pub mod error;
pub mod handlers;
pub mod pages;

use crate::config::ServiceConfig;
use crate::converter::{self, Converter};
use crate::error::Tex2HtmlError;
use crate::retention;
use crate::storage::UploadStore;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

/// Shared state handed to every handler.
///
/// Built once at startup; cheap to clone (everything is behind an `Arc` or
/// already a small handle).
#[derive(Clone)]
pub struct AppState {
    pub store: UploadStore,
    pub converter: Arc<dyn Converter>,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(store: UploadStore, converter: Arc<dyn Converter>, config: ServiceConfig) -> Self {
        Self {
            store,
            converter,
            config: Arc::new(config),
        }
    }

    /// Open the upload directory and build the configured converter.
    pub async fn from_config(config: ServiceConfig) -> Result<Self, Tex2HtmlError> {
        let store = UploadStore::open(&config.upload_dir).await?;
        let converter = converter::from_config(&config);
        Ok(Self::new(store, converter, config))
    }
}

/// Build the application [`Router`] with its middleware stack.
pub fn router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.store.dir());
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(handlers::upload_page).post(handlers::upload_file))
        .route("/process/{name}", get(handlers::process_file))
        .route("/health", get(handlers::health))
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        // Panic recovery: a bug in one request must not take the process down.
        .layer(CatchPanicLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Run the service until SIGINT/SIGTERM.
///
/// The retention sweeper, when configured, lives exactly as long as the
/// server.
pub async fn serve(config: ServiceConfig) -> Result<(), Tex2HtmlError> {
    let addr = config.bind_addr();
    let state = AppState::from_config(config).await?;

    let sweeper = state.config.retention_secs.map(|secs| {
        retention::spawn_sweeper(
            state.store.clone(),
            Duration::from_secs(secs),
            Duration::from_secs(state.config.sweep_interval_secs),
        )
    });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Tex2HtmlError::Internal(format!("cannot bind {addr}: {e}")))?;
    info!(
        "Listening on {} (converter: {})",
        addr,
        state.converter.name()
    );

    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Tex2HtmlError::Internal(format!("server error: {e}")));

    if let Some(handle) = sweeper {
        handle.abort();
    }
    info!("Shutdown complete");
    result
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
