//! Router construction and the serve loop.

use std::time::Duration;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use facerec_core::{EuclideanMatcher, OnnxExtractor};
use facerec_store::FaceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::engine::spawn_engine;
use crate::middleware::request_timeout;
use crate::routes::{faces, health};
use crate::state::AppState;

/// Build the router for the face endpoints.
///
/// CORS is fully open: any origin, method and header.
pub fn build_router(state: AppState, config: &Config) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/recognize", post(faces::recognize))
        .route("/register", post(faces::register))
        .route("/health", get(health::health_check))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes()))
        .layer(from_fn_with_state(
            Duration::from_secs(config.request_timeout_secs),
            request_timeout,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load models, open the store and serve until SIGTERM or Ctrl+C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let extractor = OnnxExtractor::load(&config.scrfd_model_path(), &config.arcface_model_path())
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    let engine = spawn_engine(Box::new(extractor))?;

    let store = FaceStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening face store {}", config.db_path.display()))?;

    let state = AppState::new(engine, store, EuclideanMatcher::new(config.match_threshold));
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(
        addr = %config.bind_addr,
        db = %config.db_path.display(),
        threshold = config.match_threshold,
        "facerecd listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facerecd shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
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
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
