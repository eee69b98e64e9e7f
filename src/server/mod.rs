mod routes;
pub mod upload;

use anyhow::{anyhow, Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use crate::config::Config;
use crate::state::AppState;

/// Headroom for multipart framing and non-image fields.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

fn cors_layer(config: &Config) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(&config.frontend_origin)
        .map_err(|_| anyhow!("Invalid FRONTEND_ORIGIN '{}'", config.frontend_origin))?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list([origin]))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request()))
}

pub fn build_router(state: AppState) -> Result<Router> {
    let config = state.config();
    let body_limit = config
        .max_upload_images
        .saturating_mul(config.max_image_bytes)
        .saturating_add(BODY_LIMIT_SLACK);
    let cors = cors_layer(config)?;

    Ok(Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/items/:item_id", get(routes::read_item))
        .route(
            "/generate",
            get(routes::generate_from_directory).post(routes::generate_from_upload),
        )
        .route("/generate-items", get(routes::generate_sample_items))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn run(state: AppState) -> Result<()> {
    let addr = state.config().bind_addr;
    let app = build_router(state)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    info!("Server stopped");
    Ok(())
}
