use crate::error::AppError;
use crate::state::AppState;
use crate::{routes, static_files};
use axum::{
    http::HeaderValue,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::any::Any;
use std::net::SocketAddr;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Build the Axum application
pub fn build_app(state: AppState) -> Router {
    let cors_layer = if state.config.cors_allow_any {
        CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods(cors::Any)
            .allow_headers(cors::Any)
    } else {
        // Only the advertised public URL may call the API cross-origin
        let origin = HeaderValue::from_str(&state.config.public_url()).ok();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origin))
            .allow_methods(cors::Any)
            .allow_headers(cors::Any)
    };

    // API routes
    let api_routes = Router::new()
        // Detection
        .route(
            "/detect",
            get(routes::detect_get)
                .post(routes::detect_post)
                .fallback(routes::not_found),
        )
        .route(
            "/detect/batch",
            post(routes::detect_batch).fallback(routes::not_found),
        )
        // Documentation and status
        .route("/languages", get(routes::languages).fallback(routes::not_found))
        .route("/info", get(routes::info).fallback(routes::not_found))
        .route("/health", get(routes::health).fallback(routes::not_found));

    Router::new()
        .nest("/api", api_routes)
        .route("/", get(static_files::index))
        .route("/cld3_wasm.js", get(static_files::wrapper))
        .route("/cld3_wasm.wasm", get(static_files::artifact))
        .route("/metrics", get(routes::metrics))
        .fallback(static_files::serve_static)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        *s
    } else {
        "unknown panic"
    };
    error!("Server error: {}", detail);
    AppError::Internal.into_response()
}

/// Run the server until a shutdown signal arrives
pub async fn run_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
