use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, Method, Uri},
    response::{Html, IntoResponse, Response},
};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Serve `index.html` from the static directory, or the built-in page
pub async fn index(State(state): State<AppState>) -> Response {
    let path = state.config.static_dir.join("index.html");
    match tokio::fs::read(&path).await {
        Ok(content) => Html(content).into_response(),
        Err(_) => Html(FALLBACK_HTML).into_response(),
    }
}

/// Serve the JavaScript wrapper shipped with the engine
pub async fn wrapper(State(state): State<AppState>) -> Response {
    let path = state.config.artifact_config().wrapper_path;
    send_file(&path, "application/javascript").await
}

/// Serve the engine artifact for in-browser detection
pub async fn artifact(State(state): State<AppState>) -> Response {
    let path = state.config.artifact_config().artifact_path;
    send_file(&path, "application/wasm").await
}

/// Serve any other file from the static directory
pub async fn serve_static(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return AppError::NotFound.into_response();
    }

    let Some(path) = resolve_static(&state.config.static_dir, uri.path()) else {
        return AppError::NotFound.into_response();
    };
    if state.config.is_source(&path) {
        debug!("Refusing to serve configuration file {}", path.display());
        return AppError::NotFound.into_response();
    }

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    send_file(&path, mime.as_ref()).await
}

async fn send_file(path: &Path, content_type: &str) -> Response {
    match tokio::fs::read(path).await {
        Ok(content) => ([(header::CONTENT_TYPE, content_type)], content).into_response(),
        Err(e) => {
            debug!("Could not serve {}: {}", path.display(), e);
            AppError::NotFound.into_response()
        }
    }
}

/// Map a request path to a file inside `root`
///
/// Returns `None` for anything that is not a regular file under `root`,
/// including `..` segments and symlinks pointing outside it.
pub fn resolve_static(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    if relative.is_empty() {
        return None;
    }

    let mut candidate = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => candidate.push(part),
            _ => return None,
        }
    }

    let canonical_root = root.canonicalize().ok()?;
    let canonical_file = candidate.canonicalize().ok()?;
    if !canonical_file.starts_with(&canonical_root) || !canonical_file.is_file() {
        return None;
    }
    Some(canonical_file)
}

const FALLBACK_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>CLD3 Language Detector</title>
</head>
<body>
    <h1>CLD3 Language Detector</h1>
    <p>No <code>index.html</code> was found in the static directory.</p>
    <p>The JSON API is available:</p>
    <ul>
        <li><code>POST /api/detect</code> with <code>{"text": "Hello world"}</code></li>
        <li><code>GET /api/detect?text=Hello</code></li>
        <li><code>POST /api/detect/batch</code> with <code>{"texts": ["Hello", "Bonjour"]}</code></li>
        <li><a href="/api/info"><code>GET /api/info</code></a></li>
        <li><a href="/api/health"><code>GET /api/health</code></a></li>
    </ul>
</body>
</html>
"#;
