//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The client bundle is a single-page application. Files that exist in the
//! build output directory are served as-is; every other path gets the
//! application shell (`index.html`) so client-side routing can take over.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub const SHELL_FILE: &str = "index.html";

#[derive(Clone)]
struct ShellState {
    index_path: Arc<PathBuf>,
}

/// Static file server for `dist_dir` with shell fallback.
pub fn app(dist_dir: impl AsRef<Path>) -> Router {
    let dist_dir = dist_dir.as_ref();
    let shell = get(serve_shell).with_state(ShellState { index_path: Arc::new(dist_dir.join(SHELL_FILE)) });

    Router::new()
        .route("/healthz", get(healthz))
        .fallback_service(ServeDir::new(dist_dir).fallback(shell))
        .layer(TraceLayer::new_for_http())
}

/// Read the shell on every request so a rebuilt bundle is picked up without
/// a restart. A missing shell fails the request, not the process.
async fn serve_shell(State(shell): State<ShellState>) -> Response {
    match tokio::fs::read(shell.index_path.as_path()).await {
        Ok(html) => ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response(),
        Err(e) => {
            tracing::error!(path = %shell.index_path.display(), error = %e, "failed to load application shell");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error loading index.html").into_response()
        }
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
