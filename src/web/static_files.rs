//! Static file listener: serves the browser client's assets from a
//! configurable directory, falling back to `index.html` for any path that
//! isn't a file on disk (single-page app routing) rather than embedding a
//! built frontend into the binary.

use axum::Router;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

/// Builds the static-file router, served from `static_dir`.
pub fn static_file_router(static_dir: &str) -> Router {
    let index = std::path::Path::new(static_dir).join("index.html");
    let serve_dir = ServeDir::new(static_dir).fallback(ServeFile::new(index));

    Router::new()
        .fallback_service(serve_dir)
        .layer(TraceLayer::new_for_http())
}
