//! Static files from a directory.
//!
//! ```rust,no_run
//! use baton::{Router, files};
//!
//! let app = Router::new().any("/static/{*path}", files::serve_dir("./static"));
//! ```
//!
//! The handler reads the `path` parameter of a catch-all route and looks it up
//! under the root directory. Only regular files are served; directories,
//! missing files and paths that try to climb out of the root are 404.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, warn};

use crate::handler::Handler;
use crate::request::Request;
use crate::response::{ContentType, Response};

/// A handler serving files below `root`. Mount it on a route ending in
/// `{*path}`.
pub fn serve_dir(root: impl Into<PathBuf>) -> impl Handler {
    let root: Arc<Path> = Arc::from(root.into());
    move |req: Request| {
        let root = Arc::clone(&root);
        async move { serve(&root, &req).await }
    }
}

async fn serve(root: &Path, req: &Request) -> Response {
    let Some(path) = req.param("path").and_then(|rel| resolve(root, rel)) else {
        return not_found();
    };

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return not_found(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return not_found(),
        Err(e) => return unreadable(&path, e),
    }

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(ContentType::OctetStream, ContentType::from_extension);
            debug!(path = %path.display(), len = bytes.len(), "static file");
            Response::builder().bytes(content_type, bytes)
        }
        Err(e) => unreadable(&path, e),
    }
}

/// Joins a `/`-separated relative path onto `root`. `None` if any segment
/// would leave the root.
fn resolve(root: &Path, rel: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    let mut depth = 0;
    for segment in rel.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            s if s.contains(['\\', ':', '\0']) => return None,
            s => {
                path.push(s);
                depth += 1;
            }
        }
    }
    (depth > 0).then_some(path)
}

fn not_found() -> Response {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .text("404 page not found")
}

fn unreadable(path: &Path, e: io::Error) -> Response {
    warn!(path = %path.display(), "cannot read static file: {e}");
    Response::status(StatusCode::INTERNAL_SERVER_ERROR)
}
