//! The read-only HTTP server.
//!
//! Every request goes through one fallback handler: the path is translated
//! by [`PathTranslator`], the URI is rewritten to the remainder (query kept)
//! and the request is handed to [`ServeDir`], which supplies bytes, content
//! types, conditional and range requests. Only `GET` and `HEAD` are served.
//!
//! The pipeline replaces files in the published repository while requests
//! are in flight; `ServeDir` opens each file per request, so a response is
//! either the old or the new file.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use camino::{Utf8Path, Utf8PathBuf};
use lg_core::ServeConfig;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::ServeError;
use crate::translate::PathTranslator;

#[derive(Clone)]
struct ServeState {
    translator: Arc<PathTranslator>,
    files: ServeDir,
}

/// Serves the published repository under a URL prefix.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use lg_core::ServeConfig;
/// use lg_serve::PathRewritingServer;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), lg_serve::ServeError> {
/// let config = ServeConfig::default();
/// let server = PathRewritingServer::new(Utf8Path::new("/tmp/livegit__x/bare"), &config);
///
/// let listener = PathRewritingServer::bind(&config).await?;
/// server.run(listener, CancellationToken::new()).await
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PathRewritingServer {
    translator: PathTranslator,
}

impl PathRewritingServer {
    /// Creates a server for the repository at `published`.
    #[must_use]
    pub fn new(published: &Utf8Path, config: &ServeConfig) -> Self {
        Self {
            translator: PathTranslator::new(&config.normalized_prefix(), published),
        }
    }

    /// Returns the path translator.
    #[inline]
    #[must_use]
    pub const fn translator(&self) -> &PathTranslator {
        &self.translator
    }

    /// Binds the configured listen address.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Bind`] if the address cannot be bound.
    pub async fn bind(config: &ServeConfig) -> Result<TcpListener, ServeError> {
        let address = config.bind_address();
        TcpListener::bind(&address)
            .await
            .map_err(|source| ServeError::Bind { address, source })
    }

    /// Builds the request router.
    #[must_use]
    pub fn router(&self) -> Router {
        let root: Utf8PathBuf = self.translator.root().to_owned();
        let state = ServeState {
            translator: Arc::new(self.translator.clone()),
            files: ServeDir::new(root).append_index_html_on_directories(false),
        };

        Router::new()
            .fallback(serve_published)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Serves requests on `listener` until `cancel` fires, then stops
    /// accepting and waits for in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Io`] if the accept loop fails.
    pub async fn run(self, listener: TcpListener, cancel: CancellationToken) -> Result<(), ServeError> {
        if let Ok(address) = listener.local_addr() {
            tracing::info!(
                address = %address,
                prefix = self.translator.prefix(),
                root = %self.translator.root(),
                "Serving published repository"
            );
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn serve_published(State(state): State<ServeState>, request: Request) -> Response {
    let resolved = match state.translator.translate(request.uri().path()) {
        Ok(resolved) => resolved,
        Err(rejection) => {
            tracing::debug!(path = request.uri().path(), reason = %rejection, "Rejected request");
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    let (mut parts, body) = request.into_parts();
    let target = match parts.uri.query() {
        Some(query) => format!("{}?{query}", resolved.remainder),
        None => resolved.remainder,
    };
    parts.uri = match Uri::try_from(target) {
        Ok(uri) => uri,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match state.files.oneshot(Request::from_parts(parts, body)).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, header};
    use std::fs;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn published() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join("info")).unwrap();
        fs::write(root.join("info/refs"), "0123456789abcdef\trefs/heads/main\n").unwrap();
        fs::write(root.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        (dir, root)
    }

    fn server(root: &Utf8Path, prefix: &str) -> PathRewritingServer {
        let config = ServeConfig {
            prefix: prefix.to_owned(),
            ..ServeConfig::default()
        };
        PathRewritingServer::new(root, &config)
    }

    async fn send(router: Router, method: Method, uri: &str) -> (StatusCode, String) {
        let request = axum::http::Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_serves_file_under_prefix() {
        let (_dir, root) = published();
        let router = server(&root, "/user/module/").router();

        let (status, body) = send(router, Method::GET, "/user/module/info/refs").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("refs/heads/main"));
    }

    #[tokio::test]
    async fn test_query_is_preserved_and_ignored_by_files() {
        let (_dir, root) = published();
        let router = server(&root, "/user/module/").router();

        let (status, _) =
            send(router, Method::GET, "/user/module/info/refs?service=git-upload-pack").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_other_prefix_is_not_found() {
        let (_dir, root) = published();
        let router = server(&root, "/user/module/").router();

        let (status, _) = send(router.clone(), Method::GET, "/other/info/refs").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(router, Method::GET, "/etc/passwd").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_traversal_is_not_found() {
        let (_dir, root) = published();
        let router = server(&root, "/user/module/").router();

        for uri in [
            "/user/module/%2e%2e/%2e%2e/etc/passwd",
            "/user/module/info/%2e%2e/HEAD",
            "/user/module/a%2f..%2fHEAD",
        ] {
            let (status, _) = send(router.clone(), Method::GET, uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let (_dir, root) = published();
        let router = server(&root, "/").router();

        let (status, _) = send(router, Method::GET, "/objects/info/packs").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_head_request() {
        let (_dir, root) = published();
        let router = server(&root, "/repo").router();

        let (status, body) = send(router, Method::HEAD, "/repo/HEAD").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_writes_are_not_allowed() {
        let (_dir, root) = published();
        let router = server(&root, "/repo").router();

        let (status, _) = send(router, Method::POST, "/repo/info/refs").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_range_request() {
        let (_dir, root) = published();
        let router = server(&root, "/repo").router();

        let request = axum::http::Request::builder()
            .uri("/repo/HEAD")
            .header(header::RANGE, "bytes=0-3")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ref:");
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let (_dir, root) = published();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server(&root, "/user/module/").run(listener, cancel.clone()));

        let mut stream = tokio::net::TcpStream::connect(address).await.unwrap();
        stream
            .write_all(b"GET /user/module/info/refs HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("refs/heads/main"));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    fn git(args: &[&str], cwd: &std::path::Path) -> bool {
        std::process::Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .is_ok_and(|o| o.status.success())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dumb_http_clone() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("work");
        fs::create_dir(&work).unwrap();
        if !git(&["init", "--quiet"], &work) {
            return;
        }
        fs::write(work.join("a.txt"), "x").unwrap();
        assert!(git(&["add", "--all"], &work));
        assert!(git(
            &["-c", "user.name=t", "-c", "user.email=t@t", "commit", "--quiet", "-m", "init"],
            &work
        ));
        assert!(git(&["clone", "--bare", "--quiet", "work", "bare"], dir.path()));
        let bare = dir.path().join("bare");
        assert!(git(&["update-server-info"], &bare));

        let root = Utf8PathBuf::from_path_buf(bare).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server(&root, "/user/module/").run(listener, cancel.clone()));

        let url = format!("http://{address}/user/module/");
        let cwd = dir.path().to_path_buf();
        let cloned = tokio::task::spawn_blocking(move || {
            git(&["clone", "--quiet", &url, "clone"], &cwd)
        })
        .await
        .unwrap();

        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert!(cloned);
        assert_eq!(fs::read_to_string(dir.path().join("clone/a.txt")).unwrap(), "x");
    }
}
