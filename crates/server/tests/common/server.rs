//! Server test utilities.

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stow_core::config::{AppConfig, StorageConfig};
use stow_server::{AppState, create_router};
use stow_storage::{FilesystemInstanceStore, InstanceStore};
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    archive_dir: PathBuf,
    spool_dir: PathBuf,
    _temp_dir: TempDir,
}

/// Status, headers and body of a response.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let archive_dir = temp_dir.path().join("archive");
        let spool_dir = temp_dir.path().join("spool");
        std::fs::create_dir_all(&spool_dir).expect("Failed to create spool directory");

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem {
            path: archive_dir.clone(),
        };
        config.stow.spool_directory = spool_dir.clone();

        // Apply user modifications
        modifier(&mut config);

        let store: Arc<dyn InstanceStore> = Arc::new(
            FilesystemInstanceStore::new(&archive_dir)
                .await
                .expect("Failed to create instance store"),
        );
        let state = AppState::new(config, store);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            archive_dir,
            spool_dir,
            _temp_dir: temp_dir,
        }
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Number of entries left below the spool root.
    pub fn spool_entries(&self) -> usize {
        std::fs::read_dir(&self.spool_dir)
            .expect("Failed to read spool directory")
            .count()
    }

    /// Send a request through the router and collect the response.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// POST a multipart body to `uri`.
    pub async fn post(
        &self,
        uri: &str,
        content_type: &str,
        accept: Option<&str>,
        body: Vec<u8>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", content_type);
        if let Some(accept) = accept {
            builder = builder.header("Accept", accept);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }
}
