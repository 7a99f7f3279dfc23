//! Test server harness for E2E testing
//!
//! Provides `TestReportServer` for spawning real report service instances
//! wired to a `MockIdentityProvider`.

use crate::mock_idp::{MockIdentityProvider, TEST_CLIENT_ID, TEST_REALM};
use metrics_exporter_prometheus::PrometheusHandle;
use report_service::config::Config;
use report_service::observability::metrics::init_metrics_recorder;
use report_service::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

/// Body written to the report file by default.
pub const TEST_REPORT_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\n%%EOF\n";

static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static NEXT_REPORT_ID: AtomicU64 = AtomicU64::new(0);

/// Process-wide metrics handle.
///
/// Only one global recorder can be installed per process; later callers get
/// the same handle.
pub fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder().unwrap_or_else(|_| {
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .build_recorder()
                    .handle()
            })
        })
        .clone()
}

/// Options for [`TestReportServer::spawn_with`].
#[derive(Debug, Clone)]
pub struct TestServerOptions {
    /// Report contents; `None` leaves the configured path absent.
    pub report: Option<Vec<u8>>,

    /// Extra environment variables, applied over the harness defaults.
    pub env: Vec<(String, String)>,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            report: Some(TEST_REPORT_BYTES.to_vec()),
            env: Vec::new(),
        }
    }
}

impl TestServerOptions {
    /// No report file on disk.
    pub fn without_report(mut self) -> Self {
        self.report = None;
        self
    }

    /// Set an environment variable for the server configuration.
    pub fn env(mut self, name: &str, value: &str) -> Self {
        self.env.push((name.to_string(), value.to_string()));
        self
    }
}

/// Test harness for spawning the report service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let idp = MockIdentityProvider::start().await;
/// let server = TestReportServer::spawn(&idp).await?;
///
/// let response = reqwest::get(format!("{}/health", server.url())).await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestReportServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    report_path: PathBuf,
    _handle: JoinHandle<()>,
}

impl TestReportServer {
    /// Spawn a server with a report file and default settings.
    pub async fn spawn(idp: &MockIdentityProvider) -> Result<Self, anyhow::Error> {
        Self::spawn_with(idp, TestServerOptions::default()).await
    }

    /// Spawn a server with custom options.
    ///
    /// The server will:
    /// - Point its key store at the mock provider's test realm
    /// - Serve a report file unique to this instance
    /// - Bind to a random available port (127.0.0.1:0)
    pub async fn spawn_with(
        idp: &MockIdentityProvider,
        options: TestServerOptions,
    ) -> Result<Self, anyhow::Error> {
        let report_path = std::env::temp_dir().join(format!(
            "report-test-{}-{}.pdf",
            std::process::id(),
            NEXT_REPORT_ID.fetch_add(1, Ordering::Relaxed)
        ));
        match &options.report {
            Some(bytes) => std::fs::write(&report_path, bytes)
                .map_err(|e| anyhow::anyhow!("Failed to write test report: {}", e))?,
            None => {
                let _ = std::fs::remove_file(&report_path);
            }
        }

        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("KEYCLOAK_URL".to_string(), idp.base_url()),
            ("KEYCLOAK_REALM".to_string(), TEST_REALM.to_string()),
            ("KEYCLOAK_CLIENT_ID".to_string(), TEST_CLIENT_ID.to_string()),
            (
                "REPORT_FILE_PATH".to_string(),
                report_path.to_string_lossy().into_owned(),
            ),
        ]);
        vars.extend(options.env);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = AppState::from_config(config)
            .map_err(|e| anyhow::anyhow!("Failed to build app state: {}", e))?;
        let state = Arc::new(state);
        let app = routes::build_routes(state.clone(), test_metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            report_path,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared application state, for reaching the key store directly.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// Path of the report file backing this instance.
    pub fn report_path(&self) -> &Path {
        &self.report_path
    }
}

impl Drop for TestReportServer {
    fn drop(&mut self) {
        self._handle.abort();
        let _ = std::fs::remove_file(&self.report_path);
    }
}
