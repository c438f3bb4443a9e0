//! TestGateway: the full HTTP gateway on an ephemeral port.
//!
//! Runs the real router in-process, wired to a [`StubEngine`](crate::StubEngine)
//! or any other endpoint, and provides HTTP request helpers.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use gremlin_gateway::config::{AuthConfig, EngineConfig, PrefetchConfig};
use gremlin_gateway::http::{create_router, AppState};
use gremlin_gateway::{GatewayConfig, QueryGateway};

/// Errors from TestGateway operations.
#[derive(Debug, Error)]
pub enum TestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("login failed with status {0}")]
    Login(u16),
}

/// Index page written into the static directory.
pub const INDEX_HTML: &str = "<!doctype html><title>gremlin gateway</title>";

/// Full-stack test harness.
pub struct TestGateway {
    addr: SocketAddr,
    client: reqwest::Client,
    server: JoinHandle<()>,
    /// Static UI directory (kept alive for the test duration).
    _static_dir: TempDir,
}

impl TestGateway {
    /// Configuration pointing at `engine_url`, with small prefetch batches.
    pub fn config(engine_url: &str) -> GatewayConfig {
        GatewayConfig {
            port: 0,
            debug: true,
            log_format: "pretty".into(),
            static_dir: Default::default(),
            auth: AuthConfig {
                gremlin_auth: false,
                admin_username: "admin".into(),
                admin_password: "admin".into(),
                jwt_secret: "test-gateway-secret".into(),
                jwt_timeout_secs: 300,
                jwt_max_refresh_secs: 3600,
            },
            engine: EngineConfig {
                url: engine_url.to_string(),
                skip_cert_verify: false,
                aliases: BTreeMap::new(),
                request_timeout: Some(Duration::from_secs(10)),
                evaluation_timeout_ms: None,
            },
            prefetch: PrefetchConfig {
                batch_size: 10,
                batch_count: 8,
            },
            watermark: "test".into(),
        }
    }

    /// Start the gateway with `config`. The static directory is replaced by
    /// a temporary one holding [`INDEX_HTML`].
    pub async fn start(mut config: GatewayConfig) -> Result<Self, TestError> {
        let static_dir = TempDir::new()?;
        std::fs::write(static_dir.path().join("index.html"), INDEX_HTML)?;
        config.static_dir = static_dir.path().to_path_buf();

        let config = Arc::new(config);
        let gateway = QueryGateway::new(Arc::clone(&config));
        let app = create_router(AppState::new(Arc::clone(&config), gateway));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            client: reqwest::Client::new(),
            server,
            _static_dir: static_dir,
        })
    }

    /// Get the base URL of the gateway.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Log in and return the session token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, TestError> {
        let resp = self
            .post(
                "/login",
                None,
                &serde_json::json!({"username": username, "password": password}),
            )
            .await?;
        if !resp.status().is_success() {
            return Err(TestError::Login(resp.status().as_u16()));
        }
        let body: Value = resp.json().await?;
        Ok(body["token"].as_str().unwrap_or_default().to_string())
    }

    /// GET `path`, optionally with a bearer token.
    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<reqwest::Response, TestError> {
        let mut request = self.client.get(format!("{}{}", self.base_url(), path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    /// POST a JSON body to `path`, optionally with a bearer token.
    pub async fn post(
        &self,
        path: &str,
        token: Option<&str>,
        body: &Value,
    ) -> Result<reqwest::Response, TestError> {
        let mut request = self
            .client
            .post(format!("{}{}", self.base_url(), path))
            .json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.server.abort();
    }
}
