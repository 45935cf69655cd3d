//! Speed test HTTP server
//!
//! One listener carries every endpoint:
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | GET | `/latency` | round-trip timing target |
//! | GET | `/download?size=N` | synthetic byte stream |
//! | POST | `/upload` | drained and discarded |
//! | POST | `/webrtc/offer` | opens a datagram echo session |
//! | POST | `/save-result` | persists a result record |
//! | GET | `/results/{id}` | reads one back |
//!
//! Everything else falls through to the static asset directory.

pub mod handlers;
pub mod stream;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::realtime::{EchoEndpoint, UdpEchoEndpoint};
use crate::store::{self, ResultStore};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

/// Shared by all handlers
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ResultStore>,
    pub echo: Arc<dyn EchoEndpoint>,
}

pub struct SpeedTestServer {
    state: ServerState,
}

impl SpeedTestServer {
    /// Build the server with the store and echo endpoint the configuration describes
    pub async fn new(config: Config) -> Result<Self> {
        let store = store::open_store(&config).await?;
        let echo: Arc<dyn EchoEndpoint> = Arc::new(UdpEchoEndpoint::from_config(&config)?);
        Ok(Self::from_parts(config, store, echo))
    }

    /// Build the server around existing collaborators
    pub fn from_parts(config: Config, store: Arc<dyn ResultStore>, echo: Arc<dyn EchoEndpoint>) -> Self {
        Self {
            state: ServerState {
                config: Arc::new(config),
                store,
                echo,
            },
        }
    }

    pub fn store(&self) -> Arc<dyn ResultStore> {
        self.state.store.clone()
    }

    /// Listener address as "host:port"
    pub fn addr(&self) -> String {
        format!("{}:{}", self.state.config.server_host, self.state.config.server_port)
    }

    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/latency", get(handlers::latency))
            .route("/download", get(handlers::download))
            .route("/upload", post(handlers::upload).layer(DefaultBodyLimit::disable()))
            .route("/webrtc/offer", post(handlers::webrtc_offer))
            .route(
                "/save-result",
                post(handlers::save_result).layer(DefaultBodyLimit::max(crate::defaults::SAVE_BODY_LIMIT)),
            )
            .route("/results/{id}", get(handlers::get_result));

        let static_dir = &self.state.config.static_dir;
        let router = if static_dir.is_dir() {
            info!(dir = %static_dir.display(), "Serving static assets");
            api.fallback_service(ServeDir::new(static_dir))
        } else {
            info!(dir = %static_dir.display(), "Static directory missing, serving embedded index");
            api.route("/", get(handlers::embedded_index))
        };

        router.layer(CorsLayer::very_permissive()).with_state(self.state.clone())
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let addr = self.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AppError::network(format!("Failed to bind to {}: {}", addr, e)))?;

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves, then close the store
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local: SocketAddr = listener.local_addr()?;
        info!(addr = %local, "Speed test server listening");

        let result = axum::serve(listener, self.router().into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| AppError::network(format!("Server error: {}", e)));

        if let Err(e) = self.state.store.close().await {
            warn!(error = %e, "Result store did not close cleanly");
        }
        info!(
            active_echo_sessions = self.state.echo.active_sessions(),
            "Speed test server stopped"
        );

        result
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Cannot listen for Ctrl-C, running until killed");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryResultStore;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    async fn spawn_server(config: Config) -> (String, tokio::sync::oneshot::Sender<()>) {
        let echo = Arc::new(UdpEchoEndpoint::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            None,
            None,
            Duration::from_secs(5),
        ));
        let server = SpeedTestServer::from_parts(config, Arc::new(MemoryResultStore::new()), echo);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        (base, tx)
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.static_dir = "does-not-exist".into();
        config.max_download_mb = 4;
        config.default_download_mb = 2;
        config
    }

    #[tokio::test]
    async fn test_latency_returns_epoch_ms() {
        let (base, _stop) = spawn_server(test_config()).await;
        let response = reqwest::get(format!("{}/latency", base)).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["cache-control"], "no-store");
        let ms: i64 = response.text().await.unwrap().parse().unwrap();
        assert!(ms > 1_600_000_000_000);
    }

    #[tokio::test]
    async fn test_download_sizes() {
        let (base, _stop) = spawn_server(test_config()).await;

        for (query, expected_mb) in [("size=1", 1u64), ("size=0", 2), ("size=-3", 2), ("size=999", 4), ("", 2)] {
            let response = reqwest::get(format!("{}/download?{}", base, query)).await.unwrap();
            assert_eq!(response.status(), 200);
            assert_eq!(response.content_length(), Some(expected_mb * stream::MIB), "{query}");
            let body = response.bytes().await.unwrap();
            assert_eq!(body.len() as u64, expected_mb * stream::MIB, "{query}");
        }
    }

    #[tokio::test]
    async fn test_upload_is_drained() {
        let (base, _stop) = spawn_server(test_config()).await;
        let response = reqwest::Client::new()
            .post(format!("{}/upload", base))
            .body(vec![7u8; 3 * 1024 * 1024])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_bad_offer_is_rejected() {
        let (base, _stop) = spawn_server(test_config()).await;
        let client = reqwest::Client::new();

        for body in [r#"not json"#, r#"{"sdp":"v=0\r\n"}"#] {
            let response = client
                .post(format!("{}/webrtc/offer", base))
                .header("content-type", "application/json")
                .body(body)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 400);
            let json: serde_json::Value = response.json().await.unwrap();
            assert_eq!(json["message"], "Invalid SDP offer format");
        }
    }

    #[tokio::test]
    async fn test_save_and_fetch_result() {
        let (base, _stop) = spawn_server(test_config()).await;
        let client = reqwest::Client::new();

        let saved: serde_json::Value = client
            .post(format!("{}/save-result", base))
            .json(&serde_json::json!({
                "latency": 12.5, "download": 88.25, "upload": 40.125, "jitter": 1.75, "packetLoss": null
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(saved["status"], "success");

        let id = saved["id"].as_str().unwrap();
        let record: serde_json::Value = reqwest::get(format!("{}/results/{}", base, id))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(record["id"], id);
        assert_eq!(record["download"], 88.25);
        assert_eq!(record["upload"], 40.125);
        assert!(record["packetLoss"].is_null());
        assert!(record["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_result_is_404() {
        let (base, _stop) = spawn_server(test_config()).await;
        let response = reqwest::get(format!("{}/results/{}", base, crate::store::new_record_id()))
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        let json: serde_json::Value = response.json().await.unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "result not found");
    }

    #[tokio::test]
    async fn test_oversized_save_is_rejected() {
        let (base, _stop) = spawn_server(test_config()).await;
        let padding = "x".repeat(crate::defaults::SAVE_BODY_LIMIT + 16);
        let response = reqwest::Client::new()
            .post(format!("{}/save-result", base))
            .header("content-type", "application/json")
            .body(format!(r#"{{"latency": 1.0, "pad": "{}"}}"#, padding))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 413);
    }

    #[tokio::test]
    async fn test_embedded_index_without_static_dir() {
        let (base, _stop) = spawn_server(test_config()).await;
        let response = reqwest::get(format!("{}/", base)).await.unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.text().await.unwrap().contains("Network Speed Test"));
    }

    #[tokio::test]
    async fn test_static_dir_is_served() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("index.html"), "<h1>custom ui</h1>").unwrap();
        let mut config = test_config();
        config.static_dir = temp.path().to_path_buf();

        let (base, _stop) = spawn_server(config).await;
        let body = reqwest::get(format!("{}/", base)).await.unwrap().text().await.unwrap();
        assert!(body.contains("custom ui"));
    }
}
