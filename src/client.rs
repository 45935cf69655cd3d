//! HTTP client for the speed test API and the measurement steps built on it

pub mod latency;
pub mod session;
pub mod throughput;

pub use latency::{LatencyOutcome, LatencyProbe};
pub use session::{ExchangeSession, SessionConfig, SessionReport, SessionState, TerminalReason};
pub use throughput::TransferResult;

use crate::{
    error::{AppError, Result},
    models::{MeasurementRun, ResultRecord, SaveResponse},
    realtime::{SdpMessage, SessionDescription, Signaler},
};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode, Url};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Speed test API as seen from the client
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Server base URL
    fn base_url(&self) -> &Url;

    /// One timed round trip to `/latency`
    async fn ping(&self) -> Result<Duration>;

    /// Timed drain of `/download?size=N`
    async fn download(&self, size_mb: u64) -> Result<TransferResult>;

    /// Timed push of an N MB body to `/upload`
    async fn upload(&self, size_mb: u64) -> Result<TransferResult>;

    /// Offer/answer exchange through `/webrtc/offer`
    async fn exchange_offer(&self, offer: &SdpMessage) -> Result<SdpMessage>;

    /// Persist a run; returns the id the server assigned
    async fn save_result(&self, run: &MeasurementRun) -> Result<String>;

    /// Fetch a persisted record
    async fn load_result(&self, id: &str) -> Result<ResultRecord>;
}

/// reqwest-backed [`HttpClient`]
pub struct NetworkClient {
    client: Client,
    base_url: Url,
}

impl NetworkClient {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        HttpUtils::validate_url(base_url)?;
        let mut base_url = Url::parse(base_url)?;
        // Relative joins below keep any path prefix only with a trailing slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("network-speed-tester/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// Create a client from the loaded configuration
    pub fn from_config(config: &crate::models::Config) -> Result<Self> {
        Self::new(&config.server_url, config.timeout())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Endpoint with a cache-defeating nonce appended
    fn uncached(&self, path: &str) -> Result<Url> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut().append_pair("nonce", &Uuid::new_v4().simple().to_string());
        Ok(url)
    }

    fn no_cache(builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header(header::CACHE_CONTROL, "no-cache, no-store")
            .header(header::PRAGMA, "no-cache")
    }
}

#[async_trait]
impl HttpClient for NetworkClient {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn ping(&self) -> Result<Duration> {
        let url = self.uncached("latency")?;
        let start = Instant::now();

        let response = Self::no_cache(self.client.get(url)).send().await?;
        let status = response.status();
        let _ = response.bytes().await?;
        let elapsed = start.elapsed();

        if !status.is_success() {
            return Err(AppError::http_request(format!("latency probe answered {}", status)));
        }
        Ok(elapsed)
    }

    async fn download(&self, size_mb: u64) -> Result<TransferResult> {
        let mut url = self.uncached("download")?;
        url.query_pairs_mut().append_pair("size", &size_mb.to_string());

        let start = Instant::now();
        let response = Self::no_cache(self.client.get(url)).send().await?;
        if !response.status().is_success() {
            return Err(AppError::http_request(format!("download answered {}", response.status())));
        }

        throughput::drain_response(response, start).await
    }

    async fn upload(&self, size_mb: u64) -> Result<TransferResult> {
        let size_mb = throughput::clamp_upload_mb(size_mb);
        let total = size_mb * throughput::MIB;
        let url = self.uncached("upload")?;

        let start = Instant::now();
        let response = Self::no_cache(self.client.post(url))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(throughput::upload_body(total))
            .send()
            .await?;
        let status = response.status();
        let _ = response.bytes().await?;
        let elapsed = start.elapsed();

        if !status.is_success() {
            return Err(AppError::http_request(format!("upload answered {}", status)));
        }

        debug!(bytes = total, elapsed_ms = elapsed.as_millis() as u64, "Upload complete");
        Ok(TransferResult::new(total, elapsed))
    }

    async fn exchange_offer(&self, offer: &SdpMessage) -> Result<SdpMessage> {
        let response = self
            .client
            .post(self.endpoint("webrtc/offer")?)
            .json(offer)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::signaling(format!("offer rejected ({}): {}", status, body.trim())));
        }

        response
            .json::<SdpMessage>()
            .await
            .map_err(|e| AppError::signaling(format!("answer is not a session description: {}", e)))
    }

    async fn save_result(&self, run: &MeasurementRun) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint("save-result")?)
            .json(run)
            .send()
            .await
            .map_err(|e| AppError::storage(format!("result upload failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::storage(format!("server refused to store result ({})", status)));
        }

        let saved: SaveResponse = response
            .json()
            .await
            .map_err(|e| AppError::storage(format!("unexpected save response: {}", e)))?;
        if saved.status != "success" {
            return Err(AppError::storage(format!("server reported status '{}'", saved.status)));
        }
        Ok(saved.id)
    }

    async fn load_result(&self, id: &str) -> Result<ResultRecord> {
        let response = self.client.get(self.endpoint(&format!("results/{}", id))?).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(AppError::not_found(format!("no result with id '{}'", id))),
            status if !status.is_success() => {
                Err(AppError::http_request(format!("result lookup answered {}", status)))
            }
            _ => response
                .json()
                .await
                .map_err(|e| AppError::protocol(format!("malformed result record: {}", e))),
        }
    }
}

/// Carries session descriptions over `/webrtc/offer`
pub struct HttpSignaler<'a> {
    client: &'a dyn HttpClient,
}

impl<'a> HttpSignaler<'a> {
    pub fn new(client: &'a dyn HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Signaler for HttpSignaler<'_> {
    async fn exchange(&self, offer: &SessionDescription) -> Result<SessionDescription> {
        let answer = self.client.exchange_offer(&offer.to_message()).await?;
        SessionDescription::from_message(&answer)
    }
}

/// Utility functions for HTTP operations
pub struct HttpUtils;

impl HttpUtils {
    /// Validate URL format
    pub fn validate_url(url: &str) -> Result<()> {
        let parsed = Url::parse(url)
            .map_err(|e| AppError::validation(format!("Invalid URL format: {}", e)))?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => return Err(AppError::validation(format!("Unsupported URL scheme: {}", scheme))),
        }

        if parsed.host().is_none() {
            return Err(AppError::validation("URL must have a host"));
        }

        Ok(())
    }

    /// Link under which a persisted result can be viewed
    pub fn share_link(base_url: &Url, id: &str) -> String {
        match base_url.join(&format!("results/{}", id)) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}/results/{}", base_url.as_str().trim_end_matches('/'), id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> NetworkClient {
        NetworkClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_url_validation() {
        assert!(HttpUtils::validate_url("http://localhost:8080").is_ok());
        assert!(HttpUtils::validate_url("https://speed.example.com/base").is_ok());
        assert!(HttpUtils::validate_url("ftp://example.com").is_err());
        assert!(HttpUtils::validate_url("not a url").is_err());
    }

    #[test]
    fn test_base_path_is_kept() {
        let client = NetworkClient::new("http://example.com/speed", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint("latency").unwrap().as_str(), "http://example.com/speed/latency");
    }

    #[test]
    fn test_share_link() {
        let base = Url::parse("http://example.com:8080/").unwrap();
        assert_eq!(HttpUtils::share_link(&base, "abc"), "http://example.com:8080/results/abc");
    }

    #[tokio::test]
    async fn test_ping_adds_nonce() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latency"))
            .respond_with(ResponseTemplate::new(200).set_body_string("1700000000000"))
            .expect(1)
            .mount(&server)
            .await;

        let elapsed = client_for(&server).ping().await.unwrap();
        assert!(elapsed < Duration::from_secs(5));

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].url.query().unwrap_or_default().contains("nonce="));
    }

    #[tokio::test]
    async fn test_ping_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(path("/latency"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(matches!(client_for(&server).ping().await, Err(AppError::HttpRequest(_))));
    }

    #[tokio::test]
    async fn test_download_counts_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download"))
            .and(query_param("size", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 2 * 1024 * 1024]))
            .mount(&server)
            .await;

        let result = client_for(&server).download(2).await.unwrap();
        assert_eq!(result.bytes, 2 * 1024 * 1024);
        assert!(result.mbps().is_some());
    }

    #[tokio::test]
    async fn test_empty_download_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(path("/download"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = client_for(&server).download(1).await.unwrap_err();
        assert!(matches!(err, AppError::Protocol(ref m) if m.contains("zero bytes received")));
    }

    #[tokio::test]
    async fn test_upload_sends_requested_size() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let result = client_for(&server).upload(1).await.unwrap();
        assert_eq!(result.bytes, 1024 * 1024);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].body.len(), 1024 * 1024);
    }

    #[tokio::test]
    async fn test_save_and_load_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/save-result"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success", "id": "1c0e5f8e-6a57-4d3f-9d0a-3c1f0d4f8a11"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/results/1c0e5f8e-6a57-4d3f-9d0a-3c1f0d4f8a11"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "1c0e5f8e-6a57-4d3f-9d0a-3c1f0d4f8a11",
                "latency": 20.5, "download": 100.0, "upload": null, "jitter": 1.25, "packetLoss": 0.0,
                "timestamp": "2026-01-02T03:04:05Z"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let id = client.save_result(&MeasurementRun::new()).await.unwrap();
        let record = client.load_result(&id).await.unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.run.latency, Some(20.5));
        assert_eq!(record.run.upload, None);
    }

    #[tokio::test]
    async fn test_save_failure_is_storage_error() {
        let server = MockServer::start().await;
        Mock::given(path("/save-result"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server).save_result(&MeasurementRun::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
    }

    #[tokio::test]
    async fn test_missing_result_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(path("/results/nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client_for(&server).load_result("nope").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejected_offer_is_signaling_error() {
        let server = MockServer::start().await;
        Mock::given(path("/webrtc/offer"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Invalid SDP offer format"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let offer = SdpMessage { sdp: "v=0".to_string() };
        let err = client.exchange_offer(&offer).await.unwrap_err();
        assert!(matches!(err, AppError::Signaling(_)));
    }
}
