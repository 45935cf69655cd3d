//! HTTP request handlers
//!
//! Each handler extracts its input, calls into the store, the echo endpoint or
//! the download stream, and converts the outcome into a response. Failures are
//! returned as [`AppError`], whose `IntoResponse` picks the status code.

use super::stream::{resolve_download_size, ChunkStream};
use super::ServerState;
use crate::error::{AppError, Result};
use crate::models::{MeasurementRun, ResultRecord, SaveResponse};
use crate::realtime::{SdpMessage, SessionDescription};
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

const NO_STORE: &str = "no-store";

/// GET /latency
///
/// Returns the server clock in epoch milliseconds. The client only times the
/// round trip; the value itself is informational.
pub async fn latency() -> Response {
    let now_ms = chrono::Utc::now().timestamp_millis();
    (
        StatusCode::OK,
        [(header::CACHE_CONTROL, NO_STORE), (header::CONTENT_TYPE, "text/plain")],
        now_ms.to_string(),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    // Kept as text so a bad value falls back to the default instead of a 400
    size: Option<String>,
}

/// GET /download?size=N
pub async fn download(State(state): State<ServerState>, Query(params): Query<DownloadParams>) -> Result<Response> {
    let config = &state.config;
    let size_mb = resolve_download_size(params.size.as_deref(), config.default_download_mb, config.download_cap_mb());
    let stream = ChunkStream::megabytes(size_mb, config.chunk_size);
    let total = stream.total();

    info!(requested = ?params.size, size_mb, chunk_size = config.chunk_size, "Streaming download");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, total)
        .header(header::CACHE_CONTROL, NO_STORE)
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::internal(format!("Failed to build download response: {}", e)))
}

/// POST /upload
///
/// Drains the body and discards it. A read failure mid-body is a server error.
pub async fn upload(body: Body) -> Result<Response> {
    let mut stream = body.into_data_stream();
    let mut received: u64 = 0;

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => received += bytes.len() as u64,
            Err(e) => {
                warn!(received, error = %e, "Upload failed to read body");
                return Err(AppError::io(format!("Upload failed to read body: {}", e)));
            }
        }
    }

    info!(bytes = received, "Upload drained");
    Ok((StatusCode::OK, "Upload complete").into_response())
}

/// POST /webrtc/offer
///
/// Opens an echo session for the offer and answers with its description.
pub async fn webrtc_offer(State(state): State<ServerState>, body: Bytes) -> Result<Json<SdpMessage>> {
    let message: SdpMessage = serde_json::from_slice(&body)
        .map_err(|e| AppError::signaling(format!("offer body is not valid JSON: {}", e)))?;
    let offer = SessionDescription::from_message(&message)?;

    debug!(session = %offer.session_id, candidates = offer.candidates.len(), "Offer received");

    let answer = state.echo.open(offer).await?;
    Ok(Json(answer.to_message()))
}

/// POST /save-result
pub async fn save_result(State(state): State<ServerState>, body: Bytes) -> Result<Json<SaveResponse>> {
    let run: MeasurementRun = serde_json::from_slice(&body)
        .map_err(|e| AppError::validation(format!("Invalid result record: {}", e)))?;

    let record = state.store.save(run).await.inspect_err(|e| {
        warn!(error = %e, "Failed to persist result");
    })?;

    info!(id = %record.id, measured = record.run.measured_count(), "Result saved");
    Ok(Json(SaveResponse::success(record.id)))
}

/// GET /results/{id}
pub async fn get_result(State(state): State<ServerState>, Path(id): Path<String>) -> Result<Json<ResultRecord>> {
    let record = state.store.load(&id).await?;
    Ok(Json(record))
}

/// Served at `/` when no static asset directory exists
pub async fn embedded_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Network Speed Test</title>
</head>
<body>
<h1>Network Speed Test</h1>
<p>This server exposes the measurement API:</p>
<ul>
<li><code>GET /latency</code></li>
<li><code>GET /download?size=N</code></li>
<li><code>POST /upload</code></li>
<li><code>POST /webrtc/offer</code></li>
<li><code>POST /save-result</code></li>
<li><code>GET /results/{id}</code></li>
</ul>
<p>Run <code>nst run --server &lt;this address&gt;</code> to measure.</p>
</body>
</html>
"#;
