use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

use super::error::AppError;
use super::AppState;
use crate::acquisition::tools::ToolReport;
use crate::acquisition::AcquiredAudio;
use crate::transcription::{Segment, Transcript};

const USAGE: &str = "tubescribe: audio acquisition and transcription\n\
\n\
  GET  /health                  service status and tool inventory\n\
  POST /transcribe {\"url\": …}   transcribe a video's audio track\n\
  GET  /downloads?url=…         download the audio track as mp3\n";

#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub transcription: String,
    pub language: Option<String>,
    pub segments: Vec<Segment>,
}

impl From<Transcript> for TranscribeResponse {
    fn from(t: Transcript) -> Self {
        Self {
            transcription: t.text,
            language: t.language,
            segments: t.segments,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse<'a> {
    pub status: &'static str,
    pub version: &'static str,
    pub whisper_model: &'a str,
    pub hostname: String,
    pub tools: &'a ToolReport,
}

pub async fn root() -> &'static str {
    USAGE
}

pub async fn not_found() -> AppError {
    AppError::not_found()
}

pub async fn health(State(state): State<AppState>) -> Response {
    let tools = state.tool_report().await;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        whisper_model: state.engine.model_name(),
        hostname: hostname(),
        tools,
    })
    .into_response()
}

pub async fn transcribe(
    State(state): State<AppState>,
    payload: Result<Json<TranscribeRequest>, JsonRejection>,
) -> Result<Json<TranscribeResponse>, AppError> {
    let url = match payload {
        Ok(Json(body)) => required_url(body.url)?,
        Err(rejection) => {
            info!(error = %rejection.body_text(), "rejected transcribe body");
            return Err(AppError::bad_request("URL is required"));
        }
    };

    let span = tracing::info_span!("transcribe", %url);
    let transcript = acquire_and_transcribe(&state, &url).instrument(span).await?;
    Ok(Json(transcript.into()))
}

async fn acquire_and_transcribe(state: &AppState, url: &str) -> crate::Result<Transcript> {
    // Dropping the handler (client gone) cancels any running strategy
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let audio = state.chain.acquire(url, None, &cancel).await?;
    info!(
        strategy = %audio.strategy(),
        bytes = audio.size_bytes(),
        "audio acquired"
    );

    let _permit = state
        .transcriptions
        .acquire()
        .await
        .map_err(|_| crate::TranscriptionError::Unavailable("engine is shutting down".into()))?;
    let transcript = state.engine.transcribe(audio.path()).await?;
    info!(
        segments = transcript.segments.len(),
        duration = transcript.duration_seconds(),
        "transcription complete"
    );
    Ok(transcript)
}

pub async fn downloads(
    State(state): State<AppState>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let url = match query {
        Ok(Query(q)) => required_url(q.url)?,
        Err(_) => return Err(AppError::bad_request("URL is required")),
    };

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let audio = state
        .chain
        .acquire(&url, None, &cancel)
        .instrument(tracing::info_span!("download", %url))
        .await?;

    stream_artifact(audio).await
}

/// Stream the artifact; it is deleted once the body is dropped
async fn stream_artifact(audio: AcquiredAudio) -> Result<Response, AppError> {
    let file = tokio::fs::File::open(audio.path())
        .await
        .map_err(|e| AppError::internal(format!("cannot open acquired audio: {}", e)))?;

    let disposition = format!("attachment; filename=\"{}\"", audio.download_name());
    let length = audio.size_bytes();

    // The stream owns the handle so the temp file outlives the transfer
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _artifact = &audio;
        chunk
    });

    let mut response = Body::from_stream(stream).into_response();
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    Ok(response)
}

fn required_url(url: Option<String>) -> Result<String, AppError> {
    match url.map(|u| u.trim().to_string()) {
        Some(u) if !u.is_empty() => Ok(u),
        _ => Err(AppError::bad_request("URL is required")),
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}
