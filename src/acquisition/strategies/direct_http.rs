// Direct HTTP fallback
//
// Last resort and low confidence: one GET against the metadata endpoint with
// the body written straight to disk. The endpoint answers with metadata (or
// an error page), not audio, so only the size check stands between this and
// garbage. Kept because it occasionally rescues a request when every
// extractor is broken.

use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{AcquisitionOutcome, AcquisitionStrategy};
use crate::acquisition::errors::StrategyFailure;
use crate::acquisition::models::{AcquisitionRequest, StrategyKind};
use crate::acquisition::settings::ExtractorSettings;
use crate::acquisition::transport::TransportError;

pub struct DirectHttpFallback {
    client: reqwest::Client,
    settings: ExtractorSettings,
}

impl DirectHttpFallback {
    pub fn new(settings: ExtractorSettings) -> Result<Self, TransportError> {
        let client = settings.transport.http_client()?;
        Ok(Self { client, settings })
    }

    /// Use a prebuilt client (shared connection pool)
    pub fn with_client(settings: ExtractorSettings, client: reqwest::Client) -> Self {
        Self { client, settings }
    }

    async fn fetch(&self, url: &str, target: &Path) -> AcquisitionOutcome {
        let kind = self.kind();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StrategyFailure::transport(kind, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StrategyFailure::transport(
                kind,
                format!("endpoint returned {}", status),
            ));
        }

        let mut file = tokio::fs::File::create(target).await.map_err(|e| {
            StrategyFailure::external_process(kind, format!("cannot create output file: {}", e))
        })?;

        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|e| StrategyFailure::transport(kind, format!("body read failed: {}", e)))?;
            file.write_all(&chunk).await.map_err(|e| {
                StrategyFailure::external_process(kind, format!("cannot write output file: {}", e))
            })?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| {
            StrategyFailure::external_process(kind, format!("cannot write output file: {}", e))
        })?;

        debug!(bytes = written, "response body saved");
        Ok(target.to_path_buf())
    }
}

#[async_trait]
impl AcquisitionStrategy for DirectHttpFallback {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectHttp
    }

    async fn check_precondition(&self, request: &AcquisitionRequest) -> Result<(), String> {
        match request.video_id {
            Some(_) => Ok(()),
            None => Err("no video id could be derived from the url".to_string()),
        }
    }

    async fn attempt(
        &self,
        request: &AcquisitionRequest,
        cancel: &CancellationToken,
    ) -> AcquisitionOutcome {
        let kind = self.kind();
        let video_id = request.video_id.as_deref().ok_or_else(|| {
            StrategyFailure::precondition(kind, "no video id could be derived from the url")
        })?;

        let url = self.settings.metadata_url(video_id);
        let target = request.audio_target(&self.settings.audio_format);
        info!(endpoint = %url, "trying direct HTTP fallback");

        tokio::select! {
            outcome = self.fetch(&url, &target) => outcome,
            _ = cancel.cancelled() => Err(StrategyFailure::transport(kind, "request cancelled")),
        }
    }
}
