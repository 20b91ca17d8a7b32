//! HTTP client for the RAG service.
//!
//! Covers the streaming question endpoint plus the two document-management
//! calls the chat front-end offers: uploading PDFs and triggering their
//! ingestion into the vector store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use ragbot_core::citation::format_source;
use ragbot_core::Config;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, error, info};
use url::Url;

use crate::error::ClientError;
use crate::source::{EventSource, EventStream, StreamRequest};
use crate::sse::SseParser;

const STREAM_PATH: &str = "rag/stream";
const UPLOAD_PATH: &str = "upload";
const INGEST_PATH: &str = "load-and-process-pdfs";
const STATIC_PATH: &str = "rag/static/";

/// Reply to a successful upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadReport {
    pub message: String,
    #[serde(default)]
    pub filenames: Vec<String>,
}

/// Reply to a successful ingestion run. `output` is the loader's stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestReport {
    pub message: String,
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Deserialize)]
struct IngestFailure {
    error: String,
    #[serde(default)]
    details: String,
}

/// Client for the RAG service REST + SSE API.
///
/// Answer streams stay open as long as the service keeps sending; only a
/// silence longer than the read timeout cuts them. Upload and ingestion
/// calls are bounded as a whole by the request timeout.
#[derive(Debug, Clone)]
pub struct RagClient {
    base_url: Url,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl RagClient {
    /// Create a client with default timeouts.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_config(base_url, &Config::default())
    }

    /// Create a client using the timeouts from `config`.
    pub fn with_config(base_url: &str, config: &Config) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .build()?;
        Ok(Self {
            base_url: normalize_base(base_url)?,
            http,
            request_timeout: config.request_timeout(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    /// Check if the server is reachable.
    pub async fn health_check(&self) -> Result<(), ClientError> {
        self.http
            .get(self.base_url.clone())
            .timeout(Duration::from_secs(3))
            .send()
            .await?;
        Ok(())
    }

    /// Link under which the service serves a cited document.
    pub fn document_url(&self, source: &str) -> Result<Url, ClientError> {
        let name = format_source(source);
        if name.is_empty() {
            return Err(ClientError::InvalidInput(format!(
                "source '{}' has no file name",
                source
            )));
        }
        let mut url = self.endpoint(STATIC_PATH)?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidInput("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(name);
        Ok(url)
    }

    /// Upload PDF files, one multipart `files` part per file.
    pub async fn upload_files(&self, paths: &[PathBuf]) -> Result<UploadReport, ClientError> {
        if paths.is_empty() {
            return Err(ClientError::InvalidInput("no files selected".to_string()));
        }

        let mut form = Form::new();
        for path in paths {
            form = form.part("files", file_part(path).await?);
        }

        let url = self.endpoint(UPLOAD_PATH)?;
        debug!(%url, count = paths.len(), "uploading files");
        let resp = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            error!(status, body, "upload failed");
            return Err(ClientError::Api { status, body });
        }

        let report: UploadReport = resp
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        info!(files = ?report.filenames, "upload complete");
        Ok(report)
    }

    /// Ask the service to (re)load and embed every uploaded PDF.
    pub async fn load_and_process_pdfs(&self) -> Result<IngestReport, ClientError> {
        let url = self.endpoint(INGEST_PATH)?;
        debug!(%url, "triggering ingestion");
        let resp = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        parse_ingest_reply(status.as_u16(), status.is_success(), &body)
    }
}

#[async_trait]
impl EventSource for RagClient {
    async fn open(&self, request: &StreamRequest) -> Result<EventStream, ClientError> {
        let url = self.endpoint(STREAM_PATH)?;
        debug!(%url, session = %request.session_id, "opening answer stream");

        let resp = self
            .http
            .post(url)
            .header(ACCEPT, "text/event-stream")
            .json(&request.body())
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            error!(status, body, "stream request rejected");
            return Err(ClientError::Api { status, body });
        }

        Ok(Box::pin(SseParser::new(Box::pin(resp.bytes_stream()))))
    }
}

/// Parse a base URL and make sure its path ends in `/`, so relative joins
/// append to it instead of replacing its last segment.
fn normalize_base(base_url: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(base_url.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn file_part(path: &Path) -> Result<Part, ClientError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ClientError::InvalidInput(format!("not a file: {}", path.display())))?
        .to_string();
    let data = tokio::fs::read(path).await?;
    Ok(Part::bytes(data)
        .file_name(file_name)
        .mime_str("application/pdf")?)
}

fn parse_ingest_reply(status: u16, success: bool, body: &str) -> Result<IngestReport, ClientError> {
    if success {
        return serde_json::from_str(body).map_err(|e| ClientError::Parse(e.to_string()));
    }
    match serde_json::from_str::<IngestFailure>(body) {
        Ok(failure) => {
            error!(status, error = %failure.error, "ingestion failed");
            Err(ClientError::Ingest {
                error: failure.error,
                details: failure.details,
            })
        }
        Err(_) => Err(ClientError::Api {
            status,
            body: body.to_string(),
        }),
    }
}
