use thiserror::Error;

/// Failures talking to the RAG service.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("ingestion failed: {error}: {details}")]
    Ingest { error: String, details: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal signal of a response cycle.
///
/// Whatever the transcript received before the failure stays applied.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to open stream: {0}")]
    Connect(#[source] ClientError),

    #[error("stream interrupted: {0}")]
    Transport(#[source] ClientError),

    #[error("server reported an error: {0}")]
    Server(String),
}
