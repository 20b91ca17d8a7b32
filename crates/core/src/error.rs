use thiserror::Error;

/// Failure to turn a `data` event payload into [`crate::DecodedEvent`]s.
///
/// Always local to one event: the caller drops the event and keeps streaming.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected payload shape: {0}")]
    UnexpectedShape(String),
}
