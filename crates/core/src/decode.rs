//! Decoding of `data` event payloads from the RAG stream.
//!
//! A payload is a JSON object with two optional parts:
//!
//! ```text
//! {"answer": {"content": "Par"}}
//! {"docs": [{"metadata": {"source": "pdf-documents/france.pdf"}}]}
//! ```
//!
//! Either or both may appear in one payload.

use serde_json::Value;
use tracing::{trace, warn};

use crate::error::DecodeError;

/// One unit of work for the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    /// A piece of generated answer text.
    AnswerFragment { text: String },
    /// Document references retrieved for the current answer.
    CitationBatch { document_ids: Vec<String> },
}

impl DecodedEvent {
    pub fn fragment(text: impl Into<String>) -> Self {
        Self::AnswerFragment { text: text.into() }
    }

    pub fn citations<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::CitationBatch {
            document_ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

/// Decode one payload into zero, one or two events.
///
/// When both parts are present the answer fragment comes first. A payload
/// with neither part decodes to nothing.
pub fn decode(raw: &str) -> Result<Vec<DecodedEvent>, DecodeError> {
    let payload: Value = serde_json::from_str(raw)?;
    let object = payload.as_object().ok_or_else(|| {
        DecodeError::UnexpectedShape(format!("expected object, got {}", kind(&payload)))
    })?;

    let mut events = Vec::with_capacity(2);

    match object.get("answer") {
        None | Some(Value::Null) => {}
        Some(Value::String(text)) => events.push(DecodedEvent::fragment(text.as_str())),
        Some(answer) => match answer.get("content") {
            Some(Value::String(text)) => events.push(DecodedEvent::fragment(text.as_str())),
            _ => trace!("answer without string content, no fragment"),
        },
    }

    match object.get("docs") {
        None | Some(Value::Null) => {}
        Some(Value::Array(docs)) => {
            let document_ids = docs
                .iter()
                .enumerate()
                .filter_map(|(index, doc)| match doc["metadata"]["source"].as_str() {
                    Some(source) => Some(source.to_string()),
                    None => {
                        warn!(index, "document without metadata.source, skipping");
                        None
                    }
                })
                .collect();
            events.push(DecodedEvent::CitationBatch { document_ids });
        }
        Some(other) => warn!(kind = kind(other), "docs is not an array, ignoring"),
    }

    Ok(events)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
