use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use ragbot_core::SessionId;
use serde::Serialize;

use crate::error::ClientError;
use crate::sse::SseEvent;

/// Live stream of named events for one question.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SseEvent, ClientError>> + Send>>;

/// What the streaming endpoint needs to answer one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub question: String,
    pub session_id: SessionId,
}

impl StreamRequest {
    /// Request body in the runnable-invocation shape the service expects:
    /// `{"input":{"question":..},"config":{"configurable":{"sessionId":..}}}`.
    pub fn body(&self) -> StreamRequestBody<'_> {
        StreamRequestBody {
            input: StreamInput {
                question: &self.question,
            },
            config: StreamConfig {
                configurable: Configurable {
                    session_id: self.session_id,
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StreamRequestBody<'a> {
    input: StreamInput<'a>,
    config: StreamConfig,
}

#[derive(Debug, Serialize)]
struct StreamInput<'a> {
    question: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamConfig {
    configurable: Configurable,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Configurable {
    session_id: SessionId,
}

/// Anything that can open a response stream for a question.
///
/// The dispatcher only sees this trait; [`crate::RagClient`] is the HTTP
/// implementation.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn open(&self, request: &StreamRequest) -> Result<EventStream, ClientError>;
}
