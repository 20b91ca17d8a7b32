pub mod client;
pub mod dispatch;
pub mod error;
pub mod source;
pub mod sse;

pub use client::{IngestReport, RagClient, UploadReport};
pub use dispatch::{TurnDispatcher, TurnStream};
pub use error::{ClientError, DispatchError};
pub use source::{EventSource, EventStream, StreamRequest};
pub use sse::{SseEvent, SseParser};
pub use tokio_util::sync::CancellationToken;
