//! Server-sent events framing over a response byte stream.
//!
//! ```text
//! event: metadata
//! data: {"run_id": "..."}
//!
//! event: data
//! data: {"answer": {"content": "Par"}}
//!
//! event: end
//!
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::trace;

use crate::error::ClientError;

/// One dispatched SSE message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; `message` when the server sent none.
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
}

impl SseEvent {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// Fields collected since the last blank line.
#[derive(Default)]
struct PendingEvent {
    event: Option<String>,
    data: Vec<String>,
}

impl PendingEvent {
    fn take(&mut self) -> Option<SseEvent> {
        if self.event.is_none() && self.data.is_empty() {
            return None;
        }
        let pending = std::mem::take(self);
        Some(SseEvent {
            event: pending.event.unwrap_or_else(|| "message".to_string()),
            data: pending.data.join("\n"),
        })
    }

    /// Feed one line (without its terminator). Returns an event when the
    /// line was the blank line closing it.
    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.take();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" | "retry" => {}
            other => trace!(field = other, "ignoring unknown SSE field"),
        }
        None
    }
}

/// Parses a byte stream into [`SseEvent`]s.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks decode intact. When the byte
/// stream ends, a trailing event without its final blank line is still
/// dispatched.
pub struct SseParser<S> {
    inner: S,
    buffer: Vec<u8>,
    pending: PendingEvent,
    finished: bool,
}

impl<S> SseParser<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            pending: PendingEvent::default(),
            finished: false,
        }
    }

    /// Try to extract one event from the complete lines in the buffer.
    fn next_buffered(&mut self) -> Option<SseEvent> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(event) = self.pending.feed_line(&String::from_utf8_lossy(&line)) {
                return Some(event);
            }
        }
        None
    }

    /// Drain whatever is left once the byte stream has ended.
    fn flush(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            if let Some(event) = self.pending.feed_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.pending.take()
    }
}

impl<S, E> Stream for SseParser<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<ClientError>,
{
    type Item = Result<SseEvent, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.next_buffered() {
                return Poll::Ready(Some(Ok(event)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match this.inner.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.extend_from_slice(&bytes);
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    return Poll::Ready(this.flush().map(Ok));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        let owned: Vec<Result<Bytes, std::io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect();
        stream::iter(owned)
    }

    async fn parse_all(parts: &[&[u8]]) -> Vec<SseEvent> {
        SseParser::new(chunks(parts))
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_named_events() {
        let events = parse_all(&[
            b"event: metadata\ndata: {\"run_id\":\"r1\"}\n\n",
            b"event: data\ndata: {\"answer\":{\"content\":\"Par\"}}\n\n",
            b"event: end\n\n",
        ])
        .await;

        assert_eq!(
            events,
            vec![
                SseEvent::new("metadata", r#"{"run_id":"r1"}"#),
                SseEvent::new("data", r#"{"answer":{"content":"Par"}}"#),
                SseEvent::new("end", ""),
            ]
        );
    }

    #[tokio::test]
    async fn test_event_split_across_chunks() {
        let events = parse_all(&[b"event: da", b"ta\ndata: {\"a\"", b":1}\r\n", b"\r\n"]).await;
        assert_eq!(events, vec![SseEvent::new("data", r#"{"a":1}"#)]);
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_chunks() {
        let text = "data: caf\u{e9}\n\n".as_bytes();
        // split inside the two-byte encoding of 'é'
        let split = text.len() - 3;
        let events = parse_all(&[&text[..split], &text[split..]]).await;
        assert_eq!(events, vec![SseEvent::new("message", "caf\u{e9}")]);
    }

    #[tokio::test]
    async fn test_multiline_data_and_comments() {
        let events = parse_all(&[b": keep-alive\nid: 7\ndata: one\ndata:two\nretry: 10\n\n"]).await;
        assert_eq!(events, vec![SseEvent::new("message", "one\ntwo")]);
    }

    #[tokio::test]
    async fn test_trailing_event_without_blank_line() {
        let events = parse_all(&[b"event: data\ndata: {}"]).await;
        assert_eq!(events, vec![SseEvent::new("data", "{}")]);
    }

    #[tokio::test]
    async fn test_stray_blank_lines_dispatch_nothing() {
        let events = parse_all(&[b"\n\n\r\n"]).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let parts: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: first\n\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"data: never\n\n")),
        ];
        let results: Vec<_> = SseParser::new(stream::iter(parts)).collect().await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().data, "first");
        assert!(matches!(results[1], Err(ClientError::Io(_))));
    }
}
