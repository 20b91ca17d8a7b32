//! One question/answer cycle: append the user's turn, open the answer stream,
//! and fold every event into the transcript as it arrives.

use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use ragbot_core::{apply_all, decode, SessionId, Transcript};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::error::DispatchError;
use crate::source::{EventSource, EventStream, StreamRequest};

/// Transcript snapshots of one cycle, one per applied event.
///
/// An `Err` is always the final item. The stream holds the transcript's
/// mutable borrow until it is dropped.
pub type TurnStream<'a> =
    Pin<Box<dyn Stream<Item = Result<Transcript, DispatchError>> + Send + 'a>>;

/// Runs response cycles against an [`EventSource`].
#[derive(Clone)]
pub struct TurnDispatcher {
    source: Arc<dyn EventSource>,
}

impl TurnDispatcher {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self { source }
    }

    /// Send `question` within `session` and stream the growing transcript.
    ///
    /// Returns `None`, without touching the transcript, when the question is
    /// empty after trimming. Otherwise the trimmed question is appended as a
    /// user turn before this returns, and nothing is sent until the stream is
    /// first polled.
    ///
    /// Cancelling `cancel` ends the stream at the next event boundary; turns
    /// already applied stay in the transcript.
    pub fn send_turn<'a>(
        &self,
        transcript: &'a mut Transcript,
        session: &SessionId,
        question: &str,
        cancel: CancellationToken,
    ) -> Option<TurnStream<'a>> {
        let question = question.trim();
        if question.is_empty() {
            debug!("empty question, nothing sent");
            return None;
        }

        transcript.push_user(question);

        let cycle = Cycle {
            transcript,
            source: Arc::clone(&self.source),
            request: StreamRequest {
                question: question.to_string(),
                session_id: *session,
            },
            cancel,
            events: None,
            finished: false,
        };
        Some(Box::pin(stream::unfold(cycle, Cycle::step)))
    }
}

struct Cycle<'a> {
    transcript: &'a mut Transcript,
    source: Arc<dyn EventSource>,
    request: StreamRequest,
    cancel: CancellationToken,
    events: Option<EventStream>,
    finished: bool,
}

impl<'a> Cycle<'a> {
    async fn step(mut self) -> Option<(Result<Transcript, DispatchError>, Self)> {
        if self.finished {
            return None;
        }

        if self.events.is_none() {
            let opened = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                opened = self.source.open(&self.request) => Some(opened),
            };
            match opened {
                None => {
                    debug!(session = %self.request.session_id, "cancelled before stream opened");
                    return None;
                }
                Some(Ok(events)) => self.events = Some(events),
                Some(Err(e)) => {
                    error!(session = %self.request.session_id, error = %e, "failed to open stream");
                    return self.fail(DispatchError::Connect(e));
                }
            }
        }

        loop {
            let events = self.events.as_mut()?;
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                item = events.next() => Some(item),
            };

            let event = match next {
                None => {
                    debug!(session = %self.request.session_id, "cycle cancelled");
                    return None;
                }
                Some(None) => {
                    debug!(session = %self.request.session_id, "stream closed");
                    return None;
                }
                Some(Some(Err(e))) => {
                    error!(session = %self.request.session_id, error = %e, "stream interrupted");
                    return self.fail(DispatchError::Transport(e));
                }
                Some(Some(Ok(event))) => event,
            };

            match event.event.as_str() {
                "data" => match decode(&event.data) {
                    Ok(decoded) if decoded.is_empty() => {
                        trace!("data event without answer or docs");
                    }
                    Ok(decoded) => {
                        let next = apply_all(self.transcript, &decoded);
                        *self.transcript = next.clone();
                        return Some((Ok(next), self));
                    }
                    Err(e) => {
                        warn!(error = %e, data = %event.data, "dropping undecodable event");
                    }
                },
                "metadata" => {
                    debug!(data = %event.data, "stream metadata");
                }
                "end" => {
                    debug!(session = %self.request.session_id, "stream finished");
                    return None;
                }
                "error" => {
                    let message = server_error_message(&event.data);
                    error!(
                        session = %self.request.session_id,
                        reason = %message,
                        "server error event"
                    );
                    return self.fail(DispatchError::Server(message));
                }
                other => {
                    trace!(event = other, "ignoring event");
                }
            }
        }
    }

    fn fail(mut self, error: DispatchError) -> Option<(Result<Transcript, DispatchError>, Self)> {
        self.finished = true;
        self.events = None;
        Some((Err(error), self))
    }
}

/// Pull a readable message out of an `error` event payload, which is usually
/// `{"status_code": 500, "message": "..."}`.
fn server_error_message(data: &str) -> String {
    serde_json::from_str::<Value>(data)
        .ok()
        .and_then(|v| v["message"].as_str().map(String::from))
        .unwrap_or_else(|| data.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::source::mock::MockEventSource;
    use crate::sse::SseEvent;
    use ragbot_core::Author;

    fn setup() -> (TurnDispatcher, Arc<MockEventSource>) {
        let source = Arc::new(MockEventSource::new());
        let dispatcher = TurnDispatcher::new(source.clone() as Arc<dyn EventSource>);
        (dispatcher, source)
    }

    async fn drain(stream: TurnStream<'_>) -> Vec<Result<Transcript, DispatchError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_answer_streams_into_agent_turn() {
        let (dispatcher, source) = setup();
        source.queue_data(&[
            r#"{"answer":{"content":"Par"}}"#,
            r#"{"answer":{"content":"is"}}"#,
            r#"{"docs":[{"metadata":{"source":"pdf-documents/france.pdf"}}]}"#,
        ]);

        let session = SessionId::new();
        let mut transcript = Transcript::new();
        let stream = dispatcher
            .send_turn(
                &mut transcript,
                &session,
                "  Capital of France?  ",
                CancellationToken::new(),
            )
            .unwrap();
        let updates = drain(stream).await;

        assert_eq!(updates.len(), 3);
        let texts: Vec<String> = updates
            .iter()
            .map(|u| u.as_ref().unwrap().last().unwrap().text().to_string())
            .collect();
        assert_eq!(texts, vec!["Par", "Paris", "Paris"]);

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.get(0).unwrap().text(), "Capital of France?");
        let answer = transcript.get(1).unwrap();
        assert_eq!(answer.author(), Author::Agent);
        assert!(answer.citations().contains("pdf-documents/france.pdf"));

        let requests = source.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].question, "Capital of France?");
        assert_eq!(requests[0].session_id, session);
    }

    #[tokio::test]
    async fn test_empty_question_is_noop() {
        let (dispatcher, source) = setup();
        let mut transcript = Transcript::new();

        let sent = dispatcher
            .send_turn(
                &mut transcript,
                &SessionId::new(),
                " \n\t ",
                CancellationToken::new(),
            )
            .is_some();

        assert!(!sent);
        assert!(transcript.is_empty());
        assert!(source.requests().is_empty());
    }

    #[tokio::test]
    async fn test_second_cycle_opens_new_agent_turn() {
        let (dispatcher, source) = setup();
        source.queue_data(&[r#"{"answer":{"content":"Paris"}}"#]);
        source.queue_data(&[r#"{"answer":{"content":"You're welcome"}}"#]);

        let session = SessionId::new();
        let mut transcript = Transcript::new();
        let s = dispatcher
            .send_turn(&mut transcript, &session, "Capital?", CancellationToken::new())
            .unwrap();
        drain(s).await;
        let after_first = transcript.clone();

        let s = dispatcher
            .send_turn(&mut transcript, &session, "Thanks", CancellationToken::new())
            .unwrap();
        drain(s).await;

        let authors: Vec<Author> = transcript.iter().map(|t| t.author()).collect();
        assert_eq!(
            authors,
            vec![Author::User, Author::Agent, Author::User, Author::Agent]
        );
        assert_eq!(transcript.get(1).unwrap().text(), "Paris");
        assert_eq!(transcript.get(3).unwrap().text(), "You're welcome");
        assert!(transcript.shares_turn(&after_first, 1));

        let requests = source.requests();
        assert_eq!(requests[0].session_id, requests[1].session_id);
    }

    #[tokio::test]
    async fn test_malformed_event_is_skipped() {
        let (dispatcher, source) = setup();
        source.queue_data(&[
            r#"{"answer":{"content":"a"}}"#,
            "{broken",
            r#"{"answer":{"content":"b"}}"#,
        ]);

        let mut transcript = Transcript::new();
        let s = dispatcher
            .send_turn(&mut transcript, &SessionId::new(), "q", CancellationToken::new())
            .unwrap();
        let updates = drain(s).await;

        assert_eq!(updates.len(), 2);
        assert!(updates.iter().all(|u| u.is_ok()));
        assert_eq!(transcript.last().unwrap().text(), "ab");
    }

    #[tokio::test]
    async fn test_non_data_events_are_not_applied() {
        let (dispatcher, source) = setup();
        source.queue_events(vec![
            SseEvent::new("metadata", r#"{"run_id":"abc"}"#),
            SseEvent::new("data", r#"{"answer":{"content":"x"}}"#),
            SseEvent::new("message", r#"{"answer":{"content":"ignored"}}"#),
            SseEvent::new("data", "{}"),
            SseEvent::new("end", ""),
            SseEvent::new("data", r#"{"answer":{"content":"after end"}}"#),
        ]);

        let mut transcript = Transcript::new();
        let s = dispatcher
            .send_turn(&mut transcript, &SessionId::new(), "q", CancellationToken::new())
            .unwrap();
        let updates = drain(s).await;

        assert_eq!(updates.len(), 1);
        assert_eq!(transcript.last().unwrap().text(), "x");
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_partial_answer() {
        let (dispatcher, source) = setup();
        source.queue_broken(
            vec![SseEvent::new("data", r#"{"answer":{"content":"partial"}}"#)],
            ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )),
        );

        let mut transcript = Transcript::new();
        let s = dispatcher
            .send_turn(&mut transcript, &SessionId::new(), "q", CancellationToken::new())
            .unwrap();
        let updates = drain(s).await;

        assert_eq!(updates.len(), 2);
        assert!(updates[0].is_ok());
        assert!(matches!(updates[1], Err(DispatchError::Transport(_))));
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.last().unwrap().text(), "partial");
    }

    #[tokio::test]
    async fn test_open_failure_is_terminal_and_keeps_user_turn() {
        let (dispatcher, source) = setup();
        source.queue_open_failure(ClientError::Api {
            status: 503,
            body: "unavailable".to_string(),
        });

        let mut transcript = Transcript::new();
        let s = dispatcher
            .send_turn(&mut transcript, &SessionId::new(), "q", CancellationToken::new())
            .unwrap();
        let updates = drain(s).await;

        assert_eq!(updates.len(), 1);
        assert!(matches!(updates[0], Err(DispatchError::Connect(_))));
        assert_eq!(transcript.len(), 1);
        assert!(transcript.last().unwrap().is_user());
    }

    #[tokio::test]
    async fn test_server_error_event() {
        let (dispatcher, source) = setup();
        source.queue_events(vec![
            SseEvent::new("data", r#"{"answer":{"content":"so far"}}"#),
            SseEvent::new("error", r#"{"status_code":500,"message":"Internal Server Error"}"#),
        ]);

        let mut transcript = Transcript::new();
        let s = dispatcher
            .send_turn(&mut transcript, &SessionId::new(), "q", CancellationToken::new())
            .unwrap();
        let updates = drain(s).await;

        match &updates[1] {
            Err(DispatchError::Server(message)) => assert_eq!(message, "Internal Server Error"),
            other => panic!("unexpected update: {other:?}"),
        }
        assert_eq!(transcript.last().unwrap().text(), "so far");
    }

    #[tokio::test]
    async fn test_cancel_stops_application_and_keeps_state() {
        let (dispatcher, source) = setup();
        source.queue_stalled(vec![SseEvent::new(
            "data",
            r#"{"answer":{"content":"half an ans"}}"#,
        )]);

        let cancel = CancellationToken::new();
        let mut transcript = Transcript::new();
        let mut s = dispatcher
            .send_turn(&mut transcript, &SessionId::new(), "q", cancel.clone())
            .unwrap();

        let first = s.next().await.unwrap().unwrap();
        assert_eq!(first.last().unwrap().text(), "half an ans");

        cancel.cancel();
        assert!(s.next().await.is_none());
        drop(s);

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.last().unwrap().text(), "half an ans");
    }

    #[tokio::test]
    async fn test_cancel_before_open_sends_nothing() {
        let (dispatcher, source) = setup();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut transcript = Transcript::new();
        let s = dispatcher
            .send_turn(&mut transcript, &SessionId::new(), "q", cancel)
            .unwrap();
        let updates = drain(s).await;

        assert!(updates.is_empty());
        assert!(source.requests().is_empty());
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn test_server_error_message_fallback() {
        assert_eq!(server_error_message("plain text"), "plain text");
        assert_eq!(server_error_message(r#"{"message":"boom"}"#), "boom");
    }
}
