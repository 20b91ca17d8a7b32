//! The response aggregator: folds decoded stream events into the transcript.

use crate::decode::DecodedEvent;
use crate::transcript::Transcript;

/// Apply one event, returning the next transcript.
///
/// If no agent turn is open (empty transcript, or the last turn is the
/// user's), a fresh agent turn is opened first. The event is then merged into
/// that turn: fragment text is appended, document ids are unioned into the
/// citations. Every turn before the last is shared with `transcript`.
pub fn apply(transcript: &Transcript, event: &DecodedEvent) -> Transcript {
    let mut next = transcript.clone();
    apply_in_place(&mut next, event);
    next
}

/// Apply `events` in order.
pub fn apply_all(transcript: &Transcript, events: &[DecodedEvent]) -> Transcript {
    let mut next = transcript.clone();
    for event in events {
        apply_in_place(&mut next, event);
    }
    next
}

fn apply_in_place(transcript: &mut Transcript, event: &DecodedEvent) {
    match event {
        DecodedEvent::AnswerFragment { text } => merge(transcript, text, &[]),
        DecodedEvent::CitationBatch { document_ids } => merge(transcript, "", document_ids),
    }
}

fn merge(transcript: &mut Transcript, fragment: &str, document_ids: &[String]) {
    if transcript.open_agent_turn().is_none() {
        transcript.push_agent();
    }

    let updated = match transcript.open_agent_turn() {
        Some(open) => open.extended(fragment, document_ids),
        None => return,
    };
    transcript.replace_last(updated);
}
