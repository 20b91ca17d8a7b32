use std::sync::Arc;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Who wrote a turn. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Agent,
}

/// One message in the conversation.
///
/// Turns are value objects: nothing outside this crate can edit one in place.
/// An agent turn "grows" by being replaced with an extended copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    author: Author,
    text: String,
    /// Document identifiers backing this turn, in first-seen order.
    /// Equality ignores order.
    #[serde(default)]
    citations: IndexSet<String>,
}

impl Turn {
    /// A user-authored turn. Its text never changes afterwards.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            author: Author::User,
            text: text.into(),
            citations: IndexSet::new(),
        }
    }

    /// An empty agent turn, opened on the first event of a response cycle.
    pub(crate) fn agent() -> Self {
        Self {
            author: Author::Agent,
            text: String::new(),
            citations: IndexSet::new(),
        }
    }

    pub fn author(&self) -> Author {
        self.author
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn citations(&self) -> &IndexSet<String> {
        &self.citations
    }

    pub fn is_user(&self) -> bool {
        self.author == Author::User
    }

    pub fn is_agent(&self) -> bool {
        self.author == Author::Agent
    }

    /// Copy of this turn with `fragment` appended to the text and
    /// `document_ids` unioned into the citations.
    pub(crate) fn extended(&self, fragment: &str, document_ids: &[String]) -> Self {
        let mut text = String::with_capacity(self.text.len() + fragment.len());
        text.push_str(&self.text);
        text.push_str(fragment);

        let mut citations = self.citations.clone();
        citations.extend(document_ids.iter().cloned());

        Self {
            author: self.author,
            text,
            citations,
        }
    }
}

/// Ordered, append-only sequence of turns.
///
/// Cloning is cheap: turns are shared behind `Arc`, and an update only swaps
/// the last pointer, so every earlier turn stays pointer-equal across
/// snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Turn>", into = "Vec<Turn>")]
pub struct Transcript {
    turns: Vec<Arc<Turn>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Turn> {
        self.turns.get(index).map(Arc::as_ref)
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last().map(Arc::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().map(Arc::as_ref)
    }

    /// The agent turn currently accepting events, if any.
    ///
    /// Only the last turn can be open, and only when the agent wrote it.
    pub fn open_agent_turn(&self) -> Option<&Turn> {
        self.last().filter(|turn| turn.is_agent())
    }

    /// Append a user turn. This closes whatever agent turn preceded it.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Arc::new(Turn::user(text)));
    }

    pub(crate) fn push_agent(&mut self) {
        self.turns.push(Arc::new(Turn::agent()));
    }

    /// Swap the last turn for `turn`. No-op on an empty transcript.
    pub(crate) fn replace_last(&mut self, turn: Turn) {
        if let Some(last) = self.turns.last_mut() {
            *last = Arc::new(turn);
        }
    }

    /// True when both transcripts hold the very same allocation at `index`.
    pub fn shares_turn(&self, other: &Transcript, index: usize) -> bool {
        match (self.turns.get(index), other.turns.get(index)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Vec<Turn>> for Transcript {
    fn from(turns: Vec<Turn>) -> Self {
        Self {
            turns: turns.into_iter().map(Arc::new).collect(),
        }
    }
}

impl From<Transcript> for Vec<Turn> {
    fn from(transcript: Transcript) -> Self {
        transcript
            .turns
            .into_iter()
            .map(|turn| Arc::try_unwrap(turn).unwrap_or_else(|shared| (*shared).clone()))
            .collect()
    }
}
