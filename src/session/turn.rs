//! Turn ledger: one entry per user action, replies attach by correlation.
//!
//! The rendered conversation is the ledger flattened in sequence order, so a
//! reply that arrives late or out of order fills its own turn's slot instead
//! of appending at the tail.

use serde::Serialize;

use super::message::{Message, MessageSource};

/// Correlation attached to every outgoing request and echoed (optionally)
/// in its reply: the active session id plus a per-session monotonic
/// sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Correlation {
    pub session_id: String,
    pub seq: u64,
}

impl Correlation {
    pub fn new(session_id: impl Into<String>, seq: u64) -> Self {
        Self {
            session_id: session_id.into(),
            seq,
        }
    }
}

/// Lifecycle of one user-initiated exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Dispatched, awaiting the backend reply.
    InFlight,
    /// Reply attached; the exchange is part of confirmed history.
    Completed,
    /// Dispatch or reply failed; never persisted.
    Failed,
}

/// One user action and the reply attached to it.
#[derive(Debug, Clone)]
pub struct Turn {
    pub seq: u64,
    pub source: MessageSource,
    /// The user's message. Empty until transcription for voice turns.
    pub user: Option<Message>,
    pub assistant: Option<Message>,
    pub state: TurnState,
}

/// Ordered collection of this session's turns.
#[derive(Debug, Default)]
pub struct TurnLedger {
    turns: Vec<Turn>,
}

impl TurnLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a turn for a typed message that is about to be dispatched.
    pub fn open_typed(&mut self, seq: u64, user: Message) {
        self.turns.push(Turn {
            seq,
            source: MessageSource::Typed,
            user: Some(user),
            assistant: None,
            state: TurnState::InFlight,
        });
    }

    /// Opens a turn for a submitted voice clip. The user slot stays empty
    /// until the backend returns the transcription.
    pub fn open_voice(&mut self, seq: u64) {
        self.turns.push(Turn {
            seq,
            source: MessageSource::Voice,
            user: None,
            assistant: None,
            state: TurnState::InFlight,
        });
    }

    /// Attaches a reply to its turn. Returns `false` when the turn is
    /// unknown or already resolved, which is how duplicate deliveries for
    /// one correlation are dropped.
    pub fn resolve(&mut self, seq: u64, user: Option<Message>, assistant: Message) -> bool {
        match self.get_mut(seq) {
            Some(turn) if turn.state == TurnState::InFlight => {
                if user.is_some() {
                    turn.user = user;
                }
                turn.assistant = Some(assistant);
                turn.state = TurnState::Completed;
                true
            }
            _ => false,
        }
    }

    /// Marks a turn failed. Returns `false` when the turn is unknown or
    /// already resolved.
    pub fn fail(&mut self, seq: u64) -> bool {
        match self.get_mut(seq) {
            Some(turn) if turn.state == TurnState::InFlight => {
                turn.state = TurnState::Failed;
                true
            }
            _ => false,
        }
    }

    /// Oldest turn still awaiting its reply. Fallback target for replies
    /// that do not echo a correlation.
    pub fn oldest_in_flight(&self) -> Option<u64> {
        self.turns
            .iter()
            .find(|t| t.state == TurnState::InFlight)
            .map(|t| t.seq)
    }

    pub fn in_flight(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| t.state == TurnState::InFlight)
            .count()
    }

    /// Input modality of a turn, if the turn exists.
    pub fn source_of(&self, seq: u64) -> Option<MessageSource> {
        self.turns.iter().find(|t| t.seq == seq).map(|t| t.source)
    }

    /// Messages in user-action order, for rendering. Failed turns keep
    /// their user message visible; missing slots are skipped.
    pub fn view(&self) -> impl Iterator<Item = &Message> {
        self.turns
            .iter()
            .flat_map(|t| t.user.iter().chain(t.assistant.iter()))
    }

    /// Messages of completed turns only, in order. This is the portion of
    /// the ledger that participates in persistence.
    pub fn confirmed(&self) -> impl Iterator<Item = &Message> {
        self.turns
            .iter()
            .filter(|t| t.state == TurnState::Completed)
            .flat_map(|t| t.user.iter().chain(t.assistant.iter()))
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn get_mut(&mut self, seq: u64) -> Option<&mut Turn> {
        self.turns.iter_mut().find(|t| t.seq == seq)
    }
}
