//! Chat session management
//!
//! This module provides the `SessionController` abstraction that manages:
//! - The conversation log (typed and voice turns)
//! - Transport mode selection (push channel vs HTTP fallback)
//! - The voice-capture lifecycle
//! - Durable history persistence and capped restore
//! - User notices and session statistics

mod config;
mod controller;
mod message;
mod stats;
mod turn;

pub use config::{new_session_id, SessionConfig};
pub use controller::{SessionController, SessionEvent, SessionOutput};
pub use message::{Message, MessageSource, Role};
pub use stats::SessionStats;
pub use turn::{Correlation, Turn, TurnLedger, TurnState};
