//! User-facing notifications.
//!
//! Failures surface as dismissible notices that expire on their own. The
//! board never grows past a small bound and sweeping happens on read, so a
//! stale notice can outlive its TTL in memory but is never shown again.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::ChatError;

/// Most notices kept on the board at once. Oldest are dropped first.
const BOARD_CAPACITY: usize = 8;

/// Category of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    MicrophoneDenied,
    Network,
    Backend,
    Storage,
}

/// A dismissible, auto-expiring notification.
#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    pub raised_at: DateTime<Utc>,
}

impl Notice {
    pub fn new(kind: NoticeKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            raised_at: Utc::now(),
        }
    }

    /// Plain-language rendering of a client error.
    pub fn from_error(err: &ChatError) -> Self {
        let (kind, text) = match err {
            ChatError::PermissionDenied(_) => (
                NoticeKind::MicrophoneDenied,
                "Microphone access was denied. Check your input device settings.",
            ),
            ChatError::Network(_) => (
                NoticeKind::Network,
                "Connection problem. Your message was not delivered, please try again.",
            ),
            ChatError::Backend(_) => (
                NoticeKind::Backend,
                "The assistant ran into a problem answering. Please try again.",
            ),
            ChatError::Serialization(_) => (
                NoticeKind::Storage,
                "Your conversation could not be saved on this device.",
            ),
        };
        Self::new(kind, text)
    }

    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.raised_at)
            .to_std()
            .map(|age| age >= ttl)
            .unwrap_or(false)
    }
}

/// Bounded queue of active notices.
#[derive(Debug)]
pub struct NoticeBoard {
    notices: VecDeque<Notice>,
    ttl: Duration,
}

impl NoticeBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            notices: VecDeque::new(),
            ttl,
        }
    }

    pub fn post(&mut self, notice: Notice) {
        if self.notices.len() == BOARD_CAPACITY {
            self.notices.pop_front();
        }
        self.notices.push_back(notice);
    }

    pub fn post_error(&mut self, err: &ChatError) {
        self.post(Notice::from_error(err));
    }

    /// Currently visible notices, oldest first. Expired entries are swept
    /// before returning.
    pub fn active(&mut self) -> Vec<Notice> {
        self.sweep(Utc::now());
        self.notices.iter().cloned().collect()
    }

    /// Clears the board.
    pub fn dismiss_all(&mut self) {
        self.notices.clear();
    }

    fn sweep(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.notices.retain(|n| !n.is_expired(now, ttl));
    }
}
