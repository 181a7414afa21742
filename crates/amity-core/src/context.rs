//! Bounded, idle-expiring conversation-history cache.
//!
//! Holds the most recent N messages per conversation so prompt construction
//! avoids a full persistence read on every turn. Strictly a cache: an
//! expired or absent window reads as empty, never as an error, and the
//! pipeline falls back to the persisted history. Losing this state is
//! always safe -- it is never the sole copy of a message.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use amity_types::message::Message;

use crate::clock::{Clock, SystemClock};

/// Most recent messages kept per conversation.
pub const DEFAULT_WINDOW_SIZE: usize = 20;

/// Idle time after which a window is discarded.
pub const DEFAULT_IDLE_EXPIRY: Duration = Duration::from_secs(30 * 60);

/// One conversation's cached tail.
struct ConversationWindow {
    messages: VecDeque<Message>,
    last_touched: Instant,
}

/// Keyed cache of per-conversation message windows.
///
/// Constructed once by the composition root and injected, so multiple
/// instances (e.g. under test) never share windows.
pub struct ContextManager {
    windows: DashMap<Uuid, ConversationWindow>,
    capacity: usize,
    idle_expiry: Duration,
    clock: Arc<dyn Clock>,
}

impl ContextManager {
    pub fn new(capacity: usize, idle_expiry: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            capacity,
            idle_expiry,
            clock,
        }
    }

    /// Append a message to a conversation's window, evicting the oldest
    /// entry once the window is full. An expired window is replaced, not
    /// appended to.
    pub fn append(&self, conversation_id: Uuid, message: Message) {
        let now = self.clock.now();
        let mut entry = self
            .windows
            .entry(conversation_id)
            .or_insert_with(|| ConversationWindow {
                messages: VecDeque::with_capacity(self.capacity),
                last_touched: now,
            });

        if self.expired(&entry, now) {
            entry.messages.clear();
        }

        entry.messages.push_back(message);
        while entry.messages.len() > self.capacity {
            entry.messages.pop_front();
        }
        entry.last_touched = now;
    }

    /// The cached window for a conversation, oldest first. Empty when
    /// absent or idle-expired; reading a live window refreshes its
    /// last-touched time.
    pub fn window(&self, conversation_id: Uuid) -> Vec<Message> {
        let now = self.clock.now();

        if let Some(mut entry) = self.windows.get_mut(&conversation_id) {
            if self.expired(&entry, now) {
                drop(entry);
                self.windows.remove(&conversation_id);
                tracing::debug!(%conversation_id, "context window idle-expired");
                return Vec::new();
            }
            entry.last_touched = now;
            return entry.messages.iter().cloned().collect();
        }

        Vec::new()
    }

    /// Drop a conversation's window entirely (e.g. after truncation).
    pub fn invalidate(&self, conversation_id: Uuid) {
        self.windows.remove(&conversation_id);
    }

    fn expired(&self, window: &ConversationWindow, now: Instant) -> bool {
        now.duration_since(window.last_touched) > self.idle_expiry
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new(
            DEFAULT_WINDOW_SIZE,
            DEFAULT_IDLE_EXPIRY,
            Arc::new(SystemClock),
        )
    }
}
