use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::loop_detect::LoopPattern;
use crate::types::{Role, Turn};

/// Shared handle to one session. Holding its lock is what serializes
/// transactions for that session id.
pub type SessionHandle = Arc<Mutex<Session>>;

/// The in-memory record for a single conversation.
#[derive(Debug)]
pub struct Session {
    id: String,
    turns: VecDeque<Turn>,
    max_turns: usize,
    /// Location resolved from the conversation, memoized for the session.
    location: Option<String>,
    /// Number of loop overrides issued in this session.
    loop_breaks: u32,
    last_loop_pattern: Option<LoopPattern>,
}

impl Session {
    pub fn new(id: impl Into<String>, max_turns: usize) -> Self {
        Self {
            id: id.into(),
            turns: VecDeque::new(),
            max_turns: max_turns.max(1),
            location: None,
            loop_breaks: 0,
            last_loop_pattern: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a turn, evicting the oldest turns beyond the retention cap.
    ///
    /// Timestamps are forced strictly increasing within the session so the
    /// sequence stays time-ordered even when the clock does not advance
    /// between two appends.
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> Turn {
        let mut created_at = Utc::now();
        if let Some(last) = self.turns.back() {
            if created_at <= last.created_at {
                created_at = last.created_at + chrono::Duration::microseconds(1);
            }
        }
        let turn = Turn {
            role,
            content: content.into(),
            created_at,
        };
        self.turns.push_back(turn.clone());
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
        turn
    }

    /// All retained turns, oldest first.
    pub fn turns(&self) -> &VecDeque<Turn> {
        &self.turns
    }

    /// The last `limit` turns in chronological order.
    pub fn recent(&self, limit: usize) -> Vec<Turn> {
        let skip = self.turns.len().saturating_sub(limit);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = Some(location.into());
    }

    pub fn loop_breaks(&self) -> u32 {
        self.loop_breaks
    }

    pub fn last_loop_pattern(&self) -> Option<&LoopPattern> {
        self.last_loop_pattern.as_ref()
    }

    /// Record that a loop override was issued for `pattern`.
    pub fn record_loop_break(&mut self, pattern: LoopPattern) {
        self.loop_breaks = self.loop_breaks.saturating_add(1);
        self.last_loop_pattern = Some(pattern);
    }

    fn reset(&mut self) {
        self.turns.clear();
        self.location = None;
        self.loop_breaks = 0;
        self.last_loop_pattern = None;
    }
}

/// Per-session, append-only turn log with bounded retention.
///
/// The outer map lock is held only to look up, insert or remove a session
/// handle; all turn mutation happens under that session's own mutex, so
/// sessions never contend with each other.
#[derive(Debug, Clone)]
pub struct ConversationHistoryStore {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
    max_history: usize,
}

impl ConversationHistoryStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_history: max_history.max(1),
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Get the handle for `session_id`, creating the session if unseen.
    pub async fn session(&self, session_id: &str) -> SessionHandle {
        if let Some(handle) = self.existing(session_id).await {
            return handle;
        }
        let mut guard = self.sessions.write().await;
        Arc::clone(guard.entry(session_id.to_owned()).or_insert_with(|| {
            tracing::debug!(session_id, "session created");
            Arc::new(Mutex::new(Session::new(session_id, self.max_history)))
        }))
    }

    async fn existing(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Append a turn to `session_id`, creating the session if needed.
    pub async fn append(&self, session_id: &str, role: Role, content: impl Into<String>) -> Turn {
        let handle = self.session(session_id).await;
        let mut session = handle.lock().await;
        session.push(role, content)
    }

    /// The last `limit` turns of `session_id`, oldest first. Unseen sessions
    /// yield an empty sequence.
    pub async fn recent_context(&self, session_id: &str, limit: usize) -> Vec<Turn> {
        match self.existing(session_id).await {
            Some(handle) => handle.lock().await.recent(limit),
            None => Vec::new(),
        }
    }

    /// Every retained turn of `session_id`, oldest first.
    pub async fn history(&self, session_id: &str) -> Vec<Turn> {
        self.recent_context(session_id, usize::MAX).await
    }

    /// Remove all turns for `session_id`. Idempotent; returns `true` if the
    /// session existed.
    ///
    /// Waits for any in-flight transaction on the session to finish, then
    /// wipes it so that transaction's turns do not survive the clear.
    pub async fn clear(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id);
        match removed {
            Some(handle) => {
                handle.lock().await.reset();
                true
            }
            None => false,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for ConversationHistoryStore {
    fn default() -> Self {
        Self::new(50)
    }
}

/// Render turns as prompt context, one `User:` / `Soulene:` line per turn.
pub fn render_context(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        let speaker = match turn.role {
            Role::User => "User",
            Role::Assistant => "Soulene",
        };
        out.push_str(speaker);
        out.push_str(": ");
        out.push_str(&turn.content);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_creates_session() {
        let store = ConversationHistoryStore::default();
        store.append("s1", Role::User, "Hello").await;

        let turns = store.history("s1").await;
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "Hello");
    }

    #[tokio::test]
    async fn eviction_is_fifo() {
        let store = ConversationHistoryStore::new(5);
        for i in 0..10 {
            store.append("s1", Role::User, format!("Message {i}")).await;
        }

        let turns = store.history("s1").await;
        assert_eq!(turns.len(), 5);
        assert_eq!(turns[0].content, "Message 5");
        assert_eq!(turns[4].content, "Message 9");
    }

    #[tokio::test]
    async fn recent_context_is_bounded_and_chronological() {
        let store = ConversationHistoryStore::new(4);
        store.append("s1", Role::User, "First message").await;
        store.append("s1", Role::Assistant, "First response").await;
        store.append("s1", Role::User, "Second message").await;

        let recent = store.recent_context("s1", 2).await;
        let contents: Vec<_> = recent.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, ["First response", "Second message"]);

        for _ in 0..10 {
            store.append("s1", Role::User, "more").await;
        }
        assert_eq!(store.recent_context("s1", 100).await.len(), 4);
        assert!(store.recent_context("s1", 0).await.is_empty());
    }

    #[tokio::test]
    async fn unseen_session_is_empty() {
        let store = ConversationHistoryStore::default();
        assert!(store.recent_context("nobody", 10).await.is_empty());
        assert_eq!(store.session_count().await, 0, "reads must not create sessions");
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let store = ConversationHistoryStore::default();
        store.append("s1", Role::User, "Test message").await;

        assert!(store.clear("s1").await);
        assert!(store.recent_context("s1", 10).await.is_empty());
        assert!(!store.clear("s1").await);
        assert!(!store.clear("never-seen").await);
        assert!(store.recent_context("never-seen", 10).await.is_empty());
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = ConversationHistoryStore::default();
        store.append("a", Role::User, "from a").await;
        store.append("b", Role::User, "from b").await;
        store.clear("a").await;

        assert!(store.history("a").await.is_empty());
        assert_eq!(store.history("b").await[0].content, "from b");
    }

    #[tokio::test]
    async fn timestamps_strictly_increase() {
        let store = ConversationHistoryStore::default();
        for i in 0..20 {
            store.append("s1", Role::User, i.to_string()).await;
        }
        let turns = store.history("s1").await;
        assert!(turns.windows(2).all(|w| w[0].created_at < w[1].created_at));
    }

    #[test]
    fn clear_resets_session_state() {
        let mut session = Session::new("s1", 10);
        session.push(Role::User, "I live in Pune");
        session.set_location("Pune");
        session.record_loop_break(LoopPattern::Grounding);
        session.reset();

        assert!(session.is_empty());
        assert_eq!(session.location(), None);
        assert_eq!(session.loop_breaks(), 0);
        assert!(session.last_loop_pattern().is_none());
    }

    #[test]
    fn render_context_labels_speakers() {
        let mut session = Session::new("s1", 10);
        session.push(Role::User, "hi");
        session.push(Role::Assistant, "hey you");
        let rendered = render_context(&session.recent(10));
        assert_eq!(rendered, "User: hi\nSoulene: hey you\n");
    }
}
