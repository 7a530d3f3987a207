//! Session Management
//!
//! A session is one conversation plus identity and timestamps. Stores own
//! persistence format and location; the serialized form round-trips the
//! full message sequence including tool-role messages and call ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::message::Conversation;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A complete agent session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,

    /// Conversation history
    pub conversation: Conversation,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new empty session
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            conversation: Conversation::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Wrap an existing conversation under the given id
    pub fn from_conversation(id: SessionId, conversation: Conversation) -> Self {
        let now = Utc::now();
        Self {
            id,
            conversation,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Message count
    pub fn message_count(&self) -> usize {
        self.conversation.len()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Listing entry for saved sessions
#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub id: SessionId,
    pub size_bytes: u64,
}

/// Session store trait for persistence
pub trait SessionStore: Send + Sync {
    /// Save a session
    fn save(&self, session: &Session) -> Result<()>;

    /// Load a session by ID
    fn load(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Delete a session
    fn delete(&self, id: &SessionId) -> Result<()>;

    /// List saved sessions
    fn list(&self) -> Result<Vec<SessionSummary>>;
}

/// In-memory session store (for development/testing)
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: std::sync::RwLock<std::collections::HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn load(&self, id: &SessionId) -> Result<Option<Session>> {
        let sessions = self.sessions.read().unwrap();
        Ok(sessions.get(id).cloned())
    }

    fn delete(&self, id: &SessionId) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap();
        sessions.remove(id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.read().unwrap();
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .map(|s| SessionSummary {
                id: s.id.clone(),
                size_bytes: serde_json::to_vec(s).map(|v| v.len() as u64).unwrap_or(0),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn test_session_creation() {
        let session = Session::new();
        assert_eq!(session.message_count(), 0);
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemorySessionStore::new();

        let mut session = Session::new();
        session.conversation.push(Message::user("list files"));
        session
            .conversation
            .push(Message::assistant("").with_tool_call("run_shell", "call-1", None));
        session
            .conversation
            .push(Message::tool("exit code 0\nfoo.txt", "run_shell", "call-1"));
        let id = session.id.clone();

        store.save(&session).unwrap();

        let loaded = store.load(&id).unwrap().expect("session saved");
        assert_eq!(loaded.message_count(), 3);
        assert_eq!(
            loaded.conversation.messages()[2].tool_call_id.as_deref(),
            Some("call-1")
        );

        store.delete(&id).unwrap();
        assert!(store.load(&id).unwrap().is_none());
    }

    #[test]
    fn test_list_is_sorted() {
        let store = MemorySessionStore::new();
        for name in ["beta", "alpha"] {
            let session =
                Session::from_conversation(SessionId::from_string(name), Conversation::new());
            store.save(&session).unwrap();
        }
        let names: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }
}
