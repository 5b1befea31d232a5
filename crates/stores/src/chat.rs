use std::path::PathBuf;

use {
    rag_studio_client::QueryMode,
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::{
    error::StoreError,
    persist::{load_or_default, now_ms, save_json},
};

const DEFAULT_TITLE: &str = "New Chat";
const TITLE_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<QueryMode>,
    #[serde(default)]
    pub vlm_enhanced: bool,
    #[serde(default)]
    pub multimodal: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Value>,
}

/// A message before the store assigns its id and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub mode: Option<QueryMode>,
    pub vlm_enhanced: bool,
    pub multimodal: bool,
    pub sources: Vec<Value>,
}

impl NewMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            mode: None,
            vlm_enhanced: false,
            multimodal: false,
            sources: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    #[must_use]
    pub fn with_mode(mut self, mode: QueryMode, vlm_enhanced: bool) -> Self {
        self.mode = Some(mode);
        self.vlm_enhanced = vlm_enhanced;
        self
    }

    #[must_use]
    pub fn with_sources(mut self, sources: Vec<Value>) -> Self {
        self.sources = sources;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChatState {
    /// Newest first.
    sessions: Vec<ChatSession>,
    current_session_id: Option<String>,
}

/// Chat sessions and their messages, persisted to `chat.json`.
pub struct ChatStore {
    path: PathBuf,
    state: ChatState,
    streaming: bool,
}

fn title_from(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(TITLE_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

impl ChatStore {
    pub fn load(path: PathBuf) -> Self {
        let state = load_or_default(&path);
        Self {
            path,
            state,
            streaming: false,
        }
    }

    /// Sessions and the current selection; the streaming flag is transient.
    pub fn save(&self) -> Result<(), StoreError> {
        save_json(&self.path, &self.state)
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.state.sessions
    }

    pub fn session(&self, id: &str) -> Option<&ChatSession> {
        self.state.sessions.iter().find(|s| s.id == id)
    }

    /// Insert a new empty session first in the list and make it current.
    pub fn create_session(&mut self, title: Option<&str>) -> &ChatSession {
        let now = now_ms();
        let session = ChatSession {
            id: format!("session_{}", uuid::Uuid::new_v4().simple()),
            title: title.unwrap_or(DEFAULT_TITLE).to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.state.current_session_id = Some(session.id.clone());
        self.state.sessions.insert(0, session);
        &self.state.sessions[0]
    }

    /// Deleting the current session moves the selection to the first
    /// remaining one.
    pub fn delete_session(&mut self, id: &str) -> bool {
        let before = self.state.sessions.len();
        self.state.sessions.retain(|s| s.id != id);
        if self.state.current_session_id.as_deref() == Some(id) {
            self.state.current_session_id = self.state.sessions.first().map(|s| s.id.clone());
        }
        self.state.sessions.len() != before
    }

    pub fn set_current_session(&mut self, id: &str) {
        self.state.current_session_id = Some(id.to_string());
    }

    pub fn current_session_id(&self) -> Option<&str> {
        self.state.current_session_id.as_deref()
    }

    pub fn current_session(&self) -> Option<&ChatSession> {
        self.current_session_id().and_then(|id| self.session(id))
    }

    fn current_session_mut(&mut self) -> Option<&mut ChatSession> {
        let id = self.state.current_session_id.as_deref()?;
        self.state.sessions.iter_mut().find(|s| s.id == id)
    }

    /// Append to the current session. The first user message of an empty
    /// session becomes its title.
    pub fn add_message(&mut self, message: NewMessage) -> Result<&ChatMessage, StoreError> {
        let session = self.current_session_mut().ok_or(StoreError::NoCurrentSession)?;
        let now = now_ms();
        if session.messages.is_empty() && message.role == Role::User {
            session.title = title_from(&message.content);
        }
        session.messages.push(ChatMessage {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            role: message.role,
            content: message.content,
            timestamp: now,
            mode: message.mode,
            vlm_enhanced: message.vlm_enhanced,
            multimodal: message.multimodal,
            sources: message.sources,
        });
        session.updated_at = now;
        session
            .messages
            .last()
            .ok_or(StoreError::NoCurrentSession)
    }

    /// Edit a message of the current session in place.
    pub fn update_message(&mut self, id: &str, f: impl FnOnce(&mut ChatMessage)) -> bool {
        let Some(session) = self.current_session_mut() else {
            return false;
        };
        let Some(message) = session.messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        f(message);
        session.updated_at = now_ms();
        true
    }

    pub fn clear_session(&mut self, id: &str) -> bool {
        match self.state.sessions.iter_mut().find(|s| s.id == id) {
            Some(session) => {
                session.messages.clear();
                session.updated_at = now_ms();
                true
            },
            None => false,
        }
    }

    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Most recently updated first.
    pub fn recent_sessions(&self, limit: usize) -> Vec<&ChatSession> {
        let mut sessions: Vec<_> = self.state.sessions.iter().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions.truncate(limit);
        sessions
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn store() -> (tempfile::TempDir, ChatStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatStore::load(dir.path().join("chat.json"));
        (dir, store)
    }

    #[test]
    fn create_session_becomes_current_and_first() {
        let (_dir, mut store) = store();
        let first = store.create_session(None).id.clone();
        let second = store.create_session(Some("Papers")).id.clone();

        assert_eq!(store.sessions()[0].id, second);
        assert_eq!(store.sessions()[1].id, first);
        assert_eq!(store.sessions()[1].title, "New Chat");
        assert_eq!(store.current_session_id(), Some(second.as_str()));
    }

    #[test]
    fn first_user_message_sets_title() {
        let (_dir, mut store) = store();
        store.create_session(None);
        let long = "a".repeat(60);
        store.add_message(NewMessage::user(long)).unwrap();
        store.add_message(NewMessage::user("second question")).unwrap();

        let session = store.current_session().unwrap();
        assert_eq!(session.title, format!("{}...", "a".repeat(50)));
        assert_eq!(session.messages.len(), 2);
    }

    #[test]
    fn short_title_has_no_ellipsis() {
        let (_dir, mut store) = store();
        store.create_session(None);
        store.add_message(NewMessage::user("What is RAG?")).unwrap();
        assert_eq!(store.current_session().unwrap().title, "What is RAG?");
    }

    #[test]
    fn assistant_first_keeps_title() {
        let (_dir, mut store) = store();
        store.create_session(Some("Kept"));
        store.add_message(NewMessage::assistant("hello")).unwrap();
        store.add_message(NewMessage::user("question")).unwrap();
        assert_eq!(store.current_session().unwrap().title, "Kept");
    }

    #[test]
    fn add_message_without_session_fails() {
        let (_dir, mut store) = store();
        assert!(matches!(
            store.add_message(NewMessage::user("hi")),
            Err(StoreError::NoCurrentSession)
        ));
    }

    #[test]
    fn delete_current_moves_selection() {
        let (_dir, mut store) = store();
        let older = store.create_session(None).id.clone();
        let newer = store.create_session(None).id.clone();

        assert!(store.delete_session(&newer));
        assert_eq!(store.current_session_id(), Some(older.as_str()));
        assert!(store.delete_session(&older));
        assert_eq!(store.current_session_id(), None);
        assert!(!store.delete_session("missing"));
    }

    #[test]
    fn update_and_clear_messages() {
        let (_dir, mut store) = store();
        let id = store.create_session(None).id.clone();
        let msg_id = store
            .add_message(NewMessage::assistant("draft"))
            .unwrap()
            .id
            .clone();

        assert!(store.update_message(&msg_id, |m| {
            m.content = "final".into();
            m.sources = vec![json!({"type": "text", "content": "chunk"})];
        }));
        assert_eq!(store.current_session().unwrap().messages[0].content, "final");
        assert!(!store.update_message("nope", |_| {}));

        assert!(store.clear_session(&id));
        assert!(store.current_session().unwrap().messages.is_empty());
    }

    #[test]
    fn recent_sessions_orders_by_update() {
        let (_dir, mut store) = store();
        let a = store.create_session(Some("a")).id.clone();
        let _b = store.create_session(Some("b")).id.clone();
        let _c = store.create_session(Some("c")).id.clone();

        store.set_current_session(&a);
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.add_message(NewMessage::user("bump")).unwrap();

        let recent = store.recent_sessions(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, a);
    }

    #[test]
    fn persists_sessions_but_not_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.json");
        {
            let mut store = ChatStore::load(path.clone());
            store.create_session(None);
            store
                .add_message(NewMessage::user("persist me").with_mode(QueryMode::Local, true))
                .unwrap();
            store.set_streaming(true);
            store.save().unwrap();
        }

        let store = ChatStore::load(path);
        assert!(!store.is_streaming());
        let session = store.current_session().unwrap();
        assert_eq!(session.title, "persist me");
        assert_eq!(session.messages[0].mode, Some(QueryMode::Local));
        assert!(session.messages[0].vlm_enhanced);
    }
}
