//! Session data types.

use cairn_types::{ContentBlock, Message, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One conversation transcript with its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub model: String,
    pub cwd: String,
    pub messages: Vec<Message>,
}

impl Session {
    pub fn new(model: impl Into<String>, cwd: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            model: model.into(),
            cwd: cwd.into(),
            messages: Vec::new(),
        }
    }

    /// Short hex prefix of the session ID for display.
    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_string()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// First line of the first user text, for display.
    pub fn preview(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .flat_map(|m| m.content.iter())
            .find_map(|block| match block {
                ContentBlock::Text { text } => text.lines().next().map(str::trim),
                _ => None,
            })
            .map(|line| cairn_types::truncate_for_display(line, 80))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_empty() {
        let session = Session::new("claude-sonnet-4-5", "/tmp");
        assert!(session.messages.is_empty());
        assert_eq!(session.created_at, session.updated_at);
        assert_eq!(session.short_id().len(), 8);
    }

    #[test]
    fn push_updates_timestamp() {
        let mut session = Session::new("m", "/tmp");
        let before = session.updated_at;
        session.push(Message::user_text("hello"));
        assert_eq!(session.messages.len(), 1);
        assert!(session.updated_at >= before);
    }

    #[test]
    fn preview_uses_first_user_line() {
        let mut session = Session::new("m", "/tmp");
        session.push(Message::user_text("  fix the build\nand more details"));
        assert_eq!(session.preview(), "fix the build");
    }

    #[test]
    fn serde_roundtrip_keeps_id() {
        let mut session = Session::new("m", "/tmp");
        session.push(Message::user_text("hi"));
        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, session.id);
        assert_eq!(back.messages, session.messages);
    }
}
