use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::subject::{self, SubjectInfo};

/// Generate a fresh identifier for a conversation or message.
///
/// UUIDv7 values stay unique when many are created within the same
/// millisecond and still sort by creation time.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Copy)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            _ => Err(format!("Invalid message role: {}", s)),
        }
    }
}

/// One turn in a conversation. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    pub role: MessageRole,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(content: impl Into<String>, role: MessageRole) -> Self {
        Self {
            id: new_id(),
            content: content.into(),
            role,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub subject: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Frozen at creation from the subject table.
    #[serde(default)]
    pub icon: String,
}

impl Conversation {
    /// Create a conversation seeded with the assistant's welcome message.
    ///
    /// The raw subject tag is kept even when it is not in the subject table;
    /// the welcome text and icon use the resolved (or `general`) entry.
    pub fn new(title: impl Into<String>, subject: impl Into<String>) -> Self {
        let title = title.into();
        let subject = subject.into();
        let info = subject::resolve(&subject);
        let now = Utc::now();

        let welcome = Message {
            id: new_id(),
            content: welcome_text(&title, info),
            role: MessageRole::Assistant,
            created_at: now,
        };

        Self {
            id: new_id(),
            title,
            subject,
            messages: vec![welcome],
            created_at: now,
            updated_at: now,
            icon: info.icon.to_string(),
        }
    }

    /// Append a message and refresh `updated_at`.
    ///
    /// `updated_at` never moves backwards, even if the wall clock does.
    pub fn push_message(&mut self, content: impl Into<String>, role: MessageRole) -> &Message {
        let message = Message::new(content, role);
        self.updated_at = self.updated_at.max(message.created_at);
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn subject_info(&self) -> &'static SubjectInfo {
        subject::resolve(&self.subject)
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn messages_by_role(&self, role: MessageRole) -> Vec<&Message> {
        self.messages.iter().filter(|m| m.role == role).collect()
    }
}

pub fn welcome_text(title: &str, subject: &SubjectInfo) -> String {
    format!(
        "Welcome to {}! How can I help you learn about {}?",
        title, subject.label
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_conversation_has_welcome() {
        let convo = Conversation::new("Algebra", "math");
        assert_eq!(convo.message_count(), 1);
        let welcome = &convo.messages[0];
        assert_eq!(welcome.role, MessageRole::Assistant);
        assert_eq!(
            welcome.content,
            "Welcome to Algebra! How can I help you learn about Mathematics?"
        );
        assert_eq!(convo.icon, "🧮");
        assert_eq!(convo.created_at, convo.updated_at);
    }

    #[test]
    fn unknown_subject_keeps_tag_but_uses_general() {
        let convo = Conversation::new("Stuff", "astrology");
        assert_eq!(convo.subject, "astrology");
        assert_eq!(convo.subject_info().value, "general");
        assert_eq!(convo.icon, "🧠");
        assert!(convo.messages[0].content.contains("General"));
    }

    #[test]
    fn push_refreshes_updated_at() {
        let mut convo = Conversation::new("Cells", "biology");
        let before = convo.updated_at;
        let id = convo.push_message("what is a ribosome", MessageRole::User).id.clone();
        assert!(convo.updated_at >= before);
        assert_eq!(convo.last_message().map(|m| m.id.as_str()), Some(id.as_str()));
        assert_eq!(convo.messages_by_role(MessageRole::User).len(), 1);
    }

    #[test]
    fn ids_do_not_collide() {
        let mut convo = Conversation::new("Rapid", "general");
        for i in 0..500 {
            convo.push_message(format!("m{i}"), MessageRole::User);
        }
        let mut ids: Vec<_> = convo.messages.iter().map(|m| m.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), convo.message_count());
    }

    #[test]
    fn role_parsing() {
        assert_eq!("Assistant".parse::<MessageRole>(), Ok(MessageRole::Assistant));
        assert!("robot".parse::<MessageRole>().is_err());
        assert_eq!(MessageRole::System.to_string(), "system");
    }

    #[test]
    fn serializes_camel_case() {
        let convo = Conversation::new("Maps", "geography");
        let json = serde_json::to_value(&convo).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
        assert_eq!(json["messages"][0]["role"], "assistant");
        assert!(json["messages"][0]["createdAt"].is_string());
    }
}
