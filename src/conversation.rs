//! conversation store: an append-only list of role-tagged messages that always
//! starts with the fixed system instruction.

use bevy::log::warn;
use serde::{Deserialize, Serialize};

/// seed instruction placed at the head of every conversation.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// label used by the transcript export and the chat view.
    pub fn label(self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// a single chat message. immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// ordered history; index 0 is always the single system message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self { messages: vec![Message::system(SYSTEM_PROMPT)] }
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// drop everything and start over from the system instruction.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.messages.push(Message::system(SYSTEM_PROMPT));
    }

    /// push a user or assistant message. system messages are refused so the
    /// head of the history stays the only one.
    pub fn append(&mut self, message: Message) {
        if message.role == Role::System {
            warn!(target: "bevy_llm_chat", "conversation: ignoring appended system message");
            return;
        }
        self.messages.push(message);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.append(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.append(Message::assistant(content));
    }

    /// the full sequence as sent to the model (system message included).
    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    /// messages shown to the user: everything after the system instruction.
    pub fn visible(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().skip(1)
    }

    pub fn message_count(&self) -> usize {
        self.messages.len().saturating_sub(1)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// never true: the system message is always present.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// plain-text export, one `Role: text` block per visible message.
    pub fn transcript(&self) -> String {
        self.visible().fold(String::new(), |mut out, m| {
            out.push_str(m.role.label());
            out.push_str(": ");
            out.push_str(&m.content);
            out.push_str("\n\n");
            out
        })
    }
}

/// download name for a transcript produced while `model` was active.
pub fn transcript_file_name(model: &str) -> String {
    format!("chat_export_{model}.txt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reset_leaves_only_system_message() {
        let mut c = Conversation::new();
        c.push_user("hi");
        c.push_assistant("hello");
        c.reset();
        assert_eq!(c.len(), 1);
        assert_eq!(c.history()[0], Message::system(SYSTEM_PROMPT));
        assert_eq!(c.message_count(), 0);
    }

    #[test]
    fn append_keeps_order_and_refuses_system() {
        let mut c = Conversation::new();
        c.push_user("a");
        c.append(Message::system("sneaky"));
        c.push_assistant("b");
        let roles: Vec<Role> = c.history().iter().map(Message::role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(c.last().map(Message::content), Some("b"));
    }

    #[test]
    fn transcript_skips_system_message() {
        let mut c = Conversation::new();
        c.push_user("hi");
        c.push_assistant("hello");
        assert_eq!(c.transcript(), "User: hi\n\nAssistant: hello\n\n");
    }

    #[test]
    fn transcript_of_fresh_conversation_is_empty() {
        assert_eq!(Conversation::new().transcript(), "");
    }

    #[test]
    fn file_name_carries_model() {
        assert_eq!(transcript_file_name("gemini-1.5-flash"), "chat_export_gemini-1.5-flash.txt");
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::assistant("x")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
    }
}
