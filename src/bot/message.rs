//! Incoming message type, decoupled from teloxide so the engine can be tested.

use teloxide::types::{ChatKind, Message, User};

/// Format used for every timestamp written to storage.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The sender of a message or callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Sender {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: String,
}

impl Sender {
    /// "@username" when available, first name otherwise.
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(u) => format!("@{u}"),
            None => self.first_name.clone(),
        }
    }
}

impl From<&User> for Sender {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.0 as i64,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
        }
    }
}

/// A text message received by the bot.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub message_id: i64,
    /// Negative for groups, positive for private chats.
    pub chat_id: i64,
    pub sender: Sender,
    pub timestamp: String,
    pub text: String,
    pub is_private: bool,
}

impl IncomingMessage {
    /// Build from a Telegram message. Returns `None` for messages without a
    /// human sender (channel posts) or without text.
    pub fn from_telegram(msg: &Message) -> Option<Self> {
        let user = msg.from.as_ref()?;
        let text = msg.text()?;

        Some(Self {
            message_id: msg.id.0 as i64,
            chat_id: msg.chat.id.0,
            sender: Sender::from(user),
            timestamp: msg.date.format(TIMESTAMP_FORMAT).to_string(),
            text: text.to_string(),
            is_private: matches!(msg.chat.kind, ChatKind::Private(_)),
        })
    }

    /// True when the text starts like a bot command ("/word").
    pub fn looks_like_command(&self) -> bool {
        let mut chars = self.text.trim_start().chars();
        chars.next() == Some('/') && chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
    }
}
