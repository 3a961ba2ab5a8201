//! Bot engine - command, callback and message logic over the database.
//!
//! Nothing here talks to Telegram. Every entry point returns a [`Reply`]
//! that the handlers deliver, which keeps the logic testable offline.

use std::collections::HashSet;
use std::sync::Arc;

use teloxide::types::InlineKeyboardMarkup;
use teloxide::utils::command::BotCommands;
use tracing::{debug, info};

use crate::bot::callback::{main_menu, CallbackAction};
use crate::bot::commands::Command;
use crate::bot::database::{Database, StorageError};
use crate::bot::message::{IncomingMessage, Sender, TIMESTAMP_FORMAT};

const QUIET_KEY: &str = "quiet";
const QUIET_ON: &str = "on";

/// Text to send back, optionally with an inline keyboard.
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), keyboard: None }
    }

    pub fn with_menu(text: impl Into<String>) -> Self {
        Self { text: text.into(), keyboard: Some(main_menu()) }
    }
}

pub struct BotEngine {
    db: Arc<Database>,
    owners: HashSet<i64>,
}

impl BotEngine {
    pub fn new(db: Arc<Database>, owners: impl IntoIterator<Item = i64>) -> Self {
        Self { db, owners: owners.into_iter().collect() }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owners.contains(&user_id)
    }

    pub fn on_command(&self, sender: &Sender, cmd: Command) -> Result<Reply, StorageError> {
        self.db.touch_user(sender, &now())?;

        let reply = match cmd {
            Command::Start => {
                info!("👋 /start from {} ({})", sender.display_name(), sender.user_id);
                Reply::with_menu(format!(
                    "Hi {}! Pick something from the menu below, or send /help.",
                    sender.first_name
                ))
            }
            Command::Help => Reply::text(help_text()),
            Command::Menu => Reply::with_menu("What would you like to do?"),
            Command::Stats => Reply::text(self.stats_text(sender.user_id)?),
            Command::Quiet => Reply::text(self.toggle_quiet(sender.user_id)?),
        };
        Ok(reply)
    }

    /// Handle an inline-button press. The reply replaces the menu message and
    /// keeps the menu attached.
    pub fn on_callback(&self, sender: &Sender, action: CallbackAction) -> Result<Reply, StorageError> {
        self.db.touch_user(sender, &now())?;
        debug!("Callback {} from {}", action, sender.user_id);

        let text = match action {
            CallbackAction::Stats => self.stats_text(sender.user_id)?,
            CallbackAction::Help => help_text(),
            CallbackAction::Quiet => self.toggle_quiet(sender.user_id)?,
        };
        Ok(Reply::with_menu(text))
    }

    /// Record a plain message. Only unrecognised commands in private chats
    /// get an answer, and only when the sender is not in quiet mode.
    pub fn on_message(&self, msg: &IncomingMessage) -> Result<Option<Reply>, StorageError> {
        self.db.record_message(msg)?;

        if !msg.is_private || !msg.looks_like_command() {
            return Ok(None);
        }
        if self.is_quiet(msg.sender.user_id)? {
            debug!("Suppressing hint for quiet user {}", msg.sender.user_id);
            return Ok(None);
        }
        Ok(Some(Reply::text("I don't know that command. Send /help to see what I can do.")))
    }

    pub fn is_quiet(&self, user_id: i64) -> Result<bool, StorageError> {
        Ok(self.db.get_state(user_id, QUIET_KEY)?.as_deref() == Some(QUIET_ON))
    }

    fn toggle_quiet(&self, user_id: i64) -> Result<String, StorageError> {
        if self.is_quiet(user_id)? {
            self.db.delete_state(user_id, QUIET_KEY)?;
            Ok("Quiet mode is off. I'll point you to /help when I don't understand something.".into())
        } else {
            self.db.set_state(user_id, QUIET_KEY, QUIET_ON, &now())?;
            Ok("Quiet mode is on. I'll stay silent unless you use a command.".into())
        }
    }

    fn stats_text(&self, user_id: i64) -> Result<String, StorageError> {
        let mut text = match self.db.get_user(user_id)? {
            Some(user) if user.message_count > 0 => {
                let since = user.first_seen.split(' ').next().unwrap_or(&user.first_seen);
                format!("You have sent {} message(s) since {}.", user.message_count, since)
            }
            _ => "I haven't seen any messages from you yet.".to_string(),
        };

        if self.is_owner(user_id) {
            let counts = self.db.counts()?;
            text.push_str(&format!("\nGlobal: {} user(s), {} message(s).", counts.users, counts.messages));
        }
        Ok(text)
    }
}

fn help_text() -> String {
    Command::descriptions().to_string()
}

fn now() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}
