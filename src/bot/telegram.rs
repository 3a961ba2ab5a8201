//! Telegram client using teloxide.

use teloxide::prelude::*;
use teloxide::types::{MessageId, ReplyParameters};
use teloxide::utils::command::BotCommands;
use teloxide::{ApiError, RequestError};
use tracing::{info, warn};

use crate::bot::commands::Command;
use crate::bot::engine::Reply;

/// Telegram API client.
#[derive(Clone)]
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Send a reply, optionally quoting `reply_to_message_id`. Returns the new message ID.
    pub async fn send_reply(
        &self,
        chat_id: i64,
        reply: &Reply,
        reply_to_message_id: Option<i64>,
    ) -> Result<i64, String> {
        let mut request = self.bot.send_message(ChatId(chat_id), &reply.text);

        if let Some(keyboard) = reply.keyboard.clone() {
            request = request.reply_markup(keyboard);
        }
        if let Some(msg_id) = reply_to_message_id {
            request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id as i32)));
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send: {e}");
            warn!("{}", msg);
            msg
        })
    }

    /// Replace the text (and keyboard) of a message the bot sent earlier.
    pub async fn edit_reply(&self, chat_id: i64, message_id: i64, reply: &Reply) -> Result<(), String> {
        let mut request = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id as i32), &reply.text);

        if let Some(keyboard) = reply.keyboard.clone() {
            request = request.reply_markup(keyboard);
        }

        match request.await {
            Ok(_) => Ok(()),
            // Pressing the same button twice produces identical text.
            Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
            Err(e) => {
                let msg = format!("Failed to edit message: {e}");
                warn!("{}", msg);
                Err(msg)
            }
        }
    }

    /// Stop the loading spinner on a pressed button, optionally with a toast.
    pub async fn answer_callback(&self, query: &CallbackQuery, toast: Option<&str>) -> Result<(), String> {
        let mut request = self.bot.answer_callback_query(query.id.clone());
        if let Some(text) = toast {
            request = request.text(text);
        }

        request.await.map(|_| ()).map_err(|e| {
            let msg = format!("Failed to answer callback: {e}");
            warn!("{}", msg);
            msg
        })
    }

    /// Publish the command list shown in Telegram's "/" menu.
    pub async fn register_commands(&self) -> Result<(), String> {
        self.bot
            .set_my_commands(Command::bot_commands())
            .await
            .map_err(|e| format!("Failed to register commands: {e}"))?;
        info!("Registered {} bot commands", Command::bot_commands().len());
        Ok(())
    }
}
