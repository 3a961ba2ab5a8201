//! Dispatcher schema and Telegram-facing endpoints.

use std::sync::Arc;

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use tracing::{error, info, warn};

use crate::bot::callback::CallbackAction;
use crate::bot::commands::Command;
use crate::bot::database::StorageError;
use crate::bot::engine::{BotEngine, Reply};
use crate::bot::message::{IncomingMessage, Sender};
use crate::bot::telegram::TelegramClient;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;
pub type HandlerResult = Result<(), HandlerError>;

const APOLOGY: &str = "Sorry, something went wrong on my side. Please try again later.";
const UNKNOWN_ACTION: &str = "Unknown action";

/// Dependencies injected into every endpoint.
pub struct HandlerDeps {
    pub engine: BotEngine,
    pub telegram: TelegramClient,
}

/// Handler tree: commands first, then plain messages, then button callbacks.
pub fn schema() -> UpdateHandler<HandlerError> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .branch(dptree::entry().filter_command::<Command>().endpoint(handle_command))
                .branch(dptree::endpoint(handle_message)),
        )
        .branch(Update::filter_callback_query().endpoint(handle_callback))
}

async fn handle_command(msg: Message, cmd: Command, deps: Arc<HandlerDeps>) -> HandlerResult {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let sender = Sender::from(user);
    info!("🎯 Command {:?} from {} in chat {}", cmd, sender.user_id, msg.chat.id);

    let reply = command_reply(&sender, deps.engine.on_command(&sender, cmd));
    deps.telegram.send_reply(msg.chat.id.0, &reply, None).await.ok();
    Ok(())
}

async fn handle_message(msg: Message, deps: Arc<HandlerDeps>) -> HandlerResult {
    let Some(incoming) = IncomingMessage::from_telegram(&msg) else {
        return Ok(());
    };

    let preview: String = incoming.text.chars().take(100).collect();
    info!("📨 Message from {} ({}): \"{preview}\"", incoming.sender.display_name(), incoming.sender.user_id);

    if let Some(reply) = message_reply(&incoming, deps.engine.on_message(&incoming)) {
        deps.telegram
            .send_reply(incoming.chat_id, &reply, Some(incoming.message_id))
            .await
            .ok();
    }
    Ok(())
}

async fn handle_callback(q: CallbackQuery, deps: Arc<HandlerDeps>) -> HandlerResult {
    let sender = Sender::from(&q.from);

    let action = match route_callback(q.data.as_deref()) {
        CallbackRoute::Act(action) => action,
        CallbackRoute::Reject(toast) => {
            warn!("Bad callback from {}: {:?}", sender.user_id, q.data);
            deps.telegram.answer_callback(&q, Some(toast)).await.ok();
            return Ok(());
        }
    };

    let reply = match deps.engine.on_callback(&sender, action) {
        Ok(reply) => reply,
        Err(e) => {
            error!("Callback {action} failed for {}: {e}", sender.user_id);
            deps.telegram.answer_callback(&q, Some(APOLOGY)).await.ok();
            return Ok(());
        }
    };
    deps.telegram.answer_callback(&q, None).await.ok();

    let menu = q.regular_message().map(|m| (m.chat.id.0, m.id.0 as i64));
    match menu_delivery(menu, sender.user_id) {
        MenuDelivery::Edit { chat_id, message_id } => {
            if deps.telegram.edit_reply(chat_id, message_id, &reply).await.is_err() {
                deps.telegram.send_reply(chat_id, &reply, None).await.ok();
            }
        }
        MenuDelivery::Send { chat_id } => {
            deps.telegram.send_reply(chat_id, &reply, None).await.ok();
        }
    }
    Ok(())
}

// ==================== DECISIONS ====================

#[derive(Debug, PartialEq)]
enum CallbackRoute {
    Act(CallbackAction),
    /// Answer with this toast and stop.
    Reject(&'static str),
}

fn route_callback(data: Option<&str>) -> CallbackRoute {
    match data.unwrap_or_default().parse::<CallbackAction>() {
        Ok(action) => CallbackRoute::Act(action),
        Err(_) => CallbackRoute::Reject(UNKNOWN_ACTION),
    }
}

/// Where the reply to a menu button goes.
#[derive(Debug, PartialEq)]
enum MenuDelivery {
    /// Replace the menu message in place; send to the same chat if that fails.
    Edit { chat_id: i64, message_id: i64 },
    Send { chat_id: i64 },
}

/// `menu` is the `(chat_id, message_id)` of the menu message, when Telegram
/// still lets us see it.
fn menu_delivery(menu: Option<(i64, i64)>, user_id: i64) -> MenuDelivery {
    match menu {
        Some((chat_id, message_id)) => MenuDelivery::Edit { chat_id, message_id },
        None => MenuDelivery::Send { chat_id: user_id },
    }
}

fn command_reply(sender: &Sender, result: Result<Reply, StorageError>) -> Reply {
    result.unwrap_or_else(|e| {
        error!("Command failed for {}: {e}", sender.user_id);
        Reply::text(APOLOGY)
    })
}

/// Groups never hear about our storage problems.
fn message_reply(incoming: &IncomingMessage, result: Result<Option<Reply>, StorageError>) -> Option<Reply> {
    match result {
        Ok(reply) => reply,
        Err(e) => {
            error!("Failed to record message {} in chat {}: {e}", incoming.message_id, incoming.chat_id);
            incoming.is_private.then(|| Reply::text(APOLOGY))
        }
    }
}
