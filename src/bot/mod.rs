//! Bot module - routes Telegram updates to handlers backed by SQLite.

pub mod callback;
pub mod commands;
pub mod database;
pub mod engine;
pub mod handlers;
pub mod message;
pub mod telegram;

#[cfg(test)]
mod tests;

pub use callback::CallbackAction;
pub use commands::Command;
pub use database::{Database, StorageError};
pub use engine::{BotEngine, Reply};
pub use handlers::{schema, HandlerDeps};
pub use message::{IncomingMessage, Sender};
pub use telegram::TelegramClient;
