//! roost - a Telegram bot with a local SQLite store and a small HTTP endpoint.

pub mod bot;
pub mod config;
pub mod telegram_log;
pub mod web;
