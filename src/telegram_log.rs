//! tracing layer that forwards log lines to a Telegram chat.
//!
//! WARN/ERROR go out immediately; INFO is batched and flushed every few
//! seconds or once the batch is large enough.

use std::fmt::Write as _;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_BATCH: usize = 50;
/// Telegram caps messages at 4096 chars; leave room for the ellipsis.
const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, PartialEq)]
enum LogLine {
    Urgent(String),
    Info(String),
}

pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<LogLine>,
}

impl TelegramLogLayer {
    /// Must be called from within a tokio runtime.
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<LogLine>();
        tokio::spawn(forward(bot, chat_id, rx));
        Self { tx }
    }
}

async fn forward(bot: Bot, chat_id: ChatId, mut rx: mpsc::UnboundedReceiver<LogLine>) {
    let mut batch: Vec<String> = Vec::new();
    let mut interval = tokio::time::interval(FLUSH_INTERVAL);

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(LogLine::Urgent(text)) => send(&bot, chat_id, &text).await,
                Some(LogLine::Info(text)) => {
                    batch.push(text);
                    if batch.len() >= MAX_BATCH {
                        flush(&bot, chat_id, &mut batch).await;
                    }
                }
                None => {
                    flush(&bot, chat_id, &mut batch).await;
                    break;
                }
            },
            _ = interval.tick() => flush(&bot, chat_id, &mut batch).await,
        }
    }
}

async fn send(bot: &Bot, chat_id: ChatId, text: &str) {
    // Logging from here would feed back into this layer.
    if let Err(e) = bot.send_message(chat_id, truncate(text)).await {
        eprintln!("Failed to send log to Telegram: {e}");
    }
}

async fn flush(bot: &Bot, chat_id: ChatId, batch: &mut Vec<String>) {
    if batch.is_empty() {
        return;
    }
    let combined = batch.join("\n");
    batch.clear();
    send(bot, chat_id, &combined).await;
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_MESSAGE_CHARS).collect();
    out.push_str("...");
    out
}

/// Renders `message` first, then the remaining fields as `name = value`.
#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: String,
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            if !self.fields.is_empty() {
                self.fields.push_str(", ");
            }
            let _ = write!(self.fields, "{} = {:?}", field.name(), value);
        }
    }
}

impl FieldCollector {
    fn render(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} ({})", self.message, self.fields),
        }
    }
}

fn classify(level: Level, text: String) -> Option<LogLine> {
    match level {
        Level::ERROR => Some(LogLine::Urgent(format!("❌ {text}"))),
        Level::WARN => Some(LogLine::Urgent(format!("⚠️ {text}"))),
        Level::INFO => Some(LogLine::Info(text)),
        _ => None,
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::INFO {
            return;
        }

        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        if let Some(line) = classify(level, collector.render()) {
            if self.tx.send(line).is_err() {
                eprintln!("Log channel closed, message dropped");
            }
        }
    }
}
