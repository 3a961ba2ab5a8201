//! Inline-button callback payloads.

use std::fmt;
use std::str::FromStr;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use thiserror::Error;

/// Telegram rejects callback data longer than this.
pub const MAX_CALLBACK_DATA: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Stats,
    Help,
    Quiet,
}

#[derive(Debug, Error, PartialEq)]
pub enum CallbackError {
    #[error("empty callback data")]
    Empty,
    #[error("unknown callback data '{0}'")]
    Unknown(String),
}

impl CallbackAction {
    pub const ALL: [CallbackAction; 3] = [Self::Stats, Self::Help, Self::Quiet];

    pub fn as_data(self) -> &'static str {
        match self {
            Self::Stats => "menu:stats",
            Self::Help => "menu:help",
            Self::Quiet => "menu:quiet",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Stats => "📊 Stats",
            Self::Help => "❓ Help",
            Self::Quiet => "🔕 Quiet mode",
        }
    }

    pub fn button(self) -> InlineKeyboardButton {
        InlineKeyboardButton::callback(self.label(), self.as_data())
    }
}

impl FromStr for CallbackAction {
    type Err = CallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CallbackError::Empty);
        }
        Self::ALL
            .into_iter()
            .find(|a| a.as_data() == s)
            .ok_or_else(|| CallbackError::Unknown(s.chars().take(MAX_CALLBACK_DATA).collect()))
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_data())
    }
}

/// Main menu: stats and help on the first row, quiet toggle below.
pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![CallbackAction::Stats.button(), CallbackAction::Help.button()],
        vec![CallbackAction::Quiet.button()],
    ])
}
