//! Bounded chat history

use chrono::{DateTime, Local};
use std::collections::VecDeque;

/// Entries kept per history; older ones are evicted first
pub const CHAT_CAPACITY: usize = 5;
/// Longest message content kept, in characters
pub const MAX_MESSAGE_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct Chat {
    pub message: String,
    pub sender: String,
    pub recipient: String,
    pub timestamp: DateTime<Local>,
}

impl Chat {
    pub fn new(message: Option<&str>, sender: &str, recipient: &str) -> Self {
        Self::at(message, sender, recipient, Local::now())
    }

    pub fn at(message: Option<&str>, sender: &str, recipient: &str, timestamp: DateTime<Local>) -> Self {
        let message = message
            .unwrap_or_default()
            .chars()
            .take(MAX_MESSAGE_CHARS)
            .collect();

        Self {
            message,
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            timestamp,
        }
    }

    pub fn format_line(&self) -> String {
        format!(
            "{} - {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.sender,
            self.message
        )
    }
}

#[derive(Debug, Default)]
pub struct ChatHandler {
    history: VecDeque<Chat>,
}

impl ChatHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chat(&mut self, chat: Chat) {
        self.history.push_back(chat);
        while self.history.len() > CHAT_CAPACITY {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &Chat> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn get_formatted_history(&self) -> String {
        let mut out = String::from("Chat History:\n");
        for chat in &self.history {
            out.push_str(&chat.format_line());
            out.push('\n');
        }
        out
    }
}
