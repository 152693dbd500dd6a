use std::collections::HashSet;

use crate::api::models::{Correspondent, Message};
use crate::utils::format_message_time;

pub fn line(message: &Message, me: &str, peer: Option<&Correspondent>) -> String {
    let who = if message.sender_id == me {
        "you".to_string()
    } else {
        peer.map(|p| p.name.clone()).unwrap_or_else(|| message.sender_id.clone())
    };
    let mut body = message.text.clone().unwrap_or_default();
    if message.image.is_some() {
        if !body.is_empty() {
            body.push(' ');
        }
        body.push_str("[image]");
    }
    format!("[{}] {who}: {body}  #{}", format_message_time(&message.created_at), message.id)
}

pub fn render(messages: &[Message], me: &str, peer: Option<&Correspondent>) -> Vec<String> {
    if messages.is_empty() {
        return vec!["  (no messages yet)".to_string()];
    }
    messages.iter().map(|m| line(m, me, peer)).collect()
}

/// Ids of the messages already printed, so a redraw only prints new ones
/// even after deletions shrink the history.
#[derive(Debug, Default)]
pub struct Shown {
    ids: HashSet<String>,
}

impl Shown {
    /// Everything in `messages` counts as printed from now on.
    pub fn reset(&mut self, messages: &[Message]) {
        self.ids = messages.iter().map(|m| m.id.clone()).collect();
    }

    /// Messages not printed yet, in history order. They are marked printed.
    pub fn fresh<'a>(&mut self, messages: &'a [Message]) -> Vec<&'a Message> {
        messages.iter().filter(|m| self.ids.insert(m.id.clone())).collect()
    }
}
