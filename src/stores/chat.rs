use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error};

use crate::api::ChatBackend;
use crate::api::events::ChannelEvent;
use crate::api::models::{Correspondent, Message, OutgoingMessage};
use crate::channel::{Channel, Listener};
use crate::notice::Notifier;

/// Unread first, then most recent activity first. Missing activity counts as
/// the epoch.
pub fn roster_order(a: &Correspondent, b: &Correspondent) -> Ordering {
    b.has_unread
        .cmp(&a.has_unread)
        .then_with(|| activity_key(b).cmp(&activity_key(a)))
}

fn activity_key(c: &Correspondent) -> i64 {
    c.last_activity.map_or(0, |t| t.timestamp_millis())
}

/// Conversation state plus the reconciler that folds channel events into it.
///
/// History never holds two messages with the same id, whichever of the HTTP
/// response or the channel echo lands first.
pub struct ChatStore {
    backend: Arc<dyn ChatBackend>,
    notifier: Notifier,
    messages: Vec<Message>,
    roster: Vec<Correspondent>,
    selected: Option<Correspondent>,
    unread_counts: HashMap<String, u32>,
    listener: Listener,
    pub is_users_loading: bool,
    pub is_messages_loading: bool,
}

impl ChatStore {
    pub fn new(backend: Arc<dyn ChatBackend>, notifier: Notifier) -> Self {
        Self {
            backend,
            notifier,
            messages: Vec::new(),
            roster: Vec::new(),
            selected: None,
            unread_counts: HashMap::new(),
            listener: Listener::default(),
            is_users_loading: false,
            is_messages_loading: false,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn roster(&self) -> &[Correspondent] {
        &self.roster
    }

    pub fn sorted_roster(&self) -> Vec<&Correspondent> {
        let mut sorted: Vec<&Correspondent> = self.roster.iter().collect();
        sorted.sort_by(|a, b| roster_order(a, b));
        sorted
    }

    pub fn correspondent(&self, id: &str) -> Option<&Correspondent> {
        self.roster.iter().find(|c| c.id == id)
    }

    pub fn selected(&self) -> Option<&Correspondent> {
        self.selected.as_ref()
    }

    fn is_selected(&self, id: &str) -> bool {
        self.selected.as_ref().is_some_and(|c| c.id == id)
    }

    pub fn unread_count(&self, id: &str) -> u32 {
        self.unread_counts.get(id).copied().unwrap_or(0)
    }

    pub fn unread_counts(&self) -> &HashMap<String, u32> {
        &self.unread_counts
    }

    /// Drop everything, e.g. after sign-out.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.roster.clear();
        self.selected = None;
        self.unread_counts.clear();
        self.listener.detach();
    }

    /// Fetch the roster, keeping the unread/activity state we already track.
    pub async fn load_roster(&mut self) -> bool {
        self.is_users_loading = true;
        let ok = match self.backend.correspondents().await {
            Ok(fetched) => {
                let merged: Vec<Correspondent> = fetched
                    .into_iter()
                    .map(|mut c| {
                        let known = self.correspondent(&c.id);
                        c.has_unread = known.is_some_and(|k| k.has_unread) || self.unread_count(&c.id) > 0;
                        c.last_activity = known.and_then(|k| k.last_activity).or(c.last_activity);
                        c
                    })
                    .collect();
                self.roster = merged;
                self.refresh_activity().await;
                true
            }
            Err(e) => {
                self.notifier.error(e.user_message("Error loading users"));
                false
            }
        };
        self.is_users_loading = false;
        ok
    }

    /// Pull last-activity timestamps for sorting. Housekeeping: failures are
    /// only logged.
    pub async fn refresh_activity(&mut self) {
        let activities = match self.backend.last_activities().await {
            Ok(a) => a,
            Err(e) => {
                debug!("failed to fetch last activities: {e}");
                return;
            }
        };
        for c in &mut self.roster {
            if let Some(a) = activities.iter().find(|a| a.user_id == c.id) {
                c.last_activity = Some(a.timestamp);
            }
        }
    }

    /// Replace history with the conversation for `id`. Refused without a
    /// request while a different correspondent is selected.
    pub async fn load_messages(&mut self, id: &str) -> bool {
        if self.selected.as_ref().is_some_and(|c| c.id != id) {
            debug!("not loading history for {id}, another conversation is open");
            return false;
        }
        self.is_messages_loading = true;
        let ok = match self.backend.messages(id).await {
            Ok(history) => {
                self.messages = history;
                if self.is_selected(id) {
                    self.mark_read(id).await;
                }
                true
            }
            Err(e) => {
                self.notifier.error(e.user_message("Error loading messages"));
                false
            }
        };
        self.is_messages_loading = false;
        ok
    }

    /// Clear local unread state for `id` and tell the server.
    pub async fn mark_read(&mut self, id: &str) {
        self.clear_unread(id);
        self.send_read_receipt(id).await;
    }

    fn clear_unread(&mut self, id: &str) {
        for c in self.roster.iter_mut().filter(|c| c.id == id) {
            c.has_unread = false;
        }
        if let Some(sel) = self.selected.as_mut().filter(|c| c.id == id) {
            sel.has_unread = false;
        }
        self.unread_counts.insert(id.to_string(), 0);
    }

    async fn send_read_receipt(&self, id: &str) {
        if let Err(e) = self.backend.mark_read(id).await {
            debug!("failed to mark messages from {id} as read: {e}");
        }
    }

    fn mark_unread(&mut self, id: &str) {
        *self.unread_counts.entry(id.to_string()).or_insert(0) += 1;
        for c in self.roster.iter_mut().filter(|c| c.id == id) {
            c.has_unread = true;
        }
    }

    fn touch_activity(&mut self, id: &str, at: DateTime<Utc>) {
        for c in self.roster.iter_mut().filter(|c| c.id == id) {
            if c.last_activity.is_none_or(|prev| prev < at) {
                c.last_activity = Some(at);
            }
        }
    }

    /// Append unless a message with the same id is already there.
    fn push_unique(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Send to the selected correspondent. Without a selection nothing happens.
    pub async fn send_message(&mut self, payload: &OutgoingMessage) -> Option<Message> {
        let to = self.selected.as_ref()?.id.clone();
        match self.backend.send_message(&to, payload).await {
            Ok(message) => {
                self.touch_activity(&to, message.created_at);
                self.push_unique(message.clone());
                Some(message)
            }
            Err(e) => {
                error!("sending message to {to} failed: {e}");
                self.notifier.error(e.user_message("Failed to send message"));
                None
            }
        }
    }

    /// Removed locally only once the server confirms.
    pub async fn delete_message(&mut self, message_id: &str) -> bool {
        match self.backend.delete_message(message_id).await {
            Ok(()) => {
                self.remove_message(message_id);
                self.notifier.success("Message deleted");
                true
            }
            Err(e) => {
                error!("deleting message {message_id} failed: {e}");
                self.notifier.error(e.user_message("Error deleting message"));
                false
            }
        }
    }

    fn remove_message(&mut self, message_id: &str) {
        self.messages.retain(|m| m.id != message_id);
    }

    /// `None` clears history. Selecting someone with unread messages marks
    /// them read; history itself is replaced by the following `load_messages`.
    pub async fn select_correspondent(&mut self, correspondent: Option<Correspondent>) {
        let Some(c) = correspondent else {
            self.selected = None;
            self.messages.clear();
            return;
        };
        let id = c.id.clone();
        let unread = c.has_unread
            || self.correspondent(&id).is_some_and(|k| k.has_unread)
            || self.unread_count(&id) > 0;
        self.selected = Some(c);
        if unread {
            self.mark_read(&id).await;
        }
    }

    /// Attach to `channel`, replacing any previous subscription.
    pub fn subscribe_to_channel(&mut self, channel: &Channel) {
        debug!("conversation listener bound to channel for {}", channel.user_id());
        self.listener.rebind(channel);
    }

    pub fn unsubscribe_from_channel(&mut self) {
        self.listener.detach();
    }

    pub fn is_subscribed(&self) -> bool {
        self.listener.is_bound()
    }

    /// Wait for the next channel event without reconciling it. Cancel safe,
    /// so it can sit in a `select!` arm; pends forever while unsubscribed.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.listener.next().await
    }

    /// Wait for the next channel event and reconcile it. `false` once the
    /// channel is gone.
    pub async fn process_next_event(&mut self) -> bool {
        match self.next_event().await {
            Some(ev) => {
                self.handle_event(ev).await;
                true
            }
            None => false,
        }
    }

    /// Reconcile every event already delivered, without waiting.
    pub async fn drain_events(&mut self) -> usize {
        let mut n = 0;
        while let Some(ev) = self.listener.try_next() {
            self.handle_event(ev).await;
            n += 1;
        }
        n
    }

    pub async fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::NewMessage(message) => {
                let from = message.sender_id.clone();
                self.touch_activity(&from, message.created_at);
                if self.is_selected(&from) {
                    if self.push_unique(message) {
                        self.send_read_receipt(&from).await;
                    }
                } else {
                    self.mark_unread(&from);
                    if let Some(sender) = self.correspondent(&from) {
                        self.notifier.info(format!("New message from {}", sender.full_name()));
                    }
                }
            }
            ChannelEvent::MessageSent(message) => {
                let to = message.receiver_id.clone();
                self.touch_activity(&to, message.created_at);
                if self.is_selected(&to) {
                    self.push_unique(message);
                }
            }
            ChannelEvent::MessageDeleted { message_id } => self.remove_message(&message_id),
            ChannelEvent::OnlineUsers(_) => {}
        }
    }
}
