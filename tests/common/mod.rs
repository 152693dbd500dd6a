#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

use chatter::api::ChatBackend;
use chatter::api::models::{
    Correspondent, LastActivity, Message, OutgoingMessage, ProfileUpdate, SignInRequest,
    SignUpRequest, User,
};
use chatter::channel::{Channel, ChannelFeed, Connector};
use chatter::notice::Notice;
use chatter::{Error, Result};

pub const ME: &str = "me";

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn user(id: &str) -> User {
    User {
        id: id.into(),
        name: "Test".into(),
        last_name: "User".into(),
        username: "tester".into(),
        email: "tester@example.com".into(),
        date_of_birth: "1990-01-01".into(),
        profile_picture: None,
        bio: None,
        created_at: None,
    }
}

pub fn person(id: &str, name: &str) -> Correspondent {
    Correspondent {
        id: id.into(),
        name: name.into(),
        last_name: "Doe".into(),
        profile_picture: None,
        last_activity: None,
        has_unread: false,
    }
}

pub fn msg(id: &str, from: &str, to: &str, text: &str, secs: i64) -> Message {
    Message {
        id: id.into(),
        sender_id: from.into(),
        receiver_id: to.into(),
        text: Some(text.into()),
        image: None,
        created_at: at(secs),
    }
}

/// What the scripted backend answers and what it was asked.
#[derive(Default)]
pub struct Script {
    pub me: Option<User>,
    pub roster: Vec<Correspondent>,
    pub activities: Vec<LastActivity>,
    pub histories: HashMap<String, Vec<Message>>,
    /// Id the next sent message gets.
    pub next_message_id: String,
    /// Endpoint names that should fail, with the server message to return.
    pub failing: HashMap<&'static str, Option<String>>,
    pub calls: Vec<String>,
    pub profile_updates: Vec<ProfileUpdate>,
    /// Makes read receipts slow; finished ones are logged as `mark_read done <id>`.
    pub mark_read_delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    pub script: Arc<Mutex<Script>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F: FnOnce(&mut Script)>(&self, f: F) {
        f(&mut self.script.lock().unwrap());
    }

    pub fn fail(&self, endpoint: &'static str, message: Option<&str>) {
        self.with(|s| {
            s.failing.insert(endpoint, message.map(str::to_string));
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    fn enter(&self, endpoint: &'static str, detail: &str) -> Result<std::sync::MutexGuard<'_, Script>> {
        let mut script = self.script.lock().unwrap();
        let call = if detail.is_empty() { endpoint.to_string() } else { format!("{endpoint} {detail}") };
        script.calls.push(call);
        if let Some(message) = script.failing.get(endpoint) {
            return Err(Error::from_status(400, message.clone()));
        }
        Ok(script)
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn check_auth(&self) -> Result<User> {
        let s = self.enter("check_auth", "")?;
        s.me.clone().ok_or(Error::Auth { message: Some("Unauthorized".into()) })
    }

    async fn register(&self, data: &SignUpRequest) -> Result<User> {
        let s = self.enter("register", &data.email)?;
        Ok(s.me.clone().unwrap_or_else(|| user(ME)))
    }

    async fn login(&self, data: &SignInRequest) -> Result<User> {
        let s = self.enter("login", &data.email)?;
        Ok(s.me.clone().unwrap_or_else(|| user(ME)))
    }

    async fn logout(&self) -> Result<()> {
        self.enter("logout", "")?;
        Ok(())
    }

    async fn update_profile(&self, data: &ProfileUpdate) -> Result<User> {
        let mut s = self.enter("update_profile", "")?;
        s.profile_updates.push(data.clone());
        let mut updated = s.me.clone().unwrap_or_else(|| user(ME));
        updated.name = data.name.clone();
        updated.bio = Some(data.bio.clone());
        updated.profile_picture = data.profile_picture.clone();
        Ok(updated)
    }

    async fn correspondents(&self) -> Result<Vec<Correspondent>> {
        let s = self.enter("correspondents", "")?;
        Ok(s.roster.clone())
    }

    async fn last_activities(&self) -> Result<Vec<LastActivity>> {
        let s = self.enter("last_activities", "")?;
        Ok(s.activities.clone())
    }

    async fn messages(&self, correspondent_id: &str) -> Result<Vec<Message>> {
        let s = self.enter("messages", correspondent_id)?;
        Ok(s.histories.get(correspondent_id).cloned().unwrap_or_default())
    }

    async fn send_message(&self, correspondent_id: &str, payload: &OutgoingMessage) -> Result<Message> {
        let s = self.enter("send_message", correspondent_id)?;
        Ok(Message {
            id: s.next_message_id.clone(),
            sender_id: ME.into(),
            receiver_id: correspondent_id.into(),
            text: payload.text.clone(),
            image: payload.image.clone(),
            created_at: at(500),
        })
    }

    async fn mark_read(&self, correspondent_id: &str) -> Result<()> {
        let delay = self.enter("mark_read", correspondent_id)?.mark_read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
            self.with(|s| s.calls.push(format!("mark_read done {correspondent_id}")));
        }
        Ok(())
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.enter("delete_message", message_id)?;
        Ok(())
    }
}

/// Hands out local channels and keeps their feeds for the test to drive.
#[derive(Default)]
pub struct MockConnector {
    pub feeds: Mutex<Vec<(String, ChannelFeed)>>,
}

impl MockConnector {
    pub fn opened(&self) -> usize {
        self.feeds.lock().unwrap().len()
    }

    pub fn feed(&self) -> ChannelFeed {
        self.feeds.lock().unwrap().last().expect("no channel opened").1.clone()
    }
}

impl Connector for MockConnector {
    fn open(&self, user_id: &str) -> Result<Channel> {
        let (channel, feed) = Channel::local(user_id);
        self.feeds.lock().unwrap().push((user_id.to_string(), feed));
        Ok(channel)
    }
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<Notice>) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

pub fn shown_texts(notices: &[Notice]) -> Vec<String> {
    notices
        .iter()
        .filter_map(|n| match n {
            Notice::Show { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}
