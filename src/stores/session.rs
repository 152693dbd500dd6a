use std::sync::Arc;

use log::{debug, error, info};

use crate::api::ChatBackend;
use crate::api::events::ChannelEvent;
use crate::api::models::{ProfileUpdate, SignInRequest, SignUpRequest, User};
use crate::channel::{Channel, Connector, Listener};
use crate::error::{Error, Result};
use crate::imaging;
use crate::notice::Notifier;

/// Who is signed in, the auth flags guards wait on, and the channel keyed to
/// that user.
pub struct SessionStore {
    backend: Arc<dyn ChatBackend>,
    connector: Arc<dyn Connector>,
    notifier: Notifier,
    user: Option<User>,
    online_users: Vec<String>,
    channel: Option<Channel>,
    presence: Listener,
    pub is_signing_up: bool,
    pub is_logging_in: bool,
    pub is_updating_profile: bool,
    /// Starts out `true` so route guards wait for the first check.
    pub is_checking_auth: bool,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn ChatBackend>, connector: Arc<dyn Connector>, notifier: Notifier) -> Self {
        Self {
            backend,
            connector,
            notifier,
            user: None,
            online_users: Vec::new(),
            channel: None,
            presence: Listener::default(),
            is_signing_up: false,
            is_logging_in: false,
            is_updating_profile: false,
            is_checking_auth: true,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn full_name(&self) -> String {
        self.user.as_ref().map(User::full_name).unwrap_or_default()
    }

    pub fn online_users(&self) -> &[String] {
        &self.online_users
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online_users.iter().any(|id| id == user_id)
    }

    /// The open channel, for other stores to attach listeners to.
    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    pub async fn check_session(&mut self) -> bool {
        self.is_checking_auth = true;
        let ok = match self.backend.check_auth().await {
            Ok(user) => {
                self.user = Some(user);
                self.connect_channel();
                true
            }
            Err(e) => {
                debug!("no active session: {e}");
                self.user = None;
                false
            }
        };
        self.is_checking_auth = false;
        ok
    }

    pub async fn sign_up(&mut self, data: &SignUpRequest) -> bool {
        self.is_signing_up = true;
        let res = self.backend.register(data).await;
        let ok = self.accept_identity(res, "Account created successfully", "Error signing up");
        self.is_signing_up = false;
        ok
    }

    pub async fn sign_in(&mut self, data: &SignInRequest) -> bool {
        self.is_logging_in = true;
        let res = self.backend.login(data).await;
        let ok = self.accept_identity(res, "Logged in successfully", "Error logging in");
        self.is_logging_in = false;
        ok
    }

    fn accept_identity(&mut self, res: Result<User>, success: &str, fallback: &str) -> bool {
        match res {
            Ok(user) => {
                info!("signed in as {}", user.username);
                self.user = Some(user);
                self.notifier.success(success);
                self.connect_channel();
                true
            }
            Err(e) => {
                self.notifier.error(e.user_message(fallback));
                false
            }
        }
    }

    /// Identity and channel are only dropped once the server confirms.
    pub async fn sign_out(&mut self) -> bool {
        match self.backend.logout().await {
            Ok(()) => {
                self.user = None;
                self.online_users.clear();
                self.notifier.success("Logged out successfully");
                self.disconnect_channel();
                true
            }
            Err(e) => {
                self.notifier.error(e.user_message("Error logging out"));
                false
            }
        }
    }

    pub async fn update_profile(&mut self, data: ProfileUpdate) -> bool {
        self.is_updating_profile = true;
        let loading = self.notifier.loading("Updating profile...");

        let res = self.submit_profile(data, loading).await;
        self.notifier.dismiss(loading);
        let ok = match res {
            Ok(user) => {
                self.user = Some(user);
                self.notifier.success("Profile updated successfully");
                true
            }
            Err(e) => {
                error!("profile update failed: {e}");
                self.notifier.error(e.user_message("Error updating profile"));
                false
            }
        };
        self.is_updating_profile = false;
        ok
    }

    async fn submit_profile(&self, mut data: ProfileUpdate, loading: u64) -> Result<User> {
        if let Some(picture) = data.profile_picture.take() {
            let picture = if imaging::needs_compression(&picture) {
                self.notifier.update(loading, "Compressing picture...");
                tokio::task::spawn_blocking(move || imaging::prepare_profile_picture(picture))
                    .await
                    .map_err(|e| Error::Image(e.to_string()))??
            } else {
                picture
            };
            data.profile_picture = Some(picture);
        }
        self.backend.update_profile(&data).await
    }

    /// Open the channel for the current user unless one is already live.
    pub fn connect_channel(&mut self) {
        let Some(user) = self.user.as_ref() else {
            return;
        };
        if self.channel.as_ref().is_some_and(Channel::is_active) {
            return;
        }
        match self.connector.open(&user.id) {
            Ok(channel) => {
                self.presence.rebind(&channel);
                self.channel = Some(channel);
            }
            Err(e) => error!("could not open channel: {e}"),
        }
    }

    pub fn disconnect_channel(&mut self) {
        self.presence.detach();
        if let Some(mut channel) = self.channel.take() {
            channel.disconnect();
        }
    }

    pub fn apply_presence(&mut self, user_ids: Vec<String>) {
        self.online_users = user_ids;
    }

    /// Wait for the next presence update and apply it. `false` once the
    /// channel is gone.
    pub async fn next_presence(&mut self) -> bool {
        loop {
            match self.presence.next().await {
                Some(ChannelEvent::OnlineUsers(ids)) => {
                    self.apply_presence(ids);
                    return true;
                }
                Some(_) => continue,
                None => return false,
            }
        }
    }
}
