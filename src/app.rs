use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::api::ChatBackend;
use crate::api::client::ApiClient;
use crate::channel::{Connector, WsConnector};
use crate::error::{Error, Result};
use crate::notice::Notifier;
use crate::storage::Preferences;
use crate::stores::{ChatStore, SessionStore, ThemeStore};

fn default_server_url() -> String {
    "http://localhost:5000".into()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_upload_timeout() -> u64 {
    60
}

fn default_reconnection_attempts() -> u32 {
    5
}

fn default_reconnection_delay() -> u64 {
    1000
}

/// Client settings, kept as TOML in the platform config dir.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Profile updates can carry an image, so they get longer.
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
    #[serde(default = "default_reconnection_attempts")]
    pub reconnection_attempts: u32,
    #[serde(default = "default_reconnection_delay")]
    pub reconnection_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            request_timeout_secs: default_request_timeout(),
            upload_timeout_secs: default_upload_timeout(),
            reconnection_attempts: default_reconnection_attempts(),
            reconnection_delay_ms: default_reconnection_delay(),
        }
    }
}

impl ClientConfig {
    pub fn default_path() -> Option<PathBuf> {
        let proj = ProjectDirs::from("com", "example", "chatter")?;
        Some(proj.config_dir().join("chatter.toml"))
    }

    /// Read the settings at `path`, or defaults when the file is missing or
    /// can't be parsed.
    pub fn load(path: &Path) -> Self {
        let Ok(text) = fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str::<ClientConfig>(&text) {
            Ok(mut cfg) => {
                cfg.server_url = crate::utils::normalize_url(&cfg.server_url);
                cfg
            }
            Err(e) => {
                log::warn!("ignoring unreadable config {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Config(e.to_string()))?;
        }
        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Everything one client run owns: the stores, wired to one backend and one
/// notice queue.
pub struct App {
    pub session: SessionStore,
    pub chat: ChatStore,
    pub theme: ThemeStore,
}

impl App {
    pub fn new(config: &ClientConfig, prefs: Preferences, notifier: Notifier) -> Result<Self> {
        let backend: Arc<dyn ChatBackend> = Arc::new(ApiClient::new(config)?);
        let connector: Arc<dyn Connector> = Arc::new(WsConnector::new(config)?);
        Ok(Self::with_parts(backend, connector, prefs, notifier))
    }

    pub fn with_parts(
        backend: Arc<dyn ChatBackend>,
        connector: Arc<dyn Connector>,
        prefs: Preferences,
        notifier: Notifier,
    ) -> Self {
        Self {
            session: SessionStore::new(backend.clone(), connector, notifier.clone()),
            chat: ChatStore::new(backend, notifier),
            theme: ThemeStore::load(prefs),
        }
    }

    /// Bind the conversation store to whatever channel the session holds now.
    pub fn rebind_channel(&mut self) {
        match self.session.channel() {
            Some(channel) => self.chat.subscribe_to_channel(channel),
            None => self.chat.unsubscribe_from_channel(),
        }
    }

    /// Session sign-out plus conversation teardown on success.
    pub async fn sign_out(&mut self) -> bool {
        if !self.session.sign_out().await {
            return false;
        }
        self.chat.unsubscribe_from_channel();
        self.chat.reset();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ClientConfig::load(&dir.path().join("nope.toml"));
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn save_then_load_keeps_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chatter.toml");
        let cfg = ClientConfig {
            server_url: "https://chat.example".into(),
            reconnection_attempts: 2,
            ..ClientConfig::default()
        };
        cfg.save(&path).unwrap();
        assert_eq!(ClientConfig::load(&path), cfg);
    }

    #[test]
    fn partial_file_fills_defaults_and_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatter.toml");
        fs::write(&path, "server_url = \"chat.example/\"\n").unwrap();
        let cfg = ClientConfig::load(&path);
        assert_eq!(cfg.server_url, "https://chat.example");
        assert_eq!(cfg.upload_timeout_secs, 60);
    }
}
