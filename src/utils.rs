use chrono::{DateTime, Local, Utc};
use url::Url;

use crate::error::{Error, Result};

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Socket.IO endpoint for `server_url`, addressed to `user_id`.
pub fn channel_url(server_url: &str, user_id: &str) -> Result<Url> {
    let mut url = Url::parse(&normalize_url(server_url)).map_err(|e| Error::Config(e.to_string()))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| Error::Config(format!("cannot derive channel url from {server_url}")))?;
    url.set_path("/socket.io/");
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket")
        .append_pair("userId", user_id);
    Ok(url)
}

/// 24h `HH:MM` in local time.
pub fn format_message_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}
