//! Error types shared by the REST client, the channel and the stores.

use thiserror::Error;

/// Everything a user action can fail with.
///
/// HTTP failures keep the server's `message` field when the response body had
/// one, so the stores can show it verbatim.
#[derive(Error, Debug)]
pub enum Error {
    /// 401/403 from the backend
    #[error("authentication failed: {}", .message.as_deref().unwrap_or("unauthorized"))]
    Auth { message: Option<String> },

    /// 400/422 from the backend
    #[error("validation failed: {}", .message.as_deref().unwrap_or("bad request"))]
    Validation { message: Option<String> },

    /// 404, usually a stale id
    #[error("not found: {}", .message.as_deref().unwrap_or("no such resource"))]
    NotFound { message: Option<String> },

    /// Any other non-success status
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("server error"))]
    Server { status: u16, message: Option<String> },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("channel error: {0}")]
    Channel(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl Error {
    /// Map an HTTP status and optional server message onto the taxonomy.
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        match status {
            401 | 403 => Error::Auth { message },
            400 | 422 => Error::Validation { message },
            404 => Error::NotFound { message },
            _ => Error::Server { status, message },
        }
    }

    /// The server-supplied message, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Error::Auth { message }
            | Error::Validation { message }
            | Error::NotFound { message }
            | Error::Server { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Text to show the user: the server's message, else `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message()
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else if let Some(status) = e.status() {
            Error::from_status(status.as_u16(), None)
        } else {
            Error::Network(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Channel(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_maps_to_taxonomy() {
        assert!(matches!(Error::from_status(401, None), Error::Auth { .. }));
        assert!(matches!(Error::from_status(403, None), Error::Auth { .. }));
        assert!(matches!(Error::from_status(400, None), Error::Validation { .. }));
        assert!(matches!(Error::from_status(404, None), Error::NotFound { .. }));
        assert!(matches!(
            Error::from_status(500, None),
            Error::Server { status: 500, .. }
        ));
    }

    #[test]
    fn user_message_prefers_server_text() {
        let err = Error::from_status(400, Some("Email already taken".into()));
        assert_eq!(err.user_message("Error signing up"), "Email already taken");

        let err = Error::from_status(400, Some(String::new()));
        assert_eq!(err.user_message("Error signing up"), "Error signing up");

        assert_eq!(Error::Timeout.user_message("Error logging in"), "Error logging in");
    }
}
