pub mod client;
pub mod events;
pub mod models;

use async_trait::async_trait;

use crate::error::Result;
use models::{
    Correspondent, LastActivity, Message, OutgoingMessage, ProfileUpdate, SignInRequest,
    SignUpRequest, User,
};

/// Every REST call the stores make. `ApiClient` is the HTTP implementation;
/// tests script their own.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn check_auth(&self) -> Result<User>;
    async fn register(&self, data: &SignUpRequest) -> Result<User>;
    async fn login(&self, data: &SignInRequest) -> Result<User>;
    async fn logout(&self) -> Result<()>;
    /// Sent with the longer upload timeout.
    async fn update_profile(&self, data: &ProfileUpdate) -> Result<User>;

    async fn correspondents(&self) -> Result<Vec<Correspondent>>;
    async fn last_activities(&self) -> Result<Vec<LastActivity>>;
    async fn messages(&self, correspondent_id: &str) -> Result<Vec<Message>>;
    async fn send_message(&self, correspondent_id: &str, payload: &OutgoingMessage) -> Result<Message>;
    async fn mark_read(&self, correspondent_id: &str) -> Result<()>;
    async fn delete_message(&self, message_id: &str) -> Result<()>;
}
