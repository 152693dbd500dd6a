use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::api::ChatBackend;
use crate::api::models::{
    AuthEnvelope, Correspondent, ErrorBody, LastActivity, Message, OutgoingMessage,
    ProfileUpdate, SignInRequest, SignUpRequest, User,
};
use crate::app::ClientConfig;
use crate::error::{Error, Result};

/// REST client for the chat backend. The session lives in the cookie jar.
pub struct ApiClient {
    pub http: HttpClient,
    base_api: String,
    upload_timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_api: Self::base_api(&config.server_url),
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
        })
    }

    fn base_api(base_url: &str) -> String {
        let trimmed = base_url.trim_end_matches('/');
        if trimmed.ends_with("/api") { trimmed.to_string() } else { format!("{}/api", trimmed) }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_api, path)
    }

    /// Send a request and turn non-success statuses into typed errors,
    /// keeping the server's `message` when there is one.
    async fn execute(req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|b| b.message);
        Err(Error::from_status(status.as_u16(), message))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = Self::execute(self.http.get(self.url(path))).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let resp = Self::execute(self.http.post(self.url(path)).json(body)).await?;
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn check_auth(&self) -> Result<User> {
        self.get_json("/auth/check").await
    }

    async fn register(&self, data: &SignUpRequest) -> Result<User> {
        let env: AuthEnvelope = self.post_json("/auth/register", data).await?;
        Ok(env.user)
    }

    async fn login(&self, data: &SignInRequest) -> Result<User> {
        let env: AuthEnvelope = self.post_json("/auth/login", data).await?;
        Ok(env.user)
    }

    async fn logout(&self) -> Result<()> {
        Self::execute(self.http.post(self.url("/auth/logout"))).await?;
        Ok(())
    }

    async fn update_profile(&self, data: &ProfileUpdate) -> Result<User> {
        let req = self
            .http
            .put(self.url("/auth/update"))
            .timeout(self.upload_timeout)
            .json(data);
        let resp = Self::execute(req).await?;
        Ok(resp.json::<User>().await?)
    }

    async fn correspondents(&self) -> Result<Vec<Correspondent>> {
        self.get_json("/messages/users").await
    }

    async fn last_activities(&self) -> Result<Vec<LastActivity>> {
        self.get_json("/messages/last-activities").await
    }

    async fn messages(&self, correspondent_id: &str) -> Result<Vec<Message>> {
        self.get_json(&format!("/messages/{correspondent_id}")).await
    }

    async fn send_message(&self, correspondent_id: &str, payload: &OutgoingMessage) -> Result<Message> {
        self.post_json(&format!("/messages/send/{correspondent_id}"), payload).await
    }

    async fn mark_read(&self, correspondent_id: &str) -> Result<()> {
        Self::execute(self.http.post(self.url(&format!("/messages/read/{correspondent_id}")))).await?;
        Ok(())
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        Self::execute(self.http.delete(self.url(&format!("/messages/delete/{message_id}")))).await?;
        Ok(())
    }
}
