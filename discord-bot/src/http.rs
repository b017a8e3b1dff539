use async_trait::async_trait;
use memebot_core::{CoreError, DiscordError};
use reqwest::{Method, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

pub const API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";

/// Where replies go. The bot only ever posts embeds and typing indicators.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send_embed(&self, channel_id: &str, embed: Value) -> Result<(), CoreError>;
    async fn send_typing(&self, channel_id: &str) -> Result<(), CoreError>;
}

pub struct DiscordHttpClient {
    client: reqwest::Client,
    bot_token: String,
}

impl DiscordHttpClient {
    pub fn new(bot_token: impl Into<String>, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            bot_token: bot_token.into(),
        })
    }

    /// WebSocket URL from `GET /gateway/bot`, falling back to the public gateway.
    pub async fn gateway_url(&self) -> Result<String, CoreError> {
        let response = self.request(Method::GET, "/gateway/bot", None).await?;
        let body: Value = response.json().await?;
        Ok(body
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_GATEWAY_URL)
            .to_string())
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", API_BASE, path);
        debug!("Discord {} {}", method, path);

        let mut builder = self
            .client
            .request(method, &url)
            .header("Authorization", format!("Bot {}", self.bot_token));
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<failed to read response body: {}>", e));
        warn!("Discord request to {} failed ({}): {}", path, status, body);
        Err(DiscordError::RequestFailed {
            endpoint: path.to_string(),
            status_code: status.as_u16(),
            body,
        }
        .into())
    }
}

#[async_trait]
impl ReplySink for DiscordHttpClient {
    async fn send_embed(&self, channel_id: &str, embed: Value) -> Result<(), CoreError> {
        let path = format!("/channels/{}/messages", channel_id);
        self.request(Method::POST, &path, Some(json!({ "embeds": [embed] })))
            .await?;
        Ok(())
    }

    async fn send_typing(&self, channel_id: &str) -> Result<(), CoreError> {
        let path = format!("/channels/{}/typing", channel_id);
        self.request(Method::POST, &path, None).await?;
        Ok(())
    }
}
