//! Slack Web API access.
//!
//! [`ChatApi`] is the narrow surface the adapter needs from Slack: create,
//! update and delete a message, and upload a file into a thread.
//! [`SlackClient`] implements it over HTTPS with `reqwest`; retry and
//! backoff are left to the caller.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::SlackOutputConfig;
use crate::error::{SlackApiError, SlackError, SlackResult};
use crate::messages::SlackMessageContent;

/// Timeout applied to every Web API request.
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Messaging operations against a chat platform.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Post a new message and return its `ts`.
    async fn post_message(
        &self,
        channel: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<String>;

    /// Overwrite the text and blocks of an existing message.
    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<()>;

    /// Delete a message.
    async fn delete_message(&self, channel: &str, ts: &str) -> SlackResult<()>;

    /// Upload a file into `channel`, optionally inside a thread.
    async fn upload_file(
        &self,
        channel: &str,
        data: Vec<u8>,
        thread_ts: Option<&str>,
        filename: &str,
    ) -> SlackResult<()>;
}

/// Slack Web API client authenticated with a bot token.
pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("base_url", &self.base_url)
            .field("bot_token", &"[REDACTED]")
            .finish()
    }
}

impl SlackClient {
    /// Create a client from the adapter configuration.
    pub fn new(config: &SlackOutputConfig) -> SlackResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| SlackError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bot_token: SecretString::new(config.bot_token().to_string().into()),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Make a JSON API call to Slack.
    async fn api_call(&self, method: &str, payload: &Value) -> SlackResult<Value> {
        let response = self
            .http
            .post(self.method_url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .header("Content-Type", "application/json; charset=utf-8")
            .json(payload)
            .send()
            .await?;

        Self::read_response(method, response).await
    }

    /// Make a form-encoded API call; some methods reject JSON bodies.
    async fn api_form_call(&self, method: &str, form: &[(&str, String)]) -> SlackResult<Value> {
        let response = self
            .http
            .post(self.method_url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .form(form)
            .send()
            .await?;

        Self::read_response(method, response).await
    }

    async fn read_response(method: &str, response: reqwest::Response) -> SlackResult<Value> {
        if response.status() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(30);
            return Err(SlackError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SlackError::Api(format!("{} {}: {}", method, status, body)));
        }

        let json: Value = response.json().await?;

        if json.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let error = json
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown");
            return Err(SlackApiError::new(error, format!("{} failed: {}", method, error)).into());
        }

        Ok(json)
    }
}

#[async_trait]
impl ChatApi for SlackClient {
    async fn post_message(
        &self,
        channel: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<String> {
        let mut payload = json!({
            "channel": channel,
            "text": content.text,
            "blocks": content.blocks,
            "unfurl_links": content.unfurl_links,
        });
        if let Some(thread_ts) = &content.thread_ts {
            payload["thread_ts"] = json!(thread_ts);
        }

        let response = self.api_call("chat.postMessage", &payload).await?;

        response
            .get("ts")
            .and_then(|ts| ts.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| SlackError::Api("Missing ts in response".to_string()))
    }

    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<()> {
        let payload = json!({
            "channel": channel,
            "ts": ts,
            "text": content.text,
            "blocks": content.blocks,
            "unfurl_links": content.unfurl_links,
        });

        self.api_call("chat.update", &payload).await?;
        Ok(())
    }

    async fn delete_message(&self, channel: &str, ts: &str) -> SlackResult<()> {
        let payload = json!({ "channel": channel, "ts": ts });
        self.api_call("chat.delete", &payload).await?;
        Ok(())
    }

    /// Three-step external upload: reserve a URL, send the bytes, then share
    /// the file into the channel.
    async fn upload_file(
        &self,
        channel: &str,
        data: Vec<u8>,
        thread_ts: Option<&str>,
        filename: &str,
    ) -> SlackResult<()> {
        let reserved = self
            .api_form_call(
                "files.getUploadURLExternal",
                &[
                    ("filename", filename.to_string()),
                    ("length", data.len().to_string()),
                ],
            )
            .await?;

        let upload_url = reserved
            .get("upload_url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SlackError::Api("Missing upload_url in response".to_string()))?;
        let file_id = reserved
            .get("file_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SlackError::Api("Missing file_id in response".to_string()))?;

        debug!("Uploading {} ({} bytes) as {}", filename, data.len(), file_id);

        let response = self.http.post(upload_url).body(data).send().await?;
        if !response.status().is_success() {
            return Err(SlackError::Api(format!(
                "File upload for {} failed: {}",
                filename,
                response.status()
            )));
        }

        let mut payload = json!({
            "files": [{ "id": file_id, "title": filename }],
            "channel_id": channel,
        });
        if let Some(ts) = thread_ts {
            payload["thread_ts"] = json!(ts);
        }

        self.api_call("files.completeUploadExternal", &payload).await?;
        Ok(())
    }
}
