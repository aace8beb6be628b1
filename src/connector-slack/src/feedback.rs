//! Forwarding of thumbs up/down feedback.
//!
//! Each button press becomes one JSON POST to the configured endpoint.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::FeedbackConfig;
use crate::error::{SlackError, SlackResult};
use crate::messages::{THUMBS_DOWN_ACTION, THUMBS_UP_ACTION};

const FEEDBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Which button was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    ThumbsUp,
    ThumbsDown,
}

impl FeedbackKind {
    /// Button action id carrying this feedback.
    pub fn action_id(self) -> &'static str {
        match self {
            FeedbackKind::ThumbsUp => THUMBS_UP_ACTION,
            FeedbackKind::ThumbsDown => THUMBS_DOWN_ACTION,
        }
    }
}

/// Channel data attached to a feedback record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceData {
    pub channel: Value,
}

/// Body of the feedback POST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// The `user` object of the action payload.
    pub user: Value,
    pub feedback: FeedbackKind,
    /// Always `"slack"`.
    pub interface: String,
    pub interface_data: InterfaceData,
    /// The message the buttons were attached to.
    pub message: Value,
    /// Decoded button value.
    pub data: Value,
}

impl FeedbackRecord {
    pub fn new(
        user: Value,
        feedback: FeedbackKind,
        channel: Value,
        message: Value,
        data: Value,
    ) -> Self {
        Self {
            user,
            feedback,
            interface: "slack".to_string(),
            interface_data: InterfaceData { channel },
            message,
            data,
        }
    }
}

/// Posts feedback records to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct FeedbackForwarder {
    http: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl FeedbackForwarder {
    pub fn new(config: &FeedbackConfig) -> SlackResult<Self> {
        let url = config
            .post_url
            .clone()
            .ok_or_else(|| SlackError::Config("feedback_post_url is not set".to_string()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.post_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SlackError::Config(format!("Invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SlackError::Config(format!("Invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .timeout(FEEDBACK_TIMEOUT)
            .build()
            .map_err(|e| SlackError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, url, headers })
    }

    /// Send one record.
    pub async fn forward(&self, record: &FeedbackRecord) -> SlackResult<()> {
        debug!("Forwarding {:?} feedback to {}", record.feedback, self.url);

        let response = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .json(record)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SlackError::Feedback(format!(
                "Feedback endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
