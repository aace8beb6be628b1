//! Configuration for the Slack output adapter.
//!
//! Settings come from `SLACK_*` environment variables or from a TOML file
//! whose keys match the connector's component config (`slack_bot_token`,
//! `feedback_post_url`, ...).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{SlackError, SlackResult};

/// Default Slack Web API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://slack.com/api";

/// Default issue tracker link used for issue-key table rows.
pub const DEFAULT_ISSUE_URL_TEMPLATE: &str = "https://sol-jira.atlassian.net/browse/{key}";

/// Default per-file and total upload limits, in megabytes.
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 20;

/// Default lifetime of a stream state entry.
pub const DEFAULT_STREAM_TTL: Duration = Duration::from_secs(60);

/// Default maximum number of tracked streams.
pub const DEFAULT_STREAM_CAPACITY: usize = 1024;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Where thumbs up/down feedback is forwarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedbackConfig {
    /// Whether feedback buttons are attached and handled.
    pub enabled: bool,
    /// Endpoint receiving the feedback record.
    pub post_url: Option<String>,
    /// Extra headers sent with the feedback POST.
    pub post_headers: HashMap<String, String>,
}

/// Configuration for the Slack output adapter.
#[derive(Clone)]
pub struct SlackOutputConfig {
    /// Bot OAuth token (xoxb-...).
    bot_token: SecretString,
    /// App-level token (xapp-...). Only needed by the connection owner.
    app_token: Option<SecretString>,
    /// Reuse one client per bot token across adapter instances.
    pub share_slack_connection: bool,
    /// Rewrite LLM markdown into Slack mrkdwn.
    pub correct_markdown_formatting: bool,
    /// Largest single attachment, in megabytes.
    pub max_file_size_mb: u64,
    /// Largest total attachment size per unit, in megabytes.
    pub max_total_file_size_mb: u64,
    /// Feedback button handling.
    pub feedback: FeedbackConfig,
    /// Link template for issue-key rows; `{key}` is substituted.
    pub issue_url_template: String,
    /// Slack Web API base URL.
    pub api_base_url: String,
    /// Lifetime of a stream state entry, counted from the stream's first
    /// chunk. Must exceed the longest streamed reply.
    pub stream_ttl: Duration,
    /// Maximum number of tracked streams.
    pub stream_capacity: usize,
}

impl std::fmt::Debug for SlackOutputConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackOutputConfig")
            .field("bot_token", &"[REDACTED]")
            .field("app_token", &self.app_token.as_ref().map(|_| "[REDACTED]"))
            .field("share_slack_connection", &self.share_slack_connection)
            .field(
                "correct_markdown_formatting",
                &self.correct_markdown_formatting,
            )
            .field("max_file_size_mb", &self.max_file_size_mb)
            .field("max_total_file_size_mb", &self.max_total_file_size_mb)
            .field("feedback_enabled", &self.feedback.enabled)
            .field("feedback_post_url", &self.feedback.post_url)
            .field("issue_url_template", &self.issue_url_template)
            .field("api_base_url", &self.api_base_url)
            .field("stream_ttl", &self.stream_ttl)
            .field("stream_capacity", &self.stream_capacity)
            .finish()
    }
}

/// On-disk layout. Key names follow the connector's component config.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    slack_bot_token: String,
    #[serde(default)]
    slack_app_token: Option<String>,
    #[serde(default)]
    share_slack_connection: bool,
    #[serde(default = "default_true")]
    correct_markdown_formatting: bool,
    #[serde(default = "default_max_file_size")]
    max_file_size: u64,
    #[serde(default = "default_max_file_size")]
    max_total_file_size: u64,
    #[serde(default)]
    feedback: bool,
    #[serde(default)]
    feedback_post_url: Option<String>,
    #[serde(default)]
    feedback_post_headers: HashMap<String, String>,
    #[serde(default)]
    issue_url_template: Option<String>,
    #[serde(default)]
    api_base_url: Option<String>,
    #[serde(default)]
    stream_ttl_secs: Option<u64>,
    #[serde(default)]
    stream_capacity: Option<usize>,
}

fn default_true() -> bool {
    true
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE_MB
}

impl SlackOutputConfig {
    /// Create a configuration with defaults for everything but the bot token.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: SecretString::new(bot_token.into().into()),
            app_token: None,
            share_slack_connection: false,
            correct_markdown_formatting: true,
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            max_total_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            feedback: FeedbackConfig::default(),
            issue_url_template: DEFAULT_ISSUE_URL_TEMPLATE.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            stream_ttl: DEFAULT_STREAM_TTL,
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }

    /// Set the app-level token.
    pub fn with_app_token(mut self, app_token: impl Into<String>) -> Self {
        self.app_token = Some(SecretString::new(app_token.into().into()));
        self
    }

    /// Enable feedback forwarding to `post_url`.
    pub fn with_feedback(
        mut self,
        post_url: impl Into<String>,
        post_headers: HashMap<String, String>,
    ) -> Self {
        self.feedback = FeedbackConfig {
            enabled: true,
            post_url: Some(post_url.into()),
            post_headers,
        };
        self
    }

    /// Point the client at a different Web API base URL.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Required variables:
    /// - `SLACK_BOT_TOKEN`
    ///
    /// Optional variables:
    /// - `SLACK_APP_TOKEN`
    /// - `SLACK_SHARE_CONNECTION`
    /// - `SLACK_CORRECT_MARKDOWN`
    /// - `SLACK_MAX_FILE_SIZE`, `SLACK_MAX_TOTAL_FILE_SIZE` (megabytes)
    /// - `SLACK_FEEDBACK_ENABLED`, `SLACK_FEEDBACK_URL`
    /// - `SLACK_ISSUE_URL_TEMPLATE`
    /// - `SLACK_API_BASE_URL`
    pub fn from_env() -> SlackResult<Self> {
        let bot_token = std::env::var("SLACK_BOT_TOKEN")
            .map_err(|_| SlackError::Config("SLACK_BOT_TOKEN is required".to_string()))?;

        if !bot_token.starts_with("xoxb-") {
            warn!("SLACK_BOT_TOKEN is not a bot token (expected an xoxb- prefix)");
        }

        let mut config = Self::new(bot_token);

        if let Ok(app_token) = std::env::var("SLACK_APP_TOKEN") {
            config = config.with_app_token(app_token);
        }
        if let Some(flag) = env_flag("SLACK_SHARE_CONNECTION") {
            config.share_slack_connection = flag;
        }
        if let Some(flag) = env_flag("SLACK_CORRECT_MARKDOWN") {
            config.correct_markdown_formatting = flag;
        }
        if let Some(size) = env_number("SLACK_MAX_FILE_SIZE")? {
            config.max_file_size_mb = size;
        }
        if let Some(size) = env_number("SLACK_MAX_TOTAL_FILE_SIZE")? {
            config.max_total_file_size_mb = size;
        }
        if let Some(flag) = env_flag("SLACK_FEEDBACK_ENABLED") {
            config.feedback.enabled = flag;
        }
        if let Ok(url) = std::env::var("SLACK_FEEDBACK_URL") {
            config.feedback.post_url = Some(url);
        }
        if let Ok(template) = std::env::var("SLACK_ISSUE_URL_TEMPLATE") {
            config.issue_url_template = template;
        }
        if let Ok(url) = std::env::var("SLACK_API_BASE_URL") {
            config.api_base_url = url;
        }

        Ok(config)
    }

    /// Parse configuration from a TOML document.
    pub fn from_toml_str(content: &str) -> SlackResult<Self> {
        let file: ConfigFile = toml::from_str(content)?;

        let mut config = Self::new(file.slack_bot_token);
        if let Some(app_token) = file.slack_app_token {
            config = config.with_app_token(app_token);
        }
        config.share_slack_connection = file.share_slack_connection;
        config.correct_markdown_formatting = file.correct_markdown_formatting;
        config.max_file_size_mb = file.max_file_size;
        config.max_total_file_size_mb = file.max_total_file_size;
        config.feedback = FeedbackConfig {
            enabled: file.feedback,
            post_url: file.feedback_post_url,
            post_headers: file.feedback_post_headers,
        };
        if let Some(template) = file.issue_url_template {
            config.issue_url_template = template;
        }
        if let Some(url) = file.api_base_url {
            config.api_base_url = url;
        }
        if let Some(secs) = file.stream_ttl_secs {
            config.stream_ttl = Duration::from_secs(secs);
        }
        if let Some(capacity) = file.stream_capacity {
            config.stream_capacity = capacity;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SlackResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SlackError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded Slack output config from {}", path.display());
        Ok(config)
    }

    /// The bot token in clear text.
    pub fn bot_token(&self) -> &str {
        self.bot_token.expose_secret()
    }

    /// Get the app token.
    pub fn app_token(&self) -> Option<&str> {
        self.app_token.as_ref().map(|s| s.expose_secret())
    }

    /// Largest single attachment, in bytes.
    pub fn max_file_size_bytes(&self) -> usize {
        usize::try_from(self.max_file_size_mb.saturating_mul(BYTES_PER_MB)).unwrap_or(usize::MAX)
    }

    /// Largest total attachment size per unit, in bytes.
    pub fn max_total_file_size_bytes(&self) -> usize {
        usize::try_from(self.max_total_file_size_mb.saturating_mul(BYTES_PER_MB))
            .unwrap_or(usize::MAX)
    }

    /// Reject settings the adapter cannot run with.
    pub fn validate(&self) -> SlackResult<()> {
        if self.bot_token.expose_secret().is_empty() {
            return Err(SlackError::Config("slack_bot_token is empty".to_string()));
        }
        if !self.bot_token.expose_secret().starts_with("xoxb-") {
            return Err(SlackError::Config(
                "slack_bot_token is not an xoxb- bot token".to_string(),
            ));
        }
        if let Some(app_token) = &self.app_token
            && !app_token.expose_secret().starts_with("xapp-")
        {
            return Err(SlackError::Config(
                "slack_app_token is not an xapp- app token".to_string(),
            ));
        }
        if self.feedback.enabled && self.feedback.post_url.is_none() {
            return Err(SlackError::Config(
                "Feedback is enabled but no feedback_post_url is set".to_string(),
            ));
        }
        if self.stream_capacity == 0 {
            return Err(SlackError::Config(
                "stream_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!("Ignoring {}: unrecognized boolean '{}'", name, other);
            None
        }
    }
}

fn env_number(name: &str) -> SlackResult<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SlackError::Config(format!("{} must be a number, got '{}'", name, value))),
        Err(_) => Ok(None),
    }
}
