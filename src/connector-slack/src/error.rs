//! Errors raised while delivering output to Slack.
//!
//! Nothing here is fatal to the host: the adapter logs every error against
//! the unit of work that produced it and moves on.

use thiserror::Error;

/// Failure of one delivery step.
#[derive(Error, Debug)]
pub enum SlackError {
    /// Missing or invalid settings.
    #[error("Invalid Slack output configuration: {0}")]
    Config(String),

    /// Slack refused the bot token.
    #[error("Slack rejected the token: {0}")]
    Auth(String),

    /// Slack answered with an error not covered by a more specific variant.
    #[error("Slack API call failed: {0}")]
    Api(String),

    #[error("Slack rate limit hit, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Transport failure before Slack answered.
    #[error("Could not reach Slack: {0}")]
    Network(String),

    #[error("Slack request timed out: {0}")]
    Timeout(String),

    /// The target channel is unknown, archived, or the bot is not a member.
    #[error("Cannot post to channel: {0}")]
    Channel(String),

    #[error("Malformed JSON: {0}")]
    Json(String),

    /// An upstream unit or interaction payload is missing required data.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Attachment content is not valid base64.
    #[error("Cannot decode attachment {0}")]
    Decode(String),

    #[error("Attachment {name} is {size} bytes, over the {limit} byte limit")]
    FileTooLarge {
        name: String,
        size: usize,
        limit: usize,
    },

    /// The feedback sink did not accept a record.
    #[error("Feedback forwarding failed: {0}")]
    Feedback(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type SlackResult<T> = std::result::Result<T, SlackError>;

impl From<reqwest::Error> for SlackError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SlackError::Timeout(err.to_string())
        } else if err.is_decode() {
            SlackError::Json(err.to_string())
        } else if err.is_connect() {
            SlackError::Network(format!("connect: {}", err))
        } else {
            SlackError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SlackError {
    fn from(err: serde_json::Error) -> Self {
        SlackError::Json(err.to_string())
    }
}

impl From<base64::DecodeError> for SlackError {
    fn from(err: base64::DecodeError) -> Self {
        SlackError::Decode(err.to_string())
    }
}

impl From<toml::de::Error> for SlackError {
    fn from(err: toml::de::Error) -> Self {
        SlackError::Config(format!("bad TOML: {}", err))
    }
}

impl From<std::env::VarError> for SlackError {
    fn from(err: std::env::VarError) -> Self {
        SlackError::Config(err.to_string())
    }
}

/// An `"ok": false` Web API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackApiError {
    /// The `error` field, e.g. `channel_not_found`.
    pub code: String,
    pub message: String,
}

const AUTH_CODES: &[&str] = &[
    "invalid_auth",
    "account_inactive",
    "not_authed",
    "token_revoked",
];

const CHANNEL_CODES: &[&str] = &["channel_not_found", "not_in_channel", "is_archived"];

impl SlackApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<SlackApiError> for SlackError {
    fn from(err: SlackApiError) -> Self {
        let code = err.code.as_str();
        if code == "rate_limited" || code == "ratelimited" {
            SlackError::RateLimited {
                retry_after_secs: 30,
            }
        } else if AUTH_CODES.contains(&code) {
            SlackError::Auth(err.message)
        } else if CHANNEL_CODES.contains(&code) {
            SlackError::Channel(err.message)
        } else {
            SlackError::Api(format!("{}: {}", err.code, err.message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            SlackError::Config("bot token is empty".into()).to_string(),
            "Invalid Slack output configuration: bot token is empty"
        );
        assert_eq!(
            SlackError::RateLimited {
                retry_after_secs: 12
            }
            .to_string(),
            "Slack rate limit hit, retry in 12s"
        );
        assert_eq!(
            SlackError::FileTooLarge {
                name: "dump.bin".into(),
                size: 30,
                limit: 20,
            }
            .to_string(),
            "Attachment dump.bin is 30 bytes, over the 20 byte limit"
        );
    }

    #[test]
    fn test_api_codes_map_to_variants() {
        let cases = [
            ("token_revoked", "Auth"),
            ("not_in_channel", "Channel"),
            ("rate_limited", "RateLimited"),
            ("message_not_found", "Api"),
        ];
        for (code, expected) in cases {
            let err: SlackError = SlackApiError::new(code, code).into();
            let variant = match err {
                SlackError::Auth(_) => "Auth",
                SlackError::Channel(_) => "Channel",
                SlackError::RateLimited { .. } => "RateLimited",
                SlackError::Api(_) => "Api",
                _ => "other",
            };
            assert_eq!(variant, expected, "code {}", code);
        }
    }

    #[test]
    fn test_decode_error_conversion() {
        use base64::Engine;
        let err = base64::engine::general_purpose::STANDARD
            .decode("not base64!!")
            .unwrap_err();
        assert!(matches!(SlackError::from(err), SlackError::Decode(_)));
    }
}
