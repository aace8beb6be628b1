//! Slack output adapter for the connector pipeline.
//!
//! This crate delivers LLM replies produced upstream to Slack:
//! - Markdown correction to Slack mrkdwn, including table rendering
//! - Streamed replies reconciled into a single, progressively updated message
//! - File attachments uploaded into the reply thread
//! - Removal of the "working on it" acknowledgment placeholder
//! - Optional thumbs up/down feedback buttons forwarded to an HTTP endpoint
//!
//! # Architecture
//!
//! [`SlackOutput`] owns the per-unit pipeline. It talks to Slack through the
//! [`ChatApi`] trait, implemented over the Web API by [`SlackClient`]. Clients
//! can be shared between adapters through a [`ConnectionPool`].
//!
//! # Example
//!
//! ```rust,ignore
//! use connector_slack::{ConnectionPool, SlackOutput, SlackOutputConfig};
//!
//! let config = SlackOutputConfig::from_env()?;
//! let output = SlackOutput::new(config, &ConnectionPool::new())?;
//! output.process(message).await;
//! ```
//!
//! # Configuration
//!
//! Required environment variables:
//! - `SLACK_BOT_TOKEN` - Bot OAuth token (xoxb-...)
//!
//! Optional:
//! - `SLACK_APP_TOKEN` - App-level token (xapp-...)
//! - `SLACK_FEEDBACK_ENABLED` / `SLACK_FEEDBACK_URL` - Feedback buttons
//!
//! See [`SlackOutputConfig`] for the full list and the TOML file format.

pub mod actions;
pub mod adapter;
pub mod api;
pub mod config;
pub mod error;
pub mod feedback;
pub mod markdown;
pub mod messages;
pub mod pool;
pub mod stream;
pub mod tables;
pub mod unit;

// Re-export main types
pub use actions::{ActionDispatcher, ActionHandler, ActionResponder, BlockActionPayload};
pub use adapter::SlackOutput;
pub use api::{ChatApi, SlackClient};
pub use config::SlackOutputConfig;
pub use error::{SlackError, SlackResult};
pub use markdown::MarkdownNormalizer;
pub use messages::{SlackBlock, SlackMessageContent};
pub use pool::ConnectionPool;
pub use stream::StreamStateCache;
pub use tables::TableConverter;
pub use unit::{OutboundMessage, OutboundUnit};
