//! Interactive button dispatch.
//!
//! The host owns the Slack event connection. When a `block_actions`
//! interaction arrives it calls [`ActionDispatcher::dispatch`] with the
//! payload and an [`ActionResponder`] bound to that interaction; the
//! dispatcher looks up the handler registered for the action id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::api::ChatApi;
use crate::error::{SlackError, SlackResult};
use crate::messages::SlackMessageContent;

/// A `block_actions` interaction payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockActionPayload {
    /// User who clicked (`{"id": ..., "username": ...}`).
    #[serde(default)]
    pub user: Value,
    /// Channel the message lives in (`{"id": ..., "name": ...}`).
    #[serde(default)]
    pub channel: Value,
    /// The message carrying the buttons.
    #[serde(default)]
    pub message: Value,
    pub actions: Vec<BlockAction>,
}

/// One element interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAction {
    pub action_id: String,
    #[serde(default)]
    pub block_id: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl BlockActionPayload {
    /// Parse the JSON body of an interaction.
    pub fn from_json(raw: &str) -> SlackResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| SlackError::InvalidPayload(format!("block_actions payload: {}", e)))
    }

    /// The first (and in practice only) action.
    pub fn action(&self) -> Option<&BlockAction> {
        self.actions.first()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.get("id").and_then(Value::as_str)
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.channel.get("id").and_then(Value::as_str)
    }
}

/// Replies available to a handler for the interaction being processed.
#[async_trait]
pub trait ActionResponder: Send + Sync {
    /// Acknowledge receipt of the interaction.
    async fn ack(&self) -> SlackResult<()>;

    /// Post a visible message where the interaction happened.
    async fn say(&self, text: &str) -> SlackResult<()>;
}

/// Handles one kind of button.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(
        &self,
        payload: &BlockActionPayload,
        responder: &dyn ActionResponder,
    ) -> SlackResult<()>;
}

/// Handler table keyed by action id.
#[derive(Default, Clone)]
pub struct ActionDispatcher {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.handlers.keys().collect();
        ids.sort();
        f.debug_struct("ActionDispatcher")
            .field("actions", &ids)
            .finish()
    }
}

impl ActionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `action_id`, replacing any previous one.
    pub fn register(&mut self, action_id: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action_id.into(), handler);
    }

    pub fn handles(&self, action_id: &str) -> bool {
        self.handlers.contains_key(action_id)
    }

    /// Route an interaction to its handler.
    ///
    /// Returns `Ok(false)` when no handler is registered for the action.
    pub async fn dispatch(
        &self,
        payload: &BlockActionPayload,
        responder: &dyn ActionResponder,
    ) -> SlackResult<bool> {
        let Some(action) = payload.action() else {
            return Err(SlackError::InvalidPayload(
                "block_actions payload has no actions".to_string(),
            ));
        };

        match self.handlers.get(&action.action_id) {
            Some(handler) => {
                handler.handle(payload, responder).await?;
                Ok(true)
            }
            None => {
                debug!("No handler for action {}", action.action_id);
                Ok(false)
            }
        }
    }
}

/// Responder that answers through the chat API.
///
/// Socket Mode envelopes are acknowledged by the connection owner, so `ack`
/// has nothing left to do here.
pub struct ChatResponder {
    api: Arc<dyn ChatApi>,
    channel: String,
}

impl ChatResponder {
    pub fn new(api: Arc<dyn ChatApi>, channel: impl Into<String>) -> Self {
        Self {
            api,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl ActionResponder for ChatResponder {
    async fn ack(&self) -> SlackResult<()> {
        Ok(())
    }

    async fn say(&self, text: &str) -> SlackResult<()> {
        self.api
            .post_message(&self.channel, &SlackMessageContent::new(text))
            .await
            .map(|_| ())
    }
}
