//! The Slack output component.
//!
//! [`SlackOutput`] takes finished replies from the connector pipeline and
//! delivers them to Slack:
//! 1. [`SlackOutput::invoke`] validates the upstream message.
//! 2. [`SlackOutput::send_message`] formats the text, creates or updates the
//!    Slack message (reconciling streamed chunks through
//!    [`StreamStateCache`]), uploads attachments and deletes the
//!    acknowledgment placeholder.
//!
//! Failures never escape a unit of work: they are logged and the remaining
//! steps still run.
//!
//! # Example
//!
//! ```rust,ignore
//! use connector_slack::{ConnectionPool, SlackOutput, SlackOutputConfig};
//!
//! let pool = ConnectionPool::new();
//! let output = SlackOutput::new(SlackOutputConfig::from_env()?, &pool)?;
//! output.process(serde_json::from_str(line)?).await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::actions::{ActionDispatcher, ActionHandler, ActionResponder, BlockActionPayload, ChatResponder};
use crate::api::ChatApi;
use crate::config::SlackOutputConfig;
use crate::error::{SlackError, SlackResult};
use crate::feedback::{FeedbackForwarder, FeedbackKind, FeedbackRecord};
use crate::markdown::{MarkdownNormalizer, rewrite_inline};
use crate::messages::{SlackBlock, SlackMessageContent, feedback_actions_block, text_sections};
use crate::pool::ConnectionPool;
use crate::stream::{SharedStreamEntry, StreamStateCache, spawn_sweeper};
use crate::tables::{TableConverter, TableRenderer};
use crate::unit::{OutboundMessage, OutboundUnit};

/// Slack output adapter.
pub struct SlackOutput {
    config: SlackOutputConfig,
    api: Arc<dyn ChatApi>,
    normalizer: MarkdownNormalizer,
    streams: Arc<Mutex<StreamStateCache>>,
    feedback: Option<Arc<FeedbackForwarder>>,
}

impl SlackOutput {
    /// Create an adapter whose Slack client comes from `pool`.
    pub fn new(config: SlackOutputConfig, pool: &ConnectionPool) -> SlackResult<Self> {
        config.validate()?;
        let api = pool.client_for(&config)?;
        Self::with_api(config, api)
    }

    /// Create an adapter over any [`ChatApi`] implementation.
    pub fn with_api(config: SlackOutputConfig, api: Arc<dyn ChatApi>) -> SlackResult<Self> {
        let feedback = if config.feedback.enabled {
            Some(Arc::new(FeedbackForwarder::new(&config.feedback)?))
        } else {
            None
        };

        let renderer = TableRenderer::new(config.issue_url_template.clone());
        let streams = StreamStateCache::new(config.stream_ttl, config.stream_capacity);

        Ok(Self {
            normalizer: MarkdownNormalizer::new(TableConverter::new(renderer)),
            streams: Arc::new(Mutex::new(streams)),
            config,
            api,
            feedback,
        })
    }

    pub fn config(&self) -> &SlackOutputConfig {
        &self.config
    }

    /// The stream state shared by every call on this adapter.
    pub fn streams(&self) -> Arc<Mutex<StreamStateCache>> {
        self.streams.clone()
    }

    /// Periodically age out stream state, even while no new streams start.
    pub fn spawn_stream_sweeper(&self, period: Duration) -> JoinHandle<()> {
        spawn_sweeper(self.streams.clone(), period)
    }

    /// Validate an upstream message.
    ///
    /// Messages without a channel are discarded with an error log.
    pub fn invoke(&self, message: OutboundMessage) -> Option<OutboundUnit> {
        match OutboundUnit::try_from(message) {
            Ok(unit) => Some(unit),
            Err(e) => {
                error!("slack_output: {}", e);
                None
            }
        }
    }

    /// `invoke` followed by `send_message`.
    pub async fn process(&self, message: OutboundMessage) {
        if let Some(unit) = self.invoke(message) {
            self.send_message(&unit).await;
        }
    }

    /// Deliver one unit: text, then files, then placeholder cleanup.
    pub async fn send_message(&self, unit: &OutboundUnit) {
        if let Err(e) = self.deliver_text(unit).await {
            error!("Error sending slack message: {}", e);
        }

        if let Err(e) = self.deliver_files(unit).await {
            error!("Error uploading files to slack: {}", e);
        }

        if let Some(ack_ts) = &unit.ack_msg_ts
            && let Err(e) = self.api.delete_message(&unit.channel, ack_ts).await
        {
            debug!("Could not delete ack message {}: {}", ack_ts, e);
        }
    }

    /// Build the Slack message for a unit, or `None` when it carries no text.
    ///
    /// Tables are only rendered once the full reply is known: for
    /// non-streamed units (with markdown correction on) and for the last
    /// chunk of a stream.
    pub fn compose(&self, unit: &OutboundUnit) -> Option<SlackMessageContent> {
        let items: Vec<String> = unit
            .text
            .iter()
            .filter(|t| !t.is_empty())
            .map(|t| {
                if self.config.correct_markdown_formatting {
                    rewrite_inline(t)
                } else {
                    t.clone()
                }
            })
            .collect();

        if items.is_empty() {
            return None;
        }

        let mut text = items.join("\n");
        let mut blocks: Vec<SlackBlock> = Vec::new();

        let render_tables =
            unit.last_chunk || (!unit.stream && self.config.correct_markdown_formatting);
        if render_tables {
            let converted = self.normalizer.convert_tables(&text);
            text = converted.text;
            blocks.extend(converted.segments.into_iter().map(SlackBlock::section));
        }

        if unit.is_final() && self.feedback.is_some() {
            blocks.push(feedback_actions_block(&feedback_value(unit)));
        }

        if !blocks.is_empty() {
            let mut with_text = text_sections(&text);
            with_text.append(&mut blocks);
            blocks = with_text;
        }

        Some(
            SlackMessageContent::new(text)
                .with_blocks(blocks)
                .in_thread(unit.thread_ts.as_deref()),
        )
    }

    async fn deliver_text(&self, unit: &OutboundUnit) -> SlackResult<()> {
        if !unit.stream {
            if let Some(stream_id) = &unit.stream_id {
                let entry = self.stream_entry(unit, stream_id);
                let mut state = entry.lock().await;
                state.completed = true;
                if state.remote_ts.is_some() {
                    debug!("Stream {} already has a message, not posting again", stream_id);
                    return Ok(());
                }
            }
            if let Some(content) = self.compose(unit) {
                self.api.post_message(&unit.channel, &content).await?;
            }
            return Ok(());
        }

        let key = stream_key(unit);
        let entry = self.stream_entry(unit, &key);
        let mut state = entry.lock().await;

        if state.completed {
            debug!("Dropping chunk for completed stream {}", key);
            return Ok(());
        }
        // The entry lock is held until this chunk's platform call returns.
        if unit.last_chunk {
            state.completed = true;
        }

        let content = match self.compose(unit) {
            Some(content) => {
                state.text = unit.text.clone();
                content
            }
            None if unit.last_chunk && state.remote_ts.is_some() => {
                // Textless last chunk: finalize the message with the text already sent.
                let finished = OutboundUnit {
                    text: state.text.clone(),
                    ..unit.clone()
                };
                match self.compose(&finished) {
                    Some(content) => content,
                    None => return Ok(()),
                }
            }
            None => return Ok(()),
        };

        match state.remote_ts.clone() {
            Some(ts) => {
                if let Err(e) = self.api.update_message(&unit.channel, &ts, &content).await {
                    trace!("Ignoring failed update of {} for stream {}: {}", ts, key, e);
                }
                Ok(())
            }
            None => {
                let ts = self.api.post_message(&unit.channel, &content).await?;
                state.remote_ts = Some(ts);
                Ok(())
            }
        }
    }

    /// Entry for a unit's stream; the first chunk always starts a new one.
    fn stream_entry(&self, unit: &OutboundUnit, key: &str) -> SharedStreamEntry {
        let mut streams = self.streams.lock();
        if unit.first_chunk {
            streams.open(key)
        } else {
            streams.get_or_open(key)
        }
    }

    async fn deliver_files(&self, unit: &OutboundUnit) -> SlackResult<()> {
        let max_file = self.config.max_file_size_bytes();
        let max_total = self.config.max_total_file_size_bytes();
        let mut total = 0usize;

        for file in &unit.files {
            let data = file.decode()?;

            if data.len() > max_file {
                warn!(
                    "Skipping upload: {}",
                    SlackError::FileTooLarge {
                        name: file.name.clone(),
                        size: data.len(),
                        limit: max_file,
                    }
                );
                continue;
            }
            if total + data.len() > max_total {
                warn!(
                    "Total attachment size would exceed {} bytes, skipping {} and the remaining files",
                    max_total, file.name
                );
                break;
            }
            total += data.len();

            debug!("Uploading {} to {}", file.name, unit.channel);
            self.api
                .upload_file(&unit.channel, data, unit.thread_ts.as_deref(), &file.name)
                .await?;
        }

        Ok(())
    }

    /// Register the thumbs up/down handlers when feedback is enabled.
    pub fn register_action_handlers(&self, dispatcher: &mut ActionDispatcher) {
        let Some(forwarder) = &self.feedback else {
            return;
        };

        for kind in [FeedbackKind::ThumbsUp, FeedbackKind::ThumbsDown] {
            dispatcher.register(
                kind.action_id(),
                Arc::new(FeedbackButton {
                    kind,
                    forwarder: forwarder.clone(),
                }),
            );
        }
    }

    /// Responder answering in `channel` through this adapter's client.
    pub fn responder(&self, channel: impl Into<String>) -> ChatResponder {
        ChatResponder::new(self.api.clone(), channel)
    }
}

/// Key for a stream; units without a stream id share one per thread.
fn stream_key(unit: &OutboundUnit) -> String {
    match &unit.stream_id {
        Some(id) => id.clone(),
        None => {
            warn!("Streamed unit without a stream id, keying on channel and thread");
            format!(
                "{}:{}",
                unit.channel,
                unit.thread_ts.as_deref().unwrap_or_default()
            )
        }
    }
}

/// Value carried by the feedback buttons of a final message.
fn feedback_value(unit: &OutboundUnit) -> Value {
    json!({
        "session_id": unit.session_id,
        "stream_id": unit.stream_id,
        "thread_ts": unit.thread_ts,
    })
}

/// Handler behind one feedback button.
struct FeedbackButton {
    kind: FeedbackKind,
    forwarder: Arc<FeedbackForwarder>,
}

#[async_trait]
impl ActionHandler for FeedbackButton {
    async fn handle(
        &self,
        payload: &BlockActionPayload,
        responder: &dyn ActionResponder,
    ) -> SlackResult<()> {
        responder.ack().await?;

        let data = match payload.action().and_then(|a| a.value.as_deref()) {
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
                warn!("Feedback button value is not JSON: {}", e);
                Value::String(raw.to_string())
            }),
            None => Value::Null,
        };

        let user = payload.user_id().unwrap_or("there");
        if let Err(e) = responder
            .say(&format!("Thanks for the feedback, <@{}>!", user))
            .await
        {
            warn!("Failed to acknowledge feedback: {}", e);
        }

        let record = FeedbackRecord::new(
            payload.user.clone(),
            self.kind,
            payload.channel.clone(),
            payload.message.clone(),
            data,
        );
        if let Err(e) = self.forwarder.forward(&record).await {
            error!("Failed to post feedback: {}", e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct NoopApi;

    #[async_trait]
    impl ChatApi for NoopApi {
        async fn post_message(&self, _: &str, _: &SlackMessageContent) -> SlackResult<String> {
            Ok("1.0".to_string())
        }

        async fn update_message(&self, _: &str, _: &str, _: &SlackMessageContent) -> SlackResult<()> {
            Ok(())
        }

        async fn delete_message(&self, _: &str, _: &str) -> SlackResult<()> {
            Ok(())
        }

        async fn upload_file(&self, _: &str, _: Vec<u8>, _: Option<&str>, _: &str) -> SlackResult<()> {
            Ok(())
        }
    }

    fn output(config: SlackOutputConfig) -> SlackOutput {
        SlackOutput::with_api(config, Arc::new(NoopApi)).unwrap()
    }

    const TABLE: &str = "| Name | State |\n|---|---|\n| api | up |\n";

    #[test]
    fn test_compose_plain_text() {
        let output = output(SlackOutputConfig::new("xoxb-t"));
        let mut unit = OutboundUnit::text("C1", "Hello **world**");
        unit.thread_ts = Some("100.1".to_string());

        let content = output.compose(&unit).unwrap();
        assert_eq!(content.text, "Hello *world*");
        assert!(content.blocks.is_empty());
        assert_eq!(content.thread_ts.as_deref(), Some("100.1"));
        assert!(!content.unfurl_links);
    }

    #[test]
    fn test_compose_joins_items_and_skips_empty() {
        let output = output(SlackOutputConfig::new("xoxb-t"));
        let unit = OutboundUnit {
            channel: "C1".to_string(),
            text: vec!["one".into(), String::new(), "two".into()],
            ..Default::default()
        };
        assert_eq!(output.compose(&unit).unwrap().text, "one\ntwo");

        let empty = OutboundUnit {
            channel: "C1".to_string(),
            ..Default::default()
        };
        assert!(output.compose(&empty).is_none());
    }

    #[test]
    fn test_compose_keeps_tables_mid_stream() {
        let output = output(SlackOutputConfig::new("xoxb-t"));
        let unit = OutboundUnit::chunk("C1", "s1", TABLE, false, false);

        let content = output.compose(&unit).unwrap();
        assert_eq!(content.text, TABLE);
        assert!(content.blocks.is_empty());
    }

    #[test]
    fn test_compose_renders_tables_on_last_chunk() {
        let output = output(SlackOutputConfig::new("xoxb-t"));
        let unit = OutboundUnit::chunk("C1", "s1", format!("Status:\n{}", TABLE), false, true);

        let content = output.compose(&unit).unwrap();
        assert_eq!(content.text, "Status:\n");
        assert_eq!(
            content.blocks,
            vec![
                SlackBlock::section("Status:"),
                SlackBlock::section("*api*\nState: up")
            ]
        );
    }

    #[test]
    fn test_compose_without_markdown_correction() {
        let mut config = SlackOutputConfig::new("xoxb-t");
        config.correct_markdown_formatting = false;
        let output = output(config);

        let unit = OutboundUnit::text("C1", format!("**raw**\n{}", TABLE));
        let content = output.compose(&unit).unwrap();
        assert_eq!(content.text, format!("**raw**\n{}", TABLE));
        assert!(content.blocks.is_empty());
    }

    #[test]
    fn test_compose_adds_feedback_buttons_to_final_message() {
        let config = SlackOutputConfig::new("xoxb-t")
            .with_feedback("http://127.0.0.1:9/feedback", HashMap::new());
        let output = output(config);

        let mut unit = OutboundUnit::text("C1", "answer");
        unit.session_id = Some("sess".to_string());
        let content = output.compose(&unit).unwrap();

        assert_eq!(content.blocks.len(), 2);
        assert_eq!(content.blocks[0], SlackBlock::section("answer"));
        let json = serde_json::to_value(&content.blocks[1]).unwrap();
        assert_eq!(json["elements"][0]["action_id"], "thumbs_up_action");
        let value: Value =
            serde_json::from_str(json["elements"][0]["value"].as_str().unwrap()).unwrap();
        assert_eq!(value["session_id"], "sess");

        let chunk = OutboundUnit::chunk("C1", "s1", "partial", true, false);
        assert!(output.compose(&chunk).unwrap().blocks.is_empty());
    }

    #[test]
    fn test_register_action_handlers_requires_feedback() {
        let mut dispatcher = ActionDispatcher::new();
        output(SlackOutputConfig::new("xoxb-t")).register_action_handlers(&mut dispatcher);
        assert!(!dispatcher.handles("thumbs_up_action"));

        let config = SlackOutputConfig::new("xoxb-t")
            .with_feedback("http://127.0.0.1:9/feedback", HashMap::new());
        output(config).register_action_handlers(&mut dispatcher);
        assert!(dispatcher.handles("thumbs_up_action"));
        assert!(dispatcher.handles("thumbs_down_action"));
    }

    #[test]
    fn test_invoke_discards_unit_without_channel() {
        let output = output(SlackOutputConfig::new("xoxb-t"));
        assert!(output.invoke(OutboundMessage::default()).is_none());
    }
}
