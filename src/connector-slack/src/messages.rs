//! Block Kit payloads sent with `chat.postMessage` and `chat.update`.
//!
//! The adapter emits two kinds of block: mrkdwn `section` blocks (message
//! text and small-table rows) and one `actions` block with the feedback
//! buttons.

use serde::{Deserialize, Serialize};

pub const THUMBS_UP_ACTION: &str = "thumbs_up_action";
pub const THUMBS_DOWN_ACTION: &str = "thumbs_down_action";

/// One Block Kit layout block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackBlock {
    Section {
        text: SlackTextObject,
    },
    Actions {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        elements: Vec<SlackBlockElement>,
    },
}

impl SlackBlock {
    /// Section holding `text` as mrkdwn.
    pub fn section(text: impl Into<String>) -> Self {
        SlackBlock::Section {
            text: SlackTextObject::mrkdwn(text),
        }
    }

    pub fn section_text(&self) -> Option<&str> {
        match self {
            SlackBlock::Section { text } => Some(text.text.as_str()),
            SlackBlock::Actions { .. } => None,
        }
    }
}

/// `plain_text` or `mrkdwn` composition object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackTextObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<bool>,
}

impl SlackTextObject {
    /// Button labels must be `plain_text`; emoji shortcodes are rendered.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            kind: "plain_text".into(),
            text: text.into(),
            emoji: Some(true),
        }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self {
            kind: "mrkdwn".into(),
            text: text.into(),
            emoji: None,
        }
    }
}

/// Interactive element inside an `actions` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackBlockElement {
    Button {
        text: SlackTextObject,
        action_id: String,
        /// Opaque string Slack hands back in the `block_actions` payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

/// Longest text Slack accepts in a section block.
pub const SECTION_TEXT_LIMIT: usize = 3000;

/// Split `text` into mrkdwn section blocks within [`SECTION_TEXT_LIMIT`],
/// breaking at line ends where possible.
///
/// Once a message carries blocks Slack shows only the blocks, so the text
/// has to travel as sections too.
pub fn text_sections(text: &str) -> Vec<SlackBlock> {
    let mut blocks = Vec::new();
    let mut rest = text.trim();

    while !rest.is_empty() {
        if rest.len() <= SECTION_TEXT_LIMIT {
            blocks.push(SlackBlock::section(rest));
            break;
        }

        let mut cut = SECTION_TEXT_LIMIT;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if let Some(newline) = rest[..cut].rfind('\n')
            && newline > 0
        {
            cut = newline;
        }

        blocks.push(SlackBlock::section(rest[..cut].trim_end()));
        rest = rest[cut..].trim_start();
    }

    blocks
}

/// Build the thumbs up/down actions block.
///
/// `value` is echoed back by Slack when a button is pressed and ends up as
/// the `data` field of the forwarded feedback record.
pub fn feedback_actions_block(value: &serde_json::Value) -> SlackBlock {
    let value = value.to_string();
    SlackBlock::Actions {
        block_id: Some("feedback".to_string()),
        elements: vec![
            SlackBlockElement::Button {
                text: SlackTextObject::plain("👍"),
                action_id: THUMBS_UP_ACTION.to_string(),
                value: Some(value.clone()),
            },
            SlackBlockElement::Button {
                text: SlackTextObject::plain("👎"),
                action_id: THUMBS_DOWN_ACTION.to_string(),
                value: Some(value),
            },
        ],
    }
}

/// Body of a `chat.postMessage` / `chat.update` call, minus the channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlackMessageContent {
    /// Message text; Slack falls back to it for notifications when blocks
    /// are present.
    pub text: String,
    pub blocks: Vec<SlackBlock>,
    /// Parent message `ts` when replying in a thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    /// Always false for adapter output.
    pub unfurl_links: bool,
}

impl SlackMessageContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: Vec::new(),
            thread_ts: None,
            unfurl_links: false,
        }
    }

    pub fn with_blocks(mut self, blocks: Vec<SlackBlock>) -> Self {
        self.blocks = blocks;
        self
    }

    pub fn in_thread(mut self, thread_ts: Option<impl Into<String>>) -> Self {
        self.thread_ts = thread_ts.map(Into::into);
        self
    }
}
