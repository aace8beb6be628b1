//! Shared test doubles.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;

use connector_slack::error::{SlackApiError, SlackError, SlackResult};
use connector_slack::messages::SlackMessageContent;
use connector_slack::ChatApi;

/// A platform call observed by [`RecordingApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Post {
        channel: String,
        content: SlackMessageContent,
    },
    Update {
        channel: String,
        ts: String,
        content: SlackMessageContent,
    },
    Delete {
        channel: String,
        ts: String,
    },
    Upload {
        channel: String,
        filename: String,
        thread_ts: Option<String>,
        data: Vec<u8>,
    },
}

/// Records every call and fails the ones it was told to.
#[derive(Default)]
pub struct RecordingApi {
    pub(crate) calls: Mutex<Vec<Call>>,
    pub(crate) next_ts: Mutex<u32>,
    pub fail_posts: bool,
    pub fail_updates: bool,
    pub fail_deletes: bool,
    /// Uploads of these file names fail.
    pub fail_uploads: Vec<String>,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn posts(&self) -> Vec<SlackMessageContent> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Post { content, .. } => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<(String, SlackMessageContent)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Update { ts, content, .. } => Some((ts, content)),
                _ => None,
            })
            .collect()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Upload { filename, .. } => Some(filename),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl ChatApi for RecordingApi {
    async fn post_message(
        &self,
        channel: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<String> {
        self.record(Call::Post {
            channel: channel.to_string(),
            content: content.clone(),
        });
        if self.fail_posts {
            return Err(SlackApiError::new("channel_not_found", "").into());
        }

        let mut next = self.next_ts.lock();
        *next += 1;
        Ok(format!("1700000000.{:06}", *next))
    }

    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        content: &SlackMessageContent,
    ) -> SlackResult<()> {
        self.record(Call::Update {
            channel: channel.to_string(),
            ts: ts.to_string(),
            content: content.clone(),
        });
        if self.fail_updates {
            return Err(SlackApiError::new("message_not_found", "").into());
        }
        Ok(())
    }

    async fn delete_message(&self, channel: &str, ts: &str) -> SlackResult<()> {
        self.record(Call::Delete {
            channel: channel.to_string(),
            ts: ts.to_string(),
        });
        if self.fail_deletes {
            return Err(SlackApiError::new("message_not_found", "").into());
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        channel: &str,
        data: Vec<u8>,
        thread_ts: Option<&str>,
        filename: &str,
    ) -> SlackResult<()> {
        self.record(Call::Upload {
            channel: channel.to_string(),
            filename: filename.to_string(),
            thread_ts: thread_ts.map(str::to_string),
            data,
        });
        if self.fail_uploads.iter().any(|f| f == filename) {
            return Err(SlackError::Network(format!("upload of {} failed", filename)));
        }
        Ok(())
    }
}
