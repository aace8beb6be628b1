//! Markdown to Slack mrkdwn correction.
//!
//! LLMs answer in CommonMark; Slack speaks mrkdwn. The rewrites applied are:
//! - Links: `[text](http...)` → `<http...|text>`
//! - Code fences: the language tag after ```` ``` ```` is dropped
//! - Bold: `**text**` → `*text*`
//! - Tables: see [`crate::tables`]
//!
//! Text that matches none of the patterns passes through untouched.

use std::sync::LazyLock;

use regex::Regex;

use crate::tables::{ConvertedText, TableConverter};

static LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(.*?)\]\((http.*?)\)").expect("Invalid link regex"));

static FENCE_LANGUAGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z]+\n").expect("Invalid code fence regex"));

static BOLD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("Invalid bold regex"));

/// Apply the inline rewrites (links, fences, bold) without touching tables.
pub fn rewrite_inline(text: &str) -> String {
    let text = LINK_PATTERN.replace_all(text, "<${2}|${1}>");
    let text = FENCE_LANGUAGE_PATTERN.replace_all(&text, "```\n");
    BOLD_PATTERN.replace_all(&text, "*${1}*").into_owned()
}

/// Rewrites LLM markdown into Slack mrkdwn.
///
/// Every call returns its own set of table segments; nothing carries over
/// from a previous call.
#[derive(Default)]
pub struct MarkdownNormalizer {
    tables: TableConverter,
}

impl MarkdownNormalizer {
    pub fn new(tables: TableConverter) -> Self {
        Self { tables }
    }

    /// Extract tables from already rewritten text.
    pub fn convert_tables(&self, text: &str) -> ConvertedText {
        self.tables.convert(text)
    }
}
