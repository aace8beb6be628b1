//! Markdown table conversion.
//!
//! Slack mrkdwn has no table syntax, so pipe tables produced by the LLM are
//! rewritten before delivery:
//! - Small tables (at most [`SMALL_TABLE_MAX_ROWS`] data rows) become one
//!   `section` block per row and vanish from the message text.
//! - Larger tables are laid out as a fixed-width grid inside a code fence,
//!   in place of the original table.
//!
//! Detection sits behind [`TableParser`] so the regex scanner can be swapped
//! for a structured markdown parser without touching rendering.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use unicode_width::UnicodeWidthStr;

use crate::config::DEFAULT_ISSUE_URL_TEMPLATE;

/// Tables with at most this many data rows are rendered as section blocks.
pub const SMALL_TABLE_MAX_ROWS: usize = 5;

/// Header line, separator line, then one or more pipe-delimited rows.
static TABLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\|.*\|[\n\r]+\|[-:| ]+\|[\n\r]+((?:\|.*\|[\n\r]+)+)")
        .expect("Invalid markdown table regex")
});

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"http\S+").expect("Invalid URL regex"));

/// A parsed pipe table. The separator row is not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A table found in a larger text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMatch {
    /// Byte range of the table in the scanned text.
    pub range: Range<usize>,
    pub table: MarkdownTable,
}

/// Finds tables in text.
pub trait TableParser: Send + Sync {
    /// Return non-overlapping matches in ascending order of position.
    fn find_tables(&self, text: &str) -> Vec<TableMatch>;
}

/// Regex-based table detection.
///
/// Escaped or nested pipes are not understood.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexTableParser;

impl TableParser for RegexTableParser {
    fn find_tables(&self, text: &str) -> Vec<TableMatch> {
        TABLE_PATTERN
            .find_iter(text)
            .map(|m| TableMatch {
                range: m.range(),
                table: parse_table(m.as_str()),
            })
            .collect()
    }
}

/// Parse the text of a matched table.
///
/// The first line is the header, the second the separator; every further
/// non-blank line is a data row.
pub fn parse_table(table_str: &str) -> MarkdownTable {
    let mut lines = table_str
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(split_row);

    let headers = lines.next().unwrap_or_default();
    let rows = lines.skip(1).collect();

    MarkdownTable { headers, rows }
}

fn split_row(line: &str) -> Vec<String> {
    let mut cells: Vec<String> = line.split('|').map(|c| c.trim().to_string()).collect();
    if cells.first().is_some_and(|c| c.is_empty()) {
        cells.remove(0);
    }
    if cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    cells
}

/// Rendered form of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableBlock {
    /// Fenced fixed-width grid, substituted in place of the table.
    Monospace(String),
    /// One mrkdwn display segment per data row.
    Segments(Vec<String>),
}

/// Chooses and produces the rendering for a table.
#[derive(Debug, Clone)]
pub struct TableRenderer {
    issue_url_template: String,
}

impl Default for TableRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_ISSUE_URL_TEMPLATE)
    }
}

impl TableRenderer {
    /// `issue_url_template` must contain `{key}`.
    pub fn new(issue_url_template: impl Into<String>) -> Self {
        Self {
            issue_url_template: issue_url_template.into(),
        }
    }

    pub fn render(&self, table: &MarkdownTable) -> TableBlock {
        if table.rows.len() <= SMALL_TABLE_MAX_ROWS {
            TableBlock::Segments(self.render_segments(table))
        } else {
            TableBlock::Monospace(format!("\n```\n{}\n```\n", render_fixed_width(table)))
        }
    }

    fn render_segments(&self, table: &MarkdownTable) -> Vec<String> {
        let headers: Vec<String> = table.headers.iter().map(|h| strip_urls(h)).collect();
        table
            .rows
            .iter()
            .map(|row| {
                let cells: Vec<String> = row.iter().map(|c| strip_urls(c)).collect();
                self.format_row(&headers, &cells)
            })
            .collect()
    }

    /// Lay out one data row.
    ///
    /// A first column titled like "Jira Key" is folded into a link line
    /// together with a second "Summary" column. Otherwise the first cell is a
    /// bold title and the rest are `header: value` lines.
    fn format_row(&self, headers: &[String], cells: &[String]) -> String {
        let mut lines = Vec::with_capacity(cells.len());
        let mut issue_key: Option<&str> = None;

        for (index, (header, cell)) in headers.iter().zip(cells).enumerate() {
            let header_lower = header.to_lowercase();

            if index == 0 {
                if header_lower.contains("jira") && header_lower.contains("key") {
                    issue_key = Some(cell.as_str());
                } else {
                    lines.push(format!("*{}*", cell));
                }
                continue;
            }

            if index == 1
                && header_lower.contains("summary")
                && let Some(key) = issue_key
            {
                let link = self.issue_url_template.replace("{key}", key);
                lines.push(format!("<{}|*[{}] {}*>", link, key, cell));
                continue;
            }

            lines.push(format!("{}: {}", header, cell));
        }

        lines.join("\n").trim().to_string()
    }
}

fn strip_urls(cell: &str) -> String {
    URL_PATTERN.replace_all(cell, "").trim().to_string()
}

/// Lay out a table as an aligned, bordered grid.
pub fn render_fixed_width(table: &MarkdownTable) -> String {
    let columns = table
        .rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(table.headers.len()))
        .max()
        .unwrap_or(0);

    fn cell(row: &[String], i: usize) -> &str {
        row.get(i).map(String::as_str).unwrap_or("")
    }

    let widths: Vec<usize> = (0..columns)
        .map(|i| {
            table
                .rows
                .iter()
                .map(|row| cell(row, i).width())
                .chain(std::iter::once(cell(&table.headers, i).width()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let border = widths.iter().fold(String::from("+"), |mut acc, w| {
        acc.push_str(&"-".repeat(w + 2));
        acc.push('+');
        acc
    });

    let line = |row: &[String]| {
        widths
            .iter()
            .enumerate()
            .fold(String::from("|"), |mut acc, (i, w)| {
                let value = cell(row, i);
                acc.push(' ');
                acc.push_str(value);
                acc.push_str(&" ".repeat(w - value.width() + 1));
                acc.push('|');
                acc
            })
    };

    let mut out = Vec::with_capacity(table.rows.len() + 4);
    out.push(border.clone());
    out.push(line(&table.headers));
    out.push(border.clone());
    out.extend(table.rows.iter().map(|row| line(row)));
    out.push(border);
    out.join("\n")
}

/// Result of converting every table in a text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertedText {
    pub text: String,
    /// Display segments from small tables, in document order.
    pub segments: Vec<String>,
}

/// Detects and renders tables.
pub struct TableConverter {
    parser: Box<dyn TableParser>,
    renderer: TableRenderer,
}

impl Default for TableConverter {
    fn default() -> Self {
        Self::new(TableRenderer::default())
    }
}

impl TableConverter {
    /// Converter using [`RegexTableParser`].
    pub fn new(renderer: TableRenderer) -> Self {
        Self::with_parser(Box::new(RegexTableParser), renderer)
    }

    pub fn with_parser(parser: Box<dyn TableParser>, renderer: TableRenderer) -> Self {
        Self { parser, renderer }
    }

    pub fn convert(&self, text: &str) -> ConvertedText {
        let matches = self.parser.find_tables(text);
        if matches.is_empty() {
            return ConvertedText {
                text: text.to_string(),
                segments: Vec::new(),
            };
        }

        let mut out = String::with_capacity(text.len());
        let mut segments = Vec::new();
        let mut cursor = 0;

        for TableMatch { range, table } in matches {
            out.push_str(&text[cursor..range.start]);
            match self.renderer.render(&table) {
                TableBlock::Monospace(grid) => out.push_str(&grid),
                TableBlock::Segments(rows) => segments.extend(rows),
            }
            cursor = range.end;
        }
        out.push_str(&text[cursor..]);

        ConvertedText {
            text: out,
            segments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_text(headers: &str, rows: &[&str]) -> String {
        let mut s = format!("{}\n|---|---|\n", headers);
        for row in rows {
            s.push_str(row);
            s.push('\n');
        }
        s
    }

    #[test]
    fn test_parse_table_drops_outer_empty_cells() {
        let table = parse_table("| A | B |\n|---|---|\n| 1 |  |\n| 3 | 4 |\n");
        assert_eq!(table.headers, vec!["A", "B"]);
        assert_eq!(table.rows, vec![vec!["1", ""], vec!["3", "4"]]);
    }

    #[test]
    fn test_find_tables_requires_separator() {
        let parser = RegexTableParser;
        assert!(parser.find_tables("| a | b |\n| c | d |\n").is_empty());

        let text = format!("intro\n{}outro", table_text("| a | b |", &["| 1 | 2 |"]));
        let matches = parser.find_tables(&text);
        assert_eq!(matches.len(), 1);
        assert_eq!(&text[..matches[0].range.start], "intro\n");
        assert_eq!(&text[matches[0].range.end..], "outro");
    }

    #[test]
    fn test_small_table_becomes_segments() {
        let text = format!(
            "Results:\n{}Done",
            table_text("| Name | Status |", &["| build | ok |", "| test | failed |"])
        );

        let converted = TableConverter::default().convert(&text);

        assert_eq!(converted.text, "Results:\nDone");
        assert_eq!(
            converted.segments,
            vec!["*build*\nStatus: ok", "*test*\nStatus: failed"]
        );
    }

    #[test]
    fn test_issue_key_rows_link_to_tracker() {
        let text = table_text(
            "| Jira Key | Summary | Status |",
            &["| ABC-1 | Fix login | Open |", "| ABC-2 | Add export | Done |"],
        );

        let converted = TableConverter::default().convert(&text);

        assert_eq!(converted.text, "");
        assert_eq!(
            converted.segments[0],
            "<https://sol-jira.atlassian.net/browse/ABC-1|*[ABC-1] Fix login*>\nStatus: Open"
        );
    }

    #[test]
    fn test_issue_key_without_summary_column() {
        let renderer = TableRenderer::default();
        let table = MarkdownTable {
            headers: vec!["JIRA key".into(), "Owner".into()],
            rows: vec![vec!["ABC-9".into(), "sam".into()]],
        };
        assert_eq!(
            renderer.render(&table),
            TableBlock::Segments(vec!["Owner: sam".to_string()])
        );
    }

    #[test]
    fn test_cell_urls_are_stripped() {
        let renderer = TableRenderer::new("https://issues.example.com/{key}");
        let table = MarkdownTable {
            headers: vec!["Jira Key".into(), "Summary".into()],
            rows: vec![vec![
                "XY-7 https://x.atlassian.net/browse/XY-7".into(),
                "Crash on start".into(),
            ]],
        };
        assert_eq!(
            renderer.render(&table),
            TableBlock::Segments(vec![
                "<https://issues.example.com/XY-7|*[XY-7] Crash on start*>".to_string()
            ])
        );
    }

    #[test]
    fn test_five_row_table_is_still_small() {
        let rows: Vec<String> = (1..=5).map(|i| format!("| job{} | ok |", i)).collect();
        let row_refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let text = format!("before\n{}after", table_text("| Job | State |", &row_refs));

        let converted = TableConverter::default().convert(&text);

        assert_eq!(converted.text, "before\nafter");
        assert_eq!(converted.segments.len(), SMALL_TABLE_MAX_ROWS);
        assert_eq!(converted.segments[4], "*job5*\nState: ok");
    }

    #[test]
    fn test_large_table_becomes_fixed_width() {
        let rows: Vec<String> = (1..=6).map(|i| format!("| row{} | {} |", i, i * 10)).collect();
        let row_refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let text = format!("before\n{}after", table_text("| Item | Value |", &row_refs));

        let converted = TableConverter::default().convert(&text);

        assert!(converted.segments.is_empty());
        assert!(converted.text.starts_with("before\n\n```\n+"));
        assert!(converted.text.ends_with("+\n```\nafter"));
        assert!(converted.text.contains("| Item | Value |"));
        assert!(converted.text.contains("| row6 | 60    |"));

        let data_lines = converted
            .text
            .lines()
            .filter(|l| l.starts_with("| row"))
            .count();
        assert_eq!(data_lines, 6);
    }

    #[test]
    fn test_fixed_width_alignment() {
        let table = MarkdownTable {
            headers: vec!["A".into(), "Longer".into()],
            rows: vec![vec!["wide cell".into(), "x".into()]],
        };
        assert_eq!(
            render_fixed_width(&table),
            "+-----------+--------+\n\
             | A         | Longer |\n\
             +-----------+--------+\n\
             | wide cell | x      |\n\
             +-----------+--------+"
        );
    }

    #[test]
    fn test_segments_from_multiple_tables_are_kept() {
        let text = format!(
            "{}between\n{}",
            table_text("| A | B |", &["| 1 | 2 |"]),
            table_text("| C | D |", &["| 3 | 4 |"])
        );
        let converted = TableConverter::default().convert(&text);
        assert_eq!(converted.text, "between\n");
        assert_eq!(converted.segments, vec!["*1*\nB: 2", "*3*\nD: 4"]);
    }

    struct NoTables;

    impl TableParser for NoTables {
        fn find_tables(&self, _text: &str) -> Vec<TableMatch> {
            Vec::new()
        }
    }

    #[test]
    fn test_custom_parser() {
        let converter = TableConverter::with_parser(Box::new(NoTables), TableRenderer::default());
        let text = table_text("| A | B |", &["| 1 | 2 |"]);
        assert_eq!(converter.convert(&text).text, text);
    }
}
