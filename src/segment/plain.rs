//! Line-based block splitting for plain text and Markdown.

use regex::Regex;
use std::sync::OnceLock;

fn heading_regex() -> &'static Regex {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    HEADING.get_or_init(|| Regex::new(r"^#{1,6}\s").expect("valid heading regex"))
}

fn list_item_regex() -> &'static Regex {
    static LIST_ITEM: OnceLock<Regex> = OnceLock::new();
    LIST_ITEM.get_or_init(|| Regex::new(r"^\s*([-*+]|\d+\.)\s").expect("valid list regex"))
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

fn is_indented_literal(line: &str) -> bool {
    line.starts_with("    ") || line.starts_with('\t')
}

/// Headings and list items open a new block even without a blank line.
fn starts_block(line: &str) -> bool {
    !is_indented_literal(line) && (heading_regex().is_match(line) || list_item_regex().is_match(line))
}

/// Split on blank lines, heading markers and list-item markers.
///
/// Fenced code is kept whole, blank lines included.
pub fn split_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut in_fence = false;

    let mut flush = |current: &mut Vec<&str>| {
        if !current.is_empty() {
            blocks.push(current.join("\n"));
            current.clear();
        }
    };

    for line in text.lines() {
        if in_fence {
            current.push(line);
            if is_fence(line) {
                in_fence = false;
                flush(&mut current);
            }
            continue;
        }

        if is_fence(line) {
            flush(&mut current);
            current.push(line);
            in_fence = true;
            continue;
        }

        if line.trim().is_empty() {
            flush(&mut current);
            continue;
        }

        if starts_block(line) {
            flush(&mut current);
        }
        current.push(line);
    }
    flush(&mut current);

    blocks
}
