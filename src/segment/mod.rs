// Document segmentation
//
// A document is cut into translation units in two passes:
// - structural blocks: tag-aware for markup, line-based for plain text/Markdown
// - oversized non-code blocks are packed sentence by sentence up to `max_length`
//
// Every unit carries an MD5 digest of its own content so the caches can key on
// content rather than position.

pub mod markup;
pub mod plain;
pub mod sentences;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A contiguous translation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    pub content: String,
    pub hash: String,
    pub is_code: bool,
}

impl Segment {
    pub fn new(index: usize, content: impl Into<String>, is_code: bool) -> Self {
        let content = content.into();
        let hash = content_hash(&content);
        Self {
            index,
            content,
            hash,
            is_code,
        }
    }
}

/// Position-independent digest used as the cache identity of a unit.
pub fn content_hash(content: &str) -> String {
    format!("{:x}", md5::compute(content.as_bytes()))
}

fn markup_regex() -> &'static Regex {
    static MARKUP: OnceLock<Regex> = OnceLock::new();
    MARKUP.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid markup regex"))
}

fn code_open_regex() -> &'static Regex {
    static CODE_OPEN: OnceLock<Regex> = OnceLock::new();
    CODE_OPEN.get_or_init(|| Regex::new(r"(?i)^<(pre|code)[\s>]").expect("valid code regex"))
}

/// True when the text contains at least one tag-like construct.
pub fn has_markup(text: &str) -> bool {
    markup_regex().is_match(text)
}

/// Fenced or tagged code, or a block-literal indented first line.
pub fn is_code_block(raw: &str) -> bool {
    let first = raw.trim_start_matches(['\r', '\n']);
    if first.starts_with("    ") || first.starts_with('\t') {
        return true;
    }
    let trimmed = first.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~") || code_open_regex().is_match(trimmed)
}

/// Split `text` into ordered, densely indexed segments.
///
/// Deterministic for identical input; every non-whitespace character of `text`
/// ends up in exactly one segment.
pub fn split(text: &str, max_length: usize, preserve_structure: bool) -> Vec<Segment> {
    let blocks = if preserve_structure && has_markup(text) {
        markup::split_blocks(text)
    } else {
        plain::split_blocks(text)
    };

    let mut segments: Vec<Segment> = Vec::new();
    for block in blocks {
        if is_code_block(&block) {
            // Keep literal indentation; only surrounding newlines and trailing space go.
            let content = block.trim_start_matches(['\r', '\n']).trim_end();
            if !content.is_empty() {
                segments.push(Segment::new(segments.len(), content, true));
            }
            continue;
        }

        let content = block.trim();
        if content.is_empty() {
            continue;
        }

        if content.chars().count() > max_length {
            for chunk in sentences::pack(content, max_length) {
                segments.push(Segment::new(segments.len(), chunk, false));
            }
        } else {
            segments.push(Segment::new(segments.len(), content, false));
        }
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_whitespace(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_two_paragraph_markup() {
        let segments = split("<p>Hello world.</p>\n\n<p>Goodbye.</p>", 1000, true);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].content, "<p>Hello world.</p>");
        assert_eq!(segments[1].content, "<p>Goodbye.</p>");
        assert!(segments.iter().all(|s| !s.is_code));
        assert_eq!(segments[0].index, 0);
        assert_eq!(segments[1].index, 1);
    }

    #[test]
    fn test_hash_is_position_independent() {
        let segments = split("Same text.\n\nOther.\n\nSame text.", 1000, true);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].hash, segments[2].hash);
        assert_ne!(segments[0].hash, segments[1].hash);
        assert_eq!(segments[0].hash, content_hash("Same text."));
    }

    #[test]
    fn test_fenced_code_is_flagged_and_not_split() {
        let code = format!("```rust\n{}\n```", "let x = 1; ".repeat(40));
        let text = format!("Intro paragraph.\n\n{}", code);
        let segments = split(&text, 50, true);
        let code_segments: Vec<_> = segments.iter().filter(|s| s.is_code).collect();
        assert_eq!(code_segments.len(), 1);
        assert_eq!(code_segments[0].content, code);
    }

    #[test]
    fn test_pre_element_is_code() {
        let segments = split("<p>Text.</p>\n\n<pre class=\"x\">fn main() {}</pre>", 1000, true);
        assert_eq!(segments.len(), 2);
        assert!(!segments[0].is_code);
        assert!(segments[1].is_code);
    }

    #[test]
    fn test_indented_literal_is_code() {
        let segments = split("Paragraph.\n\n    indented code\n    more code", 1000, true);
        assert_eq!(segments.len(), 2);
        assert!(segments[1].is_code);
        assert_eq!(segments[1].content, "    indented code\n    more code");
    }

    #[test]
    fn test_oversized_paragraph_is_packed_by_sentence() {
        let text = "First sentence here. Second sentence here. Third sentence here.";
        let segments = split(text, 25, true);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].content, "First sentence here.");
        assert_eq!(segments[2].content, "Third sentence here.");
        assert!(segments.iter().all(|s| s.content.chars().count() <= 25));
    }

    #[test]
    fn test_lossless_on_mixed_input() {
        let text = "# Title\n\nSome intro. With two sentences!\n- item one\n- item two\n\n\
                    <div>inline <b>bold</b></div>\n\n```\ncode\n```\n\n1. first\n2. second";
        for max in [5, 20, 1000] {
            for preserve in [true, false] {
                let segments = split(text, max, preserve);
                let joined: String = segments.iter().map(|s| s.content.as_str()).collect();
                assert_eq!(non_whitespace(&joined), non_whitespace(text), "max={max} preserve={preserve}");
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "<p>One. Two. Three.</p>\n\n<p>Four.</p>";
        assert_eq!(split(text, 8, true), split(text, 8, true));
    }

    #[test]
    fn test_indices_are_dense() {
        let text = "A.\n\n\n\nB.\n\n   \n\nC.";
        let segments = split(text, 1000, true);
        let indices: Vec<usize> = segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_input() {
        assert!(split("", 1000, true).is_empty());
        assert!(split("  \n\n \t", 1000, true).is_empty());
    }
}
