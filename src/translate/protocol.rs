//! `[ID:<id>]` marker protocol for multiplexing blocks into one provider call.
//!
//! Grammar of a reply: a marker `[ID:<id>]` followed by that block's text, up
//! to the next marker or the end of the reply. Captured text is trimmed.
//!
//! - markers for ids that were not requested are ignored
//! - an id whose capture is empty counts as missing
//! - when an id appears twice, the first occurrence wins
//! - if exactly one block was requested and the reply has no marker at all,
//!   the whole reply is that block's translation
//!
//! Every other mismatch is a partial result, never an error.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use super::Block;

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\[ID:\s*([^\]]+?)\s*\]").expect("valid marker regex"))
}

pub fn marker(id: &str) -> String {
    format!("[ID:{}]", id)
}

/// Render blocks as the user message of a batch call.
pub fn format_batch_prompt(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(|block| format!("{}\n{}", marker(&block.id), block.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Recover `id -> text` from a free-form provider reply.
pub fn parse_batch_response(response: &str, blocks: &[Block]) -> HashMap<String, String> {
    let requested: HashSet<&str> = blocks.iter().map(|b| b.id.as_str()).collect();
    let mut results = HashMap::new();

    let markers: Vec<(usize, usize, &str)> = marker_regex()
        .captures_iter(response)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let id = caps.get(1)?.as_str();
            Some((whole.start(), whole.end(), id))
        })
        .collect();

    if markers.is_empty() {
        if let [only] = blocks {
            let text = response.trim();
            if !text.is_empty() {
                results.insert(only.id.clone(), text.to_string());
            }
        }
        return results;
    }

    for (i, &(_, body_start, id)) in markers.iter().enumerate() {
        let body_end = markers.get(i + 1).map(|m| m.0).unwrap_or(response.len());
        let text = response[body_start..body_end].trim();
        if text.is_empty() || !requested.contains(id) {
            continue;
        }
        results
            .entry(id.to_string())
            .or_insert_with(|| text.to_string());
    }

    results
}
