//! Reassembly of translated segments into replacement or bilingual output.

use regex::Regex;
use std::sync::OnceLock;

use crate::orchestrator::TranslatedSegment;
use crate::segment::markup::is_block_element;

const PARAGRAPH_SEPARATOR: &str = "\n\n";

fn leading_tag_regex() -> &'static Regex {
    static LEADING_TAG: OnceLock<Regex> = OnceLock::new();
    LEADING_TAG.get_or_init(|| Regex::new(r"^\s*<([A-Za-z][A-Za-z0-9]*)").expect("valid tag regex"))
}

fn media_regex() -> &'static Regex {
    static MEDIA: OnceLock<Regex> = OnceLock::new();
    MEDIA.get_or_init(|| {
        Regex::new(
            r"(?is)<img\b[^>]*>|<video\b[^>]*>.*?</video\s*>|<audio\b[^>]*>.*?</audio\s*>|<iframe\b[^>]*>.*?</iframe\s*>|<object\b[^>]*>.*?</object\s*>|<embed\b[^>]*>|</?figure\b[^>]*>",
        )
        .expect("valid media regex")
    })
}

fn empty_paragraph_regex() -> &'static Regex {
    static EMPTY_P: OnceLock<Regex> = OnceLock::new();
    EMPTY_P.get_or_init(|| Regex::new(r"(?i)<p>\s*</p>").expect("valid paragraph regex"))
}

fn starts_with_block_element(content: &str) -> bool {
    leading_tag_regex()
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|name| is_block_element(&name.as_str().to_ascii_lowercase()))
        .unwrap_or(false)
}

fn sorted(segments: &[TranslatedSegment]) -> Vec<&TranslatedSegment> {
    let mut ordered: Vec<&TranslatedSegment> = segments.iter().collect();
    ordered.sort_by_key(|s| s.index());
    ordered
}

/// Concatenate translations in index order.
///
/// A blank line is inserted between neighbours unless the next segment opens
/// with a block-level element or the previous translation already ends with one.
pub fn merge(segments: &[TranslatedSegment]) -> String {
    let mut output = String::new();
    let mut previous: Option<&TranslatedSegment> = None;

    for segment in sorted(segments) {
        if let Some(prev) = previous {
            if !starts_with_block_element(&segment.segment.content)
                && !prev.translated.ends_with(PARAGRAPH_SEPARATOR)
            {
                output.push_str(PARAGRAPH_SEPARATOR);
            }
        }
        output.push_str(&segment.translated);
        previous = Some(segment);
    }

    output
}

/// Strip media-bearing elements so a bilingual pair shows each image once.
pub fn clean_media(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let without_media = media_regex().replace_all(html, "");
    empty_paragraph_regex()
        .replace_all(&without_media, "")
        .trim()
        .to_string()
}

/// Original and cleaned translation side by side, one wrapper per segment.
pub fn merge_bilingual(segments: &[TranslatedSegment]) -> String {
    sorted(segments)
        .into_iter()
        .map(|segment| {
            let original = &segment.segment.content;
            if segment.segment.is_code {
                return original.clone();
            }
            let translated = clean_media(&segment.translated);
            if translated.is_empty() {
                return original.clone();
            }
            format!(
                "<div class=\"bilingual-segment\"><div class=\"original\">{}</div><div class=\"translated\">{}</div></div>",
                original, translated
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
