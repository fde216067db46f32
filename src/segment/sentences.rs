//! Sentence splitting for oversized blocks.

/// Split text after sentence-ending punctuation.
///
/// ASCII terminators (`.`, `!`, `?`) only end a sentence when followed by
/// whitespace, which stays attached to the sentence. Full-width terminators
/// end a sentence on their own. Punctuation inside a tag's angle brackets never
/// splits.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut in_tag = false;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if in_tag => {}
            '.' | '!' | '?' => {
                if let Some(&(j, next)) = chars.peek() {
                    if next.is_whitespace() {
                        let end = j + next.len_utf8();
                        chars.next();
                        sentences.push(&text[start..end]);
                        start = end;
                    }
                }
            }
            '。' | '！' | '？' => {
                let end = i + c.len_utf8();
                sentences.push(&text[start..end]);
                start = end;
            }
            _ => {}
        }
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// Greedily pack sentences into chunks of at most `max_length` characters.
///
/// A single sentence longer than the bound becomes its own chunk.
pub fn pack(text: &str, max_length: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in split_sentences(text) {
        let len = sentence.chars().count();
        if current_len + len > max_length && !current.trim().is_empty() {
            chunks.push(current.trim().to_string());
            current.clear();
            current_len = 0;
        }
        current.push_str(sentence);
        current_len += len;
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_trailing_whitespace() {
        assert_eq!(split_sentences("One. Two! Three?"), vec!["One. ", "Two! ", "Three?"]);
    }

    #[test]
    fn test_decimal_points_do_not_split() {
        assert_eq!(split_sentences("Pi is 3.14 today. Yes."), vec!["Pi is 3.14 today. ", "Yes."]);
    }

    #[test]
    fn test_full_width_punctuation() {
        assert_eq!(split_sentences("你好。再见！好吗？"), vec!["你好。", "再见！", "好吗？"]);
    }

    #[test]
    fn test_punctuation_inside_tags_is_ignored() {
        let text = "<img alt=\"A. B\">Caption one. Caption two.";
        assert_eq!(
            split_sentences(text),
            vec!["<img alt=\"A. B\">Caption one. ", "Caption two."]
        );
    }

    #[test]
    fn test_pack_respects_bound() {
        let chunks = pack("Aa. Bb. Cc. Dd.", 8);
        assert_eq!(chunks, vec!["Aa. Bb.", "Cc. Dd."]);
    }

    #[test]
    fn test_pack_long_sentence_stands_alone() {
        let chunks = pack("Short. This sentence is far too long for the bound. End.", 10);
        assert_eq!(
            chunks,
            vec!["Short.", "This sentence is far too long for the bound.", "End."]
        );
    }
}
