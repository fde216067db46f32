//! Tag-aware block splitting.
//!
//! The input is tokenized into text, start tags, end tags and opaque
//! constructs (comments, doctypes). Block boundaries are only emitted while the
//! open-element stack is empty, so no block starts or ends inside an element.

use regex::Regex;
use std::sync::OnceLock;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "figure", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "main", "nav", "ol", "p", "pre",
    "section", "table", "ul",
];

fn blank_line_regex() -> &'static Regex {
    static BLANK_LINE: OnceLock<Regex> = OnceLock::new();
    BLANK_LINE.get_or_init(|| Regex::new(r"\r?\n[ \t]*\r?\n").expect("valid blank line regex"))
}

pub fn is_block_element(name: &str) -> bool {
    BLOCK_ELEMENTS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    Start {
        name: String,
        raw: &'a str,
        self_closing: bool,
    },
    End {
        name: String,
        raw: &'a str,
    },
    Other(&'a str),
}

/// Lossless tokenization: concatenating the raw text of every token gives back `input`.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut text_start = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }
        let Some((end, token)) = read_tag(input, pos) else {
            pos += 1;
            continue;
        };

        if text_start < pos {
            tokens.push(Token::Text(&input[text_start..pos]));
        }

        let raw_text_close = match &token {
            Token::Start {
                name,
                self_closing: false,
                ..
            } if RAW_TEXT_ELEMENTS.contains(&name.as_str()) => Some(format!("</{}", name)),
            _ => None,
        };

        tokens.push(token);
        pos = end;
        text_start = end;

        if let Some(close) = raw_text_close {
            // Script and style bodies are opaque text up to their closing tag.
            let body_end = input[pos..]
                .to_ascii_lowercase()
                .find(&close)
                .map(|offset| pos + offset)
                .unwrap_or(input.len());
            if body_end > pos {
                tokens.push(Token::Text(&input[pos..body_end]));
            }
            pos = body_end;
            text_start = body_end;
        }
    }

    if text_start < input.len() {
        tokens.push(Token::Text(&input[text_start..]));
    }

    tokens
}

fn read_tag(input: &str, start: usize) -> Option<(usize, Token<'_>)> {
    let rest = &input[start..];
    let bytes = rest.as_bytes();

    if rest.starts_with("<!--") {
        let end = rest.find("-->").map(|i| start + i + 3).unwrap_or(input.len());
        return Some((end, Token::Other(&input[start..end])));
    }

    let next = *bytes.get(1)?;
    match next {
        b'!' | b'?' => {
            let end = start + rest.find('>')? + 1;
            Some((end, Token::Other(&input[start..end])))
        }
        b'/' => {
            let name = read_name(&rest[2..]);
            if name.is_empty() {
                return None;
            }
            let end = start + rest.find('>')? + 1;
            Some((
                end,
                Token::End {
                    name,
                    raw: &input[start..end],
                },
            ))
        }
        c if c.is_ascii_alphabetic() => {
            let name = read_name(&rest[1..]);
            let end = start + find_tag_end(bytes, 1 + name.len())? + 1;
            let raw = &input[start..end];
            Some((
                end,
                Token::Start {
                    self_closing: raw.ends_with("/>"),
                    name,
                    raw,
                },
            ))
        }
        _ => None,
    }
}

fn read_name(s: &str) -> String {
    s.chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == ':')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Index of the closing `>` of a start tag, skipping quoted attribute values.
fn find_tag_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(from) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i),
            None => {}
        }
    }
    None
}

#[derive(Default)]
struct BlockSplitter {
    blocks: Vec<String>,
    current: String,
    stack: Vec<String>,
}

impl BlockSplitter {
    fn feed(&mut self, token: Token<'_>) {
        match token {
            Token::Start {
                name,
                raw,
                self_closing,
            } => {
                if self.stack.is_empty() && is_block_element(&name) {
                    self.flush();
                }
                self.current.push_str(raw);
                if !self_closing && !VOID_ELEMENTS.contains(&name.as_str()) {
                    self.stack.push(name);
                }
            }
            Token::End { name, raw } => {
                self.current.push_str(raw);
                // Unmatched end tags are kept as text and leave the stack alone.
                if let Some(pos) = self.stack.iter().rposition(|open| *open == name) {
                    self.stack.truncate(pos);
                    if self.stack.is_empty() && is_block_element(&name) {
                        self.flush();
                    }
                }
            }
            Token::Other(raw) => self.current.push_str(raw),
            Token::Text(text) => {
                if !self.stack.is_empty() {
                    self.current.push_str(text);
                    return;
                }
                let mut pieces = blank_line_regex().split(text);
                if let Some(first) = pieces.next() {
                    self.current.push_str(first);
                }
                for piece in pieces {
                    self.flush();
                    self.current.push_str(piece);
                }
            }
        }
    }

    fn flush(&mut self) {
        let block = self.current.trim();
        if !block.is_empty() {
            self.blocks.push(block.to_string());
        }
        self.current.clear();
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.blocks
    }
}

/// Split markup into top-level blocks.
pub fn split_blocks(html: &str) -> Vec<String> {
    let mut splitter = BlockSplitter::default();
    for token in tokenize(html) {
        splitter.feed(token);
    }
    splitter.finish()
}
