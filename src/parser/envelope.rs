//! Envelope extraction: raw message bytes → decoded headers + body text.

use mail_parser::MessageParser;

use crate::error::{Result, SyncError};
use crate::model::envelope::Envelope;
use crate::parser::header;

/// Default maximum message size in bytes (256 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Turns raw message bytes into an [`Envelope`].
///
/// Implementations fail with [`SyncError::Parse`] when the input is not a
/// usable mail message.
pub trait EnvelopeExtractor {
    fn extract(&self, raw: &[u8]) -> Result<Envelope>;
}

/// Extractor backed by `mail-parser` for bodies and our own header decoding.
#[derive(Debug, Clone)]
pub struct MailParserExtractor {
    max_message_size: usize,
}

impl MailParserExtractor {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Default for MailParserExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl EnvelopeExtractor for MailParserExtractor {
    fn extract(&self, raw: &[u8]) -> Result<Envelope> {
        if raw.is_empty() {
            return Err(SyncError::parse("empty message"));
        }
        if raw.len() > self.max_message_size {
            return Err(SyncError::parse(format!(
                "message is {} bytes, limit is {}",
                raw.len(),
                self.max_message_size
            )));
        }

        let header_text = header::decode_header_bytes(header::header_block(raw));
        let headers: Vec<(String, String)> = header::unfold_headers(&header_text)
            .into_iter()
            .map(|(name, value)| {
                let decoded = header::decode_encoded_words(&value);
                (name, decoded)
            })
            .collect();
        if headers.is_empty() {
            return Err(SyncError::parse("no header fields found"));
        }

        let msg = MessageParser::default()
            .parse(raw)
            .ok_or_else(|| SyncError::parse("mail-parser rejected the message"))?;

        let html = msg.body_html(0).map(|s| s.into_owned());
        let text = msg
            .body_text(0)
            .map(|s| s.into_owned())
            .or_else(|| html.as_deref().map(html_to_text));

        Ok(Envelope {
            headers,
            text,
            html,
        })
    }
}

/// Convert HTML to plain text.
///
/// Block elements become line breaks, scripts and styles are removed, common
/// entities are decoded, and runs of blank lines collapse to one.
pub fn html_to_text(html: &str) -> String {
    let mut text = remove_tag_block(html, "script");
    text = remove_tag_block(&text, "style");

    let mut stripped = String::with_capacity(text.len());
    let mut tag = String::new();
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                if is_block_tag(&tag) {
                    stripped.push('\n');
                }
            }
            _ if in_tag => tag.push(ch),
            _ => stripped.push(ch),
        }
    }

    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    let mut cleaned = String::with_capacity(decoded.len());
    let mut prev_blank = false;
    for line in decoded.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_blank {
                cleaned.push('\n');
                prev_blank = true;
            }
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_blank = false;
        }
    }
    cleaned.trim().to_string()
}

fn is_block_tag(tag: &str) -> bool {
    const BLOCK: [&str; 13] = [
        "br", "p", "div", "tr", "li", "h1", "h2", "h3", "h4", "h5", "h6", "table", "ul",
    ];
    let name = tag
        .trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    BLOCK.contains(&name.as_str())
}

/// Remove an entire tag block (e.g. `<script>…</script>`), case-insensitively.
fn remove_tag_block(html: &str, tag: &str) -> String {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    // ASCII lowercasing keeps byte offsets valid for `html`.
    let lower = html.to_ascii_lowercase();
    let mut result = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(start) = lower[pos..].find(&open).map(|i| pos + i) {
        result.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => return result,
        }
    }
    result.push_str(&html[pos..]);
    result
}
