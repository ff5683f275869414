//! RFC 5322 header handling: header block splitting, folding, encoded-words
//! (RFC 2047), and lenient date parsing.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, warn};

/// Split a raw message into its header block (without the blank separator line).
///
/// A message without a blank line is all headers.
pub fn header_block(data: &[u8]) -> &[u8] {
    for i in 0..data.len() {
        if data[i..].starts_with(b"\n\n") || data[i..].starts_with(b"\r\n\r\n") {
            return &data[..i];
        }
    }
    data
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
    }
}

/// Unfold headers: continuation lines (leading space or tab) join the previous header.
///
/// Returns `(lowercase_name, raw_value)` pairs in message order. Lines that are
/// neither a `Name: value` field nor a continuation are dropped.
pub fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = result.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
        } else if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if name.is_empty() || name.contains(' ') {
                continue;
            }
            result.push((name.to_lowercase(), value.trim().to_string()));
        }
    }

    result
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`.
/// Tokens that fail to decode are kept verbatim.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two adjacent encoded-words is not part of the text (§6.2).
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let token = &remaining[start + 2..];
        match decode_one_word(token) {
            Some((text, consumed)) => {
                result.push_str(&text);
                remaining = &token[consumed..];
                last_was_encoded = true;
            }
            None => {
                result.push_str("=?");
                remaining = token;
                last_was_encoded = false;
            }
        }
    }

    result.push_str(remaining);
    result
}

/// Decode `charset?encoding?text?=`; returns the text and the bytes consumed.
fn decode_one_word(s: &str) -> Option<(String, usize)> {
    let (charset, rest) = s.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let encoded = &rest[..end];
    let consumed = charset.len() + encoding.len() + end + 4;

    let bytes = match encoding {
        "B" | "b" => decode_base64(encoded)?,
        "Q" | "q" => decode_q_encoding(encoded),
        _ => return None,
    };

    Some((decode_charset(charset, &bytes), consumed))
}

/// Standard-alphabet base64, ignoring whitespace and tolerating missing padding.
fn decode_base64(input: &str) -> Option<Vec<u8>> {
    fn value(c: u8) -> Option<u32> {
        match c {
            b'A'..=b'Z' => Some((c - b'A') as u32),
            b'a'..=b'z' => Some((c - b'a' + 26) as u32),
            b'0'..=b'9' => Some((c - b'0' + 52) as u32),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }

    let mut out = Vec::with_capacity(input.len() * 3 / 4);
    let mut acc: u32 = 0;
    let mut bits = 0;
    for c in input.bytes() {
        if c == b'=' {
            break;
        }
        if c.is_ascii_whitespace() {
            continue;
        }
        acc = (acc << 6) | value(c)?;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    Some(out)
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    Err(_) => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Decode bytes using a named charset, falling back to lossy UTF-8.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    // RFC 2231 language suffix: "utf-8*en"
    let label = charset.split('*').next().unwrap_or(charset);
    match encoding_rs::Encoding::for_label(label.as_bytes()) {
        Some(encoding) => encoding.decode(bytes).0.into_owned(),
        None => {
            warn!(charset = label, "Unknown charset, falling back to UTF-8 lossy");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Parse an email date string in the formats found in real mailboxes.
///
/// Supports RFC 2822, RFC 3339, dates without day-of-week, named timezones
/// and IMAP-style `16-JUL-2025 03:01:03`. Returns `None` when nothing matches.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let no_dow = strip_day_of_week(trimmed);
    let imap = normalize_imap_date(&no_dow);

    const FORMATS: [&str; 10] = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S %Z",
        "%d %b %Y %H:%M:%S",
        "%d %b %Y %H:%M %z",
        "%b %d %H:%M:%S %Y",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ];

    let candidates = [
        no_dow.clone(),
        imap.clone(),
        replace_named_tz(&no_dow),
        replace_named_tz(&imap),
    ];
    for candidate in &candidates {
        for fmt in &FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(ndt) = NaiveDateTime::parse_from_str(candidate, fmt) {
                return Some(Utc.from_utc_datetime(&ndt));
            }
        }
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    debug!(date = trimmed, "Could not parse date");
    None
}

/// Last resort: let `mail-parser` read a one-header message.
fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    let fake_msg = format!("Date: {input}\n\n");
    let parsed = mail_parser::MessageParser::default().parse(fake_msg.as_bytes())?;
    let rfc3339 = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&rfc3339)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn normalize_imap_date(s: &str) -> String {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    if !s.contains('-') {
        return s.to_string();
    }
    let lower = s.to_ascii_lowercase();
    for month in MONTHS {
        let pattern = format!("-{}-", month.to_lowercase());
        if let Some(pos) = lower.find(&pattern) {
            let mut result = s.to_string();
            result.replace_range(pos..pos + pattern.len(), &format!(" {month} "));
            return result;
        }
    }
    s.to_string()
}

/// Strip a leading `"Thu, "` / `"Thu "`.
fn strip_day_of_week(s: &str) -> String {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in DAYS {
        if let Some(rest) = s.strip_prefix(day) {
            if rest.starts_with(',') || rest.starts_with(' ') {
                return rest.trim_start_matches(',').trim().to_string();
            }
        }
    }
    s.to_string()
}

/// Replace a trailing timezone abbreviation with its numeric offset.
fn replace_named_tz(s: &str) -> String {
    const ZONES: [(&str, &str); 13] = [
        ("CEST", "+0200"),
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CET", "+0100"),
        ("JST", "+0900"),
    ];
    for (name, offset) in ZONES {
        if let Some(head) = s.strip_suffix(name) {
            return format!("{head}{offset}");
        }
    }
    s.to_string()
}
