//! Parsed message envelope: headers plus body text.

/// Headers and body extracted from one raw message.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Unfolded headers as `(lowercase_name, decoded_value)`, in message order.
    pub headers: Vec<(String, String)>,

    /// Plain-text body (from `text/plain`, or stripped from HTML).
    pub text: Option<String>,

    /// HTML body (from `text/html`, if present).
    pub html: Option<String>,
}

impl Envelope {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Header value or the empty string.
    pub fn header_or_empty(&self, name: &str) -> String {
        self.header(name).unwrap_or_default().to_string()
    }
}
