//! The persisted mail record.

use chrono::{DateTime, Utc};

/// One message mirrored from the mail directory, keyed by its file path.
///
/// Created once on first ingestion and never updated in place. The flag
/// fields are a snapshot of the file name at that moment.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MailRecord {
    /// File path the record was ingested from. Unique across the store.
    pub path: String,

    /// Decoded `From:` header, empty if absent.
    pub from: String,

    /// Decoded `To:` header, empty if absent.
    pub to: String,

    /// Decoded `Delivered-To:` header, empty if absent.
    pub delivered_to: String,

    /// Decoded `Subject:` header, empty if absent.
    pub subject: String,

    /// Plain-text body (HTML converted to text when no `text/plain` part exists).
    pub body: String,

    /// HTML body, if the message has one.
    pub body_html: Option<String>,

    /// Parsed `Date:` header, or the ingestion time when it could not be parsed.
    pub date: DateTime<Utc>,

    /// `S` flag present when ingested.
    pub is_seen: bool,

    /// `R` flag present when ingested.
    pub is_replied: bool,

    /// `F` flag present when ingested.
    pub is_flagged: bool,
}

impl MailRecord {
    /// Compact flag summary for list output, e.g. `"S-F"`.
    pub fn flag_summary(&self) -> String {
        let mark = |on: bool, c: char| if on { c } else { '-' };
        [
            mark(self.is_seen, 'S'),
            mark(self.is_replied, 'R'),
            mark(self.is_flagged, 'F'),
        ]
        .iter()
        .collect()
    }
}
