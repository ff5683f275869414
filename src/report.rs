//! Aggregate statistics over stored records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::address::EmailAddress;
use crate::model::record::MailRecord;

/// How many senders `summarize` keeps.
pub const TOP_SENDERS: usize = 10;

/// Summary of the record store, as shown by `stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub seen: usize,
    pub replied: usize,
    pub flagged: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    /// Combined size of stored text and HTML bodies.
    pub body_bytes: u64,
    pub top_senders: Vec<(String, usize)>,
}

impl StoreStats {
    pub fn unseen(&self) -> usize {
        self.total - self.seen
    }
}

/// Compute every statistic in one call.
pub fn summarize(records: &[MailRecord]) -> StoreStats {
    let range = date_range(records);
    StoreStats {
        total: records.len(),
        seen: records.iter().filter(|r| r.is_seen).count(),
        replied: records.iter().filter(|r| r.is_replied).count(),
        flagged: records.iter().filter(|r| r.is_flagged).count(),
        oldest: range.map(|(min, _)| min),
        newest: range.map(|(_, max)| max),
        body_bytes: records
            .iter()
            .map(|r| (r.body.len() + r.body_html.as_ref().map_or(0, String::len)) as u64)
            .sum(),
        top_senders: top_senders(records, TOP_SENDERS),
    }
}

/// Return the date range (oldest, newest) across the given records.
pub fn date_range(records: &[MailRecord]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let first = records.first()?.date;
    Some(records.iter().skip(1).fold((first, first), |(min, max), r| {
        (min.min(r.date), max.max(r.date))
    }))
}

/// Return the top N senders by message count.
///
/// Senders are grouped by lower-cased address; the label is the first
/// spelling seen. Ties are broken alphabetically.
pub fn top_senders(records: &[MailRecord], n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, (String, usize)> = HashMap::new();
    for record in records {
        if record.from.trim().is_empty() {
            continue;
        }
        let addr = EmailAddress::parse(&record.from);
        let entry = counts
            .entry(addr.normalized())
            .or_insert_with(|| (addr.to_string(), 0));
        entry.1 += 1;
    }
    let mut sorted: Vec<(String, usize)> = counts.into_values().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(n);
    sorted
}
