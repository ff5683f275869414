//! Maildir filename flag codec.
//!
//! Maildir clients store message state in the file name itself. The last
//! comma-separated segment of the name holds one character per flag:
//!
//! ```text
//! 1729845003.21247_1.host,U=11297:2,FRS
//!                                   ^^^ flags: flagged, replied, seen
//! ```
//!
//! [`MaildirFlags`] is a pure value type: it turns a path into a flag set and
//! back, and never touches the filesystem.
//!
//! A path only has a flag segment when it contains a `,` and the text after
//! the last `,` has no path separator. Anything else (`/mail/cur/12345`, or a
//! comma inside a directory name) has an empty flag set, and the first
//! mutation appends a new `,<flags>` segment.

use std::fmt;

use crate::error::{Result, SyncError};

/// The message has been read.
pub const FLAG_SEEN: char = 'S';
/// The message has been answered.
pub const FLAG_REPLIED: char = 'R';
/// The message is marked as important.
pub const FLAG_FLAGGED: char = 'F';

/// Flags of one maildir file name, always sorted and duplicate-free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaildirFlags {
    path: String,
    flags: Vec<char>,
    has_segment: bool,
}

impl MaildirFlags {
    /// Parse the trailing flag segment of `path`.
    ///
    /// Never fails; unknown flag characters are kept as-is.
    pub fn parse(path: impl Into<String>) -> Self {
        let path = path.into();
        let (flags, has_segment) = match flag_segment(&path) {
            Some(segment) => (normalize(segment.chars()), true),
            None => (Vec::new(), false),
        };
        Self {
            path,
            flags,
            has_segment,
        }
    }

    /// The path reflecting every mutation applied so far.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Consume the codec and return the current path.
    pub fn into_path(self) -> String {
        self.path
    }

    /// Current flags in ascending order.
    pub fn flags(&self) -> &[char] {
        &self.flags
    }

    /// Current flags as the string that is written into the file name.
    pub fn flag_string(&self) -> String {
        self.flags.iter().collect()
    }

    /// `true` iff `flag` is currently set.
    pub fn has_flag(&self, flag: char) -> bool {
        self.flags.binary_search(&flag).is_ok()
    }

    pub fn is_seen(&self) -> bool {
        self.has_flag(FLAG_SEEN)
    }

    pub fn is_replied(&self) -> bool {
        self.has_flag(FLAG_REPLIED)
    }

    pub fn is_flagged(&self) -> bool {
        self.has_flag(FLAG_FLAGGED)
    }

    /// Add a flag (no-op if already present) and rewrite the path.
    ///
    /// `code` must be exactly one character; otherwise
    /// [`SyncError::InvalidFlag`] is returned and nothing changes.
    pub fn set_flag(&mut self, code: &str) -> Result<()> {
        let flag = single_char(code)?;
        if let Err(pos) = self.flags.binary_search(&flag) {
            self.flags.insert(pos, flag);
            self.rebuild_path();
        }
        Ok(())
    }

    /// Remove a flag if present and rewrite the path.
    pub fn remove_flag(&mut self, code: &str) -> Result<()> {
        let flag = single_char(code)?;
        if let Ok(pos) = self.flags.binary_search(&flag) {
            self.flags.remove(pos);
            self.rebuild_path();
        }
        Ok(())
    }

    /// Remove the flag if present, otherwise behave like [`set_flag`](Self::set_flag).
    pub fn toggle_flag(&mut self, code: &str) -> Result<()> {
        let flag = single_char(code)?;
        match self.flags.binary_search(&flag) {
            Ok(pos) => {
                self.flags.remove(pos);
                self.rebuild_path();
                Ok(())
            }
            Err(_) => self.set_flag(code),
        }
    }

    /// Write the current flag set back into the trailing segment.
    fn rebuild_path(&mut self) {
        let flags = self.flag_string();
        if self.has_segment {
            let comma = self.path.rfind(',').unwrap_or(self.path.len());
            self.path.truncate(comma + 1);
        } else {
            self.path.push(',');
            self.has_segment = true;
        }
        self.path.push_str(&flags);
    }
}

impl fmt::Display for MaildirFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// The text after the last comma, if it is a flag segment at all.
fn flag_segment(path: &str) -> Option<&str> {
    let comma = path.rfind(',')?;
    let segment = &path[comma + 1..];
    if segment.contains('/') || segment.contains('\\') {
        return None;
    }
    Some(segment)
}

/// Sort ascending by code point and drop duplicates.
fn normalize(chars: impl Iterator<Item = char>) -> Vec<char> {
    let mut flags: Vec<char> = chars.collect();
    flags.sort_unstable();
    flags.dedup();
    flags
}

fn single_char(code: &str) -> Result<char> {
    let mut chars = code.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(SyncError::InvalidFlag(code.to_string())),
    }
}
