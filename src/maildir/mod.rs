//! Maildir conventions: filename flags and directory scanning.

pub mod flags;
pub mod scanner;
