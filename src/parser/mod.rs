//! Message parsing: header decoding, date parsing, and envelope extraction.

pub mod envelope;
pub mod header;
