//! Core data model: stored mail records, parsed envelopes, and addresses.

pub mod address;
pub mod envelope;
pub mod record;
