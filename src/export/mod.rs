//! Export stored records to external formats.

pub mod csv;
