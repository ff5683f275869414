//! `maildirsync`: a relational mirror of a maildir directory.
//!
//! This crate provides the synchronization engine (maildir flag codec,
//! directory scanner, ingestion pipeline and reconciler) together with the
//! envelope extractor and SQLite record store it drives.

pub mod config;
pub mod error;
pub mod export;
pub mod maildir;
pub mod model;
pub mod parser;
pub mod report;
pub mod store;
pub mod sync;
