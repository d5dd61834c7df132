//! Ingestion pipeline for the Open Science Tracker: journal directories and
//! research-transparency exports are read in batches, normalised, keyed,
//! linked to journals, scored, and written to SQLite.

pub mod cli;
pub mod commands;
pub mod common;
pub mod directory;
pub mod identity;
pub mod ingest;
pub mod normalize;
pub mod reader;
pub mod score;
pub mod store;
