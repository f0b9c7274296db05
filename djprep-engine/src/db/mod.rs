//! Metadata Store: typed access over the tables defined in
//! `schema`. Pool setup itself lives in `djprep_common::db`; this module
//! only owns the engine-specific schema and row-level operations.

pub mod analyses;
pub mod content_store;
pub mod cue_edits;
pub mod jobs;
pub mod schema;
pub mod sessions;
pub mod similarity;
pub mod tracks;
