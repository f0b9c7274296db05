//! Shared plumbing for the DJ set prep engine: error types, the broadcast
//! event bus, data-directory resolution, and the schema-migration runner.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::EventBus;
