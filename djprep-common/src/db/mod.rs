//! Low-level database plumbing shared by the metadata store

pub mod init;
pub mod migrations;

pub use init::open_pool;
pub use migrations::{current_schema_version, run_migrations, Migration};
