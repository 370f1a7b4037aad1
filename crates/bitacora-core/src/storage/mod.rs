//! Storage layer
//!
//! - `entries`: the `log_entries` table in `logbook.db`
//! - `schema`: table creation and schema versioning
//! - `error`: typed storage errors shared with the media store

pub mod entries;
pub mod error;
pub mod schema;

pub use entries::{EntryStore, HOME_LIMIT, PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
