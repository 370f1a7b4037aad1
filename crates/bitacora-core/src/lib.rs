//! Bitácora Core Library
//!
//! This crate provides the core functionality for Bitácora, a personal
//! vessel logbook that can mirror its entries as Signal K notes.
//!
//! # Architecture
//!
//! - **SQLite**: entries live in a single `log_entries` table
//! - **Signal K**: optional telemetry source and publish target, reached
//!   through the [`Telemetry`] trait
//!
//! All entry changes go through [`LogbookService`], which owns the ordering
//! of validation, enrichment, storage, media handling and publishing.
//!
//! # Quick Start
//!
//! ```text
//! let paths = DataPaths::resolve(None);
//! let config = Arc::new(ConfigStore::file(&paths));
//! let telemetry = Arc::new(SignalKClient::new(config.clone())?);
//! let service = LogbookService::open(&paths, config, telemetry)?;
//!
//! let id = service.quick_note("Anchored in Cala Portals").await?;
//! ```
//!
//! # Modules
//!
//! - `service`: Entry lifecycle (main entry point)
//! - `models`: Entries, entry types and sources
//! - `storage`: SQLite entry store
//! - `media`: Photo attachments
//! - `telemetry`: Signal K client
//! - `setup`: First-run setup and access requests
//! - `backup`: Backup archives
//! - `config`: Application configuration

pub mod backup;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod service;
pub mod setup;
pub mod storage;
pub mod telemetry;

pub use backup::{create_backup, BackupError};
pub use config::{Config, ConfigStore, DataPaths, SignalKSettings};
pub use error::{LogbookError, LogbookResult};
pub use media::{MediaStore, MediaUpload};
pub use models::{EntryFilter, EntrySource, EntryType, LogEntry, Position};
pub use service::{EntryForm, LogbookService};
pub use setup::SetupForm;
pub use storage::{EntryStore, StorageError};
pub use telemetry::{DisabledTelemetry, SignalKClient, Telemetry};
