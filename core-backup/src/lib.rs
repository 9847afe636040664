//! # Content Backup
//!
//! Snapshot, restore and clean of the Assetto Corsa Competizione
//! `Customs/Cars` and `Customs/Liveries` directories.
//!
//! ## Overview
//!
//! - `create_backup` writes a single `backup.zip` into the configured backup
//!   directory, replacing an existing archive only after confirmation
//! - `restore_backup` cleans both subtrees and extracts the archive over them
//! - `clean_content` empties both subtrees
//!
//! Every operation reports its own failure as a `BackupEvent::Failed`
//! notification before returning the error.

pub mod error;
pub mod manager;

pub use error::{BackupError, Result};
pub use manager::{
    BackupManager, BackupOutcome, DeclineOverwrite, OverwriteConfirmation, ARCHIVE_NAME,
};
