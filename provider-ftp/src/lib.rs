//! # FTP Tree Provider
//!
//! Implements `RemoteInventory` by walking an FTP directory tree.
//!
//! ## Overview
//!
//! This module provides:
//! - Listings by traversal of `{category}/{league}/{car}/{skin file}`
//! - Per-file modification times from `MLSD` facts, read in a fixed UTC offset
//! - Tolerance for unreadable subdirectories (skipped, never fatal)
//! - Streamed `RETR` downloads with a `SIZE` pre-query for progress
//!
//! FTP sessions are blocking; every session runs on `spawn_blocking`.

pub mod connector;
pub mod error;
pub mod session;

pub use connector::FtpConnector;
pub use error::{FtpError, Result};
pub use session::{DirEntry, EntryKind, SessionFactory, SuppaFtpFactory, TreeSession};
