//! # Skin Sync Engine
//!
//! Decides what needs downloading, runs transfers on the shared worker pool
//! and applies packages to the local game installation.
//!
//! ## Overview
//!
//! This module manages the lifecycle of every listed skin, including:
//! - Resolving local paths per category and probing what is installed
//! - Classifying each skin as missing-parent, download, update or up to date
//! - Guarding each skin so at most one transfer runs for it at a time
//! - Streaming packages to a temporary file and extracting them with rollback
//! - Reconciling successive remote listings with the live item set
//!
//! ## Components
//!
//! - **Local Paths** (`paths`): Category-specific layout and existence probe
//! - **State** (`state`): Pure steady-state classification
//! - **Archive** (`archive`): Zip extraction confined to a target directory
//! - **Pipeline** (`pipeline`): Download-extract sequence with progress and cleanup
//! - **Sync Item** (`item`): Per-skin state holder and transfer trigger
//! - **Catalog** (`catalog`): Listing reconciliation and command subscriptions

pub mod archive;
pub mod catalog;
pub mod error;
pub mod item;
pub mod paths;
pub mod pipeline;
pub mod state;

pub use catalog::{ListingDiff, SkinCatalog};
pub use error::{Result, SyncError};
pub use item::{SyncContext, SyncItem};
pub use paths::{LocalFacts, LocalPaths};
pub use pipeline::{NoopObserver, Pipeline, ProgressTracker, TransferObserver};
pub use state::{classify, AppliedMarker, SkinState, TransferPhase};
