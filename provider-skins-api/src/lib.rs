//! # Skins API Provider
//!
//! Implements `RemoteInventory` for the HTTP/JSON skin server.
//!
//! ## Overview
//!
//! This module provides:
//! - One-request listings from the flat `/api/skins/list` manifest
//! - Change tokens (`sum`) and descriptive fields carried inline per entry
//! - Streaming downloads with `Content-Length` driven progress
//! - Basic authentication on every request
//! - Retry with backoff for listings only

pub mod connector;
pub mod error;
pub mod types;

pub use connector::SkinsApiConnector;
pub use error::{Result, SkinsApiError};
pub use types::{ManifestEntry, Scalar, Timestamp};
