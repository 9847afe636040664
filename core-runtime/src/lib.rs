//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the skin sync engine:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Typed notifications and the command dispatcher
//! - The shared worker pool
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that every other engine crate
//! depends on. It establishes the logging conventions, the single-consumer
//! notification channel and the bounded pool all transfers run on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod pool;

pub use error::{Error, Result};
pub use pool::{PoolStats, WorkerPool};
