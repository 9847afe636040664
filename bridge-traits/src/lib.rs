//! # Host Bridge Traits
//!
//! Contracts shared by the skin sync engine and its host-specific adapters.
//!
//! ## Overview
//!
//! This crate defines the seams between the engine and the outside world. Each
//! trait is a capability the engine needs but that is implemented elsewhere:
//! the desktop crate supplies HTTP, the provider crates supply transports, and
//! the host application may supply a log sink.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP with basic auth, retry and streamed downloads
//! - [`RemoteInventory`](inventory::RemoteInventory) - List and fetch skin packages
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to the host
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Every variant maps
//! to an [`ErrorKind`](error::ErrorKind) so failures reach the user with a
//! category tag. Implementations should:
//!
//! - Convert transport-specific errors to `BridgeError`
//! - Keep credentials out of error messages
//! - Include context such as the remote path or HTTP status
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single instance can be shared
//! by every worker in the pool.
//!
//! ## Examples
//!
//! ### Implementing RemoteInventory
//!
//! ```ignore
//! use bridge_traits::inventory::{Category, ProgressFn, RemoteInventory, RemoteSkin};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct StaticInventory(Vec<RemoteSkin>);
//!
//! #[async_trait]
//! impl RemoteInventory for StaticInventory {
//!     fn transport(&self) -> &'static str { "static" }
//!     fn endpoint(&self) -> String { "memory".into() }
//!     async fn ping(&self) -> Result<()> { Ok(()) }
//!     async fn list_items(&self, category: Category) -> Result<Vec<RemoteSkin>> {
//!         Ok(self.0.iter().filter(|s| s.id.category == category).cloned().collect())
//!     }
//!     async fn fetch_item(
//!         &self,
//!         skin: &RemoteSkin,
//!         sink: &mut (dyn tokio::io::AsyncWrite + Send + Unpin),
//!         progress: &ProgressFn<'_>,
//!     ) -> Result<u64> {
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod http;
pub mod inventory;
pub mod time;

pub use error::{BridgeError, ErrorKind};

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpStream, RetryPolicy};
pub use inventory::{Category, ProgressFn, RemoteInventory, RemoteSkin, SkinDetails, SkinId};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
