//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` with rustls, retry with backoff for
//!   buffered requests and streamed downloads for skin packages
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use bridge_desktop::ReqwestHttpClient;
//! use bridge_traits::HttpClient;
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new()?);
//!     // Hand to the manifest transport
//!     Ok(())
//! }
//! ```

mod http;

pub use http::ReqwestHttpClient;
