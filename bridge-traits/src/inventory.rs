//! Remote Inventory Abstraction
//!
//! Types describing a downloadable skin package and the transport-agnostic
//! contract used to list and fetch them.
//!
//! ## Overview
//!
//! Two transports implement [`RemoteInventory`]:
//! - the manifest transport (`provider-skins-api`), which returns one flat
//!   JSON record per skin including a change token
//! - the tree transport (`provider-ftp`), which walks `/{category}/{group}/{car}/`
//!   and reads freshness from directory metadata
//!
//! The sync engine only sees [`RemoteSkin`] records and never needs to know
//! which transport produced them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::AsyncWrite;

use crate::error::Result;

/// Supported game integrations.
///
/// Each has its own local directory shape; see `core_sync::paths`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Assetto Corsa: skins live under the car's own folder
    Ac,
    /// Assetto Corsa Competizione: liveries under `Customs/`
    Acc,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Ac, Category::Acc];

    /// Directory name used on the tree transport and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ac => "ac",
            Category::Acc => "acc",
        }
    }

    /// Map the numeric game id used by the manifest (2 = ac, 1 = acc).
    pub fn from_manifest_id(id: u32) -> Option<Self> {
        match id {
            2 => Some(Category::Ac),
            1 => Some(Category::Acc),
            _ => None,
        }
    }

    /// Whether a local parent container must exist before a skin can be installed.
    pub fn requires_parent(&self) -> bool {
        matches!(self, Category::Ac)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured identity of one skin.
///
/// Used as a map key across the engine; never rebuilt from concatenated strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SkinId {
    pub category: Category,
    /// Owning group (league) identifier
    pub group: String,
    /// Base content unit (car) name
    pub content: String,
    /// Skin name without file extension
    pub name: String,
}

impl SkinId {
    pub fn new(
        category: Category,
        group: impl Into<String>,
        content: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            category,
            group: group.into(),
            content: content.into(),
            name: name.into(),
        }
    }

    /// Label shown to the user: `{car}/{skin}` for ac, `{skin}` for acc.
    pub fn display_name(&self) -> String {
        match self.category {
            Category::Ac => format!("{}/{}", self.content, self.name),
            Category::Acc => self.name.clone(),
        }
    }
}

impl fmt::Display for SkinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}/{}",
            self.category, self.group, self.content, self.name
        )
    }
}

/// Optional descriptive fields carried by manifest entries.
///
/// Purely informational; never consulted for state classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinDetails {
    pub group_name: Option<String>,
    pub group_color: Option<String>,
    pub driver: Option<String>,
    pub team: Option<String>,
    pub class: Option<String>,
    pub year: Option<String>,
    pub number: Option<String>,
}

/// One listed remote skin package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSkin {
    pub id: SkinId,
    /// Package extension without the leading dot (e.g. `zip`)
    pub extension: String,
    /// Server-side modification time
    pub modified_at: Option<DateTime<Utc>>,
    /// Opaque change token (checksum) when the transport provides one
    pub change_token: Option<String>,
    /// Package size in bytes when known from the listing
    pub size: Option<u64>,
    #[serde(default)]
    pub details: SkinDetails,
}

impl RemoteSkin {
    /// File name of the package on the server.
    pub fn file_name(&self) -> String {
        if self.extension.is_empty() {
            self.id.name.clone()
        } else {
            format!("{}.{}", self.id.name, self.extension)
        }
    }
}

/// Split `name.ext` into stem and extension; the extension is empty when absent.
pub fn split_file_name(file_name: &str) -> (&str, &str) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (file_name, ""),
    }
}

/// Progress callback: `(total_bytes, chunk_bytes)`, invoked once per chunk.
///
/// `total_bytes` is 0 when the transport could not determine the size. The
/// callback may borrow from the caller's stack for the duration of the fetch.
pub type ProgressFn<'a> = dyn Fn(u64, u64) + Send + Sync + 'a;

/// Remote content source contract
///
/// # Example
///
/// ```ignore
/// use bridge_traits::inventory::{Category, RemoteInventory};
///
/// async fn count(inventory: &dyn RemoteInventory) -> Result<usize> {
///     inventory.ping().await?;
///     Ok(inventory.list_items(Category::Ac).await?.len())
/// }
/// ```
#[async_trait]
pub trait RemoteInventory: Send + Sync {
    /// Short transport label used in logs (`"manifest"`, `"tree"`).
    fn transport(&self) -> &'static str;

    /// Human readable endpoint, without credentials.
    fn endpoint(&self) -> String;

    /// Verify reachability and authentication.
    ///
    /// Fails with [`BridgeError::Connectivity`](crate::error::BridgeError::Connectivity).
    async fn ping(&self) -> Result<()>;

    /// List every skin available for `category`.
    async fn list_items(&self, category: Category) -> Result<Vec<RemoteSkin>>;

    /// List several categories in one refresh, one outcome per category.
    ///
    /// Lists them one after the other by default. Transports that receive
    /// every category in a single response override this to fetch once.
    async fn list_categories(
        &self,
        categories: &[Category],
    ) -> Vec<(Category, Result<Vec<RemoteSkin>>)> {
        let mut listings = Vec::with_capacity(categories.len());
        for &category in categories {
            listings.push((category, self.list_items(category).await));
        }
        listings
    }

    /// Stream the package bytes of `skin` into `sink`.
    ///
    /// Returns the number of bytes written. Fails with
    /// [`BridgeError::Transfer`](crate::error::BridgeError::Transfer) on a
    /// non-success status or when the stream breaks partway through.
    async fn fetch_item(
        &self,
        skin: &RemoteSkin,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        progress: &ProgressFn<'_>,
    ) -> Result<u64>;
}
