//! # Skin Catalog
//!
//! Reconciles successive remote listings of one category with the live set
//! of [`SyncItem`]s.
//!
//! ## Overview
//!
//! - A skin seen for the first time becomes a new item and emits `Added`.
//! - A skin listed again gets its remote record refreshed and is reclassified.
//! - A skin missing from the latest listing is dropped and emits `Removed`;
//!   its command subscription goes with it. A transfer already running for it
//!   still finishes, because the queued task holds its own handle.
//!
//! Every entry subscribes to the [`CommandDispatcher`] with a weak handle to
//! its item, so bulk commands reach exactly the items currently listed.

use crate::error::{Result, SyncError};
use crate::item::{SyncContext, SyncItem};
use bridge_traits::{Category, RemoteSkin, SkinId};
use core_runtime::events::{CommandDispatcher, CoreEvent, ItemEvent, Subscription};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

struct CatalogEntry {
    item: Arc<SyncItem>,
    _subscription: Subscription,
}

/// Counts describing one applied listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingDiff {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

pub struct SkinCatalog {
    category: Category,
    root: PathBuf,
    context: Arc<SyncContext>,
    dispatcher: CommandDispatcher,
    entries: RwLock<BTreeMap<SkinId, CatalogEntry>>,
}

impl SkinCatalog {
    pub fn new(
        category: Category,
        root: impl Into<PathBuf>,
        context: Arc<SyncContext>,
        dispatcher: CommandDispatcher,
    ) -> Self {
        Self {
            category,
            root: root.into(),
            context,
            dispatcher,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Items in identity order.
    pub fn items(&self) -> Vec<Arc<SyncItem>> {
        self.read().values().map(|entry| entry.item.clone()).collect()
    }

    pub fn get(&self, id: &SkinId) -> Option<Arc<SyncItem>> {
        self.read().get(id).map(|entry| entry.item.clone())
    }

    /// Replaces the catalog contents with `records`.
    ///
    /// Records of another category are skipped; when an id repeats, the last
    /// record wins.
    pub fn apply_listing(&self, records: Vec<RemoteSkin>) -> ListingDiff {
        let mut listed: BTreeMap<SkinId, RemoteSkin> = BTreeMap::new();
        for record in records {
            if record.id.category != self.category {
                warn!(skin = %record.id, category = %self.category, "Skipping record of another category");
                continue;
            }
            listed.insert(record.id.clone(), record);
        }

        let mut diff = ListingDiff::default();
        let mut fresh = Vec::new();
        let removed: Vec<CatalogEntry>;
        {
            let mut entries = self.write();

            let stale: Vec<SkinId> = entries
                .keys()
                .filter(|id| !listed.contains_key(*id))
                .cloned()
                .collect();
            removed = stale.iter().filter_map(|id| entries.remove(id)).collect();

            for (id, record) in listed {
                match entries.get(&id) {
                    Some(entry) => {
                        entry.item.update_remote(record);
                        diff.updated += 1;
                    }
                    None => {
                        let item = SyncItem::new(record, &self.root, self.context.clone());
                        let subscription = self.subscribe(&item);
                        fresh.push(item.clone());
                        entries.insert(
                            id,
                            CatalogEntry {
                                item,
                                _subscription: subscription,
                            },
                        );
                    }
                }
            }
        }

        diff.added = fresh.len();
        diff.removed = removed.len();

        for entry in removed {
            debug!(skin = %entry.item.id(), "Skin no longer listed");
            self.emit(ItemEvent::Removed {
                id: entry.item.id().clone(),
            });
        }

        for item in fresh {
            self.emit(ItemEvent::Added {
                id: item.id().clone(),
                display_name: item.display_name(),
                state: item.state(),
            });
        }

        info!(category = %self.category, added = diff.added, updated = diff.updated, removed = diff.removed, "Listing applied");
        diff
    }

    /// Queues a transfer for one listed skin.
    pub fn download(&self, id: &SkinId) -> Result<bool> {
        let item = self
            .get(id)
            .ok_or_else(|| SyncError::UnknownSkin(id.clone()))?;
        item.trigger()
    }

    /// Reclassifies every item from disk, e.g. after a restore or clean.
    pub fn refresh_local(&self) {
        for item in self.items() {
            item.recompute();
        }
    }

    fn subscribe(&self, item: &Arc<SyncItem>) -> Subscription {
        let weak = Arc::downgrade(item);
        self.dispatcher.subscribe(move |command| {
            if let Some(item) = weak.upgrade() {
                item.handle_command(*command);
            }
        })
    }

    fn emit(&self, event: ItemEvent) {
        let _ = self.context.events.emit(CoreEvent::Item(event));
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<SkinId, CatalogEntry>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<SkinId, CatalogEntry>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for SkinCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkinCatalog")
            .field("category", &self.category)
            .field("root", &self.root)
            .field("items", &self.len())
            .finish()
    }
}
