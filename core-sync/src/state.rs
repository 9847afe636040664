//! # State Classification
//!
//! Pure mapping from (local facts, remote record, last-applied marker) to a
//! steady [`SkinState`].
//!
//! ## Rules
//!
//! 1. The category needs a parent container and it is absent → `MissingParent`
//! 2. The installed item directory is absent → `NeedsDownload`
//! 3. The remote freshness indicator differs from what was last applied → `NeedsUpdate`
//! 4. Otherwise → `UpToDate`
//!
//! Freshness in rule 3 is decided by the first comparison whose inputs are
//! all known:
//!
//! - remote change token vs. applied change token (mismatch is newer)
//! - remote timestamp vs. applied remote timestamp (strictly greater is newer)
//! - remote timestamp vs. the item's local modification time
//!
//! An unknown remote timestamp is never considered newer.

use crate::paths::LocalFacts;
use bridge_traits::{Category, RemoteSkin};
use chrono::{DateTime, Utc};

pub use core_runtime::events::{SkinState, TransferPhase};

/// Freshness values recorded after a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppliedMarker {
    pub token: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl AppliedMarker {
    pub fn from_remote(remote: &RemoteSkin) -> Self {
        Self {
            token: remote.change_token.clone(),
            modified_at: remote.modified_at,
        }
    }
}

/// Computes the steady state of one skin.
pub fn classify(
    category: Category,
    facts: &LocalFacts,
    remote: &RemoteSkin,
    applied: Option<&AppliedMarker>,
) -> SkinState {
    if category.requires_parent() && !facts.parent_present {
        return SkinState::MissingParent;
    }

    if !facts.item_present {
        return SkinState::NeedsDownload;
    }

    if remote_is_newer(facts, remote, applied) {
        SkinState::NeedsUpdate
    } else {
        SkinState::UpToDate
    }
}

fn remote_is_newer(facts: &LocalFacts, remote: &RemoteSkin, applied: Option<&AppliedMarker>) -> bool {
    if let Some(applied) = applied {
        if let (Some(remote_token), Some(applied_token)) =
            (remote.change_token.as_deref(), applied.token.as_deref())
        {
            return remote_token != applied_token;
        }
        if let Some(applied_at) = applied.modified_at {
            return newer(remote.modified_at, Some(applied_at));
        }
    }

    newer(remote.modified_at, facts.modified_at)
}

fn newer(remote: Option<DateTime<Utc>>, local: Option<DateTime<Utc>>) -> bool {
    match (remote, local) {
        (Some(remote), Some(local)) => remote > local,
        _ => false,
    }
}
