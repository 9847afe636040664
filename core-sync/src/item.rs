//! # Sync Item
//!
//! Long-lived holder for one listed skin: its latest remote record, its local
//! paths, its displayed state and the in-flight guard for transfers.
//!
//! ## Lifecycle
//!
//! ```text
//!             trigger()                 pipeline done (ok or err)
//!  steady ───────────────> Transferring ─────────────────────────> steady
//!  state    guard set,     (Waiting →    guard dropped: state      (recomputed
//!           task queued    Downloading → recomputed, flag cleared   from disk)
//!                          Extracting)
//! ```
//!
//! The guard is acquired before the task is queued and released only by the
//! task (or by the queue refusing it), so at most one pipeline runs per item.
//! While the flag is set, re-listings update the remote record but never
//! overwrite the transient state.

use crate::error::Result;
use crate::paths::{LocalFacts, LocalPaths};
use crate::pipeline::{Pipeline, TransferObserver};
use crate::state::{classify, AppliedMarker, SkinState, TransferPhase};
use bridge_traits::{RemoteSkin, SkinId};
use core_runtime::events::{CoreEvent, EventSender, ItemEvent, SyncCommand};
use core_runtime::WorkerPool;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

/// Collaborators shared by every item.
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub pool: WorkerPool,
    pub events: EventSender,
    pub pipeline: Pipeline,
}

impl SyncContext {
    pub fn new(pool: WorkerPool, events: EventSender, pipeline: Pipeline) -> Self {
        Self {
            pool,
            events,
            pipeline,
        }
    }

    fn emit(&self, event: ItemEvent) {
        // A closed channel only means nobody is listening any more.
        let _ = self.events.emit(CoreEvent::Item(event));
    }
}

pub struct SyncItem {
    id: SkinId,
    paths: LocalPaths,
    context: Arc<SyncContext>,
    remote: RwLock<RemoteSkin>,
    state: Mutex<SkinState>,
    applied: Mutex<Option<AppliedMarker>>,
    in_flight: AtomicBool,
    received: AtomicU64,
}

impl SyncItem {
    /// Creates the item and classifies it from the current disk facts.
    pub fn new(remote: RemoteSkin, root: &Path, context: Arc<SyncContext>) -> Arc<Self> {
        let id = remote.id.clone();
        let paths = LocalPaths::resolve(root, &id);
        let state = classify(id.category, &paths.probe(), &remote, None);

        Arc::new(Self {
            id,
            paths,
            context,
            remote: RwLock::new(remote),
            state: Mutex::new(state),
            applied: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            received: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> &SkinId {
        &self.id
    }

    pub fn display_name(&self) -> String {
        self.id.display_name()
    }

    pub fn paths(&self) -> &LocalPaths {
        &self.paths
    }

    pub fn remote(&self) -> RemoteSkin {
        self.remote
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn state(&self) -> SkinState {
        *lock(&self.state)
    }

    pub fn applied(&self) -> Option<AppliedMarker> {
        lock(&self.applied).clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Bytes received by the current (or last) transfer.
    pub fn received_bytes(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }

    pub fn probe(&self) -> LocalFacts {
        self.paths.probe()
    }

    /// Replaces the remote record after a re-listing and reclassifies.
    pub fn update_remote(&self, remote: RemoteSkin) -> SkinState {
        if remote.id != self.id {
            warn!(expected = %self.id, got = %remote.id, "Ignoring record for another skin");
            return self.state();
        }

        *self
            .remote
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = remote;
        self.recompute()
    }

    /// Reclassifies from disk unless a transfer owns the state.
    pub fn recompute(&self) -> SkinState {
        if self.is_in_flight() {
            return self.state();
        }
        self.settle()
    }

    fn settle(&self) -> SkinState {
        let remote = self.remote();
        let applied = self.applied();
        let state = classify(self.id.category, &self.paths.probe(), &remote, applied.as_ref());
        self.set_state(state);
        state
    }

    fn set_state(&self, state: SkinState) -> bool {
        let changed = {
            let mut current = lock(&self.state);
            let changed = *current != state;
            *current = state;
            changed
        };

        if changed {
            debug!(skin = %self.id, %state, "State changed");
            self.context.emit(ItemEvent::StateChanged {
                id: self.id.clone(),
                state,
            });
        }
        changed
    }

    /// Queues a download-extract run for this item.
    ///
    /// Returns `Ok(false)` without doing anything when the parent container
    /// is missing or a transfer is already in flight.
    ///
    /// # Errors
    ///
    /// Fails when the worker pool no longer accepts tasks; the item is
    /// settled back to its steady state first.
    pub fn trigger(self: &Arc<Self>) -> Result<bool> {
        if self.state() == SkinState::MissingParent {
            debug!(skin = %self.id, "Parent missing, transfer not started");
            return Ok(false);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(skin = %self.id, "Transfer already in flight");
            return Ok(false);
        }

        let guard = InFlightGuard {
            item: Arc::clone(self),
        };
        self.set_state(SkinState::Transferring(TransferPhase::Waiting));

        let item = Arc::clone(self);
        self.context
            .pool
            .submit(async move {
                let _guard = guard;
                item.run_transfer().await.map_err(anyhow::Error::from)
            })?;

        info!(skin = %self.id, "Transfer queued");
        Ok(true)
    }

    /// Applies a broadcast command; returns whether a transfer was queued.
    pub fn handle_command(self: &Arc<Self>, command: SyncCommand) -> bool {
        let wanted = match command {
            SyncCommand::DownloadAll => matches!(
                self.state(),
                SkinState::NeedsDownload | SkinState::NeedsUpdate
            ),
            SyncCommand::RecreateAll => self.state().can_transfer(),
            SyncCommand::Initialize | SyncCommand::Refresh => false,
        };

        if !wanted {
            return false;
        }

        match self.trigger() {
            Ok(queued) => queued,
            Err(e) => {
                warn!(skin = %self.id, error = %e, ?command, "Could not queue transfer");
                false
            }
        }
    }

    async fn run_transfer(&self) -> Result<()> {
        let remote = self.remote();
        let outcome = self
            .context
            .pipeline
            .run(&remote, &self.paths, &self.received, self)
            .await;

        match outcome {
            Ok(marker) => {
                *lock(&self.applied) = Some(marker);
                Ok(())
            }
            Err(e) => {
                warn!(skin = %self.id, error = %e, kind = %e.kind(), "Transfer failed");
                self.settle();
                self.context.emit(ItemEvent::Failed {
                    id: self.id.clone(),
                    kind: e.kind(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

impl TransferObserver for SyncItem {
    fn on_phase(&self, phase: TransferPhase) {
        self.set_state(SkinState::Transferring(phase));
    }

    fn on_progress(&self, percent: u8) {
        *lock(&self.state) = SkinState::Transferring(TransferPhase::Downloading { percent });
        self.context.emit(ItemEvent::Progress {
            id: self.id.clone(),
            percent,
        });
    }
}

impl std::fmt::Debug for SyncItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncItem")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}

/// Releases the in-flight flag after settling the item's state.
struct InFlightGuard {
    item: Arc<SyncItem>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.item.settle();
        self.item.in_flight.store(false, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
