//! # Notifications and Commands
//!
//! Typed messages flowing between the sync engine and the presentation layer.
//!
//! ## Overview
//!
//! Two directions, two mechanisms:
//! - **Engine → presentation**: [`CoreEvent`]s posted from worker tasks through
//!   an [`EventSender`] and drained by exactly one [`EventReceiver`]. The
//!   single consumer owns all UI-visible state, so every progress update and
//!   state change is a cross-thread hand-off rather than a same-thread call.
//! - **Presentation → engine**: [`SyncCommand`]s published through a
//!   [`CommandDispatcher`] to every live subscriber. Each sync item holds a
//!   [`Subscription`] guard; dropping the item drops the guard and the handler
//!   with it, so no callback outlives a skin removed from the listing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  emit   ┌─────────────┐  recv   ┌──────────────┐
//! │ Worker 1 ├────────>│             │         │              │
//! └──────────┘         │ unbounded   ├────────>│ UI consumer  │
//! ┌──────────┐  emit   │ mpsc queue  │         │ (single)     │
//! │ Worker N ├────────>│             │         └──────┬───────┘
//! └──────────┘         └─────────────┘                │ publish
//!                                                     v
//!                      ┌───────────────────┐   ┌─────────────┐
//!                      │ SyncItem handlers │<──┤ Dispatcher  │
//!                      └───────────────────┘   └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{event_channel, CoreEvent, StatusEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (sender, mut receiver) = event_channel();
//!
//! sender
//!     .emit(CoreEvent::Status(StatusEvent::Connecting {
//!         endpoint: "https://skins.example.com".to_string(),
//!     }))
//!     .ok();
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.description(), "Connecting to content server");
//! # }
//! ```
//!
//! ## Delivery
//!
//! The queue is unbounded: a slow consumer never causes progress or state
//! events to be dropped, and emitting never blocks a worker. Once the
//! receiver is dropped, `emit` returns an error that callers ignore.

use bridge_traits::{Category, ErrorKind, SkinId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use uuid::Uuid;

pub use tokio::sync::mpsc::error::SendError;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Server connectivity and listing outcomes
    Status(StatusEvent),
    /// Per-skin lifecycle
    Item(ItemEvent),
    /// Backup, restore and clean outcomes
    Backup(BackupEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Status(e) => e.description(),
            CoreEvent::Item(e) => e.description(),
            CoreEvent::Backup(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Status(StatusEvent::ConnectionFailed { .. })
            | CoreEvent::Status(StatusEvent::ListingFailed { .. })
            | CoreEvent::Item(ItemEvent::Failed { .. })
            | CoreEvent::Backup(BackupEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Backup(BackupEvent::ConfirmationDeclined { .. }) => EventSeverity::Warning,
            CoreEvent::Status(StatusEvent::Connected { .. })
            | CoreEvent::Status(StatusEvent::Listed { .. })
            | CoreEvent::Backup(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// The error category, for failure events.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            CoreEvent::Status(StatusEvent::ConnectionFailed { .. }) => Some(ErrorKind::Connectivity),
            CoreEvent::Status(StatusEvent::ListingFailed { kind, .. })
            | CoreEvent::Item(ItemEvent::Failed { kind, .. })
            | CoreEvent::Backup(BackupEvent::Failed { kind, .. }) => Some(*kind),
            _ => None,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Item State
// ============================================================================

/// Sub-phase of an active transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TransferPhase {
    /// Queued in the worker pool
    Waiting,
    /// Receiving bytes; `percent` is 0..=100
    Downloading { percent: u8 },
    /// Unpacking the package into the content directory
    Extracting,
}

/// Lifecycle state of one skin as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SkinState {
    /// The base car (or definition file) is not installed; download disabled
    MissingParent,
    /// Not installed locally
    NeedsDownload,
    /// Installed, but the server has a newer package
    NeedsUpdate,
    /// Installed and current; can be recreated
    UpToDate,
    /// A transfer is running
    Transferring(TransferPhase),
}

impl SkinState {
    pub fn is_transferring(&self) -> bool {
        matches!(self, SkinState::Transferring(_))
    }

    /// Whether the user may start a transfer from this state.
    pub fn can_transfer(&self) -> bool {
        !matches!(self, SkinState::MissingParent | SkinState::Transferring(_))
    }

    /// Button label used by the desktop shell.
    pub fn label(&self) -> &'static str {
        match self {
            SkinState::MissingParent => "Missing car",
            SkinState::NeedsDownload => "Download",
            SkinState::NeedsUpdate => "Update",
            SkinState::UpToDate => "Recreate",
            SkinState::Transferring(TransferPhase::Waiting) => "Waiting",
            SkinState::Transferring(TransferPhase::Downloading { .. }) => "Downloading",
            SkinState::Transferring(TransferPhase::Extracting) => "Extracting",
        }
    }
}

impl fmt::Display for SkinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Status Events
// ============================================================================

/// Connectivity and listing outcomes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum StatusEvent {
    /// Ping started.
    Connecting {
        /// Server endpoint, without credentials.
        endpoint: String,
    },
    /// Ping succeeded.
    Connected { endpoint: String },
    /// Ping failed; informational only, listing is still attempted.
    ConnectionFailed { endpoint: String, message: String },
    /// A category listing was applied.
    Listed {
        category: Category,
        /// Number of skins in the listing.
        count: usize,
    },
    /// A category listing failed; other categories are unaffected.
    ListingFailed {
        category: Category,
        kind: ErrorKind,
        message: String,
    },
}

impl StatusEvent {
    fn description(&self) -> &str {
        match self {
            StatusEvent::Connecting { .. } => "Connecting to content server",
            StatusEvent::Connected { .. } => "Connected to content server",
            StatusEvent::ConnectionFailed { .. } => "Cannot connect to content server",
            StatusEvent::Listed { .. } => "Skin list refreshed",
            StatusEvent::ListingFailed { .. } => "Skin list refresh failed",
        }
    }
}

// ============================================================================
// Item Events
// ============================================================================

/// Per-skin lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ItemEvent {
    /// A skin appeared in a listing.
    Added {
        id: SkinId,
        /// Label for the UI row.
        display_name: String,
        state: SkinState,
    },
    /// A skin disappeared from a listing.
    Removed { id: SkinId },
    /// State or transfer phase changed.
    StateChanged { id: SkinId, state: SkinState },
    /// Download progress; at most one per received chunk.
    Progress { id: SkinId, percent: u8 },
    /// A transfer failed; the item's state has already been recomputed.
    Failed {
        id: SkinId,
        kind: ErrorKind,
        message: String,
    },
}

impl ItemEvent {
    fn description(&self) -> &str {
        match self {
            ItemEvent::Added { .. } => "Skin listed",
            ItemEvent::Removed { .. } => "Skin no longer listed",
            ItemEvent::StateChanged { .. } => "Skin state changed",
            ItemEvent::Progress { .. } => "Download in progress",
            ItemEvent::Failed { .. } => "Skin transfer failed",
        }
    }

    /// Identity of the skin this event refers to.
    pub fn id(&self) -> &SkinId {
        match self {
            ItemEvent::Added { id, .. }
            | ItemEvent::Removed { id }
            | ItemEvent::StateChanged { id, .. }
            | ItemEvent::Progress { id, .. }
            | ItemEvent::Failed { id, .. } => id,
        }
    }
}

// ============================================================================
// Backup Events
// ============================================================================

/// Backup manager outcomes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum BackupEvent {
    /// `backup.zip` was written.
    Created {
        path: String,
        /// Number of files archived.
        files: usize,
    },
    /// The archive was extracted over the content root.
    Restored { path: String },
    /// Content subtrees were emptied.
    Cleaned,
    /// An operation failed at its boundary.
    Failed { kind: ErrorKind, message: String },
    /// An archive exists and overwriting it was not confirmed.
    ConfirmationDeclined { path: String },
}

impl BackupEvent {
    fn description(&self) -> &str {
        match self {
            BackupEvent::Created { .. } => "Backup created",
            BackupEvent::Restored { .. } => "Backup restored",
            BackupEvent::Cleaned => "Content cleaned",
            BackupEvent::Failed { .. } => "Backup operation failed",
            BackupEvent::ConfirmationDeclined { .. } => "Backup overwrite declined",
        }
    }
}

// ============================================================================
// Notification Channel
// ============================================================================

/// Creates the single-consumer notification channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        EventSender { sender },
        EventReceiver {
            receiver,
            filter: None,
        },
    )
}

/// Producer half; cheap to clone and safe to use from any worker.
#[derive(Clone)]
pub struct EventSender {
    sender: mpsc::UnboundedSender<CoreEvent>,
}

impl EventSender {
    /// Posts an event to the consumer.
    ///
    /// Never blocks. Fails only when the receiver has been dropped.
    pub fn emit(&self, event: CoreEvent) -> Result<(), SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl fmt::Debug for EventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Consumer half. Exactly one exists per channel.
pub struct EventReceiver {
    receiver: mpsc::UnboundedReceiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventReceiver {
    /// Adds a filter function; non-matching events are discarded.
    ///
    /// # Example
    ///
    /// ```rust
    /// use core_runtime::events::{event_channel, CoreEvent};
    ///
    /// let (_sender, receiver) = event_channel();
    /// let receiver = receiver.filter(|event| matches!(event, CoreEvent::Item(_)));
    /// ```
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// Returns `None` once every sender has been dropped and the queue is empty.
    pub async fn recv(&mut self) -> Option<CoreEvent> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Some(event);
            };

            if filter(&event) {
                return Some(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching event is currently queued.
    pub fn try_recv(&mut self) -> Option<CoreEvent> {
        loop {
            let event = self.receiver.try_recv().ok()?;

            let Some(filter) = &self.filter else {
                return Some(event);
            };

            if filter(&event) {
                return Some(event);
            }
        }
    }

    /// Drains every currently queued event that passes the filter.
    pub fn drain(&mut self) -> Vec<CoreEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl fmt::Debug for EventReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventReceiver")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Command Dispatcher
// ============================================================================

/// Commands broadcast from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncCommand {
    /// First connection after startup
    Initialize,
    /// Re-list every configured category
    Refresh,
    /// Transfer every skin needing a download or an update
    DownloadAll,
    /// Re-apply every installable skin from scratch
    RecreateAll,
}

/// Identifier of a registered command handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

type CommandHandler = Arc<dyn Fn(&SyncCommand) + Send + Sync>;
type HandlerMap = Mutex<HashMap<SubscriptionId, CommandHandler>>;

/// Synchronous publish/subscribe hub for [`SyncCommand`]s.
#[derive(Clone, Default)]
pub struct CommandDispatcher {
    handlers: Arc<HandlerMap>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler`; it stays registered while the returned guard lives.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SyncCommand) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        lock_handlers(&self.handlers).insert(id, Arc::new(handler));
        Subscription {
            id,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    /// Invokes every registered handler on the calling thread.
    ///
    /// Handlers run outside the registry lock, so they may subscribe or drop
    /// subscriptions themselves. Returns the number of handlers invoked.
    pub fn publish(&self, command: SyncCommand) -> usize {
        let snapshot: Vec<CommandHandler> =
            lock_handlers(&self.handlers).values().cloned().collect();

        tracing::debug!(?command, handlers = snapshot.len(), "Publishing command");

        for handler in &snapshot {
            handler(&command);
        }
        snapshot.len()
    }

    /// Returns the number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock_handlers(&self.handlers).len()
    }
}

impl fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

fn lock_handlers(
    handlers: &HandlerMap,
) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, CommandHandler>> {
    // A panicking handler never holds the lock, so poisoning carries no torn state.
    handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registration guard; unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: SubscriptionId,
    handlers: Weak<HandlerMap>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handlers) = self.handlers.upgrade() {
            lock_handlers(&handlers).remove(&self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
