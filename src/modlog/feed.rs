//! Ledger feed
//!
//! Fan-out of newly created channel messages to whoever is waiting on them.
//! The gateway handler publishes messages posted in log channels; correlation
//! waits subscribe for the duration of a single command.

use crate::modlog::LedgerEntry;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Messages buffered per observer before it starts lagging.
///
/// The feed is shared by every guild. An observer that falls more than this
/// many log entries behind skips the oldest, which can include the entry it
/// waits for; the wait then ends empty at its deadline.
const FEED_CAPACITY: usize = 1024;

/// Broadcast hub for newly created ledger entries
#[derive(Clone)]
pub struct LedgerFeed {
    tx: broadcast::Sender<LedgerEntry>,
}

impl Default for LedgerFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    /// Publish a newly created entry to every current observer
    pub fn publish(&self, entry: LedgerEntry) {
        // No observers is the common case
        let _ = self.tx.send(entry);
    }

    /// Start observing. Only entries published after this call are seen.
    #[must_use]
    pub fn subscribe(&self) -> LedgerObserver {
        LedgerObserver {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live observers
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A live subscription to the feed. Dropping it releases the subscription.
pub struct LedgerObserver {
    rx: broadcast::Receiver<LedgerEntry>,
}

impl LedgerObserver {
    /// Wait for the next entry. Returns `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<LedgerEntry> {
        loop {
            match self.rx.recv().await {
                Ok(entry) => return Some(entry),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Ledger observer lagged, entries skipped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for LedgerObserver {
    fn drop(&mut self) {
        debug!("Ledger observer released");
    }
}
