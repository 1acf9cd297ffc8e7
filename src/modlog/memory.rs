//! In-memory ledger used by the unit tests

use crate::modlog::{
    EntryContent, EntryRef, LedgerEntry, LedgerFeed, LedgerStore, ModLogError, ModLogResult,
};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Ledger kept in a vector, ordered by entry ID
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
    next_id: AtomicU64,
    /// Author recorded for entries created through [`LedgerStore::post`]
    poster_id: u64,
    feed: LedgerFeed,
}

impl MemoryLedger {
    pub fn new(poster_id: u64, feed: LedgerFeed) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1000),
            poster_id,
            feed,
        }
    }

    /// Append an entry authored by anyone and publish it to the feed
    pub fn push(&self, author_id: u64, channel_id: u64, content: Option<EntryContent>) -> LedgerEntry {
        let entry = LedgerEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            channel_id,
            author_id,
            content,
        };
        self.entries.lock().unwrap().push(entry.clone());
        self.feed.publish(entry.clone());
        entry
    }

    /// Every entry currently in a channel, oldest first
    pub fn entries(&self, channel_id: u64) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.channel_id == channel_id)
            .cloned()
            .collect()
    }

    pub fn get(&self, entry_id: u64) -> Option<LedgerEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|entry| entry.id == entry_id)
            .cloned()
    }
}

fn unknown(entry: EntryRef) -> ModLogError {
    ModLogError::Other(format!("Unknown message {}", entry.entry_id))
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn post(&self, channel_id: u64, content: EntryContent) -> ModLogResult<LedgerEntry> {
        Ok(self.push(self.poster_id, channel_id, Some(content)))
    }

    async fn edit(&self, entry: EntryRef, content: EntryContent) -> ModLogResult<LedgerEntry> {
        let mut entries = self.entries.lock().unwrap();
        let stored = entries
            .iter_mut()
            .find(|e| e.id == entry.entry_id && e.channel_id == entry.channel_id)
            .ok_or_else(|| unknown(entry))?;
        stored.content = Some(content);
        Ok(stored.clone())
    }

    async fn delete(&self, entry: EntryRef) -> ModLogResult<()> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| !(e.id == entry.entry_id && e.channel_id == entry.channel_id));
        if entries.len() == before {
            return Err(unknown(entry));
        }
        Ok(())
    }

    async fn fetch_recent(&self, channel_id: u64, limit: u8) -> ModLogResult<Vec<LedgerEntry>> {
        Ok(self
            .entries(channel_id)
            .into_iter()
            .rev()
            .take(usize::from(limit))
            .collect())
    }

    async fn fetch_after(
        &self,
        channel_id: u64,
        after_id: u64,
        limit: u8,
    ) -> ModLogResult<Vec<LedgerEntry>> {
        Ok(self
            .entries(channel_id)
            .into_iter()
            .filter(|entry| entry.id > after_id)
            .take(usize::from(limit))
            .collect())
    }
}
