//! Ledger store
//!
//! The ledger is an ordinary Discord text channel. Each case is one message
//! with a single embed; message IDs are snowflakes and therefore strictly
//! increasing in creation order. No multi-message transactions exist.

use crate::modlog::ModLogResult;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{
    ChannelId, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, CreateMessage, EditMessage,
    GetMessages, Http, Message, MessageId, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Location of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryRef {
    pub channel_id: u64,
    pub entry_id: u64,
}

/// The structured block of a ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryContent {
    pub color: u32,
    pub author_name: String,
    pub author_icon: Option<String>,
    pub description: String,
    pub footer: String,
    pub timestamp: DateTime<Utc>,
}

/// One message in a ledger channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Message ID, ordered by creation
    pub id: u64,
    pub channel_id: u64,
    /// User who posted the message
    pub author_id: u64,
    /// `None` for messages without an embed
    pub content: Option<EntryContent>,
}

impl LedgerEntry {
    #[must_use]
    pub fn entry_ref(&self) -> EntryRef {
        EntryRef {
            channel_id: self.channel_id,
            entry_id: self.id,
        }
    }
}

/// Ordered, paginated, mutable message channel holding ledger entries
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Post a new entry
    async fn post(&self, channel_id: u64, content: EntryContent) -> ModLogResult<LedgerEntry>;

    /// Replace the content of an existing entry
    async fn edit(&self, entry: EntryRef, content: EntryContent) -> ModLogResult<LedgerEntry>;

    /// Delete an entry
    async fn delete(&self, entry: EntryRef) -> ModLogResult<()>;

    /// The most recent entries, newest first
    async fn fetch_recent(&self, channel_id: u64, limit: u8) -> ModLogResult<Vec<LedgerEntry>>;

    /// Entries created after `after_id`, oldest first
    async fn fetch_after(
        &self,
        channel_id: u64,
        after_id: u64,
        limit: u8,
    ) -> ModLogResult<Vec<LedgerEntry>>;
}

/// Ledger store backed by the Discord HTTP API
#[derive(Clone)]
pub struct DiscordLedger {
    http: Arc<Http>,
}

impl DiscordLedger {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait::async_trait]
impl LedgerStore for DiscordLedger {
    async fn post(&self, channel_id: u64, content: EntryContent) -> ModLogResult<LedgerEntry> {
        let message = ChannelId::new(channel_id)
            .send_message(&*self.http, CreateMessage::new().embed(build_embed(&content)))
            .await?;
        Ok(entry_from_message(&message))
    }

    async fn edit(&self, entry: EntryRef, content: EntryContent) -> ModLogResult<LedgerEntry> {
        let message = ChannelId::new(entry.channel_id)
            .edit_message(
                &*self.http,
                MessageId::new(entry.entry_id),
                EditMessage::new().content("").embed(build_embed(&content)),
            )
            .await?;
        Ok(entry_from_message(&message))
    }

    async fn delete(&self, entry: EntryRef) -> ModLogResult<()> {
        ChannelId::new(entry.channel_id)
            .delete_message(&*self.http, MessageId::new(entry.entry_id))
            .await?;
        Ok(())
    }

    async fn fetch_recent(&self, channel_id: u64, limit: u8) -> ModLogResult<Vec<LedgerEntry>> {
        let messages = ChannelId::new(channel_id)
            .messages(&*self.http, GetMessages::new().limit(limit))
            .await?;
        Ok(messages.iter().map(entry_from_message).collect())
    }

    async fn fetch_after(
        &self,
        channel_id: u64,
        after_id: u64,
        limit: u8,
    ) -> ModLogResult<Vec<LedgerEntry>> {
        let messages = ChannelId::new(channel_id)
            .messages(
                &*self.http,
                GetMessages::new().after(MessageId::new(after_id)).limit(limit),
            )
            .await?;
        debug!(
            channel_id = %channel_id,
            after_id = %after_id,
            fetched = messages.len(),
            "Fetched ledger page"
        );
        // Discord returns newest first regardless of the anchor
        let mut entries: Vec<LedgerEntry> = messages.iter().map(entry_from_message).collect();
        entries.sort_by_key(|entry| entry.id);
        Ok(entries)
    }
}

fn build_embed(content: &EntryContent) -> CreateEmbed {
    let mut author = CreateEmbedAuthor::new(&content.author_name);
    if let Some(icon) = &content.author_icon {
        author = author.icon_url(icon);
    }

    CreateEmbed::new()
        .colour(content.color)
        .author(author)
        .description(&content.description)
        .footer(CreateEmbedFooter::new(&content.footer))
        .timestamp(Timestamp::from(content.timestamp))
}

/// Convert a Discord message into a ledger entry. Only the first embed is
/// considered.
pub fn entry_from_message(message: &Message) -> LedgerEntry {
    let content = message.embeds.first().map(|embed| {
        let timestamp = embed.timestamp.unwrap_or(message.timestamp);
        EntryContent {
            color: embed.colour.map_or(0, |colour| colour.0),
            author_name: embed
                .author
                .as_ref()
                .map(|author| author.name.clone())
                .unwrap_or_default(),
            author_icon: embed.author.as_ref().and_then(|author| author.icon_url.clone()),
            description: embed.description.clone().unwrap_or_default(),
            footer: embed
                .footer
                .as_ref()
                .map(|footer| footer.text.clone())
                .unwrap_or_default(),
            timestamp: DateTime::from_timestamp(timestamp.unix_timestamp(), 0)
                .unwrap_or_default(),
        }
    });

    LedgerEntry {
        id: message.id.get(),
        channel_id: message.channel_id.get(),
        author_id: message.author.id.get(),
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_ref() {
        let entry = LedgerEntry {
            id: 10,
            channel_id: 20,
            author_id: 30,
            content: None,
        };
        assert_eq!(
            entry.entry_ref(),
            EntryRef {
                channel_id: 20,
                entry_id: 10
            }
        );
    }
}
