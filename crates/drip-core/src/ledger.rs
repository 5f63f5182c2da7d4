//! Bounded per-chat record of messages the bot has sent.
//!
//! Exists so the unsubscribe flow can bulk-delete a chat's visible history.
//! Eviction only drops the bookkeeping entry; it never calls the transport.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{ChatId, MessageRef};

/// Maximum entries retained per chat; oldest evicted first.
pub const LEDGER_CAPACITY: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Welcome,
    Daily,
    Settings,
    Menu,
    Test,
}

#[derive(Clone, Debug)]
pub struct LedgerEntry {
    pub msg: MessageRef,
    pub kind: MessageKind,
    pub sent_at: DateTime<Utc>,
}

/// Append/evict is serialized per chat id but independent across chats:
/// the outer map lock is only held long enough to clone the per-chat handle.
#[derive(Default)]
pub struct MessageLedger {
    chats: Mutex<HashMap<i64, Arc<Mutex<VecDeque<LedgerEntry>>>>>,
}

impl MessageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    async fn chat_entries(&self, chat_id: ChatId) -> Arc<Mutex<VecDeque<LedgerEntry>>> {
        let mut map = self.chats.lock().await;
        map.entry(chat_id.0).or_default().clone()
    }

    pub async fn record(&self, msg: MessageRef, kind: MessageKind) {
        let entries = self.chat_entries(msg.chat_id).await;
        let mut entries = entries.lock().await;
        entries.push_back(LedgerEntry {
            msg,
            kind,
            sent_at: Utc::now(),
        });
        while entries.len() > LEDGER_CAPACITY {
            entries.pop_front();
        }
    }

    /// Current entries for a chat, oldest first.
    pub async fn entries_for(&self, chat_id: ChatId) -> Vec<LedgerEntry> {
        let entries = self.chat_entries(chat_id).await;
        let entries = entries.lock().await;
        entries.iter().cloned().collect()
    }

    /// Drops every entry for the chat, regardless of whether the messages
    /// were actually deleted through the transport.
    pub async fn clear(&self, chat_id: ChatId) {
        let mut map = self.chats.lock().await;
        map.remove(&chat_id.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;

    fn msg(chat_id: i64, message_id: i32) -> MessageRef {
        MessageRef {
            chat_id: ChatId(chat_id),
            message_id: MessageId(message_id),
        }
    }

    #[tokio::test]
    async fn records_in_order() {
        let ledger = MessageLedger::new();
        ledger.record(msg(1, 10), MessageKind::Welcome).await;
        ledger.record(msg(1, 11), MessageKind::Daily).await;

        let entries = ledger.entries_for(ChatId(1)).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].msg.message_id, MessageId(10));
        assert_eq!(entries[1].msg.message_id, MessageId(11));
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() {
        let ledger = MessageLedger::new();
        for i in 0..(LEDGER_CAPACITY as i32 + 5) {
            ledger.record(msg(1, i), MessageKind::Daily).await;
        }

        let entries = ledger.entries_for(ChatId(1)).await;
        assert_eq!(entries.len(), LEDGER_CAPACITY);
        assert_eq!(entries[0].msg.message_id, MessageId(5));
        assert_eq!(
            entries.last().unwrap().msg.message_id,
            MessageId(LEDGER_CAPACITY as i32 + 4)
        );
    }

    #[tokio::test]
    async fn chats_are_independent() {
        let ledger = MessageLedger::new();
        ledger.record(msg(1, 1), MessageKind::Daily).await;
        ledger.record(msg(2, 1), MessageKind::Daily).await;

        ledger.clear(ChatId(1)).await;
        assert!(ledger.entries_for(ChatId(1)).await.is_empty());
        assert_eq!(ledger.entries_for(ChatId(2)).await.len(), 1);
    }
}
