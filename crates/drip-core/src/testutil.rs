//! Shared in-memory fakes for core tests.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicI32, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    catalog::{Catalog, ContentItem},
    domain::{ChatId, MessageId, MessageRef},
    messaging::{
        port::{Transport, TransportError, TransportResult},
        types::InlineKeyboard,
    },
    user::{Language, SkipDays, User},
};

/// Records every outbound call; failure modes are scripted per method.
#[derive(Default)]
pub struct FakeTransport {
    next_id: AtomicI32,
    pub sent: Mutex<Vec<(MessageRef, String)>>,
    pub photos: Mutex<Vec<(MessageRef, PathBuf, String)>>,
    pub edits: Mutex<Vec<(MessageRef, String)>>,
    pub deleted: Mutex<Vec<MessageRef>>,
    /// Errors returned by upcoming `send`/`send_inline_keyboard` calls, in order.
    pub fail_sends: Mutex<VecDeque<TransportError>>,
    /// Errors returned by upcoming `send_photo` calls, in order.
    pub fail_photos: Mutex<VecDeque<TransportError>>,
    /// When set, every edit fails with `MessageGone`.
    pub fail_edits: AtomicBool,
    /// When set, every delete fails with `MessageGone`.
    pub fail_deletes: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI32::new(1),
            ..Self::default()
        }
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        MessageRef {
            chat_id,
            message_id: MessageId(id),
        }
    }

    pub fn queue_send_failure(&self, err: TransportError) {
        self.fail_sends.lock().unwrap().push_back(err);
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn last_sent(&self) -> Option<MessageRef> {
        self.sent.lock().unwrap().last().map(|(m, _)| *m)
    }

    pub fn last_edit(&self) -> Option<(MessageRef, String)> {
        self.edits.lock().unwrap().last().cloned()
    }

    pub fn deleted_ids(&self) -> Vec<MessageRef> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, chat_id: ChatId, text: &str) -> TransportResult<MessageRef> {
        if let Some(err) = self.fail_sends.lock().unwrap().pop_front() {
            return Err(err);
        }
        let msg = self.alloc(chat_id);
        self.sent.lock().unwrap().push((msg, text.to_string()));
        Ok(msg)
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: &Path,
        caption: &str,
    ) -> TransportResult<MessageRef> {
        if let Some(err) = self.fail_photos.lock().unwrap().pop_front() {
            return Err(err);
        }
        let msg = self.alloc(chat_id);
        self.photos
            .lock()
            .unwrap()
            .push((msg, photo.to_path_buf(), caption.to_string()));
        Ok(msg)
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> TransportResult<()> {
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(TransportError::MessageGone("message too old to edit".into()));
        }
        self.edits.lock().unwrap().push((msg, text.to_string()));
        Ok(())
    }

    async fn edit_with_keyboard(
        &self,
        msg: MessageRef,
        text: &str,
        _keyboard: InlineKeyboard,
    ) -> TransportResult<()> {
        self.edit_text(msg, text).await
    }

    async fn delete_message(&self, msg: MessageRef) -> TransportResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(TransportError::MessageGone("message too old to delete".into()));
        }
        self.deleted.lock().unwrap().push(msg);
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        _keyboard: InlineKeyboard,
    ) -> TransportResult<MessageRef> {
        self.send(chat_id, text).await
    }

    async fn answer_callback(&self, _callback_id: &str, _text: Option<&str>) -> TransportResult<()> {
        Ok(())
    }
}

/// Catalog that always returns the same item.
pub struct FixedCatalog {
    pub item: ContentItem,
}

impl FixedCatalog {
    pub fn new() -> Self {
        Self {
            item: ContentItem {
                id: 1,
                title: "Patience".into(),
                body: "One day at a time.".into(),
                tip: None,
                image: None,
            },
        }
    }

    pub fn with_image(path: impl Into<PathBuf>) -> Self {
        let mut this = Self::new();
        this.item.image = Some(path.into());
        this
    }
}

impl Catalog for FixedCatalog {
    fn random_item(&self, _language: Language) -> Option<ContentItem> {
        Some(self.item.clone())
    }
}

pub fn test_user(chat_id: i64) -> User {
    User {
        chat_id: ChatId(chat_id),
        language: Language::Ru,
        timezone: chrono_tz::Europe::Moscow,
        send_time: "08:00".parse().unwrap(),
        skip_days: SkipDays::weekends(),
        active: true,
        last_delivered: None,
    }
}
