//! Delivery pipeline: pick one content item, render it, send it, record it.
//!
//! The pipeline performs no retries; transient failures are surfaced to the
//! scheduler so backoff stays centralized.

use std::sync::Arc;

use crate::{
    catalog::Catalog,
    domain::ChatId,
    errors::Error,
    formatting,
    ledger::{MessageKind, MessageLedger},
    messaging::{Transport, TransportError},
    store::UserStore,
    texts::{self, TextKey},
    Result,
};

#[derive(Clone)]
pub struct DeliveryPipeline {
    store: Arc<dyn UserStore>,
    catalog: Arc<dyn Catalog>,
    transport: Arc<dyn Transport>,
    ledger: Arc<MessageLedger>,
}

impl DeliveryPipeline {
    pub fn new(
        store: Arc<dyn UserStore>,
        catalog: Arc<dyn Catalog>,
        transport: Arc<dyn Transport>,
        ledger: Arc<MessageLedger>,
    ) -> Self {
        Self {
            store,
            catalog,
            transport,
            ledger,
        }
    }

    /// One scheduled delivery attempt for a chat.
    pub async fn deliver(&self, chat_id: ChatId) -> Result<()> {
        self.deliver_inner(chat_id, false).await
    }

    /// Immediate test delivery (`/test`), prefixed and recorded as such.
    pub async fn deliver_test(&self, chat_id: ChatId) -> Result<()> {
        self.deliver_inner(chat_id, true).await
    }

    async fn deliver_inner(&self, chat_id: ChatId, test: bool) -> Result<()> {
        let Some(user) = self.store.get(chat_id).await? else {
            tracing::warn!(chat_id = chat_id.0, "delivery target not found, skipping");
            return Ok(());
        };
        if !user.active {
            tracing::warn!(chat_id = chat_id.0, "delivery target inactive, skipping");
            return Ok(());
        }

        let Some(item) = self.catalog.random_item(user.language) else {
            tracing::warn!(
                chat_id = chat_id.0,
                language = user.language.as_str(),
                "no catalog content available, skipping"
            );
            return Ok(());
        };

        let mut text = formatting::format_item(&item);
        if test {
            text = format!("{}\n\n{text}", texts::text(user.language, TextKey::TestPrefix));
        }
        let kind = if test {
            MessageKind::Test
        } else {
            MessageKind::Daily
        };

        // Items with an image go out as a photo with the rendered text as
        // caption; if the photo send fails transiently we fall back to plain
        // text rather than dropping the whole delivery.
        let sent = match &item.image {
            Some(image) => match self.transport.send_photo(chat_id, image, &text).await {
                Ok(msg) => Ok(msg),
                Err(e) if !e.is_permanent() => {
                    tracing::warn!(
                        chat_id = chat_id.0,
                        item_id = item.id,
                        error = %e,
                        "photo send failed, falling back to text"
                    );
                    self.transport.send(chat_id, &text).await
                }
                Err(e) => Err(e),
            },
            None => self.transport.send(chat_id, &text).await,
        };

        let msg = sent.map_err(classify)?;
        self.ledger.record(msg, kind).await;

        let mut user = user;
        user.last_delivered = Some(item.id);
        self.store.put(user).await?;

        tracing::info!(chat_id = chat_id.0, item_id = item.id, test, "delivered content item");
        Ok(())
    }
}

/// Transport failure → delivery error taxonomy.
fn classify(e: TransportError) -> Error {
    if e.is_permanent() {
        Error::PermanentDelivery(e.to_string())
    } else {
        Error::TransientDelivery(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::ChatId,
        store::{InMemoryUserStore, UserStore},
        testutil::{test_user, FakeTransport, FixedCatalog},
    };
    use std::time::Duration;

    fn pipeline_with(
        store: Arc<InMemoryUserStore>,
        transport: Arc<FakeTransport>,
        catalog: Arc<FixedCatalog>,
    ) -> (DeliveryPipeline, Arc<MessageLedger>) {
        let ledger = Arc::new(MessageLedger::new());
        let pipeline = DeliveryPipeline::new(store, catalog, transport, ledger.clone());
        (pipeline, ledger)
    }

    #[tokio::test]
    async fn delivery_records_a_daily_entry() {
        let store = Arc::new(InMemoryUserStore::new());
        store.put(test_user(1)).await.unwrap();
        let transport = Arc::new(FakeTransport::new());
        let (pipeline, ledger) =
            pipeline_with(store.clone(), transport.clone(), Arc::new(FixedCatalog::new()));

        pipeline.deliver(ChatId(1)).await.unwrap();

        let entries = ledger.entries_for(ChatId(1)).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, MessageKind::Daily);
        assert_eq!(transport.sent_texts().len(), 1);
        assert!(transport.sent_texts()[0].contains("Patience"));

        let user = store.get(ChatId(1)).await.unwrap().unwrap();
        assert_eq!(user.last_delivered, Some(1));
    }

    #[tokio::test]
    async fn missing_or_inactive_user_is_a_noop() {
        let store = Arc::new(InMemoryUserStore::new());
        let mut inactive = test_user(2);
        inactive.active = false;
        store.put(inactive).await.unwrap();

        let transport = Arc::new(FakeTransport::new());
        let (pipeline, ledger) =
            pipeline_with(store, transport.clone(), Arc::new(FixedCatalog::new()));

        pipeline.deliver(ChatId(1)).await.unwrap();
        pipeline.deliver(ChatId(2)).await.unwrap();

        assert!(transport.sent_texts().is_empty());
        assert!(ledger.entries_for(ChatId(2)).await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_recipient_is_permanent() {
        let store = Arc::new(InMemoryUserStore::new());
        store.put(test_user(1)).await.unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport.queue_send_failure(TransportError::Unreachable("blocked".into()));
        let (pipeline, _) = pipeline_with(store, transport, Arc::new(FixedCatalog::new()));

        let err = pipeline.deliver(ChatId(1)).await.unwrap_err();
        assert!(matches!(err, Error::PermanentDelivery(_)));
    }

    #[tokio::test]
    async fn network_failures_are_transient() {
        let store = Arc::new(InMemoryUserStore::new());
        store.put(test_user(1)).await.unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport.queue_send_failure(TransportError::RetryAfter(Duration::from_secs(5)));
        let (pipeline, _) = pipeline_with(store, transport, Arc::new(FixedCatalog::new()));

        let err = pipeline.deliver(ChatId(1)).await.unwrap_err();
        assert!(matches!(err, Error::TransientDelivery(_)));
    }

    #[tokio::test]
    async fn photo_failure_falls_back_to_text() {
        let store = Arc::new(InMemoryUserStore::new());
        store.put(test_user(1)).await.unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport
            .fail_photos
            .lock()
            .unwrap()
            .push_back(TransportError::Network("timeout".into()));
        let catalog = Arc::new(FixedCatalog::with_image("/tmp/1.jpg"));
        let (pipeline, ledger) = pipeline_with(store, transport.clone(), catalog);

        pipeline.deliver(ChatId(1)).await.unwrap();

        assert!(transport.photos.lock().unwrap().is_empty());
        assert_eq!(transport.sent_texts().len(), 1);
        assert_eq!(ledger.entries_for(ChatId(1)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_is_prefixed_and_tagged() {
        let store = Arc::new(InMemoryUserStore::new());
        store.put(test_user(1)).await.unwrap();
        let transport = Arc::new(FakeTransport::new());
        let (pipeline, ledger) =
            pipeline_with(store, transport.clone(), Arc::new(FixedCatalog::new()));

        pipeline.deliver_test(ChatId(1)).await.unwrap();

        let entries = ledger.entries_for(ChatId(1)).await;
        assert_eq!(entries[0].kind, MessageKind::Test);
        assert!(transport.sent_texts()[0].contains("Тестовое сообщение"));
    }
}
