//! Unsubscribe flow: wipe the chat's tracked history, tear down the
//! schedule, deactivate the user, confirm.
//!
//! The ordering is load-bearing: everything is cleaned *before* the final
//! confirmation goes out, so the confirmation never becomes a deletion
//! candidate on a future run.

use std::sync::Arc;

use crate::{
    domain::{ChatId, MessageRef},
    ledger::MessageLedger,
    messaging::Transport,
    scheduler::DeliveryScheduler,
    store::UserStore,
    texts::{self, TextKey},
    Result,
};

pub struct Unsubscriber {
    store: Arc<dyn UserStore>,
    ledger: Arc<MessageLedger>,
    scheduler: DeliveryScheduler,
    transport: Arc<dyn Transport>,
}

impl Unsubscriber {
    pub fn new(
        store: Arc<dyn UserStore>,
        ledger: Arc<MessageLedger>,
        scheduler: DeliveryScheduler,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            store,
            ledger,
            scheduler,
            transport,
        }
    }

    /// Every transport deletion here is best-effort and independent; the
    /// operation always runs to the final confirmation regardless of how
    /// many individual deletions fail.
    pub async fn cleanup_and_unsubscribe(
        &self,
        chat_id: ChatId,
        trigger_msg: Option<MessageRef>,
    ) -> Result<()> {
        let user = self.store.get(chat_id).await?;
        let language = user.as_ref().map(|u| u.language).unwrap_or_default();
        let was_subscribed = user.as_ref().map(|u| u.active).unwrap_or(false);

        // 1. The user's own triggering command message.
        if let Some(msg) = trigger_msg {
            if let Err(e) = self.transport.delete_message(msg).await {
                tracing::debug!(chat_id = chat_id.0, error = %e, "could not delete trigger message");
            }
        }

        // 2. Drain the tracked history.
        let entries = self.ledger.entries_for(chat_id).await;
        let mut deleted = 0usize;
        let total = entries.len();
        for entry in entries {
            match self.transport.delete_message(entry.msg).await {
                Ok(()) => deleted += 1,
                Err(e) => tracing::debug!(
                    chat_id = chat_id.0,
                    message_id = entry.msg.message_id.0,
                    error = %e,
                    "could not delete tracked message"
                ),
            }
        }
        tracing::info!(chat_id = chat_id.0, deleted, total, "drained tracked messages");

        // 3. + 4. Schedule and ledger teardown; the clear is unconditional
        // so permanently undeletable messages never pin ledger entries.
        self.scheduler.unschedule(chat_id).await;
        self.ledger.clear(chat_id).await;

        // 5. Deactivate.
        if let Some(mut user) = user {
            if user.active {
                user.active = false;
                self.store.put(user).await?;
            }
        }

        // 6. One final confirmation, deliberately untracked.
        let key = if was_subscribed {
            TextKey::Unsubscribed
        } else {
            TextKey::NotSubscribed
        };
        if let Err(e) = self
            .transport
            .send(chat_id, texts::text(language, key))
            .await
        {
            tracing::warn!(chat_id = chat_id.0, error = %e, "could not send unsubscribe confirmation");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        delivery::DeliveryPipeline,
        domain::MessageId,
        ledger::MessageKind,
        scheduler::RetryPolicy,
        store::InMemoryUserStore,
        testutil::{test_user, FakeTransport, FixedCatalog},
    };
    use std::sync::atomic::Ordering;

    struct Fixture {
        store: Arc<InMemoryUserStore>,
        transport: Arc<FakeTransport>,
        ledger: Arc<MessageLedger>,
        scheduler: DeliveryScheduler,
        pipeline: DeliveryPipeline,
        unsubscriber: Unsubscriber,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryUserStore::new());
        let transport = Arc::new(FakeTransport::new());
        let ledger = Arc::new(MessageLedger::new());
        let pipeline = DeliveryPipeline::new(
            store.clone(),
            Arc::new(FixedCatalog::new()),
            transport.clone(),
            ledger.clone(),
        );
        let scheduler =
            DeliveryScheduler::new(store.clone(), pipeline.clone(), RetryPolicy::default());
        let unsubscriber = Unsubscriber::new(
            store.clone(),
            ledger.clone(),
            scheduler.clone(),
            transport.clone(),
        );
        Fixture {
            store,
            transport,
            ledger,
            scheduler,
            pipeline,
            unsubscriber,
        }
    }

    fn msg(chat_id: i64, message_id: i32) -> MessageRef {
        MessageRef {
            chat_id: ChatId(chat_id),
            message_id: MessageId(message_id),
        }
    }

    #[tokio::test]
    async fn cleanup_deletes_history_and_deactivates() {
        let f = fixture();
        let chat = ChatId(1);
        let user = test_user(1);
        f.store.put(user.clone()).await.unwrap();
        f.scheduler.schedule(&user).await.unwrap();
        f.ledger.record(msg(1, 10), MessageKind::Welcome).await;
        f.ledger.record(msg(1, 11), MessageKind::Daily).await;

        f.unsubscriber
            .cleanup_and_unsubscribe(chat, Some(msg(1, 50)))
            .await
            .unwrap();

        // Trigger message and both tracked messages deleted.
        let deleted = f.transport.deleted_ids();
        assert!(deleted.contains(&msg(1, 50)));
        assert!(deleted.contains(&msg(1, 10)));
        assert!(deleted.contains(&msg(1, 11)));

        assert!(f.ledger.entries_for(chat).await.is_empty());
        assert!(!f.scheduler.has_job(chat).await);
        assert!(!f.store.get(chat).await.unwrap().unwrap().active);

        // Exactly one untracked confirmation.
        let sent = f.transport.sent_texts();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("отписались"));
    }

    #[tokio::test]
    async fn cleanup_survives_failing_deletions() {
        let f = fixture();
        let chat = ChatId(1);
        let user = test_user(1);
        f.store.put(user.clone()).await.unwrap();
        f.scheduler.schedule(&user).await.unwrap();
        for i in 0..5 {
            f.ledger.record(msg(1, i), MessageKind::Daily).await;
        }
        f.transport.fail_deletes.store(true, Ordering::SeqCst);

        f.unsubscriber
            .cleanup_and_unsubscribe(chat, Some(msg(1, 50)))
            .await
            .unwrap();

        assert!(f.ledger.entries_for(chat).await.is_empty());
        assert!(!f.scheduler.has_job(chat).await);
        assert!(!f.store.get(chat).await.unwrap().unwrap().active);
        assert_eq!(f.transport.sent_texts().len(), 1);
    }

    #[tokio::test]
    async fn confirmation_is_never_tracked() {
        let f = fixture();
        let chat = ChatId(1);
        f.store.put(test_user(1)).await.unwrap();
        f.ledger.record(msg(1, 10), MessageKind::Daily).await;

        f.unsubscriber
            .cleanup_and_unsubscribe(chat, None)
            .await
            .unwrap();

        let confirmation = f.transport.last_sent().unwrap();
        let entries = f.ledger.entries_for(chat).await;
        assert!(entries.iter().all(|e| e.msg != confirmation));
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn unknown_chat_still_gets_a_reply() {
        let f = fixture();
        f.unsubscriber
            .cleanup_and_unsubscribe(ChatId(9), None)
            .await
            .unwrap();
        let sent = f.transport.sent_texts();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("not subscribed"));
    }

    /// The full subscribe → deliver → unsubscribe scenario.
    #[tokio::test]
    async fn subscribe_deliver_unsubscribe_scenario() {
        let f = fixture();
        let chat = ChatId(7);
        let user = test_user(7); // ru, Europe/Moscow, 08:00, skip {5,6}
        f.store.put(user.clone()).await.unwrap();

        f.scheduler.schedule(&user).await.unwrap();
        let stats = f.scheduler.stats().await;
        assert_eq!(stats.job_count, 1);
        let (_, next) = stats.next_fires[0];
        let local = next.with_timezone(&user.timezone);
        assert!(!user.skip_days.contains(chrono::Datelike::weekday(&local)));

        f.pipeline.deliver(chat).await.unwrap();
        let entries = f.ledger.entries_for(chat).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, MessageKind::Daily);

        f.unsubscriber
            .cleanup_and_unsubscribe(chat, None)
            .await
            .unwrap();

        assert!(f.ledger.entries_for(chat).await.is_empty());
        assert!(!f.scheduler.has_job(chat).await);
        assert!(!f.store.get(chat).await.unwrap().unwrap().active);
    }
}
