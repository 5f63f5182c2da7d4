use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use drip_core::{
    catalog::Catalog,
    cleanup::Unsubscriber,
    config::Config,
    delivery::DeliveryPipeline,
    dialog::DialogService,
    ledger::MessageLedger,
    messaging::{
        throttled::{ThrottleConfig, ThrottledTransport},
        Transport,
    },
    scheduler::{DeliveryScheduler, RetryPolicy},
    store::UserStore,
};

use crate::handlers;
use crate::TelegramTransport;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub store: Arc<dyn UserStore>,
    pub transport: Arc<dyn Transport>,
    pub ledger: Arc<MessageLedger>,
    pub scheduler: DeliveryScheduler,
    pub dialogs: Arc<DialogService>,
    pub unsubscriber: Arc<Unsubscriber>,
}

pub async fn run_polling(
    cfg: Arc<Config>,
    store: Arc<dyn UserStore>,
    catalog: Arc<dyn Catalog>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        tracing::info!(username = me.username(), "bot started");
    }

    // Raw Telegram transport wrapped with a throttling decorator to keep
    // delivery fan-out and edit-heavy dialogs under Telegram's flood limits.
    // The adapter still retries one RetryAfter below the throttle.
    let raw: Arc<dyn Transport> = Arc::new(TelegramTransport::new(bot.clone()));
    let transport: Arc<dyn Transport> =
        Arc::new(ThrottledTransport::new(raw, ThrottleConfig::default()));

    let ledger = Arc::new(MessageLedger::new());
    let pipeline = DeliveryPipeline::new(
        store.clone(),
        catalog,
        transport.clone(),
        ledger.clone(),
    );
    let scheduler = DeliveryScheduler::new(
        store.clone(),
        pipeline,
        RetryPolicy {
            attempts: cfg.delivery_attempts,
            backoff: cfg.delivery_backoff,
        },
    );

    // Install jobs for everyone who was active before the restart. Fire
    // times missed while the process was down fire once immediately.
    let scheduled = scheduler.schedule_all().await?;
    tracing::info!(scheduled, "startup scheduling complete");

    let dialogs = Arc::new(DialogService::new(
        store.clone(),
        transport.clone(),
        ledger.clone(),
        scheduler.clone(),
        cfg.delete_delay,
    ));
    let unsubscriber = Arc::new(Unsubscriber::new(
        store.clone(),
        ledger.clone(),
        scheduler.clone(),
        transport.clone(),
    ));

    let state = Arc::new(AppState {
        cfg,
        store,
        transport,
        ledger,
        scheduler: scheduler.clone(),
        dialogs,
        unsubscriber,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    scheduler.stop().await;
    Ok(())
}
