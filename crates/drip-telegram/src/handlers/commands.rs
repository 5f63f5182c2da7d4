use std::sync::Arc;

use chrono::Timelike;
use teloxide::prelude::*;

use drip_core::{
    config::is_admin,
    domain::{ChatId, MessageId, MessageRef, UserId},
    formatting,
    ledger::MessageKind,
    texts::{self, TextKey},
    user::Language,
};

use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

async fn user_lang(state: &AppState, chat_id: ChatId) -> Language {
    match state.store.get(chat_id).await {
        Ok(Some(user)) => user.language,
        _ => Language::default(),
    }
}

pub async fn handle_command(
    _bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    let trigger = MessageRef {
        chat_id,
        message_id: MessageId(msg.id.0),
    };
    let (cmd, _args) = parse_command(msg.text().unwrap_or(""));

    match cmd.as_str() {
        "start" => handle_start(&state, chat_id).await,
        "stop" => handle_stop(&state, chat_id, trigger).await,
        "settings" => handle_settings(&state, chat_id).await,
        "test" => handle_test(&state, chat_id).await,
        "stats" => {
            let user_id = msg.from().map(|u| UserId(u.id.0 as i64));
            handle_stats(&state, chat_id, user_id).await
        }
        _ => {
            let lang = user_lang(&state, chat_id).await;
            if let Err(e) = state
                .transport
                .send(chat_id, texts::text(lang, TextKey::NoFlowHint))
                .await
            {
                tracing::debug!(chat_id = chat_id.0, error = %e, "could not send command hint");
            }
        }
    }

    Ok(())
}

async fn handle_start(state: &AppState, chat_id: ChatId) {
    match state.store.get(chat_id).await {
        Ok(Some(user)) if user.active => {
            let note = texts::text(user.language, TextKey::AlreadySubscribed);
            if let Err(e) = state.transport.send(chat_id, note).await {
                tracing::debug!(chat_id = chat_id.0, error = %e, "could not send already-subscribed note");
            }
        }
        Ok(_) => {
            if let Err(e) = state.dialogs.start_registration(chat_id).await {
                tracing::error!(chat_id = chat_id.0, error = %e, "could not start registration");
            }
        }
        Err(e) => tracing::error!(chat_id = chat_id.0, error = %e, "user lookup failed"),
    }
}

async fn handle_stop(state: &AppState, chat_id: ChatId, trigger: MessageRef) {
    state.dialogs.cancel(chat_id).await;
    if let Err(e) = state
        .unsubscriber
        .cleanup_and_unsubscribe(chat_id, Some(trigger))
        .await
    {
        tracing::error!(chat_id = chat_id.0, error = %e, "unsubscribe failed");
    }
}

async fn handle_settings(state: &AppState, chat_id: ChatId) {
    let user = match state.store.get(chat_id).await {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(chat_id = chat_id.0, error = %e, "user lookup failed");
            return;
        }
    };
    let Some(user) = user.filter(|u| u.active) else {
        let lang = Language::default();
        let _ = state
            .transport
            .send(chat_id, texts::text(lang, TextKey::NotSubscribed))
            .await;
        return;
    };

    let text = format!(
        "{}\n\n{}",
        formatting::format_settings(&user),
        texts::text(user.language, TextKey::SettingsMenu)
    );
    match state
        .transport
        .send_inline_keyboard(chat_id, &text, drip_core::dialog::settings_keyboard(user.language))
        .await
    {
        Ok(menu) => state.ledger.record(menu, MessageKind::Menu).await,
        Err(e) => tracing::warn!(chat_id = chat_id.0, error = %e, "could not send settings menu"),
    }
}

async fn handle_test(state: &AppState, chat_id: ChatId) {
    let user = match state.store.get(chat_id).await {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(chat_id = chat_id.0, error = %e, "user lookup failed");
            return;
        }
    };
    let Some(user) = user.filter(|u| u.active) else {
        let _ = state
            .transport
            .send(chat_id, texts::text(Language::default(), TextKey::NotSubscribed))
            .await;
        return;
    };

    if let Err(e) = state.scheduler.deliver_test(chat_id).await {
        tracing::warn!(chat_id = chat_id.0, error = %e, "test delivery failed");
        let _ = state
            .transport
            .send(chat_id, texts::text(user.language, TextKey::TestUnavailable))
            .await;
    }
}

async fn handle_stats(state: &AppState, chat_id: ChatId, user_id: Option<UserId>) {
    if !is_admin(user_id, &state.cfg.admin_ids) {
        return;
    }

    let active = state
        .store
        .all_active()
        .await
        .map(|v| v.len())
        .unwrap_or(0);
    let stats = state.scheduler.stats().await;

    let mut lines = vec![
        format!("📊 Active users: {active}"),
        format!("📅 Scheduled jobs: {}", stats.job_count),
    ];
    for (chat, next) in &stats.next_fires {
        lines.push(format!(
            "• chat {}: next at {:02}:{:02} UTC",
            chat.0,
            next.hour(),
            next.minute()
        ));
    }

    if let Err(e) = state.transport.send(chat_id, &lines.join("\n")).await {
        tracing::warn!(chat_id = chat_id.0, error = %e, "could not send stats");
    }
}
