use std::sync::Arc;

use teloxide::prelude::*;

use drip_core::{
    dialog::{FlowInput, FlowOutcome, SettingsField},
    domain::{ChatId, MessageId, MessageRef},
};

use crate::router::AppState;

pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let data = q.data.clone().unwrap_or_default();
    let Some(message) = q.message.as_ref() else {
        let _ = state.transport.answer_callback(&q.id, None).await;
        return Ok(());
    };

    let chat_id = ChatId(message.chat.id.0);
    let anchor = MessageRef {
        chat_id,
        message_id: MessageId(message.id.0),
    };

    // Acknowledge first so the button stops spinning regardless of outcome.
    if let Err(e) = state.transport.answer_callback(&q.id, None).await {
        tracing::debug!(chat_id = chat_id.0, error = %e, "could not answer callback query");
    }

    // Settings-menu buttons start a single-field edit flow anchored on the
    // menu message itself.
    if let Some(field) = SettingsField::from_callback(&data) {
        if let Err(e) = state.dialogs.start_edit(chat_id, field, anchor).await {
            tracing::warn!(chat_id = chat_id.0, error = %e, "could not start settings edit");
        }
        return Ok(());
    }

    match state.dialogs.handle_input(chat_id, FlowInput::Callback { data }).await {
        Ok(FlowOutcome::Handled) => {}
        Ok(FlowOutcome::NoFlow) => {
            // Stale button from a finished flow; nothing to do.
        }
        Err(e) => tracing::warn!(chat_id = chat_id.0, error = %e, "callback flow input failed"),
    }

    Ok(())
}
