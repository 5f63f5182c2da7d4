use std::sync::Arc;

use teloxide::prelude::*;

use drip_core::{
    dialog::{FlowInput, FlowOutcome},
    domain::{ChatId, MessageId, MessageRef},
    texts::{self, TextKey},
    user::Language,
};

use crate::router::AppState;

pub async fn handle_text(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    let origin = MessageRef {
        chat_id,
        message_id: MessageId(msg.id.0),
    };
    let input = FlowInput::Text {
        text: msg.text().unwrap_or("").to_string(),
        origin,
    };

    match state.dialogs.handle_input(chat_id, input).await {
        Ok(FlowOutcome::Handled) => {}
        Ok(FlowOutcome::NoFlow) => {
            let lang = match state.store.get(chat_id).await {
                Ok(Some(user)) => user.language,
                _ => Language::default(),
            };
            if let Err(e) = state
                .transport
                .send(chat_id, texts::text(lang, TextKey::NoFlowHint))
                .await
            {
                tracing::debug!(chat_id = chat_id.0, error = %e, "could not send hint");
            }
        }
        Err(e) => {
            tracing::warn!(chat_id = chat_id.0, error = %e, "text flow input failed");
        }
    }

    Ok(())
}
