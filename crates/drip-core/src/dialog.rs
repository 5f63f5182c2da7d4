//! Single-message dialog state machine.
//!
//! Registration and settings edits live on one "anchor" message that is
//! edited in place at every step instead of emitting a new message per
//! prompt. If an edit is rejected (anchor too old, deleted), the machine
//! falls back exactly once per failure to sending a fresh message and
//! adopts it as the new anchor; if that send fails too the flow aborts.
//!
//! Inputs for one chat are serialized through a per-chat lock so two
//! answers can never race on the same anchor.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono_tz::Tz;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    domain::{ChatId, MessageRef},
    errors::Error,
    formatting,
    ledger::{MessageKind, MessageLedger},
    messaging::{
        types::{InlineButton, InlineKeyboard},
        Transport,
    },
    scheduler::DeliveryScheduler,
    store::UserStore,
    texts::{self, TextKey},
    user::{Language, SendTime, SkipDays, User},
    Result,
};

/// One settings field, for single-field edit flows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsField {
    Language,
    Timezone,
    SendTime,
    SkipDays,
}

impl SettingsField {
    fn step(self) -> Step {
        match self {
            SettingsField::Language => Step::AwaitingLanguage,
            SettingsField::Timezone => Step::AwaitingTimezone,
            SettingsField::SendTime => Step::AwaitingSendTime,
            SettingsField::SkipDays => Step::AwaitingSkipDays,
        }
    }

    pub fn callback_data(self) -> &'static str {
        match self {
            SettingsField::Language => "edit:language",
            SettingsField::Timezone => "edit:timezone",
            SettingsField::SendTime => "edit:time",
            SettingsField::SkipDays => "edit:days",
        }
    }

    pub fn from_callback(data: &str) -> Option<Self> {
        match data {
            "edit:language" => Some(SettingsField::Language),
            "edit:timezone" => Some(SettingsField::Timezone),
            "edit:time" => Some(SettingsField::SendTime),
            "edit:days" => Some(SettingsField::SkipDays),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowKind {
    Registration,
    Edit(SettingsField),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    AwaitingLanguage,
    AwaitingTimezone,
    AwaitingSendTime,
    AwaitingSkipDays,
}

/// Answers gathered so far.
#[derive(Clone, Debug, Default)]
struct Draft {
    language: Option<Language>,
    timezone: Option<Tz>,
    send_time: Option<SendTime>,
    skip_days: SkipDays,
}

struct DialogState {
    kind: FlowKind,
    step: Step,
    draft: Draft,
    anchor: MessageRef,
}

/// An inbound user action routed into an in-progress flow.
#[derive(Clone, Debug)]
pub enum FlowInput {
    Callback { data: String },
    Text { text: String, origin: MessageRef },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowOutcome {
    Handled,
    /// No flow is in progress for this chat; the caller decides what to do.
    NoFlow,
}

enum StepResult {
    Continue,
    Finished,
}

/// Per-chat serialization of flow inputs (a second input waits; it is never
/// processed concurrently with the first).
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub struct DialogService {
    store: Arc<dyn UserStore>,
    transport: Arc<dyn Transport>,
    ledger: Arc<MessageLedger>,
    scheduler: DeliveryScheduler,
    states: Mutex<HashMap<i64, DialogState>>,
    locks: ChatLocks,
    delete_delay: Duration,
}

impl DialogService {
    pub fn new(
        store: Arc<dyn UserStore>,
        transport: Arc<dyn Transport>,
        ledger: Arc<MessageLedger>,
        scheduler: DeliveryScheduler,
        delete_delay: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            ledger,
            scheduler,
            states: Mutex::new(HashMap::new()),
            locks: ChatLocks::default(),
            delete_delay,
        }
    }

    /// Begin registration: send the welcome message with the language
    /// keyboard and make it the flow's anchor. Any in-progress flow for the
    /// chat is silently superseded.
    pub async fn start_registration(&self, chat_id: ChatId) -> Result<()> {
        let _guard = self.locks.lock_chat(chat_id.0).await;

        let anchor = self
            .transport
            .send_inline_keyboard(chat_id, texts::WELCOME, language_keyboard())
            .await
            .map_err(|e| Error::External(format!("could not send welcome message: {e}")))?;
        self.ledger.record(anchor, MessageKind::Welcome).await;

        self.states.lock().await.insert(
            chat_id.0,
            DialogState {
                kind: FlowKind::Registration,
                step: Step::AwaitingLanguage,
                draft: Draft::default(),
                anchor,
            },
        );
        Ok(())
    }

    /// Begin a single-field settings edit, repurposing `anchor` (usually the
    /// settings-menu message the button lives on) for the flow.
    pub async fn start_edit(
        &self,
        chat_id: ChatId,
        field: SettingsField,
        anchor: MessageRef,
    ) -> Result<()> {
        let _guard = self.locks.lock_chat(chat_id.0).await;

        let user = self.store.get(chat_id).await?;
        let Some(user) = user.filter(|u| u.active) else {
            let note = texts::text(Language::default(), TextKey::NotSubscribed);
            if let Err(e) = self.transport.edit_text(anchor, note).await {
                tracing::debug!(chat_id = chat_id.0, error = %e, "could not render not-subscribed note");
            }
            return Ok(());
        };

        let mut state = DialogState {
            kind: FlowKind::Edit(field),
            step: field.step(),
            draft: Draft {
                language: Some(user.language),
                timezone: Some(user.timezone),
                send_time: Some(user.send_time),
                skip_days: user.skip_days,
            },
            anchor,
        };
        self.render_step(&mut state, None).await?;
        self.states.lock().await.insert(chat_id.0, state);
        Ok(())
    }

    /// Route one user action into the chat's in-progress flow.
    pub async fn handle_input(&self, chat_id: ChatId, input: FlowInput) -> Result<FlowOutcome> {
        let _guard = self.locks.lock_chat(chat_id.0).await;

        let Some(mut state) = self.states.lock().await.remove(&chat_id.0) else {
            return Ok(FlowOutcome::NoFlow);
        };

        let result = self.step(&mut state, &input).await;

        // Consumed free-text answers are cleaned from the chat shortly after,
        // off the main processing path.
        if let FlowInput::Text { origin, .. } = &input {
            self.schedule_message_deletion(*origin);
        }

        match result {
            Ok(StepResult::Continue) => {
                self.states.lock().await.insert(chat_id.0, state);
                Ok(FlowOutcome::Handled)
            }
            Ok(StepResult::Finished) => Ok(FlowOutcome::Handled),
            Err(e) => {
                tracing::warn!(chat_id = chat_id.0, error = %e, "flow aborted");
                Err(e)
            }
        }
    }

    /// Drops any in-progress flow for the chat.
    pub async fn cancel(&self, chat_id: ChatId) -> bool {
        self.states.lock().await.remove(&chat_id.0).is_some()
    }

    pub async fn current_step(&self, chat_id: ChatId) -> Option<Step> {
        self.states.lock().await.get(&chat_id.0).map(|s| s.step)
    }

    async fn step(&self, state: &mut DialogState, input: &FlowInput) -> Result<StepResult> {
        match state.step {
            Step::AwaitingLanguage => self.on_language(state, input).await,
            Step::AwaitingTimezone => self.on_timezone(state, input).await,
            Step::AwaitingSendTime => self.on_send_time(state, input).await,
            Step::AwaitingSkipDays => self.on_skip_days(state, input).await,
        }
    }

    async fn on_language(&self, state: &mut DialogState, input: &FlowInput) -> Result<StepResult> {
        let chosen = match input {
            FlowInput::Callback { data } => data
                .strip_prefix("lang:")
                .and_then(Language::from_tag),
            FlowInput::Text { .. } => None,
        };
        let Some(lang) = chosen else {
            self.render_step(state, None).await?;
            return Ok(StepResult::Continue);
        };

        state.draft.language = Some(lang);
        if state.kind == FlowKind::Edit(SettingsField::Language) {
            return self.complete_edit(state).await;
        }

        state.step = Step::AwaitingTimezone;
        self.render_step(state, Some(texts::text(lang, TextKey::LanguageSaved)))
            .await?;
        Ok(StepResult::Continue)
    }

    async fn on_timezone(&self, state: &mut DialogState, input: &FlowInput) -> Result<StepResult> {
        let lang = lang_of(state);
        let FlowInput::Text { text: raw, .. } = input else {
            self.render_step(state, None).await?;
            return Ok(StepResult::Continue);
        };

        let Ok(tz) = raw.trim().parse::<Tz>() else {
            self.render_step(state, Some(texts::text(lang, TextKey::InvalidTimezone)))
                .await?;
            return Ok(StepResult::Continue);
        };

        state.draft.timezone = Some(tz);
        if state.kind == FlowKind::Edit(SettingsField::Timezone) {
            return self.complete_edit(state).await;
        }

        state.step = Step::AwaitingSendTime;
        self.render_step(state, Some(texts::text(lang, TextKey::SettingsSaved)))
            .await?;
        Ok(StepResult::Continue)
    }

    async fn on_send_time(&self, state: &mut DialogState, input: &FlowInput) -> Result<StepResult> {
        let lang = lang_of(state);
        let FlowInput::Text { text: raw, .. } = input else {
            self.render_step(state, None).await?;
            return Ok(StepResult::Continue);
        };

        let Ok(send_time) = raw.trim().parse::<SendTime>() else {
            self.render_step(state, Some(texts::text(lang, TextKey::InvalidTime)))
                .await?;
            return Ok(StepResult::Continue);
        };

        state.draft.send_time = Some(send_time);
        if state.kind == FlowKind::Edit(SettingsField::SendTime) {
            return self.complete_edit(state).await;
        }

        state.step = Step::AwaitingSkipDays;
        self.render_step(state, Some(texts::text(lang, TextKey::SettingsSaved)))
            .await?;
        Ok(StepResult::Continue)
    }

    async fn on_skip_days(&self, state: &mut DialogState, input: &FlowInput) -> Result<StepResult> {
        let lang = lang_of(state);
        match input {
            FlowInput::Callback { data } => match data.as_str() {
                "skip:done" => {
                    if state.draft.skip_days.covers_all_week() {
                        self.render_step(state, Some(texts::text(lang, TextKey::InvalidSkipDays)))
                            .await?;
                        return Ok(StepResult::Continue);
                    }
                    self.finish(state).await
                }
                "skip:none" => {
                    state.draft.skip_days = SkipDays::empty();
                    self.render_step(state, None).await?;
                    Ok(StepResult::Continue)
                }
                "skip:weekends" => {
                    state.draft.skip_days = SkipDays::weekends();
                    self.render_step(state, None).await?;
                    Ok(StepResult::Continue)
                }
                other => {
                    if let Some(day) = other.strip_prefix("skip:").and_then(|d| d.parse::<u8>().ok())
                    {
                        state.draft.skip_days.toggle(day);
                    }
                    self.render_step(state, None).await?;
                    Ok(StepResult::Continue)
                }
            },
            FlowInput::Text { text: raw, .. } => {
                let parsed = if raw.trim() == "-" {
                    Ok(SkipDays::empty())
                } else {
                    SkipDays::parse_csv(raw)
                };
                match parsed {
                    Ok(days) if !days.covers_all_week() => {
                        state.draft.skip_days = days;
                        self.finish(state).await
                    }
                    _ => {
                        self.render_step(state, Some(texts::text(lang, TextKey::InvalidSkipDays)))
                            .await?;
                        Ok(StepResult::Continue)
                    }
                }
            }
        }
    }

    async fn finish(&self, state: &mut DialogState) -> Result<StepResult> {
        match state.kind {
            FlowKind::Registration => self.complete_registration(state).await,
            FlowKind::Edit(_) => self.complete_edit(state).await,
        }
    }

    async fn complete_registration(&self, state: &mut DialogState) -> Result<StepResult> {
        let draft = &state.draft;
        let (Some(timezone), Some(send_time)) = (draft.timezone, draft.send_time) else {
            return Err(Error::Validation(
                "registration flow finished with missing answers".to_string(),
            ));
        };

        let user = User {
            chat_id: state.anchor.chat_id,
            language: draft.language.unwrap_or_default(),
            timezone,
            send_time,
            skip_days: draft.skip_days.clone(),
            active: true,
            last_delivered: None,
        };

        self.store.put(user.clone()).await?;
        self.sync_schedule(&user).await?;

        self.render_plain(state, &formatting::format_setup_complete(&user))
            .await?;
        tracing::info!(chat_id = user.chat_id.0, "registration complete");
        Ok(StepResult::Finished)
    }

    async fn complete_edit(&self, state: &mut DialogState) -> Result<StepResult> {
        let chat_id = state.anchor.chat_id;
        let FlowKind::Edit(field) = state.kind else {
            return Err(Error::Validation("not an edit flow".to_string()));
        };

        let Some(mut user) = self.store.get(chat_id).await? else {
            self.render_plain(state, texts::text(lang_of(state), TextKey::NotSubscribed))
                .await?;
            return Ok(StepResult::Finished);
        };

        let affects_schedule = match field {
            SettingsField::Language => {
                user.language = state.draft.language.unwrap_or(user.language);
                false
            }
            SettingsField::Timezone => {
                if let Some(tz) = state.draft.timezone {
                    user.timezone = tz;
                }
                true
            }
            SettingsField::SendTime => {
                if let Some(t) = state.draft.send_time {
                    user.send_time = t;
                }
                true
            }
            SettingsField::SkipDays => {
                user.skip_days = state.draft.skip_days.clone();
                true
            }
        };

        self.store.put(user.clone()).await?;
        if affects_schedule && user.active {
            self.sync_schedule(&user).await?;
        }

        let summary = format!(
            "{}\n\n{}",
            texts::text(user.language, TextKey::SettingsSaved),
            formatting::format_settings(&user)
        );
        self.render_plain(state, &summary).await?;
        tracing::info!(chat_id = chat_id.0, field = ?field, "settings updated");
        Ok(StepResult::Finished)
    }

    /// Resynchronize the scheduler after a user mutation. On rejection the
    /// user is rolled back to inactive so no active user is left without a
    /// job (and no stale job is retained).
    async fn sync_schedule(&self, user: &User) -> Result<()> {
        if let Err(e) = self.scheduler.schedule(user).await {
            self.scheduler.unschedule(user.chat_id).await;
            let mut rollback = user.clone();
            rollback.active = false;
            if let Err(pe) = self.store.put(rollback).await {
                tracing::error!(chat_id = user.chat_id.0, error = %pe, "rollback persist failed");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Re-render the current step's prompt on the anchor, optionally
    /// prefixed with a confirmation or inline error note.
    async fn render_step(&self, state: &mut DialogState, note: Option<&str>) -> Result<()> {
        let lang = lang_of(state);
        let prompt = match state.step {
            Step::AwaitingLanguage => texts::text(lang, TextKey::LanguagePrompt).to_string(),
            Step::AwaitingTimezone => texts::text(lang, TextKey::TimezonePrompt).to_string(),
            Step::AwaitingSendTime => texts::text(lang, TextKey::TimePrompt).to_string(),
            Step::AwaitingSkipDays => format!(
                "{}\n\n🔸 {}",
                texts::text(lang, TextKey::SkipDaysPrompt),
                formatting::format_skip_days(&state.draft.skip_days, lang)
            ),
        };
        let text = match note {
            Some(note) => format!("{note}\n\n{prompt}"),
            None => prompt,
        };
        let keyboard = match state.step {
            Step::AwaitingLanguage => Some(language_keyboard()),
            Step::AwaitingSkipDays => Some(skip_days_keyboard(lang, &state.draft.skip_days)),
            _ => None,
        };
        self.edit_or_send(state, &text, keyboard).await
    }

    async fn render_plain(&self, state: &mut DialogState, text: &str) -> Result<()> {
        self.edit_or_send(state, text, None).await
    }

    /// Edit the anchor; on failure fall back once to sending a new message
    /// and adopt it as the anchor. A failing fallback aborts the flow.
    async fn edit_or_send(
        &self,
        state: &mut DialogState,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        let edit_res = match keyboard.clone() {
            Some(kb) => self.transport.edit_with_keyboard(state.anchor, text, kb).await,
            None => self.transport.edit_text(state.anchor, text).await,
        };
        let edit_err = match edit_res {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        tracing::warn!(
            chat_id = state.anchor.chat_id.0,
            error = %edit_err,
            "anchor edit failed, falling back to a new message"
        );
        let sent = match keyboard {
            Some(kb) => {
                self.transport
                    .send_inline_keyboard(state.anchor.chat_id, text, kb)
                    .await
            }
            None => self.transport.send(state.anchor.chat_id, text).await,
        };
        match sent {
            Ok(msg) => {
                state.anchor = msg;
                self.ledger.record(msg, MessageKind::Settings).await;
                Ok(())
            }
            Err(send_err) => Err(Error::EditFailed(format!(
                "edit failed ({edit_err}); fallback send failed ({send_err})"
            ))),
        }
    }

    fn schedule_message_deletion(&self, origin: MessageRef) {
        let transport = Arc::clone(&self.transport);
        let delay = self.delete_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = transport.delete_message(origin).await {
                tracing::debug!(
                    chat_id = origin.chat_id.0,
                    message_id = origin.message_id.0,
                    error = %e,
                    "could not delete consumed flow input"
                );
            }
        });
    }
}

fn lang_of(state: &DialogState) -> Language {
    state.draft.language.unwrap_or_default()
}

fn language_keyboard() -> InlineKeyboard {
    InlineKeyboard::default()
        .row(vec![
            InlineButton::new("🇺🇸 English", "lang:en"),
            InlineButton::new("🇷🇺 Русский", "lang:ru"),
        ])
        .row(vec![
            InlineButton::new("🇺🇿 O'zbek", "lang:uz"),
            InlineButton::new("🇰🇿 Қазақша", "lang:kz"),
        ])
}

fn skip_days_keyboard(lang: Language, selected: &SkipDays) -> InlineKeyboard {
    let day_button = |day: u8| {
        let name = texts::day_abbrev(lang, day);
        let label = if selected.contains_index(day) {
            format!("✓ {name}")
        } else {
            name.to_string()
        };
        InlineButton::new(label, format!("skip:{day}"))
    };

    InlineKeyboard::default()
        .row((0..4).map(day_button).collect())
        .row((4..7).map(day_button).collect())
        .row(vec![
            InlineButton::new(texts::text(lang, TextKey::BtnWeekends), "skip:weekends"),
            InlineButton::new(texts::text(lang, TextKey::BtnNoSkip), "skip:none"),
        ])
        .row(vec![InlineButton::new(
            texts::text(lang, TextKey::BtnDone),
            "skip:done",
        )])
}

/// Keyboard for the `/settings` menu message.
pub fn settings_keyboard(lang: Language) -> InlineKeyboard {
    let btn = |key, field: SettingsField| {
        InlineButton::new(texts::text(lang, key), field.callback_data())
    };
    InlineKeyboard::default()
        .row(vec![btn(TextKey::BtnChangeLanguage, SettingsField::Language)])
        .row(vec![btn(TextKey::BtnChangeTimezone, SettingsField::Timezone)])
        .row(vec![btn(TextKey::BtnChangeTime, SettingsField::SendTime)])
        .row(vec![btn(TextKey::BtnChangeSkipDays, SettingsField::SkipDays)])
}
