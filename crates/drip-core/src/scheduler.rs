//! Per-user recurring delivery scheduler.
//!
//! One spawned job task per active user. A job sleeps until the user's next
//! local send time, fires the delivery pipeline on a detached task, and
//! immediately recomputes the following occurrence, so a slow or failing
//! delivery never stalls or drifts the recurrence. Retries with backoff for
//! transient failures live here so backoff stays centralized; the pipeline
//! itself never retries.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Datelike, LocalResult, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    delivery::DeliveryPipeline,
    domain::ChatId,
    errors::Error,
    store::UserStore,
    user::{SendTime, SkipDays, User},
    Result,
};

/// Retry policy for transient delivery failures within one firing.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// The recurrence rule for one user, detached from the user record so the
/// job task does not need store access to compute occurrences.
#[derive(Clone, Debug)]
pub struct Trigger {
    pub send_time: SendTime,
    pub timezone: Tz,
    pub skip_days: SkipDays,
}

impl Trigger {
    fn for_user(user: &User) -> Self {
        Self {
            send_time: user.send_time,
            timezone: user.timezone,
            skip_days: user.skip_days.clone(),
        }
    }

    /// Next eligible instant strictly after `now`.
    ///
    /// Starting from "today at the configured local time": a candidate that
    /// has already passed, falls on a skipped weekday, or does not exist on
    /// the local calendar (DST gap) advances the search one day. Ambiguous
    /// local times (DST fall-back) resolve to the earliest instant. The
    /// search is bounded to a week of candidates.
    pub fn next_occurrence(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let local_now = now.with_timezone(&self.timezone);
        let mut day = local_now.date_naive();

        for _ in 0..8 {
            if !self.skip_days.contains(day.weekday()) {
                let naive = day
                    .and_hms_opt(self.send_time.hour as u32, self.send_time.minute as u32, 0)
                    .ok_or_else(|| {
                        Error::InvalidSchedule(format!("invalid local time {}", self.send_time))
                    })?;
                let candidate = match self.timezone.from_local_datetime(&naive) {
                    LocalResult::Single(dt) => Some(dt),
                    LocalResult::Ambiguous(earliest, _) => Some(earliest),
                    LocalResult::None => None,
                };
                if let Some(dt) = candidate {
                    let utc = dt.with_timezone(&Utc);
                    if utc > now {
                        return Ok(utc);
                    }
                }
            }
            day = day
                .succ_opt()
                .ok_or_else(|| Error::InvalidSchedule("calendar overflow".to_string()))?;
        }

        Err(Error::InvalidSchedule(
            "no eligible occurrence within a week".to_string(),
        ))
    }
}

#[derive(Clone)]
pub struct DeliveryScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    store: Arc<dyn UserStore>,
    pipeline: DeliveryPipeline,
    retry: RetryPolicy,
    jobs: tokio::sync::Mutex<HashMap<i64, JobEntry>>,
}

struct JobEntry {
    trigger: Trigger,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Clone, Debug)]
pub struct SchedulerStats {
    pub job_count: usize,
    /// The soonest upcoming fires, at most five.
    pub next_fires: Vec<(ChatId, DateTime<Utc>)>,
}

impl DeliveryScheduler {
    pub fn new(store: Arc<dyn UserStore>, pipeline: DeliveryPipeline, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                pipeline,
                retry,
                jobs: tokio::sync::Mutex::new(HashMap::new()),
            }),
        }
    }

    /// (Re)installs the recurring job for an active user, replacing any
    /// existing job for that chat id. Rejects rules that can never fire; on
    /// rejection no job is created and any prior job is left untouched.
    pub async fn schedule(&self, user: &User) -> Result<()> {
        if !user.active {
            return Err(Error::InvalidSchedule(format!(
                "user {} is inactive",
                user.chat_id.0
            )));
        }
        if user.skip_days.covers_all_week() {
            return Err(Error::InvalidSchedule(
                "skip days cover the whole week".to_string(),
            ));
        }

        let trigger = Trigger::for_user(user);
        let first = trigger.next_occurrence(Utc::now())?;
        tracing::info!(
            chat_id = user.chat_id.0,
            next_fire = %first,
            "scheduling daily delivery"
        );

        let cancel = CancellationToken::new();
        let chat_id = user.chat_id;
        let inner = Arc::clone(&self.inner);
        let trigger_for_task = trigger.clone();
        let cancel_for_task = cancel.clone();
        let handle = tokio::spawn(async move {
            job_loop(inner, chat_id, trigger_for_task, cancel_for_task).await;
        });

        let mut jobs = self.inner.jobs.lock().await;
        if let Some(old) = jobs.insert(
            chat_id.0,
            JobEntry {
                trigger,
                cancel,
                handle,
            },
        ) {
            old.cancel.cancel();
            old.handle.abort();
        }
        Ok(())
    }

    /// Removes the job for a chat if present. Returns whether one was
    /// actually removed; absence is not an error.
    pub async fn unschedule(&self, chat_id: ChatId) -> bool {
        remove_job(&self.inner, chat_id).await
    }

    pub async fn has_job(&self, chat_id: ChatId) -> bool {
        self.inner.jobs.lock().await.contains_key(&chat_id.0)
    }

    /// Installs jobs for every active user; used at startup. A job whose
    /// fire time passed while the process was down fires once immediately
    /// (the zero-clamped sleep in the job loop), then settles forward.
    pub async fn schedule_all(&self) -> Result<usize> {
        let users = self.inner.store.all_active().await?;
        tracing::info!(count = users.len(), "scheduling all active users");

        let mut scheduled = 0usize;
        for user in users {
            match self.schedule(&user).await {
                Ok(()) => scheduled += 1,
                Err(e) => {
                    tracing::warn!(chat_id = user.chat_id.0, error = %e, "failed to schedule user")
                }
            }
        }
        Ok(scheduled)
    }

    /// Immediate test delivery, same pipeline as scheduled fires.
    pub async fn deliver_test(&self, chat_id: ChatId) -> Result<()> {
        self.inner.pipeline.deliver_test(chat_id).await
    }

    pub async fn stats(&self) -> SchedulerStats {
        let now = Utc::now();
        let jobs = self.inner.jobs.lock().await;

        let mut next_fires: Vec<(ChatId, DateTime<Utc>)> = jobs
            .iter()
            .filter_map(|(chat_id, job)| {
                job.trigger
                    .next_occurrence(now)
                    .ok()
                    .map(|t| (ChatId(*chat_id), t))
            })
            .collect();
        next_fires.sort_by_key(|(_, t)| *t);
        next_fires.truncate(5);

        SchedulerStats {
            job_count: jobs.len(),
            next_fires,
        }
    }

    /// Cancels every job; used on shutdown.
    pub async fn stop(&self) {
        let mut jobs = self.inner.jobs.lock().await;
        for (_, job) in jobs.drain() {
            job.cancel.cancel();
            job.handle.abort();
        }
    }
}

async fn remove_job(inner: &SchedulerInner, chat_id: ChatId) -> bool {
    let mut jobs = inner.jobs.lock().await;
    match jobs.remove(&chat_id.0) {
        Some(job) => {
            job.cancel.cancel();
            job.handle.abort();
            true
        }
        None => false,
    }
}

async fn job_loop(
    inner: Arc<SchedulerInner>,
    chat_id: ChatId,
    trigger: Trigger,
    cancel: CancellationToken,
) {
    loop {
        let next = match trigger.next_occurrence(Utc::now()) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(chat_id = chat_id.0, error = %e, "job has no next occurrence, stopping");
                break;
            }
        };

        // A next-fire already in the past (recovery after downtime) clamps
        // to zero: it fires exactly once, then the loop settles forward.
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(wait) => {
                // Detach the delivery attempt so the recurrence is
                // recomputed right away, independent of delivery latency.
                let inner = Arc::clone(&inner);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    deliver_with_retry(inner, chat_id, cancel).await;
                });
            }
        }
    }
}

async fn deliver_with_retry(inner: Arc<SchedulerInner>, chat_id: ChatId, cancel: CancellationToken) {
    let mut delay = inner.retry.backoff;

    for attempt in 1..=inner.retry.attempts {
        match inner.pipeline.deliver(chat_id).await {
            Ok(()) => return,
            Err(Error::PermanentDelivery(reason)) => {
                tracing::warn!(chat_id = chat_id.0, %reason, "recipient unreachable, deactivating");
                deactivate(&inner, chat_id).await;
                return;
            }
            Err(Error::TransientDelivery(reason)) if attempt < inner.retry.attempts => {
                tracing::warn!(
                    chat_id = chat_id.0,
                    attempt,
                    %reason,
                    "transient delivery failure, backing off"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep(delay) => {}
                }
                delay *= 2;
            }
            Err(e) => {
                tracing::error!(
                    chat_id = chat_id.0,
                    error = %e,
                    "delivery failed, deferring to next occurrence"
                );
                return;
            }
        }
    }
}

/// Permanent failure: drop the job first, then flip the user inactive, so
/// no path leaves an inactive user with a live job.
async fn deactivate(inner: &SchedulerInner, chat_id: ChatId) {
    remove_job(inner, chat_id).await;

    match inner.store.get(chat_id).await {
        Ok(Some(mut user)) if user.active => {
            user.active = false;
            if let Err(e) = inner.store.put(user).await {
                tracing::error!(chat_id = chat_id.0, error = %e, "failed to persist deactivation");
            }
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!(chat_id = chat_id.0, error = %e, "failed to load user for deactivation")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::MessageLedger,
        messaging::TransportError,
        store::InMemoryUserStore,
        testutil::{test_user, FakeTransport, FixedCatalog},
        user::SkipDays,
    };
    use chrono::{Timelike, Weekday};

    fn moscow_weekday_trigger() -> Trigger {
        Trigger {
            send_time: "08:00".parse().unwrap(),
            timezone: chrono_tz::Europe::Moscow,
            skip_days: SkipDays::weekends(),
        }
    }

    fn scheduler_with(
        store: Arc<InMemoryUserStore>,
        transport: Arc<FakeTransport>,
    ) -> (DeliveryScheduler, Arc<MessageLedger>) {
        let ledger = Arc::new(MessageLedger::new());
        let pipeline = DeliveryPipeline::new(
            store.clone(),
            Arc::new(FixedCatalog::new()),
            transport,
            ledger.clone(),
        );
        (
            DeliveryScheduler::new(store, pipeline, RetryPolicy::default()),
            ledger,
        )
    }

    #[test]
    fn next_occurrence_skips_weekends() {
        let trigger = moscow_weekday_trigger();
        // Friday 2026-01-02 13:00 Moscow (10:00 UTC): 08:00 already passed,
        // Sat/Sun skipped, so the next fire is Monday 08:00 Moscow = 05:00 UTC.
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 10, 0, 0).unwrap();
        let next = trigger.next_occurrence(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 5, 5, 0, 0).unwrap());
        assert_eq!(next.with_timezone(&trigger.timezone).weekday(), Weekday::Mon);
    }

    #[test]
    fn next_occurrence_fires_today_when_still_ahead() {
        let trigger = moscow_weekday_trigger();
        // Friday 2026-01-02 04:00 Moscow (01:00 UTC): today's 08:00 is ahead.
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 1, 0, 0).unwrap();
        let next = trigger.next_occurrence(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 2, 5, 0, 0).unwrap());
    }

    #[test]
    fn next_occurrence_is_always_a_future_eligible_weekday_within_a_week() {
        let now = Utc.with_ymd_and_hms(2026, 3, 11, 18, 30, 0).unwrap();
        for skipped in 0u8..7 {
            let trigger = Trigger {
                send_time: "06:30".parse().unwrap(),
                timezone: chrono_tz::Asia::Tashkent,
                skip_days: SkipDays::parse_csv(&skipped.to_string()).unwrap(),
            };
            let next = trigger.next_occurrence(now).unwrap();
            assert!(next > now);
            assert!(next - now <= chrono::Duration::days(7));

            let local = next.with_timezone(&trigger.timezone);
            assert_ne!(local.weekday().num_days_from_monday() as u8, skipped);
            assert_eq!((local.hour(), local.minute()), (6, 30));
        }
    }

    #[test]
    fn dst_gap_day_is_skipped_forward() {
        // US Eastern springs forward on 2026-03-08; 02:30 does not exist
        // that day, so the occurrence lands on the 9th.
        let trigger = Trigger {
            send_time: "02:30".parse().unwrap(),
            timezone: chrono_tz::America::New_York,
            skip_days: SkipDays::empty(),
        };
        let now = Utc.with_ymd_and_hms(2026, 3, 8, 1, 0, 0).unwrap();
        let next = trigger.next_occurrence(now).unwrap();
        let local = next.with_timezone(&trigger.timezone);
        assert_eq!(local.date_naive().to_string(), "2026-03-09");
        assert_eq!((local.hour(), local.minute()), (2, 30));
    }

    #[tokio::test]
    async fn schedule_is_idempotent_per_chat() {
        let store = Arc::new(InMemoryUserStore::new());
        let user = test_user(1);
        store.put(user.clone()).await.unwrap();
        let (scheduler, _) = scheduler_with(store, Arc::new(FakeTransport::new()));

        scheduler.schedule(&user).await.unwrap();
        scheduler.schedule(&user).await.unwrap();
        scheduler.schedule(&user).await.unwrap();

        assert_eq!(scheduler.stats().await.job_count, 1);
        assert!(scheduler.unschedule(ChatId(1)).await);
        assert!(!scheduler.unschedule(ChatId(1)).await);
        assert_eq!(scheduler.stats().await.job_count, 0);
    }

    #[tokio::test]
    async fn schedule_rejects_impossible_rules() {
        let store = Arc::new(InMemoryUserStore::new());
        let (scheduler, _) = scheduler_with(store, Arc::new(FakeTransport::new()));

        let mut all_week = test_user(1);
        all_week.skip_days = SkipDays::parse_csv("0,1,2,3,4,5,6").unwrap();
        assert!(matches!(
            scheduler.schedule(&all_week).await,
            Err(Error::InvalidSchedule(_))
        ));

        let mut inactive = test_user(2);
        inactive.active = false;
        assert!(matches!(
            scheduler.schedule(&inactive).await,
            Err(Error::InvalidSchedule(_))
        ));

        assert_eq!(scheduler.stats().await.job_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn firing_delivers_once_and_keeps_the_job() {
        let store = Arc::new(InMemoryUserStore::new());
        let user = test_user(1);
        store.put(user.clone()).await.unwrap();
        let transport = Arc::new(FakeTransport::new());
        let (scheduler, ledger) = scheduler_with(store, transport.clone());

        scheduler.schedule(&user).await.unwrap();

        // Let the job task register its sleep before moving the clock.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        let next = Trigger::for_user(&user).next_occurrence(Utc::now()).unwrap();
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::advance(wait + Duration::from_secs(61)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        assert_eq!(ledger.entries_for(ChatId(1)).await.len(), 1);
        assert!(scheduler.has_job(ChatId(1)).await);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_with_backoff() {
        let store = Arc::new(InMemoryUserStore::new());
        store.put(test_user(1)).await.unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport.queue_send_failure(TransportError::Network("timeout".into()));
        transport.queue_send_failure(TransportError::Network("timeout".into()));
        let (scheduler, ledger) = scheduler_with(store.clone(), transport.clone());

        deliver_with_retry(
            Arc::clone(&scheduler.inner),
            ChatId(1),
            CancellationToken::new(),
        )
        .await;

        // Third attempt succeeded.
        assert_eq!(ledger.entries_for(ChatId(1)).await.len(), 1);
        assert!(store.get(ChatId(1)).await.unwrap().unwrap().active);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_deactivates_and_unschedules() {
        let store = Arc::new(InMemoryUserStore::new());
        let user = test_user(1);
        store.put(user.clone()).await.unwrap();
        let transport = Arc::new(FakeTransport::new());
        transport.queue_send_failure(TransportError::Unreachable("blocked".into()));
        let (scheduler, ledger) = scheduler_with(store.clone(), transport);

        scheduler.schedule(&user).await.unwrap();
        deliver_with_retry(
            Arc::clone(&scheduler.inner),
            ChatId(1),
            CancellationToken::new(),
        )
        .await;

        assert!(ledger.entries_for(ChatId(1)).await.is_empty());
        assert!(!scheduler.has_job(ChatId(1)).await);
        assert!(!store.get(ChatId(1)).await.unwrap().unwrap().active);
    }
}
