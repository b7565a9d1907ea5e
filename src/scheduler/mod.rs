//! Wall-clock aligned scheduled pulls.
//!
//! Boundaries are aligned to the wall clock of the configured timezone. Each
//! firing re-arms a single one-shot alarm at the boundary after the one it
//! pulls for, so lateness never accumulates.

use crate::bridge::BridgeContext;
use crate::config::SchedulerConfig;
use crate::errors::BridgeError;
use crate::host::{Alarm, AlarmCallback};
use crate::message::ConversationId;
use crate::reply::deliver;
use crate::utils::now_ms;
use chrono::{DateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use futures_util::FutureExt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

const MINUTE_MS: i64 = 60_000;

/// UTC offset of `tz` at `at_ms`, in milliseconds.
fn offset_ms(at_ms: i64, tz: Tz) -> i64 {
    DateTime::<Utc>::from_timestamp_millis(at_ms)
        .map(|dt| {
            let offset = tz.offset_from_utc_datetime(&dt.naive_utc()).fix();
            i64::from(offset.local_minus_utc()) * 1000
        })
        .unwrap_or(0)
}

/// First wall-clock boundary in `tz` strictly after `now_ms`.
pub fn next_boundary(now_ms: i64, interval_ms: i64, tz: Tz) -> i64 {
    let offset = offset_ms(now_ms, tz);
    (now_ms + offset).div_euclid(interval_ms).saturating_add(1) * interval_ms - offset
}

/// Wall-clock boundary in `tz` nearest to `now_ms`; absorbs small early or late firings.
pub fn normalized_boundary(now_ms: i64, interval_ms: i64, tz: Tz) -> i64 {
    let offset = offset_ms(now_ms, tz);
    (now_ms + offset + interval_ms / 2).div_euclid(interval_ms) * interval_ms - offset
}

/// `HH:MM` rendering of `at_ms` in `tz`.
pub fn time_hint(at_ms: i64, tz: Tz) -> String {
    DateTime::<Utc>::from_timestamp_millis(at_ms)
        .map(|dt| dt.with_timezone(&tz).format("%H:%M").to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed { next_ms: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireReport {
    pub expected_ms: i64,
    pub observed_ms: i64,
    pub next_ms: i64,
    pub time_hint: String,
    pub pulled: usize,
    pub delivered: usize,
    pub error: Option<String>,
}

struct Inner {
    ctx: Arc<BridgeContext>,
    alarm: Arc<dyn Alarm>,
    interval_ms: i64,
    tz: Tz,
    state: Mutex<SchedulerState>,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        ctx: Arc<BridgeContext>,
        alarm: Arc<dyn Alarm>,
        config: &SchedulerConfig,
    ) -> Result<Self, BridgeError> {
        let tz: Tz = config.timezone.parse().map_err(|_| {
            BridgeError::Config(format!("unknown scheduler timezone '{}'", config.timezone))
        })?;
        let minutes = i64::try_from(config.interval_minutes.max(1)).unwrap_or(10);
        Ok(Self {
            inner: Arc::new(Inner {
                ctx,
                alarm,
                interval_ms: minutes * MINUTE_MS,
                tz,
                state: Mutex::new(SchedulerState::Idle),
            }),
        })
    }

    fn state_guard(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn state(&self) -> SchedulerState {
        *self.state_guard()
    }

    /// Arm at the next boundary, replacing any pending alarm.
    pub fn start(&self) -> i64 {
        self.start_at(now_ms())
    }

    pub fn start_at(&self, now_ms: i64) -> i64 {
        self.inner.alarm.cancel();
        let next = self.arm_at(next_boundary(now_ms, self.inner.interval_ms, self.inner.tz));
        info!("scheduler started, first pull at {}", self.render(next));
        next
    }

    pub fn stop(&self) {
        self.inner.alarm.cancel();
        *self.state_guard() = SchedulerState::Idle;
        info!("scheduler stopped");
    }

    fn arm_at(&self, next: i64) -> i64 {
        *self.state_guard() = SchedulerState::Armed { next_ms: next };
        let this = self.clone();
        let callback: AlarmCallback = Box::new(move || {
            async move {
                this.fire().await;
            }
            .boxed()
        });
        self.inner.alarm.arm_once(next, callback);
        next
    }

    fn render(&self, at_ms: i64) -> String {
        DateTime::<Utc>::from_timestamp_millis(at_ms)
            .map(|dt| dt.with_timezone(&self.inner.tz).format("%H:%M:%S").to_string())
            .unwrap_or_default()
    }

    /// Alarm callback entry point.
    pub async fn fire(&self) -> Option<FireReport> {
        self.fire_at(now_ms()).await
    }

    /// Handle a firing observed at `now_ms`. Ignored while idle.
    pub async fn fire_at(&self, now_ms: i64) -> Option<FireReport> {
        let expected_ms = match self.state() {
            SchedulerState::Armed { next_ms } => next_ms,
            SchedulerState::Idle => {
                debug!("alarm fired while scheduler idle, ignored");
                return None;
            }
        };
        info!(
            "scheduled pull fired at {} (expected {}, drift {} ms)",
            self.render(now_ms),
            self.render(expected_ms),
            now_ms - expected_ms
        );

        // The firing owns the nearest boundary; the next alarm is the one after it,
        // so an early firing never re-arms for the slot it is about to pull.
        let slot = normalized_boundary(now_ms, self.inner.interval_ms, self.inner.tz);
        // Re-arm before the pull so a slow or failing pull cannot stall the chain.
        let next_ms = self.arm_at(slot + self.inner.interval_ms);
        let hint = time_hint(slot, self.inner.tz);

        let mut report = FireReport {
            expected_ms,
            observed_ms: now_ms,
            next_ms,
            time_hint: hint.clone(),
            pulled: 0,
            delivered: 0,
            error: None,
        };

        let ctx = &self.inner.ctx;
        let messages = match ctx.decision.pull_scheduled(Some(&hint)).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("scheduled pull for {} failed: {}", hint, e);
                report.error = Some(e.to_string());
                return Some(report);
            }
        };
        report.pulled = messages.len();

        for item in messages {
            let id = ConversationId::from_raw(item.chat_id);
            let Some(kind) = id.kind() else {
                warn!("scheduled message for unrecognized chat id '{}' skipped", id);
                continue;
            };
            let outcome = deliver(&ctx.resolver, &ctx.injector, &id, None, kind, &item.message).await;
            if outcome.is_delivered() {
                report.delivered += 1;
            }
        }
        info!(
            "scheduled pull {} delivered {}/{}",
            hint, report.delivered, report.pulled
        );
        Some(report)
    }
}

#[cfg(test)]
mod tests;
