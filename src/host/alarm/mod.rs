use super::{Alarm, AlarmCallback};
use crate::utils::now_ms;
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// [`Alarm`] backed by a sleeping tokio task.
///
/// The callback runs in its own task, so a callback that re-arms (and thereby
/// aborts the sleeper that launched it) keeps running. Must be armed from
/// inside a tokio runtime.
#[derive(Default)]
pub struct TokioAlarm {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl TokioAlarm {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn is_armed(&self) -> bool {
        self.pending().as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Alarm for TokioAlarm {
    fn arm_once(&self, at_ms: i64, callback: AlarmCallback) {
        let delay = u64::try_from(at_ms.saturating_sub(now_ms())).unwrap_or(0);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            tokio::spawn(callback());
        });
        if let Some(old) = self.pending().replace(handle) {
            old.abort();
        }
    }

    fn cancel(&self) {
        if let Some(handle) = self.pending().take() {
            handle.abort();
        }
    }
}

impl Drop for TokioAlarm {
    fn drop(&mut self) {
        self.cancel();
    }
}
