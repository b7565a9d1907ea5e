//! Bounded-concurrency FIFO dispatch.
//!
//! Tasks are admitted one slot at a time: `enqueue` pushes and then tries to
//! admit, and every finishing task frees its slot and tries again. The
//! in-flight count never exceeds the ceiling.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[async_trait]
pub trait TaskHandler<T: Send + 'static>: Send + Sync {
    async fn handle(&self, task: T);
}

struct Inner<T: Send + 'static> {
    pending: Mutex<VecDeque<T>>,
    in_flight: AtomicUsize,
    completed: AtomicU64,
    ceiling: usize,
    cancel: CancellationToken,
    idle: Notify,
    handler: Arc<dyn TaskHandler<T>>,
}

impl<T: Send + 'static> Inner<T> {
    fn pending(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn reserve_slot(&self) -> bool {
        self.in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.ceiling).then_some(n + 1)
            })
            .is_ok()
    }

    fn is_idle(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0 && self.pending().is_empty()
    }
}

pub struct DispatchQueue<T: Send + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> Clone for DispatchQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> DispatchQueue<T> {
    pub fn new(ceiling: usize, handler: Arc<dyn TaskHandler<T>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(VecDeque::new()),
                in_flight: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
                ceiling: ceiling.max(1),
                cancel: CancellationToken::new(),
                idle: Notify::new(),
                handler,
            }),
        }
    }

    /// Queue a task and try to start it. `false` after shutdown.
    pub fn enqueue(&self, task: T) -> bool {
        if self.inner.cancel.is_cancelled() {
            debug!("dispatch queue is shut down, task rejected");
            return false;
        }
        self.inner.pending().push_back(task);
        Self::try_admit(&self.inner);
        true
    }

    fn try_admit(inner: &Arc<Inner<T>>) {
        loop {
            if inner.cancel.is_cancelled() || !inner.reserve_slot() {
                return;
            }
            let next = inner.pending().pop_front();
            let Some(task) = next else {
                inner.in_flight.fetch_sub(1, Ordering::SeqCst);
                // A task pushed while the slot was held may have failed to
                // reserve; look once more after releasing.
                if inner.pending().is_empty() {
                    if inner.is_idle() {
                        inner.idle.notify_waiters();
                    }
                    return;
                }
                continue;
            };
            Self::spawn(inner.clone(), task);
        }
    }

    fn spawn(inner: Arc<Inner<T>>, task: T) {
        tokio::spawn(async move {
            let handler = inner.handler.clone();
            tokio::select! {
                _ = inner.cancel.cancelled() => debug!("dispatch task cancelled"),
                _ = handler.handle(task) => {}
            }
            inner.in_flight.fetch_sub(1, Ordering::SeqCst);
            inner.completed.fetch_add(1, Ordering::SeqCst);
            Self::try_admit(&inner);
            if inner.is_idle() {
                inner.idle.notify_waiters();
            }
        });
    }

    /// Cancel running tasks cooperatively and drop everything still queued.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        let dropped = {
            let mut pending = self.inner.pending();
            let n = pending.len();
            pending.clear();
            n
        };
        info!(
            "dispatch queue shut down ({} queued tasks dropped, {} in flight)",
            dropped,
            self.in_flight()
        );
        self.inner.idle.notify_waiters();
    }

    /// Resolves once nothing is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> usize {
        self.inner.pending().len()
    }

    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::SeqCst)
    }

    pub fn ceiling(&self) -> usize {
        self.inner.ceiling
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}
