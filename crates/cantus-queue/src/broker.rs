//! In-process task broker.
//!
//! Single-host deployment target means the broker can live in-process;
//! the [`TaskQueue`] port keeps the seam so an external broker can slot
//! in without touching the worker. Semantics match what the worker is
//! written against: at-least-once delivery, per-delivery tokens, and a
//! visibility timeout that returns unacked leases to the ready queue.
//!
//! # Locking discipline
//!
//! The state mutex is a `std` lock held only for short, await-free
//! critical sections. Waiters park on a `Notify` and re-check state,
//! with a periodic wake to notice expired leases.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use cantus_core::domain::JobId;
use cantus_core::ports::{QueueError, QueueStats, TaskLease, TaskQueue, TaskToken};

/// How often parked dequeuers wake to scan for expired leases.
const EXPIRY_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
struct ReadyTask {
    job_id: JobId,
    request_id: String,
    attempt: u32,
}

#[derive(Debug, Clone)]
struct LeasedTask {
    job_id: JobId,
    request_id: String,
    attempt: u32,
    visible_again_at: Instant,
}

#[derive(Default)]
struct BrokerState {
    ready: VecDeque<ReadyTask>,
    in_flight: HashMap<u64, LeasedTask>,
    next_token: u64,
}

impl BrokerState {
    /// Move expired leases back to the ready queue, bumping the attempt.
    fn reap_expired(&mut self, now: Instant) {
        let expired: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, lease)| lease.visible_again_at <= now)
            .map(|(token, _)| *token)
            .collect();
        for token in expired {
            if let Some(lease) = self.in_flight.remove(&token) {
                tracing::warn!(
                    job_id = %lease.job_id,
                    attempt = lease.attempt,
                    "visibility timeout elapsed, requeueing task"
                );
                self.ready.push_back(ReadyTask {
                    job_id: lease.job_id,
                    request_id: lease.request_id,
                    attempt: lease.attempt + 1,
                });
            }
        }
    }
}

/// In-process [`TaskQueue`] implementation.
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
    notify: Notify,
    visibility_timeout: Duration,
    max_in_flight: usize,
    closed: AtomicBool,
}

impl MemoryBroker {
    /// `visibility_timeout` should comfortably exceed the synthesis
    /// deadline, otherwise a slow job gets redelivered while still
    /// running.
    #[must_use]
    pub fn new(visibility_timeout: Duration, max_in_flight: usize) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            notify: Notify::new(),
            visibility_timeout,
            max_in_flight: max_in_flight.max(1),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BrokerState> {
        // Lock poisoning only happens if a holder panicked; the state is
        // a plain queue, safe to keep using.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn try_lease(&self) -> Option<TaskLease> {
        let mut state = self.lock();
        state.reap_expired(Instant::now());
        if state.in_flight.len() >= self.max_in_flight {
            return None;
        }
        let task = state.ready.pop_front()?;
        state.next_token += 1;
        let token = TaskToken(state.next_token);
        state.in_flight.insert(
            token.0,
            LeasedTask {
                job_id: task.job_id.clone(),
                request_id: task.request_id.clone(),
                attempt: task.attempt,
                visible_again_at: Instant::now() + self.visibility_timeout,
            },
        );
        Some(TaskLease {
            token,
            job_id: task.job_id,
            request_id: task.request_id,
            attempt: task.attempt,
        })
    }
}

#[async_trait]
impl TaskQueue for MemoryBroker {
    async fn enqueue(&self, job_id: JobId, request_id: String) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        {
            let mut state = self.lock();
            state.ready.push_back(ReadyTask {
                job_id,
                request_id,
                attempt: 1,
            });
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<TaskLease>, QueueError> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }
            if let Some(lease) = self.try_lease() {
                return Ok(Some(lease));
            }
            // Park until new work, a freed slot, or the expiry scan tick.
            tokio::select! {
                () = self.notify.notified() => {}
                () = tokio::time::sleep(EXPIRY_POLL_INTERVAL) => {}
            }
        }
    }

    async fn ack(&self, token: TaskToken) -> Result<(), QueueError> {
        let removed = self.lock().in_flight.remove(&token.0);
        if removed.is_some() {
            self.notify.notify_waiters();
            Ok(())
        } else {
            // Stale token after a visibility-timeout redelivery; the
            // newer lease owns the task now.
            Err(QueueError::Internal(format!("unknown or stale {token}")))
        }
    }

    async fn nack(&self, token: TaskToken, requeue: bool) -> Result<(), QueueError> {
        let removed = self.lock().in_flight.remove(&token.0);
        let Some(lease) = removed else {
            return Err(QueueError::Internal(format!("unknown or stale {token}")));
        };
        if requeue {
            self.lock().ready.push_back(ReadyTask {
                job_id: lease.job_id,
                request_id: lease.request_id,
                attempt: lease.attempt + 1,
            });
        }
        self.notify.notify_waiters();
        Ok(())
    }

    fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            ready: state.ready.len(),
            in_flight: state.in_flight.len(),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}
