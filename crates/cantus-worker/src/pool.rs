//! The worker pool: N cooperative slots drawing from the broker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cantus_core::domain::JobId;
use cantus_core::ports::TaskToken;

use crate::runner::{process_lease, WorkerDeps};

/// Leases currently being worked, by slot. The shutdown path drains
/// this to hand unfinished work back to the broker and the store.
type InFlightLeases = Arc<Mutex<HashMap<usize, (TaskToken, JobId)>>>;

fn lock_leases(leases: &InFlightLeases) -> std::sync::MutexGuard<'_, HashMap<usize, (TaskToken, JobId)>> {
    leases.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Pool of `max_concurrent_jobs` worker slots.
///
/// Each slot loops dequeue → process → ack until the broker closes.
/// Synthesis parallelism is still bounded by the facade's model lock;
/// extra slots overlap clone jobs and the non-inference phases of
/// synthesis jobs.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
    deps: WorkerDeps,
    drain: Duration,
    in_flight: InFlightLeases,
}

impl WorkerPool {
    /// Spawn `slots` workers immediately.
    #[must_use]
    pub fn start(deps: WorkerDeps, slots: usize, drain: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let in_flight: InFlightLeases = Arc::default();
        let handles = (0..slots.max(1))
            .map(|slot| {
                let deps = deps.clone();
                let cancelled = shutdown.clone();
                let in_flight = in_flight.clone();
                tokio::spawn(async move {
                    run_slot(slot, deps, cancelled, in_flight).await;
                })
            })
            .collect();

        Self {
            handles,
            shutdown,
            deps,
            drain,
            in_flight,
        }
    }

    /// Graceful shutdown: stop dequeuing and give in-flight jobs the
    /// drain window. Jobs still running when it elapses are nacked back
    /// to the broker (requeue) and returned to `queued` in the store,
    /// so a future process instance redelivers them instead of losing
    /// them.
    pub async fn shutdown(mut self) {
        tracing::info!("worker pool shutting down");
        self.deps.queue.close();

        let deadline = tokio::time::Instant::now() + self.drain;
        let mut timed_out = false;
        for handle in &mut self.handles {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, &mut *handle).await.is_err() {
                timed_out = true;
            }
        }
        if !timed_out {
            return;
        }

        tracing::warn!(
            drain_secs = self.drain.as_secs(),
            "drain window elapsed, handing in-flight jobs back for redelivery"
        );
        self.shutdown.cancel();
        // Stop the straggler slots before touching their jobs, so no
        // late write races the hand-back below.
        for handle in &self.handles {
            handle.abort();
        }

        let leases: Vec<(TaskToken, JobId)> =
            lock_leases(&self.in_flight).drain().map(|(_, lease)| lease).collect();
        for (token, job_id) in leases {
            if let Err(e) = self.deps.queue.nack(token, true).await {
                tracing::debug!(job_id = %job_id, error = %e, "nack failed (lease already settled?)");
            }
            match self.deps.jobs.requeue_interrupted(&job_id).await {
                Ok(true) => {
                    tracing::info!(job_id = %job_id, "in-flight job handed back for redelivery");
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "could not requeue interrupted job");
                }
            }
        }
    }
}

async fn run_slot(
    slot: usize,
    deps: WorkerDeps,
    cancelled: CancellationToken,
    in_flight: InFlightLeases,
) {
    tracing::debug!(slot, "worker slot started");
    loop {
        let lease = tokio::select! {
            () = cancelled.cancelled() => break,
            lease = deps.queue.dequeue() => lease,
        };
        match lease {
            Ok(Some(lease)) => {
                lock_leases(&in_flight).insert(slot, (lease.token, lease.job_id.clone()));
                process_lease(&deps, lease).await;
                lock_leases(&in_flight).remove(&slot);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!(slot, error = %e, "dequeue failed, slot exiting");
                break;
            }
        }
    }
    tracing::debug!(slot, "worker slot stopped");
}
