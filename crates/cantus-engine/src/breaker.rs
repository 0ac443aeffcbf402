//! Circuit breaker in front of the model.
//!
//! Three states per `(engine, device)` key: closed counts consecutive
//! failures, open fails fast until its window elapses, half-open admits
//! a single probe. Fast failures in the open state never count toward
//! the streak.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use cantus_core::domain::Engine;
use cantus_core::ports::SynthesisError;
use cantus_core::settings::Device;

/// Consecutive failures that trip the breaker.
const FAILURE_THRESHOLD: u32 = 5;
/// How long the breaker stays open before admitting a probe.
const OPEN_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed { failures: u32 },
    Open { until: Instant },
    /// One probe may be in flight; its outcome decides the next state.
    HalfOpen { probe_in_flight: bool },
}

/// Shared-state failure isolator for a single `(engine, device)` key.
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    open_window: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(FAILURE_THRESHOLD, OPEN_WINDOW)
    }
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(threshold: u32, open_window: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
            threshold: threshold.max(1),
            open_window,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Gate a call. `Err(CircuitOpen)` means the model was not touched.
    pub fn admit(&self) -> Result<(), SynthesisError> {
        let mut state = self.lock();
        match *state {
            BreakerState::Closed { .. } => Ok(()),
            BreakerState::Open { until } => {
                let now = Instant::now();
                if now >= until {
                    *state = BreakerState::HalfOpen {
                        probe_in_flight: true,
                    };
                    Ok(())
                } else {
                    Err(SynthesisError::CircuitOpen {
                        retry_in: until - now,
                    })
                }
            }
            BreakerState::HalfOpen { probe_in_flight } => {
                if probe_in_flight {
                    Err(SynthesisError::CircuitOpen {
                        retry_in: Duration::ZERO,
                    })
                } else {
                    *state = BreakerState::HalfOpen {
                        probe_in_flight: true,
                    };
                    Ok(())
                }
            }
        }
    }

    pub fn on_success(&self) {
        let mut state = self.lock();
        match *state {
            BreakerState::HalfOpen { .. } => {
                tracing::info!("circuit breaker probe succeeded, closing");
                *state = BreakerState::Closed { failures: 0 };
            }
            BreakerState::Closed { .. } => {
                *state = BreakerState::Closed { failures: 0 };
            }
            BreakerState::Open { .. } => {}
        }
    }

    pub fn on_failure(&self) {
        let mut state = self.lock();
        match *state {
            BreakerState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.threshold {
                    tracing::warn!(failures, "circuit breaker opening");
                    *state = BreakerState::Open {
                        until: Instant::now() + self.open_window,
                    };
                } else {
                    *state = BreakerState::Closed { failures };
                }
            }
            BreakerState::HalfOpen { .. } => {
                tracing::warn!("circuit breaker probe failed, re-opening");
                *state = BreakerState::Open {
                    until: Instant::now() + self.open_window,
                };
            }
            BreakerState::Open { .. } => {}
        }
    }

    /// Health-probe label: `closed`, `open` or `half_open`.
    #[must_use]
    pub fn state_label(&self) -> &'static str {
        match *self.lock() {
            BreakerState::Closed { .. } => "closed",
            BreakerState::Open { .. } => "open",
            BreakerState::HalfOpen { .. } => "half_open",
        }
    }
}

/// Breakers keyed per `(engine, device)`.
///
/// One facade uses one key at a time, but the key survives a CPU
/// fallback: the GPU breaker keeps its history should the device come
/// back.
#[derive(Default)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<(Engine, Device), std::sync::Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, engine: Engine, device: Device) -> std::sync::Arc<CircuitBreaker> {
        let mut breakers = self
            .breakers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        breakers
            .entry((engine, device))
            .or_insert_with(|| std::sync::Arc::new(CircuitBreaker::default()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(60));

        for _ in 0..4 {
            breaker.admit().unwrap();
            breaker.on_failure();
        }
        assert_eq!(breaker.state_label(), "closed");

        breaker.admit().unwrap();
        breaker.on_failure();
        assert_eq!(breaker.state_label(), "open");

        let err = breaker.admit().unwrap_err();
        assert!(matches!(err, SynthesisError::CircuitOpen { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_the_streak() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.on_failure();
        breaker.on_failure();
        breaker.on_success();
        breaker.on_failure();
        breaker.on_failure();
        assert_eq!(breaker.state_label(), "closed");
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_single_probe_then_closes_on_success() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.on_failure();
        assert_eq!(breaker.state_label(), "open");

        tokio::time::advance(Duration::from_secs(61)).await;

        breaker.admit().unwrap();
        assert_eq!(breaker.state_label(), "half_open");
        // A second caller during the probe is rejected.
        assert!(breaker.admit().is_err());

        breaker.on_success();
        assert_eq!(breaker.state_label(), "closed");
        breaker.admit().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.on_failure();
        tokio::time::advance(Duration::from_secs(61)).await;

        breaker.admit().unwrap();
        breaker.on_failure();
        assert_eq!(breaker.state_label(), "open");
        assert!(breaker.admit().is_err());
    }

    #[tokio::test]
    async fn registry_hands_out_one_breaker_per_key() {
        let registry = BreakerRegistry::new();
        let a = registry.get(Engine::Xtts, Device::Cuda);
        let b = registry.get(Engine::Xtts, Device::Cuda);
        let c = registry.get(Engine::Xtts, Device::Cpu);

        a.on_failure();
        assert!(std::sync::Arc::ptr_eq(&a, &b));
        assert!(!std::sync::Arc::ptr_eq(&a, &c));
    }
}
