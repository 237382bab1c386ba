//! Circuit Breaker
//!
//! Per-peer failure tracking that decides whether a forward is attempted.
//!
//! ## States
//! ```text
//!             failures > threshold
//!   Allowing ───────────────────────▶ Blocking
//!      ▲                                 │
//!      │ record_success                  │ retry timeout elapsed
//!      │                                 ▼
//!      └──────────────────────────── Probing
//! ```
//! `Allowing` lets traffic through, `Blocking` fails fast without network
//! I/O, and `Probing` grants one trial forward per cool-down.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Breaker state as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BreakerState {
    /// Healthy; forward normally
    Allowing = 0,
    /// Tripped; reject without trying
    Blocking = 1,
    /// Cool-down elapsed; one trial forward allowed
    Probing = 2,
}

impl BreakerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BreakerState::Allowing,
            1 => BreakerState::Blocking,
            _ => BreakerState::Probing,
        }
    }

    /// Whether a forward should be attempted
    pub fn permits_request(self) -> bool {
        !matches!(self, BreakerState::Blocking)
    }
}

#[derive(Debug)]
struct Counters {
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Failure-counting breaker for one peer
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Read without the lock on the Allowing fast path
    state: AtomicU8,

    counters: Mutex<Counters>,

    failure_threshold: u32,
    retry_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, retry_timeout: Duration) -> Self {
        Self {
            state: AtomicU8::new(BreakerState::Allowing as u8),
            counters: Mutex::new(Counters {
                failure_count: 0,
                last_failure: None,
            }),
            failure_threshold,
            retry_timeout,
        }
    }

    /// Count a failed forward
    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    /// Count a failed forward at `now`.
    ///
    /// Trips to `Blocking` once the count exceeds the threshold. A failed
    /// probe re-trips immediately.
    pub fn record_failure_at(&self, now: Instant) {
        let mut counters = self.counters.lock();
        counters.failure_count = counters.failure_count.saturating_add(1);

        if counters.failure_count > self.failure_threshold {
            counters.last_failure = Some(now);
            let previous = self.state.swap(BreakerState::Blocking as u8, Ordering::AcqRel);
            if previous == BreakerState::Allowing as u8 {
                tracing::warn!(failures = counters.failure_count, "circuit breaker tripped");
            }
        }
    }

    /// Reset to `Allowing` with a zero failure count
    pub fn record_success(&self) {
        let mut counters = self.counters.lock();
        counters.failure_count = 0;
        counters.last_failure = None;

        let previous = self.state.swap(BreakerState::Allowing as u8, Ordering::AcqRel);
        if previous != BreakerState::Allowing as u8 {
            tracing::info!("circuit breaker reset");
        }
    }

    pub fn current_state(&self) -> BreakerState {
        self.current_state_at(Instant::now())
    }

    /// State at `now`.
    ///
    /// Moving from `Blocking` to `Probing` restamps the cool-down, so each
    /// cool-down hands out `Probing` once.
    pub fn current_state_at(&self, now: Instant) -> BreakerState {
        let state = self.state.load(Ordering::Acquire);
        if state == BreakerState::Allowing as u8 {
            return BreakerState::Allowing;
        }

        let mut counters = self.counters.lock();
        // Re-read under the lock; a success may have raced in
        let state = BreakerState::from_u8(self.state.load(Ordering::Acquire));
        if state == BreakerState::Allowing {
            return state;
        }

        let cooled_down = counters
            .last_failure
            .map_or(true, |at| now.saturating_duration_since(at) > self.retry_timeout);
        if !cooled_down {
            return BreakerState::Blocking;
        }

        counters.last_failure = Some(now);
        self.state.store(BreakerState::Probing as u8, Ordering::Release);
        tracing::debug!("circuit breaker probing");
        BreakerState::Probing
    }

    /// Current failure count
    pub fn failure_count(&self) -> u32 {
        self.counters.lock().failure_count
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn retry_timeout(&self) -> Duration {
        self.retry_timeout
    }
}
