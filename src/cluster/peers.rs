//! Peer Health
//!
//! One circuit breaker per remote cluster member.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::Config;

use super::breaker::{BreakerState, CircuitBreaker};

/// Breakers keyed by peer URL
#[derive(Debug)]
pub struct PeerBreakers {
    breakers: HashMap<String, CircuitBreaker>,
}

impl PeerBreakers {
    /// One breaker for every member except `self_url`
    pub fn new<I, S>(peers: I, self_url: &str, failure_threshold: u32, retry_timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let breakers = peers
            .into_iter()
            .map(Into::into)
            .filter(|url: &String| url != self_url)
            .map(|url| (url, CircuitBreaker::new(failure_threshold, retry_timeout)))
            .collect();
        Self { breakers }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.cluster_urls.iter().cloned(),
            &config.self_url,
            config.breaker_failure_threshold,
            config.breaker_retry_timeout(),
        )
    }

    pub fn get(&self, peer: &str) -> Option<&CircuitBreaker> {
        self.breakers.get(peer)
    }

    /// State of `peer`; unknown peers are treated as healthy
    pub fn current_state(&self, peer: &str) -> BreakerState {
        self.breakers
            .get(peer)
            .map_or(BreakerState::Allowing, CircuitBreaker::current_state)
    }

    pub fn record_success(&self, peer: &str) {
        if let Some(breaker) = self.breakers.get(peer) {
            breaker.record_success();
        }
    }

    pub fn record_failure(&self, peer: &str) {
        if let Some(breaker) = self.breakers.get(peer) {
            breaker.record_failure();
            tracing::debug!(peer, failures = breaker.failure_count(), "forward failure recorded");
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
