//! Registry of circuit breakers keyed by operation name.
//!
//! Construct one registry at startup and share it by `Arc`. Breakers are
//! created lazily on first use and live as long as the registry.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use sentinel_core::clock::Clock;

use crate::circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitBreakerState};

/// Lazily populated map of operation name to breaker.
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    overrides: HashMap<String, BreakerConfig>,
    clock: Arc<dyn Clock>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl std::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("config", &self.config)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

impl CircuitBreakerRegistry {
    /// Creates an empty registry; every breaker uses `config`.
    #[must_use]
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            overrides: HashMap::new(),
            clock,
            breakers: DashMap::new(),
        }
    }

    /// Uses `config` instead of the default for `operation`.
    #[must_use]
    pub fn with_override(mut self, operation: impl Into<String>, config: BreakerConfig) -> Self {
        self.overrides.insert(operation.into(), config);
        self
    }

    /// Returns the breaker for `operation`, creating it on first use.
    pub fn get_or_create(&self, operation: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(operation) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .breakers
            .entry(operation.to_owned())
            .or_insert_with(|| {
                let config = self.overrides.get(operation).copied().unwrap_or(self.config);
                Arc::new(CircuitBreaker::new(
                    operation,
                    config,
                    Arc::clone(&self.clock),
                ))
            });
        Arc::clone(entry.value())
    }

    /// Snapshot of one breaker, if it has been used.
    #[must_use]
    pub fn snapshot(&self, operation: &str) -> Option<CircuitBreakerState> {
        let breaker = self.breakers.get(operation).map(|b| Arc::clone(b.value()));
        breaker.map(|b| b.snapshot())
    }

    /// Snapshots of every breaker, sorted by operation name.
    #[must_use]
    pub fn snapshots(&self) -> Vec<CircuitBreakerState> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut states: Vec<CircuitBreakerState> = breakers.iter().map(|b| b.snapshot()).collect();
        states.sort_by(|a, b| a.operation.cmp(&b.operation));
        states
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use sentinel_test_support::FixedClock;

    use super::*;
    use crate::circuit_breaker::CircuitState;

    fn registry() -> CircuitBreakerRegistry {
        let clock = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ));
        CircuitBreakerRegistry::new(BreakerConfig::default(), clock)
    }

    #[test]
    fn test_same_name_returns_same_breaker() {
        let registry = registry();

        let first = registry.get_or_create("billing.charge");
        let second = registry.get_or_create("billing.charge");

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_concurrent_first_use_creates_one_breaker() {
        let registry = registry();

        let breakers: Vec<Arc<CircuitBreaker>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.get_or_create("billing.charge")))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(breakers.iter().all(|b| Arc::ptr_eq(b, &breakers[0])));
        assert_eq!(registry.snapshots().len(), 1);
    }

    #[test]
    fn test_breakers_are_isolated_per_operation() {
        let registry = registry().with_override(
            "billing.charge",
            BreakerConfig {
                threshold: 1,
                cooldown: Duration::from_secs(60),
            },
        );

        registry
            .get_or_create("billing.charge")
            .try_acquire::<()>()
            .unwrap()
            .fail();
        let other = registry.get_or_create("org.invite_member");

        assert_eq!(
            registry.snapshot("billing.charge").unwrap().state,
            CircuitState::Open
        );
        assert_eq!(other.state(), CircuitState::Closed);
        assert_eq!(other.snapshot().threshold, 5);
    }

    #[test]
    fn test_snapshots_only_cover_used_operations() {
        let registry = registry();
        assert!(registry.snapshot("never.used").is_none());

        registry.get_or_create("b");
        registry.get_or_create("a");

        let names: Vec<String> = registry
            .snapshots()
            .into_iter()
            .map(|s| s.operation)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
