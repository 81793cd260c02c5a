//! Chaotic store wrapper for fault injection testing.
//!
//! Wraps another ride store and randomly fails operations with
//! `Unavailable`, to exercise the retry-with-backoff path and the
//! failure-acknowledgment path without a real flaky backend.

use std::sync::{Arc, Mutex};

use ridewire_proto::{RideId, RideSession, RideStatus};

use super::{RideStore, RideUpdate, StoreError};

/// Fault-injecting wrapper around a ride store.
///
/// Delegates to the underlying store but fails operations with probability
/// `failure_rate`. The RNG is a seeded LCG so chaos runs are reproducible;
/// the rate is adjustable at runtime so tests can switch an outage on and
/// off deterministically.
#[derive(Clone)]
pub struct ChaoticRideStore<S: RideStore> {
    inner: S,
    state: Arc<Mutex<ChaosState>>,
}

struct ChaosState {
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// LCG state for deterministic chaos
    rng: u64,
    /// Operations attempted, successful or not
    operation_count: usize,
}

impl ChaosState {
    /// Next random value in [0.0, 1.0), LCG constants from Numerical
    /// Recipes.
    fn next(&mut self) -> f64 {
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.rng = (A.wrapping_mul(self.rng).wrapping_add(C)) % M;
        (self.rng as f64) / (M as f64)
    }

    fn should_fail(&mut self) -> bool {
        self.operation_count += 1;
        let rate = self.failure_rate;
        self.next() < rate
    }
}

impl<S: RideStore> ChaoticRideStore<S> {
    /// Wrap a store with the given failure rate and a fixed default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0].
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9abc_def0)
    }

    /// Wrap a store with an explicit seed for reproducible chaos.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0].
    #[allow(clippy::panic)]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            state: Arc::new(Mutex::new(ChaosState {
                failure_rate,
                rng: seed,
                operation_count: 0,
            })),
        }
    }

    /// Underlying store, for checking invariants after chaos.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Change the failure rate; affects subsequent operations on every
    /// clone.
    ///
    /// # Panics
    ///
    /// Panics if the chaos mutex is poisoned. Acceptable for test
    /// tooling.
    #[allow(clippy::expect_used)]
    pub fn set_failure_rate(&self, failure_rate: f64) {
        self.state.lock().expect("ChaosState mutex poisoned").failure_rate = failure_rate;
    }

    /// Total operations attempted through this wrapper.
    ///
    /// # Panics
    ///
    /// Panics if the chaos mutex is poisoned. Acceptable for test
    /// tooling.
    #[allow(clippy::expect_used)]
    pub fn operation_count(&self) -> usize {
        self.state.lock().expect("ChaosState mutex poisoned").operation_count
    }

    #[allow(clippy::expect_used)]
    fn injected_fault(&self) -> Option<StoreError> {
        let mut state = self.state.lock().expect("ChaosState mutex poisoned");
        state.should_fail().then(|| StoreError::Unavailable("injected fault".to_string()))
    }
}

impl<S: RideStore> RideStore for ChaoticRideStore<S> {
    async fn create(&self, session: &RideSession) -> Result<(), StoreError> {
        if let Some(fault) = self.injected_fault() {
            return Err(fault);
        }
        self.inner.create(session).await
    }

    async fn get(&self, ride_id: &RideId) -> Result<RideSession, StoreError> {
        if let Some(fault) = self.injected_fault() {
            return Err(fault);
        }
        self.inner.get(ride_id).await
    }

    async fn conditional_update(
        &self,
        ride_id: &RideId,
        expected: RideStatus,
        update: RideUpdate,
    ) -> Result<RideSession, StoreError> {
        if let Some(fault) = self.injected_fault() {
            return Err(fault);
        }
        self.inner.conditional_update(ride_id, expected, update).await
    }
}
