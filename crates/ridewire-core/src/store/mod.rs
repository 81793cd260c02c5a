//! Ride store abstraction.
//!
//! The store is the durable source of truth for ride sessions; the engine
//! never caches a session as authoritative state. The contract's core is
//! [`RideStore::conditional_update`]: a compare-and-swap that checks the
//! current status and applies the new fields in one atomic step. That
//! single operation is what makes two racing accepts resolve to exactly
//! one winner.

mod chaotic;
mod memory;

use std::time::Duration;

pub use chaotic::ChaoticRideStore;
pub use memory::MemoryRideStore;
use ridewire_proto::{RideId, RideSession, RideStatus, UserId};

use crate::env::Environment;

/// Field changes applied by a conditional update alongside the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RideUpdate {
    /// New lifecycle status.
    pub status: RideStatus,
    /// Driver to attach; only the accept transition sets this.
    pub driver_id: Option<UserId>,
    /// Price override; only the finish transition sets this.
    pub price: Option<u64>,
}

/// Errors from ride store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// No session exists under this ride id.
    #[error("ride not found: {0}")]
    NotFound(RideId),

    /// The conditional update's status check failed.
    ///
    /// Expected during assignment races; callers decide whether this is a
    /// lost race or an illegal transition.
    #[error("precondition failed: expected {expected}, found {actual}")]
    Precondition {
        /// Status the update required.
        expected: RideStatus,
        /// Status actually stored.
        actual: RideStatus,
    },

    /// I/O failure reaching the backend. Retried with backoff at the
    /// store boundary before surfacing to the caller.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage contract for ride sessions.
///
/// Must be `Clone` (shared across connection tasks) and thread-safe.
/// Implementations typically share internal state via `Arc`, so clones
/// access the same underlying store.
///
/// # Invariants
///
/// - `conditional_update` MUST check the stored status and apply the new
///   fields as one atomic step; no other writer may interleave between
///   the check and the write.
/// - A successful update returns the session as written, so callers can
///   build broadcast payloads without a second read.
pub trait RideStore: Clone + Send + Sync + 'static {
    /// Persist a new session under its ride id.
    ///
    /// The caller supplies a freshly generated id; overwriting an
    /// existing session is outside the contract.
    fn create(&self, session: &RideSession) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Load a session by ride id.
    fn get(&self, ride_id: &RideId)
    -> impl Future<Output = Result<RideSession, StoreError>> + Send;

    /// Compare-and-swap: apply `update` only if the stored status equals
    /// `expected`, returning the updated session.
    fn conditional_update(
        &self,
        ride_id: &RideId,
        expected: RideStatus,
        update: RideUpdate,
    ) -> impl Future<Output = Result<RideSession, StoreError>> + Send;
}

/// Retry schedule for transient store failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each subsequent retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(50) }
    }
}

/// Run a store operation, retrying `Unavailable` with exponential backoff.
///
/// `NotFound` and `Precondition` are definitive answers and are never
/// retried. On exhaustion the last `Unavailable` is returned and the
/// caller reports a failure acknowledgment instead of broadcasting.
pub async fn with_retry<E, T, F, Fut>(
    env: &E,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, StoreError>
where
    E: Environment,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Err(StoreError::Unavailable(reason)) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(StoreError::Unavailable(reason));
                }
                let backoff = policy.base_delay * 2u32.saturating_pow(attempt - 1);
                env.sleep(backoff).await;
            },
            other => return other,
        }
    }
}
