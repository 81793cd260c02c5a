//! In-memory ride store for development and tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use ridewire_proto::{RideId, RideSession, RideStatus};

use super::{RideStore, RideUpdate, StoreError};

/// In-memory ride store.
///
/// All state lives behind one `Arc<Mutex<..>>` so clones share the same
/// sessions. The mutex is what makes `conditional_update` a true
/// compare-and-swap: the status check and the write happen under a single
/// acquisition, so no other writer can interleave. That acquisition is the
/// per-ride serialization point the engine relies on.
#[derive(Clone, Default)]
pub struct MemoryRideStore {
    inner: Arc<Mutex<HashMap<RideId, RideSession>>>,
}

impl MemoryRideStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (a thread panicked while
    /// holding the lock). Acceptable for dev/test storage.
    #[allow(clippy::expect_used)]
    pub fn ride_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").len()
    }
}

impl RideStore for MemoryRideStore {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for dev/test
    /// storage.
    #[allow(clippy::expect_used)]
    async fn create(&self, session: &RideSession) -> Result<(), StoreError> {
        let mut rides = self.inner.lock().expect("Mutex poisoned");
        rides.insert(session.id.clone(), session.clone());
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for dev/test
    /// storage.
    #[allow(clippy::expect_used)]
    async fn get(&self, ride_id: &RideId) -> Result<RideSession, StoreError> {
        let rides = self.inner.lock().expect("Mutex poisoned");
        rides.get(ride_id).cloned().ok_or_else(|| StoreError::NotFound(ride_id.clone()))
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for dev/test
    /// storage.
    #[allow(clippy::expect_used)]
    async fn conditional_update(
        &self,
        ride_id: &RideId,
        expected: RideStatus,
        update: RideUpdate,
    ) -> Result<RideSession, StoreError> {
        let mut rides = self.inner.lock().expect("Mutex poisoned");
        let session =
            rides.get_mut(ride_id).ok_or_else(|| StoreError::NotFound(ride_id.clone()))?;

        if session.status != expected {
            return Err(StoreError::Precondition { expected, actual: session.status });
        }

        session.status = update.status;
        if let Some(driver_id) = update.driver_id {
            session.driver_id = Some(driver_id);
        }
        if let Some(price) = update.price {
            session.price = price;
        }

        Ok(session.clone())
    }
}
