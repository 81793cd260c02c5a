//! User directory contract.
//!
//! Identity and vehicle records live outside this engine; the directory is
//! consumed read-only to enrich acceptance updates and completed-trip
//! records. Credential management and profile editing are someone else's
//! endpoints.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use ridewire_proto::{DriverSummary, PassengerSummary, UserId};

/// Vehicle details attached to a driver's profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleInfo {
    /// Manufacturer.
    pub make: String,
    /// Model name.
    pub model: String,
    /// Body color.
    pub color: String,
    /// Registration plate.
    pub license_plate: String,
}

impl VehicleInfo {
    /// Rendered one-line description shown to passengers.
    pub fn summary(&self) -> String {
        format!("{} {} • {}", self.make, self.model, self.color)
    }
}

/// A user as the directory knows them.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Contact phone number.
    pub phone: String,
    /// Average rating.
    pub rating: f32,
    /// Vehicle on file; absent for passengers and unverified drivers.
    pub vehicle: Option<VehicleInfo>,
}

impl UserProfile {
    /// Passenger-facing view of this profile.
    pub fn passenger_summary(&self) -> PassengerSummary {
        PassengerSummary { id: self.id.clone(), name: self.name.clone(), phone: self.phone.clone() }
    }

    /// Driver-facing view of this profile, with vehicle fallbacks for
    /// profiles that never filed one.
    pub fn driver_summary(&self) -> DriverSummary {
        let (vehicle_info, license_plate) = match &self.vehicle {
            Some(vehicle) => (vehicle.summary(), vehicle.license_plate.clone()),
            None => ("Vehicle not on file".to_string(), "Not on file".to_string()),
        };

        DriverSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            phone: self.phone.clone(),
            vehicle_info,
            license_plate,
            rating: self.rating,
        }
    }
}

/// Errors from directory lookups.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    /// No profile exists under this user id.
    #[error("user not found: {0}")]
    NotFound(UserId),

    /// I/O failure reaching the directory backend.
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Read-only identity lookup consumed by the engine.
pub trait UserDirectory: Clone + Send + Sync + 'static {
    /// Load a user's profile.
    fn get(&self, user_id: &UserId)
    -> impl Future<Output = Result<UserProfile, DirectoryError>> + Send;
}

/// In-memory directory for development and tests.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<Mutex<HashMap<UserId, UserProfile>>>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for dev/test
    /// storage.
    #[allow(clippy::expect_used)]
    pub fn insert(&self, profile: UserProfile) {
        self.inner.lock().expect("Mutex poisoned").insert(profile.id.clone(), profile);
    }
}

impl UserDirectory for MemoryDirectory {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. Acceptable for dev/test
    /// storage.
    #[allow(clippy::expect_used)]
    async fn get(&self, user_id: &UserId) -> Result<UserProfile, DirectoryError> {
        let users = self.inner.lock().expect("Mutex poisoned");
        users.get(user_id).cloned().ok_or_else(|| DirectoryError::NotFound(user_id.clone()))
    }
}
