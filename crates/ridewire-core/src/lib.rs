//! Ridewire dispatch engine core.
//!
//! Pure engine logic with no I/O of its own: the ride lifecycle state
//! machine, the [`RideStore`] and [`UserDirectory`] collaborator contracts,
//! and the [`Environment`] abstraction that decouples the engine from
//! system time and randomness.
//!
//! The central correctness property lives here: every lifecycle transition
//! is a single atomic conditional update against the ride store, so two
//! drivers racing to accept the same ride can never both observe
//! `Requested`. A plain read-then-write is not an implementation option of
//! this API.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod directory;
pub mod env;
mod lifecycle;
mod session;
pub mod store;

pub use directory::{DirectoryError, MemoryDirectory, UserDirectory, UserProfile, VehicleInfo};
pub use env::Environment;
pub use lifecycle::{LifecycleError, RideLifecycle};
pub use session::Transition;
pub use store::{
    ChaoticRideStore, MemoryRideStore, RetryPolicy, RideStore, RideUpdate, StoreError,
};
