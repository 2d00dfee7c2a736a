//! Nearby-hospital cache for HealthMate
//!
//! Finds hospitals around the device through the OpenStreetMap Overpass API
//! and keeps the last result on disk so the list stays available offline.
//! [`LocationCacheManager`] ties position, connectivity, cache and fetch
//! together.

pub mod cache;
pub mod connectivity;
pub mod geo;
pub mod location;
pub mod manager;
pub mod provider;
pub mod retry;
pub mod store;
pub mod types;

pub use cache::{CacheEntry, HospitalCache, HOSPITAL_CACHE_KEY};
pub use connectivity::{
    ConnectivityEvent, ConnectivityMonitor, ConnectivityProbe, ConnectivityState, HttpProbe,
};
pub use geo::{distance_meters, haversine_meters};
pub use location::{FixedPosition, IpLocator, PositionSource};
pub use manager::{
    should_refresh_at, LocationCacheManager, ManagerSettings, FETCH_FAILED_ADVISORY,
    POSITION_ADVISORY,
};
pub use provider::OverpassClient;
pub use retry::RetryConfig;
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use types::*;
