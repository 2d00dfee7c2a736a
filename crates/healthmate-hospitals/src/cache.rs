//! Persistent cache of the most recent nearby-hospitals result.
//!
//! A single record lives under [`HOSPITAL_CACHE_KEY`]. It is replaced
//! wholesale on every successful fetch and purged once older than its expiry
//! policy. Unreadable records are treated as a cache miss.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::store::KeyValueStore;
use crate::types::{HospitalError, HospitalRecord, Position};

pub const HOSPITAL_CACHE_KEY: &str = "cachedHospitals";
pub const DEFAULT_EXPIRY_DAYS: u32 = 7;

fn default_expiry_days() -> u32 {
    DEFAULT_EXPIRY_DAYS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Ascending by distance from `origin_location`
    pub hospitals: Vec<HospitalRecord>,
    pub origin_location: Position,
    pub fetched_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default = "default_expiry_days")]
    pub expires_policy_days: u32,
}

impl CacheEntry {
    pub fn new(hospitals: Vec<HospitalRecord>, origin_location: Position, now: DateTime<Utc>) -> Self {
        Self {
            hospitals,
            origin_location,
            fetched_at: now,
            last_updated: now,
            expires_policy_days: DEFAULT_EXPIRY_DAYS,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.age(now) > Duration::days(i64::from(self.expires_policy_days))
    }
}

pub struct HospitalCache<S> {
    store: S,
    expiry_days: u32,
    // Serializes read-check-delete and write so each is a whole-record operation
    lock: Mutex<()>,
}

impl<S: KeyValueStore> HospitalCache<S> {
    pub fn new(store: S) -> Self {
        Self::with_expiry(store, DEFAULT_EXPIRY_DAYS)
    }

    pub fn with_expiry(store: S, expiry_days: u32) -> Self {
        Self {
            store,
            expiry_days,
            lock: Mutex::new(()),
        }
    }

    /// Load the cached entry, or `None` if absent, unreadable or expired.
    pub fn load(&self) -> Option<CacheEntry> {
        self.load_at(Utc::now())
    }

    pub fn load_at(&self, now: DateTime<Utc>) -> Option<CacheEntry> {
        match self.try_load_at(now) {
            Ok(entry) => entry,
            Err(e @ HospitalError::CacheExpired) => {
                tracing::debug!("{}", e);
                None
            }
            Err(e) => {
                tracing::warn!("Ignoring hospital cache: {}", e);
                None
            }
        }
    }

    /// Like [`load_at`](Self::load_at), but says why a stored record was unusable.
    ///
    /// An expired record is purged before `CacheExpired` is returned, so the
    /// next call sees `Ok(None)`.
    pub fn try_load_at(&self, now: DateTime<Utc>) -> Result<Option<CacheEntry>, HospitalError> {
        let _guard = self.lock.lock();

        let Some(entry) = self.read_entry()? else {
            return Ok(None);
        };

        if entry.is_expired(now) {
            tracing::debug!(
                "Hospital cache expired ({} days old), purging",
                entry.age(now).num_days()
            );
            if let Err(e) = self.store.remove(HOSPITAL_CACHE_KEY) {
                tracing::warn!("Failed to purge expired hospital cache: {:#}", e);
            }
            return Err(HospitalError::CacheExpired);
        }

        Ok(Some(entry))
    }

    /// Replace the cached entry with `hospitals` fetched at `origin`.
    pub fn save(
        &self,
        hospitals: Vec<HospitalRecord>,
        origin: Position,
    ) -> Result<CacheEntry, HospitalError> {
        self.save_at(hospitals, origin, Utc::now())
    }

    pub fn save_at(
        &self,
        hospitals: Vec<HospitalRecord>,
        origin: Position,
        now: DateTime<Utc>,
    ) -> Result<CacheEntry, HospitalError> {
        let mut entry = CacheEntry::new(hospitals, origin, now);
        entry.expires_policy_days = self.expiry_days;
        self.put_entry(&entry)?;
        Ok(entry)
    }

    /// Write a complete entry as-is, replacing whatever was stored.
    pub fn put_entry(&self, entry: &CacheEntry) -> Result<(), HospitalError> {
        let json =
            serde_json::to_string(entry).map_err(|e| HospitalError::CacheWrite(e.to_string()))?;

        let _guard = self.lock.lock();
        self.store
            .put(HOSPITAL_CACHE_KEY, &json)
            .map_err(|e| HospitalError::CacheWrite(format!("{:#}", e)))
    }

    fn read_entry(&self) -> Result<Option<CacheEntry>, HospitalError> {
        let raw = self
            .store
            .get(HOSPITAL_CACHE_KEY)
            .map_err(|e| HospitalError::CacheCorrupt(format!("{:#}", e)))?;

        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| HospitalError::CacheCorrupt(e.to_string())),
            None => Ok(None),
        }
    }
}
