//! The location/hospital cache manager.
//!
//! Each refresh runs `AcquiringPosition -> DecidingRefresh -> Fetching |
//! ServingCache`. Offline refreshes go straight to `ServingCache` without any
//! network attempt, and every failure degrades to the best cached data (or an
//! empty list) plus an advisory string. There is no terminal error state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheEntry, HospitalCache, DEFAULT_EXPIRY_DAYS};
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor, ConnectivityProbe, ConnectivityState};
use crate::geo::distance_meters;
use crate::location::PositionSource;
use crate::provider::OverpassClient;
use crate::store::KeyValueStore;
use crate::types::{
    to_iso, DataSource, HospitalError, HospitalRecord, HospitalsSnapshot, LocationError, Position,
    RefreshOutcome,
};

pub const FETCH_FAILED_ADVISORY: &str = "Failed to fetch hospitals. Showing cached data.";
pub const POSITION_ADVISORY: &str =
    "Unable to retrieve your location. Please enable location services.";

/// Timing and distance policy for a manager
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerSettings {
    /// Background refresh period; zero disables the periodic task
    pub refresh_interval: Duration,
    /// Cached results younger than this are reused
    pub max_cache_age: Duration,
    /// Moving further than this from the cached origin forces a fetch
    pub relocation_threshold_meters: f64,
    pub position_timeout: Duration,
    pub probe_timeout: Duration,
    pub cache_expiry_days: u32,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5 * 60),
            max_cache_age: Duration::from_secs(60 * 60),
            relocation_threshold_meters: 10_000.0,
            position_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            cache_expiry_days: DEFAULT_EXPIRY_DAYS,
        }
    }
}

/// Decide whether a fetch is worth making for `position`.
///
/// Offline never fetches. Otherwise a fetch happens when there is no cache,
/// when the cache is older than `max_cache_age`, or when `position` is more
/// than `relocation_threshold_meters` from where the cache was fetched.
pub fn should_refresh_at(
    is_offline: bool,
    cached: Option<&CacheEntry>,
    position: &Position,
    now: DateTime<Utc>,
    settings: &ManagerSettings,
) -> bool {
    if is_offline {
        return false;
    }

    let Some(entry) = cached else {
        return true;
    };

    // A negative age (clock moved backwards) counts as fresh
    let too_old = entry
        .age(now)
        .to_std()
        .is_ok_and(|age| age > settings.max_cache_age);
    if too_old {
        return true;
    }

    distance_meters(position, &entry.origin_location) > settings.relocation_threshold_meters
}

fn outcome_from_cache(entry: Option<CacheEntry>, advisory: Option<String>) -> RefreshOutcome {
    match entry {
        Some(entry) => RefreshOutcome {
            hospitals: entry.hospitals,
            last_updated: Some(entry.last_updated),
            source: DataSource::Cached,
            advisory,
        },
        None => RefreshOutcome::empty(advisory),
    }
}

struct Shared<P, C, S> {
    position_source: P,
    probe: C,
    provider: OverpassClient,
    cache: HospitalCache<S>,
    settings: ManagerSettings,
    is_offline: AtomicBool,
    busy: AtomicBool,
    last_position: Mutex<Option<Position>>,
    snapshot: watch::Sender<HospitalsSnapshot>,
}

/// Clears the busy flag and loading state even if the refresh is dropped.
struct RefreshGuard<'a> {
    busy: &'a AtomicBool,
    snapshot: &'a watch::Sender<HospitalsSnapshot>,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.snapshot
            .send_if_modified(|s| std::mem::replace(&mut s.is_loading, false));
        self.busy.store(false, Ordering::Release);
    }
}

impl<P, C, S> Shared<P, C, S>
where
    P: PositionSource,
    C: ConnectivityProbe,
    S: KeyValueStore + 'static,
{
    fn is_offline(&self) -> bool {
        self.is_offline.load(Ordering::Acquire)
    }

    /// Returns the previous value.
    fn set_offline(&self, offline: bool) -> bool {
        let previous = self.is_offline.swap(offline, Ordering::AcqRel);
        if previous != offline {
            tracing::info!(
                "Online status: {}",
                if offline { "offline" } else { "online" }
            );
        }
        self.snapshot.send_if_modified(|s| {
            let changed = s.is_offline != offline;
            s.is_offline = offline;
            changed
        });
        previous
    }

    async fn get_current_position(&self) -> Result<Position, HospitalError> {
        let position = tokio::time::timeout(
            self.settings.position_timeout,
            self.position_source.current_position(),
        )
        .await
        .map_err(|_| LocationError::Timeout)??;

        *self.last_position.lock() = Some(position);
        Ok(position)
    }

    async fn probe_connectivity(&self) -> ConnectivityState {
        let reachable = tokio::time::timeout(self.settings.probe_timeout, self.probe.is_reachable())
            .await
            .unwrap_or(false);

        if reachable {
            tracing::debug!("Network connectivity confirmed");
        } else {
            tracing::debug!("No network connectivity");
        }

        let state = ConnectivityState::from_reachable(reachable);
        self.set_offline(state.is_offline);
        state
    }

    async fn fetch_nearby(&self, position: &Position) -> RefreshOutcome {
        tracing::info!("Fetching hospitals from Overpass API...");

        match self.provider.nearby_hospitals(position).await {
            Ok(hospitals) => self.store_fetched(hospitals, *position),
            Err(e) => {
                tracing::warn!("Hospital fetch failed, falling back to cache: {}", e);
                outcome_from_cache(self.cache.load(), Some(FETCH_FAILED_ADVISORY.to_string()))
            }
        }
    }

    fn store_fetched(&self, hospitals: Vec<HospitalRecord>, origin: Position) -> RefreshOutcome {
        let last_updated = match self.cache.save(hospitals.clone(), origin) {
            Ok(entry) => entry.last_updated,
            Err(e) => {
                tracing::warn!("Failed to cache hospitals: {}", e);
                Utc::now()
            }
        };

        RefreshOutcome {
            hospitals,
            last_updated: Some(last_updated),
            source: DataSource::Fetched,
            advisory: None,
        }
    }

    async fn refresh(&self) -> Option<RefreshOutcome> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Refresh already in progress, skipping");
            return None;
        }
        let _guard = RefreshGuard {
            busy: &self.busy,
            snapshot: &self.snapshot,
        };

        let outcome = self.run_refresh().await;
        self.publish(&outcome);
        Some(outcome)
    }

    async fn run_refresh(&self) -> RefreshOutcome {
        if self.is_offline() {
            tracing::debug!("Offline, serving cached hospitals");
            return outcome_from_cache(self.cache.load(), None);
        }

        self.snapshot.send_if_modified(|s| {
            let changed = !s.is_loading || s.error.is_some();
            s.is_loading = true;
            s.error = None;
            changed
        });

        let position = match self.get_current_position().await {
            Ok(position) => position,
            Err(e) => {
                tracing::warn!("Error acquiring location: {}", e);
                return outcome_from_cache(self.cache.load(), Some(POSITION_ADVISORY.to_string()));
            }
        };

        let cached = self.cache.load();
        if should_refresh_at(
            self.is_offline(),
            cached.as_ref(),
            &position,
            Utc::now(),
            &self.settings,
        ) {
            self.fetch_nearby(&position).await
        } else {
            tracing::debug!("Using cached hospital data for nearby location");
            outcome_from_cache(cached, None)
        }
    }

    fn publish(&self, outcome: &RefreshOutcome) {
        let offline = self.is_offline();
        self.snapshot.send_if_modified(|s| {
            let next = HospitalsSnapshot {
                hospitals: outcome.hospitals.clone(),
                last_updated: outcome.last_updated.map(to_iso),
                is_loading: s.is_loading,
                error: outcome.advisory.clone(),
                is_offline: offline,
            };
            if *s == next {
                return false;
            }
            *s = next;
            true
        });
    }
}

/// Keeps the freshest feasible list of nearby hospitals, usable offline.
///
/// Call [`init`](Self::init) to start the connectivity listener and the
/// periodic refresh task, and [`dispose`](Self::dispose) to stop them. A
/// disposed manager stays stopped.
pub struct LocationCacheManager<P, C, S> {
    shared: Arc<Shared<P, C, S>>,
    cancel: CancellationToken,
    tasks: TaskList,
}

/// Background tasks joined by `dispose`
type TaskList = Arc<Mutex<Vec<JoinHandle<()>>>>;

impl<P, C, S> LocationCacheManager<P, C, S>
where
    P: PositionSource,
    C: ConnectivityProbe,
    S: KeyValueStore + 'static,
{
    pub fn new(
        position_source: P,
        probe: C,
        provider: OverpassClient,
        store: S,
        settings: ManagerSettings,
    ) -> Self {
        let cache = HospitalCache::with_expiry(store, settings.cache_expiry_days);
        let (snapshot, _) = watch::channel(HospitalsSnapshot::default());

        Self {
            shared: Arc::new(Shared {
                position_source,
                probe,
                provider,
                cache,
                settings,
                is_offline: AtomicBool::new(false),
                busy: AtomicBool::new(false),
                last_position: Mutex::new(None),
                snapshot,
            }),
            cancel: CancellationToken::new(),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Start listening to `monitor` and refreshing in the background.
    ///
    /// Shows whatever is cached right away, probes connectivity, then runs
    /// the first refresh and repeats it every `refresh_interval`.
    pub async fn init(&self, monitor: &ConnectivityMonitor) {
        if !self.tasks.lock().is_empty() || self.cancel.is_cancelled() {
            tracing::warn!("Location cache manager already initialized");
            return;
        }

        let events = monitor.subscribe();

        let cached = self.shared.cache.load();
        self.shared.publish(&outcome_from_cache(cached, None));

        self.shared.probe_connectivity().await;

        let listener = tokio::spawn(listen_for_connectivity(
            self.shared.clone(),
            events,
            self.cancel.clone(),
            self.tasks.clone(),
        ));
        let scheduler = tokio::spawn(run_schedule(self.shared.clone(), self.cancel.clone()));

        self.tasks.lock().extend([listener, scheduler]);
        tracing::info!("Location cache manager initialized");
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn dispose(&self) {
        self.cancel.cancel();

        // The listener may still register a refresh while it winds down
        loop {
            let handles = std::mem::take(&mut *self.tasks.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!("Background task ended abnormally: {}", e);
                }
            }
        }
        tracing::info!("Location cache manager disposed");
    }

    /// Current position, bounded by `position_timeout`.
    pub async fn get_current_position(&self) -> Result<Position, HospitalError> {
        self.shared.get_current_position().await
    }

    /// Position from the most recent successful fix, if any.
    pub fn last_position(&self) -> Option<Position> {
        *self.shared.last_position.lock()
    }

    pub async fn probe_connectivity(&self) -> ConnectivityState {
        self.shared.probe_connectivity().await
    }

    pub fn load_cache(&self) -> Option<CacheEntry> {
        self.shared.cache.load()
    }

    pub fn save_cache(
        &self,
        hospitals: Vec<HospitalRecord>,
        origin: Position,
    ) -> Result<CacheEntry, HospitalError> {
        self.shared.cache.save(hospitals, origin)
    }

    pub fn should_refresh(&self, position: &Position) -> bool {
        let cached = self.shared.cache.load();
        should_refresh_at(
            self.is_offline(),
            cached.as_ref(),
            position,
            Utc::now(),
            &self.shared.settings,
        )
    }

    /// Query the map service around `position`, caching the result.
    ///
    /// Failures fall back to the cache with [`FETCH_FAILED_ADVISORY`].
    pub async fn fetch_nearby(&self, position: &Position) -> RefreshOutcome {
        self.shared.fetch_nearby(position).await
    }

    /// Run one refresh cycle.
    ///
    /// Returns `None` when another refresh is already running.
    pub async fn refresh(&self) -> Option<RefreshOutcome> {
        self.shared.refresh().await
    }

    pub fn is_offline(&self) -> bool {
        self.shared.is_offline()
    }

    pub fn snapshot(&self) -> HospitalsSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Receive every change to the snapshot.
    pub fn subscribe(&self) -> watch::Receiver<HospitalsSnapshot> {
        self.shared.snapshot.subscribe()
    }
}

impl<P, C, S> Drop for LocationCacheManager<P, C, S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn listen_for_connectivity<P, C, S>(
    shared: Arc<Shared<P, C, S>>,
    mut events: broadcast::Receiver<ConnectivityEvent>,
    cancel: CancellationToken,
    tasks: TaskList,
) where
    P: PositionSource,
    C: ConnectivityProbe,
    S: KeyValueStore + 'static,
{
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(ConnectivityEvent::Offline) => {
                shared.set_offline(true);
            }
            Ok(ConnectivityEvent::Online) => {
                let was_offline = shared.set_offline(false);
                if was_offline {
                    let shared = shared.clone();
                    let cancel = cancel.clone();
                    let handle = tokio::spawn(async move {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = shared.refresh() => {}
                        }
                    });

                    let mut tasks = tasks.lock();
                    tasks.retain(|task| !task.is_finished());
                    tasks.push(handle);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Skipped {} stale connectivity events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn run_schedule<P, C, S>(shared: Arc<Shared<P, C, S>>, cancel: CancellationToken)
where
    P: PositionSource,
    C: ConnectivityProbe,
    S: KeyValueStore + 'static,
{
    let period = shared.settings.refresh_interval;
    if period.is_zero() {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = shared.refresh() => {}
        }
        return;
    }

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // While offline, only the probe runs; it flips the flag back once the
        // network answers again
        if shared.is_offline() && shared.probe_connectivity().await.is_offline {
            continue;
        }

        tracing::debug!("Performing periodic location check...");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shared.refresh() => {}
        }
    }
}
