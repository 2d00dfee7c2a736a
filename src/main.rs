mod display;
mod error_mapping;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use healthmate_core::{AppError, CacheError, Config};
use healthmate_hospitals::{
    ConnectivityMonitor, FileStore, FixedPosition, HospitalError, HospitalsSnapshot, HttpProbe,
    IpLocator, LocationCacheManager, LocationError, ManagerSettings, OverpassClient, Position,
    PositionSource, RetryConfig,
};

use crate::display::{format_distance, format_time_ago};
use crate::error_mapping::app_error;

#[derive(Debug, Parser)]
#[command(name = "healthmate")]
#[command(about = "Nearby hospitals, kept available offline")]
struct Cli {
    /// Refresh once, print the list and exit
    #[arg(long)]
    once: bool,

    /// Print snapshots as JSON
    #[arg(long)]
    json: bool,

    /// Latitude to search around instead of looking the position up
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    lat: Option<f64>,

    /// Longitude to search around instead of looking the position up
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    lon: Option<f64>,
}

/// Position source picked at startup
enum DevicePosition {
    Fixed(FixedPosition),
    Ip(IpLocator),
}

impl PositionSource for DevicePosition {
    async fn current_position(&self) -> Result<Position, LocationError> {
        match self {
            DevicePosition::Fixed(source) => source.current_position().await,
            DevicePosition::Ip(source) => source.current_position().await,
        }
    }
}

type Manager = LocationCacheManager<DevicePosition, HttpProbe, FileStore>;

fn manager_settings(config: &Config) -> ManagerSettings {
    let hospitals = &config.hospitals;
    ManagerSettings {
        refresh_interval: Duration::from_secs(u64::from(hospitals.refresh_minutes) * 60),
        max_cache_age: Duration::from_secs(u64::from(hospitals.max_cache_age_minutes) * 60),
        relocation_threshold_meters: hospitals.relocation_threshold_meters,
        position_timeout: Duration::from_secs(config.location.timeout_secs),
        probe_timeout: Duration::from_secs(config.connectivity.probe_timeout_secs),
        cache_expiry_days: hospitals.cache_expiry_days,
    }
}

fn position_source(config: &Config, cli: &Cli) -> Result<DevicePosition, AppError> {
    let fixed = match (cli.lat, cli.lon) {
        (Some(lat), Some(lon)) => Some(Position::new(lat, lon)),
        _ => config
            .location
            .fixed
            .map(|f| Position::new(f.latitude, f.longitude)),
    };

    if let Some(position) = fixed {
        tracing::info!(
            "Using fixed position {}, {}",
            position.latitude,
            position.longitude
        );
        return Ok(DevicePosition::Fixed(FixedPosition(position)));
    }

    let locator = IpLocator::new(
        config.location.ip_lookup_url.as_str(),
        Duration::from_secs(config.location.timeout_secs),
    )
    .map_err(|e| app_error(HospitalError::from(e)))?;
    Ok(DevicePosition::Ip(locator))
}

fn build_manager(config: &Config, cli: &Cli) -> Result<Manager, AppError> {
    let hospitals = &config.hospitals;

    let provider = OverpassClient::new(hospitals.overpass_url.as_str())
        .map_err(app_error)?
        .with_search(hospitals.search_radius_meters, hospitals.max_results)
        .with_retry(RetryConfig {
            max_retries: hospitals.fetch_retries,
            ..RetryConfig::default()
        });

    let probe = HttpProbe::new(
        config.connectivity.probe_url.as_str(),
        Duration::from_secs(config.connectivity.probe_timeout_secs),
    )
    .map_err(|e| app_error(HospitalError::from(e)))?;

    let store = FileStore::new(config.cache_dir.clone())
        .map_err(|e| AppError::Cache(CacheError::WriteFailed(format!("{:#}", e))))?;
    tracing::debug!("Hospital cache directory: {}", store.dir().display());

    Ok(LocationCacheManager::new(
        position_source(config, cli)?,
        probe,
        provider,
        store,
        manager_settings(config),
    ))
}

fn print_snapshot(snapshot: &HospitalsSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    let last_updated = snapshot
        .last_updated
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc));

    println!("\nNearby Hospitals");
    println!("Last updated {}", format_time_ago(last_updated, Utc::now()));

    if snapshot.is_offline {
        println!("Offline Mode: showing cached hospital information. Some data might be outdated.");
    }
    if let Some(error) = &snapshot.error {
        println!("Error: {}", error);
    }

    if snapshot.hospitals.is_empty() {
        println!("No hospitals found nearby.");
        return Ok(());
    }

    for (i, hospital) in snapshot.hospitals.iter().enumerate() {
        println!(
            "{:>2}. {} (~{} away)",
            i + 1,
            hospital.name,
            format_distance(hospital.distance_meters)
        );
        if let Some(address) = &hospital.address {
            println!("    {}", address);
        }
    }
    Ok(())
}

async fn run_once(manager: &Manager, json: bool) -> Result<()> {
    manager.probe_connectivity().await;
    if manager.refresh().await.is_none() {
        anyhow::bail!("A refresh is already running");
    }
    print_snapshot(&manager.snapshot(), json)
}

async fn run_watch(manager: &Manager, json: bool) -> Result<()> {
    let monitor = ConnectivityMonitor::new();
    let mut rx = manager.subscribe();
    manager.init(&monitor).await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                if !snapshot.is_loading {
                    print_snapshot(&snapshot, json)?;
                }
            }
        }
    }

    manager.dispose().await;
    Ok(())
}

fn startup(cli: &Cli) -> Result<Manager, AppError> {
    let (config, _) = Config::load_validated()?;
    build_manager(&config, cli)
}

/// Log the full error and return the line shown to the user.
fn report(e: &AppError) -> String {
    tracing::error!("Startup failed: {}", e);
    format!("healthmate: {}", e.user_message())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    healthmate_core::init()?;

    let cli = Cli::parse();
    let manager = match startup(&cli) {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!("{}", report(&e));
            return Ok(ExitCode::FAILURE);
        }
    };

    tracing::info!("HealthMate hospitals started");

    if cli.once {
        run_once(&manager, cli.json).await?;
    } else {
        run_watch(&manager, cli.json).await?;
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from(["healthmate", "--once", "--lat", "40.0", "--lon", "-75.0"])
            .unwrap();
        assert!(cli.once);
        assert_eq!(cli.lon, Some(-75.0));
    }

    #[test]
    fn test_cli_requires_both_coordinates() {
        assert!(Cli::try_parse_from(["healthmate", "--lat", "40.0"]).is_err());
    }

    #[test]
    fn test_settings_follow_config() {
        let mut config = Config::default();
        config.hospitals.refresh_minutes = 10;
        config.location.timeout_secs = 3;

        let settings = manager_settings(&config);
        assert_eq!(settings.refresh_interval, Duration::from_secs(600));
        assert_eq!(settings.max_cache_age, Duration::from_secs(3600));
        assert_eq!(settings.position_timeout, Duration::from_secs(3));
        assert_eq!(settings.cache_expiry_days, 7);
    }

    #[tokio::test]
    async fn test_cli_position_overrides_config() {
        let cli = Cli::try_parse_from(["healthmate", "--lat", "1.5", "--lon", "2.5"]).unwrap();
        let source = position_source(&Config::default(), &cli).unwrap();
        assert_eq!(
            source.current_position().await.unwrap(),
            Position::new(1.5, 2.5)
        );
    }

    #[test]
    fn test_unusable_cache_dir_reports_cache_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.cache_dir = file.path().join("hospitals");
        let cli = Cli::try_parse_from(["healthmate", "--lat", "1.5", "--lon", "2.5"]).unwrap();

        let err = build_manager(&config, &cli).err().unwrap();
        assert!(matches!(err, AppError::Cache(CacheError::WriteFailed(_))));
        assert_eq!(
            report(&err),
            "healthmate: Hospital results could not be saved for offline use."
        );
    }
}
