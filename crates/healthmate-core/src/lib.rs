pub mod config;
pub mod error;

pub use config::{
    Config, ConnectivityConfig, FixedLocation, HospitalsConfig, LocationConfig, ValidationResult,
};
pub use error::{AppError, CacheError, ConfigError, LocationError, NetworkError};

use anyhow::Result;

/// Initialize logging for the application.
///
/// Honors `RUST_LOG`, defaulting to `info`. Safe to call more than once.
pub fn init() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    tracing::info!("HealthMate core initialized");
    Ok(())
}
