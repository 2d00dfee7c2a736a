//! Maps hospital subsystem errors into the application error taxonomy.

use healthmate_core::{AppError, CacheError, LocationError, NetworkError};
use healthmate_hospitals::{HospitalError, LocationError as PositionError};

pub fn app_error(e: HospitalError) -> AppError {
    match e {
        HospitalError::PositionUnavailable(e) => AppError::Location(match e {
            PositionError::PermissionDenied => LocationError::PermissionDenied,
            PositionError::Timeout => LocationError::Timeout,
            PositionError::ServiceUnavailable => {
                LocationError::Unavailable("location service unavailable".to_string())
            }
            PositionError::Other(reason) => LocationError::Unavailable(reason),
        }),
        HospitalError::NetworkUnreachable(e) if e.is_timeout() => {
            AppError::Network(NetworkError::Timeout)
        }
        HospitalError::NetworkUnreachable(e) if e.is_decode() => {
            AppError::Network(NetworkError::InvalidResponse(e.to_string()))
        }
        HospitalError::NetworkUnreachable(e) => {
            AppError::Network(NetworkError::ConnectionFailed(e.to_string()))
        }
        HospitalError::Status(status) => AppError::Network(NetworkError::ServerError {
            status,
            message: reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown status")
                .to_string(),
        }),
        HospitalError::Parse(msg) => AppError::Network(NetworkError::InvalidResponse(msg)),
        HospitalError::CacheCorrupt(msg) => AppError::Cache(CacheError::Corrupt(msg)),
        HospitalError::CacheExpired => AppError::Cache(CacheError::Expired),
        HospitalError::CacheWrite(msg) => AppError::Cache(CacheError::WriteFailed(msg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_errors_map_to_location() {
        let err = app_error(HospitalError::PositionUnavailable(
            PositionError::PermissionDenied,
        ));
        assert!(matches!(
            err,
            AppError::Location(LocationError::PermissionDenied)
        ));

        let err = app_error(HospitalError::PositionUnavailable(PositionError::Timeout));
        assert_eq!(
            err.user_message(),
            "Unable to retrieve your location. Please enable location services."
        );
    }

    #[test]
    fn test_status_keeps_code_and_reason() {
        let err = app_error(HospitalError::Status(504));
        assert!(matches!(
            &err,
            AppError::Network(NetworkError::ServerError { status: 504, message })
                if message == "Gateway Timeout"
        ));
        assert_eq!(
            err.user_message(),
            "The map service is experiencing issues. Please try again later."
        );
    }

    #[test]
    fn test_cache_errors_map_to_cache() {
        assert!(matches!(
            app_error(HospitalError::CacheCorrupt("bad json".into())),
            AppError::Cache(CacheError::Corrupt(_))
        ));
        assert!(matches!(
            app_error(HospitalError::CacheWrite("disk full".into())),
            AppError::Cache(CacheError::WriteFailed(_))
        ));
        assert!(matches!(
            app_error(HospitalError::CacheExpired),
            AppError::Cache(CacheError::Expired)
        ));
    }

    #[test]
    fn test_parse_error_is_invalid_response() {
        assert!(matches!(
            app_error(HospitalError::Parse("expected value".into())),
            AppError::Network(NetworkError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_connection_failed() {
        let e = reqwest::get("http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(
            app_error(HospitalError::NetworkUnreachable(e)),
            AppError::Network(NetworkError::ConnectionFailed(_))
        ));
    }
}
