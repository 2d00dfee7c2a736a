//! Device position sources.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::types::{LocationError, Position};

pub const DEFAULT_IP_LOOKUP_URL: &str = "https://ipapi.co/json/";
const USER_AGENT: &str = concat!("HealthMate/", env!("CARGO_PKG_VERSION"));

/// Something that can report where the device currently is.
///
/// Every call must produce a fresh fix; implementations never reuse an
/// earlier reading. The manager bounds each call with its own timeout.
pub trait PositionSource: Send + Sync + 'static {
    fn current_position(&self) -> impl Future<Output = Result<Position, LocationError>> + Send;
}

/// Always reports the same coordinates.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub Position);

impl PositionSource for FixedPosition {
    async fn current_position(&self) -> Result<Position, LocationError> {
        Ok(self.0)
    }
}

/// Coarse position from an IP geolocation service.
#[derive(Debug, Clone)]
pub struct IpLocator {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(default)]
    error: bool,
    reason: Option<String>,
}

impl IpLocator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LocationError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| LocationError::Other(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl PositionSource for IpLocator {
    async fn current_position(&self) -> Result<Position, LocationError> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                LocationError::Timeout
            } else {
                tracing::debug!("IP location request failed: {}", e);
                LocationError::ServiceUnavailable
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED
        {
            return Err(LocationError::PermissionDenied);
        }
        if !status.is_success() {
            tracing::debug!("IP location lookup returned status {}", status);
            return Err(LocationError::ServiceUnavailable);
        }

        let body: IpLookupResponse = response
            .json()
            .await
            .map_err(|e| LocationError::Other(format!("Invalid location response: {}", e)))?;

        if body.error {
            return Err(LocationError::Other(
                body.reason.unwrap_or_else(|| "lookup refused".to_string()),
            ));
        }

        match (body.latitude, body.longitude) {
            (Some(latitude), Some(longitude)) => {
                tracing::debug!("IP location: {}, {}", latitude, longitude);
                Ok(Position::new(latitude, longitude))
            }
            _ => Err(LocationError::ServiceUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn locator(server: &MockServer) -> IpLocator {
        IpLocator::new(format!("{}/json/", server.uri()), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_fixed_position() {
        let source = FixedPosition(Position::new(40.0, -75.0));
        assert_eq!(
            source.current_position().await.unwrap(),
            Position::new(40.0, -75.0)
        );
    }

    #[tokio::test]
    async fn test_ip_locator_parses_coordinates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ip": "203.0.113.7",
                "city": "Philadelphia",
                "latitude": 39.9526,
                "longitude": -75.1652
            })))
            .mount(&server)
            .await;

        let position = locator(&server).current_position().await.unwrap();
        assert_eq!(position, Position::new(39.9526, -75.1652));
    }

    #[tokio::test]
    async fn test_ip_locator_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": true,
                "reason": "RateLimited"
            })))
            .mount(&server)
            .await;

        let err = locator(&server).current_position().await.unwrap_err();
        assert_eq!(err, LocationError::Other("RateLimited".to_string()));
    }

    #[tokio::test]
    async fn test_ip_locator_forbidden_is_permission_denied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = locator(&server).current_position().await.unwrap_err();
        assert_eq!(err, LocationError::PermissionDenied);
    }

    #[tokio::test]
    async fn test_ip_locator_missing_coordinates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ip": "203.0.113.7"
            })))
            .mount(&server)
            .await;

        let err = locator(&server).current_position().await.unwrap_err();
        assert_eq!(err, LocationError::ServiceUnavailable);
    }
}
