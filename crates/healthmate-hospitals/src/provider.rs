//! Nearby-hospital lookup against the OpenStreetMap Overpass API.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::geo::haversine_meters;
use crate::retry::{with_retry, RetryConfig};
use crate::types::{HospitalError, HospitalRecord, Position};

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
pub const DEFAULT_SEARCH_RADIUS_METERS: f64 = 10_000.0;
pub const DEFAULT_MAX_RESULTS: usize = 15;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("HealthMate/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: u64,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Overpass QL for hospitals around a point.
///
/// Ways and relations are requested too, but only nodes carry coordinates
/// that [`parse_hospitals`] uses.
pub fn build_query(position: &Position, radius_meters: f64) -> String {
    let around = format!(
        "(around:{},{},{})",
        radius_meters.round(),
        position.latitude,
        position.longitude
    );
    format!(
        "[out:json][timeout:25];\n(\n  node[\"amenity\"=\"hospital\"]{around};\n  way[\"amenity\"=\"hospital\"]{around};\n  relation[\"amenity\"=\"hospital\"]{around};\n);\nout body;\n>;\nout skel qt;\n"
    )
}

/// Turn a raw Overpass response into the nearest named hospitals.
///
/// Keeps named nodes within `radius_meters` of `origin`, ascending by
/// distance, at most `max_results` of them.
pub fn parse_hospitals(
    body: &str,
    origin: &Position,
    radius_meters: f64,
    max_results: usize,
) -> Result<Vec<HospitalRecord>, HospitalError> {
    let response: OverpassResponse =
        serde_json::from_str(body).map_err(|e| HospitalError::Parse(e.to_string()))?;

    let mut hospitals: Vec<HospitalRecord> = response
        .elements
        .into_iter()
        .filter(|element| element.kind == "node")
        .filter_map(|mut element| {
            let name = element.tags.remove("name")?;
            let (lat, lon) = (element.lat?, element.lon?);
            let distance = haversine_meters(origin.latitude, origin.longitude, lat, lon);
            let address = element
                .tags
                .remove("addr:street")
                .filter(|street| !street.is_empty());

            Some(HospitalRecord {
                id: element.id.to_string(),
                name,
                address,
                lat,
                lon,
                distance_meters: distance,
            })
        })
        .filter(|hospital| hospital.distance_meters <= radius_meters)
        .collect();

    hospitals.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
    hospitals.truncate(max_results);
    Ok(hospitals)
}

#[derive(Debug, Clone)]
pub struct OverpassClient {
    client: Client,
    url: String,
    radius_meters: f64,
    max_results: usize,
    retry: RetryConfig,
}

impl OverpassClient {
    pub fn new(url: impl Into<String>) -> Result<Self, HospitalError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            radius_meters: DEFAULT_SEARCH_RADIUS_METERS,
            max_results: DEFAULT_MAX_RESULTS,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_search(mut self, radius_meters: f64, max_results: usize) -> Self {
        self.radius_meters = radius_meters;
        self.max_results = max_results;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Query hospitals around `position`, nearest first.
    pub async fn nearby_hospitals(
        &self,
        position: &Position,
    ) -> Result<Vec<HospitalRecord>, HospitalError> {
        let query = build_query(position, self.radius_meters);

        let response = with_retry(&self.retry, || {
            self.client
                .post(&self.url)
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .body(query.clone())
                .send()
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HospitalError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let hospitals = parse_hospitals(&body, position, self.radius_meters, self.max_results)?;

        tracing::info!("Found {} hospitals nearby", hospitals.len());
        Ok(hospitals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u64, lat: f64, lon: f64, name: Option<&str>) -> serde_json::Value {
        let mut tags = serde_json::Map::new();
        tags.insert("amenity".into(), "hospital".into());
        if let Some(name) = name {
            tags.insert("name".into(), name.into());
        }
        serde_json::json!({ "type": "node", "id": id, "lat": lat, "lon": lon, "tags": tags })
    }

    fn body(elements: Vec<serde_json::Value>) -> String {
        serde_json::json!({ "version": 0.6, "elements": elements }).to_string()
    }

    #[test]
    fn test_query_mentions_all_geometries() {
        let query = build_query(&Position::new(40.0, -75.0), 10_000.0);
        assert!(query.starts_with("[out:json]"));
        assert!(query.contains("node[\"amenity\"=\"hospital\"](around:10000,40,-75);"));
        assert!(query.contains("way[\"amenity\"=\"hospital\"]"));
        assert!(query.contains("relation[\"amenity\"=\"hospital\"]"));
    }

    #[test]
    fn test_parse_sorts_by_distance() {
        let origin = Position::new(40.0, -75.0);
        let raw = body(vec![
            node(3, 40.05, -75.0, Some("Far")),
            node(1, 40.001, -75.0, Some("Near")),
            node(2, 40.02, -75.0, Some("Middle")),
        ]);

        let hospitals = parse_hospitals(&raw, &origin, 10_000.0, 15).unwrap();
        let names: Vec<_> = hospitals.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Near", "Middle", "Far"]);
        assert_eq!(hospitals[0].id, "1");
        assert!((hospitals[0].distance_meters - 111.19).abs() < 0.1);
    }

    #[test]
    fn test_parse_skips_unnamed_ways_and_far_nodes() {
        let origin = Position::new(40.0, -75.0);
        let raw = body(vec![
            node(1, 40.001, -75.0, None),
            serde_json::json!({
                "type": "way",
                "id": 7,
                "nodes": [1, 2, 3],
                "tags": { "amenity": "hospital", "name": "Campus" }
            }),
            serde_json::json!({
                "type": "relation",
                "id": 8,
                "members": [],
                "tags": { "amenity": "hospital", "name": "Health System" }
            }),
            node(2, 40.2, -75.0, Some("Out of range")),
            node(3, 40.01, -75.0, Some("Kept")),
            serde_json::json!({ "type": "node", "id": 4, "lat": 40.0, "lon": -75.0 }),
        ]);

        let hospitals = parse_hospitals(&raw, &origin, 10_000.0, 15).unwrap();
        assert_eq!(hospitals.len(), 1);
        assert_eq!(hospitals[0].name, "Kept");
    }

    #[test]
    fn test_parse_caps_results() {
        let origin = Position::new(40.0, -75.0);
        let elements = (0..40)
            .map(|i| node(i, 40.0 + f64::from(i as u32) * 0.001, -75.0, Some("H")))
            .collect();

        let hospitals = parse_hospitals(&body(elements), &origin, 10_000.0, 15).unwrap();
        assert_eq!(hospitals.len(), 15);
        assert!(hospitals
            .windows(2)
            .all(|w| w[0].distance_meters <= w[1].distance_meters));
        assert_eq!(hospitals[0].id, "0");
    }

    #[test]
    fn test_parse_reads_street_address() {
        let origin = Position::new(40.0, -75.0);
        let raw = body(vec![serde_json::json!({
            "type": "node",
            "id": 11,
            "lat": 40.001,
            "lon": -75.0,
            "tags": { "amenity": "hospital", "name": "General", "addr:street": "Spruce Street" }
        })]);

        let hospitals = parse_hospitals(&raw, &origin, 10_000.0, 15).unwrap();
        assert_eq!(hospitals[0].address.as_deref(), Some("Spruce Street"));
    }

    #[test]
    fn test_parse_missing_elements_is_empty() {
        let hospitals =
            parse_hospitals("{}", &Position::new(40.0, -75.0), 10_000.0, 15).unwrap();
        assert!(hospitals.is_empty());
    }

    #[test]
    fn test_parse_garbage_is_error() {
        let err = parse_hospitals("<html>busy</html>", &Position::new(40.0, -75.0), 10_000.0, 15)
            .unwrap_err();
        assert!(matches!(err, HospitalError::Parse(_)));
    }
}
