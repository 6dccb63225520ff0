// API models and trip lookups for VVS (Verkehrs- und Tarifverbund Stuttgart)
// VVS Official website: https://www.vvs.de/
//
// VVS API Endpoints:
// - EFA Trip Request (rapidJSON): https://www3.vvs.de/mngvvs/XML_TRIP_REQUEST2
//
// EFA reports every instant in UTC (RFC 3339); everything exposed from this
// module is converted to Stuttgart local time.

use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Europe::Berlin;
use chrono_tz::Tz;
use reqwest::blocking;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Data Structures
// ============================================================================

/// One end of a connection: where it starts or stops, and how late it is.
#[derive(Debug, Clone, PartialEq)]
pub struct StopPoint {
    pub name: String,
    /// Estimated time when realtime data exists, otherwise the planned time.
    pub time: Option<DateTime<Tz>>,
    pub delay_minutes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceAlert {
    pub kind: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub content: Option<String>,
}

/// One leg of a trip (a single train, bus or footpath).
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub duration_secs: i64,
    pub is_realtime_controlled: bool,
    pub origin: StopPoint,
    pub destination: StopPoint,
    pub transportation: String,
    pub path_description: Option<String>,
    pub alerts: Vec<ServiceAlert>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trip {
    pub duration_secs: i64,
    pub connections: Vec<Connection>,
}

/// Outcome of one trip query. `NotFound` is a normal answer (no schedule
/// for that instant), not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum TripLookup {
    Found(Trip),
    NotFound(String),
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, Error)]
pub enum VvsError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, VvsError>;

// ============================================================================
// Trip Source
// ============================================================================

pub trait TripSource: Send + Sync {
    /// Looks up the first trip from `origin` to `destination` departing at
    /// or after `at` (Stuttgart wall-clock time).
    fn query(&self, origin: &str, destination: &str, at: NaiveDateTime) -> Result<TripLookup>;
}

pub struct VvsClient {
    client: blocking::Client,
    trip_url: String,
}

impl VvsClient {
    pub fn new(trip_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VvsError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(VvsClient {
            client,
            trip_url: trip_url.into(),
        })
    }

    fn trip_params(origin: &str, destination: &str, at: NaiveDateTime) -> Vec<(&'static str, String)> {
        let fixed = [
            ("SpEncId", "0"),
            ("calcOneDirection", "1"),
            ("changeSpeed", "normal"),
            ("computationType", "sequence"),
            ("coordOutputFormat", "EPSG:4326"),
            ("deleteAssignedStops", "0"),
            ("descWithElev", "1"),
            ("illumTransfer", "on"),
            ("itOptionsActive", "1"),
            ("itdTripDateTimeDepArr", "dep"),
            ("language", "de"),
            ("locationServerActive", "1"),
            ("macroWebTrip", "true"),
            ("noElevationProfile", "1"),
            ("noElevationSummary", "1"),
            ("outputFormat", "rapidJSON"),
            ("outputOptionsActive", "1"),
            ("pathDescription", "1"),
            ("ptOptionsActive", "1"),
            ("routeType", "leasttime"),
            ("searchLimitMinutes", "360"),
            ("serverInfo", "1"),
            ("showInterchanges", "1"),
            ("trITArrMOT", "100"),
            ("trITArrMOTvalue", "15"),
            ("trITDepMOT", "100"),
            ("trITDepMOTvalue", "15"),
            ("tryToFindLocalityStops", "1"),
            ("type_destination", "any"),
            ("type_origin", "any"),
            ("useLocalityMainStop", "0"),
            ("useRealtime", "1"),
            ("useUT", "1"),
        ];

        let mut params: Vec<(&'static str, String)> =
            fixed.iter().map(|(k, v)| (*k, v.to_string())).collect();
        params.push(("name_origin", origin.to_string()));
        params.push(("name_destination", destination.to_string()));
        params.push(("itdDate", at.format("%Y%m%d").to_string()));
        params.push(("itdTime", at.format("%H%M").to_string()));
        params
    }
}

impl TripSource for VvsClient {
    fn query(&self, origin: &str, destination: &str, at: NaiveDateTime) -> Result<TripLookup> {
        let params = Self::trip_params(origin, destination, at);

        let response = self.client.get(&self.trip_url)
            .query(&params)
            .send()
            .map_err(|e| VvsError::NetworkError(format!("Failed to fetch trips: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VvsError::NetworkError(format!(
                "Trip request for {} returned HTTP {}",
                at.format("%H:%M"),
                status
            )));
        }

        let body = response.text()
            .map_err(|e| VvsError::NetworkError(format!("Failed to read trip response: {}", e)))?;

        parse_trip_response(&body)
    }
}

// ============================================================================
// EFA rapidJSON wire model
// ============================================================================

#[derive(Debug, Deserialize)]
struct EfaTripResponse {
    journeys: Option<Vec<EfaJourney>>,
}

#[derive(Debug, Deserialize)]
struct EfaJourney {
    #[serde(default)]
    legs: Vec<EfaLeg>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EfaLeg {
    duration: Option<i64>,
    #[serde(default)]
    is_realtime_controlled: bool,
    origin: EfaStop,
    destination: EfaStop,
    transportation: Option<EfaTransportation>,
    #[serde(default)]
    infos: Vec<EfaInfo>,
    #[serde(default)]
    path_descriptions: Vec<EfaPathDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EfaStop {
    name: Option<String>,
    disassembled_name: Option<String>,
    departure_time_planned: Option<String>,
    departure_time_estimated: Option<String>,
    arrival_time_planned: Option<String>,
    arrival_time_estimated: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EfaTransportation {
    name: Option<String>,
    disassembled_name: Option<String>,
    number: Option<String>,
    product: Option<EfaProduct>,
}

#[derive(Debug, Deserialize)]
struct EfaProduct {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EfaInfo {
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    subtitle: Option<String>,
    content: Option<String>,
    #[serde(default)]
    info_links: Vec<EfaInfoLink>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EfaInfoLink {
    title: Option<String>,
    subtitle: Option<String>,
    content: Option<String>,
    url_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EfaPathDescription {
    name: Option<String>,
}

// ============================================================================
// Conversion
// ============================================================================

/// Parses an EFA rapidJSON trip response into a lookup result. Only the
/// first journey is kept.
pub fn parse_trip_response(body: &str) -> Result<TripLookup> {
    let response: EfaTripResponse = serde_json::from_str(body)
        .map_err(|e| VvsError::ParseError(format!("Failed to decode trip response: {}", e)))?;

    let Some(journey) = response.journeys.and_then(|j| j.into_iter().next()) else {
        return Ok(TripLookup::NotFound("no journeys returned".to_string()));
    };

    if journey.legs.is_empty() {
        return Ok(TripLookup::NotFound("journey has no legs".to_string()));
    }

    let connections: Vec<Connection> = journey.legs.into_iter().map(convert_leg).collect();
    let duration_secs = trip_duration_secs(&connections);

    Ok(TripLookup::Found(Trip {
        duration_secs,
        connections,
    }))
}

fn trip_duration_secs(connections: &[Connection]) -> i64 {
    let departure = connections.first().and_then(|c| c.origin.time);
    let arrival = connections.last().and_then(|c| c.destination.time);

    match (departure, arrival) {
        (Some(dep), Some(arr)) if arr >= dep => (arr - dep).num_seconds(),
        _ => connections.iter().map(|c| c.duration_secs).sum(),
    }
}

fn convert_leg(leg: EfaLeg) -> Connection {
    let origin = stop_point(
        leg.origin.name.clone().or(leg.origin.disassembled_name.clone()),
        leg.origin.departure_time_planned.as_deref(),
        leg.origin.departure_time_estimated.as_deref(),
    );
    let destination = stop_point(
        leg.destination.name.clone().or(leg.destination.disassembled_name.clone()),
        leg.destination.arrival_time_planned.as_deref(),
        leg.destination.arrival_time_estimated.as_deref(),
    );

    let path_names: Vec<String> = leg.path_descriptions
        .into_iter()
        .filter_map(|p| p.name)
        .filter(|n| !n.trim().is_empty())
        .collect();
    let path_description = if path_names.is_empty() {
        None
    } else {
        Some(path_names.join(" -> "))
    };

    Connection {
        duration_secs: leg.duration.unwrap_or(0),
        is_realtime_controlled: leg.is_realtime_controlled,
        origin,
        destination,
        transportation: transportation_label(leg.transportation.as_ref()),
        path_description,
        alerts: leg.infos.into_iter().flat_map(alerts_from_info).collect(),
    }
}

fn stop_point(name: Option<String>, planned: Option<&str>, estimated: Option<&str>) -> StopPoint {
    let planned = planned.and_then(parse_local_time);
    let estimated = estimated.and_then(parse_local_time);

    let delay_minutes = match (planned, estimated) {
        (Some(p), Some(e)) => Some((e - p).num_minutes()),
        _ => None,
    };

    StopPoint {
        name: name.unwrap_or_else(|| "Unknown".to_string()),
        time: estimated.or(planned),
        delay_minutes,
    }
}

fn parse_local_time(value: &str) -> Option<DateTime<Tz>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Berlin))
}

fn transportation_label(transportation: Option<&EfaTransportation>) -> String {
    let Some(t) = transportation else {
        return "Unknown".to_string();
    };

    [
        t.disassembled_name.as_ref(),
        t.number.as_ref(),
        t.name.as_ref(),
        t.product.as_ref().and_then(|p| p.name.as_ref()),
    ]
    .into_iter()
    .flatten()
    .find(|s| !s.trim().is_empty())
    .cloned()
    .unwrap_or_else(|| "Unknown".to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn alerts_from_info(info: EfaInfo) -> Vec<ServiceAlert> {
    if info.info_links.is_empty() {
        return vec![ServiceAlert {
            kind: non_empty(info.kind),
            title: non_empty(info.title),
            subtitle: non_empty(info.subtitle),
            content: non_empty(info.content),
        }];
    }

    let kind = non_empty(info.kind);
    info.info_links
        .into_iter()
        .map(|link| ServiceAlert {
            kind: kind.clone(),
            title: non_empty(link.title).or_else(|| non_empty(link.url_text.clone())),
            subtitle: non_empty(link.subtitle),
            content: non_empty(link.content),
        })
        .collect()
}
