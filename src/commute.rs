// Commute data collection: one trip query per departure instant, rendered
// into the plain-text report handed to the language model.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Europe::Berlin;
use chrono_tz::Tz;
use std::fmt::{self, Write};
use thiserror::Error;

use crate::vvs_api_models::{self, Connection, StopPoint, Trip, TripLookup, TripSource};

// ============================================================================
// Route & Departure Window
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub origin: String,
    pub destination: String,
}

impl Route {
    /// Pragfriedhof to Weilimdorf.
    pub fn stuttgart_commute() -> Self {
        Route {
            origin: "de:08111:115".to_string(),
            destination: "de:08111:2270".to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("departure step must be positive")]
    NonPositiveStep,
    #[error("departure step must be a whole number of seconds")]
    FractionalStep,
    #[error("window start {start} is after end {end}")]
    StartAfterEnd { start: NaiveTime, end: NaiveTime },
}

/// Fixed-step sequence of departure times within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepartureWindow {
    start: NaiveTime,
    end: NaiveTime,
    step: Duration,
}

impl DepartureWindow {
    pub fn new(start: NaiveTime, end: NaiveTime, step: Duration) -> Result<Self, WindowError> {
        if step <= Duration::zero() {
            return Err(WindowError::NonPositiveStep);
        }
        if step.subsec_nanos() != 0 {
            return Err(WindowError::FractionalStep);
        }
        if start > end {
            return Err(WindowError::StartAfterEnd { start, end });
        }
        Ok(DepartureWindow { start, end, step })
    }

    /// 07:00 to 08:30, every 5 minutes.
    pub fn morning() -> Result<Self, WindowError> {
        Self::new(
            NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
            NaiveTime::from_hms_opt(8, 30, 0).unwrap_or_default(),
            Duration::minutes(5),
        )
    }

    pub fn departure_count(&self) -> usize {
        let span = (self.end - self.start).num_seconds();
        // step is at least one whole second, see `new`
        (span / self.step.num_seconds().max(1)) as usize + 1
    }

    /// Departure instants on `date`, strictly increasing, end inclusive when
    /// it falls on a step.
    pub fn instants(&self, date: NaiveDate) -> Vec<NaiveDateTime> {
        let first = date.and_time(self.start);
        (0..self.departure_count() as i32)
            .map(|k| first + self.step * k)
            .collect()
    }
}

/// Today's date in Stuttgart.
pub fn today() -> NaiveDate {
    Utc::now().with_timezone(&Berlin).date_naive()
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum DepartureOutcome {
    Found(Trip),
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepartureEntry {
    pub departure: NaiveDateTime,
    pub outcome: DepartureOutcome,
}

/// Per-departure results in chronological order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommuteReport {
    pub entries: Vec<DepartureEntry>,
}

impl CommuteReport {
    pub fn has_trips(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.outcome, DepartureOutcome::Found(_)))
    }

    pub fn found_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, DepartureOutcome::Found(_)))
            .count()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) -> fmt::Result {
        for entry in &self.entries {
            let departure = entry.departure.format("%H:%M");
            match &entry.outcome {
                DepartureOutcome::Found(trip) => {
                    writeln!(
                        out,
                        "Departure at {} - Duration: {} minutes",
                        departure,
                        format_minutes(trip.duration_secs)
                    )?;
                    for (i, connection) in trip.connections.iter().enumerate() {
                        render_connection(out, i + 1, connection)?;
                    }
                }
                DepartureOutcome::NotFound(reason) => {
                    writeln!(out, "Departure at {} - No trips found: {}", departure, reason)?;
                }
            }
        }
        Ok(())
    }
}

fn render_connection(out: &mut String, number: usize, connection: &Connection) -> fmt::Result {
    writeln!(out, "\n  Connection {}:", number)?;
    writeln!(out, "    Duration: {} minutes", format_minutes(connection.duration_secs))?;
    writeln!(out, "    Realtime Controlled: {}", connection.is_realtime_controlled)?;
    writeln!(out, "    Origin:")?;
    render_stop(out, &connection.origin, "Departure Time")?;
    writeln!(out, "    Destination:")?;
    render_stop(out, &connection.destination, "Arrival Time")?;
    writeln!(out, "    Transportation: {}", connection.transportation)?;

    if connection.alerts.is_empty() {
        writeln!(out, "    Infos: None")?;
    } else {
        writeln!(out, "    Infos:")?;
        for alert in &connection.alerts {
            writeln!(out, "      Type: {}", or_none(alert.kind.as_deref()))?;
            writeln!(out, "      Title: {}", or_none(alert.title.as_deref()))?;
            writeln!(out, "      Subtitle: {}", or_none(alert.subtitle.as_deref()))?;
            if let Some(content) = &alert.content {
                writeln!(out, "      Message Content:")?;
                writeln!(out, "        {}", content)?;
            }
        }
    }

    writeln!(
        out,
        "    Path Description: {}",
        or_none(connection.path_description.as_deref())
    )
}

fn render_stop(out: &mut String, stop: &StopPoint, time_label: &str) -> fmt::Result {
    writeln!(out, "      Name: {}", stop.name)?;
    writeln!(out, "      {}: {}", time_label, format_time(stop.time))?;
    match stop.delay_minutes {
        Some(minutes) => writeln!(out, "      Delay: {} min", minutes),
        None => writeln!(out, "      Delay: none"),
    }
}

fn format_time(time: Option<chrono::DateTime<Tz>>) -> String {
    time.map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn or_none(value: Option<&str>) -> &str {
    value.unwrap_or("None")
}

/// Seconds as minutes: "23" when whole, "23.5" otherwise.
pub fn format_minutes(secs: i64) -> String {
    if secs % 60 == 0 {
        (secs / 60).to_string()
    } else {
        format!("{:.1}", secs as f64 / 60.0)
    }
}

// ============================================================================
// Collector
// ============================================================================

/// Queries `source` once per instant of `window` on `date`. Instants with no
/// schedule are recorded as `NotFound`; transport failures abort the run.
pub fn collect(
    source: &dyn TripSource,
    route: &Route,
    window: &DepartureWindow,
    date: NaiveDate,
) -> vvs_api_models::Result<CommuteReport> {
    let mut report = CommuteReport::default();

    for departure in window.instants(date) {
        let outcome = match source.query(&route.origin, &route.destination, departure)? {
            TripLookup::Found(trip) => {
                log::debug!(
                    "Trip at {}: {} connection(s), {} min",
                    departure.format("%H:%M"),
                    trip.connections.len(),
                    format_minutes(trip.duration_secs)
                );
                DepartureOutcome::Found(trip)
            }
            TripLookup::NotFound(reason) => {
                log::info!("No trip at {}: {}", departure.format("%H:%M"), reason);
                DepartureOutcome::NotFound(reason)
            }
        };
        report.entries.push(DepartureEntry { departure, outcome });
    }

    log::info!(
        "Collected {} departure(s), {} with trips",
        report.entries.len(),
        report.found_count()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vvs_api_models::{ServiceAlert, VvsError};
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    struct AlwaysNotFound {
        calls: Mutex<Vec<NaiveDateTime>>,
    }

    impl TripSource for AlwaysNotFound {
        fn query(&self, _: &str, _: &str, at: NaiveDateTime) -> vvs_api_models::Result<TripLookup> {
            self.calls.lock().unwrap().push(at);
            Ok(TripLookup::NotFound("no journeys returned".to_string()))
        }
    }

    struct FixedTrip(Trip);

    impl TripSource for FixedTrip {
        fn query(&self, _: &str, _: &str, _: NaiveDateTime) -> vvs_api_models::Result<TripLookup> {
            Ok(TripLookup::Found(self.0.clone()))
        }
    }

    struct FailsAt(NaiveTime);

    impl TripSource for FailsAt {
        fn query(&self, _: &str, _: &str, at: NaiveDateTime) -> vvs_api_models::Result<TripLookup> {
            if at.time() == self.0 {
                Err(VvsError::NetworkError("connection reset".to_string()))
            } else {
                Ok(TripLookup::NotFound("no journeys returned".to_string()))
            }
        }
    }

    fn stop(name: &str, h: u32, m: u32, delay: Option<i64>) -> StopPoint {
        StopPoint {
            name: name.to_string(),
            time: Berlin
                .from_local_datetime(&date().and_time(hm(h, m)))
                .single(),
            delay_minutes: delay,
        }
    }

    fn two_connection_trip() -> Trip {
        Trip {
            duration_secs: 22 * 60,
            connections: vec![
                Connection {
                    duration_secs: 600,
                    is_realtime_controlled: true,
                    origin: stop("Stuttgart, Pragfriedhof", 7, 5, Some(2)),
                    destination: stop("Stuttgart, Feuerbach Bf", 7, 15, Some(2)),
                    transportation: "U6".to_string(),
                    path_description: Some("Pragfriedhof -> Feuerbach".to_string()),
                    alerts: vec![ServiceAlert {
                        kind: Some("lineInfo".to_string()),
                        title: Some("Bauarbeiten U6".to_string()),
                        subtitle: Some("Umleitung".to_string()),
                        content: Some("Ersatzbusse ab Killesberg".to_string()),
                    }],
                },
                Connection {
                    duration_secs: 450,
                    is_realtime_controlled: false,
                    origin: stop("Stuttgart, Feuerbach Bf", 7, 19, None),
                    destination: stop("Stuttgart, Weilimdorf Bf", 7, 27, None),
                    transportation: "S6".to_string(),
                    path_description: None,
                    alerts: vec![],
                },
            ],
        }
    }

    #[test]
    fn morning_window_has_nineteen_increasing_instants() {
        let window = DepartureWindow::morning().unwrap();
        let instants = window.instants(date());

        assert_eq!(instants.len(), (90 / 5) + 1);
        assert_eq!(instants.len(), window.departure_count());
        assert!(instants.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(instants.first().unwrap().time(), hm(7, 0));
        assert_eq!(instants.last().unwrap().time(), hm(8, 30));
        assert!(instants.iter().all(|i| i.date() == date()));
    }

    #[test]
    fn window_length_floors_partial_steps() {
        let window = DepartureWindow::new(hm(7, 45), hm(9, 0), Duration::minutes(7)).unwrap();
        // 75 minutes / 7 = 10 full steps
        assert_eq!(window.instants(date()).len(), 11);
        assert_eq!(window.instants(date()).last().unwrap().time(), hm(8, 55));
    }

    #[test]
    fn single_instant_window() {
        let window = DepartureWindow::new(hm(8, 0), hm(8, 0), Duration::minutes(5)).unwrap();
        assert_eq!(window.instants(date()), vec![date().and_time(hm(8, 0))]);
    }

    #[test]
    fn sub_second_steps_are_rejected() {
        assert_eq!(
            DepartureWindow::new(hm(7, 0), hm(7, 1), Duration::milliseconds(500)),
            Err(WindowError::FractionalStep)
        );
        assert_eq!(
            DepartureWindow::new(hm(7, 0), hm(7, 1), Duration::milliseconds(1500)),
            Err(WindowError::FractionalStep)
        );

        let window = DepartureWindow::new(hm(7, 0), hm(7, 1), Duration::seconds(1)).unwrap();
        assert_eq!(window.departure_count(), 61);
    }

    #[test]
    fn invalid_windows_are_rejected() {
        assert_eq!(
            DepartureWindow::new(hm(7, 0), hm(8, 0), Duration::zero()),
            Err(WindowError::NonPositiveStep)
        );
        assert!(matches!(
            DepartureWindow::new(hm(9, 0), hm(8, 0), Duration::minutes(5)),
            Err(WindowError::StartAfterEnd { .. })
        ));
    }

    #[test]
    fn all_not_found_yields_one_line_per_instant() {
        let source = AlwaysNotFound {
            calls: Mutex::new(Vec::new()),
        };
        let window = DepartureWindow::morning().unwrap();
        let report = collect(&source, &Route::stuttgart_commute(), &window, date()).unwrap();

        assert!(!report.has_trips());
        assert_eq!(report.entries.len(), 19);
        assert_eq!(*source.calls.lock().unwrap(), window.instants(date()));

        let rendered = report.render();
        assert_eq!(rendered.matches("No trips found").count(), 19);
        assert_eq!(rendered.lines().count(), 19);
        assert!(rendered.starts_with("Departure at 07:00 - No trips found: no journeys returned\n"));
    }

    #[test]
    fn renders_trip_with_two_connections_in_order() {
        let window = DepartureWindow::new(hm(7, 0), hm(7, 0), Duration::minutes(5)).unwrap();
        let report = collect(
            &FixedTrip(two_connection_trip()),
            &Route::stuttgart_commute(),
            &window,
            date(),
        )
        .unwrap();
        assert!(report.has_trips());

        let text = report.render();
        let expected = [
            "Departure at 07:00 - Duration: 22 minutes",
            "Connection 1:",
            "Duration: 10 minutes",
            "Realtime Controlled: true",
            "Name: Stuttgart, Pragfriedhof",
            "Departure Time: 07:05",
            "Delay: 2 min",
            "Name: Stuttgart, Feuerbach Bf",
            "Arrival Time: 07:15",
            "Transportation: U6",
            "Type: lineInfo",
            "Title: Bauarbeiten U6",
            "Subtitle: Umleitung",
            "Message Content:",
            "Ersatzbusse ab Killesberg",
            "Path Description: Pragfriedhof -> Feuerbach",
            "Connection 2:",
            "Duration: 7.5 minutes",
            "Realtime Controlled: false",
            "Departure Time: 07:19",
            "Delay: none",
            "Name: Stuttgart, Weilimdorf Bf",
            "Transportation: S6",
            "Infos: None",
            "Path Description: None",
        ];

        let mut cursor = 0;
        for needle in expected {
            let found = text[cursor..]
                .find(needle)
                .unwrap_or_else(|| panic!("missing {:?} after offset {} in:\n{}", needle, cursor, text));
            cursor += found + needle.len();
        }
    }

    #[test]
    fn transport_errors_abort_collection() {
        let err = collect(
            &FailsAt(hm(7, 10)),
            &Route::stuttgart_commute(),
            &DepartureWindow::morning().unwrap(),
            date(),
        )
        .unwrap_err();
        assert!(matches!(err, VvsError::NetworkError(_)));
    }

    #[test]
    fn minutes_format_drops_whole_fraction() {
        assert_eq!(format_minutes(1320), "22");
        assert_eq!(format_minutes(450), "7.5");
        assert_eq!(format_minutes(0), "0");
    }
}
